//! WorkflowOrchestrator – drives one end-to-end analysis run.
//!
//! The analysis backend executes every pipeline step in a single remote call, so a run is one
//! state machine, not five:
//!
//! ```text
//! Idle ──start──▶ Running (all steps `running`) ──response──▶ Idle (all steps `completed`)
//!                                               └──failure──▶ Idle (all steps `error`)
//! ```
//!
//! Every step changes state in the same batch, in pipeline order.
//!
//! ## Run generations
//! Each `start`, `stop` and `reset` advances a generation counter published on a watch channel.
//! An in-flight run races its remote call against that channel and drops the call as soon as
//! the generation moves on, which cancels the request. Batch writes are also checked against
//! the generation, so a response belonging to a stopped or superseded run is never recorded.
//! Generation checks and the writes they guard happen under one write lock, so a generation
//! cannot move between the check and the batch.

use serde_json::Value;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    backend::{AnalysisBackend, AnalysisResponse},
    case::CaseStore,
    error::{FlowError, Result},
    events::{EventBus, StoreEvent},
    pipeline::{PIPELINE, StepId},
    results::{AgentResultStore, Transition},
    session::SessionStore,
    snapshot::RunSnapshot,
    state::Stores,
};

/// Message recorded on every step when the operator stops a run
pub const STOPPED_MESSAGE: &str = "Analysis stopped";

/// How a run that got as far as the remote call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The backend answered and every step was marked completed
    Completed,
    /// The run was stopped, reset or replaced by a newer run before it could record anything
    Superseded,
}

pub struct WorkflowOrchestrator {
    cases: Arc<CaseStore>,
    results: Arc<AgentResultStore>,
    session: Arc<SessionStore>,
    backend: Arc<dyn AnalysisBackend>,
    events: EventBus,
    in_progress: AtomicBool,
    generation: watch::Sender<u64>,
    /// Held across every generation check and the store writes that depend on it
    writes: Mutex<()>,
}

impl WorkflowOrchestrator {
    pub fn new(stores: &Stores, backend: Arc<dyn AnalysisBackend>) -> Self {
        Self {
            cases: stores.cases.clone(),
            results: stores.results.clone(),
            session: stores.session.clone(),
            backend,
            events: stores.events.clone(),
            in_progress: AtomicBool::new(false),
            generation: watch::Sender::new(0),
            writes: Mutex::new(()),
        }
    }

    pub fn analysis_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot::capture(&self.results, self.analysis_in_progress())
    }

    /// Run the whole pipeline for the current case.
    ///
    /// Fails without touching any state when nobody is signed in or no case is set. A backend
    /// failure marks every step as errored with the same message and is returned as
    /// [`FlowError::RemoteCall`].
    pub async fn start(&self) -> Result<RunOutcome> {
        if !self.session.is_authenticated() {
            return Err(FlowError::NotAuthenticated);
        }
        let case = self.cases.get_case().ok_or(FlowError::MissingCase)?;

        let run_id = Uuid::new_v4();
        let (generation, mut superseded) = {
            let _writes = self.lock_writes();

            // 1. Claim a new generation; anything still in flight is now stale
            let generation = self.advance_generation();
            let superseded = self.generation.subscribe();
            info!(%run_id, generation, patient_id = %case.patient_id, "Starting analysis run");

            // 2. Fresh records, every step running
            self.set_in_progress(true);
            self.results.clear();
            self.apply_batch(|_| Transition::Running);
            (generation, superseded)
        };

        // 3. The single remote call, abandoned if the generation moves on
        let response = tokio::select! {
            response = self.backend.analyze(&case) => response,
            _ = superseded.changed() => {
                warn!(%run_id, generation, "Analysis run superseded while waiting for the backend");
                return Ok(RunOutcome::Superseded);
            }
        };

        let _writes = self.lock_writes();
        if !self.is_current(generation) {
            warn!(%run_id, generation, "Discarding response from a stale analysis run");
            return Ok(RunOutcome::Superseded);
        }

        // 4. Fan the response out as one batch
        let outcome = match response {
            Ok(steps) => {
                self.apply_batch(|step| {
                    let payload = step_payload(&steps, step).cloned();
                    if payload.is_none() {
                        warn!(%run_id, step = %step, "Backend omitted step result");
                    }
                    Transition::completed(payload)
                });
                info!(%run_id, "Analysis run completed");
                Ok(RunOutcome::Completed)
            }
            Err(e) => {
                let message = e.step_message();
                error!(%run_id, error = %message, "Analysis run failed");
                self.apply_batch(|_| Transition::error(message.clone()));
                Err(FlowError::RemoteCall(message))
            }
        };

        self.set_in_progress(false);
        outcome
    }

    /// Stop the active run: the remote call is cancelled and every step is marked as stopped.
    /// Does nothing but clear the flag when no run is active.
    pub fn stop(&self) {
        let _writes = self.lock_writes();
        if !self.analysis_in_progress() {
            self.set_in_progress(false);
            return;
        }

        let generation = self.advance_generation();
        info!(generation, "Analysis run stopped");
        self.apply_batch(|_| Transition::error(STOPPED_MESSAGE));
        self.set_in_progress(false);
    }

    /// Drop all step records and the in-progress flag, cancelling any active run.
    pub fn reset(&self) {
        let _writes = self.lock_writes();
        let generation = self.advance_generation();
        info!(generation, "Workflow reset");
        self.results.clear();
        self.set_in_progress(false);
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_batch(&self, mut transition: impl FnMut(StepId) -> Transition) {
        for step in PIPELINE.iter() {
            self.results.update(step.id, transition(step.id));
        }
    }

    fn advance_generation(&self) -> u64 {
        let mut next = 0;
        self.generation.send_modify(|generation| {
            *generation += 1;
            next = *generation;
        });
        next
    }

    fn is_current(&self, generation: u64) -> bool {
        *self.generation.borrow() == generation
    }

    fn set_in_progress(&self, in_progress: bool) {
        self.in_progress.store(in_progress, Ordering::SeqCst);
        self.events
            .publish(StoreEvent::AnalysisInProgress { in_progress });
    }
}

/// Extract the payload for `step` from a raw backend response, treating `null` as absent.
pub fn step_payload(response: &AnalysisResponse, step: StepId) -> Option<&Value> {
    response
        .get(step.backend_key())
        .filter(|value| !value.is_null())
}
