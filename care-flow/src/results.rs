use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    events::{EventBus, StoreEvent},
    pipeline::{PIPELINE, StepId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Pending,
    Running,
    Completed,
    Error,
}

/// A status change for one step, carrying exactly the payload its status allows
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Pending,
    Running,
    /// Step finished; an omitted backend payload is recorded as an empty object
    Completed(Value),
    Error { message: String },
}

impl Transition {
    pub fn completed(payload: Option<Value>) -> Self {
        Transition::Completed(payload.unwrap_or_else(|| Value::Object(Default::default())))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Transition::Error {
            message: message.into(),
        }
    }
}

/// Lifecycle record for one pipeline step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResult {
    pub agent_name: StepId,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// `None` only for synthesized pending records that were never written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl AgentResult {
    fn record(step: StepId, transition: Transition) -> Self {
        let (status, result) = match transition {
            Transition::Pending => (AgentStatus::Pending, None),
            Transition::Running => (AgentStatus::Running, None),
            Transition::Completed(payload) => (AgentStatus::Completed, Some(payload)),
            Transition::Error { message } => {
                (AgentStatus::Error, Some(json!({ "message": message })))
            }
        };

        Self {
            agent_name: step,
            status,
            result,
            timestamp: Some(Utc::now()),
        }
    }

    fn implicit_pending(step: StepId) -> Self {
        Self {
            agent_name: step,
            status: AgentStatus::Pending,
            result: None,
            timestamp: None,
        }
    }

    /// Failure message of an errored step.
    pub fn error_message(&self) -> Option<&str> {
        match self.status {
            AgentStatus::Error => self
                .result
                .as_ref()
                .and_then(|r| r.get("message"))
                .and_then(Value::as_str),
            _ => None,
        }
    }
}

/// Per-step lifecycle records, at most one per step
#[derive(Debug)]
pub struct AgentResultStore {
    records: DashMap<StepId, AgentResult>,
    events: EventBus,
}

impl AgentResultStore {
    pub fn new(events: EventBus) -> Self {
        Self {
            records: DashMap::new(),
            events,
        }
    }

    /// Upsert the record for `step`, stamping it with the current time.
    pub fn update(&self, step: StepId, transition: Transition) {
        self.records
            .insert(step, AgentResult::record(step, transition));
        self.events.publish(StoreEvent::ResultUpdated { step });
    }

    pub fn clear(&self) {
        self.records.clear();
        self.events.publish(StoreEvent::ResultsCleared);
    }

    pub fn get(&self, step: StepId) -> Option<AgentResult> {
        self.records.get(&step).map(|entry| entry.clone())
    }

    pub fn status(&self, step: StepId) -> AgentStatus {
        self.records
            .get(&step)
            .map(|entry| entry.status)
            .unwrap_or(AgentStatus::Pending)
    }

    /// One record per pipeline step, in pipeline order; unwritten steps are synthesized as pending.
    pub fn list(&self) -> Vec<AgentResult> {
        PIPELINE
            .iter()
            .map(|step| {
                self.get(step.id)
                    .unwrap_or_else(|| AgentResult::implicit_pending(step.id))
            })
            .collect()
    }

    /// Only the records that have been written, in no particular order.
    pub fn list_present(&self) -> Vec<AgentResult> {
        self.records.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn completed_only(&self) -> Vec<AgentResult> {
        PIPELINE
            .iter()
            .filter_map(|step| self.get(step.id))
            .filter(|record| record.status == AgentStatus::Completed)
            .collect()
    }

    pub fn completed_count(&self) -> usize {
        self.records
            .iter()
            .filter(|entry| entry.status == AgentStatus::Completed)
            .count()
    }

    /// Fraction of pipeline steps completed, in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        self.completed_count() as f64 / PIPELINE.len() as f64
    }

    pub fn progress_percent(&self) -> u8 {
        (self.progress() * 100.0).round() as u8
    }
}
