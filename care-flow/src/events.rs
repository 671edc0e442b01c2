use serde::Serialize;
use tokio::sync::broadcast;

use crate::pipeline::StepId;

/// Change notifications published by the stores
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    CaseReplaced,
    ResultUpdated { step: StepId },
    ResultsCleared,
    AnalysisInProgress { in_progress: bool },
    SessionChanged { authenticated: bool },
}

const EVENT_CAPACITY: usize = 64;

/// Fan-out channel shared by every store of one application instance.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn publish(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
