use std::sync::Arc;

use crate::{
    case::CaseStore, events::EventBus, results::AgentResultStore, session::SessionStore,
};

/// The stores of one application instance, sharing a single event bus.
///
/// Built once at startup and handed to whatever needs it; dropping the last clone tears
/// everything down.
#[derive(Clone, Debug)]
pub struct Stores {
    pub events: EventBus,
    pub cases: Arc<CaseStore>,
    pub results: Arc<AgentResultStore>,
    pub session: Arc<SessionStore>,
}

impl Stores {
    pub fn new() -> Self {
        let events = EventBus::new();
        Self {
            cases: Arc::new(CaseStore::new(events.clone())),
            results: Arc::new(AgentResultStore::new(events.clone())),
            session: Arc::new(SessionStore::new(events.clone())),
            events,
        }
    }
}

impl Default for Stores {
    fn default() -> Self {
        Self::new()
    }
}
