use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

use crate::events::{EventBus, StoreEvent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// The patient case submitted for analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientCase {
    pub patient_id: String,
    #[serde(default)]
    pub age: u32,
    #[serde(default)]
    pub gender: Option<String>,
    pub symptoms: String,
    #[serde(default)]
    pub medical_history: Option<String>,
    #[serde(default)]
    pub current_medications: Option<String>,
    #[serde(default)]
    pub urgency: Urgency,
}

impl PatientCase {
    pub fn new(patient_id: impl Into<String>, symptoms: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            age: 0,
            gender: None,
            symptoms: symptoms.into(),
            medical_history: None,
            current_medications: None,
            urgency: Urgency::default(),
        }
    }

    /// Names of required fields that are blank. The store itself never checks these;
    /// case entry does, before calling [`CaseStore::set_case`].
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.patient_id.trim().is_empty() {
            missing.push("patientId");
        }
        if self.symptoms.trim().is_empty() {
            missing.push("symptoms");
        }
        missing
    }
}

/// Holds the single active patient case
#[derive(Debug)]
pub struct CaseStore {
    current: RwLock<Option<PatientCase>>,
    events: EventBus,
}

impl CaseStore {
    pub fn new(events: EventBus) -> Self {
        Self {
            current: RwLock::new(None),
            events,
        }
    }

    /// Replace the current case wholesale.
    pub fn set_case(&self, case: PatientCase) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(case);
        self.events.publish(StoreEvent::CaseReplaced);
    }

    pub fn get_case(&self) -> Option<PatientCase> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
