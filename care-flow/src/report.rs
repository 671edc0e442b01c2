use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    case::{CaseStore, PatientCase, Urgency},
    error::{FlowError, Result},
    pipeline::StepId,
    results::AgentResultStore,
};

/// File name the rendered report is saved under
pub const REPORT_FILE_NAME: &str = "analysis_report.pdf";

/// Patient block of a report request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientInfo {
    pub patient_id: String,
    pub age: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medical_history: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_medications: Option<String>,
    pub urgency: Urgency,
}

impl From<&PatientCase> for PatientInfo {
    fn from(case: &PatientCase) -> Self {
        Self {
            patient_id: case.patient_id.clone(),
            age: case.age,
            gender: case.gender.clone(),
            medical_history: case.medical_history.clone(),
            current_medications: case.current_medications.clone(),
            urgency: case.urgency,
        }
    }
}

/// Body sent to the report backend. Step sections hold raw step results, keyed by backend key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symptom_analysis: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub literature: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_matcher: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treatment: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_info: Option<PatientInfo>,
}

impl ReportRequest {
    fn section_mut(&mut self, step: StepId) -> &mut Option<Value> {
        match step {
            StepId::Symptom => &mut self.symptom_analysis,
            StepId::Literature => &mut self.literature,
            StepId::Case => &mut self.case_matcher,
            StepId::Treatment => &mut self.treatment,
            StepId::Summary => &mut self.summary,
        }
    }

    pub fn section(&self, step: StepId) -> Option<&Value> {
        match step {
            StepId::Symptom => self.symptom_analysis.as_ref(),
            StepId::Literature => self.literature.as_ref(),
            StepId::Case => self.case_matcher.as_ref(),
            StepId::Treatment => self.treatment.as_ref(),
            StepId::Summary => self.summary.as_ref(),
        }
    }

    /// Steps that have a section in this request, in pipeline order.
    pub fn steps(&self) -> Vec<StepId> {
        StepId::ALL
            .into_iter()
            .filter(|step| self.section(*step).is_some())
            .collect()
    }
}

/// Assemble a report request from the completed steps and the current case.
///
/// Fails with [`FlowError::EmptyReport`] when no step has completed; the patient block alone
/// never makes a report.
pub fn build_report_request(results: &AgentResultStore, cases: &CaseStore) -> Result<ReportRequest> {
    let mut request = ReportRequest::default();

    for record in results.completed_only() {
        let payload = record
            .result
            .unwrap_or_else(|| Value::Object(Default::default()));
        *request.section_mut(record.agent_name) = Some(payload);
    }

    if request.steps().is_empty() {
        return Err(FlowError::EmptyReport);
    }

    request.patient_info = cases.get_case().as_ref().map(PatientInfo::from);
    Ok(request)
}
