use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{case::PatientCase, error::Result, report::ReportRequest};

/// Step results keyed by backend step key (`symptom_analysis`, `case_matcher`, ...)
pub type AnalysisResponse = Map<String, Value>;

/// Remote service that runs every pipeline step in one call
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Run the full pipeline for `case`. Fails as a unit with [`crate::FlowError::RemoteCall`].
    async fn analyze(&self, case: &PatientCase) -> Result<AnalysisResponse>;
}

/// Remote service that renders a report document
#[async_trait]
pub trait ReportBackend: Send + Sync {
    /// Render `request`, returning the opaque PDF bytes.
    async fn render(&self, request: &ReportRequest) -> Result<Vec<u8>>;
}
