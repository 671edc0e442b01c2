pub mod backend;
pub mod case;
pub mod error;
pub mod events;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod results;
pub mod session;
pub mod snapshot;
pub mod state;

// Re-export commonly used types
pub use backend::{AnalysisBackend, AnalysisResponse, ReportBackend};
pub use case::{CaseStore, PatientCase, Urgency};
pub use error::{FlowError, Result};
pub use events::{EventBus, StoreEvent};
pub use normalize::{Finding, Metric, NormalizedResult, Section, normalize};
pub use orchestrator::{RunOutcome, STOPPED_MESSAGE, WorkflowOrchestrator};
pub use pipeline::{PIPELINE, PipelineStep, StepId};
pub use report::{PatientInfo, REPORT_FILE_NAME, ReportRequest, build_report_request};
pub use results::{AgentResult, AgentResultStore, AgentStatus, Transition};
pub use session::{AppUser, BearerToken, SessionStore};
pub use snapshot::{CompletedResult, RunSnapshot, StepView};
pub use state::Stores;
