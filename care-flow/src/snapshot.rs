use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    normalize::{NormalizedResult, normalize},
    pipeline::StepId,
    results::{AgentResultStore, AgentStatus},
};

/// Status line of one pipeline step
#[derive(Debug, Clone, Serialize)]
pub struct StepView {
    pub id: StepId,
    pub name: &'static str,
    pub description: &'static str,
    pub status: AgentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedResult {
    #[serde(flatten)]
    pub result: NormalizedResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Everything the presentation layer needs to draw the workflow and results panels
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub analysis_in_progress: bool,
    pub progress_percent: u8,
    pub steps: Vec<StepView>,
    pub results: Vec<CompletedResult>,
}

impl RunSnapshot {
    pub fn capture(results: &AgentResultStore, analysis_in_progress: bool) -> Self {
        let steps = results
            .list()
            .into_iter()
            .map(|record| {
                let step = record.agent_name.step();
                StepView {
                    id: step.id,
                    name: step.name,
                    description: step.description,
                    status: record.status,
                    error: record.error_message().map(str::to_string),
                    updated_at: record.timestamp,
                }
            })
            .collect();

        let completed = results
            .completed_only()
            .into_iter()
            .map(|record| CompletedResult {
                result: normalize(record.agent_name, record.result.as_ref()),
                completed_at: record.timestamp,
            })
            .collect();

        Self {
            analysis_in_progress,
            progress_percent: results.progress_percent(),
            steps,
            results: completed,
        }
    }
}
