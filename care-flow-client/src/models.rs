use care_flow::{AppUser, BearerToken, RunOutcome, RunSnapshot};
use serde::{Deserialize, Serialize};

/// Session change pushed by the auth provider integration
#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub user: Option<AppUser>,
    #[serde(default)]
    pub access_token: Option<BearerToken>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    pub user: Option<AppUser>,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub status: &'static str,
    pub message: String,
    pub snapshot: RunSnapshot,
}

impl RunResponse {
    pub fn from_outcome(outcome: RunOutcome, snapshot: RunSnapshot) -> Self {
        let (status, message) = match outcome {
            RunOutcome::Completed => ("completed", "Patient case analysis has completed."),
            RunOutcome::Superseded => (
                "superseded",
                "The analysis was stopped or replaced before it finished.",
            ),
        };
        Self {
            status,
            message: message.to_string(),
            snapshot,
        }
    }
}
