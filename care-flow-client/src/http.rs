use async_trait::async_trait;
use care_flow::{
    AnalysisBackend, AnalysisResponse, FlowError, PatientCase, ReportBackend, ReportRequest,
    Result, SessionStore,
};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

use crate::config::ClientConfig;

/// Analysis and report backend reached over HTTP.
///
/// Forwards the session's bearer credential, if any, on every request.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    session: Arc<SessionStore>,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig, session: Arc<SessionStore>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.analysis_api_url.clone(),
            session,
        })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let request = self.client.post(format!("{}{}", self.base_url, path));
        match self.session.token() {
            Some(token) => request.bearer_auth(token.expose()),
            None => request,
        }
    }
}

/// Turn a non-success response into the message carried by [`FlowError::RemoteCall`].
async fn failure_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| format!("Request failed with status {}", status))
}

fn transport_error(e: reqwest::Error) -> FlowError {
    error!("Backend request failed: {}", e);
    FlowError::RemoteCall(e.to_string())
}

#[async_trait]
impl AnalysisBackend for HttpBackend {
    async fn analyze(&self, case: &PatientCase) -> Result<AnalysisResponse> {
        debug!("Submitting case {} for analysis", case.patient_id);

        let response = self
            .post("/analyze")
            .json(case)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(FlowError::RemoteCall(failure_message(response).await));
        }

        match response.json::<Value>().await.map_err(transport_error)? {
            Value::Object(steps) => Ok(steps),
            other => Err(FlowError::RemoteCall(format!(
                "Unexpected analysis response: expected an object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

#[async_trait]
impl ReportBackend for HttpBackend {
    async fn render(&self, request: &ReportRequest) -> Result<Vec<u8>> {
        let response = self
            .post("/generate-pdf")
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(FlowError::RemoteCall(failure_message(response).await));
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(bytes.to_vec())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
