use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
};
use care_flow::{
    AnalysisBackend, FlowError, PatientCase, REPORT_FILE_NAME, ReportBackend, RunSnapshot,
    Stores, WorkflowOrchestrator, build_report_request,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{
    config::ClientConfig,
    http::HttpBackend,
    models::{RunResponse, SessionRequest, SessionResponse},
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn flow_error(e: FlowError) -> ApiError {
    let status = match &e {
        FlowError::MissingCase => StatusCode::BAD_REQUEST,
        FlowError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        FlowError::EmptyReport => StatusCode::CONFLICT,
        FlowError::RemoteCall(_) => StatusCode::BAD_GATEWAY,
        FlowError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({
            "error": e.to_string(),
            "details": e.step_message()
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub orchestrator: Arc<WorkflowOrchestrator>,
    pub reports: Arc<dyn ReportBackend>,
}

impl AppState {
    pub fn new(
        stores: Stores,
        analysis: Arc<dyn AnalysisBackend>,
        reports: Arc<dyn ReportBackend>,
    ) -> Self {
        let orchestrator = Arc::new(WorkflowOrchestrator::new(&stores, analysis));
        Self {
            stores,
            orchestrator,
            reports,
        }
    }
}

pub fn create_app(config: &ClientConfig) -> anyhow::Result<Router> {
    let stores = Stores::new();
    let backend = Arc::new(HttpBackend::new(config, stores.session.clone())?);
    let app_state = AppState::new(stores, backend.clone(), backend);
    Ok(build_router(app_state))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/session", put(set_session).delete(clear_session))
        .route("/case", put(set_case).get(get_case))
        .route("/analysis", get(get_analysis))
        .route("/analysis/start", post(start_analysis))
        .route("/analysis/stop", post(stop_analysis))
        .route("/analysis/reset", post(reset_analysis))
        .route("/report", post(download_report))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Patient Case Analysis Client",
        "version": "0.1.0",
        "description": "Multi-agent patient case analysis: workflow status, normalized results and reports",
        "endpoints": {
            "PUT /session": "Set the signed-in user",
            "DELETE /session": "Sign out",
            "PUT /case": "Replace the active patient case",
            "GET /case": "Read the active patient case",
            "POST /analysis/start": "Run the analysis pipeline for the active case",
            "POST /analysis/stop": "Stop the running analysis",
            "POST /analysis/reset": "Clear all step results",
            "GET /analysis": "Step statuses, progress and normalized results",
            "POST /report": "Download the PDF report of completed steps",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn set_session(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> Json<SessionResponse> {
    match &request.user {
        Some(user) => info!("Session started for {}", user.email),
        None => info!("Session cleared"),
    }
    state
        .stores
        .session
        .set_auth(request.user, request.access_token);
    Json(session_response(&state))
}

async fn clear_session(State(state): State<AppState>) -> Json<SessionResponse> {
    info!("Session cleared");
    state.stores.session.clear_auth();
    Json(session_response(&state))
}

fn session_response(state: &AppState) -> SessionResponse {
    SessionResponse {
        authenticated: state.stores.session.is_authenticated(),
        user: state.stores.session.user(),
    }
}

async fn set_case(
    State(state): State<AppState>,
    Json(case): Json<PatientCase>,
) -> ApiResult<PatientCase> {
    validate_case(&case)?;
    info!("Patient case {} entered", case.patient_id);
    state.stores.cases.set_case(case.clone());
    Ok(Json(case))
}

fn validate_case(case: &PatientCase) -> Result<(), ApiError> {
    let missing = case.missing_required_fields();
    if !missing.is_empty() {
        return Err(bad_request_error(&format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

async fn get_case(State(state): State<AppState>) -> ApiResult<PatientCase> {
    state
        .stores
        .cases
        .get_case()
        .map(Json)
        .ok_or_else(|| flow_error(FlowError::MissingCase))
}

async fn start_analysis(State(state): State<AppState>) -> ApiResult<RunResponse> {
    info!("Starting patient case analysis");

    match state.orchestrator.start().await {
        Ok(outcome) => {
            info!("Analysis finished: {:?}", outcome);
            Ok(Json(RunResponse::from_outcome(
                outcome,
                state.orchestrator.snapshot(),
            )))
        }
        Err(e) => {
            error!("Analysis failed: {}", e);
            Err(flow_error(e))
        }
    }
}

async fn stop_analysis(State(state): State<AppState>) -> Json<RunSnapshot> {
    info!("Stopping analysis");
    state.orchestrator.stop();
    Json(state.orchestrator.snapshot())
}

async fn reset_analysis(State(state): State<AppState>) -> Json<RunSnapshot> {
    info!("Resetting workflow");
    state.orchestrator.reset();
    Json(state.orchestrator.snapshot())
}

async fn get_analysis(State(state): State<AppState>) -> Json<RunSnapshot> {
    Json(state.orchestrator.snapshot())
}

async fn download_report(State(state): State<AppState>) -> Result<Response, ApiError> {
    let request = build_report_request(&state.stores.results, &state.stores.cases).map_err(|e| {
        warn!("Report requested with no completed steps");
        flow_error(e)
    })?;

    info!("Generating report for steps {:?}", request.steps());
    let pdf = state.reports.render(&request).await.map_err(|e| {
        error!("Report generation failed: {}", e);
        flow_error(e)
    })?;

    let headers = [
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", REPORT_FILE_NAME),
        ),
    ];
    Ok((headers, pdf).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use care_flow::{AnalysisResponse, ReportRequest};
    use tower::ServiceExt;

    struct StubBackend {
        fail_with: Option<String>,
    }

    #[async_trait]
    impl AnalysisBackend for StubBackend {
        async fn analyze(&self, _case: &PatientCase) -> care_flow::Result<AnalysisResponse> {
            match &self.fail_with {
                Some(message) => Err(FlowError::RemoteCall(message.clone())),
                None => Ok(json!({
                    "symptom_analysis": {"risk_level": "high"},
                    "literature": {"articles": [{"title": "X", "pmid": "123"}]}
                })
                .as_object()
                .cloned()
                .unwrap_or_default()),
            }
        }
    }

    #[async_trait]
    impl ReportBackend for StubBackend {
        async fn render(&self, request: &ReportRequest) -> care_flow::Result<Vec<u8>> {
            Ok(format!("%PDF {}", request.steps().len()).into_bytes())
        }
    }

    fn app(fail_with: Option<&str>) -> Router {
        let backend = Arc::new(StubBackend {
            fail_with: fail_with.map(str::to_string),
        });
        build_router(AppState::new(Stores::new(), backend.clone(), backend))
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn sign_in_with_case(app: &Router) {
        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/session",
                json!({"user": {"id": "u1", "email": "doc@example.org", "name": "doc"}, "access_token": "t"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/case",
                json!({"patientId": "P-1", "age": 61, "symptoms": "chest pain", "urgency": "high"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn case_requires_patient_id_and_symptoms() {
        let app = app(None);
        let response = app
            .oneshot(json_request(
                "PUT",
                "/case",
                json!({"patientId": "", "symptoms": "cough"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Missing required fields: patientId");
    }

    #[tokio::test]
    async fn start_without_session_is_unauthorized() {
        let app = app(None);
        let response = app
            .oneshot(empty_request("POST", "/analysis/start"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn start_without_case_is_bad_request() {
        let app = app(None);
        app.clone()
            .oneshot(json_request(
                "PUT",
                "/session",
                json!({"user": {"id": "u1", "email": "doc@example.org", "name": "doc"}}),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(empty_request("POST", "/analysis/start"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn full_run_then_report_download() {
        let app = app(None);
        sign_in_with_case(&app).await;

        let response = app
            .clone()
            .oneshot(empty_request("POST", "/analysis/start"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["snapshot"]["progress_percent"], 100);
        assert_eq!(body["snapshot"]["results"][1]["step"], "literature");
        assert_eq!(
            body["snapshot"]["results"][1]["sections"][0]["findings"][0]["pmid"],
            "123"
        );

        let response = app
            .clone()
            .oneshot(empty_request("POST", "/report"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"analysis_report.pdf\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"%PDF 5");
    }

    #[tokio::test]
    async fn backend_failure_is_bad_gateway_and_marks_steps() {
        let app = app(Some("Request failed"));
        sign_in_with_case(&app).await;

        let response = app
            .clone()
            .oneshot(empty_request("POST", "/analysis/start"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(response).await["details"], "Request failed");

        let response = app
            .clone()
            .oneshot(empty_request("GET", "/analysis"))
            .await
            .unwrap();
        let snapshot = body_json(response).await;
        for step in snapshot["steps"].as_array().unwrap() {
            assert_eq!(step["status"], "error");
            assert_eq!(step["error"], "Request failed");
        }

        let response = app
            .oneshot(empty_request("POST", "/report"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn reset_returns_all_steps_pending() {
        let app = app(None);
        sign_in_with_case(&app).await;
        app.clone()
            .oneshot(empty_request("POST", "/analysis/start"))
            .await
            .unwrap();

        let response = app
            .oneshot(empty_request("POST", "/analysis/reset"))
            .await
            .unwrap();
        let snapshot = body_json(response).await;
        assert_eq!(snapshot["progress_percent"], 0);
        assert_eq!(snapshot["analysis_in_progress"], false);
        assert!(
            snapshot["steps"]
                .as_array()
                .unwrap()
                .iter()
                .all(|s| s["status"] == "pending")
        );
    }
}
