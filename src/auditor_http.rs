//! The auditor's HTTP surface: `POST /run` and `POST /execute`, plus the
//! same thin `/manifest`, `/health`, `/capabilities`, `/metrics` agent
//! contract every worker agent exposes (the auditor is itself an agent from
//! the orchestrator's point of view).

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::auditor;
use crate::config::ClearFlowConfig;
use crate::error::AuditorError;
use crate::llm_client::LlmClient;
use crate::trace::ExecutionTrace;
use crate::water::WaterAccountant;

pub struct AuditorState {
    pub llm: Arc<dyn LlmClient>,
    pub water: Arc<WaterAccountant>,
    pub config: ClearFlowConfig,
}

const AUDITOR_CAPABILITIES: &[&str] = &["audit_trace"];

pub fn router(state: Arc<AuditorState>) -> Router {
    Router::new()
        .route("/manifest", get(manifest))
        .route("/health", get(health))
        .route("/capabilities", get(capabilities))
        .route("/metrics", get(metrics))
        .route("/run", post(run_audit))
        .route("/execute", post(execute))
        .with_state(state)
}

async fn manifest() -> Json<Value> {
    Json(json!({
        "capabilities": [{
            "name": "audit_trace",
            "description": "Audits an execution trace against per-agent policies.",
            "custom_input_handler": "use_execution_trace",
        }],
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn capabilities() -> Json<Value> {
    Json(json!({ "capabilities": AUDITOR_CAPABILITIES }))
}

async fn metrics(State(state): State<Arc<AuditorState>>) -> Json<Value> {
    Json(json!({ "aiwaterdrops_consumed": state.water.get().await }))
}

async fn run_audit(
    State(state): State<Arc<AuditorState>>,
    Json(trace): Json<ExecutionTrace>,
) -> Result<Json<auditor::AuditResult>, AuditorError> {
    let result = auditor::run(
        &trace,
        state.llm.as_ref(),
        state.config.policy_timeout,
        state.config.llm_audit_timeout,
    )
    .await?;

    let cost = 6.0 + 0.5 * trace.steps.len() as f64;
    state.water.increment(cost).await;

    Ok(Json(result))
}

#[derive(serde::Deserialize)]
struct ExecuteRequest {
    capability: String,
    input: ExecutionTrace,
}

async fn execute(
    State(state): State<Arc<AuditorState>>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<auditor::AuditResult>, AuditorError> {
    if request.capability != "audit_trace" {
        return Err(AuditorError::UnknownCapability(request.capability));
    }

    let result = auditor::run(
        &request.input,
        state.llm.as_ref(),
        state.config.policy_timeout,
        state.config.llm_audit_timeout,
    )
    .await?;

    let cost = 6.0 + 0.5 * request.input.steps.len() as f64;
    state.water.increment(cost).await;

    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{ChatMessage, LlmError};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    struct StubLlm;

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _temperature: f32,
            _timeout: Duration,
        ) -> Result<String, LlmError> {
            Err(LlmError("stub: no LLM configured in this test".to_string()))
        }
    }

    fn test_state() -> Arc<AuditorState> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(AuditorState {
            llm: Arc::new(StubLlm),
            water: Arc::new(WaterAccountant::load(dir.path().join("water.json"))),
            config: ClearFlowConfig::from_env_for_auditor(),
        })
    }

    #[tokio::test]
    async fn execute_rejects_unknown_capability() {
        let app = router(test_state());
        let body = Body::from(
            json!({ "capability": "something_else", "input": {"steps": [], "final_output": null, "total_waterdrops_used": 0.0} })
                .to_string(),
        );
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/execute")
                    .header("content-type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn run_rejects_trace_missing_base_url() {
        let app = router(test_state());
        let body = Body::from(
            json!({
                "steps": [{"step": 1, "agent": "A", "capability": "do", "output": {}}],
                "final_output": {},
                "total_waterdrops_used": 0.0,
            })
            .to_string(),
        );
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/run")
                    .header("content-type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn manifest_advertises_audit_trace() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/manifest").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
