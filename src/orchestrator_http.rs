//! The orchestrator's HTTP surface: thin `axum` adapters over the core.
//!
//! No business logic lives here — every handler parses its request, calls
//! into [`crate::registry`], [`crate::planner`], or [`crate::executor`], and
//! maps the result (or core error) to a response.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::ClearFlowConfig;
use crate::error::OrchestratorError;
use crate::executor;
use crate::llm_client::LlmClient;
use crate::planner;
use crate::registry::AgentRegistry;
use crate::water::WaterAccountant;

/// Shared state handed to every orchestrator route.
pub struct OrchestratorState {
    pub registry: Arc<AgentRegistry>,
    pub llm: Arc<dyn LlmClient>,
    pub water: Arc<WaterAccountant>,
    pub config: ClearFlowConfig,
}

pub fn router(state: Arc<OrchestratorState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/register_agent", post(register_agent))
        .route("/agents", get(list_agents))
        .route("/agent_manifest/{name}", get(agent_manifest))
        .route("/agents/connections", get(agent_connections))
        .route("/agents/metrics", get(agent_metrics))
        .route("/agents/raw", get(agents_raw))
        .route("/plan", post(plan_goal))
        .route("/execute_plan", post(execute_plan))
        .route("/run_goal", post(run_goal))
        .route("/water/total", get(water_total))
        .with_state(state)
}

async fn health(State(state): State<Arc<OrchestratorState>>) -> Json<Value> {
    let registered_agents: Vec<String> = state.registry.list().await.into_keys().collect();
    Json(json!({ "status": "ok", "registered_agents": registered_agents }))
}

#[derive(Deserialize)]
struct RegisterAgentRequest {
    name: String,
    base_url: String,
}

async fn register_agent(
    State(state): State<Arc<OrchestratorState>>,
    Json(request): Json<RegisterAgentRequest>,
) -> Result<Json<Value>, OrchestratorError> {
    if request.name.trim().is_empty() {
        return Err(OrchestratorError::MissingField("name".to_string()));
    }
    if request.base_url.trim().is_empty() {
        return Err(OrchestratorError::MissingField("base_url".to_string()));
    }

    state
        .registry
        .register(&request.name, &request.base_url, state.config.register_timeout)
        .await?;
    state.water.increment(0.2).await;

    Ok(Json(json!({
        "message": format!("agent '{}' registered", request.name)
    })))
}

async fn list_agents(State(state): State<Arc<OrchestratorState>>) -> Json<Value> {
    let agents: Value = state
        .registry
        .list()
        .await
        .into_iter()
        .map(|(name, (base_url, capabilities))| {
            (name, json!({ "base_url": base_url, "capabilities": capabilities }))
        })
        .collect::<serde_json::Map<_, _>>()
        .into();
    Json(json!({ "agents": agents }))
}

async fn agent_manifest(
    State(state): State<Arc<OrchestratorState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, OrchestratorError> {
    let manifest = state.registry.get_manifest(&name).await?;
    Ok(Json(serde_json::to_value(manifest).unwrap_or(Value::Null)))
}

async fn agent_connections(State(state): State<Arc<OrchestratorState>>) -> Json<Value> {
    let connections = state.registry.detect_connections().await;
    Json(json!({ "connections": connections }))
}

async fn agent_metrics(State(state): State<Arc<OrchestratorState>>) -> Json<Value> {
    let metrics = state.registry.aggregate_metrics(state.config.metrics_timeout).await;
    Json(serde_json::to_value(metrics).unwrap_or(Value::Null))
}

async fn agents_raw(State(state): State<Arc<OrchestratorState>>) -> Json<Value> {
    let manifests = state.registry.get_all_manifests().await;
    Json(serde_json::to_value(manifests).unwrap_or(Value::Null))
}

#[derive(Deserialize)]
struct GoalRequest {
    goal: String,
}

async fn plan_goal(
    State(state): State<Arc<OrchestratorState>>,
    Json(request): Json<GoalRequest>,
) -> Result<Json<Value>, OrchestratorError> {
    if request.goal.trim().is_empty() {
        return Err(OrchestratorError::MissingField("goal".to_string()));
    }

    let plan_text = planner::plan(&request.goal, &state.registry, state.llm.as_ref(), &state.config).await?;
    state.water.increment(1.0).await;

    Ok(Json(json!({
        "goal": request.goal,
        "plan": plan_text,
        "result": Value::Null,
    })))
}

#[derive(Deserialize)]
struct ExecutePlanRequest {
    plan: String,
}

async fn execute_plan(
    State(state): State<Arc<OrchestratorState>>,
    Json(request): Json<ExecutePlanRequest>,
) -> Result<Json<Value>, OrchestratorError> {
    if request.plan.trim().is_empty() {
        return Err(OrchestratorError::MissingField("plan".to_string()));
    }

    let client = reqwest::Client::new();
    let trace = executor::execute(&request.plan, &state.registry, &client, state.config.execute_timeout).await;
    state.water.increment(0.02).await;

    Ok(Json(serde_json::to_value(trace).unwrap_or(Value::Null)))
}

async fn run_goal(
    State(state): State<Arc<OrchestratorState>>,
    Json(request): Json<GoalRequest>,
) -> Result<Json<Value>, OrchestratorError> {
    if request.goal.trim().is_empty() {
        return Err(OrchestratorError::MissingField("goal".to_string()));
    }

    let plan_text = planner::plan(&request.goal, &state.registry, state.llm.as_ref(), &state.config).await?;
    state.water.increment(1.0).await;

    let client = reqwest::Client::new();
    let trace = executor::execute(&plan_text, &state.registry, &client, state.config.execute_timeout).await;
    state.water.increment(0.02).await;

    Ok(Json(json!({
        "goal": request.goal,
        "plan": plan_text,
        "result": trace,
    })))
}

async fn water_total(State(state): State<Arc<OrchestratorState>>) -> Json<Value> {
    let total = state.water.get().await;
    Json(json!({ "breakdown": {}, "total_waterdrops": total }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::LlmError;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    struct StubLlm;

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn chat(
            &self,
            _messages: &[crate::llm_client::ChatMessage],
            _temperature: f32,
            _timeout: Duration,
        ) -> Result<String, LlmError> {
            Err(LlmError("stub: no LLM configured in this test".to_string()))
        }
    }

    struct InfeasibleLlm;

    #[async_trait]
    impl LlmClient for InfeasibleLlm {
        async fn chat(
            &self,
            _messages: &[crate::llm_client::ChatMessage],
            _temperature: f32,
            _timeout: Duration,
        ) -> Result<String, LlmError> {
            Ok(r#"{"feasible": false}"#.to_string())
        }
    }

    fn test_state() -> Arc<OrchestratorState> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(OrchestratorState {
            registry: Arc::new(AgentRegistry::new(dir.path().join("agents.json"))),
            llm: Arc::new(StubLlm),
            water: Arc::new(WaterAccountant::load(dir.path().join("water.json"))),
            config: ClearFlowConfig::from_env(),
        })
    }

    fn infeasible_state() -> Arc<OrchestratorState> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(OrchestratorState {
            registry: Arc::new(AgentRegistry::new(dir.path().join("agents.json"))),
            llm: Arc::new(InfeasibleLlm),
            water: Arc::new(WaterAccountant::load(dir.path().join("water.json"))),
            config: ClearFlowConfig::from_env(),
        })
    }

    #[tokio::test]
    async fn health_reports_empty_registry() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn register_agent_rejects_missing_name() {
        let app = router(test_state());
        let body = Body::from(json!({ "name": "", "base_url": "http://x" }).to_string());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/register_agent")
                    .header("content-type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn agent_manifest_for_unknown_agent_is_404() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/agent_manifest/ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn plan_rejects_missing_goal() {
        let app = router(test_state());
        let body = Body::from(json!({ "goal": "" }).to_string());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/plan")
                    .header("content-type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn plan_returns_422_when_feasibility_gate_refuses() {
        let app = router(infeasible_state());
        let body = Body::from(json!({ "goal": "build a time machine" }).to_string());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/plan")
                    .header("content-type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn water_total_starts_at_zero() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/water/total").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
