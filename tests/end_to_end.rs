//! Black-box coverage of both HTTP surfaces: a real `axum::serve` server per
//! process under test, driven over the network with `reqwest` rather than
//! calling handlers directly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{routing::get, routing::post, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use clearflow::auditor_http::{self, AuditorState};
use clearflow::config::ClearFlowConfig;
use clearflow::llm_client::{ChatMessage, LlmClient, LlmError};
use clearflow::orchestrator_http::{self, OrchestratorState};
use clearflow::registry::AgentRegistry;
use clearflow::water::WaterAccountant;

struct ScriptedLlm {
    reply: String,
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _temperature: f32,
        _timeout: Duration,
    ) -> Result<String, LlmError> {
        Ok(self.reply.clone())
    }
}

async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A minimal worker agent: `/manifest`, `/execute`, `/audit_policy`.
async fn spawn_worker_agent() -> String {
    let app = Router::new()
        .route(
            "/manifest",
            get(|| async {
                Json(json!({
                    "capabilities": [{"name": "fetch", "description": "fetches articles"}],
                }))
            }),
        )
        .route(
            "/execute",
            post(|Json(_body): Json<Value>| async {
                Json(json!({ "articles": ["a", "b"] }))
            }),
        )
        .route(
            "/audit_policy",
            get(|| async { Json(json!({ "rules": [{"id": "R1", "target": "output.articles"}] })) }),
        );
    spawn(app).await
}

#[tokio::test]
async fn register_plan_and_execute_round_trip() {
    let worker_url = spawn_worker_agent().await;

    let dir = tempfile::tempdir().unwrap();
    let plan_text = "1. fetcher \u{2192} fetch";
    let orchestrator_state = Arc::new(OrchestratorState {
        registry: Arc::new(AgentRegistry::new(dir.path().join("agents.json"))),
        llm: Arc::new(ScriptedLlm {
            reply: plan_text.to_string(),
        }),
        water: Arc::new(WaterAccountant::load(dir.path().join("water.json"))),
        config: ClearFlowConfig::from_env(),
    });
    let base_url = spawn(orchestrator_http::router(orchestrator_state)).await;

    let client = reqwest::Client::new();

    let register = client
        .post(format!("{}/register_agent", base_url))
        .json(&json!({ "name": "fetcher", "base_url": worker_url }))
        .send()
        .await
        .unwrap();
    assert!(register.status().is_success());

    let agents: Value = client
        .get(format!("{}/agents", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(agents["agents"]["fetcher"].is_object());

    let execute_response: Value = client
        .post(format!("{}/execute_plan", base_url))
        .json(&json!({ "plan": "1. fetcher \u{2192} fetch" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(execute_response["steps"][0]["agent"], "fetcher");
    assert_eq!(execute_response["final_output"]["articles"][0], "a");

    let water: Value = client
        .get(format!("{}/water/total", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(water["total_waterdrops"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn auditor_run_discovers_policy_and_returns_verdict() {
    let worker_url = spawn_worker_agent().await;

    let dir = tempfile::tempdir().unwrap();
    let audit_reply = json!({
        "status": "ok",
        "summary": "1/1 agents validated",
        "details": [{"agent": "fetcher", "status": "valid", "comment": "ok", "score": 0.9}],
    })
    .to_string();

    let auditor_state = Arc::new(AuditorState {
        llm: Arc::new(ScriptedLlm { reply: audit_reply }),
        water: Arc::new(WaterAccountant::load(dir.path().join("water.json"))),
        config: ClearFlowConfig::from_env_for_auditor(),
    });
    let base_url = spawn(auditor_http::router(auditor_state)).await;

    let client = reqwest::Client::new();
    let trace = json!({
        "steps": [{
            "step": 1,
            "agent": "fetcher",
            "capability": "fetch",
            "input_used": {"_agent_base_url": worker_url},
            "output": {"articles": ["a"]},
        }],
        "final_output": {"articles": ["a"]},
        "total_waterdrops_used": 0.0,
    });

    let result: Value = client
        .post(format!("{}/run", base_url))
        .json(&trace)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(result["status"], "ok");
    assert_eq!(result["details"][0]["agent"], "fetcher");

    let metrics: Value = client
        .get(format!("{}/metrics", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(metrics["aiwaterdrops_consumed"].as_f64().unwrap() > 0.0);
}
