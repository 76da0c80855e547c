//! The orchestrator binary: wires configuration, the shared registry, LLM
//! client, and water accountant into an `axum` server.

use std::sync::Arc;

use clearflow::config::ClearFlowConfig;
use clearflow::orchestrator_http::{self, OrchestratorState};
use clearflow::water::WaterAccountant;
use clearflow::{planner, registry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = ClearFlowConfig::from_env();
    let registry = registry::shared(config.registry_snapshot_path.clone())?;
    let water = Arc::new(WaterAccountant::load(config.water_snapshot_path.clone()));
    let llm = planner::shared_llm_client(&config, "mistral-large-latest");

    let bind_addr = config.orchestrator_bind_addr.clone();
    let state = Arc::new(OrchestratorState {
        registry,
        llm,
        water,
        config,
    });

    let app = orchestrator_http::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    log::info!("orchestrator listening on {}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
