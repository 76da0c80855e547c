//! The auditor binary: wires configuration, LLM client, and water
//! accountant into an `axum` server exposing the agent contract plus
//! `/run` and `/execute`.

use std::sync::Arc;

use clearflow::auditor_http::{self, AuditorState};
use clearflow::config::ClearFlowConfig;
use clearflow::planner;
use clearflow::water::WaterAccountant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = ClearFlowConfig::from_env_for_auditor();
    let water = Arc::new(WaterAccountant::load(config.water_snapshot_path.clone()));
    let llm = planner::shared_llm_client(&config, "mistral-large-latest");

    let bind_addr = config.auditor_bind_addr.clone();
    let state = Arc::new(AuditorState { llm, water, config });

    let app = auditor_http::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    log::info!("auditor listening on {}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
