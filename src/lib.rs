// src/lib.rs

//! `clearflow` is a multi-agent orchestration platform. A central [`orchestrator`]
//! registers independent HTTP agents, turns a natural-language goal into an
//! executable [`plan`] with an LLM, runs the plan step by step with the
//! [`executor`], and an [`auditor`] scores the resulting trace against
//! per-agent policies.
//!
//! The crate is split into a library (this crate) consumed by two thin
//! binaries, `orchestrator` and `auditor` (see `src/bin/`), so that the core
//! logic is fully testable without a running HTTP server.

pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod llm_client;
pub mod manifest;
pub mod plan;
pub mod planner;
pub mod registry;
pub mod trace;
pub mod water;

pub mod auditor;
pub mod auditor_http;
pub mod orchestrator_http;

pub use config::ClearFlowConfig;
pub use error::{AuditorError, OrchestratorError};
pub use registry::AgentRegistry;
