//! Error taxonomy shared by the orchestrator and auditor cores.
//!
//! Every fallible core operation returns one of these two enums rather than a
//! boxed `dyn Error`; HTTP adapters map each variant to a status code exactly
//! once, at the boundary (see [`axum::response::IntoResponse`] impls below).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

/// Errors raised by the orchestrator core (registry, planner, executor).
#[derive(Debug)]
pub enum OrchestratorError {
    /// A required field was missing or empty in a client request.
    MissingField(String),
    /// An agent name was referenced that is not in the registry.
    NotFound(String),
    /// A worker agent could not be reached over HTTP.
    UnreachableAgent { agent: String, detail: String },
    /// An agent's manifest failed schema validation.
    BadManifest(String),
    /// The LLM explicitly refused the goal as infeasible.
    UnsupportedGoal(String),
    /// The feasibility gate judged the goal infeasible against the catalog.
    FeasibilityRefused(String),
    /// The plan was empty after validation and repair.
    NoExecutableSteps(String),
    /// The LLM call failed or its response could not be coerced to JSON.
    LLMError(String),
    /// The registry snapshot could not be persisted to disk.
    PersistenceError(String),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorError::MissingField(field) => write!(f, "missing field: {}", field),
            OrchestratorError::NotFound(name) => write!(f, "agent not found: {}", name),
            OrchestratorError::UnreachableAgent { agent, detail } => {
                write!(f, "cannot reach agent '{}': {}", agent, detail)
            }
            OrchestratorError::BadManifest(detail) => write!(f, "manifest invalid: {}", detail),
            OrchestratorError::UnsupportedGoal(reason) => {
                write!(f, "unsupported goal: {}", reason)
            }
            OrchestratorError::FeasibilityRefused(reason) => write!(f, "{}", reason),
            OrchestratorError::NoExecutableSteps(reason) => write!(f, "{}", reason),
            OrchestratorError::LLMError(detail) => write!(f, "LLM error: {}", detail),
            OrchestratorError::PersistenceError(detail) => {
                write!(f, "failed to persist registry: {}", detail)
            }
        }
    }
}

impl std::error::Error for OrchestratorError {}

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let status = match &self {
            OrchestratorError::MissingField(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::UnreachableAgent { .. } => StatusCode::BAD_REQUEST,
            OrchestratorError::BadManifest(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::UnsupportedGoal(_) => StatusCode::UNPROCESSABLE_ENTITY,
            OrchestratorError::FeasibilityRefused(_) => StatusCode::UNPROCESSABLE_ENTITY,
            OrchestratorError::NoExecutableSteps(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OrchestratorError::LLMError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OrchestratorError::PersistenceError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Errors raised by the auditor core.
#[derive(Debug)]
pub enum AuditorError {
    /// A trace step was missing `_agent_base_url` in both its input and output.
    PolicyDiscoveryError(String),
    /// The LLM audit call failed or its response could not be coerced.
    LLMError(String),
    /// An unknown `capability` was dispatched to `/execute`.
    UnknownCapability(String),
}

impl fmt::Display for AuditorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditorError::PolicyDiscoveryError(detail) => write!(f, "{}", detail),
            AuditorError::LLMError(detail) => write!(f, "LLM audit failed: {}", detail),
            AuditorError::UnknownCapability(name) => write!(f, "unknown capability: {}", name),
        }
    }
}

impl std::error::Error for AuditorError {}

impl IntoResponse for AuditorError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuditorError::PolicyDiscoveryError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AuditorError::LLMError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuditorError::UnknownCapability(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
