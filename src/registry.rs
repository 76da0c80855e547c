//! In-memory agent registry with a persisted JSON snapshot.
//!
//! The registry is the orchestrator's only mutable, shared state besides the
//! water counter. Reads are lock-free relative to other reads; writes
//! (`register`) take an exclusive lock just long enough to swap the record
//! in, following the same `tokio::sync::RwLock<HashMap<..>>` shape the
//! teacher crate uses for its tool registries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::error::OrchestratorError;
use crate::manifest::{self, Manifest};

/// A registered agent: where it lives and what it can do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub base_url: String,
    pub manifest: Manifest,
    pub registered_at: DateTime<Utc>,
}

impl AgentRecord {
    /// Capability names advertised by this record, in manifest order.
    pub fn capability_names(&self) -> Vec<String> {
        self.manifest
            .capabilities
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    base_url: String,
    manifest: Manifest,
    capabilities: Vec<String>,
    registered_at: DateTime<Utc>,
}

/// Shared, reader-writer-locked registry of [`AgentRecord`]s.
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentRecord>>,
    snapshot_path: PathBuf,
    client: reqwest::Client,
}

impl AgentRegistry {
    /// Create an empty registry that will persist to `snapshot_path`.
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            snapshot_path: snapshot_path.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Load a registry from an existing snapshot file, or start empty if one
    /// does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::PersistenceError`] if the file exists but
    /// is not valid JSON in the expected shape — a corrupt snapshot is a
    /// fatal startup error.
    pub fn load(snapshot_path: impl Into<PathBuf>) -> Result<Self, OrchestratorError> {
        let snapshot_path = snapshot_path.into();
        let agents = if snapshot_path.exists() {
            let raw = std::fs::read_to_string(&snapshot_path).map_err(|e| {
                OrchestratorError::PersistenceError(format!("reading snapshot: {}", e))
            })?;
            let entries: HashMap<String, SnapshotEntry> = serde_json::from_str(&raw)
                .map_err(|e| {
                    OrchestratorError::PersistenceError(format!("corrupt snapshot: {}", e))
                })?;
            entries
                .into_iter()
                .map(|(name, entry)| {
                    (
                        name,
                        AgentRecord {
                            base_url: entry.base_url,
                            manifest: entry.manifest,
                            registered_at: entry.registered_at,
                        },
                    )
                })
                .collect()
        } else {
            HashMap::new()
        };

        Ok(Self {
            agents: RwLock::new(agents),
            snapshot_path,
            client: reqwest::Client::new(),
        })
    }

    /// Register (or re-register) an agent by fetching and validating its
    /// manifest.
    ///
    /// Water cost: +0.2 (charged by the caller via [`crate::water::WaterAccountant`]).
    pub async fn register(
        &self,
        name: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<(), OrchestratorError> {
        let response = self
            .client
            .get(format!("{}/manifest", base_url.trim_end_matches('/')))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| OrchestratorError::UnreachableAgent {
                agent: name.to_string(),
                detail: e.to_string(),
            })?;

        let raw: Value = response
            .json()
            .await
            .map_err(|e| OrchestratorError::BadManifest(format!("invalid JSON: {}", e)))?;

        let manifest = manifest::validate(&raw)?;

        let record = AgentRecord {
            base_url: base_url.to_string(),
            manifest,
            registered_at: Utc::now(),
        };

        {
            let mut agents = self.agents.write().await;
            agents.insert(name.to_string(), record);
        }

        self.persist().await
    }

    /// List all registered agent names alongside their base URL and
    /// capability names.
    pub async fn list(&self) -> HashMap<String, (String, Vec<String>)> {
        let agents = self.agents.read().await;
        agents
            .iter()
            .map(|(name, record)| {
                (
                    name.clone(),
                    (record.base_url.clone(), record.capability_names()),
                )
            })
            .collect()
    }

    /// Fetch the manifest for a single agent.
    pub async fn get_manifest(&self, name: &str) -> Result<Manifest, OrchestratorError> {
        let agents = self.agents.read().await;
        agents
            .get(name)
            .map(|r| r.manifest.clone())
            .ok_or_else(|| OrchestratorError::NotFound(name.to_string()))
    }

    /// A consistent, point-in-time snapshot of every registered record.
    ///
    /// Used by the Planner/Executor so that a single plan execution sees a
    /// stable view even if another request re-registers an agent
    /// concurrently.
    pub async fn snapshot(&self) -> HashMap<String, AgentRecord> {
        self.agents.read().await.clone()
    }

    /// All raw manifests, keyed by agent name.
    pub async fn get_all_manifests(&self) -> HashMap<String, Manifest> {
        self.agents
            .read()
            .await
            .iter()
            .map(|(name, record)| (name.clone(), record.manifest.clone()))
            .collect()
    }

    /// Pure scan over the registry producing every `(from, to)` pair whose
    /// `output_spec`/`input_spec` share a top-level `type`. Self-pairs are
    /// excluded.
    pub async fn detect_connections(&self) -> Vec<Value> {
        let agents = self.agents.read().await;
        let mut connections = Vec::new();

        for (from_name, from_record) in agents.iter() {
            let Some(out_spec) = &from_record.manifest.output_spec else {
                continue;
            };
            for (to_name, to_record) in agents.iter() {
                if from_name == to_name {
                    continue;
                }
                let Some(in_spec) = &to_record.manifest.input_spec else {
                    continue;
                };
                if specs_compatible(out_spec, in_spec) {
                    connections.push(json!({
                        "from": from_name,
                        "to": to_name,
                        "reason": format!(
                            "Output from '{}' matches input of '{}'",
                            from_name, to_name
                        ),
                    }));
                }
            }
        }

        connections
    }

    /// Fan out `GET {base_url}/metrics` to every registered agent. Per-agent
    /// failures are captured as `{error}` and never abort the aggregate.
    pub async fn aggregate_metrics(&self, timeout: Duration) -> HashMap<String, Value> {
        let records: Vec<(String, String)> = {
            let agents = self.agents.read().await;
            agents
                .iter()
                .map(|(name, r)| (name.clone(), r.base_url.clone()))
                .collect()
        };

        let mut results = HashMap::new();
        for (name, base_url) in records {
            let outcome = self
                .client
                .get(format!("{}/metrics", base_url.trim_end_matches('/')))
                .timeout(timeout)
                .send()
                .await;

            let value = match outcome {
                Ok(response) => match response.json::<Value>().await {
                    Ok(v) => v,
                    Err(e) => json!({ "error": format!("Failed to fetch metrics: {}", e) }),
                },
                Err(e) => json!({ "error": format!("Failed to fetch metrics: {}", e) }),
            };
            results.insert(name, value);
        }

        results
    }

    async fn persist(&self) -> Result<(), OrchestratorError> {
        let snapshot: HashMap<String, SnapshotEntry> = {
            let agents = self.agents.read().await;
            agents
                .iter()
                .map(|(name, record)| {
                    (
                        name.clone(),
                        SnapshotEntry {
                            base_url: record.base_url.clone(),
                            manifest: record.manifest.clone(),
                            capabilities: record.capability_names(),
                            registered_at: record.registered_at,
                        },
                    )
                })
                .collect()
        };

        write_json_atomically(&self.snapshot_path, &snapshot)
            .map_err(|e| OrchestratorError::PersistenceError(e.to_string()))
    }
}

fn specs_compatible(output_spec: &Value, input_spec: &Value) -> bool {
    output_spec.get("type") == input_spec.get("type") && output_spec.get("type").is_some()
}

/// Write `value` to `path` via a temp-file-then-rename, so readers never
/// observe a partially written snapshot.
fn write_json_atomically<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    let body = serde_json::to_vec_pretty(value)?;
    std::fs::write(&tmp_path, body)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Build a process-wide registry from configuration, wrapped for cheap
/// sharing across Axum handlers.
pub fn shared(snapshot_path: impl Into<PathBuf>) -> Result<Arc<AgentRegistry>, OrchestratorError> {
    Ok(Arc::new(AgentRegistry::load(snapshot_path)?))
}
