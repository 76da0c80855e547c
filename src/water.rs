//! The Water Accountant: a single process-wide "AI waterdrops" counter,
//! persisted to JSON. Grounded on the original project's `tools/water.py`
//! (lazy-load on first use, increment in memory, persist after every
//! increment).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Serialize, Deserialize)]
struct WaterSnapshot {
    aiwaterdrops_consumed: f64,
}

/// Process-wide, monotonically non-decreasing water counter.
///
/// A `Mutex<f64>` rather than an atomic: increments need to read-modify-write
/// alongside a file write, and the combination has to be observed as one
/// step by concurrent callers.
pub struct WaterAccountant {
    consumed: Mutex<f64>,
    snapshot_path: PathBuf,
}

impl WaterAccountant {
    /// Load the counter from `snapshot_path`, starting at `0.0` if the file
    /// does not exist or cannot be parsed.
    pub fn load(snapshot_path: impl Into<PathBuf>) -> Self {
        let snapshot_path = snapshot_path.into();
        let consumed = std::fs::read_to_string(&snapshot_path)
            .ok()
            .and_then(|raw| serde_json::from_str::<WaterSnapshot>(&raw).ok())
            .map(|s| s.aiwaterdrops_consumed)
            .unwrap_or(0.0);

        Self {
            consumed: Mutex::new(consumed),
            snapshot_path,
        }
    }

    /// Current total, in waterdrops.
    pub async fn get(&self) -> f64 {
        *self.consumed.lock().await
    }

    /// Add `amount` to the running total and persist the new value.
    /// `amount` is never negative in practice; callers pass the fixed
    /// per-operation costs for each kind of work performed.
    pub async fn increment(&self, amount: f64) -> f64 {
        let mut guard = self.consumed.lock().await;
        *guard += amount;
        let total = *guard;

        if let Err(e) = self.persist(total) {
            log::warn!("failed to persist water snapshot: {}", e);
        }

        total
    }

    fn persist(&self, total: f64) -> std::io::Result<()> {
        let snapshot = WaterSnapshot {
            aiwaterdrops_consumed: total,
        };
        let body = serde_json::to_vec_pretty(&snapshot)?;
        let tmp_path = self.snapshot_path.with_extension("tmp");
        std::fs::write(&tmp_path, body)?;
        std::fs::rename(&tmp_path, &self.snapshot_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_at_zero_without_a_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let accountant = WaterAccountant::load(dir.path().join("water.json"));
        assert_eq!(accountant.get().await, 0.0);
    }

    #[tokio::test]
    async fn increments_are_monotonic_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("water.json");
        let accountant = WaterAccountant::load(&path);

        accountant.increment(0.2).await;
        let total = accountant.increment(1.0).await;
        assert!((total - 1.2).abs() < f64::EPSILON);

        let reloaded = WaterAccountant::load(&path);
        assert!((reloaded.get().await - 1.2).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn corrupt_snapshot_falls_back_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("water.json");
        std::fs::write(&path, "not json").unwrap();

        let accountant = WaterAccountant::load(&path);
        assert_eq!(accountant.get().await, 0.0);
    }
}
