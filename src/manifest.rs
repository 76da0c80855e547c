//! Agent manifest normalization and validation.
//!
//! An agent advertises its capabilities over `GET /manifest` in one of three
//! equivalent wire forms. [`normalize`] converges all three into the single
//! object form the rest of the system works with, and [`validate`] checks the
//! result against a fixed shape. Both are pure functions — no I/O happens
//! here, which keeps them trivial to unit test.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OrchestratorError;

/// A single capability advertised by an agent, in normalized object form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Capability {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_input_handler: Option<String>,
}

/// A normalized agent manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub capabilities: Vec<Capability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_spec: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_spec: Option<Value>,
}

impl Manifest {
    /// Look up a capability by name.
    pub fn capability(&self, name: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.name == name)
    }

    /// The capability this manifest advertises for use as the trailing audit
    /// step, if any: named `audit_trace`, marked with
    /// `custom_input_handler == "use_execution_trace"`, or simply containing
    /// the substring `audit`.
    pub fn audit_capability(&self) -> Option<&Capability> {
        self.capabilities.iter().find(|c| {
            c.name == "audit_trace"
                || c.custom_input_handler.as_deref() == Some("use_execution_trace")
                || c.name.contains("audit")
        })
    }
}

/// Accepts the three wire forms a manifest's `capabilities` field may take
/// and converges them to `[{name, description, custom_input_handler?}]`.
/// Entries lacking a non-empty name are dropped; later entries win on a name
/// collision within the same manifest.
fn normalize_capabilities(raw: &Value) -> Vec<Capability> {
    let mut by_name = std::collections::BTreeMap::new();
    let mut order = Vec::new();

    let mut push = |name: String, description: String, custom_input_handler: Option<String>| {
        if name.trim().is_empty() {
            return;
        }
        if !by_name.contains_key(&name) {
            order.push(name.clone());
        }
        by_name.insert(
            name.clone(),
            Capability {
                name,
                description,
                custom_input_handler,
            },
        );
    };

    match raw {
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(name) => push(name.clone(), String::new(), None),
                    Value::Object(obj) => {
                        let name = obj.get("name").and_then(Value::as_str).unwrap_or("");
                        let description = obj
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string();
                        let handler = obj
                            .get("custom_input_handler")
                            .and_then(Value::as_str)
                            .map(str::to_string);
                        push(name.to_string(), description, handler);
                    }
                    _ => {}
                }
            }
        }
        Value::Object(map) => {
            for (name, description) in map {
                let description = description.as_str().unwrap_or("").to_string();
                push(name.clone(), description, None);
            }
        }
        _ => {}
    }

    order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect()
}

/// Normalize a raw manifest payload into the canonical [`Manifest`] shape.
///
/// This step never fails on its own; malformed or missing fields simply
/// produce an empty `capabilities` list, which [`validate`] then rejects.
pub fn normalize(raw: &Value) -> Manifest {
    let capabilities = raw
        .get("capabilities")
        .map(normalize_capabilities)
        .unwrap_or_default();

    let input_spec = raw
        .get("input_spec")
        .filter(|v| v.is_object())
        .cloned();
    let output_spec = raw
        .get("output_spec")
        .filter(|v| v.is_object())
        .cloned();

    Manifest {
        capabilities,
        input_spec,
        output_spec,
    }
}

/// Normalize and validate a raw manifest payload fetched from an agent.
///
/// # Errors
///
/// Returns [`OrchestratorError::BadManifest`] if the normalized manifest has
/// no capabilities, or if a declared `input_spec`/`output_spec` is present in
/// the raw payload but not a JSON object.
pub fn validate(raw: &Value) -> Result<Manifest, OrchestratorError> {
    if let Some(spec) = raw.get("input_spec") {
        if !spec.is_object() {
            return Err(OrchestratorError::BadManifest(
                "input_spec must be an object".to_string(),
            ));
        }
    }
    if let Some(spec) = raw.get("output_spec") {
        if !spec.is_object() {
            return Err(OrchestratorError::BadManifest(
                "output_spec must be an object".to_string(),
            ));
        }
    }

    let manifest = normalize(raw);
    if manifest.capabilities.is_empty() {
        return Err(OrchestratorError::BadManifest(
            "manifest declares no usable capabilities".to_string(),
        ));
    }

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_list_of_strings() {
        let raw = json!({ "capabilities": ["fetch", "summarize"] });
        let manifest = validate(&raw).unwrap();
        assert_eq!(manifest.capabilities.len(), 2);
        assert_eq!(manifest.capabilities[0].name, "fetch");
        assert_eq!(manifest.capabilities[0].description, "");
    }

    #[test]
    fn normalizes_list_of_objects() {
        let raw = json!({
            "capabilities": [
                {"name": "fetch", "description": "fetches articles"},
                {"name": "audit_trace", "custom_input_handler": "use_execution_trace"}
            ]
        });
        let manifest = validate(&raw).unwrap();
        assert_eq!(manifest.capabilities[0].description, "fetches articles");
        assert_eq!(
            manifest.capabilities[1].custom_input_handler.as_deref(),
            Some("use_execution_trace")
        );
    }

    #[test]
    fn normalizes_mapping_form() {
        let raw = json!({ "capabilities": { "fetch": "fetches articles" } });
        let manifest = validate(&raw).unwrap();
        assert_eq!(manifest.capabilities[0].name, "fetch");
        assert_eq!(manifest.capabilities[0].description, "fetches articles");
    }

    #[test]
    fn drops_entries_without_a_name() {
        let raw = json!({ "capabilities": [{"description": "no name here"}, "ok"] });
        let manifest = validate(&raw).unwrap();
        assert_eq!(manifest.capabilities.len(), 1);
        assert_eq!(manifest.capabilities[0].name, "ok");
    }

    #[test]
    fn rejects_manifest_with_no_capabilities() {
        let raw = json!({ "capabilities": [] });
        assert!(validate(&raw).is_err());
    }

    #[test]
    fn rejects_non_object_spec() {
        let raw = json!({ "capabilities": ["do"], "input_spec": "not-an-object" });
        assert!(validate(&raw).is_err());
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = json!({ "capabilities": ["do", "audit"] });
        let once = normalize(&raw);
        let twice_raw = serde_json::to_value(&once).unwrap();
        let twice = normalize(&twice_raw);
        assert_eq!(once, twice);
    }

    #[test]
    fn finds_audit_capability_by_substring() {
        let raw = json!({ "capabilities": ["do", "audit_findings"] });
        let manifest = validate(&raw).unwrap();
        assert_eq!(
            manifest.audit_capability().map(|c| c.name.as_str()),
            Some("audit_findings")
        );
    }
}
