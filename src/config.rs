//! Editor options and per-collection configuration.

use crate::components::ComponentType;
use crate::data::path::deep_merge;
use crate::document::DEFAULT_SCHEMA_URL;
use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Configuration for one collection: `all` applies to every component, any
/// other key targets a control id or a component id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    #[serde(default)]
    pub all: Value,
    #[serde(flatten)]
    pub overrides: IndexMap<String, Value>,
}

impl CollectionConfig {
    /// Merge `all`, then the control's entry, then the component's own entry.
    pub fn resolve(&self, control_id: Option<&str>, id: &str) -> Value {
        let mut merged = Value::Object(Map::new());
        let layers = [
            Some(&self.all),
            control_id.and_then(|c| self.overrides.get(c)),
            self.overrides.get(id),
        ];
        for layer in layers.into_iter().flatten() {
            if layer.is_object() {
                deep_merge(&mut merged, layer);
            }
        }
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty() && self.all.as_object().is_none_or(Map::is_empty)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentsConfig {
    pub stages: CollectionConfig,
    pub rows: CollectionConfig,
    pub columns: CollectionConfig,
    pub fields: CollectionConfig,
}

impl ComponentsConfig {
    pub fn for_kind(&self, kind: ComponentType) -> &CollectionConfig {
        match kind {
            ComponentType::Stage => &self.stages,
            ComponentType::Row => &self.rows,
            ComponentType::Column => &self.columns,
            ComponentType::Field => &self.fields,
        }
    }
}

/// Palette adjustments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlOptions {
    /// Control ids to hide from the palette and refuse to instantiate.
    pub disable: Vec<String>,
    /// Additional control definitions (`{controlData, action, dependencies}`).
    pub elements: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorOptions {
    pub session_storage: bool,
    #[serde(rename = "schema")]
    pub schema_url: String,
    pub config: ComponentsConfig,
    /// Host-supplied data reachable through `external.*` addresses.
    pub external: Map<String, Value>,
    pub controls: ControlOptions,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            session_storage: false,
            schema_url: DEFAULT_SCHEMA_URL.to_string(),
            config: ComponentsConfig::default(),
            external: Map::new(),
            controls: ControlOptions::default(),
        }
    }
}

impl EditorOptions {
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).context("failed to parse editor options")
    }
}

/// Per-call overrides for `Components::load`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Overrides `EditorOptions::session_storage` when set.
    pub session_storage: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn resolve_layers_all_control_then_instance() {
        let config: CollectionConfig = serde_json::from_value(json!({
            "all": {"label": "Any", "hideLabel": false},
            "select": {"label": "Pick one"},
            "f1": {"hideLabel": true},
        }))
        .unwrap();

        assert_eq!(
            config.resolve(Some("select"), "f1"),
            json!({"label": "Pick one", "hideLabel": true})
        );
        assert_eq!(
            config.resolve(None, "other"),
            json!({"label": "Any", "hideLabel": false})
        );
        assert!(!config.is_empty());
        assert!(CollectionConfig::default().is_empty());
    }

    #[test]
    fn options_parse_with_defaults() {
        let options = EditorOptions::from_json(
            r#"{"sessionStorage": true, "controls": {"disable": ["upload"]}, "external": {"plan": "pro"}}"#,
        )
        .unwrap();
        assert!(options.session_storage);
        assert_eq!(options.controls.disable, vec!["upload"]);
        assert_eq!(options.schema_url, DEFAULT_SCHEMA_URL);
        assert_eq!(options.external.get("plan"), Some(&json!("pro")));

        assert!(EditorOptions::from_json("{").is_err());
    }
}
