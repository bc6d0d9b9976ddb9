//! Form data document: the persisted shape shared by editor and renderer.
//!
//! JSON shape:
//! {
//!   "$schema": "<url>",                 // only in `Components::json`
//!   "id": "<uuid>",
//!   "stages":  { "<id>": { "id", "children": [rowId...] } },
//!   "rows":    { "<id>": { "id", "children": [columnId...], "config": {fieldset, legend, inputGroup}, "className" } },
//!   "columns": { "<id>": { "id", "children": [fieldId...], "config": {width} } },
//!   "fields":  { "<id>": { "id", "tag", "attrs", "config", "meta", "options"?, "conditions"? } }
//! }
//!
//! Records are kept as raw JSON so unknown keys survive a round trip; the
//! typed views below read the parts the core cares about.

use crate::Result;
use crate::components::ComponentType;
use crate::conditions::{self, ConditionRule};
use crate::data::loose;
use crate::diagnostics;
use anyhow::{Context, bail};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_SCHEMA_URL: &str = "https://cdn.jsdelivr.net/npm/formeo/dist/formData_schema.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormDataDocument {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub stages: IndexMap<String, Value>,

    #[serde(default)]
    pub rows: IndexMap<String, Value>,

    #[serde(default)]
    pub columns: IndexMap<String, Value>,

    #[serde(default)]
    pub fields: IndexMap<String, Value>,
}

impl FormDataDocument {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context(diagnostics::error_message("invalid form data JSON"))
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).context(diagnostics::error_message("invalid form data"))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to serialize form data")
    }

    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).context("failed to serialize form data")
    }

    pub fn collection(&self, kind: ComponentType) -> &IndexMap<String, Value> {
        match kind {
            ComponentType::Stage => &self.stages,
            ComponentType::Row => &self.rows,
            ComponentType::Column => &self.columns,
            ComponentType::Field => &self.fields,
        }
    }

    pub fn collection_mut(&mut self, kind: ComponentType) -> &mut IndexMap<String, Value> {
        match kind {
            ComponentType::Stage => &mut self.stages,
            ComponentType::Row => &mut self.rows,
            ComponentType::Column => &mut self.columns,
            ComponentType::Field => &mut self.fields,
        }
    }

    /// Layer a stored snapshot over this document; snapshot records win.
    pub fn merge_snapshot(&mut self, snapshot: FormDataDocument) {
        if !snapshot.id.is_empty() {
            self.id = snapshot.id;
        }
        let FormDataDocument {
            stages,
            rows,
            columns,
            fields,
            ..
        } = snapshot;
        self.stages.extend(stages);
        self.rows.extend(rows);
        self.columns.extend(columns);
        self.fields.extend(fields);
    }

    pub fn is_empty(&self) -> bool {
        ComponentType::ALL
            .iter()
            .all(|kind| self.collection(*kind).is_empty())
    }

    /// Ordered child ids of one record.
    pub fn children_of(&self, kind: ComponentType, id: &str) -> Vec<String> {
        self.collection(kind)
            .get(id)
            .and_then(|record| record.get("children"))
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn record<T: DeserializeOwned>(&self, kind: ComponentType, id: &str) -> Result<Option<T>> {
        let Some(raw) = self.collection(kind).get(id) else {
            return Ok(None);
        };
        let record = T::deserialize(raw).with_context(|| {
            diagnostics::error_message(format!("malformed {}.{}", kind.collection_name(), id))
        })?;
        Ok(Some(record))
    }

    pub fn stage(&self, id: &str) -> Result<Option<StageRecord>> {
        self.record(ComponentType::Stage, id)
    }

    pub fn row(&self, id: &str) -> Result<Option<RowRecord>> {
        self.record(ComponentType::Row, id)
    }

    pub fn column(&self, id: &str) -> Result<Option<ColumnRecord>> {
        self.record(ComponentType::Column, id)
    }

    pub fn field(&self, id: &str) -> Result<Option<FieldRecord>> {
        self.record(ComponentType::Field, id)
    }

    /// Reference check that reports instead of failing.
    ///
    /// Phase 1 collects children that point at missing records, phase 2
    /// collects records no parent lists (stages are roots and never orphans).
    pub fn integrity(&self) -> IntegrityReport {
        let mut report = IntegrityReport::default();

        // Phase 1: dangling child ids.
        for kind in ComponentType::ALL {
            let Some(child_kind) = kind.child() else {
                continue;
            };
            for id in self.collection(kind).keys() {
                for child in self.children_of(kind, id) {
                    if !self.collection(child_kind).contains_key(&child) {
                        report.dangling.push(DanglingRef {
                            parent: format!("{}.{}", kind.collection_name(), id),
                            child: format!("{}.{}", child_kind.collection_name(), child),
                        });
                    }
                }
            }
        }

        // Phase 2: records without a parent.
        for kind in ComponentType::ALL {
            let Some(parent_kind) = kind.parent() else {
                continue;
            };
            for id in self.collection(kind).keys() {
                let listed = self
                    .collection(parent_kind)
                    .keys()
                    .any(|parent| self.children_of(parent_kind, parent).contains(id));
                if !listed {
                    report
                        .orphans
                        .push(format!("{}.{}", kind.collection_name(), id));
                }
            }
        }

        for dangling in &report.dangling {
            diagnostics::warn(format!("{} lists missing {}", dangling.parent, dangling.child));
        }
        report
    }

    /// Strict variant of [`integrity`](Self::integrity) for callers that
    /// want broken references to fail.
    pub fn validate(&self) -> Result<()> {
        let report = self.integrity();
        if let Some(first) = report.dangling.first() {
            bail!(
                "{}",
                diagnostics::error_message(format!(
                    "{} references missing {} ({} dangling in total)",
                    first.parent,
                    first.child,
                    report.dangling.len()
                ))
            );
        }
        for kind in ComponentType::ALL {
            for (key, record) in self.collection(kind) {
                let id = record.get("id").and_then(Value::as_str);
                if id.is_some_and(|id| id != key) {
                    bail!(
                        "{}",
                        diagnostics::error_message(format!(
                            "{}.{} stores a different id {:?}",
                            kind.collection_name(),
                            key,
                            id.unwrap_or_default()
                        ))
                    );
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub dangling: Vec<DanglingRef>,
    pub orphans: Vec<String>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.dangling.is_empty() && self.orphans.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingRef {
    pub parent: String,
    pub child: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StageRecord {
    #[serde(default, deserialize_with = "loose::string")]
    pub id: String,

    #[serde(default, deserialize_with = "loose::items")]
    pub children: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowConfig {
    #[serde(default, deserialize_with = "loose::flag")]
    pub fieldset: bool,

    #[serde(default, deserialize_with = "loose::string")]
    pub legend: String,

    #[serde(default, deserialize_with = "loose::flag")]
    pub input_group: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowRecord {
    #[serde(default, deserialize_with = "loose::string")]
    pub id: String,

    #[serde(default, deserialize_with = "loose::items")]
    pub children: Vec<String>,

    #[serde(default, deserialize_with = "loose::record")]
    pub config: RowConfig,

    #[serde(default, deserialize_with = "loose::opt_string")]
    pub class_name: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ColumnConfig {
    #[serde(default, deserialize_with = "loose::opt_string")]
    pub width: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ColumnRecord {
    #[serde(default, deserialize_with = "loose::string")]
    pub id: String,

    #[serde(default, deserialize_with = "loose::items")]
    pub children: Vec<String>,

    #[serde(default, deserialize_with = "loose::record")]
    pub config: ColumnConfig,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    #[serde(default, deserialize_with = "loose::string")]
    pub label: String,

    #[serde(default, deserialize_with = "loose::flag")]
    pub hide_label: bool,

    #[serde(default, deserialize_with = "loose::opt_string")]
    pub control_id: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FieldMeta {
    #[serde(default, deserialize_with = "loose::opt_string")]
    pub group: Option<String>,

    #[serde(default, deserialize_with = "loose::opt_string")]
    pub icon: Option<String>,

    #[serde(default, deserialize_with = "loose::opt_string")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OptionRecord {
    #[serde(default, deserialize_with = "loose::string")]
    pub label: String,

    #[serde(default)]
    pub value: Value,

    #[serde(default, deserialize_with = "loose::flag")]
    pub selected: bool,

    #[serde(default, deserialize_with = "loose::flag")]
    pub checked: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FieldRecord {
    #[serde(default, deserialize_with = "loose::string")]
    pub id: String,

    #[serde(default = "default_tag", deserialize_with = "tag_or_input")]
    pub tag: String,

    #[serde(default, deserialize_with = "loose::map")]
    pub attrs: Map<String, Value>,

    #[serde(default, deserialize_with = "loose::record")]
    pub config: FieldConfig,

    #[serde(default, deserialize_with = "loose::record")]
    pub meta: FieldMeta,

    #[serde(default, deserialize_with = "loose::items")]
    pub options: Vec<OptionRecord>,

    /// Raw rules; see [`FieldRecord::rules`].
    #[serde(default, deserialize_with = "loose::items")]
    pub conditions: Vec<Value>,

    #[serde(default)]
    pub content: Option<Value>,
}

fn default_tag() -> String {
    "input".to_string()
}

fn tag_or_input<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let tag = loose::string(deserializer)?;
    Ok(if tag.is_empty() { default_tag() } else { tag })
}

impl FieldRecord {
    /// Control this field came from, config first.
    pub fn control_id(&self) -> Option<&str> {
        self.config
            .control_id
            .as_deref()
            .or(self.meta.id.as_deref())
    }

    pub fn input_type(&self) -> Option<&str> {
        self.attrs.get("type").and_then(Value::as_str)
    }

    /// Condition rules that parse; the rest are skipped with a warning.
    pub fn rules(&self) -> Vec<ConditionRule> {
        conditions::parse_rules(&self.conditions, &format!("fields.{}", self.id))
    }
}
