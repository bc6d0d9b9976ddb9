//! A single tree node: stage, row, column or field.

use super::{ComponentKey, ComponentType};
use crate::addr::split_path;
use crate::conditions::{self, ConditionRule};
use crate::data::{Data, EventBus, path};
use crate::diagnostics;
use serde_json::{Value, json};
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct Component {
    kind: ComponentType,
    id: String,
    /// Maintained by the registry on every structural change.
    parent: Option<String>,
    data: Data,
}

impl Component {
    /// Build a component from raw data layered over the type defaults.
    pub(crate) fn new(
        kind: ComponentType,
        id: String,
        data: Value,
        events: Option<Rc<EventBus>>,
    ) -> Self {
        let mut merged = kind.default_data();
        path::deep_merge(&mut merged, &data);
        path::set_path(&mut merged, &["id"], json!(id));
        if kind.child().is_some() {
            let children_ok = merged
                .get("children")
                .and_then(Value::as_array)
                .is_some_and(|c| c.iter().all(Value::is_string));
            if !children_ok {
                diagnostics::warn(format!(
                    "{}.{} has malformed children, resetting",
                    kind.collection_name(),
                    id
                ));
                path::set_path(&mut merged, &["children"], json!([]));
            }
        }

        let key = ComponentKey::new(kind, id.clone());
        let mut store = Data::new(key.to_string(), merged);
        if let Some(bus) = events {
            store = store.with_events(bus, kind.updated_event());
        }

        Self {
            kind,
            id,
            parent: None,
            data: store,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ComponentType {
        self.kind
    }

    pub fn key(&self) -> ComponentKey {
        ComponentKey::new(self.kind, self.id.clone())
    }

    /// `fields.<id>` style address.
    pub fn address(&self) -> String {
        self.key().to_string()
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub(crate) fn set_parent(&mut self, parent: Option<String>) {
        self.parent = parent;
    }

    pub fn data(&self) -> &Value {
        self.data.value()
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.data.get(path)
    }

    /// Write into this component's data. The id is immutable; writes that
    /// target it are ignored.
    pub fn set(&mut self, path: &str, value: Value) -> &Value {
        let segments = split_path(path);
        match segments.first().map(String::as_str) {
            Some("id") => {
                diagnostics::warn(format!("ignored write to id of {}", self.address()));
                self.data.value()
            }
            None => {
                let mut value = value;
                if let Some(obj) = value.as_object_mut() {
                    obj.insert("id".to_string(), json!(self.id));
                }
                self.data.set("", value)
            }
            Some(_) => self.data.set(path, value),
        }
    }

    /// Delete a nested property or array item, emitting a `removed` change.
    pub(crate) fn unset(&mut self, path: &str) -> &Value {
        self.data.unset(path)
    }

    /// Ids listed in `children`, in display order. Fields have none.
    pub fn children_ids(&self) -> Vec<String> {
        self.data
            .get("children")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn set_children(&mut self, ids: Vec<String>) {
        self.data.set("children", json!(ids));
    }

    /// True when the component holds no children (the editor's "empty" flag).
    pub fn is_empty(&self) -> bool {
        self.children_ids().is_empty()
    }

    /// Control this field was created from, if any.
    pub fn control_id(&self) -> Option<&str> {
        self.get("config.controlId")
            .or_else(|| self.get("meta.id"))
            .and_then(Value::as_str)
    }

    pub fn label(&self) -> Option<&str> {
        self.get("config.label").and_then(Value::as_str)
    }

    /// Parsed condition rules. Rules that do not parse are skipped.
    pub fn conditions(&self) -> Vec<ConditionRule> {
        let Some(Value::Array(rules)) = self.get("conditions") else {
            return Vec::new();
        };
        conditions::parse_rules(rules, &self.address())
    }

    /// Serializable snapshot of this component.
    ///
    /// Fields drop their `conditions` when no clause names a source, so the
    /// unused default template is never persisted.
    pub fn get_data(&self) -> Value {
        let mut data = self.data.value().clone();
        if self.kind == ComponentType::Field {
            let unused = data
                .get("conditions")
                .is_some_and(conditions::sources_empty);
            if unused {
                path::remove_path(&mut data, &["conditions"]);
            }
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_layered_under_data() {
        let row = Component::new(
            ComponentType::Row,
            "r1".into(),
            json!({"config": {"legend": "Contact"}}),
            None,
        );
        assert_eq!(row.get("id"), Some(&json!("r1")));
        assert_eq!(row.get("children"), Some(&json!([])));
        assert_eq!(row.get("config.legend"), Some(&json!("Contact")));
        assert_eq!(row.get("config.fieldset"), Some(&json!(false)));
        assert!(row.is_empty());
    }

    #[test]
    fn id_is_immutable() {
        let mut field = Component::new(ComponentType::Field, "f1".into(), json!({}), None);
        field.set("id", json!("other"));
        field.set("", json!({"id": "other", "tag": "textarea"}));
        assert_eq!(field.id(), "f1");
        assert_eq!(field.get("id"), Some(&json!("f1")));
        assert_eq!(field.get("tag"), Some(&json!("textarea")));
    }

    #[test]
    fn unused_condition_template_is_pruned() {
        let mut field = Component::new(
            ComponentType::Field,
            "f1".into(),
            json!({"conditions": [ConditionRule::template_value()]}),
            None,
        );
        assert!(field.get_data().get("conditions").is_none());

        field.set("conditions.0.if.0.source", json!("fields.f2"));
        assert!(field.get_data().get("conditions").is_some());
    }

    #[test]
    fn control_id_prefers_config() {
        let field = Component::new(
            ComponentType::Field,
            "f1".into(),
            json!({"config": {"controlId": "select"}, "meta": {"id": "text-input"}}),
            None,
        );
        assert_eq!(field.control_id(), Some("select"));
    }
}
