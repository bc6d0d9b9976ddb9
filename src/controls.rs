//! Control registry: field templates keyed by control id.
//!
//! A control's `controlData` is the starting data of every field created from
//! it: tag, attrs, config, meta and, for choice fields, options.

use crate::conditions::ConditionRule;
use crate::config::ControlOptions;
use crate::data::{new_id, path};
use crate::diagnostics;
use crate::error::FormError;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Palette groups in display order.
pub const GROUPS: [&str; 3] = ["common", "html", "layout"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Control {
    pub control_data: Value,
    /// DOM event name => behavior, applied by hosts that render controls.
    #[serde(default)]
    pub action: IndexMap<String, Value>,
    /// Library name => script url.
    #[serde(default)]
    pub dependencies: IndexMap<String, String>,
}

impl Control {
    pub fn new(control_data: Value) -> Self {
        Self {
            control_data,
            action: IndexMap::new(),
            dependencies: IndexMap::new(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        path::get_path(&self.control_data, &["meta", "id"]).and_then(Value::as_str)
    }

    pub fn group(&self) -> &str {
        path::get_path(&self.control_data, &["meta", "group"])
            .and_then(Value::as_str)
            .unwrap_or("common")
    }

    pub fn label(&self) -> Option<&str> {
        path::get_path(&self.control_data, &["config", "label"]).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ControlRegistry {
    controls: IndexMap<String, Control>,
    disabled: IndexSet<String>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in controls.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for control in builtin_controls() {
            if let Some(id) = control.id().map(str::to_string) {
                registry.controls.insert(id, control);
            }
        }
        registry
    }

    /// Add or replace a control. Its id is read from `meta.id`.
    pub fn register(&mut self, control: Control) -> Result<(), FormError> {
        let id = control
            .id()
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| FormError::InvalidControl("missing controlData.meta.id".into()))?;
        tracing::debug!(control = %id, "registered control");
        self.controls.insert(id, control);
        Ok(())
    }

    /// Register a raw `{controlData, action, dependencies}` definition.
    pub fn register_element(&mut self, element: &Value) -> Result<(), FormError> {
        let control = Control::deserialize(element)
            .map_err(|e| FormError::InvalidControl(e.to_string()))?;
        self.register(control)
    }

    pub fn disable(&mut self, id: &str) {
        self.disabled.insert(id.to_string());
    }

    /// Register host elements and disable listed ids. Bad definitions are
    /// skipped with a warning.
    pub fn apply_options(&mut self, options: &ControlOptions) {
        for element in &options.elements {
            if let Err(e) = self.register_element(element) {
                diagnostics::warn(format!("skipping control: {}", e));
            }
        }
        for id in &options.disable {
            self.disable(id);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Enabled control by id.
    pub fn get(&self, id: &str) -> Option<&Control> {
        if self.disabled.contains(id) {
            return None;
        }
        self.controls.get(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.controls
            .keys()
            .filter(|id| !self.disabled.contains(*id))
            .map(String::as_str)
            .collect()
    }

    /// Enabled control ids per palette group. Known groups come first, in
    /// their fixed order, then any group a host introduced.
    pub fn groups(&self) -> IndexMap<String, Vec<String>> {
        let mut groups: IndexMap<String, Vec<String>> = GROUPS
            .iter()
            .map(|g| (g.to_string(), Vec::new()))
            .collect();
        for id in self.ids() {
            if let Some(control) = self.controls.get(id) {
                groups
                    .entry(control.group().to_string())
                    .or_default()
                    .push(id.to_string());
            }
        }
        groups
    }

    /// Field data for a new instance of `control_id`.
    pub fn instantiate(&self, control_id: &str, id: Option<&str>) -> Result<Value, FormError> {
        let control = self
            .get(control_id)
            .ok_or_else(|| FormError::UnknownControl(control_id.to_string()))?;
        let mut data = control.control_data.clone();
        let id = id.map(str::to_string).unwrap_or_else(new_id);
        path::set_path(&mut data, &["id"], json!(id));
        path::set_path(&mut data, &["meta", "id"], json!(control_id));
        path::set_path(&mut data, &["config", "controlId"], json!(control_id));
        Ok(data)
    }
}

fn control(id: &str, group: &str, label: &str, data: Value) -> Control {
    let mut control_data = json!({
        "tag": "input",
        "attrs": {},
        "config": {"label": label},
        "meta": {"group": group, "icon": id, "id": id},
    });
    path::deep_merge(&mut control_data, &data);
    Control::new(control_data)
}

fn input_control(id: &str, label: &str, data: Value) -> Control {
    let mut control = control(id, "common", label, data);
    path::set_path(
        &mut control.control_data,
        &["conditions"],
        json!([ConditionRule::template_value()]),
    );
    control
}

fn options(prefix: &str, count: usize, state: &str) -> Value {
    let options: Vec<Value> = (1..=count)
        .map(|i| {
            let mut option = json!({
                "label": format!("{} {}", prefix, i),
                "value": format!("{}-{}", prefix.to_lowercase(), i),
            });
            path::set_path(&mut option, &[state], Value::Bool(false));
            option
        })
        .collect();
    Value::Array(options)
}

fn builtin_controls() -> Vec<Control> {
    vec![
        input_control(
            "text-input",
            "Input",
            json!({"attrs": {"type": "text", "required": false, "className": ""}}),
        ),
        input_control(
            "number",
            "Number",
            json!({"attrs": {"type": "number", "required": false, "className": ""}}),
        ),
        input_control(
            "date-input",
            "Date",
            json!({"attrs": {"type": "date", "required": false, "className": ""}}),
        ),
        input_control(
            "hidden",
            "Hidden",
            json!({"attrs": {"type": "hidden", "value": ""}, "config": {"hideLabel": true}}),
        ),
        input_control(
            "upload",
            "File Upload",
            json!({"attrs": {"type": "file", "required": false}}),
        ),
        input_control(
            "textarea",
            "TextArea",
            json!({"tag": "textarea", "attrs": {"required": false}}),
        ),
        input_control(
            "select",
            "Select",
            json!({
                "tag": "select",
                "attrs": {"required": false, "className": ""},
                "options": options("Option", 3, "selected"),
            }),
        ),
        input_control(
            "checkbox-group",
            "Checkbox Group",
            json!({
                "attrs": {"type": "checkbox", "required": false},
                "options": options("Checkbox", 2, "checked"),
            }),
        ),
        input_control(
            "radio-group",
            "Radio Group",
            json!({
                "attrs": {"type": "radio", "required": false},
                "options": options("Radio", 3, "checked"),
            }),
        ),
        input_control(
            "checkbox",
            "Checkbox",
            json!({"attrs": {"type": "checkbox", "required": false}}),
        ),
        control(
            "button",
            "common",
            "",
            json!({
                "tag": "button",
                "attrs": {"type": "button", "className": ""},
                "config": {"hideLabel": true},
                "content": "Button",
            }),
        ),
        control(
            "header",
            "html",
            "",
            json!({"tag": "h1", "config": {"hideLabel": true}, "content": "Header"}),
        ),
        control(
            "paragraph",
            "html",
            "",
            json!({
                "tag": "p",
                "config": {"hideLabel": true},
                "content": "Leverage agile frameworks to provide a robust synopsis for high level overviews.",
            }),
        ),
        control(
            "divider",
            "html",
            "",
            json!({"tag": "hr", "config": {"hideLabel": true}}),
        ),
    ]
}
