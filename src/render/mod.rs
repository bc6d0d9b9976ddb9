//! Renderer: turns a saved form data document into a live form.
//!
//! The walk mirrors the editor tree (stage -> rows -> columns -> fields) but is
//! purely data driven: children are emitted in the order their parent lists
//! them, and every id is rewritten with [`RENDER_PREFIX`] so a rendered form
//! can share a page with the editor.

mod conditions;
pub mod dom;
pub mod html;

pub use dom::{Dom, ElementConfig, EventKind, Listener, ListenerAction, NodeId};
pub use html::{render_html_page, to_html};

use crate::conditions::{self as rule_set, ClauseReport, ConditionRule};
use crate::data::{new_id, path};
use crate::diagnostics;
use crate::document::{FieldRecord, FormDataDocument};
use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Prefix applied to every rendered id.
pub const RENDER_PREFIX: &str = "f-";

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("uuid pattern is valid")
});

pub fn prefixed(id: &str) -> String {
    format!("{}{}", RENDER_PREFIX, id)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderOptions {
    /// Control id => `{tag?, attrs?}` merged over matching fields.
    pub elements: IndexMap<String, Value>,
    /// Overrides the document id on the form element.
    pub form_id: Option<String>,
    /// Data behind `external.*` condition addresses.
    pub external: Map<String, Value>,
}

/// Nodes produced for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedField {
    pub id: String,
    pub name: String,
    pub label: String,
    /// The form control, or the container of a checkbox/radio group.
    pub node: NodeId,
    pub wrapper: NodeId,
    /// Option inputs of a group, or `<option>`s of a select.
    pub options: Vec<NodeId>,
    /// True for checkbox/radio groups.
    pub group: bool,
}

#[derive(Debug, Clone)]
struct BoundRules {
    owner: String,
    rules: Vec<ConditionRule>,
}

#[derive(Debug, Clone)]
pub struct Rendered {
    dom: Dom,
    root: NodeId,
    document: FormDataDocument,
    fields: IndexMap<String, RenderedField>,
    containers: IndexMap<String, NodeId>,
    bound: Vec<BoundRules>,
    external: Value,
    input_groups: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Renderer {
    options: RenderOptions,
}

fn load<T>(result: crate::Result<Option<T>>, what: &str) -> Option<T> {
    match result {
        Ok(Some(record)) => Some(record),
        Ok(None) => {
            diagnostics::warn(format!("render: {} not found", what));
            None
        }
        Err(e) => {
            diagnostics::warn(format!("render: {:#}", e));
            None
        }
    }
}

fn rules_of(raw: Option<&Value>, owner: &str) -> Vec<ConditionRule> {
    raw.and_then(Value::as_array)
        .map(|rules| rule_set::parse_rules(rules, owner))
        .unwrap_or_default()
}

const FORM_TAGS: [&str; 3] = ["input", "select", "textarea"];

impl Renderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    pub fn render(&self, document: &FormDataDocument) -> Rendered {
        let mut out = Rendered {
            dom: Dom::new(),
            root: 0,
            document: document.clone(),
            fields: IndexMap::new(),
            containers: IndexMap::new(),
            bound: Vec::new(),
            external: Value::Object(self.options.external.clone()),
            input_groups: 0,
        };

        let form_id = self.options.form_id.as_deref().unwrap_or(&document.id);
        out.root = out.dom.create(
            &ElementConfig::new("form")
                .attr("id", prefixed(form_id))
                .class("formeo-render")
                .class("formeo"),
        );

        for stage_id in document.stages.keys() {
            if let Some(stage) = self.process_stage(&mut out, document, stage_id) {
                out.dom.append_child(out.root, stage);
            }
        }

        out.apply_conditions();
        tracing::debug!(
            fields = out.fields.len(),
            listeners = out.listener_count(),
            "rendered form"
        );
        out
    }

    fn process_stage(&self, out: &mut Rendered, doc: &FormDataDocument, id: &str) -> Option<NodeId> {
        let record = load(doc.stage(id), &format!("stages.{}", id))?;
        let node = out.dom.create(
            &ElementConfig::new("div")
                .attr("id", prefixed(id))
                .class("f-stage"),
        );
        out.containers.insert(format!("stages.{}", id), node);

        let rules = rules_of(record.extra.get("conditions"), &format!("stages.{}", id));
        if !rules.is_empty() {
            out.bound.push(BoundRules {
                owner: format!("stages.{}", id),
                rules,
            });
        }

        for row in self.process_rows(out, doc, &record.children) {
            out.dom.append_child(node, row);
        }
        Some(node)
    }

    fn process_rows(&self, out: &mut Rendered, doc: &FormDataDocument, ids: &[String]) -> Vec<NodeId> {
        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(record) = load(doc.row(id), &format!("rows.{}", id)) else {
                continue;
            };
            let tag = if record.config.fieldset { "fieldset" } else { "div" };
            let class = record.class_name.as_deref().unwrap_or("f-row");
            let row = out
                .dom
                .create(&ElementConfig::new(tag).attr("id", prefixed(id)).class(class));
            if record.config.fieldset && !record.config.legend.is_empty() {
                let legend = out
                    .dom
                    .create(&ElementConfig::new("legend").text(record.config.legend.clone()));
                out.dom.append_child(row, legend);
            }
            out.containers.insert(format!("rows.{}", id), row);

            for column in self.process_columns(out, doc, &record.children) {
                out.dom.append_child(row, column);
            }

            if record.config.input_group {
                out.dom.add_class(row, "f-input-group");
                let wrapper = out
                    .dom
                    .create(&ElementConfig::new("div").class("f-input-group-wrap"));
                let add = out.dom.create(
                    &ElementConfig::new("button")
                        .attr("type", "button")
                        .class("f-input-group-add")
                        .text("+"),
                );
                out.dom.add_listener(
                    add,
                    Listener {
                        event: EventKind::Click,
                        action: ListenerAction::AddInputGroup { row },
                    },
                );
                out.dom.append_child(wrapper, row);
                out.dom.append_child(wrapper, add);
                nodes.push(wrapper);
            } else {
                nodes.push(row);
            }
        }
        nodes
    }

    fn process_columns(&self, out: &mut Rendered, doc: &FormDataDocument, ids: &[String]) -> Vec<NodeId> {
        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(record) = load(doc.column(id), &format!("columns.{}", id)) else {
                continue;
            };
            let mut config = ElementConfig::new("div")
                .attr("id", prefixed(id))
                .class("f-render-column");
            if let Some(width) = record.config.width.as_deref().filter(|w| !w.is_empty()) {
                config = config.attr("style", format!("width: {}", width));
            }
            let column = out.dom.create(&config);
            out.containers.insert(format!("columns.{}", id), column);

            for field in self.process_fields(out, doc, &record.children) {
                out.dom.append_child(column, field);
            }
            nodes.push(column);
        }
        nodes
    }

    fn process_fields(&self, out: &mut Rendered, doc: &FormDataDocument, ids: &[String]) -> Vec<NodeId> {
        ids.iter()
            .filter_map(|id| {
                let record = load(doc.field(id), &format!("fields.{}", id))?;
                Some(self.process_field(out, id, record))
            })
            .collect()
    }

    /// Apply a host element template to the field's tag and attrs.
    fn apply_element_template(&self, record: &mut FieldRecord) {
        let Some(template) = record.control_id().and_then(|c| self.options.elements.get(c)) else {
            return;
        };
        let mut base = json!({"tag": record.tag, "attrs": record.attrs});
        path::deep_merge(&mut base, template);
        if let Some(tag) = base.get("tag").and_then(Value::as_str) {
            record.tag = tag.to_string();
        }
        if let Some(attrs) = base.get("attrs").and_then(Value::as_object) {
            record.attrs = attrs.clone();
        }
    }

    fn process_field(&self, out: &mut Rendered, id: &str, mut record: FieldRecord) -> NodeId {
        self.apply_element_template(&mut record);
        let pid = prefixed(id);
        let input_type = record.input_type().unwrap_or("text").to_string();
        let group = record.tag == "input"
            && matches!(input_type.as_str(), "checkbox" | "radio")
            && !record.options.is_empty();
        let form_control = FORM_TAGS.contains(&record.tag.as_str());

        let wrapper = out.dom.create(
            &ElementConfig::new("div")
                .attr("id", format!("{}-wrapper", pid))
                .class("f-field-group"),
        );

        let label = record.config.label.clone();
        if form_control && !record.config.hide_label && !label.is_empty() {
            let mut config = ElementConfig::new("label").text(label.clone());
            if !group {
                config = config.attr("for", pid.clone());
            }
            let node = out.dom.create(&config);
            out.dom.append_child(wrapper, node);
        }

        let base_attrs = |skip: &[&str]| {
            let mut config = ElementConfig::new(&record.tag);
            for (name, value) in &record.attrs {
                if !skip.contains(&name.as_str()) {
                    config = config.attr(name, value.clone());
                }
            }
            config
        };

        let mut options = Vec::new();
        let node = if group {
            let container = out.dom.create(
                &ElementConfig::new("div")
                    .attr("id", pid.clone())
                    .class(&format!("f-{}-group", input_type)),
            );
            for (i, option) in record.options.iter().enumerate() {
                let option_id = format!("{}-{}", pid, i);
                let holder = out
                    .dom
                    .create(&ElementConfig::new("div").class(&format!("f-{}", input_type)));
                let input = out.dom.create(
                    &base_attrs(&["id", "name", "value", "checked"])
                        .attr("id", option_id.clone())
                        .attr("name", pid.clone())
                        .attr("value", path::stringify(&option.value))
                        .attr("checked", option.checked),
                );
                let option_label = out.dom.create(
                    &ElementConfig::new("label")
                        .attr("for", option_id)
                        .text(option.label.clone()),
                );
                out.dom.append_child(holder, input);
                out.dom.append_child(holder, option_label);
                out.dom.append_child(container, holder);
                options.push(input);
            }
            container
        } else if record.tag == "select" {
            let select = out.dom.create(
                &base_attrs(&["id", "name", "value"])
                    .attr("id", pid.clone())
                    .attr("name", pid.clone()),
            );
            for option in &record.options {
                let node = out.dom.create(
                    &ElementConfig::new("option")
                        .attr("value", path::stringify(&option.value))
                        .attr("selected", option.selected)
                        .text(option.label.clone()),
                );
                out.dom.append_child(select, node);
                options.push(node);
            }
            select
        } else if record.tag == "textarea" {
            let mut config = base_attrs(&["id", "name", "value"])
                .attr("id", pid.clone())
                .attr("name", pid.clone());
            if let Some(value) = record.attrs.get("value") {
                config = config.text(path::stringify(value));
            }
            out.dom.create(&config)
        } else if form_control {
            out.dom.create(
                &base_attrs(&["id", "name"])
                    .attr("id", pid.clone())
                    .attr("name", pid.clone()),
            )
        } else {
            let mut config = base_attrs(&["id"]).attr("id", pid.clone());
            config.content = record.content.clone().map(dom::Content::from);
            out.dom.create(&config)
        };
        out.dom.append_child(wrapper, node);

        let rules = record.rules();
        if !rules.is_empty() {
            out.bound.push(BoundRules {
                owner: format!("fields.{}", id),
                rules,
            });
        }
        out.fields.insert(
            id.to_string(),
            RenderedField {
                id: id.to_string(),
                name: pid,
                label,
                node,
                wrapper,
                options,
                group,
            },
        );
        wrapper
    }
}

impl Rendered {
    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    /// The `<form>` element.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn document(&self) -> &FormDataDocument {
        &self.document
    }

    pub fn external(&self) -> &Value {
        &self.external
    }

    /// Rendered nodes of a field, by its document id.
    pub fn field(&self, id: &str) -> Option<&RenderedField> {
        self.fields.get(id)
    }

    pub fn fields(&self) -> impl Iterator<Item = &RenderedField> {
        self.fields.values()
    }

    /// Node of a stage, row or column, by `type.id`.
    pub fn container(&self, address: &str) -> Option<NodeId> {
        self.containers.get(address).copied()
    }

    /// Addresses of the components whose conditions were bound.
    pub fn condition_owners(&self) -> Vec<&str> {
        self.bound.iter().map(|b| b.owner.as_str()).collect()
    }

    /// Named form controls under the form, in document order.
    pub fn form_controls(&self) -> Vec<NodeId> {
        self.dom
            .descendants(self.root)
            .into_iter()
            .filter(|n| {
                self.dom.tag(*n).is_some_and(|t| FORM_TAGS.contains(&t))
                    && self.dom.has_attr(*n, "name")
            })
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        self.dom.listener_count(self.root)
    }

    /// Run every listener bound to `event` on `node`.
    pub fn dispatch(&mut self, node: NodeId, event: EventKind) -> Vec<ClauseReport> {
        let actions: Vec<ListenerAction> = self
            .dom
            .listeners(node)
            .iter()
            .filter(|l| l.event == event)
            .map(|l| l.action.clone())
            .collect();

        let mut reports = Vec::new();
        for action in actions {
            match action {
                ListenerAction::Condition { owner, rule, clause } => {
                    reports.extend(self.run_bound(owner, rule, clause));
                }
                ListenerAction::AddInputGroup { row } => {
                    self.add_input_group(row);
                }
                ListenerAction::RemoveInputGroup { row } => {
                    self.remove_input_group(row);
                }
            }
        }
        reports
    }

    /// Type into a control and fire the event its kind listens to.
    pub fn set_value(&mut self, node: NodeId, value: &str) -> Vec<ClauseReport> {
        self.dom.set_value(node, value);
        let event = self.event_kind(node);
        self.dispatch(node, event)
    }

    /// Toggle a checkbox, radio or option and fire `change`.
    pub fn set_checked(&mut self, node: NodeId, checked: bool) -> Vec<ClauseReport> {
        self.dom.set_checked(node, checked);
        self.dispatch(node, EventKind::Change)
    }

    pub fn click(&mut self, node: NodeId) -> Vec<ClauseReport> {
        self.dispatch(node, EventKind::Click)
    }

    /// Append a copy of an input-group row with fresh ids and a remove button.
    pub fn add_input_group(&mut self, row: NodeId) -> Option<NodeId> {
        let wrapper = self.dom.parent(row)?;
        let add_button = self
            .dom
            .children(wrapper)
            .iter()
            .copied()
            .find(|n| self.dom.has_class(*n, "f-input-group-add"));

        self.input_groups += 1;
        let copy = self.dom.deep_clone(row);
        self.remap_ids(copy);

        let remove = self.dom.create(
            &ElementConfig::new("button")
                .attr("type", "button")
                .class("f-input-group-remove")
                .text("-"),
        );
        self.dom.add_listener(
            remove,
            Listener {
                event: EventKind::Click,
                action: ListenerAction::RemoveInputGroup { row: copy },
            },
        );
        self.dom.append_child(copy, remove);
        self.dom.insert_before(wrapper, copy, add_button);
        Some(copy)
    }

    pub fn remove_input_group(&mut self, row: NodeId) -> bool {
        if self.dom.parent(row).is_none() {
            return false;
        }
        self.dom.detach(row);
        true
    }

    /// Give every `id` in a cloned subtree a new value and repoint `for`.
    fn remap_ids(&mut self, root: NodeId) {
        let suffix = self.input_groups;
        let mut uuids: HashMap<String, String> = HashMap::new();
        let mut remap = |old: &str| -> String {
            if UUID_RE.is_match(old) {
                UUID_RE
                    .replace_all(old, |caps: &Captures| {
                        uuids
                            .entry(caps[0].to_string())
                            .or_insert_with(new_id)
                            .clone()
                    })
                    .into_owned()
            } else {
                format!("{}-{}", old, suffix)
            }
        };

        for node in self.dom.descendants(root) {
            for name in ["id", "for"] {
                if let Some(old) = self.dom.attr(node, name).map(str::to_string) {
                    let new = remap(&old);
                    self.dom.set_attr(node, name, new);
                }
            }
        }
    }

    /// Submitted values by control name; repeated names collect into arrays.
    pub fn user_form_data(&self) -> IndexMap<String, Value> {
        let mut data: IndexMap<String, Value> = IndexMap::new();
        for node in self.form_controls() {
            let Some(name) = self.dom.attr(node, "name") else {
                continue;
            };
            if self.dom.has_attr(node, "disabled") {
                continue;
            }
            let value = match self.dom.input_type(node) {
                Some("checkbox" | "radio") if !self.dom.is_checked(node) => continue,
                Some("button" | "submit" | "reset" | "image") => continue,
                _ => self.dom.value(node),
            };
            match data.get_mut(name) {
                Some(Value::Array(values)) => values.push(Value::String(value)),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, Value::String(value)]);
                }
                None => {
                    data.insert(name.to_string(), Value::String(value));
                }
            }
        }
        data
    }

    /// `user_form_data` with each entry's field label alongside its value.
    pub fn user_data(&self) -> IndexMap<String, Value> {
        self.user_form_data()
            .into_iter()
            .map(|(name, value)| {
                let label = name
                    .strip_prefix(RENDER_PREFIX)
                    .and_then(|id| self.fields.get(id))
                    .map(|field| field.label.clone())
                    .unwrap_or_default();
                (name, json!({"label": label, "value": value}))
            })
            .collect()
    }

    pub fn to_html(&self) -> String {
        to_html(&self.dom, self.root)
    }
}
