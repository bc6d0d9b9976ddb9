//! Minimal in-memory DOM for rendered forms.
//!
//! Nodes live in an arena indexed by [`NodeId`]. Elements carry their
//! attributes plus the live state a browser keeps outside of them (current
//! value, checked, selected) and the listeners bound to them.

use crate::data::path::stringify;
use crate::diagnostics;
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

static ATTR_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_:][-A-Za-z0-9_:.]*$").expect("attribute name pattern is valid")
});

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttrError {
    #[error("invalid attribute name {0:?}")]
    InvalidName(String),
    #[error("attribute {name} cannot hold {value}")]
    InvalidValue { name: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Input,
    Change,
    Click,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Input => "input",
            EventKind::Change => "change",
            EventKind::Click => "click",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerAction {
    /// Re-evaluate clause `clause` of rule `rule` owned by bound set `owner`.
    Condition {
        owner: usize,
        rule: usize,
        clause: usize,
    },
    AddInputGroup {
        row: NodeId,
    },
    RemoveInputGroup {
        row: NodeId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    pub event: EventKind,
    pub action: ListenerAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attrs: IndexMap<String, String>,
    value: Option<String>,
    checked: bool,
    selected: bool,
}

impl Element {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: IndexMap::new(),
            value: None,
            checked: false,
            selected: false,
        }
    }

    /// Value typed by the user, if any.
    pub fn live_value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    listeners: Vec<Listener>,
}

/// Declarative element description: `{tag, attrs, className, dataset, content, children}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementConfig {
    #[serde(default = "default_tag")]
    pub tag: String,

    #[serde(default)]
    pub attrs: IndexMap<String, Value>,

    #[serde(default)]
    pub class_name: Option<Value>,

    #[serde(default)]
    pub dataset: IndexMap<String, Value>,

    #[serde(default)]
    pub content: Option<Content>,

    #[serde(default)]
    pub children: Vec<Content>,
}

fn default_tag() -> String {
    "div".to_string()
}

impl ElementConfig {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Self::default()
        }
    }

    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    pub fn attr(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        let joined = match self.class_name.take() {
            Some(existing) => format!("{} {}", stringify(&existing).replace(',', " "), class),
            None => class.to_string(),
        };
        self.class_name = Some(Value::String(joined));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Content::Text(text.into()));
        self
    }

    pub fn child(mut self, child: ElementConfig) -> Self {
        self.children.push(Content::Element(Box::new(child)));
        self
    }
}

/// Child content of an element config.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum Content {
    Text(String),
    Element(Box<ElementConfig>),
    Many(Vec<Content>),
    Unsupported(Value),
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Content::Text(s),
            Value::Number(_) | Value::Bool(_) => Content::Text(stringify(&value)),
            Value::Null => Content::Many(Vec::new()),
            Value::Array(items) => Content::Many(items.into_iter().map(Content::from).collect()),
            Value::Object(map) => {
                let value = Value::Object(map);
                if value.get("tag").is_none() {
                    return Content::Unsupported(value);
                }
                match ElementConfig::from_value(&value) {
                    Ok(config) => Content::Element(Box::new(config)),
                    Err(_) => Content::Unsupported(value),
                }
            }
        }
    }
}

fn kebab(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Attribute text for a JSON value. `None` means "leave the attribute off".
fn attr_text(name: &str, value: &Value) -> Result<Option<String>, AttrError> {
    match value {
        Value::Null | Value::Bool(false) => Ok(None),
        Value::Bool(true) => Ok(Some(String::new())),
        Value::Array(items) => Ok(Some(
            items.iter().map(stringify).collect::<Vec<_>>().join(" "),
        )),
        Value::Object(_) => Err(AttrError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        }),
        other => Ok(Some(stringify(other))),
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dom {
    nodes: Vec<Node>,
}

impl Dom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
            listeners: Vec::new(),
        });
        self.nodes.len() - 1
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element(Element::new(tag)))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Text(text.into()))
    }

    /// Build a detached subtree from a declarative config.
    ///
    /// Bad attributes are skipped with a warning and unsupported content is
    /// reported as an error; the rest of the element is still built.
    pub fn create(&mut self, config: &ElementConfig) -> NodeId {
        let node = self.create_element(&config.tag);
        for (name, value) in &config.attrs {
            if let Err(e) = self.set_attr_value(node, name, value) {
                diagnostics::warn(format!("<{}>: {}", config.tag, e));
            }
        }
        if let Some(class) = &config.class_name {
            if let Err(e) = self.set_attr_value(node, "class", class) {
                diagnostics::warn(format!("<{}>: {}", config.tag, e));
            }
        }
        for (key, value) in &config.dataset {
            let name = format!("data-{}", kebab(key));
            if let Err(e) = self.set_attr_value(node, &name, value) {
                diagnostics::warn(format!("<{}>: {}", config.tag, e));
            }
        }
        if let Some(content) = &config.content {
            self.append_content(node, content, &config.tag);
        }
        for child in &config.children {
            self.append_content(node, child, &config.tag);
        }
        node
    }

    fn append_content(&mut self, parent: NodeId, content: &Content, tag: &str) {
        match content {
            Content::Text(text) => {
                let child = self.create_text(text.clone());
                self.append_child(parent, child);
            }
            Content::Element(config) => {
                let child = self.create(config);
                self.append_child(parent, child);
            }
            Content::Many(items) => {
                for item in items {
                    self.append_content(parent, item, tag);
                }
            }
            Content::Unsupported(value) => {
                diagnostics::error(format!("unsupported content in <{}>: {}", tag, value));
            }
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` under `parent` ahead of `reference`, or last.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if parent >= self.nodes.len() || child >= self.nodes.len() || parent == child {
            return;
        }
        self.detach(child);
        let siblings = &mut self.nodes[parent].children;
        let at = reference
            .and_then(|r| siblings.iter().position(|c| *c == r))
            .unwrap_or(siblings.len());
        siblings.insert(at, child);
        self.nodes[child].parent = Some(parent);
    }

    pub fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.parent(node) else {
            return;
        };
        self.nodes[parent].children.retain(|c| *c != node);
        self.nodes[node].parent = None;
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node)?.parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
    }

    pub fn node(&self, node: NodeId) -> Option<&Node> {
        self.nodes.get(node)
    }

    pub fn element(&self, node: NodeId) -> Option<&Element> {
        match &self.nodes.get(node)?.data {
            NodeData::Element(element) => Some(element),
            NodeData::Text(_) => None,
        }
    }

    fn element_mut(&mut self, node: NodeId) -> Option<&mut Element> {
        match &mut self.nodes.get_mut(node)?.data {
            NodeData::Element(element) => Some(element),
            NodeData::Text(_) => None,
        }
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|e| e.tag.as_str())
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node)?.attrs.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, node: NodeId, name: &str) -> bool {
        self.attr(node, name).is_some()
    }

    pub fn input_type(&self, node: NodeId) -> Option<&str> {
        match self.tag(node)? {
            "input" => Some(self.attr(node, "type").unwrap_or("text")),
            _ => None,
        }
    }

    /// Set an attribute without validation.
    pub fn set_attr(&mut self, node: NodeId, name: &str, value: impl Into<String>) {
        let value = value.into();
        let Some(element) = self.element_mut(node) else {
            return;
        };
        match name {
            "checked" => element.checked = true,
            "selected" => element.selected = true,
            _ => {}
        }
        element.attrs.insert(name.to_string(), value);
    }

    /// Set an attribute from a JSON value, validating name and value.
    pub fn set_attr_value(&mut self, node: NodeId, name: &str, value: &Value) -> Result<(), AttrError> {
        let name = if name == "className" { "class" } else { name };
        if !ATTR_NAME_RE.is_match(name) {
            return Err(AttrError::InvalidName(name.to_string()));
        }
        let Some(text) = attr_text(name, value)? else {
            return Ok(());
        };
        if name == "class" {
            for class in text.split_whitespace() {
                self.add_class(node, class);
            }
            return Ok(());
        }
        self.set_attr(node, name, text);
        Ok(())
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) -> Option<String> {
        self.element_mut(node)?.attrs.shift_remove(name)
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        let Some(element) = self.element_mut(node) else {
            return;
        };
        let classes = element.attrs.entry("class".to_string()).or_default();
        if !classes.split_whitespace().any(|c| c == class) {
            if !classes.is_empty() {
                classes.push(' ');
            }
            classes.push_str(class);
        }
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attr(node, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    /// `node` and everything under it, in document order.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if current >= self.nodes.len() {
                continue;
            }
            out.push(current);
            stack.extend(self.nodes[current].children.iter().rev());
        }
        out
    }

    pub fn find_by_id(&self, root: NodeId, id: &str) -> Option<NodeId> {
        self.descendants(root)
            .into_iter()
            .find(|n| self.attr(*n, "id") == Some(id))
    }

    pub fn text_content(&self, node: NodeId) -> String {
        self.descendants(node)
            .into_iter()
            .filter_map(|n| match &self.nodes[n].data {
                NodeData::Text(text) => Some(text.as_str()),
                NodeData::Element(_) => None,
            })
            .collect()
    }

    /// Hidden when this node or an ancestor carries `hidden` or `display: none`.
    pub fn is_visible(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if self.has_attr(n, "hidden") {
                return false;
            }
            let display_none = self.attr(n, "style").is_some_and(|style| {
                style
                    .split(';')
                    .filter_map(|decl| decl.split_once(':'))
                    .any(|(prop, value)| prop.trim() == "display" && value.trim() == "none")
            });
            if display_none {
                return false;
            }
            current = self.parent(n);
        }
        true
    }

    fn options_of(&self, select: NodeId) -> Vec<NodeId> {
        self.descendants(select)
            .into_iter()
            .filter(|n| self.tag(*n) == Some("option"))
            .collect()
    }

    pub fn option_value(&self, option: NodeId) -> String {
        self.attr(option, "value")
            .map(str::to_string)
            .unwrap_or_else(|| self.text_content(option))
    }

    /// Current value as a browser reports it.
    pub fn value(&self, node: NodeId) -> String {
        let Some(element) = self.element(node) else {
            return String::new();
        };
        match element.tag.as_str() {
            "select" => {
                let options = self.options_of(node);
                options
                    .iter()
                    .find(|o| self.is_checked(**o))
                    .or(options.first())
                    .map(|o| self.option_value(*o))
                    .unwrap_or_default()
            }
            "textarea" => element
                .value
                .clone()
                .unwrap_or_else(|| self.text_content(node)),
            "option" => self.option_value(node),
            _ => match (&element.value, element.attrs.get("value")) {
                (Some(live), _) => live.clone(),
                (None, Some(attr)) => attr.clone(),
                (None, None) if matches!(self.input_type(node), Some("checkbox" | "radio")) => {
                    "on".to_string()
                }
                (None, None) => String::new(),
            },
        }
    }

    pub fn set_value(&mut self, node: NodeId, value: &str) {
        if self.tag(node) == Some("select") {
            for option in self.options_of(node) {
                let matches = self.option_value(option) == value;
                if let Some(element) = self.element_mut(option) {
                    element.selected = matches;
                }
            }
            return;
        }
        if let Some(element) = self.element_mut(node) {
            element.value = Some(value.to_string());
        }
    }

    /// Checked state of a checkbox/radio, or selected state of an option.
    pub fn is_checked(&self, node: NodeId) -> bool {
        self.element(node).is_some_and(|e| {
            if e.tag == "option" {
                e.selected
            } else {
                e.checked
            }
        })
    }

    /// Checking a radio unchecks the other radios sharing its name.
    pub fn set_checked(&mut self, node: NodeId, checked: bool) {
        if checked && self.input_type(node) == Some("radio") {
            if let Some(name) = self.attr(node, "name").map(str::to_string) {
                let peers: Vec<NodeId> = (0..self.nodes.len())
                    .filter(|n| *n != node)
                    .filter(|n| self.input_type(*n) == Some("radio"))
                    .filter(|n| self.attr(*n, "name") == Some(name.as_str()))
                    .collect();
                for peer in peers {
                    if let Some(element) = self.element_mut(peer) {
                        element.checked = false;
                    }
                }
            }
        }
        if let Some(element) = self.element_mut(node) {
            if element.tag == "option" {
                element.selected = checked;
            } else {
                element.checked = checked;
            }
        }
    }

    /// Bind a listener once; returns false if an identical one exists.
    pub fn add_listener(&mut self, node: NodeId, listener: Listener) -> bool {
        let Some(n) = self.nodes.get_mut(node) else {
            return false;
        };
        if n.listeners.contains(&listener) {
            return false;
        }
        n.listeners.push(listener);
        true
    }

    pub fn listeners(&self, node: NodeId) -> &[Listener] {
        self.nodes
            .get(node)
            .map(|n| n.listeners.as_slice())
            .unwrap_or_default()
    }

    pub fn listener_count(&self, root: NodeId) -> usize {
        self.descendants(root)
            .into_iter()
            .map(|n| self.nodes[n].listeners.len())
            .sum()
    }

    /// Detached copy of a subtree, including live state but not listeners.
    pub fn deep_clone(&mut self, node: NodeId) -> NodeId {
        let data = self.nodes[node].data.clone();
        let children = self.nodes[node].children.clone();
        let copy = self.push(data);
        for child in children {
            let child_copy = self.deep_clone(child);
            self.append_child(copy, child_copy);
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn create_skips_bad_attributes_and_content() {
        let config = ElementConfig::from_value(&json!({
            "tag": "div",
            "attrs": {"id": "x", "bad name": "1", "data": {"nested": true}, "hidden": false, "required": true},
            "className": ["a", "b"],
            "dataset": {"fieldId": "f1"},
            "children": ["hello", {"tag": "span", "content": "inner"}, {"nope": 1}]
        }))
        .unwrap();

        let mut dom = Dom::new();
        let node = dom.create(&config);
        assert_eq!(dom.attr(node, "id"), Some("x"));
        assert_eq!(dom.attr(node, "class"), Some("a b"));
        assert_eq!(dom.attr(node, "data-field-id"), Some("f1"));
        assert_eq!(dom.attr(node, "required"), Some(""));
        assert!(!dom.has_attr(node, "bad name"));
        assert!(!dom.has_attr(node, "data"));
        assert!(!dom.has_attr(node, "hidden"));
        assert_eq!(dom.children(node).len(), 2);
        assert_eq!(dom.text_content(node), "helloinner");
    }

    #[test]
    fn invalid_names_and_values_are_reported() {
        let mut dom = Dom::new();
        let node = dom.create_element("input");
        assert_eq!(
            dom.set_attr_value(node, "1x", &json!("a")),
            Err(AttrError::InvalidName("1x".into()))
        );
        assert!(matches!(
            dom.set_attr_value(node, "title", &json!({"a": 1})),
            Err(AttrError::InvalidValue { .. })
        ));
    }

    #[test]
    fn select_value_follows_selected_option() {
        let mut dom = Dom::new();
        let select = dom.create(
            &ElementConfig::new("select")
                .child(ElementConfig::new("option").attr("value", "a").text("A"))
                .child(ElementConfig::new("option").attr("value", "b").text("B")),
        );
        assert_eq!(dom.value(select), "a");
        dom.set_value(select, "b");
        assert_eq!(dom.value(select), "b");
    }

    #[test]
    fn radios_in_a_group_are_exclusive() {
        let mut dom = Dom::new();
        let form = dom.create_element("form");
        let radios: Vec<NodeId> = (0..2)
            .map(|i| {
                let radio = dom.create(
                    &ElementConfig::new("input")
                        .attr("type", "radio")
                        .attr("name", "r")
                        .attr("value", format!("v{}", i)),
                );
                dom.append_child(form, radio);
                radio
            })
            .collect();

        dom.set_checked(radios[0], true);
        dom.set_checked(radios[1], true);
        assert!(!dom.is_checked(radios[0]));
        assert!(dom.is_checked(radios[1]));
    }

    #[test]
    fn visibility_inherits_from_ancestors() {
        let mut dom = Dom::new();
        let wrapper = dom.create(&ElementConfig::new("div").attr("style", "color: red; display: none"));
        let input = dom.create_element("input");
        dom.append_child(wrapper, input);
        assert!(!dom.is_visible(input));
        dom.remove_attr(wrapper, "style");
        assert!(dom.is_visible(input));
        dom.set_attr(wrapper, "hidden", "");
        assert!(!dom.is_visible(input));
    }

    #[test]
    fn deep_clone_drops_listeners() {
        let mut dom = Dom::new();
        let row = dom.create(&ElementConfig::new("div").child(ElementConfig::new("input")));
        let input = dom.children(row)[0];
        dom.add_listener(
            input,
            Listener {
                event: EventKind::Input,
                action: ListenerAction::Condition {
                    owner: 0,
                    rule: 0,
                    clause: 0,
                },
            },
        );
        let copy = dom.deep_clone(row);
        assert_eq!(dom.descendants(copy).len(), 2);
        assert_eq!(dom.listener_count(copy), 0);
        assert_eq!(dom.listener_count(row), 1);
        assert_eq!(dom.parent(copy), None);
    }
}
