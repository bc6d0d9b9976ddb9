//! Typed collection of one component kind, keyed by id.

use super::{Component, ComponentType};
use crate::addr::split_path;
use crate::config::CollectionConfig;
use crate::data::{EventBus, EventDetail, new_id, path};
use indexmap::IndexMap;
use serde_json::{Value, json};
use std::rc::Rc;

#[derive(Debug)]
pub struct Collection {
    kind: ComponentType,
    config: CollectionConfig,
    items: IndexMap<String, Component>,
    /// Most recently added component.
    active: Option<String>,
    events: Rc<EventBus>,
}

impl Collection {
    pub fn new(kind: ComponentType, config: CollectionConfig, events: Rc<EventBus>) -> Self {
        Self {
            kind,
            config,
            items: IndexMap::new(),
            active: None,
            events,
        }
    }

    pub fn kind(&self) -> ComponentType {
        self.kind
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.items.values()
    }

    pub fn get(&self, id: &str) -> Option<&Component> {
        self.items.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Component> {
        self.items.get_mut(id)
    }

    /// `<id>[.<path>]` lookup; an id alone yields the component's data.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let segments = split_path(path);
        let (id, rest) = segments.split_first()?;
        path::get_path(self.items.get(id)?.data(), rest)
    }

    pub fn active(&self) -> Option<&Component> {
        self.active.as_deref().and_then(|id| self.items.get(id))
    }

    /// Component factory for this collection. Collection config sits between
    /// the type defaults and the component's own data.
    fn instantiate(&self, id: String, data: Value) -> Component {
        let data = if self.config.is_empty() {
            data
        } else {
            let control_id = path::get_path(&data, &["config", "controlId"])
                .or_else(|| path::get_path(&data, &["meta", "id"]))
                .and_then(Value::as_str);
            let mut layered = json!({ "config": self.config.resolve(control_id, &id) });
            path::deep_merge(&mut layered, &data);
            layered
        };
        Component::new(self.kind, id, data, Some(self.events.clone()))
    }

    /// Create and register a component. The id comes from the argument, then
    /// from `data.id`, then is generated.
    pub fn add(&mut self, id: Option<&str>, data: Value) -> &mut Component {
        let id = id
            .map(str::to_string)
            .or_else(|| {
                data.get("id")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(new_id);

        let component = self.instantiate(id.clone(), data);
        let address = component.address();
        let (index, replaced) = self.items.insert_full(id.clone(), component);
        if replaced.is_some() {
            tracing::debug!(%address, "replaced existing component");
        }
        self.active = Some(id);

        if let Some(name) = self.kind.added_event() {
            self.events.emit(name, EventDetail::Component { address });
        }
        &mut self.items[index]
    }

    /// Replace all contents with `records`, without added events.
    pub fn load(&mut self, records: &IndexMap<String, Value>) {
        self.empty();
        for (id, record) in records {
            let component = self.instantiate(id.clone(), record.clone());
            self.items.insert(id.clone(), component);
        }
        self.active = self.items.keys().last().cloned();
    }

    pub(crate) fn take(&mut self, id: &str) -> Option<Component> {
        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
        self.items.shift_remove(id)
    }

    pub fn empty(&mut self) {
        self.items.clear();
        self.active = None;
    }

    /// Serializable contents keyed by id.
    pub fn get_data(&self) -> IndexMap<String, Value> {
        self.items
            .iter()
            .map(|(id, component)| (id.clone(), component.get_data()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::EventName;
    use serde_json::json;
    use std::cell::RefCell;

    #[test]
    fn add_registers_marks_active_and_announces() {
        let bus = EventBus::new();
        let added = Rc::new(RefCell::new(Vec::new()));
        let a = added.clone();
        bus.on(EventName::AddedField, move |e| {
            if let EventDetail::Component { address } = &e.detail {
                a.borrow_mut().push(address.clone());
            }
        });

        let mut fields = Collection::new(ComponentType::Field, CollectionConfig::default(), bus);
        let id = fields.add(None, json!({"tag": "input"})).id().to_string();
        fields.add(Some("f2"), json!({}));

        assert_eq!(fields.len(), 2);
        assert_eq!(fields.active().map(|c| c.id()), Some("f2"));
        assert_eq!(fields.get_path(&format!("{}.tag", id)), Some(&json!("input")));
        assert_eq!(
            *added.borrow(),
            vec![format!("fields.{}", id), "fields.f2".to_string()]
        );
    }

    #[test]
    fn collection_config_sits_under_instance_data() {
        let config: CollectionConfig = serde_json::from_value(json!({
            "all": {"label": "Untitled", "hideLabel": true},
            "select": {"label": "Choose"},
        }))
        .unwrap();
        let mut fields = Collection::new(ComponentType::Field, config, EventBus::new());

        let plain = fields.add(Some("f1"), json!({})).data().clone();
        assert_eq!(plain["config"]["label"], json!("Untitled"));

        let select = fields
            .add(Some("f2"), json!({"config": {"controlId": "select", "hideLabel": false}}))
            .data()
            .clone();
        assert_eq!(select["config"]["label"], json!("Choose"));
        assert_eq!(select["config"]["hideLabel"], json!(false));
    }

    #[test]
    fn stages_are_not_announced_and_load_replaces() {
        let bus = EventBus::new();
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        bus.on_any(move |_| *c.borrow_mut() += 1);

        let mut stages = Collection::new(ComponentType::Stage, CollectionConfig::default(), bus);
        stages.add(Some("s0"), json!({}));
        assert_eq!(*count.borrow(), 0);

        let mut records = IndexMap::new();
        records.insert("s1".to_string(), json!({"id": "s1", "children": ["r1"]}));
        stages.load(&records);
        assert_eq!(stages.ids(), vec!["s1"]);
        assert_eq!(stages.get("s1").unwrap().children_ids(), vec!["r1"]);
        assert_eq!(*count.borrow(), 0);
    }
}
