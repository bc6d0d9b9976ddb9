//! Component tree: typed collections and the registry that binds them.
//!
//! `Components` owns one collection per component kind plus the external
//! data namespace. Every structural relationship is stored explicitly: a
//! parent lists its children by id in `children`, and each child records its
//! parent id. Both sides are updated together by the operations in `tree`.

mod collection;
mod component;
mod tree;

pub use collection::Collection;
pub use component::Component;

use crate::addr::{Address, AddressRoot, is_internal_address, join_path, split_path};
use crate::conditions::ConditionRule;
use crate::config::{EditorOptions, LoadOptions};
use crate::controls::ControlRegistry;
use crate::data::{Data, EventBus, EventDetail, EventName, new_id};
use crate::diagnostics;
use crate::document::FormDataDocument;
use crate::error::FormError;
use crate::storage::{self, SessionStorage};
use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Stage,
    Row,
    Column,
    Field,
}

impl ComponentType {
    pub const ALL: [ComponentType; 4] = [
        ComponentType::Stage,
        ComponentType::Row,
        ComponentType::Column,
        ComponentType::Field,
    ];

    /// Plural name used in addresses and in the serialized document.
    pub fn collection_name(&self) -> &'static str {
        match self {
            ComponentType::Stage => "stages",
            ComponentType::Row => "rows",
            ComponentType::Column => "columns",
            ComponentType::Field => "fields",
        }
    }

    pub fn singular(&self) -> &'static str {
        match self {
            ComponentType::Stage => "stage",
            ComponentType::Row => "row",
            ComponentType::Column => "column",
            ComponentType::Field => "field",
        }
    }

    /// Accepts singular or plural names.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.collection_name() == name || kind.singular() == name)
    }

    pub fn child(&self) -> Option<ComponentType> {
        match self {
            ComponentType::Stage => Some(ComponentType::Row),
            ComponentType::Row => Some(ComponentType::Column),
            ComponentType::Column => Some(ComponentType::Field),
            ComponentType::Field => None,
        }
    }

    pub fn parent(&self) -> Option<ComponentType> {
        match self {
            ComponentType::Stage => None,
            ComponentType::Row => Some(ComponentType::Stage),
            ComponentType::Column => Some(ComponentType::Row),
            ComponentType::Field => Some(ComponentType::Column),
        }
    }

    pub fn updated_event(&self) -> EventName {
        match self {
            ComponentType::Stage => EventName::UpdatedStage,
            ComponentType::Row => EventName::UpdatedRow,
            ComponentType::Column => EventName::UpdatedColumn,
            ComponentType::Field => EventName::UpdatedField,
        }
    }

    /// Stages are never announced; a document always has one.
    pub fn added_event(&self) -> Option<EventName> {
        match self {
            ComponentType::Stage => None,
            ComponentType::Row => Some(EventName::AddedRow),
            ComponentType::Column => Some(EventName::AddedColumn),
            ComponentType::Field => Some(EventName::AddedField),
        }
    }

    pub fn default_data(&self) -> Value {
        match self {
            ComponentType::Stage => json!({"children": []}),
            ComponentType::Row => json!({
                "children": [],
                "className": "f-row",
                "config": {"fieldset": false, "legend": "", "inputGroup": false},
            }),
            ComponentType::Column => json!({
                "children": [],
                "config": {"width": "100%"},
            }),
            ComponentType::Field => json!({
                "tag": "input",
                "attrs": {},
                "config": {"label": ""},
                "meta": {},
            }),
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.singular())
    }
}

/// Kind plus id: enough to find a component in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKey {
    pub kind: ComponentType,
    pub id: String,
}

impl ComponentKey {
    pub fn new(kind: ComponentType, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn address(&self) -> Address {
        Address::component(self.kind, self.id.clone())
    }

    /// Component named by an internal address, ignoring any nested path.
    pub fn parse(address: &str) -> Option<Self> {
        let addr = Address::parse(address)?;
        Some(Self::new(addr.component_type()?, addr.id))
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind.collection_name(), self.id)
    }
}

/// Structural lifecycle of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    /// Registered but not listed by any parent.
    Unattached,
    Attached,
    /// No longer registered.
    Removed,
}

/// Result of an address lookup: a whole component, or a value inside one.
#[derive(Debug, Clone, Copy)]
pub enum Resolved<'a> {
    Component(&'a Component),
    Value(&'a Value),
}

impl<'a> Resolved<'a> {
    pub fn value(&self) -> &'a Value {
        match self {
            Resolved::Component(c) => c.data(),
            Resolved::Value(v) => v,
        }
    }
}

/// Referenced component address => components whose conditions mention it.
pub type ConditionMap = IndexMap<String, Vec<ComponentKey>>;

#[derive(Debug)]
pub struct Components {
    id: String,
    stages: Collection,
    rows: Collection,
    columns: Collection,
    fields: Collection,
    external: Data,
    controls: ControlRegistry,
    events: Rc<EventBus>,
    condition_map: BTreeMap<ComponentType, ConditionMap>,
    storage: Option<Box<dyn SessionStorage>>,
    options: EditorOptions,
}

impl Default for Components {
    fn default() -> Self {
        Self::new(EditorOptions::default())
    }
}

impl Components {
    /// Empty document holding a single stage.
    pub fn new(options: EditorOptions) -> Self {
        let events = EventBus::new();
        let collection = |kind: ComponentType| {
            Collection::new(kind, options.config.for_kind(kind).clone(), events.clone())
        };
        let mut controls = ControlRegistry::with_defaults();
        controls.apply_options(&options.controls);

        let mut components = Self {
            id: new_id(),
            stages: collection(ComponentType::Stage),
            rows: collection(ComponentType::Row),
            columns: collection(ComponentType::Column),
            fields: collection(ComponentType::Field),
            external: Data::new("external", Value::Object(options.external.clone()))
                .with_events(events.clone(), EventName::Updated),
            controls,
            events,
            condition_map: BTreeMap::new(),
            storage: None,
            options,
        };
        components.ensure_stage();
        components
    }

    pub fn with_storage(mut self, storage: impl SessionStorage + 'static) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &EditorOptions {
        &self.options
    }

    pub fn events(&self) -> &Rc<EventBus> {
        &self.events
    }

    pub fn controls(&self) -> &ControlRegistry {
        &self.controls
    }

    pub fn controls_mut(&mut self) -> &mut ControlRegistry {
        &mut self.controls
    }

    pub fn external(&self) -> &Data {
        &self.external
    }

    pub fn external_mut(&mut self) -> &mut Data {
        &mut self.external
    }

    pub fn storage(&self) -> Option<&dyn SessionStorage> {
        self.storage.as_deref()
    }

    pub fn collection(&self, kind: ComponentType) -> &Collection {
        match kind {
            ComponentType::Stage => &self.stages,
            ComponentType::Row => &self.rows,
            ComponentType::Column => &self.columns,
            ComponentType::Field => &self.fields,
        }
    }

    pub fn collection_mut(&mut self, kind: ComponentType) -> &mut Collection {
        match kind {
            ComponentType::Stage => &mut self.stages,
            ComponentType::Row => &mut self.rows,
            ComponentType::Column => &mut self.columns,
            ComponentType::Field => &mut self.fields,
        }
    }

    pub fn get(&self, key: &ComponentKey) -> Option<&Component> {
        self.collection(key.kind).get(&key.id)
    }

    pub fn get_mut(&mut self, key: &ComponentKey) -> Option<&mut Component> {
        self.collection_mut(key.kind).get_mut(&key.id)
    }

    pub fn contains(&self, key: &ComponentKey) -> bool {
        self.collection(key.kind).contains(&key.id)
    }

    pub fn state(&self, key: &ComponentKey) -> ComponentState {
        match self.get(key) {
            None => ComponentState::Removed,
            Some(c) if c.kind() == ComponentType::Stage || c.parent_id().is_some() => {
                ComponentState::Attached
            }
            Some(_) => ComponentState::Unattached,
        }
    }

    /// Stage ids in document order.
    pub fn stage_ids(&self) -> Vec<String> {
        self.stages.ids()
    }

    pub fn first_stage(&self) -> Option<ComponentKey> {
        self.stages
            .iter()
            .next()
            .map(|stage| stage.key())
    }

    /// Collection config for one component, `all` then control then id.
    pub fn config_for(&self, key: &ComponentKey) -> Value {
        let control_id = self.get(key).and_then(Component::control_id);
        self.collection(key.kind).config().resolve(control_id, &key.id)
    }

    fn ensure_stage(&mut self) {
        if self.stages.is_empty() {
            let id = new_id();
            self.stages.add(Some(&id), json!({}));
        }
    }

    /// Replace all in-memory state with `document`.
    ///
    /// With session storage enabled, a stored snapshot is layered over the
    /// incoming document first. Returns the composed document.
    pub fn load(&mut self, document: FormDataDocument, opts: LoadOptions) -> FormDataDocument {
        let mut document = document;
        let use_session = opts.session_storage.unwrap_or(self.options.session_storage);
        if use_session {
            if let Some(snapshot) = self.storage.as_deref().and_then(storage::load_snapshot) {
                tracing::debug!(id = %snapshot.id, "merging session snapshot");
                document.merge_snapshot(snapshot);
            }
        }

        self.id = if document.id.is_empty() {
            new_id()
        } else {
            document.id.clone()
        };
        for kind in ComponentType::ALL {
            self.collection_mut(kind).load(document.collection(kind));
        }
        self.ensure_stage();

        for stage in self.stage_ids() {
            self.load_children(&ComponentKey::new(ComponentType::Stage, stage));
        }
        for component in self.flat_list().values() {
            if component.kind() != ComponentType::Stage && component.parent_id().is_none() {
                diagnostics::warn(format!("{} is not referenced by any parent", component.address()));
            }
        }
        self.refresh_condition_map();

        tracing::debug!(
            id = %self.id,
            rows = self.rows.len(),
            columns = self.columns.len(),
            fields = self.fields.len(),
            "loaded form"
        );
        self.events
            .emit(EventName::Loaded, EventDetail::Document { id: self.id.clone() });
        self.get_data()
    }

    pub fn load_json(&mut self, json: &str, opts: LoadOptions) -> crate::Result<FormDataDocument> {
        let document = FormDataDocument::from_json(json).context("failed to load form data")?;
        Ok(self.load(document, opts))
    }

    /// Serializable snapshot of every collection.
    pub fn get_data(&self) -> FormDataDocument {
        FormDataDocument {
            schema: None,
            id: self.id.clone(),
            stages: self.stages.get_data(),
            rows: self.rows.get_data(),
            columns: self.columns.get_data(),
            fields: self.fields.get_data(),
        }
    }

    /// Document JSON including the `$schema` reference.
    pub fn json(&self) -> crate::Result<String> {
        let mut document = self.get_data();
        document.schema = Some(self.options.schema_url.clone());
        document.to_json()
    }

    /// Serialize, persist to session storage when enabled, and announce.
    pub fn save(&mut self) -> FormDataDocument {
        let document = self.get_data();
        if self.options.session_storage {
            if let Some(store) = self.storage.as_deref_mut() {
                storage::store_snapshot(store, &document);
            }
        }
        self.events
            .emit(EventName::Saved, EventDetail::Document { id: self.id.clone() });
        document
    }

    /// Drop every component and start over with one empty stage.
    pub fn clear(&mut self) {
        for kind in ComponentType::ALL {
            self.collection_mut(kind).empty();
        }
        self.condition_map.clear();
        self.ensure_stage();
        if let Some(store) = self.storage.as_deref_mut() {
            store.remove(storage::SESSION_KEY);
        }
        self.events
            .emit(EventName::Cleared, EventDetail::Document { id: self.id.clone() });
    }

    /// Resolve an address to a component or a value inside one.
    ///
    /// Returns `None` for strings that are not addresses and for addresses
    /// that point at nothing.
    pub fn get_address(&self, address: &str) -> Option<Resolved<'_>> {
        let addr = Address::parse(address)?;
        match addr.root {
            AddressRoot::External => {
                let mut path = vec![addr.id.clone()];
                path.extend(addr.path.iter().cloned());
                self.external.get(&join_path(&path)).map(Resolved::Value)
            }
            AddressRoot::Component(kind) => {
                let component = self.collection(kind).get(&addr.id)?;
                if addr.path.is_empty() {
                    Some(Resolved::Component(component))
                } else {
                    component.get(&addr.subpath()).map(Resolved::Value)
                }
            }
        }
    }

    /// Canonical cross-component write.
    ///
    /// Writes to `children` re-link the tree; writes under `conditions`
    /// refresh the condition map.
    pub fn set_address(&mut self, address: &str, value: Value) -> Result<(), FormError> {
        let addr =
            Address::parse(address).ok_or_else(|| FormError::InvalidAddress(address.to_string()))?;
        let kind = match addr.root {
            AddressRoot::External => {
                let mut path = vec![addr.id.clone()];
                path.extend(addr.path.iter().cloned());
                self.external.set(&join_path(&path), value);
                return Ok(());
            }
            AddressRoot::Component(kind) => kind,
        };

        let key = ComponentKey::new(kind, addr.id.clone());
        if !self.contains(&key) {
            return Err(FormError::ComponentNotFound(key.to_string()));
        }

        match addr.path.first().map(String::as_str) {
            Some("children") if addr.path.len() == 1 => {
                let ids = value
                    .as_array()
                    .map(|ids| {
                        ids.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                self.replace_children(&key, ids);
            }
            Some("conditions") => {
                if let Some(component) = self.get_mut(&key) {
                    component.set(&addr.subpath(), value);
                }
                self.refresh_condition_map();
                self.events.emit(
                    EventName::ConditionUpdated,
                    EventDetail::Component {
                        address: key.to_string(),
                    },
                );
            }
            _ => {
                if let Some(component) = self.get_mut(&key) {
                    component.set(&addr.subpath(), value);
                }
            }
        }
        Ok(())
    }

    /// Components whose conditions reference `address`.
    pub fn get_condition_map(&self, address: &str) -> &[ComponentKey] {
        let Some(key) = ComponentKey::parse(address) else {
            return &[];
        };
        self.condition_map
            .get(&key.kind)
            .and_then(|map| map.get(&key.to_string()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Record that `referencing` has a condition mentioning `address`.
    pub fn set_condition_map(&mut self, address: &str, referencing: ComponentKey) {
        let Some(key) = ComponentKey::parse(address) else {
            return;
        };
        let entry = self
            .condition_map
            .entry(key.kind)
            .or_default()
            .entry(key.to_string())
            .or_default();
        if !entry.contains(&referencing) {
            entry.push(referencing);
        }
    }

    pub fn remove_condition_map(&mut self, address: &str) -> Option<Vec<ComponentKey>> {
        let key = ComponentKey::parse(address)?;
        self.condition_map
            .get_mut(&key.kind)?
            .shift_remove(&key.to_string())
    }

    /// Drop every trace of `key` from the condition map.
    fn forget_conditions(&mut self, key: &ComponentKey) {
        let address = key.to_string();
        for map in self.condition_map.values_mut() {
            map.shift_remove(&address);
            for referencing in map.values_mut() {
                referencing.retain(|k| k != key);
            }
            map.retain(|_, referencing| !referencing.is_empty());
        }
    }

    /// Rebuild the condition map from every stage's and field's conditions.
    pub fn refresh_condition_map(&mut self) {
        let mut references: Vec<(String, ComponentKey)> = Vec::new();
        for component in self.stages.iter().chain(self.fields.iter()) {
            for rule in component.conditions() {
                for address in rule_addresses(&rule) {
                    references.push((address, component.key()));
                }
            }
        }

        self.condition_map.clear();
        for (address, referencing) in references {
            self.set_condition_map(&address, referencing);
        }
    }

    /// Every component keyed by `type.id`, stages first.
    pub fn flat_list(&self) -> IndexMap<String, &Component> {
        ComponentType::ALL
            .into_iter()
            .flat_map(|kind| self.collection(kind).iter())
            .map(|component| (component.address(), component))
            .collect()
    }
}

/// Internal addresses a rule reads from or writes to.
fn rule_addresses(rule: &ConditionRule) -> Vec<String> {
    let clause_addresses = rule.when.iter().flat_map(|clause| {
        let target = clause.target.as_str();
        [Some(clause.source.as_str()), target]
    });
    let result_addresses = rule.then.iter().map(|clause| Some(clause.target.as_str()));

    clause_addresses
        .chain(result_addresses)
        .flatten()
        .filter(|address| is_internal_address(address))
        .filter_map(|address| {
            let segments = split_path(address);
            (segments.len() >= 2).then(|| join_path(&segments[..2]))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn type_names_and_hierarchy() {
        assert_eq!(ComponentType::from_name("field"), Some(ComponentType::Field));
        assert_eq!(ComponentType::from_name("rows"), Some(ComponentType::Row));
        assert_eq!(ComponentType::from_name("external"), None);
        assert_eq!(ComponentType::Stage.child(), Some(ComponentType::Row));
        assert_eq!(ComponentType::Field.child(), None);
        assert_eq!(ComponentType::Column.parent(), Some(ComponentType::Row));
        assert_eq!(ComponentType::Stage.added_event(), None);
    }

    #[test]
    fn new_registry_has_one_stage() {
        let components = Components::default();
        assert_eq!(components.stage_ids().len(), 1);
        let stage = components.first_stage().unwrap();
        assert_eq!(components.state(&stage), ComponentState::Attached);
    }

    #[test]
    fn addresses_resolve_to_components_values_and_external_data() {
        let mut options = EditorOptions::default();
        options
            .external
            .insert("user".into(), json!({"name": "ada"}));
        let mut components = Components::new(options);
        let stage = components.first_stage().unwrap();
        let field = components.add_control_to_stage(&stage, "text-input").unwrap();
        let address = field.to_string();

        assert!(matches!(
            components.get_address(&address),
            Some(Resolved::Component(_))
        ));
        assert_eq!(
            components
                .get_address(&format!("{}.tag", address))
                .map(|r| r.value().clone()),
            Some(json!("input"))
        );
        assert_eq!(
            components
                .get_address("external.user.name")
                .map(|r| r.value().clone()),
            Some(json!("ada"))
        );
        assert!(components.get_address("not an address").is_none());

        components
            .set_address(&format!("field.{}.attrs.placeholder", field.id), json!("Name"))
            .unwrap();
        assert_eq!(
            components.get(&field).unwrap().get("attrs.placeholder"),
            Some(&json!("Name"))
        );
        assert_eq!(
            components.set_address("fields.missing.tag", json!("x")),
            Err(FormError::ComponentNotFound("fields.missing".into()))
        );
        assert_eq!(
            components.set_address("nope", json!(1)),
            Err(FormError::InvalidAddress("nope".into()))
        );
    }

    #[test]
    fn out_of_range_option_index_is_ignored() {
        let mut components = Components::default();
        let stage = components.first_stage().unwrap();
        let select = components.add_control_to_stage(&stage, "select").unwrap();
        let before = components.get(&select).unwrap().get("options").cloned();

        let far = format!("{}.options.{}.label", select, usize::MAX);
        assert_eq!(components.set_address(&far, json!("x")), Ok(()));
        let gap = format!("{}.options.40.label", select);
        assert_eq!(components.set_address(&gap, json!("x")), Ok(()));
        assert_eq!(components.get(&select).unwrap().get("options").cloned(), before);

        components
            .set_address(&format!("{}.options.3.label", select), json!("Option 4"))
            .unwrap();
        assert_eq!(
            components.get(&select).unwrap().get("options.3.label"),
            Some(&json!("Option 4"))
        );
    }

    #[test]
    fn condition_map_tracks_references() {
        let mut components = Components::default();
        let stage = components.first_stage().unwrap();
        let a = components.add_control_to_stage(&stage, "checkbox").unwrap();
        let b = components.add_control_to_stage(&stage, "text-input").unwrap();

        let rule = json!([{
            "if": [{"source": a.to_string(), "sourceProperty": "isChecked", "comparison": "equals", "target": "true"}],
            "then": [{"target": b.to_string(), "targetProperty": "isNotVisible", "assignment": "equals", "value": true}]
        }]);
        components
            .set_address(&format!("{}.conditions", a), rule)
            .unwrap();

        assert_eq!(components.get_condition_map(&b.to_string()), &[a.clone()]);
        assert_eq!(
            components.get_condition_map(&format!("{}.attrs.value", b)),
            &[a.clone()]
        );

        components.remove(&a);
        assert!(components.get_condition_map(&b.to_string()).is_empty());
    }

    #[test]
    fn flat_list_spans_collections() {
        let mut components = Components::default();
        let stage = components.first_stage().unwrap();
        let field = components.add_control_to_stage(&stage, "text-input").unwrap();
        let list = components.flat_list();
        assert_eq!(list.len(), 4);
        assert!(list.contains_key(&stage.to_string()));
        assert!(list.contains_key(&field.to_string()));
    }
}
