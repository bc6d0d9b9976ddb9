//! Change events and the document-level event bus.
//!
//! Dispatch is synchronous: `emit` returns after every matching listener ran,
//! in registration order.

use serde::Serialize;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Classification of a single `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Removed,
    Unchanged,
    Changed,
}

impl ChangeType {
    pub fn classify(previous: Option<&Value>, value: Option<&Value>) -> Self {
        match (previous, value) {
            (None, _) => ChangeType::Added,
            (Some(_), None) => ChangeType::Removed,
            (Some(prev), Some(next)) if prev == next => ChangeType::Unchanged,
            _ => ChangeType::Changed,
        }
    }
}

/// Payload of every data update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Address of the entity that changed, e.g. `fields.f1`.
    pub entity: String,
    pub data_path: String,
    pub change_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<Value>,
    pub change_type: ChangeType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventName {
    Updated,
    UpdatedStage,
    UpdatedRow,
    UpdatedColumn,
    UpdatedField,
    AddedRow,
    AddedColumn,
    AddedField,
    Saved,
    Loaded,
    Cleared,
    ConditionUpdated,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Updated => "formeoUpdated",
            EventName::UpdatedStage => "formeoUpdatedStage",
            EventName::UpdatedRow => "formeoUpdatedRow",
            EventName::UpdatedColumn => "formeoUpdatedColumn",
            EventName::UpdatedField => "formeoUpdatedField",
            EventName::AddedRow => "formeoAddedRow",
            EventName::AddedColumn => "formeoAddedColumn",
            EventName::AddedField => "formeoAddedField",
            EventName::Saved => "formeoSaved",
            EventName::Loaded => "formeoLoaded",
            EventName::Cleared => "formeoCleared",
            EventName::ConditionUpdated => "formeoConditionUpdated",
        }
    }

    /// A listener on `Updated` also hears the per-collection update events.
    pub fn matches(&self, emitted: EventName) -> bool {
        *self == emitted
            || (*self == EventName::Updated
                && matches!(
                    emitted,
                    EventName::UpdatedStage
                        | EventName::UpdatedRow
                        | EventName::UpdatedColumn
                        | EventName::UpdatedField
                ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventDetail {
    Change(ChangeEvent),
    Component { address: String },
    Document { id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub name: EventName,
    pub detail: EventDetail,
}

pub type ListenerId = u64;
type Listener = Rc<dyn Fn(&Event)>;

#[derive(Default)]
pub struct EventBus {
    next_id: Cell<ListenerId>,
    listeners: RefCell<BTreeMap<ListenerId, (Option<EventName>, Listener)>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Subscribe to one event name.
    pub fn on<F>(&self, name: EventName, listener: F) -> ListenerId
    where
        F: Fn(&Event) + 'static,
    {
        self.insert(Some(name), Rc::new(listener))
    }

    /// Subscribe to every event.
    pub fn on_any<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Event) + 'static,
    {
        self.insert(None, Rc::new(listener))
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.listeners.borrow_mut().remove(&id).is_some()
    }

    pub fn emit(&self, name: EventName, detail: EventDetail) {
        // Snapshot so listeners may subscribe or emit while being called.
        let targets: Vec<Listener> = self
            .listeners
            .borrow()
            .values()
            .filter(|(filter, _)| filter.is_none_or(|f| f.matches(name)))
            .map(|(_, l)| l.clone())
            .collect();

        tracing::trace!(event = name.as_str(), listeners = targets.len(), "emit");
        let event = Event { name, detail };
        for listener in targets {
            listener(&event);
        }
    }

    fn insert(&self, filter: Option<EventName>, listener: Listener) -> ListenerId {
        let id = self.next_id.get();
        self.next_id.set(id.saturating_add(1));
        self.listeners.borrow_mut().insert(id, (filter, listener));
        id
    }
}
