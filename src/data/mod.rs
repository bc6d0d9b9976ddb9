//! Entity store: a JSON document with path access and change events.
//!
//! Every component wraps one `Data`; the external (host-supplied) namespace is
//! a bare `Data` as well. Each `set` dispatches exactly one event on the
//! attached bus, synchronously, unless events are disabled for the store.

pub mod event;
pub mod loose;
pub mod path;

pub use event::{ChangeEvent, ChangeType, Event, EventBus, EventDetail, EventName, ListenerId};

use crate::addr::split_path;
use serde_json::{Map, Value};
use std::rc::Rc;
use uuid::Uuid;

/// Fresh entity id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone)]
pub struct Data {
    /// Address prefix of this entity (`fields.f1`, `external`).
    name: String,
    data: Value,
    events: Option<Rc<EventBus>>,
    event_name: EventName,
    disable_events: bool,
}

impl Data {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        let data = if data.is_object() || data.is_array() {
            data
        } else {
            Value::Object(Map::new())
        };
        Self {
            name: name.into(),
            data,
            events: None,
            event_name: EventName::Updated,
            disable_events: false,
        }
    }

    pub fn with_events(mut self, bus: Rc<EventBus>, event_name: EventName) -> Self {
        self.events = Some(bus);
        self.event_name = event_name;
        self
    }

    pub fn set_events_disabled(&mut self, disabled: bool) {
        self.disable_events = disabled;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.data
    }

    pub fn into_value(self) -> Value {
        self.data
    }

    /// Value at a dotted/bracketed path; the empty path is the whole document.
    pub fn get(&self, path: &str) -> Option<&Value> {
        path::get_path(&self.data, &split_path(path))
    }

    /// Write `value` at `path` and return the updated document.
    pub fn set(&mut self, path: &str, value: Value) -> &Value {
        self.write(path, Some(value))
    }

    /// Delete whatever is at `path` through the `set` channel, so listeners see
    /// a `removed` change.
    pub fn unset(&mut self, path: &str) -> &Value {
        self.write(path, None)
    }

    fn write(&mut self, path: &str, value: Option<Value>) -> &Value {
        let segments = split_path(path);
        let previous = match &value {
            Some(v) => path::set_path(&mut self.data, &segments, v.clone()),
            None => path::remove_path(&mut self.data, &segments),
        };
        let change_type = ChangeType::classify(previous.as_ref(), value.as_ref());

        if !self.disable_events {
            if let Some(bus) = &self.events {
                let change_path = if path.is_empty() {
                    self.name.clone()
                } else {
                    format!("{}.{}", self.name, path)
                };
                bus.emit(
                    self.event_name,
                    EventDetail::Change(ChangeEvent {
                        entity: self.name.clone(),
                        data_path: self.name.clone(),
                        change_path,
                        value,
                        previous_value: previous,
                        change_type,
                    }),
                );
            }
        }
        &self.data
    }

    /// Store `data` under `id` (generated when absent) and return the id.
    pub fn add(&mut self, id: Option<&str>, data: Value) -> String {
        let id = id.map(str::to_string).unwrap_or_else(new_id);
        self.set(&id, data);
        id
    }

    /// Delete an object key or array item without emitting.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        path::remove_path(&mut self.data, &split_path(path))
    }

    pub fn empty(&mut self) {
        self.data = Value::Object(Map::new());
    }
}
