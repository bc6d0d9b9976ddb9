//! Editor-side property access: conditions read and write component data.
//!
//! | property    | field                                   | option (`options.<i>`) |
//! |-------------|-----------------------------------------|------------------------|
//! | `value`     | `attrs.value`, else checked option values | `value`              |
//! | `isChecked` | `attrs.checked`, or any option checked  | `checked` / `selected` |
//! | `isVisible` | not `attrs.hidden`                      | not `hidden`           |

use super::{
    ClauseReport, ConditionError, PropertyKey, PropertyReader, PropertyWriter, option_index,
    run_rules,
};
use crate::addr::{Address, AddressRoot, join_path};
use crate::components::{Component, ComponentKey, Components};
use crate::data::path::truthy;
use serde_json::Value;

fn flag(component: &Component, path: &str) -> bool {
    component.get(path).is_some_and(truthy)
}

fn option_checked(option: &Value) -> bool {
    ["checked", "selected"]
        .iter()
        .any(|key| option.get(key).is_some_and(truthy))
}

fn options(component: &Component) -> &[Value] {
    component
        .get("options")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn read_component(component: &Component, path: &[String], property: PropertyKey) -> Option<Value> {
    if let Some(index) = option_index(path) {
        let option = component.get(&format!("options.{}", index))?;
        return match property {
            PropertyKey::IsChecked => Some(Value::Bool(option_checked(option))),
            PropertyKey::IsVisible => Some(Value::Bool(!option.get("hidden").is_some_and(truthy))),
            _ => option.get("value").cloned(),
        };
    }
    if !path.is_empty() {
        return component.get(&join_path(path)).cloned();
    }

    match property {
        PropertyKey::IsChecked => {
            let checked = flag(component, "attrs.checked") || options(component).iter().any(option_checked);
            Some(Value::Bool(checked))
        }
        PropertyKey::IsVisible => Some(Value::Bool(!flag(component, "attrs.hidden"))),
        _ => {
            if let Some(value) = component.get("attrs.value") {
                return Some(value.clone());
            }
            let options = options(component);
            if options.is_empty() {
                return None;
            }
            let checked = options
                .iter()
                .filter(|option| option_checked(option))
                .filter_map(|option| option.get("value").cloned())
                .collect();
            Some(Value::Array(checked))
        }
    }
}

fn external_path(address: &Address) -> String {
    let mut path = vec![address.id.clone()];
    path.extend(address.path.iter().cloned());
    join_path(&path)
}

impl PropertyReader for Components {
    fn read_property(&self, address: &Address, property: PropertyKey) -> Option<Value> {
        match address.root {
            AddressRoot::External => self.external().get(&external_path(address)).cloned(),
            AddressRoot::Component(kind) => {
                let component = self.collection(kind).get(&address.id)?;
                read_component(component, &address.path, property)
            }
        }
    }
}

impl PropertyWriter for Components {
    fn write_property(
        &mut self,
        address: &Address,
        property: PropertyKey,
        value: &Value,
    ) -> Result<(), ConditionError> {
        let (property, value) = property.normalize_write(value);
        let kind = match address.root {
            AddressRoot::External => {
                self.external_mut().set(&external_path(address), value);
                return Ok(());
            }
            AddressRoot::Component(kind) => kind,
        };
        let component = self
            .collection_mut(kind)
            .get_mut(&address.id)
            .ok_or_else(|| ConditionError::UnresolvedTarget(address.to_string()))?;

        let (path, value) = match (option_index(&address.path), property) {
            (Some(i), PropertyKey::IsChecked) => (format!("options.{}.checked", i), value),
            (Some(i), PropertyKey::IsVisible) => (format!("options.{}.hidden", i), Value::Bool(!truthy(&value))),
            (Some(i), _) => (format!("options.{}.value", i), value),
            (None, PropertyKey::Value) if address.path.is_empty() => ("attrs.value".to_string(), value),
            (None, PropertyKey::Value) => (address.subpath(), value),
            (None, _) if !address.path.is_empty() => {
                return Err(ConditionError::Unsupported {
                    target: address.to_string(),
                    property,
                });
            }
            (None, PropertyKey::IsChecked) => ("attrs.checked".to_string(), value),
            (None, _) => ("attrs.hidden".to_string(), Value::Bool(!truthy(&value))),
        };
        component.set(&path, value);
        Ok(())
    }
}

impl Components {
    /// Evaluate every condition rule stored on `key` against live data.
    pub fn run_conditions(&mut self, key: &ComponentKey) -> Vec<ClauseReport> {
        let rules = match self.get(key) {
            Some(component) => component.conditions(),
            None => return Vec::new(),
        };
        run_rules(&rules, self)
    }

    /// Run the conditions of every stage and field, in document order.
    pub fn run_all_conditions(&mut self) -> Vec<(ComponentKey, Vec<ClauseReport>)> {
        let keys: Vec<ComponentKey> = self
            .flat_list()
            .values()
            .filter(|component| !component.conditions().is_empty())
            .map(|component| component.key())
            .collect();
        keys.into_iter()
            .map(|key| {
                let reports = self.run_conditions(&key);
                (key, reports)
            })
            .collect()
    }
}
