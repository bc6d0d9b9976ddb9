//! Condition rules against the rendered DOM.
//!
//! Each `if` clause gets one listener on every node its source and target
//! resolve to; firing it re-runs only that clause. All clauses also run once
//! when the form is mounted.

use super::{EventKind, Listener, ListenerAction, NodeId, Rendered};
use crate::addr::{Address, AddressRoot};
use crate::components::ComponentType;
use crate::conditions::{
    ClauseReport, ConditionError, PropertyKey, PropertyReader, PropertyWriter, option_index,
    run_clause,
};
use crate::data::path::{get_path, set_path, stringify, truthy};
use serde_json::Value;

impl Rendered {
    pub(super) fn apply_conditions(&mut self) {
        let mut bindings = Vec::new();
        for (owner, bound) in self.bound.iter().enumerate() {
            for (rule_index, rule) in bound.rules.iter().enumerate() {
                for (clause_index, clause) in rule.when.iter().enumerate() {
                    let mut nodes = self.resolve_nodes(&clause.source);
                    if let Some(target) = clause.target.as_str() {
                        nodes.extend(self.resolve_nodes(target));
                    }
                    let action = ListenerAction::Condition {
                        owner,
                        rule: rule_index,
                        clause: clause_index,
                    };
                    bindings.extend(nodes.into_iter().map(|node| (node, action.clone())));
                }
            }
        }

        for (node, action) in bindings {
            let event = self.event_kind(node);
            self.dom.add_listener(node, Listener { event, action });
        }

        for owner in 0..self.bound.len() {
            let clauses: Vec<(usize, usize)> = self.bound[owner]
                .rules
                .iter()
                .enumerate()
                .flat_map(|(r, rule)| (0..rule.when.len()).map(move |c| (r, c)))
                .collect();
            for (rule, clause) in clauses {
                self.run_bound(owner, rule, clause);
            }
        }
    }

    /// Run one clause of a bound rule set.
    pub(super) fn run_bound(&mut self, owner: usize, rule: usize, clause: usize) -> Option<ClauseReport> {
        let definition = self.bound.get(owner)?.rules.get(rule)?.clone();
        if clause >= definition.when.len() {
            return None;
        }
        let outcome = run_clause(&definition, clause, self);
        Some(ClauseReport {
            rule,
            clause,
            matched: outcome.is_some(),
            results: outcome.unwrap_or_default(),
        })
    }

    /// Nodes whose events should re-run a clause that reads `address`.
    fn resolve_nodes(&self, address: &str) -> Vec<NodeId> {
        let Some(address) = Address::parse(address) else {
            return Vec::new();
        };
        if address.root != AddressRoot::Component(ComponentType::Field) {
            return Vec::new();
        }
        let Some(field) = self.fields.get(&address.id) else {
            return Vec::new();
        };
        match option_index(&address.path) {
            Some(i) => field.options.get(i).copied().into_iter().collect(),
            None if field.group => field.options.clone(),
            None => vec![field.node],
        }
    }

    pub(super) fn event_kind(&self, node: NodeId) -> EventKind {
        match (self.dom.tag(node), self.dom.input_type(node)) {
            (Some("select"), _) | (_, Some("checkbox" | "radio")) => EventKind::Change,
            _ => EventKind::Input,
        }
    }

    fn set_hidden(&mut self, node: NodeId, hidden: bool) {
        if hidden {
            self.dom.set_attr(node, "hidden", "");
        } else {
            self.dom.remove_attr(node, "hidden");
        }
    }

    /// Element that shows or hides an option: its holder for groups.
    fn option_holder(&self, field_group: bool, option: NodeId) -> NodeId {
        if field_group {
            self.dom.parent(option).unwrap_or(option)
        } else {
            option
        }
    }

    fn external_segments(address: &Address) -> Vec<String> {
        let mut segments = vec![address.id.clone()];
        segments.extend(address.path.iter().cloned());
        segments
    }
}

impl PropertyReader for Rendered {
    fn read_property(&self, address: &Address, property: PropertyKey) -> Option<Value> {
        let kind = match address.root {
            AddressRoot::External => {
                return get_path(&self.external, &Self::external_segments(address)).cloned();
            }
            AddressRoot::Component(kind) => kind,
        };

        if kind != ComponentType::Field {
            let node = self.container(&format!("{}.{}", kind.collection_name(), address.id))?;
            return match property {
                PropertyKey::IsVisible => Some(Value::Bool(self.dom.is_visible(node))),
                _ => None,
            };
        }

        let field = self.fields.get(&address.id)?;
        if let Some(i) = option_index(&address.path) {
            let option = *field.options.get(i)?;
            return Some(match property {
                PropertyKey::IsChecked => Value::Bool(self.dom.is_checked(option)),
                PropertyKey::IsVisible => {
                    Value::Bool(self.dom.is_visible(self.option_holder(field.group, option)))
                }
                _ => Value::String(self.dom.value(option)),
            });
        }
        if let [attrs, name] = address.path.as_slice() {
            if attrs == "attrs" {
                return self.dom.attr(field.node, name).map(|v| Value::String(v.to_string()));
            }
        }
        if !address.path.is_empty() {
            return None;
        }

        Some(match property {
            PropertyKey::IsChecked if field.group => {
                Value::Bool(field.options.iter().any(|o| self.dom.is_checked(*o)))
            }
            PropertyKey::IsChecked => Value::Bool(self.dom.is_checked(field.node)),
            PropertyKey::IsVisible => Value::Bool(self.dom.is_visible(field.wrapper)),
            _ if field.group => Value::Array(
                field
                    .options
                    .iter()
                    .filter(|o| self.dom.is_checked(**o))
                    .map(|o| Value::String(self.dom.value(*o)))
                    .collect(),
            ),
            _ => Value::String(self.dom.value(field.node)),
        })
    }
}

impl PropertyWriter for Rendered {
    fn write_property(
        &mut self,
        address: &Address,
        property: PropertyKey,
        value: &Value,
    ) -> Result<(), ConditionError> {
        let (property, value) = property.normalize_write(value);
        let unsupported = || ConditionError::Unsupported {
            target: address.to_string(),
            property,
        };
        let kind = match address.root {
            AddressRoot::External => {
                if !self.external.is_object() {
                    self.external = Value::Object(Default::default());
                }
                set_path(&mut self.external, &Self::external_segments(address), value);
                return Ok(());
            }
            AddressRoot::Component(kind) => kind,
        };

        if kind != ComponentType::Field {
            let node = self
                .container(&format!("{}.{}", kind.collection_name(), address.id))
                .ok_or_else(|| ConditionError::UnresolvedTarget(address.to_string()))?;
            return match property {
                PropertyKey::IsVisible if address.path.is_empty() => {
                    self.set_hidden(node, !truthy(&value));
                    Ok(())
                }
                _ => Err(unsupported()),
            };
        }

        let field = self
            .fields
            .get(&address.id)
            .cloned()
            .ok_or_else(|| ConditionError::UnresolvedTarget(address.to_string()))?;

        if let Some(i) = option_index(&address.path) {
            let option = *field
                .options
                .get(i)
                .ok_or_else(|| ConditionError::UnresolvedTarget(address.to_string()))?;
            match property {
                PropertyKey::IsChecked => self.dom.set_checked(option, truthy(&value)),
                PropertyKey::IsVisible => {
                    let holder = self.option_holder(field.group, option);
                    self.set_hidden(holder, !truthy(&value));
                }
                _ => self.dom.set_attr(option, "value", stringify(&value)),
            }
            return Ok(());
        }
        if !address.path.is_empty() {
            return match (address.path.as_slice(), property) {
                ([attrs, name], PropertyKey::Value) if attrs == "attrs" => {
                    self.dom.set_attr(field.node, name, stringify(&value));
                    Ok(())
                }
                _ => Err(unsupported()),
            };
        }

        match property {
            PropertyKey::IsVisible => self.set_hidden(field.wrapper, !truthy(&value)),
            PropertyKey::IsChecked if field.group => {
                for option in &field.options {
                    self.dom.set_checked(*option, truthy(&value));
                }
            }
            PropertyKey::IsChecked => self.dom.set_checked(field.node, truthy(&value)),
            _ if field.group => {
                let wanted: Vec<String> = match &value {
                    Value::Array(items) => items.iter().map(stringify).collect(),
                    other => vec![stringify(other)],
                };
                for option in &field.options {
                    let checked = wanted.contains(&self.dom.value(*option));
                    self.dom.set_checked(*option, checked);
                }
            }
            _ => self.dom.set_value(field.node, &stringify(&value)),
        }
        Ok(())
    }
}
