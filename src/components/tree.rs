//! Structural operations: parent/children, add, move, remove, clone.

use super::{Component, ComponentKey, ComponentType, Components};
use crate::addr::{join_path, split_path};
use crate::data::new_id;
use crate::diagnostics;
use crate::error::FormError;
use serde_json::{Value, json};

impl Components {
    pub fn parent(&self, key: &ComponentKey) -> Option<&Component> {
        let component = self.get(key)?;
        let parent_kind = key.kind.parent()?;
        self.collection(parent_kind).get(component.parent_id()?)
    }

    pub fn parent_key(&self, key: &ComponentKey) -> Option<ComponentKey> {
        self.parent(key).map(Component::key)
    }

    /// Live children in display order. Ids that do not resolve are skipped.
    pub fn children(&self, key: &ComponentKey) -> Vec<&Component> {
        let Some(component) = self.get(key) else {
            return Vec::new();
        };
        let Some(child_kind) = key.kind.child() else {
            return Vec::new();
        };
        let collection = self.collection(child_kind);
        component
            .children_ids()
            .iter()
            .filter_map(|id| {
                let child = collection.get(id);
                if child.is_none() {
                    diagnostics::warn(format!(
                        "{} lists missing child {}.{}",
                        key,
                        child_kind.collection_name(),
                        id
                    ));
                }
                child
            })
            .collect()
    }

    pub fn child_keys(&self, key: &ComponentKey) -> Vec<ComponentKey> {
        self.children(key).into_iter().map(Component::key).collect()
    }

    /// Add a child under `parent` at `index` (default: end).
    ///
    /// `data` may name an existing component by id, which is then moved here;
    /// for fields it may name a control id, which instantiates that control.
    /// Anything else creates a new component from `data`.
    pub fn add_child(
        &mut self,
        parent: &ComponentKey,
        data: Option<Value>,
        index: Option<usize>,
    ) -> Result<ComponentKey, FormError> {
        if !self.contains(parent) {
            return Err(FormError::ComponentNotFound(parent.to_string()));
        }
        let child_kind = parent
            .kind
            .child()
            .ok_or_else(|| FormError::NoChildType(parent.to_string()))?;

        let data = match data {
            Some(Value::String(id)) => json!({ "id": id }),
            Some(data) => data,
            None => json!({}),
        };
        let requested = data
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        let child = match requested {
            Some(id) if self.collection(child_kind).contains(&id) => {
                let key = ComponentKey::new(child_kind, id);
                self.detach(&key);
                key
            }
            Some(id) if child_kind == ComponentType::Field && self.controls.contains(&id) => {
                let template = self.controls.instantiate(&id, None)?;
                self.fields.add(None, template).key()
            }
            requested => self
                .collection_mut(child_kind)
                .add(requested.as_deref(), data)
                .key(),
        };

        self.insert_child(parent, &child, index);
        self.load_children(&child);
        self.refresh_if_conditional(&child);
        tracing::debug!(parent = %parent, child = %child, "added child");
        Ok(child)
    }

    /// Rebuild the condition map when `key` carries conditions of its own.
    fn refresh_if_conditional(&mut self, key: &ComponentKey) {
        if self.get(key).is_some_and(|c| c.get("conditions").is_some()) {
            self.refresh_condition_map();
        }
    }

    /// Link `child` into `parent.children` at `index`, clamped to the end.
    fn insert_child(&mut self, parent: &ComponentKey, child: &ComponentKey, index: Option<usize>) {
        let Some(parent_component) = self.get_mut(parent) else {
            return;
        };
        let mut ids = parent_component.children_ids();
        ids.retain(|id| id != &child.id);
        let at = index.unwrap_or(ids.len()).min(ids.len());
        ids.insert(at, child.id.clone());
        parent_component.set_children(ids);

        if let Some(component) = self.get_mut(child) {
            component.set_parent(Some(parent.id.clone()));
        }
        if child.kind == ComponentType::Column {
            self.auto_column_widths(parent);
        }
    }

    /// Unlink `key` from its parent, leaving it registered but unattached.
    pub fn detach(&mut self, key: &ComponentKey) {
        let Some(parent) = self.parent_key(key) else {
            if let Some(component) = self.get_mut(key) {
                component.set_parent(None);
            }
            return;
        };
        if let Some(parent_component) = self.get_mut(&parent) {
            let mut ids = parent_component.children_ids();
            ids.retain(|id| id != &key.id);
            parent_component.set_children(ids);
        }
        if let Some(component) = self.get_mut(key) {
            component.set_parent(None);
        }
        if key.kind == ComponentType::Column {
            self.auto_column_widths(&parent);
        }
    }

    /// Point every listed descendant of `key` back at its parent.
    pub(crate) fn load_children(&mut self, key: &ComponentKey) {
        let Some(child_kind) = key.kind.child() else {
            return;
        };
        let ids = match self.get(key) {
            Some(component) => component.children_ids(),
            None => return,
        };
        for id in ids {
            let child = ComponentKey::new(child_kind, id);
            match self.get_mut(&child) {
                Some(component) => component.set_parent(Some(key.id.clone())),
                None => {
                    diagnostics::warn(format!("{} lists missing child {}", key, child));
                    continue;
                }
            }
            self.load_children(&child);
        }
    }

    /// Replace the whole child list of `key`, re-linking both sides.
    pub(crate) fn replace_children(&mut self, key: &ComponentKey, ids: Vec<String>) {
        let Some(child_kind) = key.kind.child() else {
            diagnostics::warn(format!("{} cannot hold children", key));
            return;
        };
        let previous = self.get(key).map(Component::children_ids).unwrap_or_default();
        for id in previous.iter().filter(|id| !ids.contains(id)) {
            if let Some(component) = self.get_mut(&ComponentKey::new(child_kind, id.clone())) {
                component.set_parent(None);
            }
        }
        for id in &ids {
            let child = ComponentKey::new(child_kind, id.clone());
            let other_parent = self
                .parent_key(&child)
                .filter(|parent| parent != key);
            if other_parent.is_some() {
                self.detach(&child);
            }
        }
        if let Some(component) = self.get_mut(key) {
            component.set_children(ids);
        }
        self.load_children(key);
        if child_kind == ComponentType::Column {
            self.auto_column_widths(key);
        }
    }

    /// Remove a component and all of its descendants.
    ///
    /// Stages are never removed; a document always keeps at least one.
    pub fn remove(&mut self, key: &ComponentKey) -> Option<Component> {
        if key.kind == ComponentType::Stage {
            diagnostics::warn(format!("refusing to remove {}", key));
            return None;
        }
        if !self.contains(key) {
            return None;
        }

        for child in self.child_keys(key) {
            self.remove(&child);
        }
        self.detach(key);
        self.forget_conditions(key);
        let removed = self.collection_mut(key.kind).take(&key.id);
        tracing::debug!(component = %key, "removed");
        removed
    }

    pub fn remove_many(&mut self, keys: &[ComponentKey]) -> Vec<Component> {
        keys.iter().filter_map(|key| self.remove(key)).collect()
    }

    /// Delete a nested property or array item of one component and return the
    /// container it was removed from.
    pub fn remove_path(&mut self, key: &ComponentKey, path: &str) -> Option<Value> {
        let segments = split_path(path);
        let (_, parents) = segments.split_last()?;
        let component = self.get_mut(key)?;
        component.unset(path);
        component.get(&join_path(parents)).cloned()
    }

    /// Deep-copy a component (and, for containers, its subtree) under a new
    /// id. Without an explicit parent the clone lands right after the original.
    ///
    /// Condition addresses inside the copy are left as they were; the copy is
    /// registered in the condition map as another referencing component.
    pub fn clone_component(
        &mut self,
        key: &ComponentKey,
        parent: Option<&ComponentKey>,
    ) -> Result<ComponentKey, FormError> {
        let source = self
            .get(key)
            .ok_or_else(|| FormError::ComponentNotFound(key.to_string()))?;
        let mut data = source.data().clone();
        let children = self.child_keys(key);
        let original_parent = self.parent_key(key);

        let id = new_id();
        if let Some(obj) = data.as_object_mut() {
            obj.insert("id".to_string(), json!(id));
            if key.kind.child().is_some() {
                obj.insert("children".to_string(), json!([]));
            }
        }

        let target = parent.cloned().or_else(|| original_parent.clone());
        let clone = match target {
            Some(target) => {
                let index = if Some(&target) == original_parent.as_ref() {
                    self.get(&target)
                        .and_then(|p| p.children_ids().iter().position(|c| c == &key.id))
                        .map(|i| i + 1)
                } else {
                    None
                };
                self.add_child(&target, Some(data), index)?
            }
            None => {
                let clone = self.collection_mut(key.kind).add(Some(&id), data).key();
                self.refresh_if_conditional(&clone);
                clone
            }
        };

        for child in children {
            self.clone_component(&child, Some(&clone))?;
        }
        Ok(clone)
    }

    /// Spread the row's width evenly over its columns.
    pub fn auto_column_widths(&mut self, row: &ComponentKey) {
        let columns = self.child_keys(row);
        if columns.is_empty() {
            return;
        }
        let width = (1000.0 / columns.len() as f64).round() / 10.0;
        let width = json!(format!("{}%", width));
        for column in columns {
            if let Some(component) = self.get_mut(&column) {
                component.set("config.width", width.clone());
            }
        }
    }

    /// New field from a control, placed in `column` at `index`.
    pub fn add_control(
        &mut self,
        column: &ComponentKey,
        control_id: &str,
        index: Option<usize>,
    ) -> Result<ComponentKey, FormError> {
        if column.kind != ComponentType::Column {
            return Err(FormError::NoChildType(column.to_string()));
        }
        let template = self.controls.instantiate(control_id, None)?;
        self.add_child(column, Some(template), index)
    }

    /// Palette drop onto a stage: a new row holding one column holding the
    /// control's field. Returns the field.
    pub fn add_control_to_stage(
        &mut self,
        stage: &ComponentKey,
        control_id: &str,
    ) -> Result<ComponentKey, FormError> {
        if !self.controls.contains(control_id) {
            return Err(FormError::UnknownControl(control_id.to_string()));
        }
        let row = self.add_child(stage, None, None)?;
        let column = self.add_child(&row, None, None)?;
        self.add_control(&column, control_id, None)
    }

    /// Existing field `id`, or a new unattached field if `id` names a control.
    pub fn field_or_control(&mut self, id: &str) -> Option<ComponentKey> {
        if self.fields.contains(id) {
            return Some(ComponentKey::new(ComponentType::Field, id));
        }
        let template = self.controls.instantiate(id, None).ok()?;
        Some(self.fields.add(None, template).key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::ComponentState;
    use pretty_assertions::assert_eq;

    fn row_with_columns(components: &mut Components, n: usize) -> (ComponentKey, Vec<ComponentKey>) {
        let stage = components.first_stage().unwrap();
        let row = components.add_child(&stage, None, None).unwrap();
        let columns = (0..n)
            .map(|_| components.add_child(&row, None, None).unwrap())
            .collect();
        (row, columns)
    }

    #[test]
    fn add_child_links_both_sides() {
        let mut components = Components::default();
        let (row, columns) = row_with_columns(&mut components, 1);
        let column = &columns[0];

        assert_eq!(components.parent_key(column), Some(row.clone()));
        assert_eq!(components.child_keys(&row), vec![column.clone()]);
        assert_eq!(components.state(column), ComponentState::Attached);
        assert!(!components.get(&row).unwrap().is_empty());
    }

    #[test]
    fn add_child_inserts_at_index() {
        let mut components = Components::default();
        let (row, columns) = row_with_columns(&mut components, 3);
        let inserted = components
            .add_child(&row, Some(json!({"id": "mid"})), Some(1))
            .unwrap();

        let ids: Vec<String> = components.child_keys(&row).into_iter().map(|k| k.id).collect();
        assert_eq!(
            ids,
            vec![
                columns[0].id.clone(),
                inserted.id.clone(),
                columns[1].id.clone(),
                columns[2].id.clone()
            ]
        );

        let last = components.add_child(&row, None, Some(99)).unwrap();
        assert_eq!(components.child_keys(&row).last(), Some(&last));
    }

    #[test]
    fn fields_cannot_hold_children() {
        let mut components = Components::default();
        let stage = components.first_stage().unwrap();
        let field = components.add_control_to_stage(&stage, "text-input").unwrap();
        assert_eq!(
            components.add_child(&field, None, None),
            Err(FormError::NoChildType(field.to_string()))
        );
    }

    #[test]
    fn column_widths_follow_column_count() {
        let mut components = Components::default();
        let (row, columns) = row_with_columns(&mut components, 3);
        let width = |c: &Components, k: &ComponentKey| c.get(k).unwrap().get("config.width").cloned();

        assert_eq!(width(&components, &columns[0]), Some(json!("33.3%")));
        components.remove(&columns[2]);
        assert_eq!(width(&components, &columns[0]), Some(json!("50%")));
        assert_eq!(components.child_keys(&row).len(), 2);
    }

    #[test]
    fn stages_refuse_removal() {
        let mut components = Components::default();
        let stage = components.first_stage().unwrap();
        assert!(components.remove(&stage).is_none());
        assert_eq!(components.stage_ids().len(), 1);
    }

    #[test]
    fn moving_an_existing_child_detaches_it() {
        let mut components = Components::default();
        let stage = components.first_stage().unwrap();
        let field = components.add_control_to_stage(&stage, "text-input").unwrap();
        let old_column = components.parent_key(&field).unwrap();
        let (_, columns) = row_with_columns(&mut components, 1);

        components
            .add_child(&columns[0], Some(json!(field.id.clone())), None)
            .unwrap();
        assert!(components.child_keys(&old_column).is_empty());
        assert_eq!(components.parent_key(&field), Some(columns[0].clone()));
    }

    #[test]
    fn control_ids_instantiate_fields() {
        let mut components = Components::default();
        let (_, columns) = row_with_columns(&mut components, 1);
        let field = components
            .add_child(&columns[0], Some(json!({"id": "select"})), None)
            .unwrap();
        assert_ne!(field.id, "select");
        let component = components.get(&field).unwrap();
        assert_eq!(component.get("tag"), Some(&json!("select")));
        assert_eq!(component.control_id(), Some("select"));
    }

    #[test]
    fn remove_path_returns_container() {
        let mut components = Components::default();
        let stage = components.first_stage().unwrap();
        let field = components.add_control_to_stage(&stage, "select").unwrap();
        let before = components.get(&field).unwrap().get("options").unwrap().as_array().unwrap().len();

        let options = components.remove_path(&field, "options.0").unwrap();
        assert_eq!(options.as_array().unwrap().len(), before - 1);
        assert_eq!(components.remove_path(&field, ""), None);
    }

    #[test]
    fn clone_lands_after_original() {
        let mut components = Components::default();
        let (row, columns) = row_with_columns(&mut components, 2);
        let copy = components.clone_component(&columns[0], None).unwrap();
        let ids: Vec<String> = components.child_keys(&row).into_iter().map(|k| k.id).collect();
        assert_eq!(ids, vec![columns[0].id.clone(), copy.id.clone(), columns[1].id.clone()]);
    }

    #[test]
    fn field_or_control_falls_back_to_templates() {
        let mut components = Components::default();
        let created = components.field_or_control("textarea").unwrap();
        assert_eq!(components.state(&created), ComponentState::Unattached);
        assert_eq!(components.field_or_control(&created.id), Some(created));
        assert_eq!(components.field_or_control("no-such-control"), None);
    }
}
