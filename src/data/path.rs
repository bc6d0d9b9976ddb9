//! Path access into `serde_json::Value` trees.
//!
//! Segments index objects by key and arrays by decimal position. `set_path`
//! creates missing containers on the way down: an array when the next segment
//! is numeric, an object otherwise.

use serde_json::{Map, Value};

fn index_of(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

pub fn get_path<'a, S: AsRef<str>>(root: &'a Value, path: &[S]) -> Option<&'a Value> {
    let mut cur = root;
    for segment in path {
        let segment = segment.as_ref();
        cur = match cur {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(index_of(segment)?)?,
            _ => return None,
        };
    }
    Some(cur)
}

pub fn get_path_mut<'a, S: AsRef<str>>(root: &'a mut Value, path: &[S]) -> Option<&'a mut Value> {
    let mut cur = root;
    for segment in path {
        let segment = segment.as_ref();
        cur = match cur {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(index_of(segment)?)?,
            _ => return None,
        };
    }
    Some(cur)
}

fn empty_container_for(next: &str) -> Value {
    if index_of(next).is_some() {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

/// Write `value` at `path`, returning the value it replaced.
///
/// An empty path replaces the root. Scalars standing where a container is
/// needed are overwritten. An array index may address an existing item or
/// the slot one past the end; anything further out writes nothing.
pub fn set_path<S: AsRef<str>>(root: &mut Value, path: &[S], value: Value) -> Option<Value> {
    let Some((last, parents)) = path.split_last() else {
        return Some(std::mem::replace(root, value));
    };

    let mut cur = root;
    for (i, segment) in parents.iter().enumerate() {
        let segment = segment.as_ref();
        let next = path[i + 1].as_ref();
        if !fits(cur, segment) {
            *cur = empty_container_for(segment);
        }
        cur = match cur {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| empty_container_for(next)),
            Value::Array(items) => {
                let idx = index_of(segment)?;
                if idx > items.len() {
                    return None;
                }
                if idx == items.len() {
                    items.push(Value::Null);
                }
                let slot = &mut items[idx];
                if slot.is_null() {
                    *slot = empty_container_for(next);
                }
                slot
            }
            _ => return None,
        };
    }

    let last = last.as_ref();
    if !fits(cur, last) {
        *cur = empty_container_for(last);
    }
    match cur {
        Value::Object(map) => map.insert(last.to_string(), value),
        Value::Array(items) => {
            let idx = index_of(last)?;
            if idx == items.len() {
                items.push(value);
                None
            } else {
                items.get_mut(idx).map(|slot| std::mem::replace(slot, value))
            }
        }
        _ => None,
    }
}

/// Whether `container` can be indexed by `segment` without replacing it.
fn fits(container: &Value, segment: &str) -> bool {
    match container {
        Value::Object(_) => true,
        Value::Array(_) => index_of(segment).is_some(),
        _ => false,
    }
}

/// Delete the array item or object key at `path`, returning it.
pub fn remove_path<S: AsRef<str>>(root: &mut Value, path: &[S]) -> Option<Value> {
    let (last, parents) = path.split_last()?;
    let container = get_path_mut(root, parents)?;
    let last = last.as_ref();
    match container {
        Value::Object(map) => map.shift_remove(last),
        Value::Array(items) => {
            let idx = index_of(last)?;
            (idx < items.len()).then(|| items.remove(idx))
        }
        _ => None,
    }
}

/// Recursively merge `overlay` into `base`. Objects merge key by key; any
/// other overlay value replaces what is in `base`.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// String conversion with the semantics form authors expect from the browser:
/// `true` => "true", `[a, b]` => "a,b", `1.0` => "1", null => "".
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Truthiness for property reads on loosely typed data.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn set_creates_intermediate_containers() {
        let mut root = json!({});
        assert_eq!(set_path(&mut root, &["attrs", "type"], json!("text")), None);
        assert_eq!(set_path(&mut root, &["options", "0", "label"], json!("One")), None);
        assert_eq!(
            root,
            json!({"attrs": {"type": "text"}, "options": [{"label": "One"}]})
        );

        let prev = set_path(&mut root, &["attrs", "type"], json!("email"));
        assert_eq!(prev, Some(json!("text")));
    }

    #[test]
    fn set_past_the_end_of_an_array_writes_nothing() {
        let mut root = json!({"options": [{"label": "One"}]});
        let huge = usize::MAX.to_string();
        assert_eq!(set_path(&mut root, &["options", huge.as_str(), "label"], json!("x")), None);
        assert_eq!(set_path(&mut root, &["options", huge.as_str()], json!("x")), None);
        assert_eq!(set_path(&mut root, &["options", "5"], json!("x")), None);
        assert_eq!(root, json!({"options": [{"label": "One"}]}));

        assert_eq!(set_path(&mut root, &["options", "1", "label"], json!("Two")), None);
        assert_eq!(set_path(&mut root, &["options", "2"], json!("Three")), None);
        assert_eq!(
            root,
            json!({"options": [{"label": "One"}, {"label": "Two"}, "Three"]})
        );
    }

    #[test]
    fn get_reads_objects_and_arrays() {
        let root = json!({"options": [{"value": "a"}, {"value": "b"}]});
        assert_eq!(get_path(&root, &["options", "1", "value"]), Some(&json!("b")));
        assert_eq!(get_path(&root, &["options", "9"]), None);
        assert_eq!(get_path(&root, &["options", "x"]), None);
        assert_eq!(get_path::<&str>(&root, &[]), Some(&root));
    }

    #[test]
    fn remove_shifts_array_items_and_deletes_keys() {
        let mut root = json!({"options": ["a", "b", "c"], "attrs": {"required": true}});
        assert_eq!(remove_path(&mut root, &["options", "1"]), Some(json!("b")));
        assert_eq!(remove_path(&mut root, &["attrs", "required"]), Some(json!(true)));
        assert_eq!(remove_path(&mut root, &["attrs", "missing"]), None);
        assert_eq!(root, json!({"options": ["a", "c"], "attrs": {}}));
    }

    #[test]
    fn merge_overlays_nested_objects() {
        let mut base = json!({"config": {"width": "100%", "label": "x"}, "tags": [1, 2]});
        deep_merge(&mut base, &json!({"config": {"width": "50%"}, "tags": [3]}));
        assert_eq!(
            base,
            json!({"config": {"width": "50%", "label": "x"}, "tags": [3]})
        );
    }

    #[test]
    fn stringify_matches_browser_conversions() {
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&json!(["a", "b"])), "a,b");
        assert_eq!(stringify(&json!(3)), "3");
        assert_eq!(stringify(&json!(2.0)), "2");
        assert_eq!(stringify(&json!(2.5)), "2.5");
        assert_eq!(stringify(&Value::Null), "");
    }
}
