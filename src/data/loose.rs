//! Lenient serde readers for stored form JSON.
//!
//! Saved documents come from hand edits and older editors, so scalar fields
//! are coerced the way the browser would read them and malformed list items
//! are skipped one at a time instead of failing the whole record.

use super::path::{stringify, truthy};
use crate::diagnostics;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// `null` reads as `""`, other scalars as their string form.
pub fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(stringify(&Value::deserialize(deserializer)?))
}

/// `null` reads as `None`.
pub fn opt_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        other => Some(stringify(&other)),
    })
}

/// `"true"`, `1` and friends read as `true`; `"false"`, `""`, `0` and `null` as `false`.
pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(truthy(&Value::deserialize(deserializer)?))
}

/// Anything but an object reads as an empty map.
pub fn map<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Map<String, Value>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => map,
        _ => Map::new(),
    })
}

/// A record that does not parse falls back to its default.
pub fn record<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(&value).unwrap_or_else(|e| {
        diagnostics::warn(format!("ignoring malformed {}: {}", value, e));
        T::default()
    }))
}

/// Array items that do not parse are dropped; a non-array reads as empty.
pub fn items<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .iter()
        .filter_map(|item| match T::deserialize(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                diagnostics::warn(format!("skipping malformed entry {}: {}", item, e));
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, PartialEq, Deserialize)]
    struct Entry {
        #[serde(default, deserialize_with = "super::string")]
        label: String,
        #[serde(default, deserialize_with = "super::flag")]
        on: bool,
    }

    #[derive(Debug, Default, Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "super::items")]
        entries: Vec<Entry>,
        #[serde(default, deserialize_with = "super::items")]
        ids: Vec<String>,
        #[serde(default, deserialize_with = "super::opt_string")]
        width: Option<String>,
    }

    #[test]
    fn scalars_are_coerced() {
        let entry: Entry = serde_json::from_value(json!({"label": null, "on": "true"})).unwrap();
        assert_eq!(entry, Entry { label: String::new(), on: true });
        let entry: Entry = serde_json::from_value(json!({"label": 7, "on": "false"})).unwrap();
        assert_eq!(entry, Entry { label: "7".into(), on: false });
    }

    #[test]
    fn bad_items_are_skipped_individually() {
        let holder: Holder = serde_json::from_value(json!({
            "entries": [{"label": "a"}, "oops", {"label": "b", "on": 1}],
            "ids": ["x", 3, "y"],
            "width": 50
        }))
        .unwrap();
        assert_eq!(
            holder.entries,
            vec![
                Entry { label: "a".into(), on: false },
                Entry { label: "b".into(), on: true }
            ]
        );
        assert_eq!(holder.ids, vec!["x", "y"]);
        assert_eq!(holder.width.as_deref(), Some("50"));

        let holder: Holder = serde_json::from_value(json!({"entries": {}, "width": null})).unwrap();
        assert!(holder.entries.is_empty());
        assert_eq!(holder.width, None);
    }
}
