//! Condition rules: a small typed interpreter for if/then clauses.
//!
//! A rule holds comparison clauses (`if`) and assignment clauses (`then`).
//! Each matching comparison runs every assignment of its rule. Evaluation is
//! written once against [`PropertyReader`] / [`PropertyWriter`]; the editor
//! backs them with component data, the renderer with its DOM.
//!
//! Comparison operators:
//! - `equals` (`==`): operands equal after string conversion
//! - `notEquals` (`!=`): negation of `equals`
//! - `contains` (`⊃`): target is an item of an array source, or a substring of it
//! - `notContains` (`!⊃`): negation of `contains`

pub mod engine;

use crate::addr::Address;
use crate::data::loose;
use crate::data::path::{stringify, truthy};
use crate::diagnostics;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use std::fmt;
use thiserror::Error;

/// Property of a field that clauses read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyKey {
    Value,
    IsChecked,
    IsNotChecked,
    IsVisible,
    IsNotVisible,
}

impl PropertyKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyKey::Value => "value",
            PropertyKey::IsChecked => "isChecked",
            PropertyKey::IsNotChecked => "isNotChecked",
            PropertyKey::IsVisible => "isVisible",
            PropertyKey::IsNotVisible => "isNotVisible",
        }
    }

    /// Positive form of the key and whether it was negated.
    pub fn base(&self) -> (PropertyKey, bool) {
        match self {
            PropertyKey::IsNotChecked => (PropertyKey::IsChecked, true),
            PropertyKey::IsNotVisible => (PropertyKey::IsVisible, true),
            other => (*other, false),
        }
    }

    /// Translate an assignment into a write of the positive property.
    /// Boolean properties take the truthiness of `value`.
    pub fn normalize_write(&self, value: &Value) -> (PropertyKey, Value) {
        match self.base() {
            (PropertyKey::Value, _) => (PropertyKey::Value, value.clone()),
            (base, negated) => (base, Value::Bool(truthy(value) != negated)),
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    #[serde(rename = "equals", alias = "==")]
    Equals,
    #[serde(rename = "notEquals", alias = "!=")]
    NotEquals,
    #[serde(rename = "contains", alias = "⊃")]
    Contains,
    #[serde(rename = "notContains", alias = "!⊃")]
    NotContains,
}

impl ComparisonOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOp::Equals => "equals",
            ComparisonOp::NotEquals => "notEquals",
            ComparisonOp::Contains => "contains",
            ComparisonOp::NotContains => "notContains",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Equals => "==",
            ComparisonOp::NotEquals => "!=",
            ComparisonOp::Contains => "⊃",
            ComparisonOp::NotContains => "!⊃",
        }
    }

    pub fn compare(&self, source: &Value, target: &Value) -> bool {
        match self {
            ComparisonOp::Equals => stringify(source) == stringify(target),
            ComparisonOp::NotEquals => stringify(source) != stringify(target),
            ComparisonOp::Contains => contains(source, target),
            ComparisonOp::NotContains => !contains(source, target),
        }
    }
}

fn contains(source: &Value, target: &Value) -> bool {
    let needle = stringify(target);
    match source {
        Value::Array(items) => items.iter().any(|item| stringify(item) == needle),
        other => stringify(other).contains(&needle),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentOp {
    #[serde(rename = "equals", alias = "=")]
    Equals,
}

/// Blank strings in stored clauses mean "not chosen yet". Values naming no
/// known operator or property read as unset too, so the clause stays inert.
fn known_or_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(value) => match T::deserialize(&value) {
            Ok(known) => Ok(Some(known)),
            Err(_) => {
                diagnostics::warn(format!("condition: ignoring unknown value {}", value));
                Ok(None)
            }
        },
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionClause {
    #[serde(default, deserialize_with = "loose::string")]
    pub source: String,
    #[serde(default, deserialize_with = "known_or_none", skip_serializing_if = "Option::is_none")]
    pub source_property: Option<PropertyKey>,
    #[serde(default, deserialize_with = "known_or_none", skip_serializing_if = "Option::is_none")]
    pub comparison: Option<ComparisonOp>,
    /// Address, or a literal to compare against.
    #[serde(default)]
    pub target: Value,
    #[serde(default, deserialize_with = "known_or_none", skip_serializing_if = "Option::is_none")]
    pub target_property: Option<PropertyKey>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultClause {
    #[serde(default, deserialize_with = "loose::string")]
    pub target: String,
    #[serde(default, deserialize_with = "known_or_none", skip_serializing_if = "Option::is_none")]
    pub target_property: Option<PropertyKey>,
    #[serde(default, deserialize_with = "known_or_none", skip_serializing_if = "Option::is_none")]
    pub assignment: Option<AssignmentOp>,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionRule {
    #[serde(rename = "if", default, deserialize_with = "loose::items")]
    pub when: Vec<ConditionClause>,
    #[serde(default, deserialize_with = "loose::items")]
    pub then: Vec<ResultClause>,
}

impl ConditionRule {
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    /// Unfilled rule attached to new input fields.
    pub fn template_value() -> Value {
        json!({
            "if": [{
                "source": "",
                "sourceProperty": "",
                "comparison": "",
                "target": "",
                "targetProperty": "",
            }],
            "then": [{
                "target": "",
                "targetProperty": "",
                "assignment": "",
                "value": "",
            }],
        })
    }
}

/// Parse stored rules one at a time; a rule that does not parse is skipped.
pub fn parse_rules(raw: &[Value], owner: &str) -> Vec<ConditionRule> {
    raw.iter()
        .filter_map(|rule| match ConditionRule::from_value(rule) {
            Ok(rule) => Some(rule),
            Err(e) => {
                diagnostics::warn(format!("{}: skipping condition: {}", owner, e));
                None
            }
        })
        .collect()
}

/// True when no `if` clause in a stored `conditions` array names a source.
pub fn sources_empty(conditions: &Value) -> bool {
    let Some(rules) = conditions.as_array() else {
        return true;
    };
    rules.iter().all(|rule| {
        rule.get("if")
            .and_then(Value::as_array)
            .is_none_or(|clauses| {
                clauses.iter().all(|clause| {
                    clause
                        .get("source")
                        .is_none_or(|source| stringify(source).is_empty())
                })
            })
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("result clause for {0} has no assignment operator")]
    MissingAssignment(String),
    #[error("result clause for {0} has no target property")]
    MissingProperty(String),
    #[error("{0:?} is not an address")]
    InvalidTarget(String),
    #[error("{0} does not resolve")]
    UnresolvedTarget(String),
    #[error("{property} cannot be set on {target}")]
    Unsupported { target: String, property: PropertyKey },
}

/// Position of an option address (`options.<i>`), if that is what `path` is.
pub(crate) fn option_index(path: &[String]) -> Option<usize> {
    match path {
        [options, index] if options == "options" => index.parse().ok(),
        _ => None,
    }
}

/// Read access to field properties.
pub trait PropertyReader {
    /// `property` is always a positive key (`value`, `isChecked`, `isVisible`).
    fn read_property(&self, address: &Address, property: PropertyKey) -> Option<Value>;
}

/// Write access to field properties.
pub trait PropertyWriter {
    fn write_property(
        &mut self,
        address: &Address,
        property: PropertyKey,
        value: &Value,
    ) -> Result<(), ConditionError>;
}

fn read_operand<R: PropertyReader + ?Sized>(
    reader: &R,
    address: &Address,
    property: Option<PropertyKey>,
) -> Value {
    let (base, negated) = property.unwrap_or(PropertyKey::Value).base();
    match reader.read_property(address, base) {
        Some(value) if base != PropertyKey::Value => Value::Bool(truthy(&value) != negated),
        Some(value) => value,
        None if base != PropertyKey::Value => Value::Bool(negated),
        None => Value::Null,
    }
}

/// Whether one comparison clause holds. Clauses without an operator never do.
pub fn evaluate<R: PropertyReader + ?Sized>(clause: &ConditionClause, reader: &R) -> bool {
    let Some(comparison) = clause.comparison else {
        return false;
    };
    let source = match Address::parse(&clause.source) {
        Some(address) => read_operand(reader, &address, clause.source_property),
        None => Value::String(clause.source.clone()),
    };
    let target = match clause.target.as_str().and_then(Address::parse) {
        Some(address) => read_operand(reader, &address, clause.target_property),
        None => clause.target.clone(),
    };
    comparison.compare(&source, &target)
}

/// Execute one assignment clause.
pub fn apply<W: PropertyWriter + ?Sized>(
    clause: &ResultClause,
    writer: &mut W,
) -> Result<(), ConditionError> {
    let Some(AssignmentOp::Equals) = clause.assignment else {
        return Err(ConditionError::MissingAssignment(clause.target.clone()));
    };
    let property = clause
        .target_property
        .ok_or_else(|| ConditionError::MissingProperty(clause.target.clone()))?;
    let address = Address::parse(&clause.target)
        .ok_or_else(|| ConditionError::InvalidTarget(clause.target.clone()))?;
    writer.write_property(&address, property, &clause.value)
}

/// Outcome of one `if` clause: whether it matched, and the result of every
/// assignment it triggered.
#[derive(Debug, Clone, PartialEq)]
pub struct ClauseReport {
    pub rule: usize,
    pub clause: usize,
    pub matched: bool,
    pub results: Vec<Result<(), ConditionError>>,
}

impl ClauseReport {
    pub fn failures(&self) -> impl Iterator<Item = &ConditionError> {
        self.results.iter().filter_map(|r| r.as_ref().err())
    }
}

/// Evaluate one `if` clause of `rule` and run its assignments on a match.
/// A failing assignment does not stop the others.
pub fn run_clause<H>(rule: &ConditionRule, index: usize, host: &mut H) -> Option<Vec<Result<(), ConditionError>>>
where
    H: PropertyReader + PropertyWriter + ?Sized,
{
    let clause = rule.when.get(index)?;
    if !evaluate(clause, &*host) {
        return None;
    }
    let results = rule
        .then
        .iter()
        .map(|result| {
            let outcome = apply(result, &mut *host);
            if let Err(e) = &outcome {
                diagnostics::warn(format!("condition result failed: {}", e));
            }
            outcome
        })
        .collect();
    Some(results)
}

pub fn run_rules<H>(rules: &[ConditionRule], host: &mut H) -> Vec<ClauseReport>
where
    H: PropertyReader + PropertyWriter + ?Sized,
{
    let mut reports = Vec::new();
    for (rule_index, rule) in rules.iter().enumerate() {
        for clause_index in 0..rule.when.len() {
            let outcome = run_clause(rule, clause_index, host);
            reports.push(ClauseReport {
                rule: rule_index,
                clause: clause_index,
                matched: outcome.is_some(),
                results: outcome.unwrap_or_default(),
            });
        }
    }
    tracing::trace!(clauses = reports.len(), "ran conditions");
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Host {
        props: HashMap<(String, PropertyKey), Value>,
        writes: Vec<(String, PropertyKey, Value)>,
        reject: Option<String>,
    }

    impl Host {
        fn with(mut self, address: &str, property: PropertyKey, value: Value) -> Self {
            self.props.insert((address.to_string(), property), value);
            self
        }
    }

    impl PropertyReader for Host {
        fn read_property(&self, address: &Address, property: PropertyKey) -> Option<Value> {
            self.props.get(&(address.to_string(), property)).cloned()
        }
    }

    impl PropertyWriter for Host {
        fn write_property(
            &mut self,
            address: &Address,
            property: PropertyKey,
            value: &Value,
        ) -> Result<(), ConditionError> {
            if self.reject.as_deref() == Some(address.to_string().as_str()) {
                return Err(ConditionError::UnresolvedTarget(address.to_string()));
            }
            self.writes.push((address.to_string(), property, value.clone()));
            Ok(())
        }
    }

    fn rule(value: Value) -> ConditionRule {
        ConditionRule::from_value(&value).unwrap()
    }

    #[test]
    fn comparisons_stringify_operands() {
        use ComparisonOp::*;
        assert!(Equals.compare(&json!("a"), &json!("a")));
        assert!(Equals.compare(&json!(true), &json!("true")));
        assert!(NotEquals.compare(&json!(false), &json!("true")));
        assert!(Contains.compare(&json!(["a", "b"]), &json!("b")));
        assert!(!Contains.compare(&json!(["ab"]), &json!("b")));
        assert!(Contains.compare(&json!("hello"), &json!("ell")));
        assert!(NotContains.compare(&json!(["a"]), &json!("z")));
        assert!(Equals.compare(&json!(3), &json!("3")));
    }

    #[test]
    fn operators_accept_symbols_and_words() {
        let clause: ConditionClause =
            serde_json::from_value(json!({"source": "fields.a", "comparison": "!="})).unwrap();
        assert_eq!(clause.comparison, Some(ComparisonOp::NotEquals));
        let clause: ConditionClause =
            serde_json::from_value(json!({"comparison": "notContains"})).unwrap();
        assert_eq!(clause.comparison, Some(ComparisonOp::NotContains));
        let result: ResultClause = serde_json::from_value(json!({"assignment": "="})).unwrap();
        assert_eq!(result.assignment, Some(AssignmentOp::Equals));
    }

    #[test]
    fn unknown_operators_leave_the_clause_inert() {
        let parsed = parse_rules(
            &[
                json!(42),
                json!({
                    "if": [
                        {"source": "fields.a", "sourceProperty": "colour", "comparison": "bogus", "target": "x"},
                        "oops"
                    ],
                    "then": [{"target": "fields.b", "targetProperty": "value", "assignment": "+=", "value": 1}]
                }),
            ],
            "fields.b",
        );
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].when.len(), 1);
        assert_eq!(parsed[0].when[0].comparison, None);
        assert_eq!(parsed[0].when[0].source_property, None);
        assert_eq!(parsed[0].then[0].assignment, None);

        let host = Host::default();
        assert!(!evaluate(&parsed[0].when[0], &host));
    }

    #[test]
    fn template_parses_to_blank_clauses() {
        let template = rule(ConditionRule::template_value());
        assert_eq!(template.when[0].comparison, None);
        assert_eq!(template.then[0].assignment, None);
        assert!(sources_empty(&json!([ConditionRule::template_value()])));
        assert!(!sources_empty(&json!([{"if": [{"source": "fields.a"}]}])));
    }

    #[test]
    fn evaluate_reads_negated_and_literal_operands() {
        let host = Host::default()
            .with("fields.a", PropertyKey::IsChecked, json!(true))
            .with("fields.b", PropertyKey::Value, json!("x"));

        let checked = ConditionClause {
            source: "fields.a".into(),
            source_property: Some(PropertyKey::IsChecked),
            comparison: Some(ComparisonOp::Equals),
            target: json!("true"),
            target_property: None,
        };
        assert!(evaluate(&checked, &host));

        let not_checked = ConditionClause {
            source_property: Some(PropertyKey::IsNotChecked),
            ..checked.clone()
        };
        assert!(!evaluate(&not_checked, &host));

        let against_field = ConditionClause {
            source: "fields.b".into(),
            source_property: Some(PropertyKey::Value),
            comparison: Some(ComparisonOp::Equals),
            target: json!("fields.b"),
            target_property: Some(PropertyKey::Value),
        };
        assert!(evaluate(&against_field, &host));

        let missing = ConditionClause {
            source: "fields.zzz".into(),
            comparison: Some(ComparisonOp::Equals),
            target: json!(""),
            ..Default::default()
        };
        assert!(evaluate(&missing, &host));

        let unset = ConditionClause {
            comparison: None,
            ..missing
        };
        assert!(!evaluate(&unset, &host));
    }

    #[test]
    fn apply_rejects_incomplete_clauses() {
        let mut host = Host::default();
        let incomplete = ResultClause {
            target: "fields.b".into(),
            ..Default::default()
        };
        assert_eq!(
            apply(&incomplete, &mut host),
            Err(ConditionError::MissingAssignment("fields.b".into()))
        );

        let literal = ResultClause {
            target: "nowhere".into(),
            target_property: Some(PropertyKey::Value),
            assignment: Some(AssignmentOp::Equals),
            value: json!("x"),
        };
        assert_eq!(
            apply(&literal, &mut host),
            Err(ConditionError::InvalidTarget("nowhere".into()))
        );
        assert!(host.writes.is_empty());
    }

    #[test]
    fn matching_clause_runs_each_assignment_once() {
        let mut host = Host::default().with("fields.a", PropertyKey::IsChecked, json!(true));
        let rules = vec![rule(json!({
            "if": [{"source": "fields.a", "sourceProperty": "isChecked", "comparison": "equals", "target": "true"}],
            "then": [{"target": "fields.b", "targetProperty": "isNotVisible", "assignment": "equals", "value": true}]
        }))];

        let reports = run_rules(&rules, &mut host);
        assert_eq!(reports.len(), 1);
        assert!(reports[0].matched);
        assert_eq!(
            host.writes,
            vec![("fields.b".to_string(), PropertyKey::IsNotVisible, json!(true))]
        );
    }

    #[test]
    fn failing_assignment_does_not_stop_siblings() {
        let mut host = Host {
            reject: Some("fields.b".into()),
            ..Host::default()
        };
        let rules = vec![rule(json!({
            "if": [{"source": "fields.a", "comparison": "equals", "target": ""}],
            "then": [
                {"target": "fields.b", "targetProperty": "value", "assignment": "equals", "value": "1"},
                {"target": "fields.c", "targetProperty": "value", "assignment": "equals", "value": "2"}
            ]
        }))];

        let reports = run_rules(&rules, &mut host);
        assert_eq!(reports[0].failures().count(), 1);
        assert_eq!(host.writes, vec![("fields.c".to_string(), PropertyKey::Value, json!("2"))]);
    }

    #[test]
    fn writes_normalize_to_positive_properties() {
        assert_eq!(
            PropertyKey::IsNotVisible.normalize_write(&json!(true)),
            (PropertyKey::IsVisible, json!(false))
        );
        assert_eq!(
            PropertyKey::IsChecked.normalize_write(&json!("true")),
            (PropertyKey::IsChecked, json!(true))
        );
        assert_eq!(
            PropertyKey::Value.normalize_write(&json!("x")),
            (PropertyKey::Value, json!("x"))
        );
    }
}
