//! Address type used to reference components and nested values.
//!
//! Example: `fields.f1a2.attrs.type`  =>  root `fields`, id `f1a2`, path `[attrs, type]`
//!
//! Bracketed segments are accepted wherever a dotted one is, so
//! `fields.f1a2.options[0].label` splits the same way as
//! `fields.f1a2.options.0.label`. Addresses rooted at `external` point into
//! host-supplied data rather than a component collection.

use crate::components::ComponentType;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

pub const EXTERNAL: &str = "external";

static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:stages?|rows?|columns?|fields?|external)(?:\.[^.\[\]\s]+|\[[^\[\]\s]+\])+$")
        .expect("address pattern is valid")
});

/// First segment of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressRoot {
    Component(ComponentType),
    External,
}

impl AddressRoot {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressRoot::Component(kind) => kind.collection_name(),
            AddressRoot::External => EXTERNAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub root: AddressRoot,
    pub id: String,
    pub path: Vec<String>,
}

impl Address {
    /// Parse a string address. Anything that is not a recognized address
    /// yields `None`; callers treat such input as a literal.
    pub fn parse(s: &str) -> Option<Self> {
        if !is_address(s) {
            return None;
        }
        let mut segments = split_path(s).into_iter();
        let root = segments.next()?;
        let id = segments.next()?;
        let root = if root == EXTERNAL {
            AddressRoot::External
        } else {
            AddressRoot::Component(ComponentType::from_name(&root)?)
        };
        Some(Self {
            root,
            id,
            path: segments.collect(),
        })
    }

    pub fn component(kind: ComponentType, id: impl Into<String>) -> Self {
        Self {
            root: AddressRoot::Component(kind),
            id: id.into(),
            path: Vec::new(),
        }
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path.extend(split_path(path));
        self
    }

    pub fn is_external(&self) -> bool {
        self.root == AddressRoot::External
    }

    pub fn component_type(&self) -> Option<ComponentType> {
        match self.root {
            AddressRoot::Component(kind) => Some(kind),
            AddressRoot::External => None,
        }
    }

    /// Dotted form of everything after `<root>.<id>`.
    pub fn subpath(&self) -> String {
        join_path(&self.path)
    }

    /// `<root>.<id>` without the nested path.
    pub fn base(&self) -> String {
        format!("{}.{}", self.root.as_str(), self.id)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.root.as_str(), self.id)?;
        for segment in &self.path {
            write!(f, ".{}", segment)?;
        }
        Ok(())
    }
}

/// True if `s` names a component collection or the external namespace.
pub fn is_address(s: &str) -> bool {
    ADDRESS_RE.is_match(s)
}

pub fn is_external_address(s: &str) -> bool {
    is_address(s) && (s.starts_with("external.") || s.starts_with("external["))
}

pub fn is_internal_address(s: &str) -> bool {
    is_address(s) && !is_external_address(s)
}

/// Split a dotted/bracketed path into segments.
///
/// `rows.abc.children`   => `[rows, abc, children]`
/// `options[0].label`    => `[options, 0, label]`
/// `attrs["data-x"]`     => `[attrs, data-x]`
pub fn split_path(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            '[' => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
                let mut inner = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    inner.push(c);
                }
                let inner = inner.trim().trim_matches(|c| c == '"' || c == '\'');
                if !inner.is_empty() {
                    out.push(inner.to_string());
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

pub fn join_path<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(".")
}
