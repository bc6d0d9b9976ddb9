//! Core of a visual form builder.
//!
//! The crate owns three things:
//! - the component tree (stage -> rows -> columns -> fields) and its
//!   address-based lookup ([`components`]),
//! - the condition engine that evaluates if/then rules between fields
//!   ([`conditions`]),
//! - the form-data document contract shared by the editor and the standalone
//!   renderer ([`document`], [`render`]).

pub mod addr;
pub mod components;
pub mod conditions;
pub mod config;
pub mod controls;
pub mod data;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod render;
pub mod storage;

pub type Result<T> = anyhow::Result<T>;

pub use addr::Address;
pub use components::{Component, ComponentKey, ComponentState, ComponentType, Components};
pub use conditions::{
    AssignmentOp, ClauseReport, ComparisonOp, ConditionClause, ConditionRule, PropertyKey,
    ResultClause,
};
pub use config::{EditorOptions, LoadOptions};
pub use controls::{Control, ControlRegistry};
pub use data::{ChangeEvent, ChangeType, Data, Event, EventBus, EventName};
pub use document::FormDataDocument;
pub use error::FormError;
pub use render::{RenderOptions, Rendered, Renderer};
pub use storage::{MemoryStorage, SessionStorage};
