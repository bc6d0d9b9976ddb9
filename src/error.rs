use thiserror::Error;

/// Errors surfaced by structural operations on the component tree.
///
/// Malformed data never produces these; they signal a caller asking for
/// something the tree cannot do (unknown component, a field with children).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("component {0} not found")]
    ComponentNotFound(String),

    #[error("{0} cannot hold children")]
    NoChildType(String),

    #[error("control {0} is not registered")]
    UnknownControl(String),

    #[error("invalid control definition: {0}")]
    InvalidControl(String),

    #[error("not an address: {0}")]
    InvalidAddress(String),

    #[error("storage: {0}")]
    Storage(String),
}
