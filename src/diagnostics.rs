//! Uniform warning and error messages.
//!
//! Everything the core absorbs instead of failing (dangling ids, bad attribute
//! names, failed condition clauses) is reported through `warn`, so a host can
//! route it with any `tracing` subscriber.

const PREFIX: &str = "formeo";

/// Format an error message with the crate prefix.
pub fn error_message(msg: impl AsRef<str>) -> String {
    format!("{}: {}", PREFIX, msg.as_ref())
}

/// Emit a warning for a condition the core recovered from.
pub fn warn(msg: impl AsRef<str>) {
    tracing::warn!(target: "formeo", "{}", msg.as_ref());
}

/// Emit an error that was absorbed locally (rendering continues).
pub fn error(msg: impl AsRef<str>) {
    tracing::error!(target: "formeo", "{}", error_message(msg));
}
