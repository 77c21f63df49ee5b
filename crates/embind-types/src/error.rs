//! Error types shared by every embind crate.

use thiserror::Error;

/// Errors surfaced across the embind ABI boundary.
///
/// Every variant carries the public symbol or type name it concerns, so a
/// caller can report which binding misbehaved without parsing message text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmbindError {
    /// Misuse at the ABI boundary: wrong value kind, unknown name, duplicate
    /// registration, writing a read-only property, and similar.
    #[error("{name}: {message}")]
    Binding {
        /// The public symbol or type the misuse concerns.
        name: String,
        /// Human-readable description of the misuse.
        message: String,
    },

    /// A registration depends on types that were never registered. `missing`
    /// holds the C++ type names of every still-unbound dependency.
    #[error("{context}: {}", .missing.join(", "))]
    UnboundTypes {
        /// What was attempted, e.g. `Cannot call add due to unbound types`.
        context: String,
        /// Names of the unresolved types, in traversal order.
        missing: Vec<String>,
    },

    /// Guest memory or table access failed, or an engine table is in a state
    /// registration promised impossible.
    #[error("internal error: {0}")]
    Internal(String),

    /// A C++ exception escaped through a guest call. The exception subsystem
    /// itself lives outside the engine; this is only the propagation channel.
    #[error("C++ exception: {0}")]
    Cpp(String),
}

impl EmbindError {
    /// Binding error tied to a symbol or type name.
    pub fn binding(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Binding {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Internal error (memory read/write failure, table lookup failure).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True for [`EmbindError::Binding`].
    pub fn is_binding(&self) -> bool {
        matches!(self, Self::Binding { .. })
    }

    /// True for [`EmbindError::UnboundTypes`].
    pub fn is_unbound(&self) -> bool {
        matches!(self, Self::UnboundTypes { .. })
    }
}

/// Result alias used throughout the embind crates.
pub type EmbindResult<T> = Result<T, EmbindError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_error_display_names_the_symbol() {
        let err = EmbindError::binding("add", "called with 1 arguments, expected 2");
        assert_eq!(err.to_string(), "add: called with 1 arguments, expected 2");
        assert!(err.is_binding());
    }

    #[test]
    fn unbound_types_display_joins_missing_names() {
        let err = EmbindError::UnboundTypes {
            context: "Cannot call frob due to unbound types".to_string(),
            missing: vec!["Widget".to_string(), "Gadget".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Cannot call frob due to unbound types: Widget, Gadget"
        );
        assert!(err.is_unbound());
    }
}
