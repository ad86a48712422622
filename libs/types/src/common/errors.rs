//! Error types for identity allocation

use thiserror::Error;

/// Errors that can occur while allocating an actor identity
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Name-based hashing was requested without a name
    #[error("Invalid identity for type '{type_tag}': a name is required when it is used as the id")]
    InvalidIdentity { type_tag: String },

    /// The numeric counter has no values left in this generation
    #[error("Detected actor id overflow in generation {generation}")]
    Overflow { generation: u64 },
}

impl IdentityError {
    /// Create an invalid identity error
    pub fn invalid(type_tag: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            type_tag: type_tag.into(),
        }
    }

    /// Create an overflow error
    pub fn overflow(generation: u64) -> Self {
        Self::Overflow { generation }
    }
}
