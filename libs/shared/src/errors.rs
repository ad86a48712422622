//! Shared object errors

use actors::RuntimeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SharedError {
    #[error("Key {key} was not found in the shared dictionary")]
    KeyNotFound { key: String },

    /// The access point was refused, usually because the run terminated
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl SharedError {
    pub fn key_not_found(key: &impl std::fmt::Debug) -> Self {
        Self::KeyNotFound {
            key: format!("{:?}", key),
        }
    }
}

pub type Result<T> = std::result::Result<T, SharedError>;
