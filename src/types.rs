//! Shared error and result types for Storehouse

use thiserror::Error;

/// Top-level error type for all Storehouse operations
#[derive(Debug, Error)]
pub enum StorehouseError {
    /// Rule expression outside the closed grammar
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// Invalid document addressing (collection/key constraints)
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// MQTT transport error
    #[error("mqtt error: {0}")]
    Mqtt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias used throughout the crate
pub type Result<T> = std::result::Result<T, StorehouseError>;
