//! Error types for HurmaDB
//!
//! Provides a unified error type for all operations. Key/value acceptance
//! failures live in their own [`ValidationError`] so front ends can map them
//! to client errors without string matching.

use thiserror::Error;

/// Result type alias using HurmaError
pub type Result<T> = std::result::Result<T, HurmaError>;

/// Unified error type for HurmaDB operations
#[derive(Debug, Error)]
pub enum HurmaError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Validation Errors (never mutate state)
    // -------------------------------------------------------------------------
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl HurmaError {
    /// True if the caller supplied an unacceptable key or value.
    pub fn is_validation(&self) -> bool {
        matches!(self, HurmaError::Validation(_))
    }
}

/// Reasons a key or value is rejected before anything is written
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("key is empty")]
    EmptyKey,

    #[error("key is {len} bytes, limit is {max}")]
    KeyTooLong { len: usize, max: usize },

    #[error("key contains disallowed byte 0x{byte:02x} at position {position}")]
    InvalidKeyByte { byte: u8, position: usize },

    #[error("value is {len} bytes, limit is {max}")]
    ValueTooLarge { len: usize, max: usize },
}
