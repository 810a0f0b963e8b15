//! Error types for mtpd
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::transport::TransportError;

/// Result type alias using MtpError
pub type Result<T> = std::result::Result<T, MtpError>;

/// Unified error type for mtpd operations
#[derive(Debug, Error)]
pub enum MtpError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("codec error: {0}")]
    Codec(String),

    #[error("truncated container: got {got} bytes, header needs {needed}")]
    TruncatedContainer { got: usize, needed: usize },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),
}

impl MtpError {
    /// True when the host cancelled the in-flight transfer; the engine
    /// must skip the response container in that case.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MtpError::Transport(TransportError::Cancelled))
    }
}
