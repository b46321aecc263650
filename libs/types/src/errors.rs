//! Error types for payload encoding and tag validation

use thiserror::Error;

/// Errors raised while building or inspecting messages
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypesError {
    /// Payload could not be serialized
    #[error("Failed to encode payload of type {ty}: {reason}")]
    Encode { ty: String, reason: String },

    /// Payload bytes do not match the requested shape
    #[error("Failed to decode payload of type {ty} ({len} bytes): {reason}")]
    Decode {
        ty: String,
        len: usize,
        reason: String,
    },

    /// Byte does not name an exit code
    #[error("Invalid exit code {value}: valid codes are 0-4")]
    InvalidExitCode { value: u8 },

    /// Byte does not name a link kind
    #[error("Invalid link kind {value}: valid kinds are 0-2")]
    InvalidLinkKind { value: u8 },
}

pub type Result<T> = std::result::Result<T, TypesError>;
