//! Protocol-level errors for envelope framing
//!
//! Every variant carries enough context to tell a truncated read from a corrupted
//! frame from a peer speaking another version, so transport logs are actionable
//! without a packet capture.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// Buffer is too small to contain the expected structure
    #[error("Message too small: need {need} bytes, got {got} (context: {context})")]
    MessageTooSmall {
        need: usize,
        got: usize,
        context: String,
    },

    /// Frame magic validation failed
    #[error("Invalid magic number: expected {expected:#010x}, got {actual:#010x} (offset: {offset}, indicates: {diagnosis})")]
    InvalidMagic {
        expected: u32,
        actual: u32,
        offset: usize,
        diagnosis: String,
    },

    /// Body checksum validation failed
    #[error("Checksum mismatch: expected {expected:#010x}, calculated {calculated:#010x} (body: {body_size} bytes)")]
    ChecksumMismatch {
        expected: u32,
        calculated: u32,
        body_size: usize,
    },

    /// Frame version is not understood by this decoder
    #[error("Unsupported frame version {version}: supported versions are {supported_versions}")]
    UnsupportedVersion {
        version: u8,
        supported_versions: String,
    },

    /// Tag discriminant is outside the closed set of envelope kinds
    #[error("Unknown tag kind {kind} at offset {offset}: valid kinds are 0-4 (direct, request, response, exit, link)")]
    UnknownTagKind { kind: u8, offset: usize },

    /// A tag field holds a value its type does not define
    #[error("Invalid {field} value {value} at offset {offset}")]
    InvalidField {
        field: &'static str,
        value: u8,
        offset: usize,
    },

    /// Payload exceeds protocol limits
    #[error("Payload too large: {size} bytes exceeds limit {limit} (consider: {recommendation})")]
    PayloadTooLarge {
        size: usize,
        limit: usize,
        recommendation: String,
    },

    /// Body declared one length but decoding consumed another
    #[error("Frame body length mismatch: header declares {declared} bytes, envelope used {consumed}")]
    LengthMismatch { declared: usize, consumed: usize },
}

impl ProtocolError {
    pub fn message_too_small(need: usize, got: usize, context: impl Into<String>) -> Self {
        Self::MessageTooSmall {
            need,
            got,
            context: context.into(),
        }
    }

    pub fn invalid_magic(expected: u32, actual: u32, offset: usize) -> Self {
        let diagnosis = match actual {
            0x00000000 => "uninitialized buffer",
            0xFFFFFFFF => "corrupted buffer or wrong endianness",
            _ if actual.swap_bytes() == expected => "byte order (endianness) mismatch",
            _ => "data corruption or misaligned stream",
        };

        Self::InvalidMagic {
            expected,
            actual,
            offset,
            diagnosis: diagnosis.to_string(),
        }
    }

    pub fn checksum_mismatch(expected: u32, calculated: u32, body_size: usize) -> Self {
        Self::ChecksumMismatch {
            expected,
            calculated,
            body_size,
        }
    }

    pub fn unsupported_version(version: u8, supported: &[u8]) -> Self {
        let supported_versions = supported
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Self::UnsupportedVersion {
            version,
            supported_versions,
        }
    }

    pub fn invalid_field(field: &'static str, value: u8, offset: usize) -> Self {
        Self::InvalidField {
            field,
            value,
            offset,
        }
    }

    pub fn payload_too_large(size: usize, limit: usize) -> Self {
        let recommendation = if size > limit.saturating_mul(10) {
            "likely corrupted length field"
        } else {
            "split the payload across several messages"
        };

        Self::PayloadTooLarge {
            size,
            limit,
            recommendation: recommendation.to_string(),
        }
    }
}

/// Result type for protocol operations
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
