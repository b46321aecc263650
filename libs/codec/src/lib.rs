//! # Strand Codec - Envelope Wire Format
//!
//! ## Purpose
//!
//! Encoding rules for envelopes that cross a context boundary. A relay hands
//! frames produced here to whatever transport it owns; the receiving context feeds
//! them back through `Context::deliver_wire`.
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → libs/actors relay
//!     ↑           ↓              ↓
//! Pure Data   Framing        Transport hook
//! Aid, Tag    encode/decode  Relay trait
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Sockets, connection handling or peer discovery
//! - Payload schemas; payloads stay opaque bytes

pub mod constants;
pub mod envelope;
pub mod error;

pub use constants::{FRAME_HEADER_SIZE, FRAME_MAGIC, FRAME_VERSION, MAX_PAYLOAD_SIZE};
pub use envelope::{decode, decode_stream, encode, encode_into, frame_len, WireEnvelope};
pub use error::{ProtocolError, ProtocolResult};
