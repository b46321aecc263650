//! Frame constants

/// "STRN", big-endian.
pub const FRAME_MAGIC: u32 = 0x5354_524E;

pub const FRAME_VERSION: u8 = 1;

pub const SUPPORTED_VERSIONS: &[u8] = &[FRAME_VERSION];

/// magic(4) + version(1) + flags(1) + reserved(2) + body_len(4) + crc32(4)
pub const FRAME_HEADER_SIZE: usize = 16;

/// ctxid(8) + strand(4) + slot(4) + generation(4)
pub const AID_WIRE_SIZE: usize = 20;

/// ctxid(8) + name(8)
pub const SERVICE_WIRE_SIZE: usize = 16;

/// Upper bound on a single message payload.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Largest body a frame can have beyond its payload.
pub const MAX_BODY_OVERHEAD: usize = 128;

pub(crate) const TAG_DIRECT: u8 = 0;
pub(crate) const TAG_REQUEST: u8 = 1;
pub(crate) const TAG_RESPONSE: u8 = 2;
pub(crate) const TAG_EXIT: u8 = 3;
pub(crate) const TAG_LINK: u8 = 4;
