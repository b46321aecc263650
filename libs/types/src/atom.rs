//! Match types and atoms
//!
//! A [`MatchType`] is the key a receiver filters on. Small integers are used
//! directly (and hit the mailbox's direct-indexed cache); names are packed into a
//! `u64` with [`atom`], six bits per character behind a `0xF` marker, so every atom
//! is far above any plausible cache size and decodes back with [`atom_name`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum characters an atom keeps; longer names are truncated.
pub const ATOM_MAX_LEN: usize = 10;

const ATOM_MARKER: u64 = 0xF;
const ATOM_CHARSET: &[u8; 64] =
    b" 0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Type key of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MatchType(pub u64);

/// Exit notifications carry this type.
pub const EXIT: MatchType = atom("exit");

/// Sent by a freshly spawned actor to its sire.
pub const NEW_ACTOR: MatchType = atom("new_actor");

impl MatchType {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// Index into a direct-indexed table of `len` entries, if this type fits.
    #[inline]
    pub fn cache_index(self, len: usize) -> Option<usize> {
        usize::try_from(self.0).ok().filter(|&index| index < len)
    }

    /// Whether this value was produced by [`atom`].
    pub fn is_atom(self) -> bool {
        atom_name(self).is_some()
    }
}

impl From<u64> for MatchType {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<&str> for MatchType {
    fn from(name: &str) -> Self {
        atom(name)
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match atom_name(*self) {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{}", self.0),
        }
    }
}

const fn encode_char(c: u8) -> u64 {
    match c {
        b'0'..=b'9' => (c - b'0') as u64 + 1,
        b'A'..=b'Z' => (c - b'A') as u64 + 11,
        b'_' => 37,
        b'a'..=b'z' => (c - b'a') as u64 + 38,
        _ => 0,
    }
}

/// Pack `name` into a match type. Characters outside `[0-9A-Za-z_]` become spaces.
pub const fn atom(name: &str) -> MatchType {
    let bytes = name.as_bytes();
    let len = if bytes.len() > ATOM_MAX_LEN {
        ATOM_MAX_LEN
    } else {
        bytes.len()
    };
    let mut value = ATOM_MARKER;
    let mut i = 0;
    while i < len {
        value = (value << 6) | encode_char(bytes[i]);
        i += 1;
    }
    MatchType(value)
}

/// Recover the name of an atom; `None` for plain integers.
pub fn atom_name(ty: MatchType) -> Option<String> {
    let mut value = ty.0;
    let mut chars = Vec::with_capacity(ATOM_MAX_LEN);
    while value > ATOM_MARKER {
        chars.push(ATOM_CHARSET[(value & 0x3F) as usize]);
        value >>= 6;
        if chars.len() > ATOM_MAX_LEN {
            return None;
        }
    }
    if value != ATOM_MARKER || chars.is_empty() {
        return None;
    }
    chars.reverse();
    String::from_utf8(chars).ok()
}
