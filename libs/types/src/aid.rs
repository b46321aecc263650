//! Actor and service identity
//!
//! An [`Aid`] names one *incarnation* of an actor: the owning context, the strand
//! (execution context) it is pinned to, its slot in that strand's actor pool and the
//! slot's generation at the time the actor was created. Slots are recycled; the
//! generation is not, so a stale `Aid` can never alias the slot's next occupant.
//!
//! Generation `0` is never handed out, which makes [`Aid::nil`] unequal to every
//! live actor by construction.

use crate::atom::{atom, MatchType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a context, usually an atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct CtxId(pub MatchType);

impl CtxId {
    pub fn from_name(name: &str) -> Self {
        Self(atom(name))
    }
}

impl fmt::Display for CtxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque, comparable, serializable address of an actor.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Aid {
    pub ctxid: CtxId,
    pub strand: u32,
    pub slot: u32,
    pub generation: u32,
}

impl Aid {
    pub const fn new(ctxid: CtxId, strand: u32, slot: u32, generation: u32) -> Self {
        Self {
            ctxid,
            strand,
            slot,
            generation,
        }
    }

    /// The address nobody answers to.
    pub const fn nil() -> Self {
        Self {
            ctxid: CtxId(MatchType(0)),
            strand: 0,
            slot: 0,
            generation: 0,
        }
    }

    pub fn is_nil(&self) -> bool {
        self.generation == 0
    }

    /// Whether this actor lives in the context named `ctxid`.
    pub fn is_local_to(&self, ctxid: CtxId) -> bool {
        self.ctxid == ctxid
    }
}

impl fmt::Display for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            return write!(f, "<nil>");
        }
        write!(
            f,
            "<{}.{}.{}.{}>",
            self.ctxid, self.strand, self.slot, self.generation
        )
    }
}

impl fmt::Debug for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Address of a named service inside a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ServiceId {
    pub ctxid: CtxId,
    pub name: MatchType,
}

impl ServiceId {
    pub const fn new(ctxid: CtxId, name: MatchType) -> Self {
        Self { ctxid, name }
    }

    pub fn is_nil(&self) -> bool {
        self.name == MatchType::default()
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.ctxid)
    }
}

/// Whoever a receive or a request is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recver {
    Aid(Aid),
    Service(ServiceId),
}

impl From<Aid> for Recver {
    fn from(aid: Aid) -> Self {
        Recver::Aid(aid)
    }
}

impl From<ServiceId> for Recver {
    fn from(svc: ServiceId) -> Self {
        Recver::Service(svc)
    }
}

impl fmt::Display for Recver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recver::Aid(aid) => aid.fmt(f),
            Recver::Service(svc) => svc.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nil_never_equals_live_identity() {
        let ctx = CtxId::from_name("local");
        let live = Aid::new(ctx, 0, 0, 1);
        assert!(Aid::nil().is_nil());
        assert!(!live.is_nil());
        assert_ne!(live, Aid::nil());
    }

    #[test]
    fn test_generation_distinguishes_recycled_slots() {
        let ctx = CtxId::from_name("local");
        let first = Aid::new(ctx, 2, 5, 1);
        let second = Aid::new(ctx, 2, 5, 2);
        assert_ne!(first, second);
        assert!(first < second);
    }

    #[test]
    fn test_display() {
        let ctx = CtxId::from_name("node1");
        assert_eq!(Aid::new(ctx, 1, 2, 3).to_string(), "<node1.1.2.3>");
        assert_eq!(Aid::nil().to_string(), "<nil>");
        let svc = ServiceId::new(ctx, atom("echo"));
        assert_eq!(svc.to_string(), "echo@node1");
    }

    #[test]
    fn test_bincode_round_trip() {
        let aid = Aid::new(CtxId::from_name("a"), 7, 9, 11);
        let bytes = bincode::serialize(&aid).unwrap();
        let back: Aid = bincode::deserialize(&bytes).unwrap();
        assert_eq!(aid, back);
    }
}
