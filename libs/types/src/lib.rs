//! # Strand Types
//!
//! Pure data types shared by every layer of the strand actor runtime. Nothing in
//! this crate schedules, allocates actors or touches a socket.
//!
//! ## What Lives Here
//!
//! - **Match types and atoms**: [`MatchType`] keys the mailbox index; [`atom`] packs a
//!   short name into a `u64` so named message types are as cheap to compare as integers
//! - **Identity**: [`Aid`] addresses one actor incarnation, [`ServiceId`] addresses a
//!   named service, [`CtxId`] names the owning context
//! - **Envelope tags**: [`Tag`] is the closed set of envelope kinds (direct, request,
//!   response, exit, link) every consumer must match exhaustively
//! - **Messages**: [`Message`] is a match type plus an opaque, cheaply cloned payload
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → libs/codec → libs/actors
//!     ↑            ↓             ↓
//!  Pure data   Wire format   Strands, mailboxes,
//!  Aid, Tag    encode/decode  actors, supervision
//! ```

pub mod aid;
pub mod atom;
pub mod errors;
pub mod message;
pub mod tag;

pub use aid::{Aid, CtxId, Recver, ServiceId};
pub use atom::{atom, atom_name, MatchType, EXIT, NEW_ACTOR};
pub use errors::{Result, TypesError};
pub use message::Message;
pub use tag::{Exit, ExitCode, Link, LinkKind, Request, Response, Sid, Tag, SID_NIL};
