//! Envelope tags
//!
//! Every envelope carries exactly one [`Tag`]. The set is closed on purpose:
//! mailbox push, the finalize path and the wire codec all `match` on it without a
//! wildcard arm, so adding a kind is a compile error everywhere it matters.

use crate::aid::Aid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Correlation id minted per outbound request.
pub type Sid = u64;

/// Never minted.
pub const SID_NIL: Sid = 0;

/// Why an actor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ExitCode {
    /// Actor logic returned or quit normally.
    Normal = 0,
    /// Actor logic failed or panicked.
    Exception = 1,
    /// The target was already gone when the envelope arrived.
    Already = 2,
    /// No route to the target's context.
    NetErr = 3,
    /// The owning context shut down underneath the actor.
    Shutdown = 4,
}

impl ExitCode {
    pub fn is_normal(self) -> bool {
        self == ExitCode::Normal
    }
}

impl TryFrom<u8> for ExitCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ExitCode::Normal),
            1 => Ok(ExitCode::Exception),
            2 => Ok(ExitCode::Already),
            3 => Ok(ExitCode::NetErr),
            4 => Ok(ExitCode::Shutdown),
            other => Err(other),
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitCode::Normal => "normal",
            ExitCode::Exception => "exception",
            ExitCode::Already => "already",
            ExitCode::NetErr => "neterr",
            ExitCode::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Supervision relation carried by a link envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LinkKind {
    /// Both sides are told about the other's exit.
    Linked = 0,
    /// Only the monitoring side is told.
    Monitored = 1,
    /// Withdraws an earlier link or monitor.
    Unlink = 2,
}

impl TryFrom<u8> for LinkKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LinkKind::Linked),
            1 => Ok(LinkKind::Monitored),
            2 => Ok(LinkKind::Unlink),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Request {
    pub sid: Sid,
    pub from: Aid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Response {
    pub sid: Sid,
    pub from: Aid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Exit {
    pub code: ExitCode,
    pub from: Aid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub kind: LinkKind,
    pub peer: Aid,
}

/// The kind of an envelope plus its kind-specific fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    Direct(Aid),
    Request(Request),
    Response(Response),
    Exit(Exit),
    Link(Link),
}

impl Tag {
    /// The actor this envelope came from.
    pub fn sender(&self) -> Aid {
        match self {
            Tag::Direct(aid) => *aid,
            Tag::Request(req) => req.from,
            Tag::Response(res) => res.from,
            Tag::Exit(ex) => ex.from,
            Tag::Link(link) => link.peer,
        }
    }

    /// Whether an undeliverable envelope of this kind should bounce an exit back.
    pub fn wants_exit_on_failure(&self) -> bool {
        match self {
            Tag::Direct(_) | Tag::Request(_) => true,
            Tag::Link(link) => link.kind != LinkKind::Unlink,
            Tag::Response(_) | Tag::Exit(_) => false,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Tag::Direct(_) => "direct",
            Tag::Request(_) => "request",
            Tag::Response(_) => "response",
            Tag::Exit(_) => "exit",
            Tag::Link(_) => "link",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aid::CtxId;

    #[test]
    fn test_exit_code_byte_round_trip() {
        for code in [
            ExitCode::Normal,
            ExitCode::Exception,
            ExitCode::Already,
            ExitCode::NetErr,
            ExitCode::Shutdown,
        ] {
            assert_eq!(ExitCode::try_from(code as u8), Ok(code));
        }
        assert_eq!(ExitCode::try_from(99), Err(99));
    }

    #[test]
    fn test_sender_of_every_kind() {
        let a = Aid::new(CtxId::from_name("t"), 0, 1, 1);
        let tags = [
            Tag::Direct(a),
            Tag::Request(Request { sid: 1, from: a }),
            Tag::Response(Response { sid: 1, from: a }),
            Tag::Exit(Exit {
                code: ExitCode::Normal,
                from: a,
            }),
            Tag::Link(Link {
                kind: LinkKind::Linked,
                peer: a,
            }),
        ];
        for tag in tags {
            assert_eq!(tag.sender(), a);
        }
    }

    #[test]
    fn test_bounce_policy() {
        let a = Aid::new(CtxId::from_name("t"), 0, 1, 1);
        assert!(Tag::Direct(a).wants_exit_on_failure());
        assert!(!Tag::Response(Response { sid: 3, from: a }).wants_exit_on_failure());
        assert!(!Tag::Link(Link {
            kind: LinkKind::Unlink,
            peer: a
        })
        .wants_exit_on_failure());
    }
}
