//! # Event-driven actor variants
//!
//! Actors that are not a task. A variant is handed its identity at construction,
//! lives in a cell on one strand like any other actor, and is called back inside
//! that strand's turn for every envelope delivered to it. Links and exits work
//! exactly as for coroutine actors; the mailbox is bypassed.
//!
//! ```text
//! attach_variant ─▶ strand: allocate aid ─▶ make(aid) ─▶ start()
//! deliver(env)   ─▶ on_receive(tag, msg)   (per envelope, never concurrently)
//! quit / error / panic / shutdown ─▶ stop(code, reason) ─▶ finalize
//! ```
//!
//! Transports, protocol bridges and embedded interpreters plug in here. [`Topic`]
//! is the in-tree variant: a fan-out hub with subscriber pruning.

use crate::actor::CellRef;
use crate::context::Shared;
use crate::error::Result;
use std::cell::RefCell;
use std::sync::Arc;
use strand_codec::WireEnvelope;
use strand_types::{
    atom, Aid, ExitCode, Link, LinkKind, MatchType, Message, Request, Response, Tag,
};
use tracing::{debug, trace};

/// Contract every event-driven actor satisfies.
///
/// All callbacks run on the strand that owns the variant. An `Err` from
/// `start` or `on_receive` ends the actor with an `exception` exit, as does a
/// panic.
pub trait ActorVariant: 'static {
    /// The identity this variant was built with.
    fn identity(&self) -> Aid;

    fn start(&mut self, _ctx: &VariantCtx<'_>) -> Result<()> {
        Ok(())
    }

    /// One delivered envelope. Link bookkeeping has already been applied.
    fn on_receive(&mut self, ctx: &VariantCtx<'_>, tag: Tag, msg: Message) -> Result<()>;

    /// Last callback before the slot is freed.
    fn stop(&mut self, _code: ExitCode, _reason: &str) {}
}

/// Constructor posted to the strand that will host the variant.
pub(crate) type VariantFn = Box<dyn FnOnce(Aid) -> Box<dyn ActorVariant> + Send>;

/// What a variant may do from inside a callback.
pub struct VariantCtx<'a> {
    shared: &'a Arc<Shared>,
    cell: &'a CellRef,
    aid: Aid,
    quit: RefCell<Option<(ExitCode, String)>>,
}

impl<'a> VariantCtx<'a> {
    pub(crate) fn new(shared: &'a Arc<Shared>, cell: &'a CellRef, aid: Aid) -> Self {
        Self {
            shared,
            cell,
            aid,
            quit: RefCell::new(None),
        }
    }

    pub fn aid(&self) -> Aid {
        self.aid
    }

    pub fn send(&self, target: Aid, msg: Message) {
        self.shared
            .route(WireEnvelope::new(target, Tag::Direct(self.aid), msg));
    }

    /// Answer the envelope that carried `tag`: a response for a request, a plain
    /// send back to the sender otherwise.
    pub fn reply_to(&self, tag: Tag, msg: Message) {
        match tag {
            Tag::Request(Request { sid, from }) => self.shared.route(WireEnvelope::new(
                from,
                Tag::Response(Response { sid, from: self.aid }),
                msg,
            )),
            Tag::Direct(from) => self.send(from, msg),
            other => trace!(actor = %self.aid, tag = other.kind_name(), "Nothing to reply to"),
        }
    }

    pub fn link(&self, peer: Aid) {
        if peer == self.aid {
            return;
        }
        self.cell.borrow_mut().links.add(peer, LinkKind::Linked);
        self.send_link(peer, LinkKind::Linked);
    }

    pub fn monitor(&self, peer: Aid) {
        if peer == self.aid {
            return;
        }
        self.cell.borrow_mut().monitoring.insert(peer);
        self.send_link(peer, LinkKind::Monitored);
    }

    pub fn demonitor(&self, peer: Aid) {
        self.cell.borrow_mut().monitoring.remove(&peer);
        self.send_link(peer, LinkKind::Unlink);
    }

    /// End the actor once the current callback returns.
    pub fn quit(&self, code: ExitCode, reason: impl Into<String>) {
        *self.quit.borrow_mut() = Some((code, reason.into()));
    }

    pub(crate) fn take_quit(&self) -> Option<(ExitCode, String)> {
        self.quit.borrow_mut().take()
    }

    fn send_link(&self, peer: Aid, kind: LinkKind) {
        self.shared.route(WireEnvelope::new(
            peer,
            Tag::Link(Link {
                kind,
                peer: self.aid,
            }),
            Message::default(),
        ));
    }
}

pub const SUBSCRIBE: MatchType = atom("subscribe");
pub const UNSUBSCRIBE: MatchType = atom("unsubscribe");
/// Ends the topic with a normal exit.
pub const CLOSE: MatchType = atom("close");

/// Fan-out hub.
///
/// `subscribe` and `unsubscribe` manage the subscriber list and are acknowledged
/// with the resulting subscriber count. Any other message is copied to every
/// subscriber except its sender; a request is answered with the number of
/// subscribers reached. Subscribers are monitored and dropped when they exit.
#[derive(Debug)]
pub struct Topic {
    aid: Aid,
    subscribers: Vec<Aid>,
}

impl Topic {
    pub fn new(aid: Aid) -> Self {
        Self {
            aid,
            subscribers: Vec::new(),
        }
    }

    pub fn subscribers(&self) -> &[Aid] {
        &self.subscribers
    }

    fn count(&self) -> u64 {
        self.subscribers.len() as u64
    }
}

impl ActorVariant for Topic {
    fn identity(&self) -> Aid {
        self.aid
    }

    fn on_receive(&mut self, ctx: &VariantCtx<'_>, tag: Tag, msg: Message) -> Result<()> {
        let from = match tag {
            Tag::Direct(from) | Tag::Request(Request { from, .. }) => from,
            Tag::Exit(exit) => {
                self.subscribers.retain(|aid| *aid != exit.from);
                return Ok(());
            }
            Tag::Response(_) | Tag::Link(_) => return Ok(()),
        };

        match msg.ty() {
            SUBSCRIBE => {
                if !self.subscribers.contains(&from) {
                    self.subscribers.push(from);
                    ctx.monitor(from);
                }
                ctx.reply_to(tag, Message::with(SUBSCRIBE, &self.count())?);
            }
            UNSUBSCRIBE => {
                if self.subscribers.contains(&from) {
                    self.subscribers.retain(|aid| *aid != from);
                    ctx.demonitor(from);
                }
                ctx.reply_to(tag, Message::with(UNSUBSCRIBE, &self.count())?);
            }
            CLOSE => ctx.quit(ExitCode::Normal, "topic closed"),
            _ => {
                let mut reached = 0u64;
                for subscriber in self.subscribers.iter().filter(|aid| **aid != from) {
                    ctx.send(*subscriber, msg.clone());
                    reached += 1;
                }
                trace!(topic = %self.aid, reached, "Published");
                if matches!(tag, Tag::Request(_)) {
                    ctx.reply_to(tag, Message::with(msg.ty(), &reached)?);
                }
            }
        }
        Ok(())
    }

    fn stop(&mut self, code: ExitCode, _reason: &str) {
        debug!(topic = %self.aid, code = %code, subscribers = self.subscribers.len(), "Topic stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_types::CtxId;

    #[test]
    fn test_topic_reports_its_identity() {
        let aid = Aid::new(CtxId::from_name("t"), 0, 3, 1);
        let topic = Topic::new(aid);
        assert_eq!(topic.identity(), aid);
        assert!(topic.subscribers().is_empty());
        assert_ne!(SUBSCRIBE, UNSUBSCRIBE);
        assert_ne!(CLOSE, SUBSCRIBE);
    }
}
