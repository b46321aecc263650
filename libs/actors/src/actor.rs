//! # Actor State Machine
//!
//! An actor is a `spawn_local` task on its strand running user logic against an
//! [`Actor`] handle. Its state lives in an [`ActorCell`] owned by the strand's pool.
//!
//! ```text
//! Ready ──first poll──▶ On ──return / quit / error / panic / kill──▶ Off
//! ```
//!
//! Suspension points are `recv*`, `respond*` and `sleep`. A receive first checks the
//! mailbox; on a miss it parks the task's waker in the cell and, for a finite
//! timeout, polls a timer it owns. Delivery on the strand wakes the task, which then
//! re-checks the mailbox before the timer, so a message and an expiry racing for
//! the same receive resume it once. Dropping the receive drops its timer.
//!
//! Every method that can suspend takes `&mut self`: at most one receive of any
//! kind is pending per actor.

use crate::context::Shared;
use crate::error::{ActorError, Result};
use crate::mailbox::Mailbox;
use crate::pattern::Pattern;
use crate::strand::StrandLocal;
use crate::supervision::LinkTable;
use crate::variant::ActorVariant;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use std::cell::RefCell;
use std::collections::HashSet;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Poll, Waker};
use std::time::Duration;
use strand_codec::WireEnvelope;
use strand_config::ContextConfig;
use strand_types::{
    Aid, CtxId, Exit, ExitCode, Link, LinkKind, MatchType, Message, Recver, Request, Response,
    ServiceId, Sid, Tag, NEW_ACTOR,
};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace};

pub(crate) type CellRef = Rc<RefCell<ActorCell>>;

/// Actor constructor posted to the strand that will host the actor.
pub(crate) type SpawnFn = Box<dyn FnOnce(Actor) -> LocalBoxFuture<'static, Result<()>> + Send>;

pub(crate) fn boxed_spawn<F, Fut>(f: F) -> SpawnFn
where
    F: FnOnce(Actor) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + 'static,
{
    Box::new(move |actor| f(actor).boxed_local())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Status {
    Ready,
    On,
    Off,
}

/// Strand-owned actor state.
pub(crate) struct ActorCell {
    pub aid: Aid,
    pub status: Status,
    /// Driven by posted jobs instead of its own task.
    pub threaded: bool,
    /// Event-driven body; deliveries go to it instead of the mailbox.
    pub variant: Option<Box<dyn ActorVariant>>,
    pub mailbox: Mailbox,
    pub links: LinkTable,
    /// Peers this actor monitors; each is told to forget us when we exit.
    pub monitoring: HashSet<Aid>,
    /// Service names this actor registered.
    pub services: Vec<MatchType>,
    pub kill: Option<oneshot::Sender<(ExitCode, String)>>,
    pub recv_waker: Option<Waker>,
    pub resp_waker: Option<Waker>,
    /// Tag of the last direct or request envelope received, for `relay`.
    pub last_tag: Option<Tag>,
    last_sid: Sid,
}

impl ActorCell {
    pub fn new(
        aid: Aid,
        config: &ContextConfig,
        kill: Option<oneshot::Sender<(ExitCode, String)>>,
    ) -> Self {
        Self {
            aid,
            status: Status::Ready,
            threaded: false,
            variant: None,
            mailbox: Mailbox::new(config.cache_match_size, config.mailbox_node_reserve_size),
            links: LinkTable::new(),
            monitoring: HashSet::new(),
            services: Vec::new(),
            kill,
            recv_waker: None,
            resp_waker: None,
            last_tag: None,
            last_sid: 0,
        }
    }

    pub fn wake(&mut self) {
        if let Some(waker) = self.recv_waker.take() {
            waker.wake();
        }
        if let Some(waker) = self.resp_waker.take() {
            waker.wake();
        }
    }

    fn mint_sid(&mut self) -> Sid {
        self.last_sid += 1;
        self.last_sid
    }
}

/// Placement and supervision for a spawned actor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpawnOpts {
    /// `Linked` or `Monitored` installs the relation before the child runs.
    pub link: Option<LinkKind>,
    /// Place the child on the spawner's strand instead of round-robin.
    pub pinned: bool,
}

impl SpawnOpts {
    pub fn linked() -> Self {
        Self {
            link: Some(LinkKind::Linked),
            pinned: false,
        }
    }

    pub fn monitored() -> Self {
        Self {
            link: Some(LinkKind::Monitored),
            pinned: false,
        }
    }

    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }
}

/// Who asked for a spawn, and the token its announcement must carry.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sire {
    pub aid: Aid,
    pub link: Option<LinkKind>,
    pub token: Sid,
}

/// Correlation for one outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseHandle {
    sid: Sid,
    recver: Recver,
}

impl ResponseHandle {
    pub fn sid(&self) -> Sid {
        self.sid
    }

    /// Who the request went to.
    pub fn recver(&self) -> Recver {
        self.recver
    }
}

/// The running actor's own handle. Not `Send`: it never leaves its strand.
pub struct Actor {
    strand: Rc<StrandLocal>,
    cell: CellRef,
    aid: Aid,
}

impl Actor {
    pub(crate) fn from_parts(strand: Rc<StrandLocal>, cell: CellRef, aid: Aid) -> Self {
        Self { strand, cell, aid }
    }

    pub fn aid(&self) -> Aid {
        self.aid
    }

    pub fn ctxid(&self) -> CtxId {
        self.aid.ctxid
    }

    /// Service id for `name` in this actor's context.
    pub fn service(&self, name: impl Into<MatchType>) -> ServiceId {
        ServiceId::new(self.aid.ctxid, name.into())
    }

    /// Envelopes waiting in the mailbox.
    pub fn pending(&self) -> usize {
        self.cell.borrow().mailbox.len()
    }

    /// Peers that will be told when this actor exits.
    pub fn link_count(&self) -> usize {
        self.cell.borrow().links.len()
    }

    fn shared(&self) -> &Arc<Shared> {
        &self.strand.shared
    }

    pub fn send(&self, target: Aid, msg: Message) {
        self.shared()
            .route(WireEnvelope::new(target, Tag::Direct(self.aid), msg));
    }

    pub fn send_svc(&self, svc: ServiceId, msg: Message) {
        self.route_service(svc, Tag::Direct(self.aid), msg);
    }

    /// Send `msg` as a request; the answer is collected with [`respond`](Self::respond).
    pub fn request(&self, target: Aid, msg: Message) -> ResponseHandle {
        let sid = self.cell.borrow_mut().mint_sid();
        self.shared().route(WireEnvelope::new(
            target,
            Tag::Request(Request { sid, from: self.aid }),
            msg,
        ));
        ResponseHandle {
            sid,
            recver: target.into(),
        }
    }

    pub fn request_svc(&self, svc: ServiceId, msg: Message) -> ResponseHandle {
        let sid = self.cell.borrow_mut().mint_sid();
        self.route_service(svc, Tag::Request(Request { sid, from: self.aid }), msg);
        ResponseHandle {
            sid,
            recver: svc.into(),
        }
    }

    /// Answer the oldest request from `target` still owed a reply, or send directly.
    pub fn reply(&self, target: Aid, msg: Message) {
        let owed = self.cell.borrow_mut().mailbox.pop_request(target);
        match owed {
            Some(req) => self.shared().route(WireEnvelope::new(
                target,
                Tag::Response(Response {
                    sid: req.sid,
                    from: self.aid,
                }),
                msg,
            )),
            None => self.send(target, msg),
        }
    }

    /// Pass `msg` on under the tag of the last direct or request envelope received,
    /// so the eventual reply reaches the original requester.
    pub fn relay(&self, target: impl Into<Recver>, msg: Message) {
        let tag = {
            let mut c = self.cell.borrow_mut();
            let last = c.last_tag;
            match last {
                Some(Tag::Request(req)) if c.mailbox.take_request(req) => Tag::Request(req),
                Some(Tag::Direct(from)) => Tag::Direct(from),
                _ => Tag::Direct(self.aid),
            }
        };
        match target.into() {
            Recver::Aid(aid) => self
                .shared()
                .route(WireEnvelope::new(aid, tag, msg).with_source(self.aid)),
            Recver::Service(svc) => self.route_service(svc, tag, msg),
        }
    }

    /// Bidirectional link; an exit arrives at once if `peer` is already gone.
    pub fn link(&self, peer: Aid) {
        if peer == self.aid {
            return;
        }
        self.cell.borrow_mut().links.add(peer, LinkKind::Linked);
        self.send_link(peer, LinkKind::Linked);
    }

    /// Be told when `peer` exits; `peer` is not told about us.
    pub fn monitor(&self, peer: Aid) {
        if peer == self.aid {
            return;
        }
        self.cell.borrow_mut().monitoring.insert(peer);
        self.send_link(peer, LinkKind::Monitored);
    }

    pub fn unlink(&self, peer: Aid) {
        {
            let mut c = self.cell.borrow_mut();
            c.links.remove(peer);
            c.monitoring.remove(&peer);
            c.mailbox.discard_exit(peer);
        }
        self.send_link(peer, LinkKind::Unlink);
    }

    pub fn demonitor(&self, peer: Aid) {
        {
            let mut c = self.cell.borrow_mut();
            c.monitoring.remove(&peer);
            c.mailbox.discard_exit(peer);
        }
        self.send_link(peer, LinkKind::Unlink);
    }

    fn send_link(&self, peer: Aid, kind: LinkKind) {
        trace!(actor = %self.aid, peer = %peer, kind = ?kind, "Link request");
        self.shared().route(WireEnvelope::new(
            peer,
            Tag::Link(Link {
                kind,
                peer: self.aid,
            }),
            Message::default(),
        ));
    }

    fn route_service(&self, svc: ServiceId, tag: Tag, msg: Message) {
        let shared = self.shared();
        if svc.ctxid == shared.ctxid {
            match self.strand.resolve_service(svc.name) {
                Some(target) => shared.route(WireEnvelope::new(target, tag, msg)),
                None => self.cache_service_exit(svc, tag, ExitCode::Already),
            }
        } else if shared.has_relay() {
            shared.route(WireEnvelope::new(svc, tag, msg));
        } else {
            self.cache_service_exit(svc, tag, ExitCode::NetErr);
        }
    }

    fn cache_service_exit(&self, svc: ServiceId, tag: Tag, code: ExitCode) {
        if !tag.wants_exit_on_failure() {
            return;
        }
        trace!(actor = %self.aid, service = %svc, code = %code, "Service unreachable");
        self.cell.borrow_mut().mailbox.push_service_exit(
            svc,
            Exit {
                code,
                from: Aid::nil(),
            },
            Message::exit(code, format!("service {svc} unavailable")),
        );
    }

    /// Oldest envelope of any type; waits forever.
    pub async fn recv(&mut self) -> (Aid, Message) {
        self.recv_match(&Pattern::new()).await
    }

    /// Oldest envelope of the first listed type that has one; waits forever.
    pub async fn recv_types<I, T>(&mut self, types: I) -> (Aid, Message)
    where
        I: IntoIterator<Item = T>,
        T: Into<MatchType>,
    {
        self.recv_match(&Pattern::of(types)).await
    }

    /// Receive per `pattern`. A timeout yields a nil sender and an empty message.
    pub async fn recv_match(&mut self, pattern: &Pattern) -> (Aid, Message) {
        wait_match(&self.cell, pattern, true).await
    }

    /// Wait for the answer to `handle` for the context's default request timeout.
    pub async fn respond(&mut self, handle: &ResponseHandle) -> (Aid, Message) {
        let timeout = self.shared().config.request_timeout();
        self.respond_timeout(handle, timeout).await
    }

    /// Wait for the answer to `handle`. If the responder has exited and its exit is
    /// cached here, that exit is the answer. A timeout yields a nil sender.
    pub async fn respond_timeout(
        &mut self,
        handle: &ResponseHandle,
        timeout: Duration,
    ) -> (Aid, Message) {
        let cell = &self.cell;
        let (sid, recver) = (handle.sid, handle.recver);
        let mut timer = (!timeout.is_zero()).then(|| Box::pin(tokio::time::sleep(timeout)));

        std::future::poll_fn(|cx| {
            let mut c = cell.borrow_mut();
            if let Some((res, msg)) = c.mailbox.pop_response(sid, Some(recver)) {
                c.resp_waker = None;
                return Poll::Ready((res.from, msg));
            }
            let expired = timer.as_mut().map_or(true, |t| t.as_mut().poll(cx).is_ready());
            if expired {
                c.resp_waker = None;
                c.mailbox.abandon_response(sid);
                return Poll::Ready((Aid::nil(), Message::default()));
            }
            c.resp_waker = Some(cx.waker().clone());
            Poll::Pending
        })
        .await
    }

    /// Suspend until `duration` passes; messages keep queueing meanwhile.
    pub async fn sleep(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Start a child actor and wait for it to announce itself.
    pub async fn spawn<F, Fut>(&mut self, f: F, opts: SpawnOpts) -> Result<Aid>
    where
        F: FnOnce(Actor) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        let shared = self.shared().clone();
        let strand = if opts.pinned {
            self.strand.index
        } else {
            shared.next_strand()
        };
        let make = boxed_spawn(f);
        let token = self.cell.borrow_mut().mint_sid();
        let sire = Sire {
            aid: self.aid,
            link: opts.link,
            token,
        };
        shared.post(
            strand,
            Box::new(move |local| {
                let _ = local.spawn_actor(make, Some(sire));
            }),
        )?;

        // Announcements left over from an earlier spawn that timed out carry
        // another token and are discarded.
        let deadline = Instant::now() + shared.config.request_timeout();
        let (child, reason) = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let pattern = Pattern::of([NEW_ACTOR]).timeout(remaining);
            let (from, msg) = wait_match(&self.cell, &pattern, false).await;
            if msg.ty() != NEW_ACTOR {
                return Err(ActorError::spawn_failed("timed out waiting for the new actor"));
            }
            match msg.decode::<(Sid, String)>() {
                Ok((announced, reason)) if announced == token => break (from, reason),
                _ => trace!(sire = %self.aid, from = %from, "Stale spawn announcement dropped"),
            }
        };
        if child.is_nil() {
            return Err(ActorError::spawn_failed(reason));
        }

        {
            let mut c = self.cell.borrow_mut();
            // The child may already be gone and its exit queued.
            if !c.mailbox.has_exit(child) {
                match opts.link {
                    Some(LinkKind::Linked) => c.links.add(child, LinkKind::Linked),
                    Some(LinkKind::Monitored) => {
                        c.monitoring.insert(child);
                    }
                    _ => {}
                }
            }
        }
        debug!(sire = %self.aid, child = %child, link = ?opts.link, "Child spawned");
        Ok(child)
    }

    /// Bind `name` to this actor on every strand. Returns once all strands know.
    pub async fn register_service(&mut self, name: impl Into<MatchType>) -> Result<ServiceId> {
        let name = name.into();
        if self.shared().is_stopping() {
            return Err(ActorError::context_stopped("register_service"));
        }
        {
            let mut c = self.cell.borrow_mut();
            if !c.services.contains(&name) {
                c.services.push(name);
            }
        }
        futures::future::join_all(self.shared().broadcast_bind(name, self.aid)).await;
        let svc = self.service(name);
        debug!(actor = %self.aid, service = %svc, "Service registered");
        Ok(svc)
    }

    pub async fn deregister_service(&mut self, name: impl Into<MatchType>) -> Result<()> {
        let name = name.into();
        self.cell.borrow_mut().services.retain(|n| *n != name);
        futures::future::join_all(self.shared().broadcast_unbind(name, self.aid)).await;
        debug!(actor = %self.aid, service = %name, "Service deregistered");
        Ok(())
    }

    /// Terminate with `code`. For a coroutine actor this never resumes:
    /// write `return actor.quit(code, reason).await;`.
    pub async fn quit(&mut self, code: ExitCode, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        let (kill, threaded) = {
            let mut c = self.cell.borrow_mut();
            (c.kill.take(), c.threaded)
        };
        if threaded {
            self.strand.finalize(&self.cell, code, &reason);
            return Ok(());
        }
        if let Some(kill) = kill {
            let _ = kill.send((code, reason));
        }
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Pop per `pattern` from `cell`, parking on a miss.
///
/// `user_visible` receives become the tag `relay` reuses; runtime-internal
/// waits such as spawn announcements leave it alone.
async fn wait_match(cell: &CellRef, pattern: &Pattern, user_visible: bool) -> (Aid, Message) {
    let once = pattern.timeout == Some(Duration::ZERO);
    let mut timer = pattern
        .timeout
        .filter(|timeout| !timeout.is_zero())
        .map(|timeout| Box::pin(tokio::time::sleep(timeout)));

    std::future::poll_fn(|cx| {
        let mut c = cell.borrow_mut();
        if let Some((tag, msg)) = c.mailbox.pop(pattern) {
            c.recv_waker = None;
            if user_visible && matches!(tag, Tag::Direct(_) | Tag::Request(_)) {
                c.last_tag = Some(tag);
            }
            return Poll::Ready((tag.sender(), msg));
        }
        let expired = once || timer.as_mut().is_some_and(|t| t.as_mut().poll(cx).is_ready());
        if expired {
            c.recv_waker = None;
            return Poll::Ready((Aid::nil(), Message::default()));
        }
        c.recv_waker = Some(cx.waker().clone());
        Poll::Pending
    })
    .await
}

impl std::fmt::Debug for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actor")
            .field("aid", &self.aid)
            .field("strand", &self.strand.index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sids_are_monotonic_from_one() {
        let aid = Aid::new(CtxId::from_name("t"), 0, 0, 1);
        let mut cell = ActorCell::new(aid, &ContextConfig::default(), None);
        assert_eq!(cell.mint_sid(), 1);
        assert_eq!(cell.mint_sid(), 2);
        assert_eq!(cell.status, Status::Ready);
    }

    fn cell() -> CellRef {
        let aid = Aid::new(CtxId::from_name("t"), 0, 0, 1);
        Rc::new(RefCell::new(ActorCell::new(aid, &ContextConfig::default(), None)))
    }

    fn peer() -> Aid {
        Aid::new(CtxId::from_name("t"), 0, 1, 1)
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_and_expiry_in_one_turn_resume_once() {
        let cell = cell();
        let pattern = Pattern::new().timeout(Duration::from_millis(100));
        let wait = wait_match(&cell, &pattern, true);
        futures::pin_mut!(wait);
        assert!(futures::poll!(wait.as_mut()).is_pending());

        {
            let mut c = cell.borrow_mut();
            c.mailbox
                .push(Tag::Direct(peer()), Message::new(strand_types::atom("late")));
            c.wake();
        }
        tokio::time::advance(Duration::from_millis(150)).await;

        let (from, msg) = wait.await;
        assert_eq!(from, peer());
        assert_eq!(msg.ty(), strand_types::atom("late"));
        assert_eq!(cell.borrow().last_tag, Some(Tag::Direct(peer())));

        let again = Pattern::new().timeout(Duration::ZERO);
        let (from, _) = wait_match(&cell, &again, true).await;
        assert!(from.is_nil());
        assert!(cell.borrow().mailbox.is_empty());
        assert!(cell.borrow().recv_waker.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_leaves_later_message_queued() {
        let cell = cell();
        let pattern = Pattern::new().timeout(Duration::from_millis(100));
        let wait = wait_match(&cell, &pattern, true);
        futures::pin_mut!(wait);
        assert!(futures::poll!(wait.as_mut()).is_pending());

        tokio::time::advance(Duration::from_millis(150)).await;
        let (from, msg) = wait.await;
        assert!(from.is_nil());
        assert_eq!(msg, Message::default());

        cell.borrow_mut()
            .mailbox
            .push(Tag::Direct(peer()), Message::new(strand_types::atom("after")));
        assert_eq!(cell.borrow().mailbox.len(), 1);
        assert_eq!(cell.borrow().last_tag, None);
    }

    #[tokio::test]
    async fn test_internal_wait_keeps_relay_tag() {
        let cell = cell();
        let requester = Tag::Request(Request {
            sid: 7,
            from: peer(),
        });
        cell.borrow_mut().last_tag = Some(requester);
        cell.borrow_mut()
            .mailbox
            .push(Tag::Direct(peer()), Message::new(NEW_ACTOR));

        let pattern = Pattern::of([NEW_ACTOR]).timeout(Duration::ZERO);
        let (from, _) = wait_match(&cell, &pattern, false).await;
        assert_eq!(from, peer());
        assert_eq!(cell.borrow().last_tag, Some(requester));
    }

    #[test]
    fn test_spawn_opts() {
        assert_eq!(SpawnOpts::default().link, None);
        assert_eq!(SpawnOpts::linked().link, Some(LinkKind::Linked));
        let opts = SpawnOpts::monitored().pinned();
        assert_eq!(opts.link, Some(LinkKind::Monitored));
        assert!(opts.pinned);
    }
}
