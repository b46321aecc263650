//! Threaded actor
//!
//! An actor usable from ordinary async code (`main`, tests, other runtimes). Its
//! cell lives on a utility strand like any other actor; each call posts a job there,
//! runs the operation as a local task and hands the result back over a oneshot.

use crate::actor::{Actor, ResponseHandle, SpawnOpts};
use crate::context::Shared;
use crate::error::{ActorError, Result};
use crate::pattern::Pattern;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use strand_types::{Aid, ExitCode, MatchType, Message, Recver, ServiceId};
use tokio::sync::oneshot;

pub struct ThreadedActor {
    shared: Arc<Shared>,
    aid: Aid,
    closed: bool,
}

impl ThreadedActor {
    pub(crate) fn new(shared: Arc<Shared>, aid: Aid) -> Self {
        Self {
            shared,
            aid,
            closed: false,
        }
    }

    pub fn aid(&self) -> Aid {
        self.aid
    }

    pub fn service(&self, name: impl Into<MatchType>) -> ServiceId {
        ServiceId::new(self.aid.ctxid, name.into())
    }

    /// Run `op` against this actor on its strand.
    ///
    /// If the caller stops waiting, the operation is abandoned at its next
    /// suspension point and nothing it would have received is consumed.
    async fn call<R, F, Fut>(&self, name: &'static str, op: F) -> Result<R>
    where
        F: FnOnce(Actor) -> Fut + Send + 'static,
        Fut: Future<Output = R> + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let aid = self.aid;
        self.shared.post(
            aid.strand,
            Box::new(move |local| {
                let Some(actor) = local.actor(aid) else {
                    return;
                };
                let mut tx = tx;
                tokio::task::spawn_local(async move {
                    let out = tokio::select! {
                        out = op(actor) => Some(out),
                        _ = tx.closed() => None,
                    };
                    if let Some(out) = out {
                        let _ = tx.send(out);
                    }
                });
            }),
        )?;
        rx.await.map_err(|_| ActorError::context_stopped(name))
    }

    pub async fn send(&mut self, target: Aid, msg: Message) -> Result<()> {
        self.call("send", move |actor| async move { actor.send(target, msg) })
            .await
    }

    pub async fn send_svc(&mut self, svc: ServiceId, msg: Message) -> Result<()> {
        self.call("send_svc", move |actor| async move { actor.send_svc(svc, msg) })
            .await
    }

    pub async fn request(&mut self, target: Aid, msg: Message) -> Result<ResponseHandle> {
        self.call("request", move |actor| async move { actor.request(target, msg) })
            .await
    }

    pub async fn request_svc(&mut self, svc: ServiceId, msg: Message) -> Result<ResponseHandle> {
        self.call("request_svc", move |actor| async move {
            actor.request_svc(svc, msg)
        })
        .await
    }

    pub async fn reply(&mut self, target: Aid, msg: Message) -> Result<()> {
        self.call("reply", move |actor| async move { actor.reply(target, msg) })
            .await
    }

    pub async fn relay(&mut self, target: impl Into<Recver>, msg: Message) -> Result<()> {
        let target = target.into();
        self.call("relay", move |actor| async move { actor.relay(target, msg) })
            .await
    }

    pub async fn link(&mut self, peer: Aid) -> Result<()> {
        self.call("link", move |actor| async move { actor.link(peer) })
            .await
    }

    pub async fn monitor(&mut self, peer: Aid) -> Result<()> {
        self.call("monitor", move |actor| async move { actor.monitor(peer) })
            .await
    }

    pub async fn unlink(&mut self, peer: Aid) -> Result<()> {
        self.call("unlink", move |actor| async move { actor.unlink(peer) })
            .await
    }

    pub async fn demonitor(&mut self, peer: Aid) -> Result<()> {
        self.call("demonitor", move |actor| async move { actor.demonitor(peer) })
            .await
    }

    pub async fn recv(&mut self) -> Result<(Aid, Message)> {
        self.recv_match(Pattern::new()).await
    }

    pub async fn recv_types<I, T>(&mut self, types: I) -> Result<(Aid, Message)>
    where
        I: IntoIterator<Item = T>,
        T: Into<MatchType>,
    {
        self.recv_match(Pattern::of(types)).await
    }

    pub async fn recv_match(&mut self, pattern: Pattern) -> Result<(Aid, Message)> {
        self.call("recv", move |mut actor| async move {
            actor.recv_match(&pattern).await
        })
        .await
    }

    pub async fn respond(&mut self, handle: ResponseHandle) -> Result<(Aid, Message)> {
        self.call("respond", move |mut actor| async move {
            actor.respond(&handle).await
        })
        .await
    }

    pub async fn respond_timeout(
        &mut self,
        handle: ResponseHandle,
        timeout: Duration,
    ) -> Result<(Aid, Message)> {
        self.call("respond", move |mut actor| async move {
            actor.respond_timeout(&handle, timeout).await
        })
        .await
    }

    pub async fn spawn<F, Fut>(&mut self, f: F, opts: SpawnOpts) -> Result<Aid>
    where
        F: FnOnce(Actor) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        self.call("spawn", move |mut actor| async move { actor.spawn(f, opts).await })
            .await?
    }

    pub async fn register_service(&mut self, name: impl Into<MatchType>) -> Result<ServiceId> {
        let name = name.into();
        self.call("register_service", move |mut actor| async move {
            actor.register_service(name).await
        })
        .await?
    }

    pub async fn deregister_service(&mut self, name: impl Into<MatchType>) -> Result<()> {
        let name = name.into();
        self.call("deregister_service", move |mut actor| async move {
            actor.deregister_service(name).await
        })
        .await?
    }

    /// Exit with `code`, notifying every link.
    pub async fn quit(mut self, code: ExitCode, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        self.closed = true;
        self.call("quit", move |mut actor| async move {
            actor.quit(code, reason).await
        })
        .await?
    }
}

impl Drop for ThreadedActor {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let aid = self.aid;
        let _ = self.shared.post(
            aid.strand,
            Box::new(move |local| local.finalize_aid(aid, ExitCode::Normal, "")),
        );
    }
}

impl std::fmt::Debug for ThreadedActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadedActor").field("aid", &self.aid).finish()
    }
}
