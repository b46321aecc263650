//! # Strand
//!
//! A strand is one serialization domain. It owns the actor cells placed on it and
//! its copy of the service table; nothing else ever touches them. Other threads
//! reach a strand only by posting a [`Job`] into its queue.
//!
//! ```text
//! worker thread k: current_thread runtime + LocalSet
//!     strand k, strand k + threads, ...   one loop task each
//!         actor tasks                     spawn_local, woken by deliver()
//! ```
//!
//! The loop handles at most `max_tick_handle_size` jobs per pass and then yields so
//! actor tasks woken by those jobs get their turn.

use crate::actor::{Actor, ActorCell, CellRef, Sire, SpawnFn, Status};
use crate::context::Shared;
use crate::error::{ActorError, Result};
use crate::metrics::ContextMetrics;
use crate::pool::{Handle, Pool};
use crate::variant::{ActorVariant, VariantCtx, VariantFn};
use futures::FutureExt;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use std::sync::Arc;
use strand_codec::WireEnvelope;
use strand_types::{
    Aid, Exit, ExitCode, Link, LinkKind, MatchType, Message, Recver, ServiceId, Tag, NEW_ACTOR,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};

/// Work posted onto a strand; runs to completion inside the strand's turn.
pub(crate) type Job = Box<dyn FnOnce(&Rc<StrandLocal>) + Send>;

pub(crate) enum Command {
    Run(Job),
    Stop,
}

/// Sending half of a strand's queue, shared by every thread.
pub(crate) struct StrandHandle {
    pub index: u32,
    tx: mpsc::UnboundedSender<Command>,
}

impl StrandHandle {
    pub fn channel(index: u32) -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { index, tx }, rx)
    }

    pub fn post(&self, job: Job) -> Result<()> {
        self.tx
            .send(Command::Run(job))
            .map_err(|_| ActorError::context_stopped(format!("post to strand {}", self.index)))
    }

    pub fn stop(&self) {
        let _ = self.tx.send(Command::Stop);
    }
}

/// Strand-owned state. Lives on exactly one worker thread.
pub(crate) struct StrandLocal {
    pub index: u32,
    pub shared: Arc<Shared>,
    actors: RefCell<Pool<CellRef>>,
    services: RefCell<HashMap<MatchType, Vec<Aid>>>,
}

impl StrandLocal {
    pub fn new(index: u32, shared: Arc<Shared>) -> Self {
        let actors = Pool::new(
            shared.config.actor_pool_reserve_size,
            shared.config.actor_pool_limit(),
        );
        Self {
            index,
            shared,
            actors: RefCell::new(actors),
            services: RefCell::new(HashMap::new()),
        }
    }

    pub async fn run(self: Rc<Self>, mut rx: mpsc::UnboundedReceiver<Command>) {
        let batch = self.shared.config.max_tick_handle_size.max(1);
        debug!(strand = self.index, "Strand started");

        'running: loop {
            let Some(mut command) = rx.recv().await else {
                break;
            };
            let mut handled = 0;
            loop {
                match command {
                    Command::Run(job) => job(&self),
                    Command::Stop => break 'running,
                }
                handled += 1;
                if handled >= batch {
                    break;
                }
                match rx.try_recv() {
                    Ok(next) => command = next,
                    Err(_) => break,
                }
            }
            tokio::task::yield_now().await;
        }

        self.kill_all();
        // Finalizing actors may still post jobs here (exits to neighbours).
        while !self.actors.borrow().is_empty() {
            for _ in 0..batch {
                match rx.try_recv() {
                    Ok(Command::Run(job)) => job(&self),
                    Ok(Command::Stop) => {}
                    Err(_) => break,
                }
            }
            tokio::task::yield_now().await;
        }
        rx.close();
        while rx.try_recv().is_ok() {}

        debug!(strand = self.index, "Strand stopped");
    }

    fn kill_all(&self) {
        let cells: Vec<CellRef> = self
            .actors
            .borrow()
            .iter()
            .map(|(_, cell)| cell.clone())
            .collect();
        debug!(strand = self.index, actors = cells.len(), "Stopping strand actors");
        for cell in cells {
            let (kill, driven) = {
                let mut c = cell.borrow_mut();
                (c.kill.take(), c.threaded || c.variant.is_some())
            };
            match kill {
                Some(kill) => {
                    let _ = kill.send((ExitCode::Shutdown, "context shutdown".to_string()));
                }
                None if driven => self.finalize(&cell, ExitCode::Shutdown, "context shutdown"),
                None => {}
            }
        }
    }

    fn cell(&self, aid: Aid) -> Option<CellRef> {
        if aid.strand != self.index {
            return None;
        }
        let handle = Handle {
            index: aid.slot,
            generation: aid.generation,
        };
        self.actors.borrow().get(handle).cloned()
    }

    /// Live actor handle for `aid`, used by threaded-actor operations.
    pub fn actor(self: &Rc<Self>, aid: Aid) -> Option<Actor> {
        let cell = self.cell(aid)?;
        if cell.borrow().status == Status::Off {
            return None;
        }
        Some(Actor::from_parts(self.clone(), cell, aid))
    }

    /// Allocate a cell, announce the new actor to its sire and start its task.
    pub fn spawn_actor(self: &Rc<Self>, make: SpawnFn, sire: Option<Sire>) -> Result<Aid> {
        let started = self.start_actor(make, sire);
        if let Some(sire) = sire {
            let (from, reason) = match &started {
                Ok(aid) => (*aid, String::new()),
                Err(e) => (Aid::nil(), e.to_string()),
            };
            let msg = Message::with(NEW_ACTOR, &(sire.token, reason))
                .unwrap_or_else(|_| Message::new(NEW_ACTOR));
            let env = WireEnvelope::new(sire.aid, Tag::Direct(from), msg);
            self.shared
                .route(if from.is_nil() { env.err_ret() } else { env });
        }
        if let Err(e) = &started {
            warn!(strand = self.index, error = %e, "Spawn refused");
        }
        started
    }

    fn start_actor(self: &Rc<Self>, make: SpawnFn, sire: Option<Sire>) -> Result<Aid> {
        if self.shared.is_stopping() {
            return Err(ActorError::context_stopped("spawn"));
        }
        let aid = self.next_aid()?;

        let (kill_tx, kill_rx) = oneshot::channel();
        let mut cell = ActorCell::new(aid, &self.shared.config, Some(kill_tx));
        if let Some(Sire {
            aid: sire,
            link: Some(kind),
            ..
        }) = sire
        {
            cell.links.add(sire, kind);
        }
        let cell = Rc::new(RefCell::new(cell));
        self.insert(cell.clone())?;

        let body = make(Actor::from_parts(self.clone(), cell.clone(), aid));
        tokio::task::spawn_local(run_actor(self.clone(), cell, body, kill_rx));
        ContextMetrics::incr(&self.shared.metrics.actors_spawned);
        debug!(actor = %aid, strand = self.index, "Actor spawned");
        Ok(aid)
    }

    /// Cell for a threaded actor: no task, driven entirely by posted jobs.
    pub fn attach_threaded(self: &Rc<Self>) -> Result<Aid> {
        if self.shared.is_stopping() {
            return Err(ActorError::context_stopped("threaded_actor"));
        }
        let aid = self.next_aid()?;
        let mut cell = ActorCell::new(aid, &self.shared.config, None);
        cell.threaded = true;
        cell.status = Status::On;
        self.insert(Rc::new(RefCell::new(cell)))?;
        ContextMetrics::incr(&self.shared.metrics.actors_spawned);
        debug!(actor = %aid, strand = self.index, "Threaded actor attached");
        Ok(aid)
    }

    /// Identity the next inserted cell will get.
    fn next_aid(&self) -> Result<Aid> {
        let handle = self
            .actors
            .borrow()
            .next_handle()
            .ok_or_else(|| self.exhausted())?;
        Ok(Aid::new(
            self.shared.ctxid,
            self.index,
            handle.index,
            handle.generation,
        ))
    }

    fn exhausted(&self) -> ActorError {
        ActorError::PoolExhausted {
            strand: self.index,
            max: self.shared.config.actor_pool_max_size,
        }
    }

    fn insert(&self, cell: CellRef) -> Result<()> {
        self.actors
            .borrow_mut()
            .insert(cell)
            .map(|_| ())
            .map_err(|_| self.exhausted())
    }

    /// Put `env` into the target's mailbox and wake it.
    pub fn deliver(&self, env: WireEnvelope) {
        let target = env.target;
        let live = self.cell(target).filter(|cell| cell.borrow().status != Status::Off);
        let Some(cell) = live else {
            trace!(target = %target, tag = env.tag.kind_name(), "Target gone");
            self.shared
                .bounce(env.recver(), env.tag, env.is_err_ret, ExitCode::Already);
            return;
        };

        let mut c = cell.borrow_mut();
        match env.tag {
            Tag::Link(link) => {
                match link.kind {
                    LinkKind::Linked | LinkKind::Monitored => c.links.add(link.peer, link.kind),
                    LinkKind::Unlink => {
                        c.links.remove(link.peer);
                        c.mailbox.discard_exit(link.peer);
                    }
                }
                trace!(target = %target, peer = %link.peer, kind = ?link.kind, "Link updated");
                return;
            }
            Tag::Exit(exit) => {
                c.links.remove(exit.from);
                c.monitoring.remove(&exit.from);
            }
            Tag::Direct(_) | Tag::Request(_) | Tag::Response(_) => {}
        }

        if c.variant.is_some() {
            drop(c);
            self.dispatch(&cell, |variant, ctx| variant.on_receive(ctx, env.tag, env.msg));
            return;
        }

        match env.tag {
            Tag::Exit(exit) => match self.service_name_of(exit.from) {
                Some(name) => {
                    let svc = ServiceId::new(exit.from.ctxid, name);
                    c.mailbox.push_service_exit(svc, exit, env.msg);
                }
                None => c.mailbox.push(env.tag, env.msg),
            },
            _ => c.mailbox.push(env.tag, env.msg),
        }
        trace!(target = %target, tag = env.tag.kind_name(), "Delivered");
        c.wake();
    }

    /// Cell for an event-driven variant built by `make` around its new identity.
    pub fn attach_variant(self: &Rc<Self>, make: VariantFn) -> Result<Aid> {
        if self.shared.is_stopping() {
            return Err(ActorError::context_stopped("attach_variant"));
        }
        let aid = self.next_aid()?;
        let variant = std::panic::catch_unwind(AssertUnwindSafe(|| make(aid))).map_err(|panic| {
            ActorError::spawn_failed(format!(
                "variant constructor panicked: {}",
                panic_message(panic.as_ref())
            ))
        })?;
        if variant.identity() != aid {
            return Err(ActorError::spawn_failed(format!(
                "variant claims identity {}, was given {aid}",
                variant.identity()
            )));
        }

        let mut cell = ActorCell::new(aid, &self.shared.config, None);
        cell.variant = Some(variant);
        cell.status = Status::On;
        let cell = Rc::new(RefCell::new(cell));
        self.insert(cell.clone())?;
        ContextMetrics::incr(&self.shared.metrics.actors_spawned);
        debug!(actor = %aid, strand = self.index, "Variant attached");

        self.dispatch(&cell, |variant, ctx| variant.start(ctx));
        Ok(aid)
    }

    /// Run one variant callback with the variant lifted out of its cell, so the
    /// callback can reach the cell through its [`VariantCtx`].
    fn dispatch<F>(&self, cell: &CellRef, callback: F)
    where
        F: FnOnce(&mut dyn ActorVariant, &VariantCtx<'_>) -> Result<()>,
    {
        let (aid, variant) = {
            let mut c = cell.borrow_mut();
            (c.aid, c.variant.take())
        };
        let Some(mut variant) = variant else {
            return;
        };

        let ctx = VariantCtx::new(&self.shared, cell, aid);
        let ran = std::panic::catch_unwind(AssertUnwindSafe(|| callback(variant.as_mut(), &ctx)));
        let outcome = match ran {
            Ok(Ok(())) => ctx.take_quit(),
            Ok(Err(e)) => {
                error!(actor = %aid, error = %e, "Variant failed");
                Some((ExitCode::Exception, e.to_string()))
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(actor = %aid, panic = %reason, "Variant panicked");
                Some((ExitCode::Exception, reason))
            }
        };

        cell.borrow_mut().variant = Some(variant);
        if let Some((code, reason)) = outcome {
            self.finalize(cell, code, &reason);
        }
    }

    /// Resolve a service-addressed envelope through this strand's table.
    pub fn deliver_service(&self, mut env: WireEnvelope, svc: ServiceId) {
        match self.resolve_service(svc.name) {
            Some(aid) => {
                env.target = aid;
                self.shared.route(env);
            }
            None => {
                trace!(service = %svc, "Service not registered");
                self.shared
                    .bounce(Recver::Service(svc), env.tag, env.is_err_ret, ExitCode::Already);
            }
        }
    }

    /// Prefer a registration on this strand, else the earliest one.
    pub fn resolve_service(&self, name: MatchType) -> Option<Aid> {
        let services = self.services.borrow();
        let bound = services.get(&name)?;
        bound
            .iter()
            .find(|aid| aid.strand == self.index)
            .or_else(|| bound.first())
            .copied()
    }

    pub fn bind_service(&self, name: MatchType, aid: Aid) {
        let mut services = self.services.borrow_mut();
        let bound = services.entry(name).or_default();
        if !bound.contains(&aid) {
            bound.push(aid);
        }
    }

    pub fn unbind_service(&self, name: MatchType, aid: Aid) {
        let mut services = self.services.borrow_mut();
        if let Some(bound) = services.get_mut(&name) {
            bound.retain(|a| *a != aid);
            if bound.is_empty() {
                services.remove(&name);
            }
        }
    }

    fn service_name_of(&self, aid: Aid) -> Option<MatchType> {
        if aid.is_nil() {
            return None;
        }
        self.services
            .borrow()
            .iter()
            .find(|(_, bound)| bound.contains(&aid))
            .map(|(name, _)| *name)
    }

    /// Terminal step for every actor: notify links, drop services, free the slot.
    pub fn finalize(&self, cell: &CellRef, code: ExitCode, reason: &str) {
        let (aid, links, monitoring, services, variant) = {
            let mut c = cell.borrow_mut();
            if c.status == Status::Off {
                return;
            }
            c.status = Status::Off;
            c.kill = None;
            c.recv_waker = None;
            c.resp_waker = None;
            let links: Vec<_> = c.links.drain().collect();
            let monitoring = std::mem::take(&mut c.monitoring);
            (c.aid, links, monitoring, std::mem::take(&mut c.services), c.variant.take())
        };

        if let Some(mut variant) = variant {
            let stopped =
                std::panic::catch_unwind(AssertUnwindSafe(|| variant.stop(code, reason)));
            if stopped.is_err() {
                warn!(actor = %aid, "Variant panicked while stopping");
            }
        }

        let metrics = &self.shared.metrics;
        ContextMetrics::incr(&metrics.actors_exited);
        if code == ExitCode::Exception {
            ContextMetrics::incr(&metrics.actor_faults);
        }

        for (peer, kind) in &links {
            trace!(actor = %aid, peer = %peer, kind = ?kind, "Notifying peer of exit");
            self.shared.route(WireEnvelope::new(
                *peer,
                Tag::Exit(Exit { code, from: aid }),
                Message::exit(code, reason),
            ));
        }
        // A linked peer already drops us when our exit arrives.
        let watched = monitoring
            .into_iter()
            .filter(|peer| !links.iter().any(|(linked, _)| linked == peer));
        for peer in watched {
            let unlink = Link {
                kind: LinkKind::Unlink,
                peer: aid,
            };
            self.shared.route(
                WireEnvelope::new(peer, Tag::Link(unlink), Message::default()).err_ret(),
            );
        }
        for name in services {
            self.shared.broadcast_unbind(name, aid);
        }

        self.actors.borrow_mut().remove(Handle {
            index: aid.slot,
            generation: aid.generation,
        });

        debug!(actor = %aid, code = %code, links = links.len(), "Actor exited");
    }

    pub fn finalize_aid(&self, aid: Aid, code: ExitCode, reason: &str) {
        if let Some(cell) = self.cell(aid) {
            self.finalize(&cell, code, reason);
        }
    }
}

/// Actor task: run the body until it returns, faults, panics or is killed.
async fn run_actor(
    strand: Rc<StrandLocal>,
    cell: CellRef,
    body: futures::future::LocalBoxFuture<'static, Result<()>>,
    kill_rx: oneshot::Receiver<(ExitCode, String)>,
) {
    let aid = {
        let mut c = cell.borrow_mut();
        c.status = Status::On;
        c.aid
    };

    let (code, reason) = tokio::select! {
        biased;
        killed = kill_rx => killed.unwrap_or((ExitCode::Shutdown, String::new())),
        ran = AssertUnwindSafe(body).catch_unwind() => match ran {
            Ok(Ok(())) => (ExitCode::Normal, String::new()),
            Ok(Err(e)) => {
                error!(actor = %aid, error = %e, "Actor failed");
                (ExitCode::Exception, e.to_string())
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(actor = %aid, panic = %reason, "Actor panicked");
                (ExitCode::Exception, reason)
            }
        },
    };

    strand.finalize(&cell, code, &reason);
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "panic");
    }
}
