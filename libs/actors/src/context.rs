//! # Context
//!
//! Owns the strands and the worker threads running them. Strand `i` runs on worker
//! `i % thread_num`; the first `thread_num * per_thread_service_num` strands host
//! coroutine actors, the rest are utility strands for threaded actors.
//!
//! The only state shared across threads is [`Shared`]: each strand's queue sender,
//! round-robin counters, the relay slot and metrics. Everything an actor owns stays
//! on its strand and is reached by posting a job there.

use crate::actor::{boxed_spawn, Actor};
use crate::error::{ActorError, Result};
use crate::metrics::{ContextMetrics, MetricsSnapshot};
use crate::relay::{Relay, WireSink};
use crate::strand::{Command, Job, StrandHandle, StrandLocal};
use crate::threaded::ThreadedActor;
use crate::variant::{ActorVariant, VariantFn};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use strand_codec::WireEnvelope;
use strand_config::ContextConfig;
use strand_types::{Aid, CtxId, Exit, ExitCode, MatchType, Message, Recver, Response, Tag};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

thread_local! {
    static ON_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// Cross-thread half of a context.
pub(crate) struct Shared {
    pub ctxid: CtxId,
    pub config: ContextConfig,
    pub metrics: ContextMetrics,
    strands: Vec<StrandHandle>,
    service_strands: usize,
    next_service: AtomicUsize,
    next_utility: AtomicUsize,
    relay: RwLock<Option<Arc<dyn Relay>>>,
    stopping: AtomicBool,
}

impl Shared {
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    pub fn post(&self, strand: u32, job: Job) -> Result<()> {
        let handle = self
            .strands
            .get(strand as usize)
            .ok_or_else(|| {
                ActorError::context_stopped(format!("post to unknown strand {strand}"))
            })?;
        handle.post(job)?;
        ContextMetrics::incr(&self.metrics.envelopes_posted);
        Ok(())
    }

    /// Round-robin over the actor-hosting strands.
    pub fn next_strand(&self) -> u32 {
        (self.next_service.fetch_add(1, Ordering::Relaxed) % self.service_strands) as u32
    }

    pub fn next_utility_strand(&self) -> u32 {
        let utility = self.strands.len() - self.service_strands;
        if utility == 0 {
            return self.next_strand();
        }
        (self.service_strands + self.next_utility.fetch_add(1, Ordering::Relaxed) % utility) as u32
    }

    pub fn has_relay(&self) -> bool {
        self.relay.read().is_some()
    }

    /// Send `env` toward its target: a local strand or the relay.
    pub fn route(self: &Arc<Self>, env: WireEnvelope) {
        let recver = env.recver();
        if matches!(recver, Recver::Aid(aid) if aid.is_nil()) {
            self.bounce(recver, env.tag, env.is_err_ret, ExitCode::Already);
            return;
        }
        if self.is_stopping() {
            // Strands no longer take jobs. Foreign traffic, including bounces
            // owed to remote senders, still leaves through the relay.
            if env.target_ctxid() != self.ctxid {
                self.forward(env);
            } else {
                trace!(tag = env.tag.kind_name(), "Context stopping; bouncing envelope");
                self.bounce(recver, env.tag, env.is_err_ret, ExitCode::Already);
            }
            return;
        }

        if env.target_ctxid() != self.ctxid {
            self.forward(env);
            return;
        }

        let (tag, is_err_ret) = (env.tag, env.is_err_ret);
        let posted = match recver {
            Recver::Aid(target) => {
                self.post(target.strand, Box::new(move |local| local.deliver(env)))
            }
            Recver::Service(svc) => {
                let strand = if !env.source.is_nil() && env.source.is_local_to(self.ctxid) {
                    env.source.strand
                } else {
                    0
                };
                self.post(strand, Box::new(move |local| local.deliver_service(env, svc)))
            }
        };
        if let Err(e) = posted {
            warn!(target = %recver, error = %e, "Envelope could not be posted");
            self.bounce(recver, tag, is_err_ret, ExitCode::Already);
        }
    }

    /// Answer an undeliverable envelope with an exit, or drop it if nobody is owed one.
    pub fn bounce(self: &Arc<Self>, target: Recver, tag: Tag, is_err_ret: bool, code: ExitCode) {
        let from = match target {
            Recver::Aid(aid) => aid,
            Recver::Service(_) => Aid::nil(),
        };
        let notify = if is_err_ret || !tag.wants_exit_on_failure() {
            None
        } else {
            match tag {
                Tag::Request(req) => {
                    Some((req.from, Tag::Response(Response { sid: req.sid, from })))
                }
                _ => Some((tag.sender(), Tag::Exit(Exit { code, from }))),
            }
        };

        match notify {
            Some((to, reply)) if !to.is_nil() => {
                ContextMetrics::incr(&self.metrics.bounces);
                trace!(target = %target, to = %to, code = %code, "Bouncing exit");
                let reason = match code {
                    ExitCode::NetErr => "no route to context",
                    _ => "already exited",
                };
                self.route(WireEnvelope::new(to, reply, Message::exit(code, reason)).err_ret());
            }
            _ => {
                ContextMetrics::incr(&self.metrics.envelopes_dropped);
                trace!(target = %target, tag = tag.kind_name(), "Undeliverable envelope dropped");
            }
        }
    }

    fn forward(self: &Arc<Self>, env: WireEnvelope) {
        let (recver, tag, is_err_ret) = (env.recver(), env.tag, env.is_err_ret);
        let ctxid = env.target_ctxid();

        let relay = self.relay.read().clone();
        let Some(relay) = relay else {
            trace!(ctxid = %ctxid, "No relay installed");
            self.bounce(recver, tag, is_err_ret, ExitCode::NetErr);
            return;
        };
        let frame = match strand_codec::encode(&env) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(ctxid = %ctxid, error = %e, "Envelope encode failed");
                self.bounce(recver, tag, is_err_ret, ExitCode::NetErr);
                return;
            }
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(ctxid = %ctxid, "Relay needs a runtime; none on this thread");
            self.bounce(recver, tag, is_err_ret, ExitCode::NetErr);
            return;
        };

        let shared = self.clone();
        runtime.spawn(async move {
            match relay.forward(ctxid, frame).await {
                Ok(()) => ContextMetrics::incr(&shared.metrics.frames_relayed),
                Err(e) => {
                    warn!(ctxid = %ctxid, error = %e, "Relay forward failed");
                    shared.bounce(recver, tag, is_err_ret, ExitCode::NetErr);
                }
            }
        });
    }

    pub fn deliver_wire(self: &Arc<Self>, frame: Bytes) -> Result<()> {
        let env = strand_codec::decode(frame)?;
        ContextMetrics::incr(&self.metrics.frames_delivered);
        let ctxid = env.target_ctxid();
        if ctxid != self.ctxid {
            return Err(ActorError::relay(format!(
                "frame for context {ctxid} delivered to {}",
                self.ctxid
            )));
        }
        self.route(env);
        Ok(())
    }

    /// Run `op` on every strand; each receiver completes once its strand has run it.
    pub fn broadcast<F>(&self, op: F) -> Vec<oneshot::Receiver<()>>
    where
        F: Fn(&StrandLocal) + Clone + Send + 'static,
    {
        self.strands
            .iter()
            .filter_map(|strand| {
                let (tx, rx) = oneshot::channel();
                let op = op.clone();
                let job: Job = Box::new(move |local| {
                    op(local.as_ref());
                    let _ = tx.send(());
                });
                strand.post(job).ok().map(|_| rx)
            })
            .collect()
    }

    pub fn broadcast_bind(&self, name: MatchType, aid: Aid) -> Vec<oneshot::Receiver<()>> {
        self.broadcast(move |local| local.bind_service(name, aid))
    }

    pub fn broadcast_unbind(&self, name: MatchType, aid: Aid) -> Vec<oneshot::Receiver<()>> {
        self.broadcast(move |local| local.unbind_service(name, aid))
    }
}

/// An actor runtime instance.
///
/// Dropping the context shuts it down: live actors exit with
/// [`ExitCode::Shutdown`] and the worker threads are joined.
pub struct Context {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Context {
    pub fn new(config: ContextConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ActorError::configuration(format!("{e:#}")))?;

        let ctxid = CtxId::from_name(&config.ctxid);
        let thread_num = config.effective_thread_num();
        let strand_count = config.strand_count();

        let mut strands = Vec::with_capacity(strand_count);
        let mut per_thread: Vec<Vec<(u32, mpsc::UnboundedReceiver<Command>)>> =
            (0..thread_num).map(|_| Vec::new()).collect();
        for index in 0..strand_count as u32 {
            let (handle, rx) = StrandHandle::channel(index);
            strands.push(handle);
            per_thread[index as usize % thread_num].push((index, rx));
        }

        let shared = Arc::new(Shared {
            ctxid,
            service_strands: config.service_strand_count(),
            config,
            metrics: ContextMetrics::default(),
            strands,
            next_service: AtomicUsize::new(0),
            next_utility: AtomicUsize::new(0),
            relay: RwLock::new(None),
            stopping: AtomicBool::new(false),
        });

        let context = Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(thread_num)),
        };

        for (worker, strands) in per_thread.into_iter().enumerate() {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| ActorError::runtime_with_source("failed to build worker runtime", e))?;
            let shared = context.shared.clone();
            let handle = std::thread::Builder::new()
                .name(format!("strand-worker-{worker}"))
                .spawn(move || run_worker(shared, runtime, strands))
                .map_err(|e| ActorError::runtime_with_source("failed to spawn worker thread", e))?;
            context.workers.lock().push(handle);
        }

        info!(
            ctxid = %ctxid,
            threads = thread_num,
            strands = strand_count,
            "Context started"
        );
        Ok(context)
    }

    pub fn ctxid(&self) -> CtxId {
        self.shared.ctxid
    }

    pub fn config(&self) -> &ContextConfig {
        &self.shared.config
    }

    /// Install the transport that carries envelopes to other contexts.
    pub fn set_relay(&self, relay: Arc<dyn Relay>) {
        *self.shared.relay.write() = Some(relay);
    }

    pub fn clear_relay(&self) {
        *self.shared.relay.write() = None;
    }

    /// Inbound handle for a relay; does not keep the context alive.
    pub fn wire_sink(&self) -> WireSink {
        WireSink::new(self.shared.ctxid, &self.shared)
    }

    /// Inject a frame received from another context.
    pub fn deliver_wire(&self, frame: Bytes) -> Result<()> {
        self.shared.deliver_wire(frame)
    }

    /// Start an actor with no sire on the next actor strand.
    pub async fn spawn<F, Fut>(&self, f: F) -> Result<Aid>
    where
        F: FnOnce(Actor) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        let make = boxed_spawn(f);
        let (tx, rx) = oneshot::channel();
        self.shared.post(
            self.shared.next_strand(),
            Box::new(move |local| {
                let _ = tx.send(local.spawn_actor(make, None));
            }),
        )?;
        rx.await.map_err(|_| ActorError::context_stopped("spawn"))?
    }

    /// Attach an event-driven actor on the next actor strand. `make` runs there
    /// and must build a variant reporting the identity it is given.
    pub async fn attach_variant<F, V>(&self, make: F) -> Result<Aid>
    where
        F: FnOnce(Aid) -> V + Send + 'static,
        V: ActorVariant,
    {
        let make: VariantFn = Box::new(move |aid| -> Box<dyn ActorVariant> { Box::new(make(aid)) });
        let (tx, rx) = oneshot::channel();
        self.shared.post(
            self.shared.next_strand(),
            Box::new(move |local| {
                let _ = tx.send(local.attach_variant(make));
            }),
        )?;
        rx.await
            .map_err(|_| ActorError::context_stopped("attach_variant"))?
    }

    /// Actor handle for code that is not itself an actor.
    pub async fn threaded_actor(&self) -> Result<ThreadedActor> {
        let strand = self.shared.next_utility_strand();
        let (tx, rx) = oneshot::channel();
        self.shared.post(
            strand,
            Box::new(move |local| {
                let _ = tx.send(local.attach_threaded());
            }),
        )?;
        let aid = rx
            .await
            .map_err(|_| ActorError::context_stopped("threaded_actor"))??;
        Ok(ThreadedActor::new(self.shared.clone(), aid))
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn is_stopping(&self) -> bool {
        self.shared.is_stopping()
    }

    /// Stop every strand and join the workers. Idempotent.
    ///
    /// Called from a worker thread it only signals the stop; the owner joins.
    pub fn shutdown(&self) {
        if !self.shared.stopping.swap(true, Ordering::AcqRel) {
            info!(ctxid = %self.shared.ctxid, "Context stopping");
            for strand in &self.shared.strands {
                strand.stop();
            }
        }

        if ON_WORKER.with(Cell::get) {
            warn!(ctxid = %self.shared.ctxid, "Shutdown called on a worker thread; not joining");
            return;
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return;
        }
        for worker in workers {
            if worker.join().is_err() {
                error!(ctxid = %self.shared.ctxid, "Worker thread panicked");
            }
        }
        let metrics = self.shared.metrics.snapshot();
        info!(
            ctxid = %self.shared.ctxid,
            spawned = metrics.actors_spawned,
            exited = metrics.actors_exited,
            "Context stopped"
        );
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("ctxid", &self.shared.ctxid)
            .field("strands", &self.shared.strands.len())
            .field("stopping", &self.shared.is_stopping())
            .finish()
    }
}

fn run_worker(
    shared: Arc<Shared>,
    runtime: tokio::runtime::Runtime,
    strands: Vec<(u32, mpsc::UnboundedReceiver<Command>)>,
) {
    ON_WORKER.with(|w| w.set(true));
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, async move {
        let loops: Vec<_> = strands
            .into_iter()
            .map(|(index, rx)| {
                let strand = Rc::new(StrandLocal::new(index, shared.clone()));
                (index, tokio::task::spawn_local(strand.run(rx)))
            })
            .collect();
        drop(shared);
        for (index, handle) in loops {
            if let Err(e) = handle.await {
                error!(strand = index, error = %e, "Strand loop aborted");
            }
        }
    });
    debug!("Worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threads: usize) -> ContextConfig {
        ContextConfig {
            ctxid: "unit".to_string(),
            thread_num: threads,
            per_thread_service_num: 2,
            nonblocked_num: 1,
            ..ContextConfig::default()
        }
    }

    #[test]
    fn test_strand_layout_and_round_robin() {
        let ctx = Context::new(config(2)).unwrap();
        assert_eq!(ctx.shared.strands.len(), 5);
        assert_eq!(ctx.shared.service_strands, 4);

        let picks: Vec<u32> = (0..5).map(|_| ctx.shared.next_strand()).collect();
        assert_eq!(picks, vec![0, 1, 2, 3, 0]);
        assert_eq!(ctx.shared.next_utility_strand(), 4);
        assert_eq!(ctx.shared.next_utility_strand(), 4);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut bad = config(1);
        bad.max_tick_handle_size = 0;
        assert!(matches!(Context::new(bad), Err(ActorError::Configuration { .. })));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let ctx = Context::new(config(1)).unwrap();
        ctx.shutdown();
        ctx.shutdown();
        assert!(ctx.is_stopping());
        assert!(ctx.workers.lock().is_empty());
    }
}
