//! # Strand Actors
//!
//! Actor runtime where every actor is pinned to a strand: a single-threaded
//! serialization domain that owns the actor's mailbox, link table and state.
//! Actor code never takes a lock; the only cross-thread traffic is jobs posted
//! onto strand queues.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────── Context ────────────────────────────┐
//! │  worker 0                          worker 1                     │
//! │  ┌─────────── strand 0 ────────┐   ┌─────────── strand 1 ──────┐ │
//! │  │ job queue ─▶ deliver()      │   │ job queue ─▶ deliver()    │ │
//! │  │   actor A: mailbox, links   │   │   actor C                 │ │
//! │  │   actor B                   │   │                           │ │
//! │  └─────────────────────────────┘   └───────────────────────────┘ │
//! │         ▲ post(job)                         │ route()            │
//! │         └───────────────────────────────────┘                    │
//! │  foreign CtxId ─▶ encode ─▶ Relay ─▶ peer context                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Addressing failures come back as messages: sending to an actor that has
//! exited produces an `exit(already)` envelope for the sender, a request produces
//! a response carrying that exit. Supervisors learn about failures only through
//! exit envelopes.
//!
//! ## Example
//!
//! ```rust,no_run
//! use strand_actors::{atom, Context, ContextConfig, Message, SpawnOpts};
//!
//! # async fn demo() -> strand_actors::Result<()> {
//! let ctx = Context::new(ContextConfig::default())?;
//! let echo = ctx
//!     .spawn(|mut actor| async move {
//!         let (from, msg) = actor.recv().await;
//!         actor.reply(from, msg);
//!         Ok(())
//!     })
//!     .await?;
//!
//! let mut client = ctx.threaded_actor().await?;
//! let handle = client.request(echo, Message::new(atom("ping"))).await?;
//! let (from, reply) = client.respond(handle).await?;
//! assert_eq!((from, reply.ty()), (echo, atom("ping")));
//! # let _ = SpawnOpts::linked();
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod context;
pub mod error;
pub mod mailbox;
pub mod metrics;
pub mod pattern;
pub mod pool;
pub mod relay;
pub mod supervision;
pub mod threaded;
pub mod variant;

mod strand;

pub use actor::{Actor, ResponseHandle, SpawnOpts};
pub use context::Context;
pub use error::{ActorError, Result};
pub use mailbox::Mailbox;
pub use metrics::{ContextMetrics, MetricsSnapshot};
pub use pattern::Pattern;
pub use pool::{Handle, Pool};
pub use relay::{LocalRelay, Relay, WireSink};
pub use supervision::LinkTable;
pub use threaded::ThreadedActor;
pub use variant::{ActorVariant, Topic, VariantCtx};

pub use strand_config::ContextConfig;
pub use strand_types::{
    atom, atom_name, Aid, CtxId, Exit, ExitCode, LinkKind, MatchType, Message, Recver, ServiceId,
    Sid, Tag, EXIT, NEW_ACTOR,
};
