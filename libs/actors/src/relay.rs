//! Cross-context relay hook
//!
//! A context never opens sockets. Envelopes addressed to another [`CtxId`] are
//! encoded into one wire frame and handed to the installed [`Relay`]; frames coming
//! back in are injected through [`WireSink::deliver`].

use crate::context::Shared;
use crate::error::{ActorError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use strand_types::CtxId;
use tracing::trace;

/// Transport collaborator that carries frames to foreign contexts.
///
/// A failed `forward` is answered locally with an `exit(neterr)` to whoever is
/// owed a notification.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn forward(&self, ctxid: CtxId, frame: Bytes) -> Result<()>;
}

/// Inbound side of a context, detached from its lifetime.
#[derive(Clone)]
pub struct WireSink {
    ctxid: CtxId,
    shared: Weak<Shared>,
}

impl WireSink {
    pub(crate) fn new(ctxid: CtxId, shared: &Arc<Shared>) -> Self {
        Self {
            ctxid,
            shared: Arc::downgrade(shared),
        }
    }

    pub fn ctxid(&self) -> CtxId {
        self.ctxid
    }

    /// Decode `frame` and route it as if it had been sent locally.
    pub fn deliver(&self, frame: Bytes) -> Result<()> {
        let shared = self
            .shared
            .upgrade()
            .ok_or_else(|| ActorError::context_stopped("deliver_wire"))?;
        shared.deliver_wire(frame)
    }
}

impl std::fmt::Debug for WireSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireSink").field("ctxid", &self.ctxid).finish()
    }
}

/// In-process relay joining contexts that live in the same binary.
#[derive(Debug, Default)]
pub struct LocalRelay {
    peers: RwLock<HashMap<CtxId, WireSink>>,
}

impl LocalRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, sink: WireSink) {
        self.peers.write().insert(sink.ctxid(), sink);
    }

    pub fn detach(&self, ctxid: CtxId) -> bool {
        self.peers.write().remove(&ctxid).is_some()
    }
}

#[async_trait]
impl Relay for LocalRelay {
    async fn forward(&self, ctxid: CtxId, frame: Bytes) -> Result<()> {
        let sink = self
            .peers
            .read()
            .get(&ctxid)
            .cloned()
            .ok_or_else(|| ActorError::relay(format!("no route to context {ctxid}")))?;
        trace!(ctxid = %ctxid, bytes = frame.len(), "Relaying frame in process");
        sink.deliver(frame)
    }
}
