//! Context-wide counters

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ContextMetrics {
    pub actors_spawned: AtomicU64,
    pub actors_exited: AtomicU64,
    /// Actors that ended with an `exception` exit, panics included
    pub actor_faults: AtomicU64,
    /// Closures posted onto any strand
    pub envelopes_posted: AtomicU64,
    /// `already` / `neterr` exits synthesized for undeliverable envelopes
    pub bounces: AtomicU64,
    /// Envelopes dropped with nobody to notify
    pub envelopes_dropped: AtomicU64,
    pub frames_relayed: AtomicU64,
    pub frames_delivered: AtomicU64,
}

impl ContextMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Actors currently alive
    pub fn live_actors(&self) -> u64 {
        let spawned = self.actors_spawned.load(Ordering::Relaxed);
        spawned.saturating_sub(self.actors_exited.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            actors_spawned: self.actors_spawned.load(Ordering::Relaxed),
            actors_exited: self.actors_exited.load(Ordering::Relaxed),
            actor_faults: self.actor_faults.load(Ordering::Relaxed),
            envelopes_posted: self.envelopes_posted.load(Ordering::Relaxed),
            bounces: self.bounces.load(Ordering::Relaxed),
            envelopes_dropped: self.envelopes_dropped.load(Ordering::Relaxed),
            frames_relayed: self.frames_relayed.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ContextMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub actors_spawned: u64,
    pub actors_exited: u64,
    pub actor_faults: u64,
    pub envelopes_posted: u64,
    pub bounces: u64,
    pub envelopes_dropped: u64,
    pub frames_relayed: u64,
    pub frames_delivered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_live_count() {
        let metrics = ContextMetrics::default();
        ContextMetrics::incr(&metrics.actors_spawned);
        ContextMetrics::incr(&metrics.actors_spawned);
        ContextMetrics::incr(&metrics.actors_exited);

        let snap = metrics.snapshot();
        assert_eq!(snap.actors_spawned, 2);
        assert_eq!(snap.actors_exited, 1);
        assert_eq!(metrics.live_actors(), 1);
    }
}
