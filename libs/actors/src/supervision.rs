//! Link table
//!
//! Who must hear about this actor's exit. `Linked` entries exist on both sides of a
//! link; a `Monitored` entry lives only on the monitored actor and names the watcher.

use std::collections::HashMap;
use strand_types::{Aid, LinkKind};

#[derive(Debug, Default)]
pub struct LinkTable {
    peers: HashMap<Aid, LinkKind>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `peer`; a link upgrades an existing monitor, never the reverse.
    pub fn add(&mut self, peer: Aid, kind: LinkKind) {
        match kind {
            LinkKind::Linked => {
                self.peers.insert(peer, LinkKind::Linked);
            }
            LinkKind::Monitored => {
                self.peers.entry(peer).or_insert(LinkKind::Monitored);
            }
            LinkKind::Unlink => {
                self.peers.remove(&peer);
            }
        }
    }

    pub fn remove(&mut self, peer: Aid) -> Option<LinkKind> {
        self.peers.remove(&peer)
    }

    pub fn get(&self, peer: Aid) -> Option<LinkKind> {
        self.peers.get(&peer).copied()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Empty the table, yielding every peer once.
    pub fn drain(&mut self) -> impl Iterator<Item = (Aid, LinkKind)> + '_ {
        self.peers.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_types::CtxId;

    #[test]
    fn test_link_upgrades_monitor() {
        let peer = Aid::new(CtxId::from_name("t"), 0, 1, 1);
        let mut table = LinkTable::new();
        table.add(peer, LinkKind::Monitored);
        table.add(peer, LinkKind::Linked);
        table.add(peer, LinkKind::Monitored);
        assert_eq!(table.get(peer), Some(LinkKind::Linked));
        assert_eq!(table.len(), 1);

        table.add(peer, LinkKind::Unlink);
        assert!(table.is_empty());
    }

    #[test]
    fn test_drain_visits_each_peer_once() {
        let mut table = LinkTable::new();
        for slot in 0..3 {
            table.add(Aid::new(CtxId::from_name("t"), 0, slot, 1), LinkKind::Linked);
        }
        assert_eq!(table.drain().count(), 3);
        assert!(table.is_empty());
    }
}
