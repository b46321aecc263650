//! # Mailbox
//!
//! Per-actor inbox with selective retrieval. Envelopes live in a [`Pool`] of nodes
//! threaded into one FIFO list; every queued node also sits in exactly one per-type
//! queue, so "oldest envelope of type T" is a queue front instead of a scan.
//!
//! ```text
//! FIFO:    n1 ── n2 ── n3 ── n4 ── n5
//! type 3:  [n1, n4]            (direct-indexed, type < cache_match_size)
//! "exit":  [n2]                (ordered map for everything else)
//! "ping":  [n3, n5]
//! ```
//!
//! Side tables, none of which hold envelopes that are not also reachable above
//! (responses excepted, which are never queued):
//!
//! - `exits`: sender → its latest exit node; a newer exit from the same sender
//!   removes the older node entirely
//! - `svc_exits`: the same for exits of actors registered as a service
//! - `responses`: sid → buffered response, answered out of order
//! - `wait_reply`: requester → requests still owed a reply, oldest first; cleared
//!   when the requester's exit arrives
//! - `abandoned`: sids whose `respond` timed out; a late response is dropped
//!
//! All operations run inside the owning actor's strand; nothing here locks.

use crate::pattern::Pattern;
use crate::pool::{Handle, Pool};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use strand_types::{Aid, Exit, MatchType, Message, Recver, Request, Response, ServiceId, Sid, Tag};
use tracing::trace;

#[derive(Debug)]
struct Node {
    tag: Tag,
    msg: Message,
    prev: Option<Handle>,
    next: Option<Handle>,
    /// Service this exit is also cached under.
    exit_svc: Option<ServiceId>,
}

#[derive(Debug)]
pub struct Mailbox {
    nodes: Pool<Node>,
    head: Option<Handle>,
    tail: Option<Handle>,
    cache: Vec<VecDeque<Handle>>,
    by_type: BTreeMap<MatchType, VecDeque<Handle>>,
    exits: HashMap<Aid, Handle>,
    svc_exits: HashMap<ServiceId, (Aid, Handle)>,
    responses: HashMap<Sid, (Response, Message)>,
    wait_reply: HashMap<Aid, VecDeque<Request>>,
    abandoned: HashSet<Sid>,
}

impl Mailbox {
    pub fn new(cache_match_size: usize, node_reserve: usize) -> Self {
        Self {
            nodes: Pool::new(node_reserve, None),
            head: None,
            tail: None,
            cache: (0..cache_match_size).map(|_| VecDeque::new()).collect(),
            by_type: BTreeMap::new(),
            exits: HashMap::new(),
            svc_exits: HashMap::new(),
            responses: HashMap::new(),
            wait_reply: HashMap::new(),
            abandoned: HashSet::new(),
        }
    }

    /// Store an incoming envelope.
    ///
    /// Responses go to the sid table, requests are also remembered as owed a reply,
    /// exits supersede any earlier exit from the same sender. Link envelopes belong
    /// to the link table and are never queued.
    pub fn push(&mut self, tag: Tag, msg: Message) {
        match tag {
            Tag::Direct(_) => self.enqueue(tag, msg, None),
            Tag::Exit(exit) => {
                self.wait_reply.remove(&exit.from);
                self.enqueue(tag, msg, None);
            }
            Tag::Request(req) => {
                self.enqueue(tag, msg, None);
                self.wait_reply.entry(req.from).or_default().push_back(req);
            }
            Tag::Response(res) => {
                if self.abandoned.remove(&res.sid) {
                    trace!(sid = res.sid, from = %res.from, "Late response dropped");
                    return;
                }
                self.responses.insert(res.sid, (res, msg));
            }
            Tag::Link(link) => {
                trace!(peer = %link.peer, "Link envelope reached mailbox; ignored");
            }
        }
    }

    /// Store an exit that is also cached under `svc`.
    pub fn push_service_exit(&mut self, svc: ServiceId, exit: Exit, msg: Message) {
        self.wait_reply.remove(&exit.from);
        self.enqueue(Tag::Exit(exit), msg, Some(svc));
    }

    /// Oldest envelope accepted by `pattern`, falling back to a cached exit from
    /// `pattern.recver`. The fallback copy stays cached.
    pub fn pop(&mut self, pattern: &Pattern) -> Option<(Tag, Message)> {
        if pattern.match_list.is_empty() {
            let head = self.head?;
            return self.take(head);
        }

        for &ty in &pattern.match_list {
            if let Some(&front) = self.queue(ty).and_then(VecDeque::front) {
                return self.take(front);
            }
        }

        match pattern.recver? {
            Recver::Aid(aid) => {
                let node = self.nodes.get(*self.exits.get(&aid)?)?;
                Some((node.tag, node.msg.clone()))
            }
            Recver::Service(svc) => {
                let (_, handle) = self.svc_exits.get(&svc)?;
                let node = self.nodes.get(*handle)?;
                Some((node.tag, node.msg.clone()))
            }
        }
    }

    /// Response for `sid`, or the cached exit of whoever the request went to.
    pub fn pop_response(
        &mut self,
        sid: Sid,
        recver: Option<Recver>,
    ) -> Option<(Response, Message)> {
        if let Some(found) = self.responses.remove(&sid) {
            return Some(found);
        }

        let (from, handle) = match recver? {
            Recver::Aid(aid) => (aid, *self.exits.get(&aid)?),
            Recver::Service(svc) => *self.svc_exits.get(&svc)?,
        };
        let node = self.nodes.get(handle)?;
        Some((Response { sid, from }, node.msg.clone()))
    }

    /// Stop waiting for `sid`: drop a buffered response and any that arrives later.
    pub fn abandon_response(&mut self, sid: Sid) {
        if self.responses.remove(&sid).is_none() {
            self.abandoned.insert(sid);
        }
    }

    /// Oldest request from `from` still owed a reply.
    pub fn pop_request(&mut self, from: Aid) -> Option<Request> {
        let queue = self.wait_reply.get_mut(&from)?;
        let req = queue.pop_front();
        if queue.is_empty() {
            self.wait_reply.remove(&from);
        }
        req
    }

    /// Forget one specific owed request; used when it is relayed onward.
    pub fn take_request(&mut self, req: Request) -> bool {
        let Some(queue) = self.wait_reply.get_mut(&req.from) else {
            return false;
        };
        let Some(at) = queue.iter().position(|r| r.sid == req.sid) else {
            return false;
        };
        queue.remove(at);
        if queue.is_empty() {
            self.wait_reply.remove(&req.from);
        }
        true
    }

    pub fn has_exit(&self, from: Aid) -> bool {
        self.exits.contains_key(&from)
    }

    /// Drop the cached exit of `from` together with its queued envelope.
    pub fn discard_exit(&mut self, from: Aid) -> bool {
        match self.exits.get(&from).copied() {
            Some(handle) => self.take(handle).is_some(),
            None => false,
        }
    }

    /// Queued envelopes; buffered responses are not counted.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn pending_responses(&self) -> usize {
        self.responses.len()
    }

    fn queue(&self, ty: MatchType) -> Option<&VecDeque<Handle>> {
        match ty.cache_index(self.cache.len()) {
            Some(index) => self.cache.get(index),
            None => self.by_type.get(&ty),
        }
    }

    fn queue_mut(&mut self, ty: MatchType) -> &mut VecDeque<Handle> {
        match ty.cache_index(self.cache.len()) {
            Some(index) => &mut self.cache[index],
            None => self.by_type.entry(ty).or_default(),
        }
    }

    fn enqueue(&mut self, tag: Tag, msg: Message, exit_svc: Option<ServiceId>) {
        let ty = msg.ty();
        let node = Node {
            tag,
            msg,
            prev: self.tail,
            next: None,
            exit_svc,
        };
        // Unbounded pool; insertion cannot be refused.
        let Ok(handle) = self.nodes.insert(node) else {
            return;
        };
        match self.tail {
            Some(tail) => {
                if let Some(prev) = self.nodes.get_mut(tail) {
                    prev.next = Some(handle);
                }
            }
            None => self.head = Some(handle),
        }
        self.tail = Some(handle);
        self.queue_mut(ty).push_back(handle);

        if let Tag::Exit(exit) = tag {
            if !exit.from.is_nil() {
                if let Some(older) = self.exits.insert(exit.from, handle) {
                    self.take(older);
                    self.exits.insert(exit.from, handle);
                }
            }
            if let Some(svc) = exit_svc {
                if let Some((_, older)) = self.svc_exits.insert(svc, (exit.from, handle)) {
                    self.take(older);
                    self.svc_exits.insert(svc, (exit.from, handle));
                }
            }
        }
    }

    /// Unlink `handle` from the FIFO, its type queue and the exit caches.
    fn take(&mut self, handle: Handle) -> Option<(Tag, Message)> {
        let node = self.nodes.remove(handle)?;

        match node.prev {
            Some(prev) => {
                if let Some(p) = self.nodes.get_mut(prev) {
                    p.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => {
                if let Some(n) = self.nodes.get_mut(next) {
                    n.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }

        let ty = node.msg.ty();
        let queue = self.queue_mut(ty);
        if let Some(at) = queue.iter().position(|&h| h == handle) {
            queue.remove(at);
        }
        if queue.is_empty() && ty.cache_index(self.cache.len()).is_none() {
            self.by_type.remove(&ty);
        }

        if let Tag::Exit(exit) = node.tag {
            if self.exits.get(&exit.from) == Some(&handle) {
                self.exits.remove(&exit.from);
            }
        }
        if let Some(svc) = node.exit_svc {
            if self.svc_exits.get(&svc).map(|(_, h)| *h) == Some(handle) {
                self.svc_exits.remove(&svc);
            }
        }

        Some((node.tag, node.msg))
    }
}
