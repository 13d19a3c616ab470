use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::types::{ItemId, TransId};

/// Lock strength. Derived ordering makes `Exclusive` the stronger mode, which
/// upgrades rely on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// A lock request: which transaction wants which strength on an item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockRequest {
    pub trans: TransId,
    pub mode: LockMode,
}

impl LockRequest {
    pub fn shared(trans: TransId) -> Self {
        LockRequest { trans, mode: LockMode::Shared }
    }

    pub fn exclusive(trans: TransId) -> Self {
        LockRequest { trans, mode: LockMode::Exclusive }
    }

    /// Whether two requests may both proceed. A transaction never conflicts
    /// with itself; distinct transactions only share when both ask for
    /// `Shared`.
    fn compatible(&self, other: &LockRequest) -> bool {
        self.trans == other.trans
            || (self.mode == LockMode::Shared && other.mode == LockMode::Shared)
    }
}

/// The lock state of one item: the granted mode, its holders and the FIFO
/// queue of waiting requests.
///
/// Invariants: the mode is `None` exactly when the holder set is empty, an
/// `Exclusive` mode has exactly one holder, and the queue carries at most one
/// entry per (transaction, mode).
#[derive(Clone, Debug, Default)]
struct LockState {
    mode: Option<LockMode>,
    holders: BTreeSet<TransId>,
    queue: VecDeque<LockRequest>,
}

impl LockState {
    /// Whether the request could be granted against the current holders: the
    /// item is free, shared holders admit another reader, or the requester
    /// upgrades as the sole holder.
    fn admits(&self, req: LockRequest) -> bool {
        match self.mode {
            None => true,
            Some(LockMode::Shared) => {
                req.mode == LockMode::Shared
                    || (self.holders.len() == 1 && self.holders.contains(&req.trans))
            }
            Some(LockMode::Exclusive) => self.holders.contains(&req.trans),
        }
    }

    /// Grants the request: the requester joins the holders and the mode rises
    /// to the stronger of current and requested.
    fn admit(&mut self, req: LockRequest) {
        self.holders.insert(req.trans);
        self.mode = Some(self.mode.map_or(req.mode, |mode| mode.max(req.mode)));
    }
}

/// The lock table of one site. Items are scanned in ascending id order, so
/// queue resolution is reproducible run over run.
#[derive(Debug, Default)]
pub struct LockTable {
    items: BTreeMap<ItemId, LockState>,
}

impl LockTable {
    /// Whether the requester already holds a lock at least as strong as it
    /// asks for: a shared hold satisfies a shared request, an exclusive hold
    /// satisfies both.
    pub fn already_holds(&self, item: ItemId, req: LockRequest) -> bool {
        let Some(state) = self.items.get(&item) else { return false };
        state.holders.contains(&req.trans)
            && (req.mode == LockMode::Shared || state.mode == Some(LockMode::Exclusive))
    }

    /// Whether the transaction holds any lock on the item.
    pub fn holds(&self, item: ItemId, trans: TransId) -> bool {
        self.items.get(&item).map_or(false, |state| state.holders.contains(&trans))
    }

    /// Whether the request is grantable against the current holders alone.
    pub fn compatible_with_holders(&self, item: ItemId, req: LockRequest) -> bool {
        self.items.get(&item).map_or(true, |state| state.admits(req))
    }

    /// Whether the request is compatible with every request already queued on
    /// the item. A fresh reader never overtakes a queued writer this way.
    pub fn compatible_with_queue(&self, item: ItemId, req: LockRequest) -> bool {
        self.items
            .get(&item)
            .map_or(true, |state| state.queue.iter().all(|queued| req.compatible(queued)))
    }

    /// Grants the request immediately. Callers check compatibility first.
    pub fn grant(&mut self, item: ItemId, req: LockRequest) {
        self.items.entry(item).or_default().admit(req);
    }

    /// Appends the request to the item's wait queue, unless an identical
    /// (transaction, mode) entry is already queued.
    pub fn enqueue(&mut self, item: ItemId, req: LockRequest) {
        let state = self.items.entry(item).or_default();
        if !state.queue.contains(&req) {
            state.queue.push_back(req);
        }
    }

    /// Releases every lock and queued request of a transaction, freeing the
    /// mode where the holder set drains. Returns how many queued requests
    /// were dropped; a commit treats a nonzero count as an invariant break.
    pub fn release_all(&mut self, trans: TransId) -> usize {
        let mut dropped = 0;
        for state in self.items.values_mut() {
            if state.holders.remove(&trans) && state.holders.is_empty() {
                state.mode = None;
            }
            let before = state.queue.len();
            state.queue.retain(|req| req.trans != trans);
            dropped += before - state.queue.len();
        }
        dropped
    }

    /// Repeatedly scans the items in ascending id order, popping and granting
    /// queue heads that pass the holder check, until a full scan grants
    /// nothing. Returns the grants made, in grant order.
    pub fn try_resolve(&mut self) -> Vec<(ItemId, LockRequest)> {
        let mut granted = Vec::new();
        let ids: Vec<ItemId> = self.items.keys().copied().collect();
        let mut progress = true;
        while progress {
            progress = false;
            for &item in &ids {
                loop {
                    let Some(state) = self.items.get_mut(&item) else { break };
                    let Some(&head) = state.queue.front() else { break };
                    if !state.admits(head) {
                        break;
                    }
                    state.queue.pop_front();
                    state.admit(head);
                    granted.push((item, head));
                    progress = true;
                }
            }
        }
        granted
    }

    /// This table's edges of the waits-for graph. An edge A -> B means A
    /// waits on B: a blocked queue entry waits on every current holder, and a
    /// queued entry waits on every conflicting entry queued before it.
    pub fn waits_for(&self) -> BTreeMap<TransId, BTreeSet<TransId>> {
        let mut graph: BTreeMap<TransId, BTreeSet<TransId>> = BTreeMap::new();
        for state in self.items.values() {
            if state.mode.is_none() || state.queue.is_empty() {
                continue;
            }
            for req in &state.queue {
                if !state.admits(*req) {
                    for &holder in &state.holders {
                        if holder != req.trans {
                            graph.entry(req.trans).or_default().insert(holder);
                        }
                    }
                }
            }
            for (pos, later) in state.queue.iter().enumerate() {
                for earlier in state.queue.iter().take(pos) {
                    if !later.compatible(earlier) {
                        graph.entry(later.trans).or_default().insert(earlier.trans);
                    }
                }
            }
        }
        graph
    }
}
