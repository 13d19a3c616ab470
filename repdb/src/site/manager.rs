use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::debug;

use crate::error::{CResult, Error};
use crate::locks::{LockMode, LockRequest, LockTable};
use crate::storage::VersionedStore;
use crate::types::{is_replicated, ItemId, Op, OpKind, SiteId, Timestamp, TransId, Value};

/// The data manager of one site.
///
/// The versioned disk survives a failure; everything else here is volatile.
/// Recovery reloads working copies from the committed heads and gates every
/// replicated item behind the next committed write, so a stale replica is
/// never read. Read-only transactions go straight to the disk and leave no
/// trace in the volatile state.
pub struct DataManager {
    site_id: SiteId,
    is_up: bool,
    /// Tick of the most recent recovery, -1 if the site never went down.
    last_up_time: Timestamp,
    disk: VersionedStore,
    /// Working copies of every hosted item, mutated by uncommitted writes.
    memory: BTreeMap<ItemId, Value>,
    readable: BTreeMap<ItemId, bool>,
    locks: LockTable,
    /// Items each active transaction has written on this site, for rollback
    /// and for publishing at commit.
    modified: HashMap<TransId, BTreeSet<ItemId>>,
}

impl DataManager {
    /// A fresh site, up, with every hosted item at its seed value.
    pub fn new(site_id: SiteId) -> Self {
        let disk = VersionedStore::new(site_id);
        let mut memory = BTreeMap::new();
        let mut readable = BTreeMap::new();
        for item in disk.item_ids() {
            if let Some(head) = disk.current(item) {
                memory.insert(item, head.value);
            }
            readable.insert(item, true);
        }
        DataManager {
            site_id,
            is_up: true,
            last_up_time: -1,
            disk,
            memory,
            readable,
            locks: LockTable::default(),
            modified: HashMap::new(),
        }
    }

    pub fn site_id(&self) -> SiteId {
        self.site_id
    }

    pub fn is_up(&self) -> bool {
        self.is_up
    }

    /// Tries to take a shared lock for the transaction. Refused outright
    /// while the item is not readable here; a blocked request joins the
    /// item's wait queue and the caller should try another replica.
    pub fn get_read_lock(&mut self, trans: TransId, item: ItemId) -> bool {
        if !self.readable.get(&item).copied().unwrap_or(false) {
            return false;
        }
        self.acquire(trans, item, LockMode::Shared)
    }

    /// Tries to take the exclusive lock, queueing the request when blocked.
    pub fn get_write_lock(&mut self, trans: TransId, item: ItemId) -> bool {
        self.acquire(trans, item, LockMode::Exclusive)
    }

    fn acquire(&mut self, trans: TransId, item: ItemId, mode: LockMode) -> bool {
        let req = LockRequest { trans, mode };
        if self.locks.already_holds(item, req)
            || (self.locks.compatible_with_holders(item, req)
                && self.locks.compatible_with_queue(item, req))
        {
            self.locks.grant(item, req);
            true
        } else {
            self.locks.enqueue(item, req);
            debug!("site {}: T{} waits for {:?} on x{}", self.site_id, trans, mode, item);
            false
        }
    }

    /// Serves a locked read from the working copy. The caller must have been
    /// granted a lock on the item first.
    pub fn read(&self, op: &Op) -> CResult<Value> {
        let item = op.item();
        if !self.locks.holds(item, op.trans) {
            return Err(Error::internal(format!(
                "site {}: T{} reads x{} without a lock",
                self.site_id, op.trans, item
            )));
        }
        self.memory.get(&item).copied().ok_or_else(|| {
            Error::internal(format!("site {}: no working copy of x{}", self.site_id, item))
        })
    }

    /// Serves a snapshot read at `ts` for a read-only transaction. `None`
    /// means this site cannot serve it: the eligible version of a replicated
    /// item predates the site's last recovery, so a fresher replica must be
    /// asked instead.
    pub fn ronly(&self, op: &Op, ts: Timestamp) -> CResult<Option<Value>> {
        let item = op.item();
        let Some(version) = self.disk.snapshot_at(item, ts) else {
            return Err(Error::internal(format!(
                "site {}: x{} has no version at or before {}",
                self.site_id, item, ts
            )));
        };
        if is_replicated(item) && version.commit_time < self.last_up_time {
            return Ok(None);
        }
        Ok(Some(version.value))
    }

    /// Applies a write to the working copy and records the item for commit or
    /// rollback. The caller must hold the exclusive lock.
    pub fn write(&mut self, op: &Op) -> CResult<()> {
        let OpKind::Write { item, value } = op.kind else {
            return Err(Error::internal(format!(
                "site {}: op {} dispatched as a write",
                self.site_id, op.id
            )));
        };
        if !self.locks.already_holds(item, LockRequest::exclusive(op.trans)) {
            return Err(Error::internal(format!(
                "site {}: T{} writes x{} without the exclusive lock",
                self.site_id, op.trans, item
            )));
        }
        self.memory.insert(item, value);
        self.modified.entry(op.trans).or_default().insert(item);
        Ok(())
    }

    /// Publishes the transaction's writes at `commit_time`, reopens the
    /// written items for reading, releases its locks and lets the wait queues
    /// move. A site that never saw the transaction treats this as a no-op.
    pub fn commit(&mut self, trans: TransId, commit_time: Timestamp) -> CResult<()> {
        if !self.is_up {
            return Ok(());
        }
        let dropped = self.locks.release_all(trans);
        if dropped != 0 {
            return Err(Error::internal(format!(
                "site {}: T{} commits with {} queued lock requests",
                self.site_id, trans, dropped
            )));
        }
        if let Some(items) = self.modified.remove(&trans) {
            for item in items {
                let value = self.memory.get(&item).copied().ok_or_else(|| {
                    Error::internal(format!("site {}: no working copy of x{}", self.site_id, item))
                })?;
                self.disk.commit_write(item, value, commit_time)?;
                self.readable.insert(item, true);
                debug!("site {}: T{} commits x{} = {} at {}", self.site_id, trans, item, value, commit_time);
            }
        }
        self.locks.try_resolve();
        Ok(())
    }

    /// Rolls the transaction back: working copies return to the committed
    /// heads and its locks and queued requests disappear.
    pub fn abort(&mut self, trans: TransId) {
        if !self.is_up {
            return;
        }
        self.locks.release_all(trans);
        if let Some(items) = self.modified.remove(&trans) {
            for item in items {
                if let Some(head) = self.disk.current(item) {
                    self.memory.insert(item, head.value);
                }
            }
        }
        self.locks.try_resolve();
    }

    /// Takes the site down. Every volatile structure is wiped; the disk
    /// survives.
    pub fn fail(&mut self) {
        self.is_up = false;
        self.memory.clear();
        self.readable.clear();
        self.locks = LockTable::default();
        self.modified.clear();
    }

    /// Brings the site back up at `ts`. Working copies reload from the disk
    /// heads; replicated items stay unreadable until a committed write lands.
    pub fn recover(&mut self, ts: Timestamp) {
        self.is_up = true;
        self.last_up_time = ts;
        let items: Vec<ItemId> = self.disk.item_ids().collect();
        for item in items {
            if let Some(head) = self.disk.current(item) {
                self.memory.insert(item, head.value);
            }
            self.readable.insert(item, !is_replicated(item));
        }
    }

    /// This site's contribution to the global waits-for graph.
    pub fn waits_for(&self) -> BTreeMap<TransId, BTreeSet<TransId>> {
        self.locks.waits_for()
    }

    /// Committed values of every hosted item, in item order.
    pub fn committed_values(&self) -> Vec<(ItemId, Value)> {
        self.disk.committed()
    }

    /// The committed value of one item, if hosted.
    pub fn committed_value(&self, item: ItemId) -> Option<Value> {
        self.disk.current(item).map(|version| version.value)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn read_op(trans: TransId, item: ItemId) -> Op {
        Op { id: 0, trans, kind: OpKind::Read { item } }
    }

    fn snapshot_op(trans: TransId, item: ItemId) -> Op {
        Op { id: 0, trans, kind: OpKind::Snapshot { item } }
    }

    fn write_op(trans: TransId, item: ItemId, value: Value) -> Op {
        Op { id: 0, trans, kind: OpKind::Write { item, value } }
    }

    #[test]
    fn read_needs_a_granted_lock() -> CResult<()> {
        let mut dm = DataManager::new(1);
        assert!(dm.read(&read_op(1, 2)).is_err());

        assert!(dm.get_read_lock(1, 2));
        assert_eq!(dm.read(&read_op(1, 2))?, 20);
        Ok(())
    }

    #[test]
    fn write_updates_working_copy_not_disk() -> CResult<()> {
        let mut dm = DataManager::new(1);
        assert!(dm.get_write_lock(1, 2));
        dm.write(&write_op(1, 2, 99))?;

        // uncommitted: the working copy moved, the committed view did not
        assert_eq!(dm.read(&read_op(1, 2))?, 99);
        assert_eq!(dm.committed_value(2), Some(20));

        dm.commit(1, 5)?;
        assert_eq!(dm.committed_value(2), Some(99));
        Ok(())
    }

    #[test]
    fn write_without_exclusive_lock_is_fatal() {
        let mut dm = DataManager::new(1);
        assert!(dm.get_read_lock(1, 2));
        assert!(dm.write(&write_op(1, 2, 99)).is_err());
    }

    #[test]
    fn abort_restores_working_copies_and_locks() -> CResult<()> {
        let mut dm = DataManager::new(1);
        assert!(dm.get_write_lock(1, 2));
        dm.write(&write_op(1, 2, 99))?;
        dm.abort(1);

        // the next reader sees the committed head again
        assert!(dm.get_read_lock(2, 2));
        assert_eq!(dm.read(&read_op(2, 2))?, 20);
        Ok(())
    }

    #[test]
    fn commit_with_queued_requests_is_fatal() {
        let mut dm = DataManager::new(1);
        assert!(dm.get_write_lock(1, 2));
        assert!(!dm.get_write_lock(2, 2));
        assert!(dm.commit(2, 3).is_err());
    }

    #[test]
    fn fail_wipes_volatile_state() -> CResult<()> {
        let mut dm = DataManager::new(1);
        assert!(dm.get_write_lock(1, 2));
        dm.write(&write_op(1, 2, 99))?;
        dm.fail();

        assert!(!dm.is_up());
        // nothing is readable while down, and the disk kept its history
        assert!(!dm.get_read_lock(1, 2));
        assert_eq!(dm.committed_value(2), Some(20));
        Ok(())
    }

    #[test]
    fn recovery_gates_replicated_items() -> CResult<()> {
        // site 2 hosts the unreplicated x1 and x11 besides the even items
        let mut dm = DataManager::new(2);
        dm.fail();
        dm.recover(4);

        // x2 is replicated: unreadable until a commit lands here
        assert!(!dm.get_read_lock(1, 2));
        // x1 is unreplicated: readable right away
        assert!(dm.get_read_lock(1, 1));
        assert_eq!(dm.read(&read_op(1, 1))?, 10);

        // a committed write reopens the replicated item
        assert!(dm.get_write_lock(2, 2));
        dm.write(&write_op(2, 2, 42))?;
        dm.commit(2, 6)?;
        assert!(dm.get_read_lock(3, 2));
        assert_eq!(dm.read(&read_op(3, 2))?, 42);
        Ok(())
    }

    #[test]
    fn snapshot_read_honors_recovery_time() -> CResult<()> {
        let mut dm = DataManager::new(2);
        assert!(dm.get_write_lock(1, 2));
        dm.write(&write_op(1, 2, 21))?;
        dm.commit(1, 2)?;

        // a snapshot from before the failure is refused after recovery
        dm.fail();
        dm.recover(5);
        assert_eq!(dm.ronly(&snapshot_op(9, 2), 3)?, None);

        // once a write commits here, snapshots at or past it are served
        assert!(dm.get_write_lock(2, 2));
        dm.write(&write_op(2, 2, 22))?;
        dm.commit(2, 7)?;
        assert_eq!(dm.ronly(&snapshot_op(9, 2), 8)?, Some(22));

        // non-replicated items are always served while the site is up
        assert_eq!(dm.ronly(&snapshot_op(9, 1), 3)?, Some(10));
        Ok(())
    }

    #[test]
    fn commit_on_a_down_site_is_a_noop() -> CResult<()> {
        let mut dm = DataManager::new(1);
        assert!(dm.get_write_lock(1, 2));
        dm.write(&write_op(1, 2, 99))?;
        dm.fail();
        dm.commit(1, 3)?;
        assert_eq!(dm.committed_value(2), Some(20));
        Ok(())
    }

    #[test]
    fn queued_request_survives_winner_commit() -> CResult<()> {
        let mut dm = DataManager::new(1);
        assert!(dm.get_write_lock(1, 2));
        assert!(!dm.get_write_lock(2, 2));

        // T1's commit lets the queue move: T2 now holds the exclusive lock
        dm.write(&write_op(1, 2, 31))?;
        dm.commit(1, 3)?;
        dm.write(&write_op(2, 2, 32))?;
        dm.commit(2, 4)?;
        assert_eq!(dm.committed_value(2), Some(32));
        Ok(())
    }
}
