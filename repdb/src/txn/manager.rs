use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use log::{debug, info, warn};

use crate::error::{CResult, Error};
use crate::event::{Event, EventSink};
use crate::site::DataManager;
use crate::types::{
    hosting_sites, Command, ItemId, Op, OpId, OpKind, SiteId, Timestamp, TransId, Value,
    ITEM_COUNT, SITE_COUNT,
};

/// One entry of the transaction table.
#[derive(Clone, Debug)]
struct TransRecord {
    start_ts: Timestamp,
    is_ronly: bool,
    /// Set on abort. The record then lingers as a tombstone until `end`, so
    /// later operations of the transaction are recognized and discarded.
    will_abort: bool,
    /// Sites whose locks or working copies this transaction touched. A site
    /// failure aborts every read-write transaction that visited it.
    visited_sites: BTreeSet<SiteId>,
}

/// The transaction manager. Owns the logical clock, the transaction table,
/// the pending-operation queue and the per-site data managers, and routes
/// every operation to the replicas that can serve it.
///
/// All user-visible results leave through the injected event sink; the
/// manager itself never formats output.
pub struct TransactionManager<S: EventSink> {
    now: Timestamp,
    next_opid: OpId,
    /// Site status as routing sees it, index 0 unused. Mirrors the sites' own
    /// flags; kept separately so routing never has to ask a failed site.
    site_up: Vec<bool>,
    item_sites: BTreeMap<ItemId, Vec<SiteId>>,
    trans_table: HashMap<TransId, TransRecord>,
    /// Ops that could not be placed yet, in submission order.
    queued_ops: VecDeque<Op>,
    sites: Vec<DataManager>,
    sink: S,
}

impl<S: EventSink> TransactionManager<S> {
    /// Builds the ten sites and the placement map; everything starts up and
    /// the clock starts at tick 0.
    pub fn new(sink: S) -> Self {
        let sites = (1..=SITE_COUNT).map(DataManager::new).collect();
        let mut item_sites = BTreeMap::new();
        for item in 1..=ITEM_COUNT {
            item_sites.insert(item, hosting_sites(item));
        }
        TransactionManager {
            now: 0,
            next_opid: 0,
            site_up: vec![true; SITE_COUNT as usize + 1],
            item_sites,
            trans_table: HashMap::new(),
            queued_ops: VecDeque::new(),
            sites,
            sink,
        }
    }

    /// The current logical tick.
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Gives the sink back, consuming the manager.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Runs one logical tick: deadlock detection for the state the previous
    /// tick left behind, then this tick's commands, then one drain of the
    /// pending queue, then the clock advances.
    pub fn tick(&mut self, commands: &[Command]) -> CResult<()> {
        self.sink.emit(Event::Tick { now: self.now });
        while self.detect_deadlock() {
            self.try_execute_queue()?;
        }
        for command in commands {
            self.execute(command)?;
        }
        self.try_execute_queue()?;
        self.now += 1;
        Ok(())
    }

    /// One last detection pass once the input is exhausted, so deadlocks
    /// formed by the final line are still resolved and reported.
    pub fn finalize(&mut self) -> CResult<()> {
        self.sink.emit(Event::Tick { now: self.now });
        while self.detect_deadlock() {
            self.try_execute_queue()?;
        }
        Ok(())
    }

    /// Executes one parsed command.
    pub fn execute(&mut self, command: &Command) -> CResult<()> {
        debug!("tick {}: executing {:?}", self.now, command);
        match *command {
            Command::Begin { trans } => self.begin(trans, false),
            Command::BeginRo { trans } => self.begin(trans, true),
            Command::End { trans } => self.finish(trans),
            Command::Read { trans, item } => self.submit_read(trans, item),
            Command::Write { trans, item, value } => self.submit_write(trans, item, value),
            Command::Fail { site } => {
                self.fail(site);
                Ok(())
            }
            Command::Recover { site } => {
                self.recover(site);
                Ok(())
            }
            Command::DumpAll => {
                for site in 1..=SITE_COUNT {
                    self.dump_site(site);
                }
                Ok(())
            }
            Command::DumpSite { site } => {
                self.dump_site(site);
                Ok(())
            }
            Command::DumpItem { item } => {
                self.dump_item(item);
                Ok(())
            }
        }
    }

    fn begin(&mut self, trans: TransId, is_ronly: bool) -> CResult<()> {
        if self.trans_table.contains_key(&trans) {
            return Err(Error::invalid_command(format!("transaction T{} already exists", trans)));
        }
        info!("T{} begins at tick {}, read_only={}", trans, self.now, is_ronly);
        self.trans_table.insert(
            trans,
            TransRecord {
                start_ts: self.now,
                is_ronly,
                will_abort: false,
                visited_sites: BTreeSet::new(),
            },
        );
        Ok(())
    }

    fn submit_read(&mut self, trans: TransId, item: ItemId) -> CResult<()> {
        let is_ronly = match self.trans_table.get(&trans) {
            None => {
                return Err(Error::invalid_command(format!("read by unknown transaction T{}", trans)))
            }
            Some(record) if record.will_abort => {
                self.sink.emit(Event::OpIgnored { trans });
                return Ok(());
            }
            Some(record) => record.is_ronly,
        };
        let kind =
            if is_ronly { OpKind::Snapshot { item } } else { OpKind::Read { item } };
        let op = Op { id: self.next_opid, trans, kind };
        self.next_opid += 1;
        if !self.dispatch_op(&op)? {
            self.queued_ops.push_back(op);
        }
        Ok(())
    }

    fn submit_write(&mut self, trans: TransId, item: ItemId, value: Value) -> CResult<()> {
        match self.trans_table.get(&trans) {
            None => {
                return Err(Error::invalid_command(format!(
                    "write by unknown transaction T{}",
                    trans
                )))
            }
            Some(record) if record.will_abort => {
                self.sink.emit(Event::OpIgnored { trans });
                return Ok(());
            }
            Some(_) => {}
        }
        let op = Op { id: self.next_opid, trans, kind: OpKind::Write { item, value } };
        self.next_opid += 1;
        if !self.dispatch_op(&op)? {
            self.queued_ops.push_back(op);
        }
        Ok(())
    }

    fn fail(&mut self, site: SiteId) {
        if !self.site_up[site as usize] {
            self.sink.emit(Event::SiteNotUp { site });
            return;
        }
        warn!("site {} fails at tick {}", site, self.now);
        self.sites[site as usize - 1].fail();
        self.site_up[site as usize] = false;

        let mut victims: Vec<TransId> = self
            .trans_table
            .iter()
            .filter(|(_, record)| {
                !record.is_ronly && !record.will_abort && record.visited_sites.contains(&site)
            })
            .map(|(&trans, _)| trans)
            .collect();
        victims.sort_unstable();
        for trans in victims {
            self.sink.emit(Event::SiteFailureAbort { trans, site });
            self.abort(trans);
        }
    }

    fn recover(&mut self, site: SiteId) {
        info!("site {} recovers at tick {}", site, self.now);
        self.sites[site as usize - 1].recover(self.now);
        self.site_up[site as usize] = true;
    }

    fn dump_site(&mut self, site: SiteId) {
        let values = self.sites[site as usize - 1].committed_values();
        self.sink.emit(Event::DumpSite { site, values });
    }

    fn dump_item(&mut self, item: ItemId) {
        for site in self.hosting(item) {
            if let Some(value) = self.sites[site as usize - 1].committed_value(item) {
                self.sink.emit(Event::DumpSite { site, values: vec![(item, value)] });
            }
        }
    }

    /// Commits or reports the transaction at `end`. A tombstoned transaction
    /// reports its abort instead; either way the record is dropped.
    fn finish(&mut self, trans: TransId) -> CResult<()> {
        let Some(record) = self.trans_table.remove(&trans) else {
            return Err(Error::invalid_command(format!("end of unknown transaction T{}", trans)));
        };
        if record.will_abort {
            self.sink.emit(Event::EndAborted { trans });
            return Ok(());
        }
        // every site is asked; the ones that never saw the transaction (or
        // are down) treat it as a no-op
        for site in 1..=SITE_COUNT {
            self.sites[site as usize - 1].commit(trans, self.now)?;
        }
        info!("T{} commits at tick {}", trans, self.now);
        self.sink.emit(Event::Finished { trans });
        Ok(())
    }

    /// Aborts the transaction on every site and tombstones its record.
    /// Idempotent.
    fn abort(&mut self, trans: TransId) {
        let Some(record) = self.trans_table.get_mut(&trans) else { return };
        if record.will_abort {
            return;
        }
        record.will_abort = true;
        info!("T{} aborts at tick {}", trans, self.now);
        for dm in &mut self.sites {
            dm.abort(trans);
        }
    }

    /// Drains the pending queue once, front to back. Ops that still cannot be
    /// placed keep their relative order; ops of aborted or finished
    /// transactions are dropped.
    fn try_execute_queue(&mut self) -> CResult<()> {
        let mut requeued = VecDeque::new();
        while let Some(op) = self.queued_ops.pop_front() {
            match self.trans_table.get(&op.trans) {
                None => {
                    debug!("dropping op {} of finished T{}", op.id, op.trans);
                    continue;
                }
                Some(record) if record.will_abort => {
                    debug!("dropping op {} of aborted T{}", op.id, op.trans);
                    continue;
                }
                Some(_) => {}
            }
            if !self.dispatch_op(&op)? {
                requeued.push_back(op);
            }
        }
        self.queued_ops = requeued;
        Ok(())
    }

    /// Routes one op to the sites that can serve it. Returns false when the
    /// op cannot be placed yet and must wait in the queue.
    fn dispatch_op(&mut self, op: &Op) -> CResult<bool> {
        match op.kind {
            OpKind::Read { item } => self.dispatch_read(op, item),
            OpKind::Snapshot { item } => self.dispatch_snapshot(op, item),
            OpKind::Write { item, .. } => self.dispatch_write(op, item),
        }
    }

    /// A locked read is served by the first live replica that grants the
    /// lock. Replicas that refused keep the queued lock request; it still
    /// feeds the waits-for graph and may be granted later.
    fn dispatch_read(&mut self, op: &Op, item: ItemId) -> CResult<bool> {
        for site in self.hosting(item) {
            if !self.site_up[site as usize] {
                continue;
            }
            let dm = &mut self.sites[site as usize - 1];
            if dm.get_read_lock(op.trans, item) {
                let value = dm.read(op)?;
                if let Some(record) = self.trans_table.get_mut(&op.trans) {
                    record.visited_sites.insert(site);
                }
                self.sink.emit(Event::ReadResponse { op: *op, site, value });
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// A snapshot read is served by the first live replica whose history
    /// reaches back to the transaction's start.
    fn dispatch_snapshot(&mut self, op: &Op, item: ItemId) -> CResult<bool> {
        let Some(record) = self.trans_table.get(&op.trans) else { return Ok(false) };
        let start_ts = record.start_ts;
        for site in self.hosting(item) {
            if !self.site_up[site as usize] {
                continue;
            }
            if let Some(value) = self.sites[site as usize - 1].ronly(op, start_ts)? {
                self.sink.emit(Event::ReadResponse { op: *op, site, value });
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// A write needs the exclusive lock on every live replica. When any
    /// replica refuses, the op waits; the refusing replicas keep the queued
    /// request and the granting replicas keep their locks.
    fn dispatch_write(&mut self, op: &Op, item: ItemId) -> CResult<bool> {
        let live: Vec<SiteId> =
            self.hosting(item).into_iter().filter(|&site| self.site_up[site as usize]).collect();
        if live.is_empty() {
            return Ok(false);
        }
        let mut all_granted = true;
        for &site in &live {
            all_granted &= self.sites[site as usize - 1].get_write_lock(op.trans, item);
        }
        if !all_granted {
            return Ok(false);
        }
        for &site in &live {
            self.sites[site as usize - 1].write(op)?;
            if let Some(record) = self.trans_table.get_mut(&op.trans) {
                record.visited_sites.insert(site);
            }
            self.sink.emit(Event::WriteResponse { op: *op, site });
        }
        Ok(true)
    }

    /// Builds the global waits-for graph from every up site and aborts the
    /// youngest transaction on a cycle, if any. Ties go to the smaller id, so
    /// the choice is a pure function of the graph and the start times.
    fn detect_deadlock(&mut self) -> bool {
        let mut graph: BTreeMap<TransId, BTreeSet<TransId>> = BTreeMap::new();
        for dm in &self.sites {
            if !dm.is_up() {
                continue;
            }
            for (trans, waits_on) in dm.waits_for() {
                graph.entry(trans).or_default().extend(waits_on);
            }
        }

        let mut victim: Option<(Timestamp, TransId)> = None;
        for &trans in graph.keys() {
            if !on_cycle(trans, &graph) {
                continue;
            }
            let Some(record) = self.trans_table.get(&trans) else { continue };
            let candidate = (record.start_ts, trans);
            victim = Some(match victim {
                None => candidate,
                Some(best) => {
                    // youngest start wins; equal ages fall to the smaller id
                    if candidate.0 > best.0 || (candidate.0 == best.0 && candidate.1 < best.1) {
                        candidate
                    } else {
                        best
                    }
                }
            });
        }

        let Some((_, trans)) = victim else { return false };
        info!("deadlock at tick {}: aborting T{}", self.now, trans);
        self.sink.emit(Event::DeadlockVictim { trans });
        self.abort(trans);
        true
    }

    fn hosting(&self, item: ItemId) -> Vec<SiteId> {
        self.item_sites.get(&item).cloned().unwrap_or_default()
    }
}

/// Depth-first search for a path from `root` back to itself.
fn on_cycle(root: TransId, graph: &BTreeMap<TransId, BTreeSet<TransId>>) -> bool {
    fn visit(
        current: TransId,
        root: TransId,
        graph: &BTreeMap<TransId, BTreeSet<TransId>>,
        seen: &mut BTreeSet<TransId>,
    ) -> bool {
        seen.insert(current);
        let Some(next) = graph.get(&current) else { return false };
        for &child in next {
            if child == root {
                return true;
            }
            if !seen.contains(&child) && visit(child, root, graph, seen) {
                return true;
            }
        }
        false
    }
    visit(root, root, graph, &mut BTreeSet::new())
}
