use std::collections::{BTreeMap, VecDeque};

use serde_derive::{Deserialize, Serialize};

use crate::error::{CResult, Error};
use crate::types::{hosts, initial_value, ItemId, SiteId, Timestamp, Value, INITIAL_TS, ITEM_COUNT};

/// A committed version of an item. Immutable once published.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub value: Value,
    pub commit_time: Timestamp,
}

/// The committed history of every item one site hosts, newest version first.
///
/// Histories only ever grow at the head and are never truncated; at simulator
/// scale the unbounded tail is fine. Every hosted item starts with a seed
/// version at commit time -1, below the first real tick. A `BTreeMap` keeps
/// the items in id order for dumps.
#[derive(Clone, Debug)]
pub struct VersionedStore {
    items: BTreeMap<ItemId, VecDeque<Version>>,
}

impl VersionedStore {
    /// Seeds the store for one site: each hosted item `x` starts at `10 * x`.
    pub fn new(site: SiteId) -> Self {
        let mut items = BTreeMap::new();
        for item in 1..=ITEM_COUNT {
            if hosts(site, item) {
                let seed = Version { value: initial_value(item), commit_time: INITIAL_TS };
                items.insert(item, VecDeque::from([seed]));
            }
        }
        VersionedStore { items }
    }

    /// Whether this site hosts the item.
    pub fn hosts(&self, item: ItemId) -> bool {
        self.items.contains_key(&item)
    }

    /// Hosted item ids, ascending.
    pub fn item_ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.items.keys().copied()
    }

    /// The newest version with `commit_time <= ts`, if the item is hosted.
    pub fn snapshot_at(&self, item: ItemId, ts: Timestamp) -> Option<Version> {
        self.items.get(&item)?.iter().find(|version| version.commit_time <= ts).copied()
    }

    /// The newest committed version: the committed view of the item.
    pub fn current(&self, item: ItemId) -> Option<Version> {
        self.items.get(&item).and_then(|history| history.front()).copied()
    }

    /// Publishes a new version at the head. `ts` must not regress behind the
    /// current head.
    pub fn commit_write(&mut self, item: ItemId, value: Value, ts: Timestamp) -> CResult<()> {
        let history = self
            .items
            .get_mut(&item)
            .ok_or_else(|| Error::internal(format!("commit write to unhosted item x{}", item)))?;
        if history.front().map_or(false, |head| head.commit_time > ts) {
            return Err(Error::internal(format!(
                "commit time {} regresses behind the head of x{}",
                ts, item
            )));
        }
        history.push_front(Version { value, commit_time: ts });
        Ok(())
    }

    /// Committed values of every hosted item, in item order.
    pub fn committed(&self) -> Vec<(ItemId, Value)> {
        self.items
            .iter()
            .filter_map(|(&item, history)| history.front().map(|version| (item, version.value)))
            .collect()
    }
}
