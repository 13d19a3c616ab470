//! Shared identifiers, the data placement rule and the operation model.

use serde_derive::{Deserialize, Serialize};

/// A transaction id, as written in the input: `T3` has id 3. Always positive.
pub type TransId = u32;

/// A site id in `1..=SITE_COUNT`.
pub type SiteId = u8;

/// An item id in `1..=ITEM_COUNT`: `x7` has id 7.
pub type ItemId = u8;

/// A per-run unique operation id, in submission order.
pub type OpId = u64;

/// A logical tick. Signed, so the seed versions at time -1 sort below the
/// first real tick 0.
pub type Timestamp = i64;

/// An item value.
pub type Value = i64;

/// Number of sites.
pub const SITE_COUNT: SiteId = 10;

/// Number of items.
pub const ITEM_COUNT: ItemId = 20;

/// Commit time of the seed versions every site starts with.
pub const INITIAL_TS: Timestamp = -1;

/// Even items are replicated on every site; odd items live on a single site.
pub fn is_replicated(item: ItemId) -> bool {
    item % 2 == 0
}

/// Whether `site` hosts `item`: every site hosts the even items, and site
/// `1 + (item mod 10)` additionally hosts the odd ones.
pub fn hosts(site: SiteId, item: ItemId) -> bool {
    is_replicated(item) || 1 + (item % 10) == site
}

/// The sites hosting `item`, in ascending site order. Reads probe these in
/// order; writes go to every live one.
pub fn hosting_sites(item: ItemId) -> Vec<SiteId> {
    (1..=SITE_COUNT).filter(|&site| hosts(site, item)).collect()
}

/// The committed value every hosting site starts out with.
pub fn initial_value(item: ItemId) -> Value {
    10 * item as Value
}

/// What an operation does once a site accepts it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    /// A locked read under two-phase locking.
    Read { item: ItemId },

    /// A multi-version snapshot read for a read-only transaction.
    Snapshot { item: ItemId },

    /// A replicated write of `value` to `item`.
    Write { item: ItemId, value: Value },
}

/// A read or write submitted by a transaction. Ops that cannot be placed yet
/// wait in the manager's pending queue and keep their id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Op {
    pub id: OpId,
    pub trans: TransId,
    pub kind: OpKind,
}

impl Op {
    /// The item this op touches.
    pub fn item(&self) -> ItemId {
        match self.kind {
            OpKind::Read { item } | OpKind::Snapshot { item } | OpKind::Write { item, .. } => item,
        }
    }
}

/// A parsed input command. One input line may carry several, separated by
/// `;`; the whole line is one logical tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Begin { trans: TransId },
    BeginRo { trans: TransId },
    End { trans: TransId },
    Read { trans: TransId, item: ItemId },
    Write { trans: TransId, item: ItemId, value: Value },
    Fail { site: SiteId },
    Recover { site: SiteId },
    DumpAll,
    DumpSite { site: SiteId },
    DumpItem { item: ItemId },
}
