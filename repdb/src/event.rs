//! Structured results of the simulation. The core never formats output; it
//! emits these events through a sink the driver injects, and the driver (or a
//! test) decides what to do with them.

use serde_derive::{Deserialize, Serialize};

use crate::types::{ItemId, Op, SiteId, Timestamp, TransId, Value};

/// A user-visible event, in emission order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A new logical tick begins.
    Tick { now: Timestamp },

    /// A site served a read, locked or snapshot, for an operation.
    ReadResponse { op: Op, site: SiteId, value: Value },

    /// A site applied a write to its working copy. Replicated writes emit one
    /// per accepting site.
    WriteResponse { op: Op, site: SiteId },

    /// Deadlock detection aborted this transaction.
    DeadlockVictim { trans: TransId },

    /// The transaction was aborted because a site it had accessed failed.
    SiteFailureAbort { trans: TransId, site: SiteId },

    /// The transaction committed on every site.
    Finished { trans: TransId },

    /// `end` reached a transaction that had already been aborted.
    EndAborted { trans: TransId },

    /// An operation of an aborted transaction was discarded at submission.
    OpIgnored { trans: TransId },

    /// `fail` targeted a site that is already down.
    SiteNotUp { site: SiteId },

    /// Committed values of one site, in item order. Emitted once per site for
    /// a full dump, and with a single entry for an item dump.
    DumpSite { site: SiteId, values: Vec<(ItemId, Value)> },
}

/// Receives every event the simulator emits.
pub trait EventSink {
    fn emit(&mut self, event: Event);
}

/// A sink that buffers events in memory, for tests and benchmarks.
#[derive(Debug, Default)]
pub struct VecSink {
    pub events: Vec<Event>,
}

impl EventSink for VecSink {
    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}
