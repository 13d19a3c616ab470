//! `repdb` simulates a replicated, multi-site database executing interactive
//! transactions. Ten co-located sites each own a lock table, a working memory
//! and a multi-version disk; a single transaction manager routes reads and
//! writes to live replicas, runs strict two-phase locking with available-copies
//! replication, serves read-only transactions from versioned snapshots, and
//! breaks deadlocks by aborting the youngest transaction on a cycle.
//!
//! Execution is deterministic and single-threaded: one input line is one
//! logical tick. The crate emits structured [`event::Event`]s through an
//! injected [`event::EventSink`]; rendering them as output lines is the
//! driver's concern.
//!
//! ## Getting started
//!
//! ```rust
//! use repdb::event::VecSink;
//! use repdb::txn::TransactionManager;
//! use repdb::types::Command;
//!
//! fn main() {
//!     run().unwrap();
//! }
//!
//! fn run() -> repdb::error::CResult<()> {
//!     let mut tm = TransactionManager::new(VecSink::default());
//!
//!     tm.tick(&[Command::Begin { trans: 1 }])?;
//!     tm.tick(&[Command::Write { trans: 1, item: 2, value: 25 }])?;
//!     tm.tick(&[Command::End { trans: 1 }])?;
//!     tm.finalize()?;
//!
//!     // every site now carries x2 = 25 at its committed head
//!     let events = tm.into_sink().events;
//!     assert!(!events.is_empty());
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod event;
pub mod locks;
pub mod site;
pub mod storage;
pub mod txn;
pub mod types;
