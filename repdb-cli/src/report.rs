//! Rendering of the simulator's structured events into the line-oriented
//! output stream.

use repdb::event::{Event, EventSink};
use repdb::types::OpKind;

/// Formats one event as its output line.
pub fn render(event: &Event) -> String {
    match event {
        Event::Tick { now } => {
            format!("------------------- Time Tick: {} -------------------------", now)
        }
        Event::ReadResponse { op, site, value } => format!(
            "Received from Site {} READ operation result on Transaction T{} | OPid: {} | Key = {} | Value = {}",
            site,
            op.trans,
            op.id,
            op.item(),
            value
        ),
        Event::WriteResponse { op, site } => match op.kind {
            OpKind::Write { item, value } => format!(
                "Received from Site {} WRITE operation result on Transaction T{} | OPid: {} | Key = {} | Value = {}",
                site, op.trans, op.id, item, value
            ),
            _ => format!(
                "Received from Site {} WRITE operation result on Transaction T{} | OPid: {}",
                site, op.trans, op.id
            ),
        },
        Event::DeadlockVictim { trans } => {
            format!("Transaction T{} aborted because of deadlock", trans)
        }
        Event::SiteFailureAbort { trans, site } => format!(
            "Transaction T{} aborted, because it has accessed Site {} and this site failed",
            trans, site
        ),
        Event::Finished { trans } => format!("Transaction T{} finished successfully!", trans),
        Event::EndAborted { trans } => format!("Transaction T{} has already aborted", trans),
        Event::OpIgnored { trans } => {
            format!("Transaction T{} already aborted, ignore this command", trans)
        }
        Event::SiteNotUp { site } => format!("Site {} is not up yet", site),
        Event::DumpSite { site, values } => {
            let items = values
                .iter()
                .map(|(item, value)| format!("x{}: {}", item, value))
                .collect::<Vec<_>>()
                .join(", ");
            format!("site {} - {}", site, items)
        }
    }
}

/// A sink that prints every event to stdout as it happens.
#[derive(Debug, Default)]
pub struct StdoutReporter;

impl EventSink for StdoutReporter {
    fn emit(&mut self, event: Event) {
        println!("{}", render(&event));
    }
}
