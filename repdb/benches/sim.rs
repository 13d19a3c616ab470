use criterion::{black_box, criterion_group, criterion_main, Criterion};

use repdb::event::VecSink;
use repdb::txn::TransactionManager;
use repdb::types::{Command, TransId};

/// Runs a contended workload: pairs of transactions writing the same
/// replicated items, with a failure and recovery thrown in, so the queue
/// drain and the deadlock detector both get exercised.
fn run_workload(pairs: u32) -> usize {
    let mut tm = TransactionManager::new(VecSink::default());
    for pair in 0..pairs {
        let t1: TransId = pair * 2 + 1;
        let t2: TransId = pair * 2 + 2;
        let item = (pair % 10 + 1) as u8 * 2;
        tm.tick(&[Command::Begin { trans: t1 }]).unwrap();
        tm.tick(&[Command::Begin { trans: t2 }]).unwrap();
        tm.tick(&[Command::Write { trans: t1, item, value: t1 as i64 }]).unwrap();
        tm.tick(&[Command::Write { trans: t2, item, value: t2 as i64 }]).unwrap();
        tm.tick(&[Command::Fail { site: 3 }]).unwrap();
        tm.tick(&[Command::Recover { site: 3 }]).unwrap();
        tm.tick(&[Command::End { trans: t1 }]).unwrap();
        tm.tick(&[Command::End { trans: t2 }]).unwrap();
    }
    tm.finalize().unwrap();
    tm.into_sink().events.len()
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("contended pairs 50", |b| b.iter(|| run_workload(black_box(50))));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
