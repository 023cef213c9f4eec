// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use netsim_engine::engine::Engine;
use netsim_engine::scheduler::Scheduler;
use netsim_engine::time::simtime::SimTime;
use netsim_engine::types::SimResult;
use netsim_track::tracker::dev_null_tracker;

fn chain(scheduler: Scheduler, left: u64) -> SimResult {
    if left == 0 {
        return Ok(());
    }
    let next = scheduler.clone();
    scheduler.schedule_in(SimTime::from_ps(left % 7), move || chain(next, left - 1))
}

fn run_chains(num_chains: u64, length: u64) {
    let mut engine = Engine::new(&dev_null_tracker());
    for _ in 0..num_chains {
        let scheduler = engine.scheduler().clone();
        engine
            .scheduler()
            .schedule_in(SimTime::ZERO, move || chain(scheduler, length))
            .unwrap();
    }
    engine.run().unwrap();
    black_box(engine.num_events());
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("100 chains of 1000 events", |b| {
        b.iter(|| run_chains(100, 1000));
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
