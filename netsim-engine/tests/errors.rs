// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::cell::Cell;
use std::rc::Rc;

use netsim_engine::engine::Engine;
use netsim_engine::run_simulation;
use netsim_engine::sim_error;
use netsim_engine::test_helpers::start_test;
use netsim_engine::time::simtime::SimTime;
use netsim_track::tracker::dev_null_tracker;

/// An error returned by a handler stops the simulation immediately.
#[test]
fn handler_error_aborts() {
    let mut engine = start_test(file!());
    let later_ran = Rc::new(Cell::new(false));

    engine
        .scheduler()
        .schedule_in(SimTime::from_ns(1.0), || sim_error!("credit overflow"))
        .unwrap();
    {
        let later_ran = later_ran.clone();
        engine
            .scheduler()
            .schedule_in(SimTime::from_ns(2.0), move || {
                later_ran.set(true);
                Ok(())
            })
            .unwrap();
    }

    run_simulation!(engine, "Error: credit overflow");
    assert!(!later_ran.get());
    assert_eq!(engine.num_pending(), 1);
}

#[test]
fn bad_partition_counts() {
    let tracker = dev_null_tracker();
    assert!(Engine::with_partitions(&tracker, 0, SimTime::from_ns(1.0)).is_err());
    assert!(Engine::with_partitions(&tracker, 2, SimTime::ZERO).is_err());
    assert!(Engine::with_partitions(&tracker, 1, SimTime::ZERO).is_ok());
}
