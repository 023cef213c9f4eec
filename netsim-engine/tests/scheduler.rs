// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

use std::cell::RefCell;
use std::rc::Rc;

use netsim_engine::run_simulation;
use netsim_engine::scheduler::Scheduler;
use netsim_engine::test_helpers::start_test;
use netsim_engine::time::simtime::SimTime;
use netsim_engine::types::SimResult;

/// Events run in time order regardless of the order they were scheduled in.
#[test]
fn time_order() {
    let mut engine = start_test(file!());
    let seen = Rc::new(RefCell::new(Vec::new()));

    for delay in [30.0, 10.0, 20.0] {
        let seen = seen.clone();
        engine
            .scheduler()
            .schedule_in(SimTime::from_ns(delay), move || {
                seen.borrow_mut().push(delay);
                Ok(())
            })
            .unwrap();
    }

    run_simulation!(engine);
    assert_eq!(*seen.borrow(), vec![10.0, 20.0, 30.0]);
    assert_eq!(engine.time_now_ns(), 30.0);
    assert_eq!(engine.num_events(), 3);
}

/// Events at the same time run in insertion order.
#[test]
fn ties_broken_by_insertion_order() {
    let mut engine = start_test(file!());
    let seen = Rc::new(RefCell::new(Vec::new()));

    for i in 0..8 {
        let seen = seen.clone();
        engine
            .scheduler()
            .schedule_at(SimTime::from_ns(5.0), move || {
                seen.borrow_mut().push(i);
                Ok(())
            })
            .unwrap();
    }

    run_simulation!(engine);
    assert_eq!(*seen.borrow(), (0..8).collect::<Vec<_>>());
}

/// A handler can schedule a delayed event back to itself, including a
/// zero-delay event which must run after everything already queued for now.
#[test]
fn delayed_self_events() {
    let mut engine = start_test(file!());
    let seen = Rc::new(RefCell::new(Vec::new()));

    fn tick(scheduler: Scheduler, seen: Rc<RefCell<Vec<String>>>, left: usize) -> SimResult {
        seen.borrow_mut()
            .push(format!("tick@{}", scheduler.time_now_ns()));
        if left > 0 {
            let next = scheduler.clone();
            scheduler.schedule_in(SimTime::from_ns(2.0), move || tick(next, seen, left - 1))?;
        }
        Ok(())
    }

    {
        let scheduler = engine.scheduler().clone();
        let seen = seen.clone();
        engine
            .scheduler()
            .schedule_in(SimTime::ZERO, move || tick(scheduler, seen, 2))
            .unwrap();
    }
    {
        let scheduler = engine.scheduler().clone();
        let seen = seen.clone();
        engine
            .scheduler()
            .schedule_in(SimTime::ZERO, move || {
                let inner = seen.clone();
                scheduler.schedule_in(SimTime::ZERO, move || {
                    inner.borrow_mut().push("late".to_string());
                    Ok(())
                })?;
                seen.borrow_mut().push("other".to_string());
                Ok(())
            })
            .unwrap();
    }

    run_simulation!(engine);
    assert_eq!(
        *seen.borrow(),
        vec!["tick@0", "other", "late", "tick@2", "tick@4"]
    );
}

/// Scheduling in the past is rejected.
#[test]
fn schedule_in_past() {
    let mut engine = start_test(file!());
    {
        let scheduler = engine.scheduler().clone();
        engine
            .scheduler()
            .schedule_at(SimTime::from_ns(10.0), move || {
                scheduler.schedule_at(SimTime::from_ns(5.0), || Ok(()))
            })
            .unwrap();
    }
    run_simulation!(
        engine,
        "Error: top::partition0: cannot schedule at 5.000ns, time is already 10.000ns"
    );
}

/// `run_until` leaves later events queued and they run on the next call.
#[test]
fn run_until_bound() {
    let mut engine = start_test(file!());
    for delay in [1.0, 2.0, 3.0] {
        engine
            .scheduler()
            .schedule_in(SimTime::from_ns(delay), || Ok(()))
            .unwrap();
    }

    engine.run_until(SimTime::from_ns(2.0)).unwrap();
    assert_eq!(engine.time_now_ns(), 2.0);
    assert_eq!(engine.num_pending(), 1);

    run_simulation!(engine);
    assert_eq!(engine.time_now_ns(), 3.0);
    assert_eq!(engine.num_pending(), 0);
}
