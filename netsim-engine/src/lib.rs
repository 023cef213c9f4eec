// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! The discrete-event engine of the network simulator.
//!
//! The [engine](crate::engine::Engine) owns one or more partitions, each with
//! its own time-ordered event queue. Model components are handed a
//! [`Scheduler`](crate::scheduler::Scheduler) and use it to schedule handlers
//! at a future time. There is no polling: a component that is waiting for
//! something (for example a credit) simply has no event scheduled.
//!
//! # Simple Application
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use netsim_engine::engine::Engine;
//! use netsim_engine::run_simulation;
//! use netsim_engine::time::simtime::SimTime;
//!
//! let mut engine = Engine::default();
//! let count = Rc::new(Cell::new(0));
//! {
//!     let scheduler = engine.scheduler().clone();
//!     let count = count.clone();
//!     engine
//!         .scheduler()
//!         .schedule_in(SimTime::from_ns(5.0), move || {
//!             count.set(count.get() + 1);
//!             scheduler.schedule_in(SimTime::from_ns(5.0), move || {
//!                 count.set(count.get() + 1);
//!                 Ok(())
//!             })
//!         })
//!         .unwrap();
//! }
//! run_simulation!(engine);
//! assert_eq!(count.get(), 2);
//! assert_eq!(engine.time_now_ns(), 10.0);
//! ```

pub mod engine;
pub mod scheduler;
pub mod test_helpers;
pub mod time;
pub mod types;

#[macro_export]
/// Run the simulation to completion.
///
/// The second form expects the simulation to fail with the given error
/// message.
macro_rules! run_simulation {
    ($engine:ident) => {
        $engine.run().unwrap();
    };
    ($engine:ident, $expect:expr) => {
        match $engine.run() {
            Ok(()) => panic!("Expected an error!"),
            Err(e) => assert_eq!(format!("{e}").as_str(), $expect),
        }
    };
}
