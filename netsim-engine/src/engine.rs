// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The simulation engine.
//!
//! The engine owns the partitions of a simulation and runs them with a
//! conservative windowed algorithm: the earliest pending event `t` across all
//! partitions opens a window `[t, t + lookahead)` that every partition can
//! dispatch independently, because no cross-partition event can land inside
//! it. Mailboxes are merged at the end of each window.
//!
//! With a single partition the window is unbounded and the engine degenerates
//! to a plain event loop.

use std::rc::Rc;

use netsim_track::entity::{Entity, toplevel};
use netsim_track::tracker::stdout_tracker;
use netsim_track::{Tracker, debug};

use crate::scheduler::{Scheduler, Shared};
use crate::sim_error;
use crate::time::simtime::SimTime;
use crate::types::{SimError, SimResult};

pub struct Engine {
    partitions: Vec<Scheduler>,
    lookahead: SimTime,
    toplevel: Rc<Entity>,
    tracker: Tracker,
}

impl Engine {
    /// Create a standalone engine with a single partition.
    #[must_use]
    pub fn new(tracker: &Tracker) -> Self {
        let toplevel = toplevel(tracker, "top");
        let shared = Shared::new(SimTime::ZERO);
        let entity = Rc::new(Entity::new(&toplevel, "partition0"));
        Self {
            partitions: vec![Scheduler::new(entity, 0, shared)],
            lookahead: SimTime::ZERO,
            toplevel,
            tracker: tracker.clone(),
        }
    }

    /// Create an engine with `num_partitions` event queues.
    ///
    /// Every cross-partition event must be scheduled at least `lookahead`
    /// after the time of the handler that scheduled it.
    pub fn with_partitions(
        tracker: &Tracker,
        num_partitions: usize,
        lookahead: SimTime,
    ) -> Result<Self, SimError> {
        if num_partitions == 0 {
            return sim_error!("an engine needs at least one partition");
        }
        if num_partitions > 1 && lookahead == SimTime::ZERO {
            return sim_error!(format!(
                "{num_partitions} partitions require a non-zero lookahead"
            ));
        }

        let toplevel = toplevel(tracker, "top");
        let shared = Shared::new(lookahead);
        let partitions = (0..num_partitions)
            .map(|i| {
                let entity = Rc::new(Entity::new(&toplevel, format!("partition{i}").as_str()));
                Scheduler::new(entity, i, shared.clone())
            })
            .collect();

        Ok(Self {
            partitions,
            lookahead,
            toplevel,
            tracker: tracker.clone(),
        })
    }

    /// Run until there are no more events.
    pub fn run(&mut self) -> SimResult {
        self.run_until(SimTime::MAX)
    }

    /// Run all events with a time no later than `end`.
    pub fn run_until(&mut self, end: SimTime) -> SimResult {
        loop {
            for partition in &self.partitions {
                partition.deliver_mailbox();
            }

            let Some(next) = self
                .partitions
                .iter()
                .filter_map(Scheduler::next_event_time)
                .min()
            else {
                break;
            };
            if next > end {
                break;
            }

            let limit = if self.partitions.len() == 1 {
                end
            } else {
                (next + self.lookahead - SimTime::from_ps(1)).min(end)
            };

            for partition in &self.partitions {
                partition.run_until(limit)?;
            }
        }

        debug!(self.toplevel ; "stopped at {} after {} events", self.time_now(), self.num_events());
        Ok(())
    }

    /// The scheduler of the first partition.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.partitions[0]
    }

    #[must_use]
    pub fn schedulers(&self) -> &[Scheduler] {
        &self.partitions
    }

    #[must_use]
    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    #[must_use]
    pub fn lookahead(&self) -> SimTime {
        self.lookahead
    }

    /// Time of the most recently dispatched event across all partitions.
    #[must_use]
    pub fn time_now(&self) -> SimTime {
        self.partitions
            .iter()
            .map(Scheduler::time_now)
            .max()
            .unwrap_or(SimTime::ZERO)
    }

    #[must_use]
    pub fn time_now_ns(&self) -> f64 {
        self.time_now().as_ns()
    }

    /// Total number of events dispatched so far.
    #[must_use]
    pub fn num_events(&self) -> u64 {
        self.partitions.iter().map(Scheduler::num_events).sum()
    }

    /// Number of events that have been scheduled but not yet dispatched.
    #[must_use]
    pub fn num_pending(&self) -> usize {
        self.partitions.iter().map(Scheduler::num_pending).sum()
    }

    #[must_use]
    pub fn top(&self) -> &Rc<Entity> {
        &self.toplevel
    }

    #[must_use]
    pub fn tracker(&self) -> Tracker {
        self.tracker.clone()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Pending handlers may hold components that hold schedulers.
        for partition in &self.partitions {
            partition.clear();
        }
        self.tracker.shutdown();
    }
}

/// Create a default engine that sends [`Track`](netsim_track::Track) events
/// to stdout.
impl Default for Engine {
    fn default() -> Self {
        let tracker = stdout_tracker(log::Level::Warn);
        Self::new(&tracker)
    }
}
