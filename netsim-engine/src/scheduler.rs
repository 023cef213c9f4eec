// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Partition-local event queues.
//!
//! Each partition owns a [`Scheduler`]. Events are dispatched strictly in
//! `(time, insertion order)` order, so two events scheduled for the same time
//! always run in the order in which they were scheduled.
//!
//! A handler running in one partition may schedule onto the [`Scheduler`] of
//! another partition. Such cross-partition events are posted to the
//! destination's mailbox and must be at least one lookahead in the future of
//! the sender. The [engine](crate::engine::Engine) merges mailboxes at window
//! barriers.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use netsim_track::entity::Entity;
use netsim_track::set_time;

use crate::sim_error;
use crate::time::simtime::SimTime;
use crate::types::SimResult;

/// A unit of work to run at a scheduled time.
pub type Handler = Box<dyn FnOnce() -> SimResult>;

struct Event {
    time: SimTime,
    seq: u64,
    handler: Handler,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    // Reversed so that the `BinaryHeap` pops the earliest event first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// State shared by all partitions of one engine.
pub(crate) struct Shared {
    /// Partition whose handlers are currently being dispatched.
    pub(crate) active: Cell<Option<usize>>,

    /// Time of the handler currently being dispatched.
    pub(crate) active_now: Cell<SimTime>,

    pub(crate) lookahead: SimTime,
}

impl Shared {
    pub(crate) fn new(lookahead: SimTime) -> Rc<Self> {
        Rc::new(Self {
            active: Cell::new(None),
            active_now: Cell::new(SimTime::ZERO),
            lookahead,
        })
    }
}

struct SchedulerState {
    entity: Rc<Entity>,
    partition: usize,
    now: Cell<SimTime>,
    next_seq: Cell<u64>,
    queue: RefCell<BinaryHeap<Event>>,
    mailbox: RefCell<Vec<(SimTime, Handler)>>,
    num_events: Cell<u64>,
    shared: Rc<Shared>,
}

/// Handle used by model components to schedule work on a partition.
#[derive(Clone)]
pub struct Scheduler {
    state: Rc<SchedulerState>,
}

impl Scheduler {
    pub(crate) fn new(entity: Rc<Entity>, partition: usize, shared: Rc<Shared>) -> Self {
        Self {
            state: Rc::new(SchedulerState {
                entity,
                partition,
                now: Cell::new(SimTime::ZERO),
                next_seq: Cell::new(0),
                queue: RefCell::new(BinaryHeap::new()),
                mailbox: RefCell::new(Vec::new()),
                num_events: Cell::new(0),
                shared,
            }),
        }
    }

    #[must_use]
    pub fn partition(&self) -> usize {
        self.state.partition
    }

    #[must_use]
    pub fn time_now(&self) -> SimTime {
        self.state.now.get()
    }

    #[must_use]
    pub fn time_now_ns(&self) -> f64 {
        self.state.now.get().as_ns()
    }

    /// Schedule `handler` to run `delay` after the current time of the caller.
    pub fn schedule_in<F>(&self, delay: SimTime, handler: F) -> SimResult
    where
        F: FnOnce() -> SimResult + 'static,
    {
        let now = match self.state.shared.active.get() {
            Some(active) if active != self.state.partition => self.state.shared.active_now.get(),
            _ => self.state.now.get(),
        };
        self.schedule_at(now + delay, handler)
    }

    /// Schedule `handler` to run at the absolute time `time`.
    pub fn schedule_at<F>(&self, time: SimTime, handler: F) -> SimResult
    where
        F: FnOnce() -> SimResult + 'static,
    {
        match self.state.shared.active.get() {
            Some(active) if active != self.state.partition => {
                let sender_now = self.state.shared.active_now.get();
                if time < sender_now + self.state.shared.lookahead {
                    return sim_error!(format!(
                        "{}: event from partition {active} at {time} violates lookahead {} (sender at {sender_now})",
                        self.state.entity, self.state.shared.lookahead
                    ));
                }
                self.state
                    .mailbox
                    .borrow_mut()
                    .push((time, Box::new(handler)));
            }
            _ => {
                if time < self.state.now.get() {
                    return sim_error!(format!(
                        "{}: cannot schedule at {time}, time is already {}",
                        self.state.entity,
                        self.state.now.get()
                    ));
                }
                self.push(time, Box::new(handler));
            }
        }
        Ok(())
    }

    fn push(&self, time: SimTime, handler: Handler) {
        let seq = self.state.next_seq.get();
        self.state.next_seq.set(seq + 1);
        self.state.queue.borrow_mut().push(Event { time, seq, handler });
    }

    pub(crate) fn next_event_time(&self) -> Option<SimTime> {
        self.state.queue.borrow().peek().map(|event| event.time)
    }

    pub(crate) fn num_pending(&self) -> usize {
        self.state.queue.borrow().len() + self.state.mailbox.borrow().len()
    }

    pub(crate) fn num_events(&self) -> u64 {
        self.state.num_events.get()
    }

    /// Move cross-partition events into the queue, in arrival order.
    pub(crate) fn deliver_mailbox(&self) {
        let posted: Vec<_> = self.state.mailbox.borrow_mut().drain(..).collect();
        for (time, handler) in posted {
            self.push(time, handler);
        }
    }

    /// Dispatch every event with a time no later than `limit`.
    pub(crate) fn run_until(&self, limit: SimTime) -> SimResult {
        self.state.shared.active.set(Some(self.state.partition));
        let result = self.dispatch_until(limit);
        self.state.shared.active.set(None);
        result
    }

    fn dispatch_until(&self, limit: SimTime) -> SimResult {
        loop {
            let event = {
                let mut queue = self.state.queue.borrow_mut();
                match queue.peek() {
                    Some(event) if event.time <= limit => queue.pop(),
                    _ => None,
                }
            };
            let Some(event) = event else {
                return Ok(());
            };

            if event.time > self.state.now.get() {
                set_time!(self.state.entity ; event.time.as_ns());
            }
            self.state.now.set(event.time);
            self.state.shared.active_now.set(event.time);
            self.state.num_events.set(self.state.num_events.get() + 1);
            (event.handler)()?;
        }
    }

    /// Drop everything still queued.
    pub(crate) fn clear(&self) {
        let queued = std::mem::take(&mut *self.state.queue.borrow_mut());
        let posted = std::mem::take(&mut *self.state.mailbox.borrow_mut());
        drop(queued);
        drop(posted);
    }
}
