// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! One direction of a connection between two components.
//!
//! A link does not own the component at its far end: the
//! [`Network`](crate::network::Network) owns every switch and endpoint, and
//! links hold weak references so that components can refer to each other in
//! cycles.

use std::rc::{Rc, Weak};

use netsim_components::packet::{Credit, Packet};
use netsim_engine::scheduler::Scheduler;
use netsim_engine::sim_error;
use netsim_engine::time::simtime::SimTime;
use netsim_engine::types::SimResult;

/// Something packets and credits can be delivered to.
pub trait Connectable {
    fn handle_payload(&self, inport: usize, packet: Packet) -> SimResult;

    fn handle_credit(&self, credit: Credit) -> SimResult;
}

#[derive(Clone)]
pub struct Link {
    target: Weak<dyn Connectable>,
    scheduler: Scheduler,

    /// Port at the far end.
    port: usize,
    latency: SimTime,
}

impl Link {
    /// `scheduler` must be the scheduler of the partition that `target`
    /// belongs to.
    #[must_use]
    pub fn new(
        target: &Rc<dyn Connectable>,
        scheduler: &Scheduler,
        port: usize,
        latency: SimTime,
    ) -> Self {
        Self {
            target: Rc::downgrade(target),
            scheduler: scheduler.clone(),
            port,
            latency,
        }
    }

    #[must_use]
    pub fn port(&self) -> usize {
        self.port
    }

    /// Send a packet whose head leaves at `head_leaves`.
    pub fn send_payload(&self, head_leaves: SimTime, packet: Packet) -> SimResult {
        let target = self.target.clone();
        let port = self.port;
        self.scheduler
            .schedule_at(head_leaves + self.latency, move || match target.upgrade() {
                Some(target) => target.handle_payload(port, packet),
                None => sim_error!(format!("link to port {port} dropped {packet}")),
            })
    }

    /// Return `num_bytes` of credit on virtual channel `vc` at time `at`.
    pub fn send_credit(&self, at: SimTime, vc: usize, num_bytes: usize) -> SimResult {
        let target = self.target.clone();
        let credit = Credit {
            port: self.port,
            vc,
            num_bytes,
        };
        self.scheduler
            .schedule_at(at + self.latency, move || match target.upgrade() {
                Some(target) => target.handle_credit(credit),
                None => sim_error!(format!("link dropped {credit}")),
            })
    }
}
