// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The crossbar of a switch.
//!
//! Packets arrive on input ports already routed (their
//! [`RoutingPath`](netsim_topology::RoutingPath) names the output port and
//! virtual channel). The crossbar holds them per input until the output
//! buffer has credit for them, choosing between competing inputs with an
//! [`Arbitrate`] policy and sharing each internal link with a
//! [`BandwidthArbitrator`].
//!
//! Every departure records the input port and the virtual channel the packet
//! arrived on so that the caller can return credit upstream.

use std::collections::VecDeque;
use std::rc::Rc;

use netsim_engine::sim_error;
use netsim_engine::time::simtime::SimTime;
use netsim_engine::types::SimError;
use netsim_model_builder::{EntityDisplay, EntityGet};
use netsim_track::entity::Entity;
use netsim_track::{enter, exit, trace};

use crate::arbitrator::BandwidthArbitrator;
use crate::buffer::{CreditCounter, Departure};
use crate::packet::Packet;
use crate::policy::Arbitrate;

/// A packet leaving the crossbar towards an output buffer.
#[derive(Debug)]
pub struct CrossbarDeparture {
    pub inport: usize,
    pub in_vc: usize,
    pub departure: Departure,
}

struct Waiting {
    seq: u64,
    in_vc: usize,
    packet: Packet,
}

/// The packets queued for one output virtual channel, per input port.
struct OutputQueue {
    per_input: Vec<VecDeque<Waiting>>,
    policy: Box<dyn Arbitrate>,
}

struct Output {
    credits: CreditCounter,
    queues: Vec<OutputQueue>,
    arbitrator: Box<dyn BandwidthArbitrator>,
}

#[derive(EntityDisplay, EntityGet)]
pub struct Crossbar {
    entity: Rc<Entity>,
    num_inports: usize,
    num_vcs: usize,
    outputs: Vec<Option<Output>>,
    accumulate_delay: bool,
    next_seq: u64,
}

impl Crossbar {
    #[must_use]
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        num_ports: usize,
        num_vcs: usize,
        accumulate_delay: bool,
    ) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, name)),
            num_inports: num_ports,
            num_vcs,
            outputs: (0..num_ports).map(|_| None).collect(),
            accumulate_delay,
            next_seq: 0,
        }
    }

    /// Enable an output port. `credits_per_vc` is the space available to each
    /// virtual channel in the output buffer.
    pub fn add_output(
        &mut self,
        port: usize,
        credits_per_vc: usize,
        arbitrator: Box<dyn BandwidthArbitrator>,
        make_policy: impl Fn() -> Box<dyn Arbitrate>,
    ) -> Result<(), SimError> {
        let Some(slot) = self.outputs.get_mut(port) else {
            return sim_error!(format!("{}: no output port {port}", self.entity));
        };
        if slot.is_some() {
            return sim_error!(format!("{}: output port {port} added twice", self.entity));
        }
        let num_inports = self.num_inports;
        *slot = Some(Output {
            credits: CreditCounter::new(self.num_vcs, credits_per_vc),
            queues: (0..self.num_vcs)
                .map(|_| OutputQueue {
                    per_input: (0..num_inports).map(|_| VecDeque::new()).collect(),
                    policy: make_policy(),
                })
                .collect(),
            arbitrator,
        });
        Ok(())
    }

    /// Accept a routed packet that arrived on `inport` using `in_vc`.
    pub fn handle_payload(
        &mut self,
        now: SimTime,
        inport: usize,
        in_vc: usize,
        mut packet: Packet,
    ) -> Result<Vec<CrossbarDeparture>, SimError> {
        let outport = packet.path.outport;
        let vc = packet.vc();
        if inport >= self.num_inports {
            return sim_error!(format!("{}: {packet} on unknown inport {inport}", self.entity));
        }
        if vc >= self.num_vcs {
            return sim_error!(format!("{}: {packet} routed to unknown vc{vc}", self.entity));
        }
        let Some(output) = self.outputs.get_mut(outport).and_then(Option::as_mut) else {
            return sim_error!(format!(
                "{}: {packet} routed to unconnected port {outport}",
                self.entity
            ));
        };

        enter!(self.entity ; packet.id());
        packet.set_arrival(now);
        let seq = self.next_seq;
        self.next_seq += 1;
        output.queues[vc].per_input[inport].push_back(Waiting { seq, in_vc, packet });
        Ok(self.try_send(now, outport, vc))
    }

    /// Return output buffer credit and send whatever can now be sent.
    pub fn handle_credit(
        &mut self,
        now: SimTime,
        outport: usize,
        vc: usize,
        num_bytes: usize,
    ) -> Result<Vec<CrossbarDeparture>, SimError> {
        let Some(output) = self.outputs.get_mut(outport).and_then(Option::as_mut) else {
            return sim_error!(format!("{}: credit for unconnected port {outport}", self.entity));
        };
        output.credits.release(&self.entity, vc, num_bytes)?;
        Ok(self.try_send(now, outport, vc))
    }

    fn try_send(&mut self, now: SimTime, outport: usize, vc: usize) -> Vec<CrossbarDeparture> {
        let mut departures = Vec::new();
        let Some(output) = self.outputs[outport].as_mut() else {
            return departures;
        };
        loop {
            let available = output.credits.available(vc);
            let queue = &mut output.queues[vc];
            let requests: Vec<Option<u64>> = queue
                .per_input
                .iter()
                .map(|waiting| {
                    waiting
                        .front()
                        .filter(|w| w.packet.num_bytes() <= available)
                        .map(|w| w.seq)
                })
                .collect();
            let Some(inport) = queue.policy.arbitrate(&self.entity, &requests) else {
                break;
            };
            let Some(Waiting { in_vc, mut packet, .. }) = queue.per_input[inport].pop_front()
            else {
                break;
            };

            let num_bytes = packet.num_bytes();
            output.credits.take(vc, num_bytes);
            let tx = output
                .arbitrator
                .arbitrate(now, num_bytes, packet.bandwidth());
            let local_delay = tx.head_leaves.saturating_sub(packet.arrival());
            packet.record_delay(local_delay, self.accumulate_delay);
            packet.set_bandwidth(tx.bandwidth);

            exit!(self.entity ; packet.id());
            trace!(self.entity ; "{} -> {}: {} {}..{}",
                inport, outport, packet, tx.head_leaves, tx.tail_leaves);
            departures.push(CrossbarDeparture {
                inport,
                in_vc,
                departure: Departure {
                    packet,
                    head_leaves: tx.head_leaves,
                    tail_leaves: tx.tail_leaves,
                    local_delay,
                },
            });
        }
        departures
    }

    /// Packets waiting to reach output `port`.
    #[must_use]
    pub fn queue_length(&self, port: usize) -> usize {
        self.outputs
            .get(port)
            .and_then(Option::as_ref)
            .map_or(0, |output| {
                output
                    .queues
                    .iter()
                    .flat_map(|q| q.per_input.iter())
                    .map(VecDeque::len)
                    .sum()
            })
    }

    /// Total number of packets held.
    #[must_use]
    pub fn num_waiting(&self) -> usize {
        (0..self.outputs.len()).map(|port| self.queue_length(port)).sum()
    }

    #[must_use]
    pub fn credits(&self, port: usize, vc: usize) -> Option<usize> {
        self.outputs
            .get(port)
            .and_then(Option::as_ref)
            .map(|output| output.credits.available(vc))
    }
}
