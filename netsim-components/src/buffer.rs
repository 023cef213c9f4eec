// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Credit-controlled packet buffers.
//!
//! A [`NetworkBuffer`] sits on every switch output port and holds packets per
//! virtual channel until the downstream buffer has room for them. An
//! [`InjectionBuffer`] is the endpoint equivalent. It holds no packets itself
//! because the [`Packetizer`](crate::packetizer::Packetizer) only hands over
//! what the buffer can send.

use std::collections::VecDeque;
use std::rc::Rc;

use netsim_engine::sim_error;
use netsim_engine::time::simtime::SimTime;
use netsim_engine::types::{SimError, SimResult};
use netsim_model_builder::{EntityDisplay, EntityGet};
use netsim_track::entity::Entity;
use netsim_track::{enter, exit, trace};

use crate::arbitrator::BandwidthArbitrator;
use crate::packet::Packet;
use crate::packetizer::PacketSink;

/// A packet that has been cleared to leave a buffer.
#[derive(Debug)]
pub struct Departure {
    pub packet: Packet,
    pub head_leaves: SimTime,
    pub tail_leaves: SimTime,

    /// Time the packet spent waiting in this buffer.
    pub local_delay: SimTime,
}

/// Credit for one downstream buffer, split by virtual channel.
pub(crate) struct CreditCounter {
    credits: Vec<usize>,
    max_credits: usize,
}

impl CreditCounter {
    pub(crate) fn new(num_vcs: usize, credits_per_vc: usize) -> Self {
        Self {
            credits: vec![credits_per_vc; num_vcs],
            max_credits: credits_per_vc,
        }
    }

    pub(crate) fn available(&self, vc: usize) -> usize {
        self.credits[vc]
    }

    pub(crate) fn take(&mut self, vc: usize, num_bytes: usize) {
        self.credits[vc] -= num_bytes;
    }

    pub(crate) fn release(&mut self, entity: &Rc<Entity>, vc: usize, num_bytes: usize) -> SimResult {
        let Some(credits) = self.credits.get_mut(vc) else {
            return sim_error!(format!("{entity}: credit for unknown vc{vc}"));
        };
        if *credits + num_bytes > self.max_credits {
            return sim_error!(format!(
                "{entity}: credit overflow on vc{vc} ({} + {num_bytes} > {})",
                *credits, self.max_credits
            ));
        }
        *credits += num_bytes;
        Ok(())
    }
}

/// Output buffer of a switch port.
#[derive(EntityDisplay, EntityGet)]
pub struct NetworkBuffer {
    entity: Rc<Entity>,
    queues: Vec<VecDeque<Packet>>,
    credits: CreditCounter,
    arbitrator: Box<dyn BandwidthArbitrator>,
    accumulate_delay: bool,
    bytes_sent: u64,
}

impl NetworkBuffer {
    /// `credits_per_vc` is the space available to each virtual channel in the
    /// buffer at the far end of the link.
    #[must_use]
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        num_vcs: usize,
        credits_per_vc: usize,
        arbitrator: Box<dyn BandwidthArbitrator>,
        accumulate_delay: bool,
    ) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, name)),
            queues: (0..num_vcs).map(|_| VecDeque::new()).collect(),
            credits: CreditCounter::new(num_vcs, credits_per_vc),
            arbitrator,
            accumulate_delay,
            bytes_sent: 0,
        }
    }

    /// Accept a packet and send whatever can now be sent.
    pub fn handle_payload(
        &mut self,
        now: SimTime,
        mut packet: Packet,
    ) -> Result<Vec<Departure>, SimError> {
        let vc = packet.vc();
        if vc >= self.queues.len() {
            return sim_error!(format!("{}: {packet} on unknown vc{vc}", self.entity));
        }
        enter!(self.entity ; packet.id());
        packet.set_arrival(now);
        self.queues[vc].push_back(packet);
        Ok(self.try_send(now, vc))
    }

    /// Return credit from downstream and send whatever can now be sent.
    pub fn handle_credit(
        &mut self,
        now: SimTime,
        vc: usize,
        num_bytes: usize,
    ) -> Result<Vec<Departure>, SimError> {
        self.credits.release(&self.entity, vc, num_bytes)?;
        Ok(self.try_send(now, vc))
    }

    fn try_send(&mut self, now: SimTime, vc: usize) -> Vec<Departure> {
        let mut departures = Vec::new();
        while let Some(front) = self.queues[vc].front() {
            let num_bytes = front.num_bytes();
            if num_bytes > self.credits.available(vc) {
                trace!(self.entity ; "vc{} blocked: {} needs {} bytes, {} available",
                    vc, front, num_bytes, self.credits.available(vc));
                break;
            }
            let Some(mut packet) = self.queues[vc].pop_front() else {
                break;
            };
            self.credits.take(vc, num_bytes);

            let tx = self
                .arbitrator
                .arbitrate(now, num_bytes, packet.bandwidth());
            let local_delay = tx.head_leaves.saturating_sub(packet.arrival());
            packet.record_delay(local_delay, self.accumulate_delay);
            packet.set_bandwidth(tx.bandwidth);
            self.bytes_sent += num_bytes as u64;

            exit!(self.entity ; packet.id());
            trace!(self.entity ; "send {} {}..{}", packet, tx.head_leaves, tx.tail_leaves);
            departures.push(Departure {
                packet,
                head_leaves: tx.head_leaves,
                tail_leaves: tx.tail_leaves,
                local_delay,
            });
        }
        departures
    }

    /// Number of packets waiting on all virtual channels.
    #[must_use]
    pub fn queue_length(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    #[must_use]
    pub fn credits(&self, vc: usize) -> usize {
        self.credits.available(vc)
    }

    /// True if some packet is waiting for credit.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        !self.queues.iter().all(VecDeque::is_empty)
    }

    #[must_use]
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }
}

/// Endpoint side of the injection link.
#[derive(EntityDisplay, EntityGet)]
pub struct InjectionBuffer {
    entity: Rc<Entity>,
    credits: CreditCounter,
    arbitrator: Box<dyn BandwidthArbitrator>,
    bytes_sent: u64,
}

impl InjectionBuffer {
    /// Injection always uses virtual channel 0 of the switch input buffer.
    #[must_use]
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        credits: usize,
        arbitrator: Box<dyn BandwidthArbitrator>,
    ) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, name)),
            credits: CreditCounter::new(1, credits),
            arbitrator,
            bytes_sent: 0,
        }
    }

    pub fn handle_credit(&mut self, num_bytes: usize) -> SimResult {
        self.credits.release(&self.entity, 0, num_bytes)
    }

    #[must_use]
    pub fn credits(&self) -> usize {
        self.credits.available(0)
    }

    #[must_use]
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }
}

impl PacketSink for InjectionBuffer {
    fn space_to_send(&self, num_bytes: usize) -> bool {
        num_bytes <= self.credits.available(0)
    }

    fn inject(&mut self, now: SimTime, mut packet: Packet) -> Result<Departure, SimError> {
        let num_bytes = packet.num_bytes();
        if !self.space_to_send(num_bytes) {
            return sim_error!(format!(
                "{}: no credit to inject {packet} ({} available)",
                self.entity,
                self.credits.available(0)
            ));
        }
        self.credits.take(0, num_bytes);
        packet.path.vc = 0;

        let tx = self.arbitrator.arbitrate(now, num_bytes, f64::INFINITY);
        packet.set_bandwidth(tx.bandwidth);
        self.bytes_sent += num_bytes as u64;
        trace!(self.entity ; "inject {} {}..{}", packet, tx.head_leaves, tx.tail_leaves);
        Ok(Departure {
            packet,
            head_leaves: tx.head_leaves,
            tail_leaves: tx.tail_leaves,
            local_delay: SimTime::ZERO,
        })
    }
}
