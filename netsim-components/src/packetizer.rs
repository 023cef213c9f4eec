// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Message fragmentation and reassembly at the network endpoints.
//!
//! On the sending side, [`Packetizer::start`] splits a message into packets
//! of at most `packet_size` bytes which are queued per virtual network and
//! handed to a [`PacketSink`] as credit allows. On the receiving side,
//! [`Packetizer::packet_arrived`] counts the bytes of each message and returns
//! the message once all of them have arrived. Messages are told apart by the
//! flow id assigned when they were started, not by their [`MessageId`], so
//! a source may reuse message ids.
//!
//! [`MessageId`]: crate::packet::MessageId

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use netsim_engine::sim_error;
use netsim_engine::time::simtime::SimTime;
use netsim_engine::types::{SimError, SimResult};
use netsim_model_builder::{EntityDisplay, EntityGet};
use netsim_topology::NodeId;
use netsim_track::entity::Entity;
use netsim_track::{create, create_id, debug, trace};
use serde::{Deserialize, Serialize};

use crate::buffer::Departure;
use crate::packet::{Message, Packet};

/// Something packets can be injected into, subject to credit.
pub trait PacketSink {
    fn space_to_send(&self, num_bytes: usize) -> bool;

    fn inject(&mut self, now: SimTime, packet: Packet) -> Result<Departure, SimError>;
}

/// Receives messages from the network.
pub trait MessageNotifier {
    /// A message has been completely received.
    fn notify(&self, vn: usize, message: Rc<Message>) -> SimResult;

    /// The last packet of a message that asked for an acknowledgement has
    /// left the source.
    fn sent(&self, _vn: usize, _message: Rc<Message>) -> SimResult {
        Ok(())
    }

    /// A packet has been completely received.
    fn packet_received(&self, _vn: usize, _packet: &Packet) -> SimResult {
        Ok(())
    }
}

/// How the receiving side accounts for serialization of a packet.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketizerKind {
    /// A packet is delivered as soon as its head reaches the endpoint.
    Simple,

    /// A packet is delivered once its tail has arrived at the rate it was
    /// sent.
    #[default]
    CutThrough,
}

impl fmt::Display for PacketizerKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PacketizerKind::Simple => write!(f, "simple"),
            PacketizerKind::CutThrough => write!(f, "cut_through"),
        }
    }
}

#[derive(EntityDisplay, EntityGet)]
pub struct Packetizer {
    entity: Rc<Entity>,
    packet_size: usize,
    kind: PacketizerKind,
    queues: BTreeMap<usize, VecDeque<Packet>>,

    /// Bytes received so far, per source and flow.
    received: HashMap<(NodeId, u64), usize>,
    next_flow_id: u64,
}

impl Packetizer {
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        packet_size: usize,
        kind: PacketizerKind,
    ) -> Result<Self, SimError> {
        let entity = Rc::new(Entity::new(parent, name));
        if packet_size == 0 {
            return sim_error!(format!("{entity}: packet size must be non-zero"));
        }
        Ok(Self {
            entity,
            packet_size,
            kind,
            queues: BTreeMap::new(),
            received: HashMap::new(),
            next_flow_id: 0,
        })
    }

    #[must_use]
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    #[must_use]
    pub fn kind(&self) -> PacketizerKind {
        self.kind
    }

    /// Split a message into packets and queue them on virtual network `vn`.
    ///
    /// A zero-length message still produces one (empty) packet so that it
    /// reaches the destination.
    pub fn start(&mut self, vn: usize, message: Rc<Message>) {
        let flow_id = self.next_flow_id;
        self.next_flow_id += 1;
        debug!(self.entity ; "start {} on vn{}", message, vn);

        let queue = self.queues.entry(vn).or_default();
        let total = message.num_bytes();
        let mut offset = 0;
        loop {
            let num_bytes = self.packet_size.min(total - offset);
            let packet = Packet::new(
                create_id!(self.entity),
                message.clone(),
                offset,
                num_bytes,
                flow_id,
                vn,
            );
            create!(self.entity ; packet.id(), num_bytes, packet);
            queue.push_back(packet);
            offset += num_bytes;
            if offset >= total {
                break;
            }
        }
    }

    /// Inject queued packets of virtual network `vn`, in order, for as long as
    /// the sink has space for the next one.
    pub fn send_what_you_can<S>(
        &mut self,
        now: SimTime,
        vn: usize,
        sink: &mut S,
    ) -> Result<Vec<Departure>, SimError>
    where
        S: PacketSink + ?Sized,
    {
        let mut departures = Vec::new();
        let Some(queue) = self.queues.get_mut(&vn) else {
            return Ok(departures);
        };
        while let Some(front) = queue.front() {
            if !sink.space_to_send(front.num_bytes()) {
                trace!(self.entity ; "vn{} waiting for credit for {}", vn, front);
                break;
            }
            let Some(packet) = queue.pop_front() else {
                break;
            };
            departures.push(sink.inject(now, packet)?);
        }
        if queue.is_empty() {
            self.queues.remove(&vn);
        }
        Ok(departures)
    }

    /// Virtual networks that still have packets to send.
    #[must_use]
    pub fn pending_vns(&self) -> Vec<usize> {
        self.queues.keys().copied().collect()
    }

    #[must_use]
    pub fn num_queued(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    /// Extra time between a packet's head reaching the endpoint and the
    /// packet being complete.
    #[must_use]
    pub fn arrival_delay(&self, packet: &Packet) -> SimTime {
        match self.kind {
            PacketizerKind::Simple => SimTime::ZERO,
            PacketizerKind::CutThrough => {
                SimTime::serialization(packet.num_bytes(), packet.bandwidth())
            }
        }
    }

    /// Account for a received packet, returning its message if this was the
    /// last outstanding part of it.
    pub fn packet_arrived(
        &mut self,
        vn: usize,
        packet: &Packet,
    ) -> Result<Option<Rc<Message>>, SimError> {
        let message = packet.message();
        let key = (message.src(), packet.flow_id());
        let received = self.received.entry(key).or_insert(0);
        *received += packet.num_bytes();
        trace!(self.entity ; "vn{}: {} ({}/{} bytes)", vn, packet, *received, message.num_bytes());

        if *received > message.num_bytes() {
            return sim_error!(format!(
                "{}: received {} bytes of {message}",
                self.entity, *received
            ));
        }
        if *received == message.num_bytes() {
            self.received.remove(&key);
            debug!(self.entity ; "vn{}: received {}", vn, message);
            return Ok(Some(message.clone()));
        }
        Ok(None)
    }

    /// Messages partially received.
    #[must_use]
    pub fn num_incomplete(&self) -> usize {
        self.received.len()
    }
}
