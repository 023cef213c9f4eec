// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Messages, the packets they are split into, and credits.

use std::fmt;
use std::rc::Rc;

use netsim_engine::time::simtime::SimTime;
use netsim_topology::{NodeId, RoutingPath};
use netsim_track::Id;

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An application-level message.
///
/// Only the length and envelope are used by the network, the contents belong
/// to the layer above.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    id: MessageId,
    src: NodeId,
    dst: NodeId,
    num_bytes: usize,
    needs_ack: bool,
}

impl Message {
    #[must_use]
    pub fn new(id: MessageId, src: NodeId, dst: NodeId, num_bytes: usize) -> Self {
        Self {
            id,
            src,
            dst,
            num_bytes,
            needs_ack: false,
        }
    }

    /// Request a notification at the source once the whole message has been
    /// injected.
    #[must_use]
    pub fn with_ack(mut self) -> Self {
        self.needs_ack = true;
        self
    }

    #[must_use]
    pub fn id(&self) -> MessageId {
        self.id
    }

    #[must_use]
    pub fn src(&self) -> NodeId {
        self.src
    }

    #[must_use]
    pub fn dst(&self) -> NodeId {
        self.dst
    }

    #[must_use]
    pub fn num_bytes(&self) -> usize {
        self.num_bytes
    }

    #[must_use]
    pub fn needs_ack(&self) -> bool {
        self.needs_ack
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "msg{} {}->{} ({} bytes)",
            self.id, self.src, self.dst, self.num_bytes
        )
    }
}

/// A fragment of a [`Message`].
#[derive(Clone, Debug)]
pub struct Packet {
    id: Id,
    message: Rc<Message>,
    offset: usize,
    num_bytes: usize,
    flow_id: u64,
    vn: usize,

    /// Routing decision for the next hop.
    pub path: RoutingPath,

    /// Congestion delay seen so far.
    delay: SimTime,

    /// When the head of the packet reached the buffer currently holding it.
    arrival: SimTime,

    /// Rate, in bytes/ns, at which the packet is arriving.
    bandwidth: f64,
}

impl Packet {
    #[must_use]
    pub fn new(
        id: Id,
        message: Rc<Message>,
        offset: usize,
        num_bytes: usize,
        flow_id: u64,
        vn: usize,
    ) -> Self {
        Self {
            id,
            message,
            offset,
            num_bytes,
            flow_id,
            vn,
            path: RoutingPath::default(),
            delay: SimTime::ZERO,
            arrival: SimTime::ZERO,
            bandwidth: f64::INFINITY,
        }
    }

    #[must_use]
    pub fn id(&self) -> Id {
        self.id
    }

    #[must_use]
    pub fn message(&self) -> &Rc<Message> {
        &self.message
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn num_bytes(&self) -> usize {
        self.num_bytes
    }

    #[must_use]
    pub fn flow_id(&self) -> u64 {
        self.flow_id
    }

    #[must_use]
    pub fn vn(&self) -> usize {
        self.vn
    }

    #[must_use]
    pub fn vc(&self) -> usize {
        self.path.vc
    }

    #[must_use]
    pub fn src(&self) -> NodeId {
        self.message.src()
    }

    #[must_use]
    pub fn dst(&self) -> NodeId {
        self.message.dst()
    }

    #[must_use]
    pub fn delay(&self) -> SimTime {
        self.delay
    }

    /// Record congestion delay seen at one hop, either adding it to the
    /// total or replacing the previous hop's delay.
    pub fn record_delay(&mut self, local: SimTime, accumulate: bool) {
        if accumulate {
            self.delay += local;
        } else {
            self.delay = local;
        }
    }

    #[must_use]
    pub fn arrival(&self) -> SimTime {
        self.arrival
    }

    pub fn set_arrival(&mut self, now: SimTime) {
        self.arrival = now;
    }

    #[must_use]
    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn set_bandwidth(&mut self, bandwidth: f64) {
        self.bandwidth = bandwidth;
    }

    /// Whether this is the final packet of its message.
    #[must_use]
    pub fn is_tail(&self) -> bool {
        self.offset + self.num_bytes >= self.message.num_bytes()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "pkt{} of msg{} {}->{} [{}+{}] vc{}",
            self.id,
            self.message.id(),
            self.src(),
            self.dst(),
            self.offset,
            self.num_bytes,
            self.path.vc
        )
    }
}

/// Permission to send `num_bytes` more on virtual channel `vc` of `port`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Credit {
    pub port: usize,
    pub vc: usize,
    pub num_bytes: usize,
}

impl fmt::Display for Credit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "credit port{} vc{} {} bytes",
            self.port, self.vc, self.num_bytes
        )
    }
}
