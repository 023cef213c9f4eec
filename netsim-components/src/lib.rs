// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The building blocks of a packet-flow network.
//!
//! The components in this crate are plain state machines: they are told the
//! current time and what has happened (a packet or credit has arrived) and
//! return what should happen next, typically a list of
//! [`Departure`](buffer::Departure)s with the times at which each packet
//! starts and finishes leaving. The switch and endpoint models turn these
//! into scheduled events.
//!
//! A packet flows through:
//!  - the [`Packetizer`](packetizer::Packetizer) of the source endpoint,
//!  - the endpoint's [`InjectionBuffer`](buffer::InjectionBuffer),
//!  - the [`Crossbar`](crossbar::Crossbar) of every switch on the route and
//!    the [`NetworkBuffer`](buffer::NetworkBuffer) of the chosen output port,
//!  - the [`Packetizer`](packetizer::Packetizer) of the destination endpoint
//!    which reassembles the message.
//!
//! Every buffer only sends a packet when it holds enough
//! [`Credit`](packet::Credit) for the downstream buffer, and returns credit
//! upstream once a packet has left.

pub mod arbitrator;
pub mod buffer;
pub mod crossbar;
pub mod packet;
pub mod packetizer;
pub mod policy;
pub mod stats;
