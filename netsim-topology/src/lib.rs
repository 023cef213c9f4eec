// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Network topologies.
//!
//! A [`Topology`] is an immutable description of the switches of a network,
//! how their ports are wired together and how a packet picks its next hop.
//! It is built once from a [`TopologyConfig`](config::TopologyConfig) and
//! shared read-only by every switch.
//!
//! Two families are provided:
//!  - [`FatTree`](fat_tree::FatTree): `L` levels of radix-`K` switches using
//!    up/down routing.
//!  - [`Torus`](torus::Torus): an N-dimensional torus using dimension-order
//!    routing with a virtual-channel escape on wrap-around links.
//!
//! Endpoints (network interfaces) attach to *leaf* switches. Each leaf has
//! `concentration` endpoints, which use the ports numbered after the network
//! ports of the switch.

use netsim_engine::types::SimError;

pub mod config;
pub mod coords;
pub mod fat_tree;
pub mod torus;
pub mod traffic;

use crate::config::{TopologyConfig, TopologyKind};
use crate::fat_tree::FatTree;
use crate::torus::Torus;

pub type SwitchId = usize;
pub type NodeId = usize;
pub type Coordinates = Vec<usize>;

/// Routing state carried by a packet.
///
/// `outport` and `vc` are the result of the most recent routing decision.
/// `wrapped` holds one "crossed a wrap-around link" flag per torus dimension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoutingPath {
    pub outport: usize,
    pub vc: usize,
    pub wrapped: u64,
}

impl RoutingPath {
    #[must_use]
    pub fn is_wrapped(&self, dim: usize) -> bool {
        self.wrapped & (1 << dim) != 0
    }

    pub fn set_wrapped(&mut self, dim: usize) {
        self.wrapped |= 1 << dim;
    }

    pub fn clear_wrapped(&mut self, dim: usize) {
        self.wrapped &= !(1 << dim);
    }
}

/// A directed link between two switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connection {
    pub src: SwitchId,
    pub dst: SwitchId,
    pub src_outport: usize,
    pub dst_inport: usize,
}

/// The contract shared by all topologies.
pub trait StructuredTopology {
    fn num_switches(&self) -> usize;

    /// Number of switches that have endpoints attached.
    fn num_leaf_switches(&self) -> usize;

    /// The `index`-th switch that has endpoints attached.
    fn leaf_switch(&self, index: usize) -> SwitchId;

    /// Number of switch-to-switch ports on every switch. Endpoint ports are
    /// numbered from here.
    fn num_network_ports(&self) -> usize;

    fn num_vcs(&self) -> usize {
        2
    }

    fn concentration(&self) -> usize;

    fn switch_number(&self, coords: &[usize]) -> Result<SwitchId, SimError>;

    fn compute_switch_coords(&self, id: SwitchId) -> Coordinates;

    /// Coordinates of the switch reached through `port` of switch `id`.
    fn neighbor_at_port(&self, id: SwitchId, port: usize) -> Result<Coordinates, SimError>;

    /// Choose the next hop from `src` towards `dst`. `src` and `dst` must be
    /// different switches.
    fn minimal_route_to_switch(&self, src: SwitchId, dst: SwitchId, path: &mut RoutingPath);

    /// Choose the next hop using coordinates directly.
    ///
    /// # Panics
    ///
    /// Topologies whose routing is not defined on coordinates panic.
    fn minimal_route_to_coords(&self, src: &[usize], dst: &[usize], path: &mut RoutingPath);

    fn minimal_distance(&self, src: SwitchId, dst: SwitchId) -> usize;

    /// All links leaving switch `src`.
    fn connected_outports(&self, src: SwitchId) -> Vec<Connection>;

    /// Multiplier applied to the bandwidth and buffering of a port.
    fn port_scale(&self, switch: SwitchId, port: usize) -> f64;

    fn num_endpoints(&self) -> usize {
        self.num_leaf_switches() * self.concentration()
    }

    fn max_num_ports(&self) -> usize {
        self.num_network_ports() + self.concentration()
    }

    fn is_endpoint_port(&self, port: usize) -> bool {
        port >= self.num_network_ports() && port < self.max_num_ports()
    }

    /// The switch an endpoint is attached to and the port it uses.
    fn endpoint_to_switch(&self, node: NodeId) -> (SwitchId, usize) {
        let concentration = self.concentration();
        (
            self.leaf_switch(node / concentration),
            self.num_network_ports() + node % concentration,
        )
    }

    fn num_hops_to_endpoint(&self, src: NodeId, dst: NodeId) -> usize {
        let (src_switch, _) = self.endpoint_to_switch(src);
        let (dst_switch, _) = self.endpoint_to_switch(dst);
        self.minimal_distance(src_switch, dst_switch)
    }
}

/// The set of supported topologies.
#[derive(Clone, Debug)]
pub enum Topology {
    FatTree(FatTree),
    Torus(Torus),
}

macro_rules! dispatch {
    ($self:ident, $topology:ident => $call:expr) => {
        match $self {
            Topology::FatTree($topology) => $call,
            Topology::Torus($topology) => $call,
        }
    };
}

impl Topology {
    /// Build a topology, checking the geometry.
    pub fn from_config(config: &TopologyConfig) -> Result<Self, SimError> {
        match config.kind {
            TopologyKind::FatTree => {
                if config.geometry.len() != 2 {
                    return Err(SimError(format!(
                        "fat-tree geometry needs 2 parameters [levels, radix], got {:?}",
                        config.geometry
                    )));
                }
                Ok(Topology::FatTree(FatTree::new(
                    config.geometry[0],
                    config.geometry[1],
                    config.concentration,
                    &config.tapering,
                )?))
            }
            TopologyKind::Torus => Ok(Topology::Torus(Torus::new(
                &config.geometry,
                &config.redundancy,
                config.concentration,
            )?)),
        }
    }
}

impl StructuredTopology for Topology {
    fn num_switches(&self) -> usize {
        dispatch!(self, t => t.num_switches())
    }

    fn num_leaf_switches(&self) -> usize {
        dispatch!(self, t => t.num_leaf_switches())
    }

    fn leaf_switch(&self, index: usize) -> SwitchId {
        dispatch!(self, t => t.leaf_switch(index))
    }

    fn num_network_ports(&self) -> usize {
        dispatch!(self, t => t.num_network_ports())
    }

    fn num_vcs(&self) -> usize {
        dispatch!(self, t => t.num_vcs())
    }

    fn concentration(&self) -> usize {
        dispatch!(self, t => t.concentration())
    }

    fn switch_number(&self, coords: &[usize]) -> Result<SwitchId, SimError> {
        dispatch!(self, t => t.switch_number(coords))
    }

    fn compute_switch_coords(&self, id: SwitchId) -> Coordinates {
        dispatch!(self, t => t.compute_switch_coords(id))
    }

    fn neighbor_at_port(&self, id: SwitchId, port: usize) -> Result<Coordinates, SimError> {
        dispatch!(self, t => t.neighbor_at_port(id, port))
    }

    fn minimal_route_to_switch(&self, src: SwitchId, dst: SwitchId, path: &mut RoutingPath) {
        dispatch!(self, t => t.minimal_route_to_switch(src, dst, path))
    }

    fn minimal_route_to_coords(&self, src: &[usize], dst: &[usize], path: &mut RoutingPath) {
        dispatch!(self, t => t.minimal_route_to_coords(src, dst, path))
    }

    fn minimal_distance(&self, src: SwitchId, dst: SwitchId) -> usize {
        dispatch!(self, t => t.minimal_distance(src, dst))
    }

    fn connected_outports(&self, src: SwitchId) -> Vec<Connection> {
        dispatch!(self, t => t.connected_outports(src))
    }

    fn port_scale(&self, switch: SwitchId, port: usize) -> f64 {
        dispatch!(self, t => t.port_scale(switch, port))
    }
}
