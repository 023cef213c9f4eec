// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! An N-dimensional torus.
//!
//! Every dimension wraps modulo its size. Port `2 * dim` leads in the
//! positive direction of `dim` and port `2 * dim + 1` in the negative
//! direction. Dimensions of size 1 have no links, so those ports are left
//! unpopulated.
//!
//! Routing is dimension-order: the lowest dimension in which the current
//! switch differs from the destination is corrected first, travelling in the
//! shorter direction (positive on a tie). Once a packet crosses the
//! wrap-around link of a dimension it moves to virtual channel 1 until it
//! reaches the destination coordinate of that dimension.

use netsim_engine::sim_error;
use netsim_engine::types::SimError;

use crate::coords::{delinearize, linearize};
use crate::{Connection, Coordinates, RoutingPath, StructuredTopology, SwitchId};

const POS: usize = 0;
const NEG: usize = 1;

/// Flags are kept in a `u64`.
const MAX_DIMS: usize = 64;

#[derive(Clone, Debug)]
pub struct Torus {
    dims: Vec<usize>,
    redundancy: Vec<usize>,
    concentration: usize,
    num_switches: usize,
}

#[must_use]
pub fn convert_to_port(dim: usize, dir: usize) -> usize {
    2 * dim + dir
}

/// Whether travelling in the positive direction is no longer than the
/// negative one.
fn shortest_path_positive(src: usize, dst: usize, size: usize) -> bool {
    let (up, down) = if dst > src {
        (dst - src, src + size - dst)
    } else {
        (dst + size - src, src - dst)
    };
    up <= down
}

fn shortest_distance(src: usize, dst: usize, size: usize) -> usize {
    let up = (dst + size - src) % size;
    let down = (src + size - dst) % size;
    up.min(down)
}

impl Torus {
    pub fn new(
        dims: &[usize],
        redundancy: &[usize],
        concentration: usize,
    ) -> Result<Self, SimError> {
        if dims.is_empty() || dims.len() > MAX_DIMS {
            return sim_error!(format!(
                "torus geometry needs between 1 and {MAX_DIMS} dimensions, got {dims:?}"
            ));
        }
        if dims.contains(&0) {
            return sim_error!(format!("torus dimensions must be non-zero, got {dims:?}"));
        }
        if concentration == 0 {
            return sim_error!("torus concentration must be at least 1");
        }

        let redundancy = if redundancy.is_empty() {
            vec![1; dims.len()]
        } else if redundancy.len() != dims.len() || redundancy.contains(&0) {
            return sim_error!(format!(
                "torus redundancy must have one non-zero entry per dimension {dims:?}, got {redundancy:?}"
            ));
        } else {
            redundancy.to_vec()
        };

        let Some(num_switches) = dims
            .iter()
            .try_fold(1usize, |acc, &size| acc.checked_mul(size))
        else {
            return sim_error!(format!("torus {dims:?} is too large"));
        };

        Ok(Self {
            dims: dims.to_vec(),
            redundancy,
            concentration,
            num_switches,
        })
    }

    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    #[must_use]
    pub fn ndims(&self) -> usize {
        self.dims.len()
    }

    fn coords_of(&self, id: SwitchId) -> Coordinates {
        assert!(
            id < self.num_switches,
            "switch {id} is not part of a torus of {} switches",
            self.num_switches
        );
        delinearize(id, &self.dims)
    }

    fn step(&self, coords: &mut [usize], dim: usize, dir: usize) {
        let size = self.dims[dim];
        coords[dim] = if dir == POS {
            (coords[dim] + 1) % size
        } else {
            (coords[dim] + size - 1) % size
        };
    }

    fn up_path(&self, dim: usize, src: usize, dst: usize, path: &mut RoutingPath) {
        let size = self.dims[dim];
        let reset = (src + 1) % size == dst;
        let wrapped = src == size - 1;
        path.outport = convert_to_port(dim, POS);
        self.pick_vc(dim, wrapped, reset, path);
    }

    fn down_path(&self, dim: usize, src: usize, dst: usize, path: &mut RoutingPath) {
        let size = self.dims[dim];
        let reset = src == (dst + 1) % size;
        let wrapped = src == 0;
        path.outport = convert_to_port(dim, NEG);
        self.pick_vc(dim, wrapped, reset, path);
    }

    fn pick_vc(&self, dim: usize, wrapped: bool, reset: bool, path: &mut RoutingPath) {
        if wrapped {
            path.set_wrapped(dim);
        }
        path.vc = usize::from(path.is_wrapped(dim));
        if reset {
            path.clear_wrapped(dim);
        }
    }
}

impl StructuredTopology for Torus {
    fn num_switches(&self) -> usize {
        self.num_switches
    }

    fn num_leaf_switches(&self) -> usize {
        self.num_switches
    }

    fn leaf_switch(&self, index: usize) -> SwitchId {
        index
    }

    fn num_network_ports(&self) -> usize {
        2 * self.ndims()
    }

    fn concentration(&self) -> usize {
        self.concentration
    }

    fn switch_number(&self, coords: &[usize]) -> Result<SwitchId, SimError> {
        match linearize(coords, &self.dims) {
            Some(id) => Ok(id),
            None => sim_error!(format!(
                "torus coordinates {coords:?} are not valid for dimensions {:?}",
                self.dims
            )),
        }
    }

    fn compute_switch_coords(&self, id: SwitchId) -> Coordinates {
        self.coords_of(id)
    }

    fn neighbor_at_port(&self, id: SwitchId, port: usize) -> Result<Coordinates, SimError> {
        if port >= self.num_network_ports() {
            return sim_error!(format!("torus switch {id} has no network port {port}"));
        }
        let (dim, dir) = (port / 2, port % 2);
        if self.dims[dim] == 1 {
            return sim_error!(format!(
                "torus switch {id} has no neighbor on port {port}: dimension {dim} has size 1"
            ));
        }
        let mut coords = self.coords_of(id);
        self.step(&mut coords, dim, dir);
        Ok(coords)
    }

    fn minimal_route_to_switch(&self, src: SwitchId, dst: SwitchId, path: &mut RoutingPath) {
        let src_coords = self.coords_of(src);
        let dst_coords = self.coords_of(dst);
        self.minimal_route_to_coords(&src_coords, &dst_coords, path);
    }

    fn minimal_route_to_coords(&self, src: &[usize], dst: &[usize], path: &mut RoutingPath) {
        let Some(dim) = (0..self.ndims()).find(|&dim| src[dim] != dst[dim]) else {
            panic!("torus route requested from {src:?} to itself");
        };
        if shortest_path_positive(src[dim], dst[dim], self.dims[dim]) {
            self.up_path(dim, src[dim], dst[dim], path);
        } else {
            self.down_path(dim, src[dim], dst[dim], path);
        }
    }

    fn minimal_distance(&self, src: SwitchId, dst: SwitchId) -> usize {
        let src_coords = self.coords_of(src);
        let dst_coords = self.coords_of(dst);
        src_coords
            .iter()
            .zip(&dst_coords)
            .zip(&self.dims)
            .map(|((&s, &d), &size)| shortest_distance(s, d, size))
            .sum()
    }

    fn connected_outports(&self, src: SwitchId) -> Vec<Connection> {
        let coords = self.coords_of(src);
        let mut connections = Vec::new();
        for dim in 0..self.ndims() {
            if self.dims[dim] == 1 {
                continue;
            }
            for (dir, opposite) in [(POS, NEG), (NEG, POS)] {
                let mut neighbor = coords.clone();
                self.step(&mut neighbor, dim, dir);
                connections.push(Connection {
                    src,
                    dst: linearize(&neighbor, &self.dims).unwrap_or_else(|| {
                        unreachable!("step keeps coordinates in range")
                    }),
                    src_outport: convert_to_port(dim, dir),
                    dst_inport: convert_to_port(dim, opposite),
                });
            }
        }
        connections
    }

    fn port_scale(&self, _switch: SwitchId, port: usize) -> f64 {
        if port < self.num_network_ports() {
            self.redundancy[port / 2] as f64
        } else {
            1.0
        }
    }
}
