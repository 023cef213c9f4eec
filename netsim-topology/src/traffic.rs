// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Synthetic traffic patterns that pick a destination endpoint for every
//! source endpoint.

use std::fmt;
use std::str::FromStr;

use netsim_engine::sim_error;
use netsim_engine::types::SimError;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{NodeId, StructuredTopology, Topology};

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrafficPattern {
    /// A random endpoint other than the source.
    #[default]
    Uniform,

    /// The matching endpoint on the next leaf switch (`+1` in dimension 0 of
    /// a torus).
    NearestNeighbor,

    /// The matching endpoint half-way around every dimension.
    Tornado,

    /// The endpoint whose id is the bitwise complement of the source.
    BitComplement,
}

impl TrafficPattern {
    /// Pick the destination for `src`.
    pub fn destination<R: Rng>(
        &self,
        topology: &Topology,
        src: NodeId,
        rng: &mut R,
    ) -> Result<NodeId, SimError> {
        let num_endpoints = topology.num_endpoints();
        if src >= num_endpoints {
            return sim_error!(format!(
                "endpoint {src} out of range ({num_endpoints} endpoints)"
            ));
        }

        match self {
            TrafficPattern::Uniform => {
                if num_endpoints < 2 {
                    return sim_error!("uniform traffic needs at least two endpoints");
                }
                let dst = rng.gen_range(0..num_endpoints - 1);
                Ok(if dst >= src { dst + 1 } else { dst })
            }
            TrafficPattern::NearestNeighbor => Ok(shift_leaf(topology, src, |coords, dims| {
                coords[0] = (coords[0] + 1) % dims[0];
            })),
            TrafficPattern::Tornado => Ok(shift_leaf(topology, src, |coords, dims| {
                for (coord, size) in coords.iter_mut().zip(dims) {
                    *coord = (*coord + (size - 1) / 2) % size;
                }
            })),
            TrafficPattern::BitComplement => {
                if !num_endpoints.is_power_of_two() {
                    return sim_error!(format!(
                        "bit-complement traffic needs a power-of-two endpoint count, got {num_endpoints}"
                    ));
                }
                Ok(!src & (num_endpoints - 1))
            }
        }
    }
}

/// Move `src` to the same local endpoint on another leaf switch.
///
/// Leaves are treated as a torus for tori and as a ring for fat-trees.
fn shift_leaf<F>(topology: &Topology, src: NodeId, shift: F) -> NodeId
where
    F: Fn(&mut [usize], &[usize]),
{
    let concentration = topology.concentration();
    let (leaf_index, local) = (src / concentration, src % concentration);

    let dst_leaf_index = match topology {
        Topology::Torus(torus) => {
            let mut coords = torus.compute_switch_coords(leaf_index);
            shift(&mut coords, torus.dims());
            crate::coords::linearize(&coords, torus.dims())
                .unwrap_or_else(|| unreachable!("shift keeps coordinates in range"))
        }
        Topology::FatTree(_) => {
            let num_leaves = topology.num_leaf_switches();
            let mut coords = [leaf_index];
            shift(&mut coords, &[num_leaves]);
            coords[0]
        }
    };
    dst_leaf_index * concentration + local
}

impl fmt::Display for TrafficPattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            TrafficPattern::Uniform => "uniform",
            TrafficPattern::NearestNeighbor => "nearest-neighbor",
            TrafficPattern::Tornado => "tornado",
            TrafficPattern::BitComplement => "bit-complement",
        };
        write!(f, "{name}")
    }
}

impl FromStr for TrafficPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('_', "-").as_str() {
            "uniform" => Ok(TrafficPattern::Uniform),
            "nearest-neighbor" => Ok(TrafficPattern::NearestNeighbor),
            "tornado" => Ok(TrafficPattern::Tornado),
            "bit-complement" => Ok(TrafficPattern::BitComplement),
            _ => Err(format!("unknown traffic pattern '{s}'")),
        }
    }
}
