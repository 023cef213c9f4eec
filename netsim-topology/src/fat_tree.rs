// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! A fat tree of `L` levels of radix-`K` switches.
//!
//! Level 0 holds the `K^(L-1)` leaf switches and level `l` holds
//! `K^(L-1-l)` switches. Switch ids are allocated level by level, so the
//! coordinates of a switch are `[level, offset]`.
//!
//! Ports `0..K` lead down to the children of a switch and port `K` leads up
//! to its parent. A link between level `l` and `l + 1` carries the traffic
//! of `K^l` leaves so it is made `K^l` times fatter, optionally reduced by a
//! per-level tapering factor.
//!
//! Routing is up/down: a packet climbs (virtual channel 0) until it reaches
//! an ancestor of the destination and then descends (virtual channel 1). A
//! path therefore turns at most once, so there is no cyclic channel
//! dependency.

use netsim_engine::sim_error;
use netsim_engine::types::SimError;

use crate::{Connection, Coordinates, RoutingPath, StructuredTopology, SwitchId};

const UP_VC: usize = 0;
const DOWN_VC: usize = 1;

#[derive(Clone, Debug)]
pub struct FatTree {
    num_levels: usize,
    radix: usize,
    concentration: usize,

    /// Id of the first switch of each level, plus the total switch count.
    level_offsets: Vec<usize>,

    tapering: Vec<f64>,
}

impl FatTree {
    pub fn new(
        num_levels: usize,
        radix: usize,
        concentration: usize,
        tapering: &[f64],
    ) -> Result<Self, SimError> {
        if num_levels == 0 {
            return sim_error!("fat-tree must have at least one level");
        }
        if radix < 2 {
            return sim_error!(format!("fat-tree radix must be at least 2, got {radix}"));
        }
        if concentration == 0 {
            return sim_error!("fat-tree concentration must be at least 1");
        }

        let tapering = if tapering.is_empty() {
            vec![1.0; num_levels - 1]
        } else if tapering.len() != num_levels - 1 {
            return sim_error!(format!(
                "fat-tree tapering needs {} entries (one per level below the top), got {}",
                num_levels - 1,
                tapering.len()
            ));
        } else {
            tapering.to_vec()
        };
        if let Some(bad) = tapering.iter().find(|t| !(**t > 0.0)) {
            return sim_error!(format!("fat-tree tapering factors must be positive, got {bad}"));
        }

        let mut level_offsets = Vec::with_capacity(num_levels + 1);
        let mut offset = 0usize;
        for level in 0..num_levels {
            level_offsets.push(offset);
            let Some(size) = radix
                .checked_pow((num_levels - 1 - level) as u32)
                .and_then(|size| offset.checked_add(size).map(|_| size))
            else {
                return sim_error!(format!(
                    "fat-tree with {num_levels} levels of radix {radix} is too large"
                ));
            };
            offset += size;
        }
        level_offsets.push(offset);

        Ok(Self {
            num_levels,
            radix,
            concentration,
            level_offsets,
            tapering,
        })
    }

    #[must_use]
    pub fn num_levels(&self) -> usize {
        self.num_levels
    }

    #[must_use]
    pub fn radix(&self) -> usize {
        self.radix
    }

    #[must_use]
    pub fn up_port(&self) -> usize {
        self.radix
    }

    #[must_use]
    pub fn num_switches_at_level(&self, level: usize) -> usize {
        self.level_offsets[level + 1] - self.level_offsets[level]
    }

    /// Returns `(level, offset)` of a switch.
    ///
    /// # Panics
    ///
    /// If `id` is not a switch of this tree.
    #[must_use]
    pub fn level_and_offset(&self, id: SwitchId) -> (usize, usize) {
        assert!(
            id < self.num_switches(),
            "switch {id} is not part of a fat-tree of {} switches",
            self.num_switches()
        );
        let level = self.level_offsets.partition_point(|&first| first <= id) - 1;
        (level, id - self.level_offsets[level])
    }

    fn id_of(&self, level: usize, offset: usize) -> SwitchId {
        self.level_offsets[level] + offset
    }

    fn link_scale(&self, lower_level: usize) -> f64 {
        self.radix.pow(lower_level as u32) as f64 * self.tapering[lower_level]
    }
}

impl StructuredTopology for FatTree {
    fn num_switches(&self) -> usize {
        self.level_offsets[self.num_levels]
    }

    fn num_leaf_switches(&self) -> usize {
        self.num_switches_at_level(0)
    }

    fn leaf_switch(&self, index: usize) -> SwitchId {
        index
    }

    fn num_network_ports(&self) -> usize {
        self.radix + 1
    }

    fn concentration(&self) -> usize {
        self.concentration
    }

    fn switch_number(&self, coords: &[usize]) -> Result<SwitchId, SimError> {
        let [level, offset] = coords else {
            return sim_error!(format!(
                "fat-tree coordinates are [level, offset], got {coords:?}"
            ));
        };
        if *level >= self.num_levels || *offset >= self.num_switches_at_level(*level) {
            return sim_error!(format!("fat-tree coordinates {coords:?} out of range"));
        }
        Ok(self.id_of(*level, *offset))
    }

    fn compute_switch_coords(&self, id: SwitchId) -> Coordinates {
        let (level, offset) = self.level_and_offset(id);
        vec![level, offset]
    }

    fn neighbor_at_port(&self, id: SwitchId, port: usize) -> Result<Coordinates, SimError> {
        let (level, offset) = self.level_and_offset(id);
        if port == self.radix {
            if level + 1 == self.num_levels {
                return sim_error!(format!("fat-tree switch {id} is a root and has no parent"));
            }
            Ok(vec![level + 1, offset / self.radix])
        } else if port < self.radix {
            if level == 0 {
                return sim_error!(format!(
                    "fat-tree switch {id} is a leaf and has no switch on port {port}"
                ));
            }
            Ok(vec![level - 1, offset * self.radix + port])
        } else {
            sim_error!(format!(
                "fat-tree switch {id} has no network port {port}"
            ))
        }
    }

    fn minimal_route_to_switch(&self, src: SwitchId, dst: SwitchId, path: &mut RoutingPath) {
        let (src_level, src_offset) = self.level_and_offset(src);
        let (dst_level, dst_offset) = self.level_and_offset(dst);

        if dst_level < src_level {
            // Find the ancestor of the destination at this level
            let mut offset = dst_offset;
            let mut down_port = 0;
            for _ in dst_level..src_level {
                down_port = offset % self.radix;
                offset /= self.radix;
            }
            if offset == src_offset {
                path.outport = down_port;
                path.vc = DOWN_VC;
                return;
            }
        }

        assert!(
            src_level + 1 < self.num_levels,
            "fat-tree root {src} cannot reach switch {dst}"
        );
        path.outport = self.up_port();
        path.vc = UP_VC;
    }

    fn minimal_route_to_coords(&self, src: &[usize], dst: &[usize], _path: &mut RoutingPath) {
        unimplemented!(
            "fat-tree up/down routing is defined on switch ids, not coordinates ({src:?} -> {dst:?})"
        );
    }

    fn minimal_distance(&self, src: SwitchId, dst: SwitchId) -> usize {
        let (mut src_level, mut src_offset) = self.level_and_offset(src);
        let (mut dst_level, mut dst_offset) = self.level_and_offset(dst);
        let mut hops = 0;
        while (src_level, src_offset) != (dst_level, dst_offset) {
            if src_level <= dst_level {
                src_level += 1;
                src_offset /= self.radix;
                hops += 1;
            }
            if dst_level < src_level {
                dst_level += 1;
                dst_offset /= self.radix;
                hops += 1;
            }
        }
        hops
    }

    fn connected_outports(&self, src: SwitchId) -> Vec<Connection> {
        let (level, offset) = self.level_and_offset(src);
        let mut connections = Vec::new();
        if level > 0 {
            for port in 0..self.radix {
                connections.push(Connection {
                    src,
                    dst: self.id_of(level - 1, offset * self.radix + port),
                    src_outport: port,
                    dst_inport: self.up_port(),
                });
            }
        }
        if level + 1 < self.num_levels {
            connections.push(Connection {
                src,
                dst: self.id_of(level + 1, offset / self.radix),
                src_outport: self.up_port(),
                dst_inport: offset % self.radix,
            });
        }
        connections
    }

    fn port_scale(&self, switch: SwitchId, port: usize) -> f64 {
        let (level, _) = self.level_and_offset(switch);
        if port == self.up_port() && level + 1 < self.num_levels {
            self.link_scale(level)
        } else if port < self.radix && level > 0 {
            self.link_scale(level - 1)
        } else {
            1.0
        }
    }
}
