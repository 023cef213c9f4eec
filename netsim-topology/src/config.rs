// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Topology configuration.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    #[default]
    FatTree,
    Torus,
}

/// Geometry of the network.
///
/// - `fat_tree`: `geometry = [levels, radix]`, optional `tapering` with one
///   factor per level below the top.
/// - `torus`: `geometry` has one size per dimension, optional `redundancy`
///   with one link multiplier per dimension.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TopologyConfig {
    pub kind: TopologyKind,
    pub geometry: Vec<usize>,
    pub concentration: usize,
    pub redundancy: Vec<usize>,
    pub tapering: Vec<f64>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            kind: TopologyKind::FatTree,
            geometry: vec![2, 4],
            concentration: 1,
            redundancy: Vec::new(),
            tapering: Vec::new(),
        }
    }
}
