// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Policies used to choose between input ports competing for one output.

use std::fmt;
use std::rc::Rc;

use netsim_track::entity::Entity;
use netsim_track::trace;
use serde::{Deserialize, Serialize};

/// Choose which input to serve.
///
/// `requests[i]` is `Some(seq)` when input `i` has a packet that can be sent,
/// where `seq` orders the head packets by arrival.
pub trait Arbitrate {
    fn arbitrate(&mut self, entity: &Rc<Entity>, requests: &[Option<u64>]) -> Option<usize>;
}

pub struct RoundRobinPolicy {
    candidate: usize,
}

impl RoundRobinPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self { candidate: 0 }
    }
}

impl Default for RoundRobinPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl Arbitrate for RoundRobinPolicy {
    fn arbitrate(&mut self, entity: &Rc<Entity>, requests: &[Option<u64>]) -> Option<usize> {
        let num_inputs = requests.len();
        for i in 0..num_inputs {
            let index = (i + self.candidate) % num_inputs;
            if requests[index].is_some() {
                trace!(entity ; "round robin: grant {} (candidate {})", index, self.candidate);
                self.candidate = (index + 1) % num_inputs;
                return Some(index);
            }
        }
        None
    }
}

/// Serve the input whose head packet arrived first.
#[derive(Default)]
pub struct FifoPolicy;

impl Arbitrate for FifoPolicy {
    fn arbitrate(&mut self, entity: &Rc<Entity>, requests: &[Option<u64>]) -> Option<usize> {
        let granted = requests
            .iter()
            .enumerate()
            .filter_map(|(i, seq)| seq.map(|seq| (seq, i)))
            .min()
            .map(|(_, i)| i);
        if let Some(index) = granted {
            trace!(entity ; "fifo: grant {}", index);
        }
        granted
    }
}

/// Configuration-level choice of [`Arbitrate`] implementation.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbitrationPolicy {
    #[default]
    RoundRobin,
    Fifo,
}

impl ArbitrationPolicy {
    #[must_use]
    pub fn build(self) -> Box<dyn Arbitrate> {
        match self {
            ArbitrationPolicy::RoundRobin => Box::new(RoundRobinPolicy::new()),
            ArbitrationPolicy::Fifo => Box::new(FifoPolicy),
        }
    }
}

impl fmt::Display for ArbitrationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ArbitrationPolicy::RoundRobin => write!(f, "round_robin"),
            ArbitrationPolicy::Fifo => write!(f, "fifo"),
        }
    }
}
