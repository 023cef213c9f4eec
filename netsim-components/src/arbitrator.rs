// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Bandwidth arbitration for a single link.
//!
//! An arbitrator decides when a packet handed to a link starts and finishes
//! leaving, given the link bandwidth and what has already been promised to
//! earlier packets.
//!
//! Bandwidths are given in GB/s, i.e. bytes per nanosecond.

use std::collections::VecDeque;
use std::fmt;

use netsim_engine::sim_error;
use netsim_engine::time::simtime::SimTime;
use netsim_engine::types::SimError;
use serde::{Deserialize, Serialize};

/// Bytes left over from floating-point rounding that are ignored.
const BYTE_EPSILON: f64 = 1e-6;

/// Fraction of the link bandwidth treated as nothing.
const RATE_EPSILON: f64 = 1e-9;

/// The outcome of arbitrating for one packet.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transmission {
    pub head_leaves: SimTime,
    pub tail_leaves: SimTime,

    /// Effective rate at which the packet was sent.
    pub bandwidth: f64,
}

pub trait BandwidthArbitrator {
    /// Allocate link time to a packet of `num_bytes` that becomes available at
    /// `now` and is itself arriving at `incoming_bandwidth`.
    fn arbitrate(&mut self, now: SimTime, num_bytes: usize, incoming_bandwidth: f64)
    -> Transmission;

    fn bandwidth(&self) -> f64;
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbitratorKind {
    Simple,
    #[default]
    CutThrough,
}

impl fmt::Display for ArbitratorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ArbitratorKind::Simple => write!(f, "simple"),
            ArbitratorKind::CutThrough => write!(f, "cut_through"),
        }
    }
}

/// Build an arbitrator for a link of the given bandwidth.
pub fn new_arbitrator(
    kind: ArbitratorKind,
    bandwidth: f64,
) -> Result<Box<dyn BandwidthArbitrator>, SimError> {
    if !(bandwidth > 0.0 && bandwidth.is_finite()) {
        return sim_error!(format!("invalid link bandwidth {bandwidth} GB/s"));
    }
    Ok(match kind {
        ArbitratorKind::Simple => Box::new(SimpleArbitrator::new(bandwidth)),
        ArbitratorKind::CutThrough => Box::new(CutThroughArbitrator::new(bandwidth)),
    })
}

/// Packets are sent back to back at full link rate.
pub struct SimpleArbitrator {
    bandwidth: f64,
    next_free: SimTime,
}

impl SimpleArbitrator {
    #[must_use]
    pub fn new(bandwidth: f64) -> Self {
        Self {
            bandwidth,
            next_free: SimTime::ZERO,
        }
    }
}

impl BandwidthArbitrator for SimpleArbitrator {
    fn arbitrate(
        &mut self,
        now: SimTime,
        num_bytes: usize,
        _incoming_bandwidth: f64,
    ) -> Transmission {
        let head_leaves = now.max(self.next_free);
        let tail_leaves = head_leaves + SimTime::serialization(num_bytes, self.bandwidth);
        self.next_free = tail_leaves;
        Transmission {
            head_leaves,
            tail_leaves,
            bandwidth: self.bandwidth,
        }
    }

    fn bandwidth(&self) -> f64 {
        self.bandwidth
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Epoch {
    start: SimTime,
    end: SimTime,
    available: f64,
}

impl Epoch {
    fn is_open(&self) -> bool {
        self.end == SimTime::MAX
    }
}

/// Packets may share the link.
///
/// The future of the link is kept as a list of contiguous epochs, each with
/// the bandwidth not yet promised. A packet is never sent faster than it is
/// arriving, so a slow packet leaves room for others. The last epoch is
/// always open-ended with the full link bandwidth.
pub struct CutThroughArbitrator {
    bandwidth: f64,
    epochs: VecDeque<Epoch>,
}

impl CutThroughArbitrator {
    #[must_use]
    pub fn new(bandwidth: f64) -> Self {
        Self {
            bandwidth,
            epochs: VecDeque::from([Epoch {
                start: SimTime::ZERO,
                end: SimTime::MAX,
                available: bandwidth,
            }]),
        }
    }

    /// Forget epochs that are entirely in the past.
    fn retire(&mut self, now: SimTime) {
        while self.epochs.len() > 1 && self.epochs[0].end <= now {
            self.epochs.pop_front();
        }
        if self.epochs[0].start < now {
            self.epochs[0].start = now;
        }
    }

    /// Merge neighbouring epochs with the same remaining bandwidth.
    fn coalesce(&mut self) {
        let mut i = 1;
        while i < self.epochs.len() {
            let prev = self.epochs[i - 1];
            let curr = self.epochs[i];
            if (prev.available - curr.available).abs() < RATE_EPSILON * self.bandwidth {
                self.epochs[i - 1].end = curr.end;
                self.epochs[i - 1].available = curr.available;
                self.epochs.remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// Number of epochs currently tracked.
    #[must_use]
    pub fn num_epochs(&self) -> usize {
        self.epochs.len()
    }
}

impl BandwidthArbitrator for CutThroughArbitrator {
    fn arbitrate(
        &mut self,
        now: SimTime,
        num_bytes: usize,
        incoming_bandwidth: f64,
    ) -> Transmission {
        self.retire(now);
        let min_rate = self.bandwidth * RATE_EPSILON;
        let demand = if incoming_bandwidth > min_rate {
            incoming_bandwidth.min(self.bandwidth)
        } else {
            self.bandwidth
        };

        let mut remaining = num_bytes as f64;
        let mut head_leaves = None;
        let mut tail_leaves = now;
        let mut i = 0;
        while i < self.epochs.len() {
            let epoch = self.epochs[i];
            let rate = demand.min(epoch.available);
            if rate <= min_rate {
                i += 1;
                continue;
            }
            head_leaves.get_or_insert(epoch.start);

            let capacity = if epoch.is_open() {
                f64::INFINITY
            } else {
                rate * (epoch.end - epoch.start).as_ns()
            };

            if capacity + BYTE_EPSILON >= remaining {
                let finish = (epoch.start + SimTime::from_ns(remaining / rate)).min(epoch.end);
                if finish > epoch.start {
                    if finish < epoch.end {
                        self.epochs.insert(
                            i + 1,
                            Epoch {
                                start: finish,
                                ..epoch
                            },
                        );
                        self.epochs[i].end = finish;
                    }
                    self.epochs[i].available -= rate;
                }
                tail_leaves = finish;
                break;
            }

            self.epochs[i].available -= rate;
            remaining -= capacity;
            i += 1;
        }
        self.coalesce();

        let head_leaves = head_leaves.unwrap_or(now);
        let duration = (tail_leaves - head_leaves).as_ns();
        let bandwidth = if duration > 0.0 {
            num_bytes as f64 / duration
        } else {
            demand
        };
        Transmission {
            head_leaves,
            tail_leaves,
            bandwidth,
        }
    }

    fn bandwidth(&self) -> f64 {
        self.bandwidth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_serializes() {
        let mut arb = SimpleArbitrator::new(2.0);
        let t = arb.arbitrate(SimTime::from_ns(10.0), 100, 0.5);
        assert_eq!(t.head_leaves, SimTime::from_ns(10.0));
        assert_eq!(t.tail_leaves, SimTime::from_ns(60.0));

        let t = arb.arbitrate(SimTime::from_ns(20.0), 100, 0.5);
        assert_eq!(t.head_leaves, SimTime::from_ns(60.0));
        assert_eq!(t.tail_leaves, SimTime::from_ns(110.0));
    }

    #[test]
    fn epochs_split_and_merge() {
        let mut arb = CutThroughArbitrator::new(1.0);
        arb.arbitrate(SimTime::ZERO, 100, 1.0);
        assert_eq!(arb.num_epochs(), 2);

        // Fills the gap to the end of the first packet exactly.
        let t = arb.arbitrate(SimTime::ZERO, 100, 1.0);
        assert_eq!(t.head_leaves, SimTime::from_ns(100.0));
        assert_eq!(t.tail_leaves, SimTime::from_ns(200.0));
        assert_eq!(arb.num_epochs(), 2);

        // Once time has moved on, past epochs are dropped.
        let t = arb.arbitrate(SimTime::from_ns(500.0), 10, 1.0);
        assert_eq!(t.head_leaves, SimTime::from_ns(500.0));
        assert_eq!(arb.num_epochs(), 2);
    }
}
