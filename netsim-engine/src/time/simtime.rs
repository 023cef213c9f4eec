// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! A point in (or span of) simulated time.
//!
//! Time is kept as an integer number of picoseconds so that event ordering is
//! exact and reproducible. Model parameters are generally given in
//! nanoseconds and bandwidths in GB/s (bytes per nanosecond), and
//! [`SimTime::from_ns`] rounds to the nearest picosecond.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

const PS_PER_NS: f64 = 1000.0;

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SimTime(u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);
    pub const MAX: SimTime = SimTime(u64::MAX);

    #[must_use]
    pub const fn from_ps(ps: u64) -> Self {
        Self(ps)
    }

    /// Negative values saturate to zero.
    #[must_use]
    pub fn from_ns(ns: f64) -> Self {
        Self((ns * PS_PER_NS).round() as u64)
    }

    /// Time taken to move `num_bytes` at `bandwidth_gbps` bytes per ns.
    #[must_use]
    pub fn serialization(num_bytes: usize, bandwidth_gbps: f64) -> Self {
        Self::from_ns(num_bytes as f64 / bandwidth_gbps)
    }

    #[must_use]
    pub const fn as_ps(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn as_ns(self) -> f64 {
        self.0 as f64 / PS_PER_NS
    }

    #[must_use]
    pub const fn saturating_sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(rhs.0))
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: SimTime) {
        *self = *self + rhs;
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 - rhs.0)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.3}ns", self.as_ns())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(SimTime::from_ns(1.5).as_ps(), 1500);
        assert_eq!(SimTime::from_ps(2500).as_ns(), 2.5);
        assert_eq!(SimTime::from_ns(-3.0), SimTime::ZERO);
        assert_eq!(format!("{}", SimTime::from_ns(8.0)), "8.000ns");
    }

    #[test]
    fn serialization_delay() {
        // 1000 bytes at 1 GB/s
        assert_eq!(SimTime::serialization(1000, 1.0), SimTime::from_ns(1000.0));
        // 64 bytes at 12.5 GB/s
        assert_eq!(SimTime::serialization(64, 12.5).as_ps(), 5120);
    }

    #[test]
    fn arithmetic() {
        let a = SimTime::from_ps(10);
        let b = SimTime::from_ps(4);
        assert_eq!(a + b, SimTime::from_ps(14));
        assert_eq!(a - b, SimTime::from_ps(6));
        assert_eq!(b.saturating_sub(a), SimTime::ZERO);
        assert_eq!(SimTime::MAX + a, SimTime::MAX);
    }
}
