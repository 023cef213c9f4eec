// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Link bandwidth arbitration: serialization, sharing between concurrent
//! packets and the effective bandwidth handed on downstream.

use approx::assert_relative_eq;
use netsim_components::arbitrator::{
    ArbitratorKind, BandwidthArbitrator, CutThroughArbitrator, SimpleArbitrator, new_arbitrator,
};
use netsim_engine::time::simtime::SimTime;

#[test]
fn single_packet_full_rate() {
    let mut arb = CutThroughArbitrator::new(1.0);
    let t = arb.arbitrate(SimTime::ZERO, 1000, 1.0);
    assert_eq!(t.head_leaves, SimTime::ZERO);
    assert_eq!(t.tail_leaves, SimTime::from_ns(1000.0));
    assert_relative_eq!(t.bandwidth, 1.0);
}

#[test]
fn never_faster_than_arrival() {
    let mut arb = CutThroughArbitrator::new(4.0);
    let t = arb.arbitrate(SimTime::ZERO, 1000, 1.0);
    assert_eq!(t.tail_leaves, SimTime::from_ns(1000.0));
    assert_relative_eq!(t.bandwidth, 1.0);
}

#[test]
fn slow_flows_share_the_link() {
    let mut arb = CutThroughArbitrator::new(1.0);
    let a = arb.arbitrate(SimTime::ZERO, 1000, 0.5);
    let b = arb.arbitrate(SimTime::ZERO, 1000, 0.5);
    for t in [a, b] {
        assert_eq!(t.head_leaves, SimTime::ZERO);
        assert_eq!(t.tail_leaves, SimTime::from_ns(2000.0));
        assert_relative_eq!(t.bandwidth, 0.5);
    }

    // The link is now full until both have finished.
    let c = arb.arbitrate(SimTime::ZERO, 1000, 1.0);
    assert_eq!(c.head_leaves, SimTime::from_ns(2000.0));
    assert_eq!(c.tail_leaves, SimTime::from_ns(3000.0));
}

#[test]
fn fast_flow_uses_what_is_left() {
    let mut arb = CutThroughArbitrator::new(1.0);
    arb.arbitrate(SimTime::ZERO, 1000, 0.25);
    let t = arb.arbitrate(SimTime::ZERO, 1000, 1.0);
    assert_eq!(t.head_leaves, SimTime::ZERO);
    assert_eq!(t.tail_leaves, SimTime::from_ps(1_333_333));
    assert_relative_eq!(t.bandwidth, 0.75, max_relative = 1e-6);
}

#[test]
fn spans_several_epochs() {
    let mut arb = CutThroughArbitrator::new(1.0);
    arb.arbitrate(SimTime::ZERO, 1000, 0.5);

    // Half rate while sharing, then full rate.
    let t = arb.arbitrate(SimTime::ZERO, 2000, 1.0);
    assert_eq!(t.head_leaves, SimTime::ZERO);
    assert_eq!(t.tail_leaves, SimTime::from_ns(3000.0));
    assert_relative_eq!(t.bandwidth, 2.0 / 3.0, max_relative = 1e-9);
}

#[test]
fn contention_doubles_service_time() {
    let single = {
        let mut arb = CutThroughArbitrator::new(1.0);
        (0..4)
            .map(|_| arb.arbitrate(SimTime::ZERO, 1000, 1.0).tail_leaves)
            .max()
            .unwrap()
    };
    let contended = {
        let mut arb = CutThroughArbitrator::new(1.0);
        (0..8)
            .map(|_| arb.arbitrate(SimTime::ZERO, 1000, 1.0).tail_leaves)
            .max()
            .unwrap()
    };
    assert_eq!(single, SimTime::from_ns(4000.0));
    assert_eq!(contended, SimTime::from_ns(8000.0));
}

#[test]
fn simple_ignores_arrival_rate() {
    let mut arb = SimpleArbitrator::new(1.0);
    let t = arb.arbitrate(SimTime::ZERO, 1000, 0.1);
    assert_eq!(t.tail_leaves, SimTime::from_ns(1000.0));
    assert_relative_eq!(arb.bandwidth(), 1.0);
}

#[test]
fn bad_bandwidth() {
    assert!(new_arbitrator(ArbitratorKind::CutThrough, 0.0).is_err());
    assert!(new_arbitrator(ArbitratorKind::Simple, f64::NAN).is_err());
    assert!(new_arbitrator(ArbitratorKind::Simple, 2.0).is_ok());
}
