// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Crossbar arbitration between inputs competing for the same output.

use std::rc::Rc;

use netsim_components::arbitrator::SimpleArbitrator;
use netsim_components::crossbar::Crossbar;
use netsim_components::packet::{Message, MessageId, Packet};
use netsim_components::policy::ArbitrationPolicy;
use netsim_engine::test_helpers::start_test;
use netsim_engine::time::simtime::SimTime;
use netsim_track::Id;
use netsim_track::entity::Entity;

fn packet(id: u64, outport: usize) -> Packet {
    let message = Rc::new(Message::new(MessageId(id), 0, 1, 100));
    let mut packet = Packet::new(Id(id), message, 0, 100, id, 0);
    packet.path.outport = outport;
    packet
}

fn crossbar(top: &Rc<Entity>, policy: ArbitrationPolicy) -> Crossbar {
    let mut xbar = Crossbar::new(top, "xbar", 3, 2, false);
    xbar.add_output(2, 100, Box::new(SimpleArbitrator::new(1.0)), || policy.build())
        .unwrap();
    xbar
}

/// Input 0 sends two packets and input 1 one while the output only has room
/// for one packet at a time. Returns the inputs in the order they were served.
fn grant_order(policy: ArbitrationPolicy) -> Vec<usize> {
    let engine = start_test(file!());
    let mut xbar = crossbar(engine.top(), policy);

    let mut order = Vec::new();
    let now = SimTime::ZERO;
    for (inport, id) in [(0, 1), (0, 2), (1, 3)] {
        for d in xbar.handle_payload(now, inport, 1, packet(id, 2)).unwrap() {
            order.push(d.inport);
        }
    }
    assert_eq!(xbar.queue_length(2), 2);
    for _ in 0..2 {
        for d in xbar.handle_credit(now, 2, 0, 100).unwrap() {
            assert_eq!(d.in_vc, 1);
            order.push(d.inport);
        }
    }
    assert_eq!(xbar.num_waiting(), 0);
    order
}

#[test]
fn round_robin_alternates_inputs() {
    assert_eq!(grant_order(ArbitrationPolicy::RoundRobin), vec![0, 1, 0]);
}

#[test]
fn fifo_serves_oldest() {
    assert_eq!(grant_order(ArbitrationPolicy::Fifo), vec![0, 0, 1]);
}

#[test]
fn one_packet_at_a_time_per_output() {
    let engine = start_test(file!());
    let mut xbar = Crossbar::new(engine.top(), "xbar", 3, 2, false);
    xbar.add_output(2, 1000, Box::new(SimpleArbitrator::new(1.0)), || {
        ArbitrationPolicy::RoundRobin.build()
    })
    .unwrap();

    let a = xbar.handle_payload(SimTime::ZERO, 0, 0, packet(1, 2)).unwrap();
    let b = xbar.handle_payload(SimTime::ZERO, 1, 0, packet(2, 2)).unwrap();
    assert_eq!(a[0].departure.tail_leaves, SimTime::from_ns(100.0));
    assert_eq!(b[0].departure.head_leaves, SimTime::from_ns(100.0));
    assert_eq!(b[0].departure.local_delay, SimTime::from_ns(100.0));
    assert_eq!(xbar.credits(2, 0), Some(800));
    assert_eq!(xbar.credits(1, 0), None);
}

#[test]
fn routing_errors() {
    let engine = start_test(file!());
    let mut xbar = crossbar(engine.top(), ArbitrationPolicy::RoundRobin);

    assert!(xbar.handle_payload(SimTime::ZERO, 0, 0, packet(1, 1)).is_err());
    assert!(xbar.handle_payload(SimTime::ZERO, 7, 0, packet(1, 2)).is_err());
    assert!(xbar.handle_credit(SimTime::ZERO, 1, 0, 10).is_err());
    assert!(
        xbar.add_output(2, 100, Box::new(SimpleArbitrator::new(1.0)), || {
            ArbitrationPolicy::Fifo.build()
        })
        .is_err()
    );
    assert!(
        xbar.add_output(9, 100, Box::new(SimpleArbitrator::new(1.0)), || {
            ArbitrationPolicy::Fifo.build()
        })
        .is_err()
    );
}
