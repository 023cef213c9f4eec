// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Output buffers only send when the downstream buffer has credit, keep each
//! virtual channel in order and reject credit they never gave out.

use std::rc::Rc;

use netsim_components::arbitrator::SimpleArbitrator;
use netsim_components::buffer::NetworkBuffer;
use netsim_components::packet::{Message, MessageId, Packet};
use netsim_engine::test_helpers::start_test;
use netsim_engine::time::simtime::SimTime;
use netsim_track::Id;

fn packet(id: u64, offset: usize, num_bytes: usize, vc: usize) -> Packet {
    let message = Rc::new(Message::new(MessageId(0), 0, 1, 4000));
    let mut packet = Packet::new(Id(id), message, offset, num_bytes, 0, 0);
    packet.path.vc = vc;
    packet
}

fn buffer(top: &Rc<netsim_track::entity::Entity>, accumulate: bool) -> NetworkBuffer {
    NetworkBuffer::new(
        top,
        "obuf",
        2,
        1000,
        Box::new(SimpleArbitrator::new(1.0)),
        accumulate,
    )
}

#[test]
fn credit_gates_sending() {
    let engine = start_test(file!());
    let mut buf = buffer(engine.top(), false);

    let sent = buf.handle_payload(SimTime::ZERO, packet(10, 0, 600, 0)).unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].tail_leaves, SimTime::from_ns(600.0));
    assert_eq!(buf.credits(0), 400);

    assert!(buf.handle_payload(SimTime::ZERO, packet(11, 600, 600, 0)).unwrap().is_empty());
    assert!(buf.handle_payload(SimTime::ZERO, packet(12, 1200, 600, 0)).unwrap().is_empty());
    assert_eq!(buf.queue_length(), 2);
    assert!(buf.is_blocked());

    // Other virtual channels are unaffected but share the link.
    let sent = buf.handle_payload(SimTime::ZERO, packet(13, 0, 600, 1)).unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].head_leaves, SimTime::from_ns(600.0));

    let now = SimTime::from_ns(100.0);
    let sent = buf.handle_credit(now, 0, 600).unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].packet.id(), Id(11));
    assert_eq!(sent[0].head_leaves, SimTime::from_ns(1200.0));
    assert_eq!(sent[0].local_delay, SimTime::from_ns(1200.0));
    assert_eq!(sent[0].packet.delay(), SimTime::from_ns(1200.0));
    assert_eq!(buf.queue_length(), 1);

    let sent = buf.handle_credit(SimTime::from_ns(200.0), 0, 600).unwrap();
    assert_eq!(sent[0].packet.id(), Id(12));
    assert!(!buf.is_blocked());
    assert_eq!(buf.bytes_sent(), 2400);
}

#[test]
fn delay_accumulates_when_asked() {
    let engine = start_test(file!());
    let mut buf = buffer(engine.top(), true);

    let mut p = packet(10, 0, 600, 0);
    p.record_delay(SimTime::from_ns(5.0), true);
    buf.handle_payload(SimTime::ZERO, packet(11, 0, 600, 0)).unwrap();
    buf.handle_payload(SimTime::ZERO, p).unwrap();
    let sent = buf.handle_credit(SimTime::from_ns(600.0), 0, 600).unwrap();
    assert_eq!(sent[0].local_delay, SimTime::from_ns(600.0));
    assert_eq!(sent[0].packet.delay(), SimTime::from_ns(605.0));
}

#[test]
fn credit_overflow() {
    let engine = start_test(file!());
    let mut buf = buffer(engine.top(), false);

    let err = buf.handle_credit(SimTime::ZERO, 0, 1).unwrap_err();
    assert_eq!(
        format!("{err}"),
        "Error: top::obuf: credit overflow on vc0 (1000 + 1 > 1000)"
    );
    assert!(buf.handle_credit(SimTime::ZERO, 2, 1).is_err());
}

#[test]
fn unknown_vc() {
    let engine = start_test(file!());
    let mut buf = buffer(engine.top(), false);
    assert!(buf.handle_payload(SimTime::ZERO, packet(10, 0, 10, 5)).is_err());
}
