// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! A single message between the two endpoints of one switch: every link runs
//! at 1 GB/s so a 1000 byte packet takes 1000 ns to serialize.

use std::cell::RefCell;
use std::rc::Rc;

use netsim_components::packet::{Message, MessageId, Packet};
use netsim_components::packetizer::{MessageNotifier, PacketizerKind};
use netsim_engine::run_simulation;
use netsim_engine::scheduler::Scheduler;
use netsim_engine::test_helpers::start_test;
use netsim_engine::time::simtime::SimTime;
use netsim_engine::types::SimResult;
use netsim_models::config::{NetworkConfig, NicConfig, SwitchConfig};
use netsim_models::network::Network;
use netsim_topology::config::{TopologyConfig, TopologyKind};

struct Recorder {
    scheduler: Scheduler,
    packets: RefCell<Vec<(usize, SimTime)>>,
    messages: RefCell<Vec<(MessageId, SimTime)>>,
    acks: RefCell<Vec<(MessageId, SimTime)>>,
}

impl Recorder {
    fn new(scheduler: &Scheduler) -> Rc<Self> {
        Rc::new(Self {
            scheduler: scheduler.clone(),
            packets: RefCell::new(Vec::new()),
            messages: RefCell::new(Vec::new()),
            acks: RefCell::new(Vec::new()),
        })
    }
}

impl MessageNotifier for Recorder {
    fn notify(&self, _vn: usize, message: Rc<Message>) -> SimResult {
        self.messages
            .borrow_mut()
            .push((message.id(), self.scheduler.time_now()));
        Ok(())
    }

    fn sent(&self, _vn: usize, message: Rc<Message>) -> SimResult {
        self.acks
            .borrow_mut()
            .push((message.id(), self.scheduler.time_now()));
        Ok(())
    }

    fn packet_received(&self, _vn: usize, packet: &Packet) -> SimResult {
        self.packets
            .borrow_mut()
            .push((packet.offset(), self.scheduler.time_now()));
        Ok(())
    }
}

fn single_switch(packetizer: PacketizerKind, latency_ns: f64) -> NetworkConfig {
    NetworkConfig {
        topology: TopologyConfig {
            kind: TopologyKind::FatTree,
            geometry: vec![1, 2],
            concentration: 2,
            ..TopologyConfig::default()
        },
        switch: SwitchConfig {
            link_bandwidth: 1.0,
            hop_latency_ns: 0.0,
            input_buffer_size: 16_000,
            output_buffer_size: 16_000,
            mtu: 1000,
            ..SwitchConfig::default()
        },
        nic: NicConfig {
            injection_bandwidth: 1.0,
            injection_latency_ns: latency_ns,
            packetizer,
            ..NicConfig::default()
        },
        ..NetworkConfig::default()
    }
}

fn ns(ns: f64) -> SimTime {
    SimTime::from_ns(ns)
}

#[test]
fn cut_through_delivery() {
    let mut engine = start_test(file!());
    let network = Network::new(&engine, &single_switch(PacketizerKind::CutThrough, 0.0)).unwrap();
    let recorder = Recorder::new(engine.scheduler());
    let notifier: Rc<dyn MessageNotifier> = recorder.clone();
    network.set_notifier(&notifier);

    network
        .start(0, Message::new(MessageId(1), 0, 1, 8000).with_ack())
        .unwrap();
    run_simulation!(engine);

    let expected: Vec<_> = (0..8).map(|i| (i * 1000, ns((i + 1) as f64 * 1000.0))).collect();
    assert_eq!(*recorder.packets.borrow(), expected);
    assert_eq!(*recorder.messages.borrow(), vec![(MessageId(1), ns(8000.0))]);
    assert_eq!(*recorder.acks.borrow(), vec![(MessageId(1), ns(8000.0))]);

    assert_eq!(network.nic(1).messages_received(), 1);
    assert_eq!(network.nic(0).messages_sent(), 1);
    assert_eq!(network.bytes_received(), 8000);
    assert_eq!(network.last_delivery(), ns(8000.0));
    assert_eq!(network.num_undelivered(), 0);
    assert!(network.deadlock_check().is_empty());
    assert_eq!(network.nic(0).injection_credits(), 8000);
}

#[test]
fn simple_delivery_on_head_arrival() {
    let mut engine = start_test(file!());
    let network = Network::new(&engine, &single_switch(PacketizerKind::Simple, 0.0)).unwrap();
    let recorder = Recorder::new(engine.scheduler());
    let notifier: Rc<dyn MessageNotifier> = recorder.clone();
    network.set_notifier(&notifier);

    network
        .start(0, Message::new(MessageId(1), 0, 1, 8000))
        .unwrap();
    run_simulation!(engine);

    let expected: Vec<_> = (0..8).map(|i| (i * 1000, ns(i as f64 * 1000.0))).collect();
    assert_eq!(*recorder.packets.borrow(), expected);
    assert_eq!(*recorder.messages.borrow(), vec![(MessageId(1), ns(7000.0))]);
    assert!(recorder.acks.borrow().is_empty());
}

#[test]
fn link_latency_adds_up() {
    let mut engine = start_test(file!());
    let network = Network::new(&engine, &single_switch(PacketizerKind::CutThrough, 10.0)).unwrap();

    network
        .start(0, Message::new(MessageId(1), 0, 1, 8000))
        .unwrap();
    run_simulation!(engine);
    assert_eq!(network.last_delivery(), ns(8020.0));
}

#[test]
fn zero_length_and_loopback() {
    let mut engine = start_test(file!());
    let network = Network::new(&engine, &single_switch(PacketizerKind::CutThrough, 0.0)).unwrap();

    network
        .start(0, Message::new(MessageId(1), 0, 1, 0))
        .unwrap();
    network
        .start(0, Message::new(MessageId(2), 1, 1, 2500))
        .unwrap();
    run_simulation!(engine);
    assert_eq!(network.nic(1).messages_received(), 2);
    assert_eq!(network.bytes_received(), 2500);
}

#[test]
fn bad_endpoints() {
    let engine = start_test(file!());
    let network = Network::new(&engine, &single_switch(PacketizerKind::CutThrough, 0.0)).unwrap();
    assert!(network.start(0, Message::new(MessageId(1), 0, 2, 10)).is_err());
    assert!(network.start(0, Message::new(MessageId(1), 5, 1, 10)).is_err());
    assert!(network.nic(0).start(0, Message::new(MessageId(1), 1, 0, 10)).is_err());
}

#[test]
fn hierarchical_names() {
    let engine = start_test(file!());
    let network = Network::new(&engine, &single_switch(PacketizerKind::Simple, 0.0)).unwrap();
    assert_eq!(network.switch(0).entity().full_name(), "top::network::switch0");
    assert_eq!(network.nic(1).entity().full_name(), "top::network::nic1");
}
