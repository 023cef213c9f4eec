// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! A network endpoint.
//!
//! The endpoint splits messages into packets, injects them into its switch
//! as credit allows, and reassembles the packets it receives. Received
//! packets are credited back to the switch straight away.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use netsim_components::arbitrator::new_arbitrator;
use netsim_components::buffer::InjectionBuffer;
use netsim_components::packet::{Credit, Message, Packet};
use netsim_components::packetizer::{MessageNotifier, Packetizer};
use netsim_engine::scheduler::Scheduler;
use netsim_engine::sim_error;
use netsim_engine::time::simtime::SimTime;
use netsim_engine::types::{SimError, SimResult};
use netsim_model_builder::{EntityDisplay, EntityGet};
use netsim_topology::NodeId;
use netsim_track::entity::Entity;
use netsim_track::{debug, destroy};

use crate::config::NetworkConfig;
use crate::link::{Connectable, Link};

#[derive(EntityDisplay, EntityGet)]
pub struct Nic {
    entity: Rc<Entity>,
    me: Weak<Nic>,
    node: NodeId,
    scheduler: Scheduler,
    packetizer: RefCell<Packetizer>,
    injection: RefCell<InjectionBuffer>,
    link: RefCell<Option<Link>>,
    notifier: RefCell<Option<Rc<dyn MessageNotifier>>>,
    messages_sent: Cell<u64>,
    messages_received: Cell<u64>,
    bytes_received: Cell<u64>,
    last_delivery: Cell<SimTime>,
}

impl Nic {
    /// `injection_credits` is the space for this endpoint in the switch input
    /// buffer.
    pub fn new(
        parent: &Rc<Entity>,
        node: NodeId,
        scheduler: &Scheduler,
        config: &NetworkConfig,
        injection_credits: usize,
    ) -> Result<Rc<Self>, SimError> {
        let entity = Rc::new(Entity::new(parent, format!("nic{node}").as_str()));
        let packetizer = Packetizer::new(
            &entity,
            "packetizer",
            config.switch.mtu,
            config.nic.packetizer,
        )?;
        let injection = InjectionBuffer::new(
            &entity,
            "ibuf",
            injection_credits,
            new_arbitrator(config.switch.arbitrator, config.nic.injection_bandwidth)?,
        );

        Ok(Rc::new_cyclic(|me| Self {
            entity,
            me: me.clone(),
            node,
            scheduler: scheduler.clone(),
            packetizer: RefCell::new(packetizer),
            injection: RefCell::new(injection),
            link: RefCell::new(None),
            notifier: RefCell::new(None),
            messages_sent: Cell::new(0),
            messages_received: Cell::new(0),
            bytes_received: Cell::new(0),
            last_delivery: Cell::new(SimTime::ZERO),
        }))
    }

    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Attach the link to the switch. Packets are sent to, and credit is
    /// returned for, the same switch port.
    pub fn connect(&self, link: Link) {
        *self.link.borrow_mut() = Some(link);
    }

    pub fn set_notifier(&self, notifier: Rc<dyn MessageNotifier>) {
        *self.notifier.borrow_mut() = Some(notifier);
    }

    fn notifier(&self) -> Option<Rc<dyn MessageNotifier>> {
        self.notifier.borrow().clone()
    }

    /// Send a message on virtual network `vn`.
    pub fn start(&self, vn: usize, message: Message) -> SimResult {
        if message.src() != self.node {
            return sim_error!(format!("{}: cannot send {message}", self.entity));
        }
        self.packetizer.borrow_mut().start(vn, Rc::new(message));
        self.send_what_you_can(vn)
    }

    fn send_what_you_can(&self, vn: usize) -> SimResult {
        let now = self.scheduler.time_now();
        let departures = {
            let mut injection = self.injection.borrow_mut();
            self.packetizer
                .borrow_mut()
                .send_what_you_can(now, vn, &mut *injection)?
        };
        if departures.is_empty() {
            return Ok(());
        }

        let link = self.link.borrow();
        let Some(link) = link.as_ref() else {
            return sim_error!(format!("{}: not connected", self.entity));
        };
        for departure in departures {
            let packet = departure.packet;
            if packet.is_tail() {
                self.messages_sent.set(self.messages_sent.get() + 1);
                if packet.message().needs_ack() {
                    let message = packet.message().clone();
                    self.schedule_self(departure.tail_leaves, move |nic| {
                        match nic.notifier() {
                            Some(notifier) => notifier.sent(vn, message),
                            None => Ok(()),
                        }
                    })?;
                }
            }
            link.send_payload(departure.head_leaves, packet)?;
        }
        Ok(())
    }

    fn schedule_self<F>(&self, time: SimTime, handler: F) -> SimResult
    where
        F: FnOnce(&Nic) -> SimResult + 'static,
    {
        let me = self.me.clone();
        self.scheduler.schedule_at(time, move || match me.upgrade() {
            Some(nic) => handler(&nic),
            None => sim_error!("endpoint dropped with events pending"),
        })
    }

    fn packet_complete(&self, packet: Packet) -> SimResult {
        let vn = packet.vn();
        let notifier = self.notifier();
        if let Some(notifier) = &notifier {
            notifier.packet_received(vn, &packet)?;
        }
        destroy!(self.entity ; packet.id());

        let completed = self.packetizer.borrow_mut().packet_arrived(vn, &packet)?;
        if let Some(message) = completed {
            self.messages_received.set(self.messages_received.get() + 1);
            self.bytes_received
                .set(self.bytes_received.get() + message.num_bytes() as u64);
            self.last_delivery.set(self.scheduler.time_now());
            debug!(self.entity ; "delivered {}", message);
            if let Some(notifier) = notifier {
                notifier.notify(vn, message)?;
            }
        }
        Ok(())
    }

    /// Packets not yet injected.
    #[must_use]
    pub fn num_queued(&self) -> usize {
        self.packetizer.borrow().num_queued()
    }

    #[must_use]
    pub fn injection_credits(&self) -> usize {
        self.injection.borrow().credits()
    }

    #[must_use]
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.get()
    }

    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received.get()
    }

    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.get()
    }

    /// Time the last message was delivered to this endpoint.
    #[must_use]
    pub fn last_delivery(&self) -> SimTime {
        self.last_delivery.get()
    }
}

impl Connectable for Nic {
    fn handle_payload(&self, _inport: usize, packet: Packet) -> SimResult {
        let now = self.scheduler.time_now();
        match self.link.borrow().as_ref() {
            Some(link) => link.send_credit(now, packet.vc(), packet.num_bytes())?,
            None => return sim_error!(format!("{}: not connected", self.entity)),
        }
        let delay = self.packetizer.borrow().arrival_delay(&packet);
        self.schedule_self(now + delay, move |nic| nic.packet_complete(packet))
    }

    fn handle_credit(&self, credit: Credit) -> SimResult {
        self.injection.borrow_mut().handle_credit(credit.num_bytes)?;
        let vns = self.packetizer.borrow().pending_vns();
        for vn in vns {
            self.send_what_you_can(vn)?;
        }
        Ok(())
    }
}
