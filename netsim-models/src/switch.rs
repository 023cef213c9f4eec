// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! A network switch.
//!
//! A switch routes each arriving packet, passes it through its
//! [`Crossbar`] to the [`NetworkBuffer`] of the chosen output port and from
//! there over the output link. Credit flows the other way: the crossbar
//! returns credit to the upstream component once the tail of a packet has
//! left it, and each output buffer returns credit to the crossbar in the
//! same way.
//!
//! Ports that the topology leaves unconnected have no buffer.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use netsim_components::arbitrator::new_arbitrator;
use netsim_components::buffer::{Departure, NetworkBuffer};
use netsim_components::crossbar::{Crossbar, CrossbarDeparture};
use netsim_components::packet::{Credit, Packet};
use netsim_components::stats::CongestionStats;
use netsim_engine::scheduler::Scheduler;
use netsim_engine::sim_error;
use netsim_engine::time::simtime::SimTime;
use netsim_engine::types::{SimError, SimResult};
use netsim_model_builder::{EntityDisplay, EntityGet};
use netsim_topology::{StructuredTopology, SwitchId, Topology};
use netsim_track::entity::Entity;
use netsim_track::trace;

use crate::config::NetworkConfig;
use crate::link::{Connectable, Link};

/// Sizing of one output port.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputPort {
    pub port: usize,
    pub link_bandwidth: f64,
    pub crossbar_bandwidth: f64,
    pub output_buffer_size: usize,

    /// Size of the buffer at the far end of the link.
    pub downstream_buffer_size: usize,
}

/// Scale a buffer size by a port multiplier.
#[must_use]
pub fn scaled_size(size: usize, scale: f64) -> usize {
    (size as f64 * scale) as usize
}

#[derive(EntityDisplay, EntityGet)]
pub struct NetworkSwitch {
    entity: Rc<Entity>,
    me: Weak<NetworkSwitch>,
    id: SwitchId,
    scheduler: Scheduler,
    topology: Rc<Topology>,
    crossbar: RefCell<Crossbar>,
    buffers: Vec<Option<RefCell<NetworkBuffer>>>,
    out_links: RefCell<Vec<Option<Link>>>,
    upstream_links: RefCell<Vec<Option<Link>>>,
    stats: CongestionStats,
}

impl NetworkSwitch {
    pub fn new(
        parent: &Rc<Entity>,
        id: SwitchId,
        scheduler: &Scheduler,
        topology: &Rc<Topology>,
        config: &NetworkConfig,
        outputs: &[OutputPort],
        stats: &CongestionStats,
    ) -> Result<Rc<Self>, SimError> {
        let entity = Rc::new(Entity::new(parent, format!("switch{id}").as_str()));
        let num_ports = topology.max_num_ports();
        let num_vcs = topology.num_vcs();
        let mtu = config.switch.mtu;
        let accumulate = config.stats.accumulate_congestion_delay;
        let policy = config.switch.crossbar_policy;

        let mut crossbar = Crossbar::new(&entity, "xbar", num_ports, num_vcs, accumulate);
        let mut buffers: Vec<Option<RefCell<NetworkBuffer>>> = (0..num_ports).map(|_| None).collect();
        for output in outputs {
            let port = output.port;
            for (what, size) in [
                ("output buffer", output.output_buffer_size),
                ("downstream buffer", output.downstream_buffer_size),
            ] {
                if size / num_vcs < mtu {
                    return sim_error!(format!(
                        "{entity}: {what} of port {port} ({size} bytes over {num_vcs} virtual channels) cannot hold a {mtu} byte packet"
                    ));
                }
            }

            crossbar.add_output(
                port,
                output.output_buffer_size / num_vcs,
                new_arbitrator(config.switch.arbitrator, output.crossbar_bandwidth)?,
                || policy.build(),
            )?;
            buffers[port] = Some(RefCell::new(NetworkBuffer::new(
                &entity,
                format!("obuf{port}").as_str(),
                num_vcs,
                output.downstream_buffer_size / num_vcs,
                new_arbitrator(config.switch.arbitrator, output.link_bandwidth)?,
                accumulate,
            )));
        }

        Ok(Rc::new_cyclic(|me| Self {
            entity,
            me: me.clone(),
            id,
            scheduler: scheduler.clone(),
            topology: topology.clone(),
            crossbar: RefCell::new(crossbar),
            buffers,
            out_links: RefCell::new(vec![None; num_ports]),
            upstream_links: RefCell::new(vec![None; num_ports]),
            stats: stats.clone(),
        }))
    }

    #[must_use]
    pub fn id(&self) -> SwitchId {
        self.id
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Attach the link leaving output `port`.
    pub fn connect_output(&self, port: usize, link: Link) -> SimResult {
        if self.buffers.get(port).and_then(Option::as_ref).is_none() {
            return sim_error!(format!("{}: port {port} has no output buffer", self.entity));
        }
        self.out_links.borrow_mut()[port] = Some(link);
        Ok(())
    }

    /// Attach the link used to return credit for packets arriving on `port`.
    pub fn connect_upstream(&self, port: usize, link: Link) -> SimResult {
        let mut links = self.upstream_links.borrow_mut();
        let Some(slot) = links.get_mut(port) else {
            return sim_error!(format!("{}: no input port {port}", self.entity));
        };
        *slot = Some(link);
        Ok(())
    }

    /// Packets waiting in the output buffer of `port`.
    #[must_use]
    pub fn queue_length(&self, port: usize) -> usize {
        self.buffers
            .get(port)
            .and_then(Option::as_ref)
            .map_or(0, |buffer| buffer.borrow().queue_length())
    }

    #[must_use]
    pub fn bytes_sent(&self, port: usize) -> u64 {
        self.buffers
            .get(port)
            .and_then(Option::as_ref)
            .map_or(0, |buffer| buffer.borrow().bytes_sent())
    }

    /// Ports with an output buffer.
    #[must_use]
    pub fn output_ports(&self) -> Vec<usize> {
        self.buffers
            .iter()
            .enumerate()
            .filter_map(|(port, buffer)| buffer.as_ref().map(|_| port))
            .collect()
    }

    /// Packets held anywhere in the switch.
    #[must_use]
    pub fn num_waiting(&self) -> usize {
        let buffered: usize = self
            .buffers
            .iter()
            .flatten()
            .map(|buffer| buffer.borrow().queue_length())
            .sum();
        buffered + self.crossbar.borrow().num_waiting()
    }

    /// Describe every place where packets are stuck waiting for credit.
    #[must_use]
    pub fn deadlock_check(&self) -> Vec<String> {
        let mut stuck = Vec::new();
        let num_vcs = self.topology.num_vcs();
        for port in self.output_ports() {
            let Some(buffer) = self.buffers[port].as_ref() else {
                continue;
            };
            let buffer = buffer.borrow();
            if buffer.is_blocked() {
                let credits: Vec<_> = (0..num_vcs).map(|vc| buffer.credits(vc)).collect();
                stuck.push(format!(
                    "{}: {} packets blocked, credits {credits:?}",
                    buffer,
                    buffer.queue_length()
                ));
            }
            let crossbar = self.crossbar.borrow();
            let waiting = crossbar.queue_length(port);
            if waiting > 0 {
                let credits: Vec<_> = (0..num_vcs)
                    .filter_map(|vc| crossbar.credits(port, vc))
                    .collect();
                stuck.push(format!(
                    "{}: {waiting} packets waiting for port {port}, credits {credits:?}",
                    crossbar
                ));
            }
        }
        stuck
    }

    fn route(&self, packet: &mut Packet) {
        let (dst_switch, eject_port) = self.topology.endpoint_to_switch(packet.dst());
        if dst_switch == self.id {
            packet.path.outport = eject_port;
            packet.path.vc = 0;
        } else {
            self.topology
                .minimal_route_to_switch(self.id, dst_switch, &mut packet.path);
        }
    }

    fn buffer(&self, port: usize) -> Result<&RefCell<NetworkBuffer>, SimError> {
        match self.buffers.get(port).and_then(Option::as_ref) {
            Some(buffer) => Ok(buffer),
            None => sim_error!(format!("{}: port {port} has no output buffer", self.entity)),
        }
    }

    /// Run `handler` on this switch at `time`.
    fn schedule_self<F>(&self, time: SimTime, handler: F) -> SimResult
    where
        F: FnOnce(&NetworkSwitch) -> SimResult + 'static,
    {
        let me = self.me.clone();
        self.scheduler.schedule_at(time, move || match me.upgrade() {
            Some(switch) => handler(&switch),
            None => sim_error!("switch dropped with events pending"),
        })
    }

    fn crossbar_departures(&self, departures: Vec<CrossbarDeparture>) -> SimResult {
        for CrossbarDeparture {
            inport,
            in_vc,
            departure,
        } in departures
        {
            let num_bytes = departure.packet.num_bytes();
            match self.upstream_links.borrow()[inport].as_ref() {
                Some(link) => link.send_credit(departure.tail_leaves, in_vc, num_bytes)?,
                None => {
                    return sim_error!(format!(
                        "{}: nothing upstream of port {inport}",
                        self.entity
                    ));
                }
            }

            let outport = departure.packet.path.outport;
            let packet = departure.packet;
            self.schedule_self(departure.head_leaves, move |switch| {
                switch.output_payload(outport, packet)
            })?;
        }
        Ok(())
    }

    fn output_payload(&self, port: usize, packet: Packet) -> SimResult {
        let now = self.scheduler.time_now();
        let departures = self.buffer(port)?.borrow_mut().handle_payload(now, packet)?;
        self.buffer_departures(port, departures)
    }

    fn buffer_departures(&self, port: usize, departures: Vec<Departure>) -> SimResult {
        if departures.is_empty() {
            return Ok(());
        }
        let links = self.out_links.borrow();
        let Some(link) = links[port].as_ref() else {
            return sim_error!(format!("{}: port {port} is not connected", self.entity));
        };
        for Departure {
            packet,
            head_leaves,
            tail_leaves,
            ..
        } in departures
        {
            let vc = packet.vc();
            let num_bytes = packet.num_bytes();
            self.schedule_self(tail_leaves, move |switch| {
                switch.crossbar_credit(port, vc, num_bytes)
            })?;
            self.stats
                .report_hop(packet.src(), packet.dst(), num_bytes, packet.delay());
            link.send_payload(head_leaves, packet)?;
        }
        Ok(())
    }

    fn crossbar_credit(&self, port: usize, vc: usize, num_bytes: usize) -> SimResult {
        let now = self.scheduler.time_now();
        let departures = self
            .crossbar
            .borrow_mut()
            .handle_credit(now, port, vc, num_bytes)?;
        self.crossbar_departures(departures)
    }
}

impl Connectable for NetworkSwitch {
    fn handle_payload(&self, inport: usize, mut packet: Packet) -> SimResult {
        let now = self.scheduler.time_now();
        let in_vc = packet.vc();
        self.route(&mut packet);
        trace!(self.entity ; "port {} vc{}: {} to port {}", inport, in_vc, packet, packet.path.outport);
        let departures = self
            .crossbar
            .borrow_mut()
            .handle_payload(now, inport, in_vc, packet)?;
        self.crossbar_departures(departures)
    }

    fn handle_credit(&self, credit: Credit) -> SimResult {
        let now = self.scheduler.time_now();
        let departures = self
            .buffer(credit.port)?
            .borrow_mut()
            .handle_credit(now, credit.vc, credit.num_bytes)?;
        self.buffer_departures(credit.port, departures)
    }
}
