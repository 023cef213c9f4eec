// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Build a whole network from its configuration.
//!
//! The [`Network`] owns every switch and endpoint. Switches are spread over
//! the engine partitions in contiguous blocks of switch ids and every
//! endpoint lives in the partition of its switch, so only switch-to-switch
//! links cross partitions.

use std::cell::Cell;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

use netsim_components::packet::Message;
use netsim_components::packetizer::MessageNotifier;
use netsim_components::stats::{
    CongestionStats, Histogram, SpyPlot, StatHistogram, StatSpyPlot,
};
use netsim_engine::engine::Engine;
use netsim_engine::sim_error;
use netsim_engine::time::simtime::SimTime;
use netsim_engine::types::{SimError, SimResult};
use netsim_model_builder::{EntityDisplay, EntityGet};
use netsim_topology::{NodeId, StructuredTopology, SwitchId, Topology};
use netsim_track::entity::Entity;
use netsim_track::{connect, info, warn};

use crate::config::{NetworkConfig, StatsConfig};
use crate::link::{Connectable, Link};
use crate::nic::Nic;
use crate::switch::{NetworkSwitch, OutputPort, scaled_size};

/// The statistics sinks created from a [`StatsConfig`].
pub struct NetworkStats {
    pub spyplot: Option<Rc<StatSpyPlot>>,
    pub histogram: Option<Rc<StatHistogram>>,
    pub byte_hops: Option<Rc<Cell<u64>>>,
}

impl NetworkStats {
    pub fn new(config: &StatsConfig) -> Result<Self, SimError> {
        let histogram = match &config.congestion_delay_histogram {
            Some(histogram) => Some(Rc::new(StatHistogram::new(
                histogram.bin_size_ns,
                histogram.num_bins,
            )?)),
            None => None,
        };
        Ok(Self {
            spyplot: config
                .congestion_matrix
                .then(|| Rc::new(StatSpyPlot::new())),
            histogram,
            byte_hops: config.byte_hops.then(|| Rc::new(Cell::new(0))),
        })
    }

    fn sinks(&self) -> CongestionStats {
        CongestionStats {
            spyplot: self
                .spyplot
                .clone()
                .map(|spyplot| -> Rc<dyn SpyPlot> { spyplot }),
            histogram: self
                .histogram
                .clone()
                .map(|histogram| -> Rc<dyn Histogram> { histogram }),
            byte_hops: self.byte_hops.clone(),
        }
    }
}

#[derive(EntityDisplay, EntityGet)]
pub struct Network {
    entity: Rc<Entity>,
    config: NetworkConfig,
    topology: Rc<Topology>,
    switches: Vec<Rc<NetworkSwitch>>,
    nics: Vec<Rc<Nic>>,
    stats: NetworkStats,
}

impl Network {
    pub fn new(engine: &Engine, config: &NetworkConfig) -> Result<Self, SimError> {
        config.validate()?;
        let topology = Rc::new(Topology::from_config(&config.topology)?);
        let entity = Rc::new(Entity::new(engine.top(), "network"));
        let stats = NetworkStats::new(&config.stats)?;
        let sinks = stats.sinks();

        let schedulers = engine.schedulers();
        let num_switches = topology.num_switches();
        let partition_of = |switch: SwitchId| switch * schedulers.len() / num_switches;

        let mut endpoint_ports = vec![Vec::new(); num_switches];
        for node in 0..topology.num_endpoints() {
            let (switch, port) = topology.endpoint_to_switch(node);
            endpoint_ports[switch].push(port);
        }

        let switches = (0..num_switches)
            .map(|id| {
                let outputs = output_ports(&topology, config, id, &endpoint_ports[id]);
                NetworkSwitch::new(
                    &entity,
                    id,
                    &schedulers[partition_of(id)],
                    &topology,
                    config,
                    &outputs,
                    &sinks,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let injection_credits = config.switch.input_buffer_size / topology.num_vcs();
        let nics = (0..topology.num_endpoints())
            .map(|node| {
                let (switch, _) = topology.endpoint_to_switch(node);
                Nic::new(
                    &entity,
                    node,
                    &schedulers[partition_of(switch)],
                    config,
                    injection_credits,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let network = Self {
            entity,
            config: config.clone(),
            topology,
            switches,
            nics,
            stats,
        };
        network.connect_objects()?;
        info!(network.entity ; "{} switches, {} endpoints over {} partitions",
            network.switches.len(), network.nics.len(), schedulers.len());
        Ok(network)
    }

    /// Wire every switch to its neighbours and endpoints.
    fn connect_objects(&self) -> SimResult {
        let hop_latency = self.config.switch.hop_latency();
        let injection_latency = self.config.nic.injection_latency();

        for switch in &self.switches {
            let src: Rc<dyn Connectable> = switch.clone();
            for c in self.topology.connected_outports(switch.id()) {
                let Some(neighbour) = self.switches.get(c.dst) else {
                    return sim_error!(format!(
                        "{switch}: port {} leads to missing switch {}",
                        c.src_outport, c.dst
                    ));
                };
                let dst: Rc<dyn Connectable> = neighbour.clone();
                switch.connect_output(
                    c.src_outport,
                    Link::new(&dst, neighbour.scheduler(), c.dst_inport, hop_latency),
                )?;
                neighbour.connect_upstream(
                    c.dst_inport,
                    Link::new(&src, switch.scheduler(), c.src_outport, hop_latency),
                )?;
                connect!(switch.entity() ; neighbour.entity());
            }
        }

        for nic in &self.nics {
            let (switch_id, port) = self.topology.endpoint_to_switch(nic.node());
            let switch = &self.switches[switch_id];
            let switch_dyn: Rc<dyn Connectable> = switch.clone();
            let nic_dyn: Rc<dyn Connectable> = nic.clone();

            nic.connect(Link::new(
                &switch_dyn,
                switch.scheduler(),
                port,
                injection_latency,
            ));
            let to_nic = Link::new(&nic_dyn, nic.scheduler(), 0, injection_latency);
            switch.connect_output(port, to_nic.clone())?;
            switch.connect_upstream(port, to_nic)?;
            connect!(nic.entity() ; switch.entity());
            connect!(switch.entity() ; nic.entity());
        }
        Ok(())
    }

    #[must_use]
    pub fn topology(&self) -> &Rc<Topology> {
        &self.topology
    }

    #[must_use]
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    #[must_use]
    pub fn num_endpoints(&self) -> usize {
        self.nics.len()
    }

    #[must_use]
    pub fn switch(&self, id: SwitchId) -> &Rc<NetworkSwitch> {
        &self.switches[id]
    }

    #[must_use]
    pub fn switches(&self) -> &[Rc<NetworkSwitch>] {
        &self.switches
    }

    #[must_use]
    pub fn nic(&self, node: NodeId) -> &Rc<Nic> {
        &self.nics[node]
    }

    /// Send a message from its source endpoint.
    pub fn start(&self, vn: usize, message: Message) -> SimResult {
        if message.dst() >= self.nics.len() {
            return sim_error!(format!("{}: no endpoint for {message}", self.entity));
        }
        match self.nics.get(message.src()) {
            Some(nic) => nic.start(vn, message),
            None => sim_error!(format!("{}: no endpoint for {message}", self.entity)),
        }
    }

    /// Use the same notifier for every endpoint.
    pub fn set_notifier(&self, notifier: &Rc<dyn MessageNotifier>) {
        for nic in &self.nics {
            nic.set_notifier(notifier.clone());
        }
    }

    #[must_use]
    pub fn queue_length(&self, switch: SwitchId, port: usize) -> usize {
        self.switches[switch].queue_length(port)
    }

    #[must_use]
    pub fn bytes_sent(&self, switch: SwitchId, port: usize) -> u64 {
        self.switches[switch].bytes_sent(port)
    }

    /// Sum over all packets of bytes times hops taken, when collected.
    #[must_use]
    pub fn byte_hops(&self) -> Option<u64> {
        self.stats.byte_hops.as_ref().map(|b| b.get())
    }

    #[must_use]
    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.nics.iter().map(|nic| nic.messages_received()).sum()
    }

    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.nics.iter().map(|nic| nic.bytes_received()).sum()
    }

    #[must_use]
    pub fn last_delivery(&self) -> SimTime {
        self.nics
            .iter()
            .map(|nic| nic.last_delivery())
            .max()
            .unwrap_or(SimTime::ZERO)
    }

    /// Packets still held by endpoints or switches.
    #[must_use]
    pub fn num_undelivered(&self) -> usize {
        let queued: usize = self.nics.iter().map(|nic| nic.num_queued()).sum();
        let waiting: usize = self.switches.iter().map(|s| s.num_waiting()).sum();
        queued + waiting
    }

    /// Report every buffer with packets stuck waiting for credit. Only
    /// meaningful once the engine has run out of events.
    pub fn deadlock_check(&self) -> Vec<String> {
        let mut stuck: Vec<String> = self
            .switches
            .iter()
            .flat_map(|switch| switch.deadlock_check())
            .collect();
        for nic in &self.nics {
            if nic.num_queued() > 0 {
                stuck.push(format!(
                    "{nic}: {} packets waiting, {} bytes of credit",
                    nic.num_queued(),
                    nic.injection_credits()
                ));
            }
        }
        for line in &stuck {
            warn!(self.entity ; "{}", line);
        }
        stuck
    }

    /// Write the congestion matrix as CSV to `path`.
    pub fn write_congestion_matrix(&self, path: &Path) -> SimResult {
        let Some(spyplot) = &self.stats.spyplot else {
            return sim_error!(format!("{}: congestion matrix not collected", self.entity));
        };
        let to_error =
            |e: std::io::Error| SimError(format!("unable to write {}: {e}", path.display()));
        let file = fs::File::create(path).map_err(to_error)?;
        let mut writer = BufWriter::new(file);
        spyplot.dump_csv(&mut writer).map_err(to_error)?;
        writer.flush().map_err(to_error)
    }

    /// Log a summary of the run and write any configured statistics files.
    pub fn report(&self, engine: &Engine) -> SimResult {
        let end = self.last_delivery();
        let bytes = self.bytes_received();
        info!(self.entity ; "delivered {} messages, {} bytes by {}",
            self.messages_received(), bytes, end);
        if end > SimTime::ZERO {
            info!(self.entity ; "throughput {:.3} GB/s", bytes as f64 / end.as_ns());
        }
        info!(self.entity ; "{} events", engine.num_events());

        if self.config.stats.bytes_sent {
            for switch in &self.switches {
                for port in switch.output_ports() {
                    info!(self.entity ; "{}: port {} sent {} bytes", switch, port, switch.bytes_sent(port));
                }
            }
        }
        if let Some(byte_hops) = self.byte_hops() {
            info!(self.entity ; "{} byte hops", byte_hops);
        }
        if let Some(histogram) = &self.stats.histogram {
            info!(self.entity ; "congestion delay histogram ({} ns bins): {:?}",
                histogram.bin_size(), histogram.bins());
        }
        if let Some(spyplot) = &self.stats.spyplot {
            info!(self.entity ; "total congestion delay {:.3} ns", spyplot.total());
        }
        if let Some(path) = &self.config.stats.congestion_matrix_file {
            self.write_congestion_matrix(path)?;
            info!(self.entity ; "congestion matrix written to {}", path.display());
        }
        Ok(())
    }
}

/// Size every output port of a switch.
fn output_ports(
    topology: &Topology,
    config: &NetworkConfig,
    id: SwitchId,
    endpoint_ports: &[usize],
) -> Vec<OutputPort> {
    let switch = &config.switch;
    let mut outputs: Vec<OutputPort> = topology
        .connected_outports(id)
        .into_iter()
        .map(|c| {
            let scale = topology.port_scale(id, c.src_outport);
            OutputPort {
                port: c.src_outport,
                link_bandwidth: switch.link_bandwidth * scale,
                crossbar_bandwidth: switch.crossbar_bandwidth() * scale,
                output_buffer_size: scaled_size(switch.output_buffer_size, scale),
                downstream_buffer_size: scaled_size(
                    switch.input_buffer_size,
                    topology.port_scale(c.dst, c.dst_inport),
                ),
            }
        })
        .collect();
    outputs.extend(endpoint_ports.iter().map(|&port| OutputPort {
        port,
        link_bandwidth: config.nic.ejection_bandwidth(),
        crossbar_bandwidth: switch.crossbar_bandwidth(),
        output_buffer_size: switch.output_buffer_size,
        downstream_buffer_size: config.nic.eject_buffer_size,
    }));
    outputs
}
