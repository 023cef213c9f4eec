// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Network configuration.
//!
//! A [`NetworkConfig`] is built from, in increasing order of priority:
//!  - the defaults below,
//!  - an optional TOML file,
//!  - environment variables prefixed with `NETSIM_`, where `__` separates
//!    nested keys (e.g. `NETSIM_SWITCH__HOP_LATENCY_NS=50`).
//!
//! Bandwidths are in GB/s (bytes per nanosecond), latencies in nanoseconds
//! and buffer sizes in bytes.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use netsim_components::arbitrator::ArbitratorKind;
use netsim_components::packetizer::PacketizerKind;
use netsim_components::policy::ArbitrationPolicy;
use netsim_engine::engine::Engine;
use netsim_engine::sim_error;
use netsim_engine::time::simtime::SimTime;
use netsim_engine::types::SimError;
use netsim_topology::config::TopologyConfig;
use netsim_topology::{StructuredTopology, Topology};
use netsim_track::Tracker;
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "NETSIM_";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SwitchConfig {
    pub link_bandwidth: f64,

    /// Bandwidth from the crossbar to each output buffer, defaults to the
    /// link bandwidth.
    pub crossbar_bandwidth: Option<f64>,
    pub hop_latency_ns: f64,
    pub input_buffer_size: usize,
    pub output_buffer_size: usize,
    pub arbitrator: ArbitratorKind,
    pub crossbar_policy: ArbitrationPolicy,

    /// Largest packet.
    pub mtu: usize,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            link_bandwidth: 25.0,
            crossbar_bandwidth: None,
            hop_latency_ns: 100.0,
            input_buffer_size: 64 * 1024,
            output_buffer_size: 64 * 1024,
            arbitrator: ArbitratorKind::CutThrough,
            crossbar_policy: ArbitrationPolicy::RoundRobin,
            mtu: 4096,
        }
    }
}

impl SwitchConfig {
    #[must_use]
    pub fn crossbar_bandwidth(&self) -> f64 {
        self.crossbar_bandwidth.unwrap_or(self.link_bandwidth)
    }

    #[must_use]
    pub fn hop_latency(&self) -> SimTime {
        SimTime::from_ns(self.hop_latency_ns)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct NicConfig {
    pub injection_bandwidth: f64,

    /// Defaults to the injection bandwidth.
    pub ejection_bandwidth: Option<f64>,
    pub injection_latency_ns: f64,
    pub eject_buffer_size: usize,
    pub packetizer: PacketizerKind,
}

impl Default for NicConfig {
    fn default() -> Self {
        Self {
            injection_bandwidth: 25.0,
            ejection_bandwidth: None,
            injection_latency_ns: 50.0,
            eject_buffer_size: 1 << 30,
            packetizer: PacketizerKind::CutThrough,
        }
    }
}

impl NicConfig {
    #[must_use]
    pub fn ejection_bandwidth(&self) -> f64 {
        self.ejection_bandwidth.unwrap_or(self.injection_bandwidth)
    }

    #[must_use]
    pub fn injection_latency(&self) -> SimTime {
        SimTime::from_ns(self.injection_latency_ns)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct HistogramConfig {
    pub bin_size_ns: f64,
    pub num_bins: usize,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StatsConfig {
    pub accumulate_congestion_delay: bool,

    /// Collect congestion delay per source/destination pair.
    pub congestion_matrix: bool,

    /// CSV file the congestion matrix is written to when the network
    /// reports.
    pub congestion_matrix_file: Option<PathBuf>,
    pub congestion_delay_histogram: Option<HistogramConfig>,
    pub bytes_sent: bool,
    pub byte_hops: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub partitions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { partitions: 1 }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub topology: TopologyConfig,
    pub switch: SwitchConfig,
    pub nic: NicConfig,
    pub stats: StatsConfig,
    pub engine: EngineConfig,
}

fn bad_bandwidth(bandwidth: f64) -> bool {
    !(bandwidth > 0.0 && bandwidth.is_finite())
}

fn bad_latency(latency_ns: f64) -> bool {
    !(latency_ns >= 0.0 && latency_ns.is_finite())
}

impl NetworkConfig {
    /// Load defaults, then `conf_file` (if given), then `NETSIM_` environment
    /// variables.
    pub fn load(conf_file: Option<&Path>) -> Result<Self, SimError> {
        let mut figment = Figment::new().merge(Serialized::defaults(NetworkConfig::default()));
        if let Some(conf_file) = conf_file {
            if !conf_file.exists() {
                return sim_error!(format!(
                    "configuration file {} not found",
                    conf_file.display()
                ));
            }
            figment = figment.merge(Toml::file(conf_file));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: NetworkConfig = figment
            .extract()
            .map_err(|e| SimError(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from a TOML string, without consulting the
    /// environment.
    pub fn from_toml(toml: &str) -> Result<Self, SimError> {
        let config: NetworkConfig = Figment::new()
            .merge(Serialized::defaults(NetworkConfig::default()))
            .merge(Toml::string(toml))
            .extract()
            .map_err(|e| SimError(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that would otherwise stop the network from making
    /// progress.
    pub fn validate(&self) -> Result<(), SimError> {
        let topology = Topology::from_config(&self.topology)?;
        let num_vcs = topology.num_vcs();
        let mtu = self.switch.mtu;
        if mtu == 0 {
            return sim_error!("switch.mtu must be non-zero");
        }

        for (name, bandwidth) in [
            ("switch.link_bandwidth", self.switch.link_bandwidth),
            ("switch.crossbar_bandwidth", self.switch.crossbar_bandwidth()),
            ("nic.injection_bandwidth", self.nic.injection_bandwidth),
            ("nic.ejection_bandwidth", self.nic.ejection_bandwidth()),
        ] {
            if bad_bandwidth(bandwidth) {
                return sim_error!(format!("{name} must be positive, got {bandwidth}"));
            }
        }
        for (name, latency) in [
            ("switch.hop_latency_ns", self.switch.hop_latency_ns),
            ("nic.injection_latency_ns", self.nic.injection_latency_ns),
        ] {
            if bad_latency(latency) {
                return sim_error!(format!("{name} must be non-negative, got {latency}"));
            }
        }

        for (name, size) in [
            ("switch.input_buffer_size", self.switch.input_buffer_size),
            ("switch.output_buffer_size", self.switch.output_buffer_size),
            ("nic.eject_buffer_size", self.nic.eject_buffer_size),
        ] {
            if size / num_vcs < mtu {
                return sim_error!(format!(
                    "{name} of {size} bytes over {num_vcs} virtual channels cannot hold a {mtu} byte packet"
                ));
            }
        }

        if let Some(histogram) = &self.stats.congestion_delay_histogram {
            if !(histogram.bin_size_ns > 0.0) || histogram.num_bins == 0 {
                return sim_error!(format!(
                    "stats.congestion_delay_histogram needs a positive bin_size_ns and num_bins, got {} and {}",
                    histogram.bin_size_ns, histogram.num_bins
                ));
            }
        }

        if self.stats.congestion_matrix_file.is_some() && !self.stats.congestion_matrix {
            return sim_error!("stats.congestion_matrix_file requires stats.congestion_matrix");
        }

        if self.engine.partitions == 0 {
            return sim_error!("engine.partitions must be at least 1");
        }
        if self.engine.partitions > 1 && self.switch.hop_latency() == SimTime::ZERO {
            return sim_error!("engine.partitions > 1 requires a non-zero switch.hop_latency_ns");
        }
        Ok(())
    }

    /// Create an engine with the configured partitions.
    ///
    /// Only switch-to-switch links cross partitions so the hop latency is the
    /// lookahead.
    pub fn build_engine(&self, tracker: &Tracker) -> Result<Engine, SimError> {
        if self.engine.partitions == 1 {
            Ok(Engine::new(tracker))
        } else {
            Engine::with_partitions(tracker, self.engine.partitions, self.switch.hop_latency())
        }
    }
}
