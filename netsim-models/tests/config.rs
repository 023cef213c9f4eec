// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Configuration defaults, TOML files, `NETSIM_` environment overrides and
//! the checks that reject networks that could never make progress.

use std::io::Write;

use approx::assert_relative_eq;
use netsim_components::arbitrator::ArbitratorKind;
use netsim_components::packetizer::PacketizerKind;
use netsim_components::policy::ArbitrationPolicy;
use netsim_models::config::NetworkConfig;
use netsim_topology::config::TopologyKind;
use serial_test::serial;

const TORUS: &str = r#"
[topology]
kind = "torus"
geometry = [4, 4]
concentration = 2

[switch]
arbitrator = "simple"
crossbar_policy = "fifo"
hop_latency_ns = 20.0
link_bandwidth = 50.0

[nic]
packetizer = "simple"
ejection_bandwidth = 12.5

[stats]
congestion_matrix = true

[stats.congestion_delay_histogram]
bin_size_ns = 10.0
num_bins = 8

[engine]
partitions = 2
"#;

fn expect_error(toml: &str, contains: &str) {
    match NetworkConfig::from_toml(toml) {
        Ok(config) => panic!("expected an error, got {config:?}"),
        Err(e) => {
            let msg = format!("{e}");
            assert!(msg.contains(contains), "{msg:?} does not contain {contains:?}");
        }
    }
}

#[test]
fn defaults() {
    let config = NetworkConfig::default();
    config.validate().unwrap();
    assert_eq!(config.topology.kind, TopologyKind::FatTree);
    assert_eq!(config.switch.mtu, 4096);
    assert_eq!(config.switch.arbitrator, ArbitratorKind::CutThrough);
    assert_eq!(config.nic.packetizer, PacketizerKind::CutThrough);
    assert_eq!(config.nic.eject_buffer_size, 1 << 30);
    assert_eq!(config.engine.partitions, 1);
    assert_relative_eq!(config.switch.crossbar_bandwidth(), config.switch.link_bandwidth);
    assert_relative_eq!(config.nic.ejection_bandwidth(), config.nic.injection_bandwidth);
}

#[test]
fn parse_toml() {
    let config = NetworkConfig::from_toml(TORUS).unwrap();
    assert_eq!(config.topology.kind, TopologyKind::Torus);
    assert_eq!(config.topology.geometry, vec![4, 4]);
    assert_eq!(config.topology.concentration, 2);
    assert_eq!(config.switch.arbitrator, ArbitratorKind::Simple);
    assert_eq!(config.switch.crossbar_policy, ArbitrationPolicy::Fifo);
    assert_relative_eq!(config.switch.crossbar_bandwidth(), 50.0);
    assert_relative_eq!(config.nic.ejection_bandwidth(), 12.5);
    assert_eq!(config.nic.packetizer, PacketizerKind::Simple);
    assert!(config.stats.congestion_matrix);
    let histogram = config.stats.congestion_delay_histogram.unwrap();
    assert_eq!(histogram.num_bins, 8);
    assert_eq!(config.engine.partitions, 2);

    // Untouched values keep their defaults.
    assert_eq!(config.switch.mtu, 4096);
}

#[test]
fn undersized_buffers() {
    expect_error(
        "[switch]\nmtu = 8192\ninput_buffer_size = 8192",
        "switch.input_buffer_size of 8192 bytes over 2 virtual channels cannot hold a 8192 byte packet",
    );
    expect_error("[nic]\neject_buffer_size = 100", "nic.eject_buffer_size");
    expect_error("[switch]\nmtu = 0", "switch.mtu");
}

#[test]
fn bad_values() {
    expect_error("[switch]\narbitrator = \"fastest\"", "invalid configuration");
    expect_error("[topology]\nkind = \"ring\"", "invalid configuration");
    expect_error("[topology]\ngeometry = [2, 4, 1]", "fat-tree geometry");
    expect_error("[topology]\nkind = \"torus\"\ngeometry = []", "torus geometry");
    expect_error("[switch]\nlink_bandwidth = 0.0", "switch.link_bandwidth");
    expect_error("[nic]\ninjection_latency_ns = -1.0", "nic.injection_latency_ns");
    expect_error(
        "[stats.congestion_delay_histogram]\nbin_size_ns = 0.0\nnum_bins = 4",
        "congestion_delay_histogram",
    );
    expect_error("[engine]\npartitions = 0", "engine.partitions");
    expect_error(
        "[stats]\ncongestion_matrix_file = \"matrix.csv\"",
        "stats.congestion_matrix_file requires stats.congestion_matrix",
    );
    expect_error(
        "[engine]\npartitions = 2\n[switch]\nhop_latency_ns = 0.0",
        "non-zero switch.hop_latency_ns",
    );
}

#[test]
#[serial]
fn load_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(TORUS.as_bytes()).unwrap();
    let config = NetworkConfig::load(Some(file.path())).unwrap();
    assert_eq!(config, NetworkConfig::from_toml(TORUS).unwrap());

    let missing = file.path().with_extension("missing");
    assert!(NetworkConfig::load(Some(&missing)).is_err());
}

#[test]
#[serial]
fn environment_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(TORUS.as_bytes()).unwrap();

    // SAFETY: tests that touch the environment are serialized.
    unsafe {
        std::env::set_var("NETSIM_SWITCH__HOP_LATENCY_NS", "12.5");
        std::env::set_var("NETSIM_ENGINE__PARTITIONS", "3");
    }
    let from_env = NetworkConfig::load(None);
    let over_file = NetworkConfig::load(Some(file.path()));
    unsafe {
        std::env::remove_var("NETSIM_SWITCH__HOP_LATENCY_NS");
        std::env::remove_var("NETSIM_ENGINE__PARTITIONS");
    }

    let from_env = from_env.unwrap();
    assert_relative_eq!(from_env.switch.hop_latency_ns, 12.5);
    assert_eq!(from_env.engine.partitions, 3);

    let over_file = over_file.unwrap();
    assert_relative_eq!(over_file.switch.hop_latency_ns, 12.5);
    assert_eq!(over_file.engine.partitions, 3);
    assert_eq!(over_file.topology.kind, TopologyKind::Torus);
}
