// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Drive a synthetic traffic pattern through a simulated network.
//!
//! The network is described by a TOML file (see `NetworkConfig`) which can
//! be overridden with `NETSIM_` environment variables. Every endpoint sends
//! `--messages-per-node` messages to the destination picked by `--pattern`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use netsim_components::packet::{Message, MessageId};
use netsim_engine::engine::Engine;
use netsim_engine::types::SimError;
use netsim_models::config::NetworkConfig;
use netsim_models::network::Network;
use netsim_topology::traffic::TrafficPattern;
use netsim_track::builder::{TrackerConfig, setup_trackers};
use netsim_track::info;
use rand::SeedableRng;
use rand::rngs::StdRng;

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum Pattern {
    #[default]
    Uniform,
    NearestNeighbor,
    Tornado,
    BitComplement,
}

impl From<Pattern> for TrafficPattern {
    fn from(pattern: Pattern) -> Self {
        match pattern {
            Pattern::Uniform => TrafficPattern::Uniform,
            Pattern::NearestNeighbor => TrafficPattern::NearestNeighbor,
            Pattern::Tornado => TrafficPattern::Tornado,
            Pattern::BitComplement => TrafficPattern::BitComplement,
        }
    }
}

/// Command-line arguments.
#[derive(Parser)]
#[command(about = "Network simulation application")]
struct Cli {
    /// TOML file describing the network. Defaults are used if not given.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable logging to the console.
    #[arg(long, default_value = "false")]
    stdout: bool,

    /// Level of log message to display.
    #[arg(long, default_value = "Info")]
    stdout_level: log::Level,

    /// Set a regular expression for which entites should have logging level set
    /// to `--stdout-level`. Others will have level set to `Error`.
    #[arg(long, default_value = "")]
    stdout_filter_regex: String,

    /// What traffic pattern to use.
    #[arg(long, default_value_t, value_enum)]
    pattern: Pattern,

    /// Size of each message.
    #[arg(long, default_value = "65536")]
    message_bytes: usize,

    /// Number of messages each endpoint sends.
    #[arg(long, default_value = "1")]
    messages_per_node: usize,

    /// Seed for random number generator.
    #[arg(long, default_value = "1")]
    seed: u64,
}

fn inject(network: &Network, args: &Cli) -> Result<usize, SimError> {
    let pattern = TrafficPattern::from(args.pattern);
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut next_id = 0;
    for _ in 0..args.messages_per_node {
        for src in 0..network.num_endpoints() {
            let dst = pattern.destination(network.topology(), src, &mut rng)?;
            network.start(
                0,
                Message::new(MessageId(next_id), src, dst, args.message_bytes),
            )?;
            next_id += 1;
        }
    }
    Ok(next_id as usize)
}

fn run(args: &Cli) -> Result<(), SimError> {
    let tracker = setup_trackers(&TrackerConfig {
        enable: args.stdout,
        level: args.stdout_level,
        filter_regex: &args.stdout_filter_regex,
        file: None,
    })
    .map_err(|e| SimError(e.0))?;

    let config = NetworkConfig::load(args.config.as_deref())?;
    let mut engine: Engine = config.build_engine(&tracker)?;
    let network = Network::new(&engine, &config)?;
    let top = engine.top().clone();

    let num_messages = inject(&network, args)?;
    info!(top ; "{} messages of {} bytes, {} pattern", num_messages, args.message_bytes,
        TrafficPattern::from(args.pattern));

    engine.run()?;
    network.report(&engine)?;

    let stuck = network.deadlock_check();
    if !stuck.is_empty() {
        return Err(SimError(format!(
            "{} of {num_messages} messages undelivered, {} resources blocked",
            network.num_undelivered(),
            stuck.len()
        )));
    }
    println!(
        "{} messages delivered by {} ({} events)",
        network.messages_received(),
        network.last_delivery(),
        engine.num_events()
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Cli::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
