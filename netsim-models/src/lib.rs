// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Switch and endpoint models, and the [network](crate::network::Network)
//! that connects them according to a
//! [`Topology`](netsim_topology::Topology).
//!
//! # Example
//!
//! ```rust
//! use netsim_components::packet::{Message, MessageId};
//! use netsim_engine::run_simulation;
//! use netsim_models::config::NetworkConfig;
//! use netsim_models::network::Network;
//! use netsim_track::tracker::dev_null_tracker;
//!
//! let config = NetworkConfig::default();
//! let mut engine = config.build_engine(&dev_null_tracker()).unwrap();
//! let network = Network::new(&engine, &config).unwrap();
//!
//! network
//!     .start(0, Message::new(MessageId(0), 0, 3, 10_000))
//!     .unwrap();
//! run_simulation!(engine);
//! assert_eq!(network.bytes_received(), 10_000);
//! ```

pub mod config;
pub mod link;
pub mod network;
pub mod nic;
pub mod switch;
