// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Passive statistics sinks for congestion delays.
//!
//! Switches and endpoints report every packet hop to the configured sinks.
//! Nothing is ever read back by the network itself.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::io::Write;
use std::rc::Rc;

use netsim_engine::sim_error;
use netsim_engine::time::simtime::SimTime;
use netsim_engine::types::SimError;
use netsim_topology::NodeId;

pub trait SpyPlot {
    fn add(&self, src: NodeId, dst: NodeId, value: f64);
}

pub trait Histogram {
    fn collect(&self, value: f64);
}

/// A sparse source/destination matrix of summed values.
#[derive(Default)]
pub struct StatSpyPlot {
    cells: RefCell<BTreeMap<(NodeId, NodeId), f64>>,
}

impl StatSpyPlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, src: NodeId, dst: NodeId) -> f64 {
        self.cells.borrow().get(&(src, dst)).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.cells.borrow().values().sum()
    }

    /// Write non-zero cells as `src,dst,value` lines.
    pub fn dump_csv(&self, writer: &mut dyn Write) -> std::io::Result<()> {
        writeln!(writer, "src,dst,value")?;
        for ((src, dst), value) in self.cells.borrow().iter() {
            writeln!(writer, "{src},{dst},{value}")?;
        }
        Ok(())
    }
}

impl SpyPlot for StatSpyPlot {
    fn add(&self, src: NodeId, dst: NodeId, value: f64) {
        *self.cells.borrow_mut().entry((src, dst)).or_insert(0.0) += value;
    }
}

/// Fixed-width bins with a final overflow bin.
pub struct StatHistogram {
    bin_size: f64,
    bins: RefCell<Vec<u64>>,
}

impl StatHistogram {
    pub fn new(bin_size: f64, num_bins: usize) -> Result<Self, SimError> {
        if !(bin_size > 0.0) || num_bins == 0 {
            return sim_error!(format!(
                "histogram needs a positive bin size and at least one bin, got {bin_size} x {num_bins}"
            ));
        }
        Ok(Self {
            bin_size,
            bins: RefCell::new(vec![0; num_bins]),
        })
    }

    #[must_use]
    pub fn bins(&self) -> Vec<u64> {
        self.bins.borrow().clone()
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.bins.borrow().iter().sum()
    }

    #[must_use]
    pub fn bin_size(&self) -> f64 {
        self.bin_size
    }
}

impl Histogram for StatHistogram {
    fn collect(&self, value: f64) {
        let mut bins = self.bins.borrow_mut();
        let last = bins.len() - 1;
        let bin = ((value.max(0.0) / self.bin_size) as usize).min(last);
        bins[bin] += 1;
    }
}

/// The sinks a switch or endpoint reports to, shared network-wide.
#[derive(Clone, Default)]
pub struct CongestionStats {
    pub spyplot: Option<Rc<dyn SpyPlot>>,
    pub histogram: Option<Rc<dyn Histogram>>,
    pub byte_hops: Option<Rc<Cell<u64>>>,
}

impl CongestionStats {
    /// Report one hop of a packet.
    pub fn report_hop(&self, src: NodeId, dst: NodeId, num_bytes: usize, delay: SimTime) {
        let delay_ns = delay.as_ns();
        if let Some(spyplot) = &self.spyplot {
            spyplot.add(src, dst, delay_ns);
        }
        if let Some(histogram) = &self.histogram {
            histogram.collect(delay_ns);
        }
        if let Some(byte_hops) = &self.byte_hops {
            byte_hops.set(byte_hops.get() + num_bytes as u64);
        }
    }
}
