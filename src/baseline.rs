//! Host baseline module - how each source host behaves in general.
//!
//! A baseline pools the intervals of every (destination, port) series under
//! one source address. It is deliberately broader than per-flow statistics:
//! it describes the host, not any single conversation.
//!
//! Baselines are built in one pass over the complete flow table and frozen
//! before any flow is scored. Hosts whose pooled interval count stays below
//! the configured minimum get no entry at all; absence means "no baseline",
//! never "zero spread".

use std::collections::HashMap;

use serde::Serialize;
use statrs::statistics::Statistics;
use tracing::{debug, info};

use crate::analyzer::extract_intervals;
use crate::flow::FlowTable;

/// Pooled interval statistics for one source host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostBaseline {
    pub avg_interval: f64,
    pub std_dev: f64,
    pub sample_count: usize,
}

impl HostBaseline {
    /// Computes a baseline from pooled intervals.
    ///
    /// Returns `None` when fewer than `min_samples` intervals are available.
    pub fn from_intervals(intervals: &[f64], min_samples: usize) -> Option<Self> {
        if intervals.is_empty() || intervals.len() < min_samples {
            return None;
        }

        // Same population convention as per-flow statistics
        let avg_interval = intervals.iter().mean();
        let std_dev = intervals.iter().population_std_dev();

        Some(Self {
            avg_interval,
            std_dev,
            sample_count: intervals.len(),
        })
    }

    /// True when every pooled interval was identical.
    pub fn is_degenerate(&self) -> bool {
        self.std_dev <= 0.0
    }
}

/// Frozen source-address to baseline mapping for one analysis run.
#[derive(Debug, Clone, Default)]
pub struct HostBaselines {
    baselines: HashMap<String, HostBaseline>,
    min_samples: usize,
}

impl HostBaselines {
    /// Builds every host baseline from the full flow table.
    ///
    /// Intervals are computed per series and then pooled, so the gap between
    /// the last event to one destination and the first event to another never
    /// counts as an interval.
    pub fn build(table: &FlowTable, min_samples: usize) -> Self {
        let mut baselines = HashMap::new();

        for (src, series_list) in table.by_source() {
            let pooled: Vec<f64> = series_list
                .iter()
                .flat_map(|series| extract_intervals(&series.timestamps))
                .collect();

            match HostBaseline::from_intervals(&pooled, min_samples) {
                Some(baseline) => {
                    debug!(
                        "Baseline for {}: avg {:.2}s, std {:.2}s over {} intervals",
                        src, baseline.avg_interval, baseline.std_dev, baseline.sample_count
                    );
                    baselines.insert(src.to_string(), baseline);
                }
                None => {
                    debug!(
                        "No baseline for {}: {} pooled intervals < {}",
                        src,
                        pooled.len(),
                        min_samples
                    );
                }
            }
        }

        info!(
            "Built {} host baselines (min {} pooled intervals)",
            baselines.len(),
            min_samples
        );

        Self {
            baselines,
            min_samples,
        }
    }

    pub fn get(&self, src: &str) -> Option<&HostBaseline> {
        self.baselines.get(src)
    }

    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HostBaseline)> {
        self.baselines.iter().map(|(src, b)| (src.as_str(), b))
    }
}
