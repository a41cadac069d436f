//! Flow table module - groups validated flow records into per-flow series.
//!
//! A flow series is identified by (source, destination, destination port) and
//! owns the raw event timestamps seen for that key. Timestamps are kept in
//! arrival order; everything downstream sorts before computing intervals.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::error::AnalyzerError;

/// Unique identifier for a logical flow series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FlowKey {
    pub src: String,
    pub dst: String,
    pub dst_port: u16,
}

impl FlowKey {
    pub fn new(src: impl Into<String>, dst: impl Into<String>, dst_port: u16) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            dst_port,
        }
    }
}

impl std::fmt::Display for FlowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}:{}", self.src, self.dst, self.dst_port)
    }
}

/// One row of the flow table: a single observed connection event.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRecord {
    pub key: FlowKey,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

impl FlowRecord {
    pub fn new(src: &str, dst: &str, dst_port: u16, timestamp: f64) -> Self {
        Self {
            key: FlowKey::new(src, dst, dst_port),
            timestamp,
        }
    }
}

/// Timestamps observed for one flow key.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSeries {
    pub key: FlowKey,
    pub timestamps: Vec<f64>,
}

impl FlowSeries {
    pub fn new(key: FlowKey) -> Self {
        Self {
            key,
            timestamps: Vec::new(),
        }
    }

    pub fn event_count(&self) -> usize {
        self.timestamps.len()
    }
}

/// The full set of flow series for one analysis run.
///
/// Series are keyed in a `BTreeMap` so iteration order, and with it every
/// report built from the table, is deterministic.
#[derive(Debug, Clone, Default)]
pub struct FlowTable {
    series: BTreeMap<FlowKey, FlowSeries>,
    record_count: usize,
}

impl FlowTable {
    /// Groups records into series, rejecting records the core cannot analyze.
    ///
    /// Errors report the 1-based position of the offending record.
    pub fn from_records<I>(records: I) -> Result<Self, AnalyzerError>
    where
        I: IntoIterator<Item = FlowRecord>,
    {
        let mut table = Self::default();

        for (idx, record) in records.into_iter().enumerate() {
            let position = idx + 1;
            if record.key.src.trim().is_empty() {
                return Err(AnalyzerError::invalid_record(position, "empty source address"));
            }
            if record.key.dst.trim().is_empty() {
                return Err(AnalyzerError::invalid_record(
                    position,
                    "empty destination address",
                ));
            }
            if !record.timestamp.is_finite() {
                return Err(AnalyzerError::invalid_record(
                    position,
                    format!("timestamp {} is not a finite number", record.timestamp),
                ));
            }

            table
                .series
                .entry(record.key.clone())
                .or_insert_with(|| FlowSeries::new(record.key))
                .timestamps
                .push(record.timestamp);
            table.record_count += 1;
        }

        debug!(
            "Grouped {} records into {} flow series",
            table.record_count,
            table.series.len()
        );

        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn get(&self, key: &FlowKey) -> Option<&FlowSeries> {
        self.series.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlowSeries> {
        self.series.values()
    }

    /// Groups series under their source address.
    pub fn by_source(&self) -> BTreeMap<&str, Vec<&FlowSeries>> {
        let mut grouped: BTreeMap<&str, Vec<&FlowSeries>> = BTreeMap::new();
        for series in self.series.values() {
            grouped.entry(series.key.src.as_str()).or_default().push(series);
        }
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_by_full_key() {
        let table = FlowTable::from_records(vec![
            FlowRecord::new("10.0.0.5", "203.0.113.9", 443, 10.0),
            FlowRecord::new("10.0.0.5", "203.0.113.9", 443, 70.0),
            FlowRecord::new("10.0.0.5", "203.0.113.9", 80, 15.0),
            FlowRecord::new("10.0.0.6", "203.0.113.9", 443, 20.0),
        ])
        .unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.record_count(), 4);

        let key = FlowKey::new("10.0.0.5", "203.0.113.9", 443);
        assert_eq!(table.get(&key).unwrap().timestamps, vec![10.0, 70.0]);
    }

    #[test]
    fn test_by_source_pools_destinations() {
        let table = FlowTable::from_records(vec![
            FlowRecord::new("a", "x", 1, 1.0),
            FlowRecord::new("a", "y", 2, 2.0),
            FlowRecord::new("b", "x", 1, 3.0),
        ])
        .unwrap();

        let grouped = table.by_source();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["a"].len(), 2);
        assert_eq!(grouped["b"].len(), 1);
    }

    #[test]
    fn test_rejects_non_finite_timestamp() {
        let err = FlowTable::from_records(vec![
            FlowRecord::new("a", "x", 1, 1.0),
            FlowRecord::new("a", "x", 1, f64::NAN),
        ])
        .unwrap_err();

        assert!(matches!(err, AnalyzerError::InvalidRecord { index: 2, .. }));
        assert!(err.to_string().starts_with("Invalid record #2"));
    }

    #[test]
    fn test_rejects_empty_address() {
        let err = FlowTable::from_records(vec![FlowRecord::new(" ", "x", 1, 1.0)]).unwrap_err();
        assert!(matches!(err, AnalyzerError::InvalidRecord { index: 1, .. }));
    }

    #[test]
    fn test_flow_key_display() {
        let key = FlowKey::new("10.0.0.5", "198.51.100.7", 8443);
        assert_eq!(key.to_string(), "10.0.0.5 -> 198.51.100.7:8443");
    }
}
