//! CSV ingestion for flow and DNS query tables.
//!
//! Turns log exports into typed records for the analysis core. Headers are
//! matched case-insensitively. Any row the core could not analyze (bad port,
//! unparseable timestamp, blank address or domain) stops ingestion with the
//! file line number of the offending row; nothing is silently coerced or
//! dropped.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime};
use tracing::info;

use crate::dns_detector::DnsRecord;
use crate::error::AnalyzerError;
use crate::flow::FlowRecord;

const TIMESTAMP_COLUMNS: &[&str] = &["timestamp", "ts"];
const DOMAIN_COLUMNS: &[&str] = &["query", "domain"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Converts a timestamp cell to seconds since the Unix epoch.
///
/// Accepts numeric epoch seconds, RFC 3339, and naive `YYYY-MM-DD HH:MM:SS`
/// datetimes (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(secs) = raw.parse::<f64>() {
        return secs.is_finite().then_some(secs);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(to_epoch_secs(dt.timestamp(), dt.timestamp_subsec_nanos()));
    }

    NAIVE_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(raw, fmt).ok().map(|naive| {
            let dt = naive.and_utc();
            to_epoch_secs(dt.timestamp(), dt.timestamp_subsec_nanos())
        })
    })
}

fn to_epoch_secs(secs: i64, nanos: u32) -> f64 {
    secs as f64 + nanos as f64 / 1_000_000_000.0
}

/// Reads a flow table with `src_ip`, `dst_ip`, `dst_port` and `timestamp`/`ts`.
pub fn read_flows<R: Read>(reader: R) -> Result<Vec<FlowRecord>, AnalyzerError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = read_headers(&mut rdr)?;

    let src_idx = require_column(&headers, &["src_ip"])?;
    let dst_idx = require_column(&headers, &["dst_ip"])?;
    let port_idx = require_column(&headers, &["dst_port"])?;
    let ts_idx = require_column(&headers, TIMESTAMP_COLUMNS)?;

    let mut records = Vec::new();
    for result in rdr.records() {
        let row = result.map_err(csv_error)?;
        let line = row_line(&row);

        let src = cell(&row, src_idx);
        let dst = cell(&row, dst_idx);
        if src.is_empty() || dst.is_empty() {
            return Err(AnalyzerError::malformed(line, "blank src_ip or dst_ip"));
        }

        let port_raw = cell(&row, port_idx);
        let port = port_raw.parse::<u16>().map_err(|_| {
            AnalyzerError::malformed(line, format!("dst_port '{}' is not a valid port", port_raw))
        })?;

        let ts_raw = cell(&row, ts_idx);
        let timestamp = parse_timestamp(ts_raw).ok_or_else(|| {
            AnalyzerError::malformed(
                line,
                format!("timestamp '{}' is not a number or datetime", ts_raw),
            )
        })?;

        records.push(FlowRecord::new(src, dst, port, timestamp));
    }

    Ok(records)
}

/// Reads a DNS table with `query`/`domain` and an optional `timestamp`/`ts`.
pub fn read_dns<R: Read>(reader: R) -> Result<Vec<DnsRecord>, AnalyzerError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = read_headers(&mut rdr)?;

    let domain_idx = require_column(&headers, DOMAIN_COLUMNS)?;
    let ts_idx = find_column(&headers, TIMESTAMP_COLUMNS);

    let mut records = Vec::new();
    for result in rdr.records() {
        let row = result.map_err(csv_error)?;
        let line = row_line(&row);

        let domain = cell(&row, domain_idx);
        if domain.is_empty() {
            return Err(AnalyzerError::malformed(line, "blank domain"));
        }

        let timestamp = match ts_idx.map(|idx| cell(&row, idx)) {
            None | Some("") => None,
            Some(raw) => Some(parse_timestamp(raw).ok_or_else(|| {
                AnalyzerError::malformed(
                    line,
                    format!("timestamp '{}' is not a number or datetime", raw),
                )
            })?),
        };

        records.push(DnsRecord::new(domain, timestamp));
    }

    Ok(records)
}

pub fn load_flows(path: &Path) -> Result<Vec<FlowRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open flow CSV: {}", path.display()))?;
    let records =
        read_flows(file).with_context(|| format!("Invalid flow CSV: {}", path.display()))?;
    info!("Loaded {} flow records from {}", records.len(), path.display());
    Ok(records)
}

pub fn load_dns(path: &Path) -> Result<Vec<DnsRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open DNS CSV: {}", path.display()))?;
    let records =
        read_dns(file).with_context(|| format!("Invalid DNS CSV: {}", path.display()))?;
    info!("Loaded {} DNS records from {}", records.len(), path.display());
    Ok(records)
}

fn read_headers<R: Read>(rdr: &mut csv::Reader<R>) -> Result<Vec<String>, AnalyzerError> {
    let headers = rdr.headers().map_err(csv_error)?;
    Ok(headers.iter().map(|h| h.to_lowercase()).collect())
}

fn find_column(headers: &[String], names: &[&str]) -> Option<usize> {
    names
        .iter()
        .find_map(|name| headers.iter().position(|h| h == name))
}

fn require_column(headers: &[String], names: &[&str]) -> Result<usize, AnalyzerError> {
    find_column(headers, names).ok_or_else(|| AnalyzerError::MissingColumn {
        column: names.join("|"),
    })
}

fn cell(row: &csv::StringRecord, idx: usize) -> &str {
    row.get(idx).unwrap_or_default()
}

fn row_line(row: &csv::StringRecord) -> usize {
    row.position().map(|p| p.line() as usize).unwrap_or(0)
}

fn csv_error(err: csv::Error) -> AnalyzerError {
    let line = err.position().map(|p| p.line() as usize).unwrap_or(0);
    AnalyzerError::malformed(line, err.to_string())
}
