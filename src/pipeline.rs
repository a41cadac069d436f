//! Hunt pipeline - ties the detectors together for one batch run.
//!
//! ```text
//! flow table ──> host baselines (phase 1, frozen)
//!     │                  │
//!     └──> per-flow statistics ──> regularity ──> signals ──> risk (phase 2)
//! ```
//!
//! Phase 1 reads the whole table before anything is scored. Phase 2 only
//! reads the frozen baseline map, so series are scored in parallel.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::analyzer::{FlowAnalysis, FlowClassification, FlowStatistics};
use crate::baseline::{HostBaseline, HostBaselines};
use crate::config::Config;
use crate::dns_detector::{aggregate_domains, DnsDetector, DnsRecord, DomainEntropy};
use crate::error::AnalyzerError;
use crate::flow::{FlowKey, FlowSeries, FlowTable};
use crate::ioc::IocList;
use crate::regularity::{is_adaptive_beacon, Regularity};
use crate::scoring::{fuse, RiskScore, SignalSet};

/// Output record for one analyzed flow series.
#[derive(Debug, Clone, Serialize)]
pub struct FlowReport {
    pub key: FlowKey,
    pub event_count: usize,
    pub periodicity_score: f64,
    /// Present only when the source host has a baseline.
    pub regularity: Option<Regularity>,
    pub stats: FlowStatistics,
    pub classification: FlowClassification,
    pub host_baseline: Option<HostBaseline>,
    /// Tight in absolute terms and tighter than the host baseline.
    pub adaptive_beacon: bool,
    /// Absolute check only, independent of any baseline.
    pub low_variance: bool,
    pub ioc_match: bool,
    pub risk: RiskScore,
}

impl FlowReport {
    pub fn regularity_score(&self) -> Option<f64> {
        self.regularity.as_ref().map(Regularity::value)
    }
}

/// Ranked result of a beacon hunt over one flow table.
#[derive(Debug, Clone, Serialize)]
pub struct HuntReport {
    pub generated_at: DateTime<Utc>,
    pub total_records: usize,
    pub total_flows: usize,
    pub skipped_flows: usize,
    pub host_baselines: usize,
    /// Analyzed flows, most periodic first.
    pub flows: Vec<FlowReport>,
}

impl HuntReport {
    pub fn beacon_candidates(&self) -> impl Iterator<Item = &FlowReport> {
        self.flows.iter().filter(|f| f.adaptive_beacon)
    }
}

/// Runs both phases over a flow table.
pub fn hunt_beacons(table: &FlowTable, config: &Config, iocs: Option<&IocList>) -> HuntReport {
    let baselines = HostBaselines::build(table, config.baseline.min_samples_host);

    let series: Vec<&FlowSeries> = table.iter().collect();
    let mut flows: Vec<FlowReport> = series
        .into_par_iter()
        .filter_map(|s| score_series(s, &baselines, config, iocs))
        .collect();

    flows.sort_by(rank);

    let skipped_flows = table.len() - flows.len();
    let report = HuntReport {
        generated_at: Utc::now(),
        total_records: table.record_count(),
        total_flows: table.len(),
        skipped_flows,
        host_baselines: baselines.len(),
        flows,
    };

    info!(
        "Hunt complete: {} flows, {} analyzed, {} skipped, {} beacon candidates",
        report.total_flows,
        report.flows.len(),
        report.skipped_flows,
        report.beacon_candidates().count()
    );

    report
}

/// Scores one series against the frozen baselines.
///
/// Returns `None` when the series has too few events to analyze.
pub fn score_series(
    series: &FlowSeries,
    baselines: &HostBaselines,
    config: &Config,
    iocs: Option<&IocList>,
) -> Option<FlowReport> {
    if series.event_count() < config.flow.min_samples_flow {
        debug!(
            "Skipping {}: {} events < {}",
            series.key,
            series.event_count(),
            config.flow.min_samples_flow
        );
        return None;
    }

    let analysis = match FlowAnalysis::from_series(series, &config.detection) {
        Ok(analysis) => analysis,
        Err(AnalyzerError::InsufficientData { required, actual }) => {
            debug!("Skipping {}: need {} events, got {}", series.key, required, actual);
            return None;
        }
        Err(e) => {
            debug!("Skipping {}: {}", series.key, e);
            return None;
        }
    };

    let host_baseline = baselines.get(&series.key.src).cloned();
    let regularity = host_baseline
        .as_ref()
        .map(|host| Regularity::score(&analysis.stats, host, &config.detection));
    let adaptive_beacon = regularity
        .as_ref()
        .is_some_and(|r| is_adaptive_beacon(&analysis.stats, r, &config.detection));
    let low_variance = analysis.is_low_variance(config.detection.stddev_threshold_sec);
    let ioc_match = iocs.is_some_and(|list| list.matches_addr(&series.key.dst));

    let signals = flow_signals(adaptive_beacon, low_variance, host_baseline.is_some(), ioc_match);
    let risk = fuse(&signals, &config.scoring);

    if adaptive_beacon {
        debug!(
            "Adaptive beacon candidate {}: std {:.3}s, regularity {:.2}",
            series.key,
            analysis.stats.std_dev,
            regularity.as_ref().map(Regularity::value).unwrap_or_default()
        );
    }

    Some(FlowReport {
        key: analysis.key,
        event_count: analysis.event_count,
        periodicity_score: analysis.periodicity_score,
        regularity,
        stats: analysis.stats,
        classification: analysis.classification,
        host_baseline,
        adaptive_beacon,
        low_variance,
        ioc_match,
        risk,
    })
}

/// Weak signals a single flow can contribute on its own.
///
/// Without a host baseline the baseline-relative decision is impossible, so
/// the absolute low-variance check stands in for the beacon signal.
pub fn flow_signals(
    adaptive_beacon: bool,
    low_variance: bool,
    has_baseline: bool,
    ioc_match: bool,
) -> SignalSet {
    SignalSet {
        beacon: adaptive_beacon || (!has_baseline && low_variance),
        ioc_match,
        ..SignalSet::default()
    }
}

fn rank(a: &FlowReport, b: &FlowReport) -> Ordering {
    b.periodicity_score
        .total_cmp(&a.periodicity_score)
        .then_with(|| {
            let ra = a.regularity_score().unwrap_or(f64::NEG_INFINITY);
            let rb = b.regularity_score().unwrap_or(f64::NEG_INFINITY);
            rb.total_cmp(&ra)
        })
        .then_with(|| a.key.cmp(&b.key))
}

/// One distinct domain with the weak signals it raised.
#[derive(Debug, Clone, Serialize)]
pub struct DomainFinding {
    #[serde(flatten)]
    pub summary: DomainEntropy,
    /// Clears both the entropy and repeat-count thresholds.
    pub suspicious: bool,
    pub ioc_match: bool,
    pub risk: RiskScore,
}

/// Per-domain entropy report over one DNS query table.
#[derive(Debug, Clone, Serialize)]
pub struct DomainReport {
    pub generated_at: DateTime<Utc>,
    pub total_queries: usize,
    pub distinct_domains: usize,
    /// Every distinct domain, highest entropy first.
    pub domains: Vec<DomainFinding>,
}

impl DomainReport {
    pub fn suspicious(&self) -> impl Iterator<Item = &DomainFinding> {
        self.domains.iter().filter(|d| d.suspicious)
    }

    /// Domains that raised at least one signal, highest risk first.
    pub fn flagged(&self) -> Vec<&DomainFinding> {
        let mut flagged: Vec<&DomainFinding> =
            self.domains.iter().filter(|d| !d.risk.signals.is_empty()).collect();
        flagged.sort_by(|a, b| b.risk.score.cmp(&a.risk.score));
        flagged
    }
}

/// Scores every queried domain for the entropy and IOC signals.
pub fn hunt_domains(
    records: &[DnsRecord],
    config: &Config,
    iocs: Option<&IocList>,
) -> Result<DomainReport, AnalyzerError> {
    let detector = DnsDetector::new(config.dns.clone());

    let domains: Vec<DomainFinding> = aggregate_domains(records)?
        .into_iter()
        .map(|summary| {
            let suspicious = detector.is_suspicious(&summary);
            let ioc_match = iocs.is_some_and(|list| list.matches_domain(&summary.domain));
            let signals = SignalSet {
                dns_entropy: suspicious,
                ioc_match,
                ..SignalSet::default()
            };
            DomainFinding {
                risk: fuse(&signals, &config.scoring),
                summary,
                suspicious,
                ioc_match,
            }
        })
        .collect();

    let report = DomainReport {
        generated_at: Utc::now(),
        total_queries: records.len(),
        distinct_domains: domains.len(),
        domains,
    };

    info!(
        "DNS hunt complete: {} queries, {} domains, {} suspicious, {} flagged",
        report.total_queries,
        report.distinct_domains,
        report.suspicious().count(),
        report.flagged().len()
    );

    Ok(report)
}
