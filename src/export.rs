//! Export Module
//!
//! Renders hunt results as text for analysts or as JSON / JSON Lines for
//! integration with other security tools.

use serde::Serialize;

use crate::pipeline::{DomainFinding, DomainReport, FlowReport, HuntReport};
use crate::scoring::RiskScore;

const HUNTING_NOTE: &str = "Note: these are weak hunting signals, not a verdict. \
Corroborate before acting.";

/// Output format for exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonLines, // One JSON object per line (JSONL)
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "jsonl" | "jsonlines" => Ok(Self::JsonLines),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
            Self::JsonLines => write!(f, "jsonl"),
        }
    }
}

/// Flat JSON record for one flow, matching the column layout analysts expect.
#[derive(Serialize)]
pub struct JsonFlow<'a> {
    pub src: &'a str,
    pub dst: &'a str,
    pub dst_port: u16,
    pub event_count: usize,
    pub periodicity_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regularity_score: Option<f64>,
    pub flow_mean: f64,
    pub flow_stddev: f64,
    pub flow_min: f64,
    pub flow_max: f64,
    pub cv: f64,
    pub classification: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_baseline_avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_baseline_std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_samples: Option<usize>,
    pub adaptive_beacon: bool,
    pub risk_score: u32,
    pub risk_level: String,
    pub signals: Vec<String>,
}

impl<'a> From<&'a FlowReport> for JsonFlow<'a> {
    fn from(flow: &'a FlowReport) -> Self {
        Self {
            src: &flow.key.src,
            dst: &flow.key.dst,
            dst_port: flow.key.dst_port,
            event_count: flow.event_count,
            periodicity_score: flow.periodicity_score,
            regularity_score: flow.regularity_score(),
            flow_mean: flow.stats.mean,
            flow_stddev: flow.stats.std_dev,
            flow_min: flow.stats.min,
            flow_max: flow.stats.max,
            cv: flow.stats.cv,
            classification: flow.classification.name(),
            host_baseline_avg: flow.host_baseline.as_ref().map(|b| b.avg_interval),
            host_baseline_std: flow.host_baseline.as_ref().map(|b| b.std_dev),
            host_samples: flow.host_baseline.as_ref().map(|b| b.sample_count),
            adaptive_beacon: flow.adaptive_beacon,
            risk_score: flow.risk.score,
            risk_level: flow.risk.level.to_string(),
            signals: flow.risk.signals.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// JSON-serializable hunt report
#[derive(Serialize)]
pub struct JsonHuntReport<'a> {
    pub version: &'static str,
    pub timestamp: String,
    pub total_records: usize,
    pub total_flows: usize,
    pub analyzed_flows: usize,
    pub skipped_flows: usize,
    pub host_baselines: usize,
    pub beacon_candidates: usize,
    pub flows: Vec<JsonFlow<'a>>,
}

impl<'a> JsonHuntReport<'a> {
    fn new(report: &'a HuntReport, top: usize) -> Self {
        Self {
            version: "1.0",
            timestamp: report.generated_at.to_rfc3339(),
            total_records: report.total_records,
            total_flows: report.total_flows,
            analyzed_flows: report.flows.len(),
            skipped_flows: report.skipped_flows,
            host_baselines: report.host_baselines,
            beacon_candidates: report.beacon_candidates().count(),
            flows: take_top(&report.flows, top).iter().map(JsonFlow::from).collect(),
        }
    }
}

fn take_top<T>(items: &[T], top: usize) -> &[T] {
    if top == 0 {
        items
    } else {
        &items[..top.min(items.len())]
    }
}

/// Exports a hunt report; `top` = 0 keeps every flow.
pub fn export_hunt(report: &HuntReport, format: OutputFormat, top: usize) -> String {
    match format {
        OutputFormat::Text => hunt_text(report, top),
        OutputFormat::Json => to_json_pretty(&JsonHuntReport::new(report, top)),
        OutputFormat::JsonLines => hunt_jsonl(report, top),
    }
}

fn hunt_jsonl(report: &HuntReport, top: usize) -> String {
    let mut lines = Vec::new();

    // First line is the summary
    let summary = serde_json::json!({
        "type": "summary",
        "timestamp": report.generated_at.to_rfc3339(),
        "total_records": report.total_records,
        "total_flows": report.total_flows,
        "analyzed_flows": report.flows.len(),
        "skipped_flows": report.skipped_flows,
        "host_baselines": report.host_baselines,
        "beacon_candidates": report.beacon_candidates().count(),
    });
    lines.push(serde_json::to_string(&summary).unwrap_or_default());

    for flow in take_top(&report.flows, top) {
        if let Ok(line) = serde_json::to_string(&JsonFlow::from(flow)) {
            lines.push(line);
        }
    }

    lines.join("\n")
}

fn hunt_text(report: &HuntReport, top: usize) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "--- Beacon Hunt Report ---\nTime: {}\nRecords: {}\nFlows: {} ({} analyzed, {} below minimum events)\nHost Baselines: {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S"),
        report.total_records,
        report.total_flows,
        report.flows.len(),
        report.skipped_flows,
        report.host_baselines,
    ));

    if report.flows.is_empty() {
        output.push_str("\nNo flows met the minimum event threshold.\n");
    } else {
        output.push_str(&format!(
            "\nTop flows by periodicity ({} of {}):\n",
            take_top(&report.flows, top).len(),
            report.flows.len()
        ));
        output.push_str(&format!(
            "{:<44} {:>6} {:>7} {:>9} {:>10} {:>9} {:>17} {:>6}  {}\n",
            "Flow", "Events", "Period", "Regular", "Mean", "StdDev", "Class", "Risk", "Flags"
        ));
        output.push_str(&"-".repeat(121));
        output.push('\n');

        for flow in take_top(&report.flows, top) {
            output.push_str(&format!(
                "{:<44} {:>6} {:>7.3} {:>9} {:>10} {:>9} {:>17} {:>6}  {}\n",
                flow.key.to_string(),
                flow.event_count,
                flow.periodicity_score,
                flow.regularity_score()
                    .map(|r| format!("{:.2}", r))
                    .unwrap_or_else(|| "-".to_string()),
                format_interval(flow.stats.mean),
                format_interval(flow.stats.std_dev),
                flow.classification.name(),
                flow.risk.level.to_string(),
                flow_flags(flow),
            ));
        }
    }

    output.push('\n');
    output.push_str(HUNTING_NOTE);
    output.push('\n');
    output
}

fn flow_flags(flow: &FlowReport) -> String {
    let mut flags = Vec::new();
    if flow.adaptive_beacon {
        flags.push("adaptive-beacon");
    } else if flow.low_variance {
        flags.push("low-variance");
    }
    if flow.ioc_match {
        flags.push("ioc");
    }
    flags.join(",")
}

/// Formats an interval in seconds in a human-readable way
fn format_interval(secs: f64) -> String {
    if secs >= 3600.0 {
        format!("{:.1}h", secs / 3600.0)
    } else if secs >= 60.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.2}s", secs)
    }
}

/// Exports a DNS report; `all` lists every domain instead of only flagged ones.
pub fn export_domains(report: &DomainReport, format: OutputFormat, all: bool) -> String {
    let domains: Vec<&DomainFinding> = if all {
        report.domains.iter().collect()
    } else {
        report.flagged()
    };

    match format {
        OutputFormat::Text => domains_text(report, &domains, all),
        OutputFormat::Json => to_json_pretty(&serde_json::json!({
            "version": "1.0",
            "timestamp": report.generated_at.to_rfc3339(),
            "total_queries": report.total_queries,
            "distinct_domains": report.distinct_domains,
            "suspicious_count": report.suspicious().count(),
            "domains": domains,
        })),
        OutputFormat::JsonLines => domains
            .iter()
            .filter_map(|d| serde_json::to_string(d).ok())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn domains_text(report: &DomainReport, domains: &[&DomainFinding], all: bool) -> String {
    let mut output = format!(
        "--- DNS Entropy Report ---\nTime: {}\nQueries: {}\nDistinct Domains: {}\nSuspicious: {}\n\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S"),
        report.total_queries,
        report.distinct_domains,
        report.suspicious().count(),
    );

    if domains.is_empty() {
        output.push_str("Flagged Domains: None detected\n");
    } else {
        output.push_str(if all {
            "All Domains:\n"
        } else {
            "Flagged Domains:\n"
        });
        output.push_str(&format!(
            "{:<60} {:>8} {:>8} {:>7}  {}\n",
            "Domain", "Entropy", "Queries", "Risk", "Signals"
        ));
        output.push_str(&"-".repeat(100));
        output.push('\n');
        for d in domains {
            let signals: Vec<String> = d.risk.signals.iter().map(|s| s.to_string()).collect();
            output.push_str(&format!(
                "{:<60} {:>8.2} {:>8} {:>7}  {}\n",
                d.summary.domain,
                d.summary.entropy,
                d.summary.query_count,
                d.risk.level.to_string(),
                signals.join(",")
            ));
        }
    }

    output.push('\n');
    output.push_str(HUNTING_NOTE);
    output.push('\n');
    output
}

/// Exports a fused risk score
pub fn export_risk(risk: &RiskScore, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let signals: Vec<String> = risk.signals.iter().map(|s| s.to_string()).collect();
            format!(
                "C2 Risk Score: {} / {}\nRisk Level: {}\nSignals: [{}]\n",
                risk.score,
                risk.max_score,
                risk.level,
                signals.join(", ")
            )
        }
        OutputFormat::Json => to_json_pretty(risk),
        OutputFormat::JsonLines => serde_json::to_string(risk)
            .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e)),
    }
}

fn to_json_pretty<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}
