//! Baseline-relative regularity scoring.
//!
//! The regularity score asks how much tighter one flow is than its source
//! host's general behaviour:
//!
//! ```text
//! regularity = (host_std + ε) / (flow_std + ε)
//! ```
//!
//! Values above 1 mean the flow is more regular than the host. When the host
//! baseline itself has zero spread the ratio is meaningless, so the score
//! falls back to an absolute check with fixed, configurable values.

use serde::Serialize;

use crate::analyzer::FlowStatistics;
use crate::baseline::HostBaseline;
use crate::config::DetectionConfig;

/// Which branch produced a regularity score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Regularity {
    /// Ratio of host spread to flow spread.
    Relative(f64),
    /// Zero-spread host, flow under the absolute ceiling.
    DegenerateRegular(f64),
    /// Zero-spread host, flow at or above the absolute ceiling.
    DegenerateIrregular(f64),
}

impl Regularity {
    /// Scores one flow against its host baseline.
    pub fn score(flow: &FlowStatistics, host: &HostBaseline, config: &DetectionConfig) -> Self {
        if host.is_degenerate() {
            if flow.std_dev < config.stddev_threshold_sec {
                Self::DegenerateRegular(config.degenerate_regular_score)
            } else {
                Self::DegenerateIrregular(config.degenerate_irregular_score)
            }
        } else {
            let eps = config.epsilon;
            Self::Relative((host.std_dev + eps) / (flow.std_dev + eps))
        }
    }

    pub fn value(&self) -> f64 {
        match *self {
            Self::Relative(v) | Self::DegenerateRegular(v) | Self::DegenerateIrregular(v) => v,
        }
    }
}

/// Adaptive beacon decision: tight in absolute terms AND tighter than the host.
///
/// Low absolute spread alone is not enough when the host's other traffic is
/// equally tight.
pub fn is_adaptive_beacon(
    flow: &FlowStatistics,
    regularity: &Regularity,
    config: &DetectionConfig,
) -> bool {
    !flow.is_zero_mean()
        && flow.std_dev < config.stddev_threshold_sec
        && regularity.value() > config.regularity_ratio_threshold
}
