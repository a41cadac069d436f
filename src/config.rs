//! Configuration Module
//!
//! Provides TOML-based configuration for c2-hunt. Every threshold, weight and
//! cut point the detectors use lives here and is passed explicitly into each
//! component. Configuration is optional - CLI arguments can override file
//! settings.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::AnalyzerError;
use crate::export::OutputFormat;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub flow: FlowConfig,
    pub baseline: BaselineConfig,
    pub detection: DetectionConfig,
    pub dns: DnsConfig,
    pub scoring: ScoringConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Loads and validates configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Generates a default configuration file content
    pub fn generate_default() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config)
            .unwrap_or_else(|_| "# Failed to generate config".to_string())
    }

    /// Validates the configuration
    pub fn validate(&self) -> std::result::Result<(), AnalyzerError> {
        let invalid = |msg: &str| Err(AnalyzerError::InvalidConfig(msg.to_string()));

        if self.flow.min_samples_flow < 2 {
            return invalid("min_samples_flow must be at least 2 (one interval)");
        }
        if self.baseline.min_samples_host == 0 {
            return invalid("min_samples_host must be greater than 0");
        }
        if self.detection.stddev_threshold_sec <= 0.0 {
            return invalid("stddev_threshold_sec must be greater than 0.0");
        }
        if self.detection.regularity_ratio_threshold <= 0.0 {
            return invalid("regularity_ratio_threshold must be greater than 0.0");
        }
        if self.detection.epsilon <= 0.0 {
            return invalid("epsilon must be greater than 0.0");
        }
        if self.detection.zero_mean_epsilon < 0.0 {
            return invalid("zero_mean_epsilon must not be negative");
        }
        if self.detection.cv_threshold_periodic <= 0.0
            || self.detection.cv_threshold_periodic >= self.detection.cv_threshold_jittered
        {
            return invalid("cv_threshold_periodic must be in (0.0, cv_threshold_jittered)");
        }
        if self.dns.entropy_threshold <= 0.0 || self.dns.entropy_threshold >= 8.0 {
            return invalid("entropy_threshold must be between 0.0 and 8.0 (bits per char)");
        }
        if self.dns.min_query_count == 0 {
            return invalid("min_query_count must be greater than 0");
        }
        self.scoring.validate()
    }
}

/// Flow series configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Minimum events per (src, dst, port) series before it is analyzed
    pub min_samples_flow: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            min_samples_flow: 5,
        }
    }
}

/// Host baseline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Minimum pooled intervals per source host to build a baseline
    pub min_samples_host: usize,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            min_samples_host: 10,
        }
    }
}

/// Beacon detection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Absolute stddev ceiling (seconds) for a flow to count as regular
    pub stddev_threshold_sec: f64,
    /// Host-stddev / flow-stddev ratio a flow must exceed
    pub regularity_ratio_threshold: f64,
    /// Guard added to both sides of the regularity ratio
    pub epsilon: f64,
    /// Interval means at or below this are treated as zero
    pub zero_mean_epsilon: f64,
    /// Score assigned when the host baseline has zero spread and the flow is tight
    pub degenerate_regular_score: f64,
    /// Score assigned when the host baseline has zero spread and the flow is not tight
    pub degenerate_irregular_score: f64,
    /// CV below which a flow is classified highly periodic
    pub cv_threshold_periodic: f64,
    /// CV below which a flow is classified jittered periodic
    pub cv_threshold_jittered: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            stddev_threshold_sec: 2.0,
            regularity_ratio_threshold: 1.5,
            epsilon: 1e-6,
            zero_mean_epsilon: 1e-9,
            degenerate_regular_score: 1.0,
            degenerate_irregular_score: 0.1,
            cv_threshold_periodic: 0.1,
            cv_threshold_jittered: 0.5,
        }
    }
}

/// DNS entropy configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Entropy (bits/char) at or above which a domain is high-entropy
    pub entropy_threshold: f64,
    /// Queries a high-entropy domain needs before it is surfaced
    pub min_query_count: usize,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            entropy_threshold: 3.5,
            min_query_count: 3,
        }
    }
}

/// Weak-signal fusion configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: SignalWeights,
    pub cutoffs: RiskCutoffs,
}

impl ScoringConfig {
    fn validate(&self) -> std::result::Result<(), AnalyzerError> {
        if self.cutoffs.medium > self.cutoffs.high {
            return Err(AnalyzerError::InvalidConfig(
                "cutoffs.medium must not exceed cutoffs.high".to_string(),
            ));
        }
        if self.cutoffs.medium == 0 {
            return Err(AnalyzerError::InvalidConfig(
                "cutoffs.medium must be greater than 0".to_string(),
            ));
        }
        if self.weights.checked_total().is_none() {
            return Err(AnalyzerError::InvalidConfig(
                "signal weights must sum to at most u32::MAX".to_string(),
            ));
        }
        if self.weights.max() >= self.cutoffs.high {
            return Err(AnalyzerError::InvalidConfig(format!(
                "every signal weight must stay below cutoffs.high ({}), largest is {}",
                self.cutoffs.high,
                self.weights.max()
            )));
        }
        Ok(())
    }
}

/// Points each weak signal contributes when present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SignalWeights {
    pub beacon: u32,
    pub dns_entropy: u32,
    pub rare_tls: u32,
    pub ioc_match: u32,
}

impl SignalWeights {
    /// Sum of all weights, `None` when it does not fit in a `u32`.
    pub fn checked_total(&self) -> Option<u32> {
        self.beacon
            .checked_add(self.dns_entropy)?
            .checked_add(self.rare_tls)?
            .checked_add(self.ioc_match)
    }

    /// Upper bound of any fused score, saturating for unvalidated weights.
    pub fn total(&self) -> u32 {
        self.checked_total().unwrap_or(u32::MAX)
    }

    pub fn max(&self) -> u32 {
        self.beacon
            .max(self.dns_entropy)
            .max(self.rare_tls)
            .max(self.ioc_match)
    }
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            beacon: 30,
            dns_entropy: 25,
            rare_tls: 20,
            ioc_match: 25,
        }
    }
}

/// Score cut points for the discrete risk levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RiskCutoffs {
    pub high: u32,
    pub medium: u32,
}

impl Default for RiskCutoffs {
    fn default() -> Self {
        Self { high: 70, medium: 40 }
    }
}

/// Output-related configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format (text, json, jsonl)
    #[serde(with = "output_format_serde")]
    pub format: OutputFormat,
    /// How many ranked flows to show (0 = all)
    pub top: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            top: 20,
        }
    }
}

/// Custom serde implementation for OutputFormat
mod output_format_serde {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(format: &OutputFormat, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<OutputFormat, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.flow.min_samples_flow, 5);
        assert_eq!(config.baseline.min_samples_host, 10);
        assert_eq!(config.detection.stddev_threshold_sec, 2.0);
        assert_eq!(config.detection.regularity_ratio_threshold, 1.5);
        assert_eq!(config.dns.entropy_threshold, 3.5);
        assert_eq!(config.scoring.weights.total(), 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validate() {
        let mut config = Config::default();
        config.flow.min_samples_flow = 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detection.epsilon = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scoring.cutoffs.medium = 80;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_single_weight_cannot_reach_high() {
        let mut config = Config::default();
        config.scoring.weights.ioc_match = 70;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AnalyzerError::InvalidConfig(_)));
    }

    #[test]
    fn test_weight_sum_must_fit() {
        let mut config = Config::default();
        config.scoring.weights = SignalWeights {
            beacon: 2_000_000_000,
            dns_entropy: 2_000_000_000,
            rare_tls: 2_000_000_000,
            ioc_match: 2_000_000_000,
        };
        config.scoring.cutoffs.high = u32::MAX;

        assert_eq!(config.scoring.weights.checked_total(), None);
        assert_eq!(config.scoring.weights.total(), u32::MAX);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AnalyzerError::InvalidConfig(_)));
    }

    #[test]
    fn test_generate_default_config() {
        let config_str = Config::generate_default();
        assert!(config_str.contains("[flow]"));
        assert!(config_str.contains("[baseline]"));
        assert!(config_str.contains("[detection]"));
        assert!(config_str.contains("[dns]"));
        assert!(config_str.contains("[scoring.weights]"));
        assert!(config_str.contains("[output]"));

        let reparsed: Config = toml::from_str(&config_str).unwrap();
        assert_eq!(reparsed.scoring.weights, SignalWeights::default());
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[flow]
min_samples_flow = 6

[detection]
stddev_threshold_sec = 1.0

[scoring.weights]
rare_tls = 15

[scoring.cutoffs]
high = 75

[output]
format = "jsonl"
top = 5
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.flow.min_samples_flow, 6);
        assert_eq!(config.baseline.min_samples_host, 10);
        assert_eq!(config.detection.stddev_threshold_sec, 1.0);
        assert_eq!(config.detection.regularity_ratio_threshold, 1.5);
        assert_eq!(config.scoring.weights.rare_tls, 15);
        assert_eq!(config.scoring.weights.beacon, 30);
        assert_eq!(config.scoring.cutoffs.high, 75);
        assert_eq!(config.scoring.cutoffs.medium, 40);
        assert_eq!(config.output.format, OutputFormat::JsonLines);
        assert_eq!(config.output.top, 5);
    }
}
