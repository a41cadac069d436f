//! Flow analysis module - interval extraction and per-flow statistics.
//!
//! # Statistical Methodology
//!
//! ## Delta Calculation
//! For a series of timestamps sorted ascending [t₀, t₁, t₂, ..., tₙ], we
//! calculate the intervals:
//! Δᵢ = tᵢ - tᵢ₋₁ for i ∈ [1, n]
//!
//! ## Jitter Metric (Coefficient of Variation)
//! CV = σ / μ where:
//! - σ (sigma) = population standard deviation of intervals (divide by N)
//! - μ (mu) = mean of intervals
//!
//! The CV is dimensionless and allows comparison across flows with different
//! beacon frequencies. A zero mean (every event at the same instant) is a
//! logging artifact, not periodicity, and yields CV = 0.
//!
//! ## Periodicity Score
//! score = 1 / (1 + CV), in (0, 1]. Approaches 1 for metronomic series and
//! 0 as dispersion dominates the mean.

use serde::Serialize;
use statrs::statistics::{Data, Max, Min, OrderStatistics, Statistics};

use crate::config::DetectionConfig;
use crate::error::AnalyzerError;
use crate::flow::{FlowKey, FlowSeries};

/// Classification of flow behavior based on CV analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowClassification {
    /// CV below the periodic threshold - highly regular, likely automated
    HighlyPeriodic,
    /// CV below the jittered threshold - some jitter but suspicious regularity
    JitteredPeriodic,
    /// CV below 1.0 - moderate variation
    Moderate,
    /// CV ≥ 1.0 - high variation, likely human-driven
    Stochastic,
    /// All events share one timestamp
    Degenerate,
}

impl FlowClassification {
    /// Returns the classification for a set of flow statistics.
    pub fn from_stats(stats: &FlowStatistics, config: &DetectionConfig) -> Self {
        if stats.is_zero_mean() {
            return Self::Degenerate;
        }
        match stats.cv {
            cv if cv < config.cv_threshold_periodic => Self::HighlyPeriodic,
            cv if cv < config.cv_threshold_jittered => Self::JitteredPeriodic,
            cv if cv < 1.0 => Self::Moderate,
            _ => Self::Stochastic,
        }
    }

    /// Machine-readable name, matching the serialized form.
    pub fn name(&self) -> &'static str {
        match self {
            Self::HighlyPeriodic => "highly_periodic",
            Self::JitteredPeriodic => "jittered_periodic",
            Self::Moderate => "moderate",
            Self::Stochastic => "stochastic",
            Self::Degenerate => "degenerate",
        }
    }
}

impl std::fmt::Display for FlowClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HighlyPeriodic => write!(f, "Highly Periodic (Probable Bot)"),
            Self::JitteredPeriodic => write!(f, "Jittered Periodic (Suspicious)"),
            Self::Moderate => write!(f, "Moderate Variation"),
            Self::Stochastic => write!(f, "Stochastic (Likely Organic)"),
            Self::Degenerate => write!(f, "Degenerate (Identical Timestamps)"),
        }
    }
}

/// Statistical summary for a set of intervals, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowStatistics {
    pub mean: f64,
    pub std_dev: f64,
    pub cv: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub count: usize,
    /// Mean at or below the configured zero-mean epsilon.
    pub zero_mean: bool,
}

impl FlowStatistics {
    pub fn is_zero_mean(&self) -> bool {
        self.zero_mean
    }

    /// How beacon-like the series is, in (0, 1].
    pub fn periodicity_score(&self) -> f64 {
        1.0 / (1.0 + self.cv)
    }
}

/// Sorts timestamps ascending and returns the deltas between neighbours.
///
/// Fewer than two timestamps yield an empty set, which callers treat as
/// insufficient data.
pub fn extract_intervals(timestamps: &[f64]) -> Vec<f64> {
    if timestamps.len() < 2 {
        return Vec::new();
    }

    let mut sorted = timestamps.to_vec();
    sorted.sort_by(f64::total_cmp);

    sorted.windows(2).map(|window| window[1] - window[0]).collect()
}

/// Calculates population statistics for a non-empty set of intervals.
pub fn calculate_statistics(
    intervals: &[f64],
    config: &DetectionConfig,
) -> Result<FlowStatistics, AnalyzerError> {
    if intervals.is_empty() {
        return Err(AnalyzerError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }

    let mut data = Data::new(intervals.to_vec());

    let min = data.min();
    let max = data.max();
    // Rounding must never push the mean outside the observed range.
    let mean = intervals.iter().mean().clamp(min, max);
    let std_dev = intervals.iter().population_std_dev();
    let median = data.median();

    let zero_mean = mean.abs() <= config.zero_mean_epsilon;
    let cv = if zero_mean { 0.0 } else { std_dev / mean };

    Ok(FlowStatistics {
        mean,
        std_dev,
        cv,
        min,
        max,
        median,
        count: intervals.len(),
        zero_mean,
    })
}

/// Analysis result for a single flow series.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowAnalysis {
    pub key: FlowKey,
    pub event_count: usize,
    pub stats: FlowStatistics,
    pub periodicity_score: f64,
    pub classification: FlowClassification,
}

impl FlowAnalysis {
    /// Analyzes a series; fails with `InsufficientData` below two events.
    pub fn from_series(
        series: &FlowSeries,
        config: &DetectionConfig,
    ) -> Result<Self, AnalyzerError> {
        let intervals = extract_intervals(&series.timestamps);
        let stats = calculate_statistics(&intervals, config).map_err(|_| {
            AnalyzerError::InsufficientData {
                required: 2,
                actual: series.event_count(),
            }
        })?;

        Ok(Self {
            key: series.key.clone(),
            event_count: series.event_count(),
            periodicity_score: stats.periodicity_score(),
            classification: FlowClassification::from_stats(&stats, config),
            stats,
        })
    }

    /// Absolute check: spread below the ceiling, excluding zero-mean artifacts.
    pub fn is_low_variance(&self, stddev_threshold_sec: f64) -> bool {
        !self.stats.is_zero_mean() && self.stats.std_dev < stddev_threshold_sec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn stats_of(intervals: &[f64]) -> FlowStatistics {
        calculate_statistics(intervals, &DetectionConfig::default()).unwrap()
    }

    #[test]
    fn test_extract_intervals_sorts_first() {
        let intervals = extract_intervals(&[120.0, 0.0, 60.0, 180.0]);
        assert_eq!(intervals, vec![60.0, 60.0, 60.0]);
    }

    #[test]
    fn test_extract_intervals_length_and_sign() {
        let timestamps = [50.0, 3.0, 3.0, 99.5, 12.25, 7.0];
        let intervals = extract_intervals(&timestamps);

        assert_eq!(intervals.len(), timestamps.len() - 1);
        assert!(intervals.iter().all(|d| *d >= 0.0));
        assert!(approx(intervals.iter().sum::<f64>(), 99.5 - 3.0));
    }

    #[test]
    fn test_extract_intervals_empty() {
        assert!(extract_intervals(&[]).is_empty());
        assert!(extract_intervals(&[42.0]).is_empty());
    }

    #[test]
    fn test_statistics_calculation() {
        let stats = stats_of(&[10.0, 20.0, 30.0, 40.0, 50.0]);

        assert!(approx(stats.mean, 30.0));
        assert!(approx(stats.min, 10.0));
        assert!(approx(stats.max, 50.0));
        assert!(approx(stats.median, 30.0));
        // Population convention: sqrt(200) rather than sqrt(250)
        assert!(approx(stats.std_dev, 200.0_f64.sqrt()));
        assert_eq!(stats.count, 5);
    }

    #[test]
    fn test_statistics_equal_intervals() {
        let stats = stats_of(&[60.0, 60.0, 60.0, 60.0]);

        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.cv, 0.0);
        assert_eq!(stats.periodicity_score(), 1.0);
    }

    #[test]
    fn test_statistics_zero_mean() {
        let stats = stats_of(&[0.0, 0.0, 0.0]);

        assert_eq!(stats.cv, 0.0);
        assert!(!stats.cv.is_nan());
        assert!(stats.is_zero_mean());
    }

    #[test]
    fn test_zero_mean_epsilon_from_config() {
        let tiny = [1e-7, 1e-7, 1e-7];
        assert!(!stats_of(&tiny).is_zero_mean());

        let config = DetectionConfig {
            zero_mean_epsilon: 1e-6,
            ..DetectionConfig::default()
        };
        let stats = calculate_statistics(&tiny, &config).unwrap();
        assert!(stats.is_zero_mean());
        assert_eq!(stats.cv, 0.0);
        assert_eq!(
            FlowClassification::from_stats(&stats, &config),
            FlowClassification::Degenerate
        );
    }

    #[test]
    fn test_statistics_bounds() {
        let stats = stats_of(&[3.0, 400.0, 17.5, 0.25, 61.0]);

        assert!(stats.min <= stats.mean && stats.mean <= stats.max);
        assert!(stats.std_dev >= 0.0);
        assert!(stats.periodicity_score() > 0.0 && stats.periodicity_score() <= 1.0);
    }

    #[test]
    fn test_statistics_empty_is_insufficient() {
        let err = calculate_statistics(&[], &DetectionConfig::default()).unwrap_err();
        assert!(matches!(err, AnalyzerError::InsufficientData { actual: 0, .. }));
    }

    #[test]
    fn test_cv_classification() {
        let config = DetectionConfig::default();

        let periodic = stats_of(&[60.0, 60.5, 59.5, 60.0, 60.0]);
        assert_eq!(
            FlowClassification::from_stats(&periodic, &config),
            FlowClassification::HighlyPeriodic
        );

        let jittered = stats_of(&[10.0, 14.0, 8.0, 13.0, 7.0, 12.0, 9.0, 11.0]);
        assert_eq!(
            FlowClassification::from_stats(&jittered, &config),
            FlowClassification::JitteredPeriodic
        );

        let stochastic = stats_of(&[5.0, 300.0, 1.0, 500.0, 2.0, 800.0]);
        assert_eq!(
            FlowClassification::from_stats(&stochastic, &config),
            FlowClassification::Stochastic
        );

        let degenerate = stats_of(&[0.0, 0.0]);
        assert_eq!(
            FlowClassification::from_stats(&degenerate, &config),
            FlowClassification::Degenerate
        );
    }

    #[test]
    fn test_classification_name_matches_serialized_form() {
        for class in [
            FlowClassification::HighlyPeriodic,
            FlowClassification::JitteredPeriodic,
            FlowClassification::Moderate,
            FlowClassification::Stochastic,
            FlowClassification::Degenerate,
        ] {
            assert_eq!(serde_json::to_value(class).unwrap(), class.name());
        }
    }

    #[test]
    fn test_flow_analysis_from_series() {
        let series = FlowSeries {
            key: FlowKey::new("10.0.0.5", "203.0.113.9", 443),
            timestamps: vec![240.0, 0.0, 120.0, 60.0, 180.0],
        };

        let analysis = FlowAnalysis::from_series(&series, &DetectionConfig::default()).unwrap();

        assert_eq!(analysis.event_count, 5);
        assert_eq!(analysis.stats.count, 4);
        assert!(approx(analysis.stats.mean, 60.0));
        assert!(approx(analysis.periodicity_score, 1.0));
        assert!(analysis.is_low_variance(2.0));
    }

    #[test]
    fn test_flow_analysis_single_event_insufficient() {
        let series = FlowSeries {
            key: FlowKey::new("a", "b", 1),
            timestamps: vec![1.0],
        };

        let err = FlowAnalysis::from_series(&series, &DetectionConfig::default()).unwrap_err();
        assert_eq!(
            err,
            AnalyzerError::InsufficientData {
                required: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_identical_timestamps_not_low_variance() {
        let series = FlowSeries {
            key: FlowKey::new("a", "b", 1),
            timestamps: vec![5.0; 6],
        };

        let analysis = FlowAnalysis::from_series(&series, &DetectionConfig::default()).unwrap();
        assert!(!analysis.is_low_variance(2.0));
    }

    #[test]
    fn test_real_world_beacon_pattern() {
        // 60-second beacon with ±4% deterministic jitter
        let intervals: Vec<f64> = (0..20)
            .map(|i| 60.0 + ((i % 5) as f64 - 2.0) * 0.02 * 60.0)
            .collect();

        let stats = stats_of(&intervals);
        assert!(
            stats.cv < 0.1,
            "A 60-second beacon with small jitter should be periodic: CV={}",
            stats.cv
        );
        assert!(stats.periodicity_score() > 0.9);
    }
}
