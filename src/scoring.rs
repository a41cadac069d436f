//! Weak-signal fusion.
//!
//! Each signal is a low-confidence observation produced independently
//! (beacon regularity, DNS entropy, rare TLS fingerprint, IOC match). None of
//! them should drive a conclusion alone. Present signals add their configured
//! weight; the sum maps onto LOW / MEDIUM / HIGH through fixed cut points.
//!
//! Because every weight must stay below the HIGH cut point (enforced by
//! `Config::validate`), reaching HIGH always takes corroboration. With the
//! default weights {30, 25, 20, 25} and HIGH at 70, any two signals top out at
//! 55, so HIGH needs at least three.

use serde::{Deserialize, Serialize};

use crate::config::{RiskCutoffs, ScoringConfig, SignalWeights};

/// The independent weak signals the fusion engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeakSignal {
    Beacon,
    DnsEntropy,
    RareTls,
    IocMatch,
}

impl WeakSignal {
    pub const ALL: [WeakSignal; 4] = [
        WeakSignal::Beacon,
        WeakSignal::DnsEntropy,
        WeakSignal::RareTls,
        WeakSignal::IocMatch,
    ];

    pub fn weight(&self, weights: &SignalWeights) -> u32 {
        match self {
            Self::Beacon => weights.beacon,
            Self::DnsEntropy => weights.dns_entropy,
            Self::RareTls => weights.rare_tls,
            Self::IocMatch => weights.ioc_match,
        }
    }
}

impl std::fmt::Display for WeakSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Beacon => write!(f, "beacon"),
            Self::DnsEntropy => write!(f, "dns_entropy"),
            Self::RareTls => write!(f, "rare_tls"),
            Self::IocMatch => write!(f, "ioc_match"),
        }
    }
}

/// Which signals fired for one evaluated entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSet {
    pub beacon: bool,
    pub dns_entropy: bool,
    pub rare_tls: bool,
    pub ioc_match: bool,
}

impl SignalSet {
    pub fn is_set(&self, signal: WeakSignal) -> bool {
        match signal {
            WeakSignal::Beacon => self.beacon,
            WeakSignal::DnsEntropy => self.dns_entropy,
            WeakSignal::RareTls => self.rare_tls,
            WeakSignal::IocMatch => self.ioc_match,
        }
    }

    pub fn with(mut self, signal: WeakSignal) -> Self {
        match signal {
            WeakSignal::Beacon => self.beacon = true,
            WeakSignal::DnsEntropy => self.dns_entropy = true,
            WeakSignal::RareTls => self.rare_tls = true,
            WeakSignal::IocMatch => self.ioc_match = true,
        }
        self
    }

    pub fn active(&self) -> Vec<WeakSignal> {
        WeakSignal::ALL
            .into_iter()
            .filter(|s| self.is_set(*s))
            .collect()
    }
}

/// Discrete risk category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: u32, cutoffs: &RiskCutoffs) -> Self {
        if score >= cutoffs.high {
            Self::High
        } else if score >= cutoffs.medium {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Fused score for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskScore {
    pub score: u32,
    pub max_score: u32,
    pub level: RiskLevel,
    pub signals: Vec<WeakSignal>,
}

/// Sums the weights of present signals and assigns a level.
pub fn fuse(signals: &SignalSet, config: &ScoringConfig) -> RiskScore {
    let active = signals.active();
    // Saturates so unvalidated weights cannot overflow
    let score = active
        .iter()
        .map(|s| s.weight(&config.weights))
        .fold(0u32, u32::saturating_add);

    RiskScore {
        score,
        max_score: config.weights.total(),
        level: RiskLevel::from_score(score, &config.cutoffs),
        signals: active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_sets() -> Vec<SignalSet> {
        (0u8..16)
            .map(|bits| SignalSet {
                beacon: bits & 1 != 0,
                dns_entropy: bits & 2 != 0,
                rare_tls: bits & 4 != 0,
                ioc_match: bits & 8 != 0,
            })
            .collect()
    }

    #[test]
    fn test_three_signals_high() {
        let signals = SignalSet {
            beacon: true,
            dns_entropy: true,
            rare_tls: false,
            ioc_match: true,
        };

        let risk = fuse(&signals, &ScoringConfig::default());

        assert_eq!(risk.score, 80);
        assert_eq!(risk.level, RiskLevel::High);
        assert_eq!(
            risk.signals,
            vec![WeakSignal::Beacon, WeakSignal::DnsEntropy, WeakSignal::IocMatch]
        );
    }

    #[test]
    fn test_no_signals_low() {
        let risk = fuse(&SignalSet::default(), &ScoringConfig::default());
        assert_eq!(risk.score, 0);
        assert_eq!(risk.level, RiskLevel::Low);
        assert!(risk.signals.is_empty());
    }

    #[test]
    fn test_two_signals_never_high() {
        let config = ScoringConfig::default();
        for set in all_sets().into_iter().filter(|s| s.active().len() <= 2) {
            assert_ne!(fuse(&set, &config).level, RiskLevel::High, "{:?}", set);
        }
    }

    #[test]
    fn test_score_bounded() {
        let config = ScoringConfig::default();
        for set in all_sets() {
            let risk = fuse(&set, &config);
            assert!(risk.score <= config.weights.total());
            assert_eq!(risk.max_score, 100);
        }
    }

    #[test]
    fn test_adding_signal_never_decreases_score() {
        let config = ScoringConfig::default();
        for set in all_sets() {
            let before = fuse(&set, &config);
            for signal in WeakSignal::ALL {
                let after = fuse(&set.with(signal), &config);
                assert!(after.score >= before.score);
                assert!(after.level >= before.level);
            }
        }
    }

    #[test]
    fn test_level_cut_points() {
        let cutoffs = RiskCutoffs::default();
        assert_eq!(RiskLevel::from_score(39, &cutoffs), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(40, &cutoffs), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(69, &cutoffs), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(70, &cutoffs), RiskLevel::High);
    }

    #[test]
    fn test_oversized_weights_saturate() {
        let config = ScoringConfig {
            weights: SignalWeights {
                beacon: 2_000_000_000,
                dns_entropy: 2_000_000_000,
                rare_tls: 2_000_000_000,
                ioc_match: 2_000_000_000,
            },
            cutoffs: RiskCutoffs {
                high: u32::MAX,
                medium: 40,
            },
        };
        let all = WeakSignal::ALL
            .into_iter()
            .fold(SignalSet::default(), SignalSet::with);

        let risk = fuse(&all, &config);

        assert_eq!(risk.score, u32::MAX);
        assert_eq!(risk.max_score, u32::MAX);
        assert!(risk.score <= risk.max_score);
    }

    #[test]
    fn test_custom_weights() {
        let config = ScoringConfig {
            weights: SignalWeights {
                beacon: 10,
                dns_entropy: 10,
                rare_tls: 10,
                ioc_match: 10,
            },
            cutoffs: RiskCutoffs { high: 35, medium: 20 },
        };
        let set = SignalSet::default().with(WeakSignal::RareTls).with(WeakSignal::IocMatch);

        let risk = fuse(&set, &config);
        assert_eq!(risk.score, 20);
        assert_eq!(risk.level, RiskLevel::Medium);
        assert_eq!(risk.max_score, 40);
    }
}
