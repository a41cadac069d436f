//! DNS Entropy Detection Module
//!
//! Surfaces likely algorithmically generated domains from a DNS query log.
//!
//! # Detection Methodology
//!
//! Domain generation algorithms produce names whose characters are spread
//! far more evenly than human-chosen names:
//! - Random or hex-like names have entropy > 3.5 bits/char
//! - Dictionary names typically stay below 3.0 bits/char
//!
//! A single rare high-entropy lookup is noise. A domain is surfaced only when
//! its entropy clears the threshold AND it was queried repeatedly.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::DnsConfig;
use crate::error::AnalyzerError;

/// One row of the DNS query table.
#[derive(Debug, Clone, PartialEq)]
pub struct DnsRecord {
    pub domain: String,
    /// Seconds since the Unix epoch, when the log carries one.
    pub timestamp: Option<f64>,
}

impl DnsRecord {
    pub fn new(domain: impl Into<String>, timestamp: Option<f64>) -> Self {
        Self {
            domain: domain.into(),
            timestamp,
        }
    }
}

/// Entropy and query volume for one distinct domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainEntropy {
    pub domain: String,
    pub entropy: f64,
    pub query_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<f64>,
}

/// Calculate Shannon entropy of a string (bits per character).
///
/// Characters are compared case-insensitively. Callers must not pass an
/// empty string; it scores 0.0.
///
/// # Example
/// ```
/// use c2_hunt::dns_detector::calculate_entropy;
/// assert_eq!(calculate_entropy("aaaa"), 0.0);
/// assert!((calculate_entropy("abcd") - 2.0).abs() < 1e-12);
/// ```
pub fn calculate_entropy(domain: &str) -> f64 {
    let mut freq: BTreeMap<char, usize> = BTreeMap::new();
    let mut len = 0usize;

    for ch in domain.chars().flat_map(char::to_lowercase) {
        *freq.entry(ch).or_insert(0) += 1;
        len += 1;
    }

    if len == 0 {
        return 0.0;
    }

    let len = len as f64;
    let entropy: f64 = freq
        .values()
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum();

    // A single repeated character sums to -0.0
    entropy.abs()
}

/// Canonical form used for counting: trimmed, lower-cased, no root dot.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_lowercase()
}

#[derive(Debug, Default)]
struct DomainTally {
    count: usize,
    first_seen: Option<f64>,
    last_seen: Option<f64>,
}

impl DomainTally {
    fn observe(&mut self, timestamp: Option<f64>) {
        self.count += 1;
        if let Some(ts) = timestamp {
            self.first_seen = Some(self.first_seen.map_or(ts, |f| f.min(ts)));
            self.last_seen = Some(self.last_seen.map_or(ts, |l| l.max(ts)));
        }
    }
}

/// Aggregates the query log into per-domain entropy records.
///
/// Records are ordered by entropy, then query count, both descending.
pub fn aggregate_domains(records: &[DnsRecord]) -> Result<Vec<DomainEntropy>, AnalyzerError> {
    let mut tallies: HashMap<String, DomainTally> = HashMap::new();

    for (idx, record) in records.iter().enumerate() {
        let domain = normalize_domain(&record.domain);
        if domain.is_empty() {
            return Err(AnalyzerError::invalid_record(idx + 1, "empty domain"));
        }
        tallies.entry(domain).or_default().observe(record.timestamp);
    }

    let mut domains: Vec<DomainEntropy> = tallies
        .into_iter()
        .map(|(domain, tally)| {
            let entropy = calculate_entropy(&domain);
            trace!("{} entropy {:.3} over {} queries", domain, entropy, tally.count);
            DomainEntropy {
                domain,
                entropy,
                query_count: tally.count,
                first_seen: tally.first_seen,
                last_seen: tally.last_seen,
            }
        })
        .collect();

    domains.sort_by(|a, b| {
        b.entropy
            .total_cmp(&a.entropy)
            .then_with(|| b.query_count.cmp(&a.query_count))
            .then_with(|| a.domain.cmp(&b.domain))
    });

    Ok(domains)
}

/// Applies the entropy and repeat-count thresholds.
#[derive(Debug, Clone)]
pub struct DnsDetector {
    config: DnsConfig,
}

impl DnsDetector {
    pub fn new(config: DnsConfig) -> Self {
        Self { config }
    }

    /// Whether the entropy alone clears the threshold.
    pub fn is_high_entropy(&self, entropy: f64) -> bool {
        entropy >= self.config.entropy_threshold
    }

    pub fn is_suspicious(&self, domain: &DomainEntropy) -> bool {
        self.is_high_entropy(domain.entropy) && domain.query_count >= self.config.min_query_count
    }

    /// Keeps only high-entropy domains that were queried repeatedly.
    pub fn suspicious(&self, domains: Vec<DomainEntropy>) -> Vec<DomainEntropy> {
        let total = domains.len();
        let flagged: Vec<DomainEntropy> = domains
            .into_iter()
            .filter(|d| self.is_suspicious(d))
            .collect();

        debug!(
            "{} of {} domains have entropy >= {:.2} and >= {} queries",
            flagged.len(),
            total,
            self.config.entropy_threshold,
            self.config.min_query_count
        );

        flagged
    }
}

impl Default for DnsDetector {
    fn default() -> Self {
        Self::new(DnsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repeat(domain: &str, n: usize) -> Vec<DnsRecord> {
        (0..n).map(|i| DnsRecord::new(domain, Some(i as f64))).collect()
    }

    #[test]
    fn test_entropy_single_char() {
        assert_eq!(calculate_entropy("aaaaaaaa"), 0.0);
    }

    #[test]
    fn test_entropy_uniform_distinct() {
        for k in [2usize, 4, 8, 16] {
            let domain: String = "abcdefghijklmnop".chars().take(k).collect();
            let expected = (k as f64).log2();
            assert!(
                (calculate_entropy(&domain) - expected).abs() < 1e-12,
                "k={} expected {}",
                k,
                expected
            );
        }
    }

    #[test]
    fn test_entropy_case_insensitive() {
        assert_eq!(calculate_entropy("AaAa"), 0.0);
        assert_eq!(calculate_entropy("Example.COM"), calculate_entropy("example.com"));
    }

    #[test]
    fn test_entropy_normal_vs_generated() {
        assert!(calculate_entropy("www.google.com") < 3.5);
        assert!(calculate_entropy("xk29fj83hd.example.com") >= 3.5);
    }

    #[test]
    fn test_aggregate_counts_case_normalized() {
        let records = vec![
            DnsRecord::new("Example.com", Some(10.0)),
            DnsRecord::new("example.com.", Some(5.0)),
            DnsRecord::new("EXAMPLE.COM", None),
            DnsRecord::new("other.org", None),
        ];

        let domains = aggregate_domains(&records).unwrap();
        let example = domains.iter().find(|d| d.domain == "example.com").unwrap();

        assert_eq!(domains.len(), 2);
        assert_eq!(example.query_count, 3);
        assert_eq!(example.first_seen, Some(5.0));
        assert_eq!(example.last_seen, Some(10.0));
    }

    #[test]
    fn test_aggregate_rejects_empty_domain() {
        let records = vec![DnsRecord::new("a.com", None), DnsRecord::new("  ", None)];
        let err = aggregate_domains(&records).unwrap_err();
        assert!(matches!(err, AnalyzerError::InvalidRecord { index: 2, .. }));
    }

    #[test]
    fn test_aggregate_sorted_by_entropy() {
        let mut records = repeat("aaaa.com", 2);
        records.extend(repeat("q7z1x9w3.net", 2));

        let domains = aggregate_domains(&records).unwrap();
        assert_eq!(domains[0].domain, "q7z1x9w3.net");
        assert!(domains[0].entropy >= domains[1].entropy);
    }

    #[test]
    fn test_single_high_entropy_query_not_actionable() {
        let detector = DnsDetector::default();
        let domains = aggregate_domains(&repeat("xk29fj83hd.example.com", 1)).unwrap();
        assert!(detector.suspicious(domains).is_empty());
    }

    #[test]
    fn test_repeated_high_entropy_surfaced() {
        let detector = DnsDetector::default();
        let mut records = repeat("xk29fj83hd.example.com", 3);
        records.extend(repeat("www.google.com", 50));

        let flagged = detector.suspicious(aggregate_domains(&records).unwrap());

        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].domain, "xk29fj83hd.example.com");
        assert_eq!(flagged[0].query_count, 3);
    }
}
