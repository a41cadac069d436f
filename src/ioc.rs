//! Indicator-of-compromise list matching.
//!
//! Supplies the IOC weak signal. Indicators are loaded from a plain text file
//! with one entry per line; `#` starts a comment. An entry that parses as an
//! IP address is an address indicator, anything else is a domain indicator.
//! Domain indicators also match their subdomains.

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;

use anyhow::Context;
use tracing::info;

use crate::dns_detector::normalize_domain;
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct IocList {
    addresses: HashSet<String>,
    domains: HashSet<String>,
}

impl IocList {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read IOC file: {}", path.display()))?;
        let list = Self::parse(&content);

        info!(
            "Loaded {} address and {} domain indicators from {}",
            list.addresses.len(),
            list.domains.len(),
            path.display()
        );

        Ok(list)
    }

    pub fn parse(content: &str) -> Self {
        let mut list = Self::default();
        for line in content.lines() {
            let entry = line.split('#').next().unwrap_or_default().trim();
            if !entry.is_empty() {
                list.insert(entry);
            }
        }
        list
    }

    pub fn insert(&mut self, indicator: &str) {
        match indicator.parse::<IpAddr>() {
            Ok(ip) => {
                self.addresses.insert(ip.to_string());
            }
            Err(_) => {
                let domain = normalize_domain(indicator);
                if !domain.is_empty() {
                    self.domains.insert(domain);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.addresses.len() + self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Matches a flow endpoint; hostnames fall through to domain matching.
    pub fn matches_addr(&self, addr: &str) -> bool {
        match addr.trim().parse::<IpAddr>() {
            Ok(ip) => self.addresses.contains(&ip.to_string()),
            Err(_) => self.matches_domain(addr),
        }
    }

    pub fn matches_domain(&self, domain: &str) -> bool {
        let domain = normalize_domain(domain);
        domain_suffix_candidates(&domain)
            .into_iter()
            .any(|candidate| self.domains.contains(candidate))
    }
}

fn domain_suffix_candidates(domain: &str) -> Vec<&str> {
    let mut candidates = vec![domain];
    for (index, ch) in domain.char_indices() {
        if ch == '.' && index + 1 < domain.len() {
            candidates.push(&domain[index + 1..]);
        }
    }
    candidates
}
