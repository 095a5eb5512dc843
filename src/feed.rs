//! Delegation feed acquisition.
//!
//! Downloads a regional registry's delegation file and converts its IPv4
//! allocation records into prefix-form networks. Records that cannot be
//! expressed as a canonical CIDR block are skipped with a warning; the rest
//! of the pipeline only ever sees clean networks.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{FeedErrorKind, PacError, Result};

/// Default delegation feed URL (APNIC latest)
pub const DEFAULT_FEED_URL: &str =
    "http://ftp.apnic.net/apnic/stats/apnic/delegated-apnic-latest";

/// Default registry identifier
pub const DEFAULT_REGISTRY: &str = "apnic";

/// Default country code
pub const DEFAULT_COUNTRY: &str = "cn";

/// Read limit for the feed body (the delegation file is a few MB)
const MAX_FEED_BYTES: u64 = 64 * 1024 * 1024;

/// Regex pattern for IPv4 allocation records
/// Format: registry|cc|ipv4|start|count|date|status, status allocated/assigned
static RECORD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^([a-z]+)\|([a-z]{2})\|ipv4\|([0-9.]+)\|([0-9]+)\|[0-9]+\|a[a-z]*")
        .expect("RECORD_PATTERN: hardcoded regex is invalid")
});

/// Delegation feed source with URL and record filter configuration
#[derive(Debug, Clone)]
pub struct FeedSource {
    url: String,
    registry: String,
    country: String,
}

impl FeedSource {
    /// Create a feed source with the default registry settings
    pub fn new() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            registry: DEFAULT_REGISTRY.to_string(),
            country: DEFAULT_COUNTRY.to_string(),
        }
    }

    /// Set the feed URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the registry identifier to select records from
    pub fn with_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = registry.into();
        self
    }

    /// Set the country code to select records from
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    /// Get the configured feed URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Download the feed and parse it into networks.
    ///
    /// One blocking request per call; failures are fatal to the generation
    /// request and carry a [`FeedErrorKind`] for programmatic handling.
    pub fn fetch(&self) -> Result<Vec<Ipv4Net>> {
        info!("fetching delegation feed from {}", self.url);

        let mut response = ureq::get(&self.url).call().map_err(|e| match e {
            ureq::Error::StatusCode(code) => PacError::FeedError {
                kind: FeedErrorKind::HttpStatus,
                message: format!("registry returned HTTP {}", code),
            },
            other => PacError::FeedError {
                kind: FeedErrorKind::Transport,
                message: other.to_string(),
            },
        })?;

        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_FEED_BYTES)
            .read_to_string()
            .map_err(|e| PacError::FeedError {
                kind: FeedErrorKind::InvalidData,
                message: e.to_string(),
            })?;

        Ok(self.parse(&body))
    }

    /// Parse delegation file text into networks.
    ///
    /// Selects allocated/assigned IPv4 records matching the configured
    /// registry and country; malformed records are skipped with a warning.
    pub fn parse(&self, text: &str) -> Vec<Ipv4Net> {
        let mut networks = Vec::new();

        for (line_num, line) in text.lines().enumerate() {
            let line_num = line_num + 1;

            let captures = match RECORD_PATTERN.captures(line) {
                Some(c) => c,
                None => continue,
            };

            let registry = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            let country = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
            if !registry.eq_ignore_ascii_case(&self.registry)
                || !country.eq_ignore_ascii_case(&self.country)
            {
                continue;
            }

            let start = captures.get(3).map(|m| m.as_str()).unwrap_or_default();
            let count = match captures.get(4).and_then(|m| m.as_str().parse::<u64>().ok()) {
                Some(n) => n,
                None => {
                    warn!("skipping record at line {}: unreadable count", line_num);
                    continue;
                }
            };

            match parse_record(start, count) {
                Ok(net) => networks.push(net),
                Err(e) => warn!("skipping record at line {}: {}", line_num, e),
            }
        }

        debug!("parsed {} networks from feed", networks.len());
        networks
    }
}

impl Default for FeedSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert one (start address, allocation size) record into a network.
///
/// The allocation size must be a power of two within 32 bits so it maps to a
/// single prefix length; the start address must sit on that prefix boundary.
pub fn parse_record(start: &str, count: u64) -> Result<Ipv4Net> {
    let addr: Ipv4Addr = start
        .parse()
        .map_err(|_| PacError::MalformedRecord(format!("bad start address {}", start)))?;

    if count == 0 || !count.is_power_of_two() || count > 1u64 << 32 {
        return Err(PacError::MalformedRecord(format!(
            "count {} is not a power of two within 32 bits",
            count
        )));
    }
    let prefix_len = 32 - count.trailing_zeros() as u8;

    let net = Ipv4Net::new(addr, prefix_len)
        .map_err(|_| PacError::MalformedRecord(format!("bad prefix length {}", prefix_len)))?;

    if net.addr() != net.network() {
        return Err(PacError::InvalidRange(format!(
            "{}/{} has host bits set",
            start, prefix_len
        )));
    }

    Ok(net)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record_exact_block() {
        let net = parse_record("1.0.1.0", 256).unwrap();
        assert_eq!(net, "1.0.1.0/24".parse::<Ipv4Net>().unwrap());

        let net = parse_record("27.0.0.0", 4194304).unwrap();
        assert_eq!(net, "27.0.0.0/10".parse::<Ipv4Net>().unwrap());
    }

    #[test]
    fn test_parse_record_rejects_non_power_of_two() {
        let err = parse_record("1.0.1.0", 100).unwrap_err();
        assert!(matches!(err, PacError::MalformedRecord(_)));

        let err = parse_record("1.0.1.0", 0).unwrap_err();
        assert!(matches!(err, PacError::MalformedRecord(_)));
    }

    #[test]
    fn test_parse_record_rejects_host_bits() {
        // 1.0.1.1 is not on a /24 boundary
        let err = parse_record("1.0.1.1", 256).unwrap_err();
        assert!(matches!(err, PacError::InvalidRange(_)));
    }

    #[test]
    fn test_parse_record_rejects_bad_address() {
        let err = parse_record("1.0.1", 256).unwrap_err();
        assert!(matches!(err, PacError::MalformedRecord(_)));
    }

    #[test]
    fn test_parse_selects_matching_records() {
        let text = "\
2|apnic|20240101|1234|19830613|20240101|+1000
apnic|*|ipv4|*|5678|summary
apnic|cn|ipv4|1.0.1.0|256|20110414|allocated
apnic|cn|ipv4|1.0.2.0|512|20110414|assigned
apnic|jp|ipv4|1.0.16.0|4096|20110412|allocated
ripencc|cn|ipv4|2.0.0.0|1024|20120101|allocated
apnic|cn|ipv6|2001:250::|35|20000426|allocated
apnic|cn|ipv4|1.0.32.0|100|20110414|allocated
";
        let nets = FeedSource::new().parse(text);
        assert_eq!(
            nets,
            vec![
                "1.0.1.0/24".parse::<Ipv4Net>().unwrap(),
                "1.0.2.0/23".parse::<Ipv4Net>().unwrap(),
            ]
        );
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let text = "APNIC|CN|ipv4|1.0.1.0|256|20110414|ALLOCATED";
        let nets = FeedSource::new().parse(text);
        assert_eq!(nets.len(), 1);
    }

    #[test]
    fn test_parse_honors_configured_filter() {
        let text = "\
apnic|cn|ipv4|1.0.1.0|256|20110414|allocated
ripencc|fr|ipv4|2.0.0.0|1024|20120101|allocated
";
        let source = FeedSource::new()
            .with_registry("ripencc")
            .with_country("fr");
        let nets = source.parse(text);
        assert_eq!(nets, vec!["2.0.0.0/22".parse::<Ipv4Net>().unwrap()]);
    }

    #[test]
    fn test_parse_empty_text() {
        assert!(FeedSource::new().parse("").is_empty());
    }
}
