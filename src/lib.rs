//! PAC generator - hashed IPv4 range lookup tables for proxy auto-config
//!
//! This library turns a large set of regional IPv4 ranges into a compact
//! decision structure a browser's PAC evaluator can query in near-constant
//! time, and renders it as a self-contained `.pac` artifact:
//! - Delegation feed acquisition and record parsing
//! - Adjacent-range merging into a minimal covering set
//! - Step-aligned fragmentation and masked-address hash partitioning
//! - The exact runtime matching procedure the artifact embeds
//! - Bypass-rule and proxy-balancing rendering
//!
//! # Example
//!
//! ```rust
//! use pac_gen_r::{normalize, pac, Balance, LookupTable};
//!
//! // Raw ranges from the feed, in any order
//! let raw: Vec<ipnet::Ipv4Net> = vec![
//!     "1.0.0.0/24".parse().unwrap(),
//!     "1.0.1.0/24".parse().unwrap(),
//!     "1.0.2.0/24".parse().unwrap(),
//!     "1.0.3.0/24".parse().unwrap(),
//! ];
//!
//! // Merge into a minimal covering set
//! let merged = normalize(raw);
//! assert_eq!(merged, vec!["1.0.0.0/22".parse().unwrap()]);
//!
//! // Build the hashed lookup table
//! let table = LookupTable::build(&merged, 2, 3011).unwrap();
//! assert!(table.contains("1.0.3.7".parse().unwrap()));
//! assert!(!table.contains("2.0.0.1".parse().unwrap()));
//!
//! // Render the PAC artifact
//! let artifact = pac::render(
//!     &table,
//!     &["SOCKS5 127.0.0.1:1984".to_string()],
//!     Balance::No,
//!     &["192.168.0.0/24".to_string()],
//! )
//! .unwrap();
//! assert!(artifact.contains("function FindProxyForURL(url, host)"));
//! ```

pub mod error;
pub mod feed;
pub mod fragment;
pub mod generator;
pub mod normalize;
pub mod pac;
pub mod table;

// Re-export commonly used items
pub use error::{FeedErrorKind, PacError, Result};
pub use feed::{parse_record, FeedSource, DEFAULT_COUNTRY, DEFAULT_FEED_URL, DEFAULT_REGISTRY};
pub use fragment::{fragment, fragment_all};
pub use generator::{Generator, GeneratorOptions};
pub use normalize::normalize;
pub use pac::{balance_snippet, bypass_conditions, render, Balance, BypassRule};
pub use table::{
    assign_bucket, masked_value, partition, prefix_bounds, LookupTable, TableExport, TableStats,
    DEFAULT_BUCKET_COUNT, DEFAULT_MASK_STEP,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_workflow() {
        let feed_text = "\
2|apnic|20240101|1234|19830613|20240101|+1000
apnic|cn|ipv4|1.0.0.0|256|20110414|allocated
apnic|cn|ipv4|1.0.1.0|256|20110414|allocated
apnic|cn|ipv4|1.0.2.0|256|20110414|allocated
apnic|cn|ipv4|1.0.3.0|256|20110414|allocated
apnic|cn|ipv4|27.0.0.0|4194304|20110414|allocated
apnic|jp|ipv4|43.0.0.0|1024|20110412|allocated
apnic|cn|ipv4|59.32.0.0|100|20110414|allocated
";
        // Parse: selects the five cn records, skips the malformed count
        let raw = FeedSource::new().parse(feed_text);
        assert_eq!(raw.len(), 5);

        // Normalize: four /24 siblings collapse into one /22
        let merged = normalize(raw);
        assert_eq!(
            merged,
            vec![
                "1.0.0.0/22".parse().unwrap(),
                "27.0.0.0/10".parse().unwrap(),
            ]
        );

        // Build and match
        let table = LookupTable::build(&merged, 2, 3011).unwrap();
        assert_eq!(table.min_prefix(), 10);
        assert_eq!(table.max_prefix(), 22);
        assert!(table.contains("1.0.2.200".parse().unwrap()));
        assert!(table.contains("27.63.255.255".parse().unwrap()));
        assert!(!table.contains("43.0.0.1".parse().unwrap()));
        assert!(!table.contains("8.8.8.8".parse().unwrap()));

        // Render the artifact through the generator surface
        let generator = Generator::new(
            GeneratorOptions::new()
                .with_proxies(vec!["SOCKS5 127.0.0.1:1984".to_string()])
                .with_balance(Balance::Host),
        )
        .unwrap();
        let artifact = generator.render(&table).unwrap();
        assert!(artifact.contains("HASH_BASE = 3011;"));
        assert!(artifact.contains("target_host_balance"));
    }
}
