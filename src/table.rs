//! Lookup table construction and the runtime matching contract.
//!
//! The table is a dense array of hash buckets keyed by a masked-address
//! modulo, plus the scalar parameters the embedded evaluator needs to walk
//! prefix lengths at query time. [`LookupTable::contains`] implements the
//! exact matching procedure the emitted artifact performs, so the table
//! shape is verifiable without a JS host.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use log::debug;
use serde::Serialize;

use crate::error::{PacError, Result};
use crate::fragment::fragment_all;

/// Default hash table width
pub const DEFAULT_BUCKET_COUNT: u32 = 3011;

/// Default fragmentation step
pub const DEFAULT_MASK_STEP: u8 = 2;

/// Bucket index for a network: its base address modulo the bucket count.
///
/// Pure unsigned 32-bit arithmetic; identical inputs produce identical
/// indices across runs and platforms.
pub fn assign_bucket(net: &Ipv4Net, bucket_count: u32) -> u32 {
    u32::from(net.network()) % bucket_count
}

/// Distribute networks into `bucket_count` dense buckets.
///
/// Bucket order is insertion order, i.e. the order `nets` is iterated.
pub fn partition(nets: &[Ipv4Net], bucket_count: u32) -> Vec<Vec<Ipv4Net>> {
    let mut buckets = vec![Vec::new(); bucket_count as usize];
    for net in nets {
        buckets[assign_bucket(net, bucket_count) as usize].push(*net);
    }
    buckets
}

/// Minimum and maximum prefix length over a set.
///
/// The empty set yields the `(32, 0)` sentinel pair, which makes the
/// matcher's prefix walk empty.
pub fn prefix_bounds(nets: &[Ipv4Net]) -> (u8, u8) {
    nets.iter().fold((32, 0), |(min, max), net| {
        (min.min(net.prefix_len()), max.max(net.prefix_len()))
    })
}

/// Masked value of a network: the base address with the trailing
/// `32 - prefix_len` zero bits removed.
pub fn masked_value(net: &Ipv4Net) -> u32 {
    // 64-bit shift so prefix length 0 (shift by 32) is defined.
    (u64::from(u32::from(net.network())) >> (32 - u32::from(net.prefix_len()))) as u32
}

/// Occupancy and probe-cost figures for a built table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableStats {
    /// Total fragments stored across all buckets
    pub entries: usize,
    /// Buckets holding at least one fragment
    pub occupied_buckets: usize,
    /// Average fragments per occupied bucket
    pub average_occupancy: f64,
    /// Bucket probes the matcher performs per query
    pub probe_steps: u32,
    /// Estimated matching cost: probes times average occupancy
    pub estimated_cost: f64,
}

/// Serializable form of the table: per bucket an empty list or
/// `[maskedValue, prefixLen]` pairs, plus the scalar parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableExport {
    pub bucket_count: u32,
    pub step: u8,
    pub min_prefix: u8,
    pub max_prefix: u8,
    pub buckets: Vec<Vec<(u32, u8)>>,
}

/// Immutable hashed lookup table over a normalized network set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTable {
    bucket_count: u32,
    step: u8,
    min_prefix: u8,
    max_prefix: u8,
    buckets: Vec<Vec<Ipv4Net>>,
}

impl LookupTable {
    /// Build a table from a normalized network set.
    ///
    /// Pure function of its inputs: computes the prefix bounds over the
    /// normalized set, fragments to step boundaries, and partitions into
    /// buckets. `step` and `bucket_count` must both be at least 1.
    pub fn build(normalized: &[Ipv4Net], step: u8, bucket_count: u32) -> Result<Self> {
        if step == 0 {
            return Err(PacError::ConfigError("step must be at least 1".into()));
        }
        if bucket_count == 0 {
            return Err(PacError::ConfigError("bucket count must be at least 1".into()));
        }

        let (min_prefix, max_prefix) = prefix_bounds(normalized);
        let fragmented = fragment_all(normalized, step);
        debug!(
            "fragmented {} networks into {} entries, prefix bounds [{}, {}]",
            normalized.len(),
            fragmented.len(),
            min_prefix,
            max_prefix
        );
        let buckets = partition(&fragmented, bucket_count);

        Ok(Self {
            bucket_count,
            step,
            min_prefix,
            max_prefix,
            buckets,
        })
    }

    /// Hash table width.
    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    /// Fragmentation step.
    pub fn step(&self) -> u8 {
        self.step
    }

    /// Smallest prefix length observed before fragmentation (32 when empty).
    pub fn min_prefix(&self) -> u8 {
        self.min_prefix
    }

    /// Largest prefix length observed before fragmentation (0 when empty).
    pub fn max_prefix(&self) -> u8 {
        self.max_prefix
    }

    /// The dense bucket array.
    pub fn buckets(&self) -> &[Vec<Ipv4Net>] {
        &self.buckets
    }

    /// Total fragments stored across all buckets.
    pub fn entry_count(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    /// Decide whether an address falls inside the covered region.
    ///
    /// This is the matching procedure the emitted artifact runs: walk prefix
    /// lengths from `min_prefix` to `max_prefix` in increments of `step`,
    /// rebuild the candidate's masked base at each length, probe the bucket
    /// that base hashes to, and compare masked values at equal prefix
    /// lengths. Storage and lookup use the identical hash function. With the
    /// empty-set sentinel bounds the walk body never runs and every query is
    /// a true negative.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let candidate = u64::from(u32::from(addr));
        let mut prefix_len = u32::from(self.min_prefix);
        while prefix_len <= u32::from(self.max_prefix) {
            let shift = 32 - prefix_len;
            let masked = candidate >> shift;
            let index = ((masked << shift) % u64::from(self.bucket_count)) as usize;
            for net in &self.buckets[index] {
                if u32::from(net.prefix_len()) == prefix_len
                    && u64::from(masked_value(net)) == masked
                {
                    return true;
                }
            }
            prefix_len += u32::from(self.step);
        }
        false
    }

    /// Occupancy and probe-cost figures.
    pub fn stats(&self) -> TableStats {
        let entries = self.entry_count();
        let occupied_buckets = self.buckets.iter().filter(|b| !b.is_empty()).count();
        let average_occupancy = if occupied_buckets > 0 {
            entries as f64 / occupied_buckets as f64
        } else {
            0.0
        };
        let probe_steps = if self.min_prefix <= self.max_prefix {
            (u32::from(self.max_prefix) - u32::from(self.min_prefix)) / u32::from(self.step) + 1
        } else {
            0
        };
        TableStats {
            entries,
            occupied_buckets,
            average_occupancy,
            probe_steps,
            estimated_cost: average_occupancy * f64::from(probe_steps),
        }
    }

    /// The serializable artifact structure.
    pub fn export(&self) -> TableExport {
        TableExport {
            bucket_count: self.bucket_count,
            step: self.step,
            min_prefix: self.min_prefix,
            max_prefix: self.max_prefix,
            buckets: self
                .buckets
                .iter()
                .map(|bucket| {
                    bucket
                        .iter()
                        .map(|net| (masked_value(net), net.prefix_len()))
                        .collect()
                })
                .collect(),
        }
    }

    /// The artifact structure as a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.export())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nets(cidrs: &[&str]) -> Vec<Ipv4Net> {
        cidrs.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn test_assign_bucket_deterministic() {
        let net = "10.0.0.0/24".parse().unwrap();
        assert_eq!(assign_bucket(&net, 10), assign_bucket(&net, 10));
        assert_eq!(assign_bucket(&net, 10), u32::from(Ipv4Addr::new(10, 0, 0, 0)) % 10);
    }

    #[test]
    fn test_assign_bucket_uniform_over_sequential_keys() {
        // Base addresses 0..100 modulo 10 land each bucket exactly ten times.
        let hosts: Vec<Ipv4Net> = (0u32..100)
            .map(|x| Ipv4Net::new(Ipv4Addr::from(x), 32).unwrap())
            .collect();
        let buckets = partition(&hosts, 10);
        assert_eq!(buckets.len(), 10);
        for bucket in &buckets {
            assert_eq!(bucket.len(), 10);
        }
    }

    #[test]
    fn test_partition_completeness() {
        let fragments = nets(&["1.0.1.0/24", "1.0.2.0/24", "27.0.0.0/10", "1.0.1.0/24"]);
        for bucket_count in [1, 3, 7, 3011] {
            let buckets = partition(&fragments, bucket_count);
            let total: usize = buckets.iter().map(Vec::len).sum();
            assert_eq!(total, fragments.len());
        }
    }

    #[test]
    fn test_partition_preserves_insertion_order() {
        // Both nets hash to bucket 0 of 1; order must match iteration order.
        let fragments = nets(&["1.0.2.0/24", "1.0.1.0/24"]);
        let buckets = partition(&fragments, 1);
        assert_eq!(buckets[0], fragments);
    }

    #[test]
    fn test_prefix_bounds() {
        assert_eq!(prefix_bounds(&nets(&["1.0.1.0/24", "27.0.0.0/10"])), (10, 24));
        assert_eq!(prefix_bounds(&nets(&["1.0.1.0/24"])), (24, 24));
        assert_eq!(prefix_bounds(&[]), (32, 0));
    }

    #[test]
    fn test_masked_value() {
        let net: Ipv4Net = "1.0.1.0/24".parse().unwrap();
        assert_eq!(masked_value(&net), u32::from(Ipv4Addr::new(1, 0, 1, 0)) >> 8);

        let whole: Ipv4Net = "0.0.0.0/0".parse().unwrap();
        assert_eq!(masked_value(&whole), 0);

        let host: Ipv4Net = "1.2.3.4/32".parse().unwrap();
        assert_eq!(masked_value(&host), u32::from(Ipv4Addr::new(1, 2, 3, 4)));
    }

    #[test]
    fn test_build_empty_set_sentinels() {
        let table = LookupTable::build(&[], 2, 100).unwrap();
        assert_eq!(table.min_prefix(), 32);
        assert_eq!(table.max_prefix(), 0);
        assert_eq!(table.entry_count(), 0);
        assert!(!table.contains(Ipv4Addr::new(1, 0, 1, 1)));
        assert!(!table.contains(Ipv4Addr::new(255, 255, 255, 255)));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        assert!(matches!(
            LookupTable::build(&[], 0, 100),
            Err(PacError::ConfigError(_))
        ));
        assert!(matches!(
            LookupTable::build(&[], 2, 0),
            Err(PacError::ConfigError(_))
        ));
    }

    #[test]
    fn test_contains_members_and_non_members() {
        let normalized = nets(&["1.0.1.0/24", "1.0.2.0/23", "27.0.0.0/10"]);
        let table = LookupTable::build(&normalized, 1, 3011).unwrap();

        for member in [
            Ipv4Addr::new(1, 0, 1, 0),
            Ipv4Addr::new(1, 0, 1, 255),
            Ipv4Addr::new(1, 0, 3, 17),
            Ipv4Addr::new(27, 31, 255, 254),
        ] {
            assert!(table.contains(member), "{} should match", member);
        }
        for outsider in [
            Ipv4Addr::new(1, 0, 0, 1),
            Ipv4Addr::new(1, 0, 4, 0),
            Ipv4Addr::new(27, 64, 0, 0),
            Ipv4Addr::new(8, 8, 8, 8),
        ] {
            assert!(!table.contains(outsider), "{} should not match", outsider);
        }
    }

    #[test]
    fn test_contains_with_step_aligned_fragments() {
        // /22 and /24 inputs with step 2: walk probes 22 and 24 and must see
        // every fragment.
        let normalized = nets(&["10.4.0.0/22", "192.168.1.0/24"]);
        let table = LookupTable::build(&normalized, 2, 101).unwrap();

        assert!(table.contains(Ipv4Addr::new(10, 4, 3, 200)));
        assert!(table.contains(Ipv4Addr::new(192, 168, 1, 1)));
        assert!(!table.contains(Ipv4Addr::new(10, 8, 0, 1)));
        assert!(!table.contains(Ipv4Addr::new(192, 168, 2, 1)));
    }

    #[test]
    fn test_contains_single_bucket_degenerate() {
        // bucket_count 1 funnels everything into one bucket; matching must
        // still discriminate by masked value and prefix length.
        let normalized = nets(&["1.0.1.0/24"]);
        let table = LookupTable::build(&normalized, 1, 1).unwrap();
        assert!(table.contains(Ipv4Addr::new(1, 0, 1, 42)));
        assert!(!table.contains(Ipv4Addr::new(1, 0, 2, 42)));
    }

    #[test]
    fn test_build_deterministic() {
        let normalized = nets(&["1.0.1.0/24", "27.0.0.0/10", "58.14.0.0/15"]);
        let a = LookupTable::build(&normalized, 2, 3011).unwrap();
        let b = LookupTable::build(&normalized, 2, 3011).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_stats() {
        let normalized = nets(&["192.168.0.0/19"]);
        let table = LookupTable::build(&normalized, 2, 100).unwrap();
        let stats = table.stats();

        // /19 fragments into two /20 entries.
        assert_eq!(stats.entries, 2);
        assert!(stats.occupied_buckets >= 1 && stats.occupied_buckets <= 2);
        assert_eq!(stats.probe_steps, 1);
        assert!(stats.average_occupancy >= 1.0);
    }

    #[test]
    fn test_stats_empty_table() {
        let table = LookupTable::build(&[], 2, 100).unwrap();
        let stats = table.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.occupied_buckets, 0);
        assert_eq!(stats.probe_steps, 0);
        assert_eq!(stats.estimated_cost, 0.0);
    }

    #[test]
    fn test_export_json_shape() {
        let normalized = nets(&["1.0.1.0/24"]);
        let table = LookupTable::build(&normalized, 2, 3).unwrap();
        let json: serde_json::Value = serde_json::from_str(&table.to_json().unwrap()).unwrap();

        assert_eq!(json["bucketCount"], 3);
        assert_eq!(json["step"], 2);
        assert_eq!(json["minPrefix"], 24);
        assert_eq!(json["maxPrefix"], 24);

        let buckets = json["buckets"].as_array().unwrap();
        assert_eq!(buckets.len(), 3);

        let expected_index =
            (u32::from(Ipv4Addr::new(1, 0, 1, 0)) % 3) as usize;
        let expected_masked = u64::from(u32::from(Ipv4Addr::new(1, 0, 1, 0))) >> 8;
        assert_eq!(
            buckets[expected_index][0],
            serde_json::json!([expected_masked, 24])
        );
        for (i, bucket) in buckets.iter().enumerate() {
            if i != expected_index {
                assert!(bucket.as_array().unwrap().is_empty());
            }
        }
    }
}
