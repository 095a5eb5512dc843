//! Range normalization.
//!
//! Collapses a raw network list into a minimal covering set: sorted,
//! deduplicated, and merge-closed (no pair of sibling halves left unmerged).

use ipnet::Ipv4Net;

/// Merge two networks into their common parent block.
///
/// Succeeds iff both are the low and high halves of exactly one parent: the
/// parent's first address equals `low`'s base and the parent's last address
/// equals `high`'s broadcast.
fn try_merge(low: &Ipv4Net, high: &Ipv4Net) -> Option<Ipv4Net> {
    let parent = low.supernet()?;
    if parent != high.supernet()? {
        return None;
    }
    if parent.network() != low.network() || parent.broadcast() != high.broadcast() {
        return None;
    }
    Some(parent)
}

/// Normalize a network list into a minimal covering set.
///
/// The result is sorted by (base address, prefix length), deduplicated, and
/// merge-closed: running `normalize` on its own output is a no-op. The set of
/// covered addresses is exactly that of the input. Empty input yields an
/// empty result.
pub fn normalize(networks: Vec<Ipv4Net>) -> Vec<Ipv4Net> {
    let mut sorted: Vec<Ipv4Net> = networks.into_iter().map(|n| n.trunc()).collect();
    sorted.sort();
    sorted.dedup();

    // Single pass with a merge stack: after pushing each network, keep
    // merging the top two entries while they form sibling halves. A fresh
    // merge can enable merging with the previous element, which the repeated
    // top-of-stack check covers without stepping an index back.
    let mut merged: Vec<Ipv4Net> = Vec::with_capacity(sorted.len());
    for net in sorted {
        merged.push(net);
        while merged.len() >= 2 {
            let high = merged[merged.len() - 1];
            let low = merged[merged.len() - 2];
            match try_merge(&low, &high) {
                Some(parent) => {
                    merged.pop();
                    let top = merged.len() - 1;
                    merged[top] = parent;
                }
                None => break,
            }
        }
    }
    merged
}
