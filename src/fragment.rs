//! Network fragmentation.
//!
//! Splits networks into subnets whose prefix lengths sit on configurable step
//! boundaries, so the bucket hash only has to cover a handful of distinct
//! prefix lengths at query time.

use ipnet::Ipv4Net;
use log::warn;

/// Round a prefix length up to the next step boundary.
///
/// Exact multiples of `step` are fixed points. Floor division keeps prefix
/// length 0 at target 0 instead of bumping it to `step`.
fn target_prefix(prefix_len: u8, step: u8) -> i32 {
    let step = i32::from(step);
    (i32::from(prefix_len) - 1).div_euclid(step) * step + step
}

/// Fragment a network into subnets aligned to `step` boundaries.
///
/// If the target prefix length exceeds 32 the network cannot be fragmented
/// and is returned unchanged. The union of the returned subnets is always
/// exactly the input network.
pub fn fragment(net: Ipv4Net, step: u8) -> Vec<Ipv4Net> {
    debug_assert!(step >= 1);

    let target = target_prefix(net.prefix_len(), step);
    if target > 32 {
        warn!("cannot fragment {} to step {}: target prefix {} exceeds 32", net, step, target);
        return vec![net];
    }

    match net.subnets(target as u8) {
        Ok(subnets) => subnets.collect(),
        Err(_) => vec![net],
    }
}

/// Fragment every network in the list, preserving per-network order.
pub fn fragment_all(nets: &[Ipv4Net], step: u8) -> Vec<Ipv4Net> {
    nets.iter().flat_map(|net| fragment(*net, step)).collect()
}
