//! Allowlist reconciliation arithmetic

use crate::traits::IpRange;
use std::collections::BTreeSet;

/// Ranges in `desired` that are missing from `current`
///
/// Matching is by exact string. No CIDR containment check is made, so an
/// existing `/16` does not cover a desired `/24`. The result is sorted,
/// which keeps provider requests and reports stable between runs.
pub fn missing_ranges(desired: &BTreeSet<IpRange>, current: &BTreeSet<IpRange>) -> Vec<IpRange> {
    desired.difference(current).cloned().collect()
}
