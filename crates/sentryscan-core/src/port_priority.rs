//! Port Prioritizer — partitions a requested port set into four priority
//! tiers using a fixed table of well-known service ports.

use crate::types::{PortSet, Tier, TierKind};
use std::collections::HashSet;
use std::sync::OnceLock;

fn critical_ports() -> &'static HashSet<u16> {
    static SET: OnceLock<HashSet<u16>> = OnceLock::new();
    SET.get_or_init(|| {
        [21, 22, 23, 25, 80, 443, 3306, 3389, 5432, 8080, 8443]
            .into_iter()
            .collect()
    })
}

fn high_ports() -> &'static HashSet<u16> {
    static SET: OnceLock<HashSet<u16>> = OnceLock::new();
    SET.get_or_init(|| {
        [20, 53, 110, 143, 445, 1433, 1521, 3000, 5000, 8000, 27017]
            .into_iter()
            .collect()
    })
}

fn medium_ports() -> &'static HashSet<u16> {
    static SET: OnceLock<HashSet<u16>> = OnceLock::new();
    SET.get_or_init(|| {
        [135, 139, 389, 636, 1723, 2049, 5900, 6379, 9200, 11211]
            .into_iter()
            .collect()
    })
}

pub fn priority_for_port(port: u16) -> TierKind {
    if critical_ports().contains(&port) {
        TierKind::Critical
    } else if high_ports().contains(&port) {
        TierKind::High
    } else if medium_ports().contains(&port) {
        TierKind::Medium
    } else {
        TierKind::Low
    }
}

/// Partition a `PortSet` into the four tiers, each sorted ascending, in
/// the fixed iteration order critical -> high -> medium -> low. The union
/// of the returned tiers equals `ports`; the tiers are pairwise disjoint.
pub fn partition(ports: &PortSet) -> Vec<Tier> {
    let mut buckets: [Vec<u16>; 4] = Default::default();
    for port in ports.iter() {
        let idx = match priority_for_port(port) {
            TierKind::Critical => 0,
            TierKind::High => 1,
            TierKind::Medium => 2,
            TierKind::Low => 3,
        };
        buckets[idx].push(port);
    }
    TierKind::ORDER
        .into_iter()
        .zip(buckets)
        .map(|(kind, ports)| Tier { kind, ports })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_covers_all_ports_disjointly() {
        let ps = PortSet::new([22, 80, 53, 6379, 9999, 443]);
        let tiers = partition(&ps);
        let mut all: Vec<u16> = tiers.iter().flat_map(|t| t.ports.clone()).collect();
        all.sort_unstable();
        assert_eq!(all, vec![22, 53, 80, 443, 6379, 9999]);
    }

    #[test]
    fn tier_order_is_critical_high_medium_low() {
        let ps = PortSet::new([9999, 22, 6379, 53]);
        let tiers = partition(&ps);
        assert_eq!(
            tiers.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TierKind::Critical,
                TierKind::High,
                TierKind::Medium,
                TierKind::Low
            ]
        );
        assert_eq!(tiers[0].ports, vec![22]);
        assert_eq!(tiers[1].ports, vec![53]);
        assert_eq!(tiers[2].ports, vec![6379]);
        assert_eq!(tiers[3].ports, vec![9999]);
    }

    #[test]
    fn numeric_order_preserved_within_tier() {
        let ps = PortSet::new([8443, 22, 443, 21]);
        let tiers = partition(&ps);
        assert_eq!(tiers[0].ports, vec![21, 22, 443, 8443]);
    }
}
