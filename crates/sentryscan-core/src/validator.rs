//! Validator — rejects unsafe/invalid targets and port sets before any
//! network I/O: an always-blocked exact-match list distinct from the
//! private-range gate, plus a substring-blocked list of internal-sounding
//! placeholder names.

use crate::error::{Error, Result};
use regex::Regex;
use std::net::IpAddr;
use std::sync::OnceLock;

/// Exact-match hosts that are blocked regardless of `allow_private`.
const ALWAYS_BLOCKED: &[&str] = ["localhost", "127.0.0.1", "::1", "0.0.0.0", "255.255.255.255"].as_slice();

/// Substring-blocked placeholder/internal hostnames. A target containing
/// any of these (case-insensitive) is blocked unless it appears in the
/// private-IP whitelist.
const PLACEHOLDER_SUBSTRINGS: &[&str] = &[
    "example.com",
    "internal",
    "intranet",
    "corp",
    "company",
    "localdomain",
    "lan",
    "router",
    "gateway",
    "firewall",
    "printer",
];

fn hostname_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^[a-z0-9-]{1,63}$").unwrap())
}

/// Validate a raw target string before any resolution is attempted.
/// Hostname-format validation only; private-range / placeholder gating
/// against an already-known IP is handled by [`validate_ip`].
pub fn validate_target_syntax(raw: &str, whitelist: &[String]) -> Result<()> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::InvalidTarget("empty target".into()));
    }

    let lower = raw.to_lowercase();
    if ALWAYS_BLOCKED.iter().any(|b| lower == *b) {
        return Err(Error::BlockedTarget(format!("{raw} is always-blocked")));
    }

    let whitelisted = whitelist.iter().any(|w| w.eq_ignore_ascii_case(raw));
    if !whitelisted {
        if let Some(hit) = PLACEHOLDER_SUBSTRINGS.iter().find(|p| lower.contains(*p)) {
            return Err(Error::BlockedTarget(format!(
                "{raw} matches placeholder pattern '{hit}'"
            )));
        }
    }

    if raw.parse::<IpAddr>().is_err() && !is_valid_hostname(raw) {
        return Err(Error::InvalidTarget(format!("invalid hostname: {raw}")));
    }

    Ok(())
}

/// Hostname label rules: <=63 chars/label, <=255 total, TLD >=2 alpha
/// chars, no leading/trailing hyphen per label.
fn is_valid_hostname(hostname: &str) -> bool {
    if hostname.is_empty() || hostname.len() > 255 || hostname.ends_with('.') {
        return false;
    }
    let labels: Vec<&str> = hostname.split('.').collect();
    if labels.iter().any(|l| l.is_empty() || l.len() > 63) {
        return false;
    }
    let Some(tld) = labels.last() else {
        return false;
    };
    if tld.len() < 2 || !tld.chars().all(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    labels
        .iter()
        .all(|l| !l.starts_with('-') && !l.ends_with('-') && hostname_label_re().is_match(l))
}

/// Validate an IP address (either the directly-supplied target or the
/// resolved hostname) against the block policy.
pub fn validate_ip(ip: IpAddr, allow_private: bool, whitelist: &[String], raw: &str) -> Result<()> {
    if ip.is_multicast() {
        return Err(Error::BlockedTarget(format!("{ip} is multicast")));
    }
    if ALWAYS_BLOCKED.iter().any(|b| ip.to_string() == *b) {
        return Err(Error::BlockedTarget(format!("{ip} is always-blocked")));
    }

    let whitelisted = whitelist.iter().any(|w| w.eq_ignore_ascii_case(raw) || w == &ip.to_string());
    if !allow_private && !whitelisted && is_private_like(ip) {
        return Err(Error::BlockedTarget(format!(
            "{ip} is a private/loopback/link-local address"
        )));
    }
    Ok(())
}

fn is_private_like(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}

/// PortSet validation: all integers in [1,65535], no duplicates (dedup is
/// structural via `PortSet`'s `BTreeSet`), cardinality <= 65536.
pub fn validate_port_set(ports: &[u16], limit: usize) -> Result<()> {
    if ports.is_empty() {
        return Err(Error::InvalidPortSet("empty port set".into()));
    }
    if ports.len() > limit {
        return Err(Error::InvalidPortSet(format!(
            "port set cardinality {} exceeds limit {}",
            ports.len(),
            limit
        )));
    }
    if ports.iter().any(|p| *p == 0) {
        return Err(Error::InvalidPortSet("port 0 is invalid".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn always_blocked_exact_match() {
        assert!(validate_target_syntax("127.0.0.1", &[]).is_err());
        assert!(validate_target_syntax("localhost", &[]).is_err());
    }

    #[test]
    fn placeholder_substring_blocked_case_insensitive() {
        assert!(validate_target_syntax("Example.COM", &[]).is_err());
        assert!(validate_target_syntax("my-router.home", &[]).is_err());
    }

    #[test]
    fn whitelist_overrides_placeholder_block() {
        let wl = vec!["my-router.home".to_string()];
        assert!(validate_target_syntax("my-router.home", &wl).is_ok());
    }

    #[test]
    fn valid_hostname_passes() {
        assert!(validate_target_syntax("scanme.example-target.io", &[]).is_ok());
    }

    #[test]
    fn hostname_tld_too_short_rejected() {
        assert!(!is_valid_hostname("host.x"));
    }

    #[test]
    fn hostname_label_leading_or_trailing_hyphen_rejected() {
        assert!(!is_valid_hostname("-bad.example.com"));
        assert!(!is_valid_hostname("bad-.example.com"));
    }

    #[test]
    fn private_ip_blocked_without_allow_private() {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
        assert!(validate_ip(ip, false, &[], "10.0.0.5").is_err());
        assert!(validate_ip(ip, true, &[], "10.0.0.5").is_ok());
    }

    #[test]
    fn port_set_limit_enforced() {
        let ports: Vec<u16> = (1..=70).collect();
        assert!(validate_port_set(&ports, 65).is_err());
        assert!(validate_port_set(&ports, 65536).is_ok());
    }

    #[test]
    fn port_zero_rejected() {
        assert!(validate_port_set(&[0, 80], 100).is_err());
    }
}
