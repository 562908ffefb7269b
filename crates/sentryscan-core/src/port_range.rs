//! Parses the `ports` field accepted by the scan-submission interface:
//! comma-separated singletons and/or `N-M` ranges.

use crate::error::{Error, Result};
use crate::types::PortSet;
use std::collections::BTreeSet;

/// Parse `"22,80,443"` or `"1-1000"` or `"22,80-90,443"` into a `PortSet`.
/// Values outside `[1, 65535]` are rejected as `InvalidPortSet` rather than
/// silently truncated — e.g. `"1-70000"` must fail, not wrap.
pub fn parse_port_spec(spec: &str) -> Result<PortSet> {
    let mut ports: BTreeSet<u16> = BTreeSet::new();

    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((start, end)) = part.split_once('-') {
            let start = parse_port_num(start.trim())?;
            let end = parse_port_num(end.trim())?;
            if end < start {
                return Err(Error::InvalidPortSet(format!(
                    "end port {end} < start port {start}"
                )));
            }
            for p in start..=end {
                ports.insert(p);
            }
        } else {
            ports.insert(parse_port_num(part)?);
        }
    }

    if ports.is_empty() {
        return Err(Error::InvalidPortSet("empty port specification".into()));
    }

    Ok(PortSet::from_sorted_vec(ports.into_iter().collect()))
}

fn parse_port_num(s: &str) -> Result<u16> {
    let n: u32 = s
        .parse()
        .map_err(|_| Error::InvalidPortSet(format!("invalid port number: {s}")))?;
    if n == 0 || n > 65535 {
        return Err(Error::InvalidPortSet(format!(
            "port {n} out of range [1, 65535]"
        )));
    }
    Ok(n as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_singletons_and_ranges() {
        let ps = parse_port_spec("22,80,443").unwrap();
        assert_eq!(ps.as_sorted_vec(), vec![22, 80, 443]);
    }

    #[test]
    fn out_of_range_rejected() {
        assert!(parse_port_spec("1-70000").is_err());
    }

    #[test]
    fn port_zero_rejected() {
        assert!(parse_port_spec("0-10").is_err());
    }
}
