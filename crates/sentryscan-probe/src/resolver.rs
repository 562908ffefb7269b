//! Target Resolver — resolves a hostname to an address exactly once per
//! scan, then re-validates the resolved IP against the block policy. The
//! returned `Target` is immutable for the scan's lifetime — no component
//! may re-resolve mid-scan.

use sentryscan_core::error::{Error, Result};
use sentryscan_core::validator::{validate_ip, validate_target_syntax};
use sentryscan_core::Target;
use std::net::IpAddr;
use tokio::net::lookup_host;

/// Resolve and validate `raw` into an immutable `Target`. DNS lookup
/// happens at most once here, regardless of how many times a caller asks
/// for the scan's target afterward — callers must hold on to the
/// returned `Target` rather than re-invoking this function.
pub async fn resolve(raw: &str, allow_private: bool, whitelist: &[String]) -> Result<Target> {
    validate_target_syntax(raw, whitelist)?;

    let (ip, hostname) = if let Ok(ip) = raw.parse::<IpAddr>() {
        (ip, None)
    } else {
        let ip = resolve_hostname(raw).await?;
        (ip, Some(raw.to_string()))
    };

    validate_ip(ip, allow_private, whitelist, raw).map_err(|e| match e {
        Error::BlockedTarget(msg) => Error::BlockedAfterResolution(msg),
        other => other,
    })?;

    Ok(Target {
        raw: raw.to_string(),
        resolved_ip: ip,
        hostname,
        allow_private,
    })
}

async fn resolve_hostname(hostname: &str) -> Result<IpAddr> {
    let addr = format!("{hostname}:0");
    let mut addrs = lookup_host(addr)
        .await
        .map_err(|e| Error::ResolutionFailed(format!("{hostname}: {e}")))?;
    addrs
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| Error::ResolutionFailed(format!("{hostname}: no addresses returned")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ip_literal_is_not_dns_resolved() {
        let target = resolve("93.184.216.34", true, &[]).await.unwrap();
        assert_eq!(target.hostname, None);
        assert_eq!(target.resolved_ip.to_string(), "93.184.216.34");
    }

    #[tokio::test]
    async fn blocked_private_ip_literal_is_rejected() {
        let err = resolve("10.1.2.3", false, &[]).await.unwrap_err();
        assert!(matches!(err, Error::BlockedTarget(_)));
    }
}
