//! Service Identifier — per-port probe templates, bounded banner capture,
//! confidence scoring, and a reduced TLS inspection step: no
//! service-probe-database parsing, no certificate chain validation, no
//! JA3/JA4 fingerprinting.

use native_tls::TlsConnector;
use sentryscan_core::types::{PortResult, PortState};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Banner reads never exceed this many bytes.
const BANNER_CAP: usize = 1024;

const TLS_PORTS: &[u16] = &[443, 8443, 465, 636, 993, 995];

/// Probe template keyed by well-known port. `None` means "read only, send
/// nothing" (works for banner-on-connect protocols like FTP/SMTP/SSH).
fn probe_template(port: u16) -> (&'static str, Option<&'static [u8]>) {
    match port {
        21 => ("ftp", None),
        22 => ("ssh", None),
        23 => ("telnet", None),
        25 | 587 => ("smtp", Some(b"EHLO sentryscan\r\n")),
        80 | 8080 => ("http", Some(b"GET / HTTP/1.0\r\nHost: localhost\r\n\r\n")),
        110 => ("pop3", Some(b"USER guest\r\n")),
        143 => ("imap", None),
        443 | 8443 => ("https", Some(b"GET / HTTP/1.0\r\nHost: localhost\r\n\r\n")),
        3306 => ("mysql", None),
        3389 => ("rdp", Some(&[0x03, 0x00, 0x00, 0x0b, 0x06, 0xe0, 0x00, 0x00, 0x00, 0x00, 0x00])),
        5432 => ("postgresql", None),
        6379 => ("redis", Some(b"PING\r\n")),
        _ => ("unknown", None),
    }
}

/// Regexes are avoided here in favor of cheap substring checks on the
/// hot path.
fn fingerprint_banner(service: &str, banner: &str) -> Option<(String, Option<String>)> {
    let lower = banner.to_ascii_lowercase();
    match service {
        "ssh" if lower.starts_with("ssh-") => {
            let version = banner
                .trim()
                .split_whitespace()
                .next()
                .map(|s| s.trim_start_matches("SSH-").to_string());
            Some(("ssh".to_string(), version))
        }
        "ftp" if lower.contains("ftp") => Some(("ftp".to_string(), None)),
        "smtp" if lower.contains("smtp") || lower.starts_with("220") => {
            Some(("smtp".to_string(), None))
        }
        "http" | "https" if lower.starts_with("http/") => {
            let server_line = lower
                .lines()
                .find(|l| l.starts_with("server:"))
                .map(|l| l.trim_start_matches("server:").trim().to_string());
            Some((service.to_string(), server_line))
        }
        "redis" if lower.contains("pong") => Some(("redis".to_string(), None)),
        _ if !banner.is_empty() => Some((service.to_string(), None)),
        _ => None,
    }
}

/// Open a fresh connection to `port`, write the port's probe template (if
/// any), read up to [`BANNER_CAP`] bytes within `timeout_dur`, and
/// classify. Never returns an error: an unreachable port simply yields a
/// zero-confidence result, matching the banner-grab's best-effort nature.
pub async fn identify(ip: IpAddr, mut result: PortResult, timeout_dur: Duration) -> PortResult {
    if result.state != PortState::Open {
        return result;
    }

    let addr = SocketAddr::new(ip, result.port);
    let (service, probe) = probe_template(result.port);
    result.service = Some(service.to_string());

    let banner = match timeout(timeout_dur, grab_banner(addr, probe)).await {
        Ok(Ok(banner)) => banner,
        _ => None,
    };

    if TLS_PORTS.contains(&result.port) {
        if let Some(tls_summary) = inspect_tls(addr, timeout_dur).await {
            result.banner = Some(match &banner {
                Some(b) => format!("{tls_summary}; {b}"),
                None => tls_summary,
            });
        } else {
            result.banner = banner.clone();
        }
    } else {
        result.banner = banner.clone();
    }

    result.confidence = match &banner {
        None => {
            if service == "unknown" {
                0.0
            } else {
                0.5
            }
        }
        Some(b) => match fingerprint_banner(service, b) {
            Some((svc, Some(version))) => {
                result.service = Some(svc);
                result.version = Some(version);
                0.9
            }
            Some((svc, None)) => {
                result.service = Some(svc);
                0.7
            }
            None => 0.5,
        },
    };

    result
}

async fn grab_banner(addr: SocketAddr, probe: Option<&[u8]>) -> std::io::Result<Option<String>> {
    let mut stream = TcpStream::connect(addr).await?;
    if let Some(bytes) = probe {
        stream.write_all(bytes).await?;
    }

    let mut buf = vec![0u8; BANNER_CAP];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    buf.truncate(n);
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Records TLS protocol version and negotiated cipher without validating
/// the certificate chain.
async fn inspect_tls(addr: SocketAddr, timeout_dur: Duration) -> Option<String> {
    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .ok()?;
    let connector = tokio_native_tls::TlsConnector::from(connector);

    let tcp = timeout(timeout_dur, TcpStream::connect(addr)).await.ok()?.ok()?;
    let tls_stream = timeout(timeout_dur, connector.connect(&addr.ip().to_string(), tcp))
        .await
        .ok()?
        .ok()?;

    let inner = tls_stream.get_ref();
    let protocol = inner
        .negotiated_alpn()
        .ok()
        .flatten()
        .map(|p| String::from_utf8_lossy(&p).into_owned())
        .unwrap_or_else(|| "tls".to_string());

    debug!(?addr, protocol, "tls inspection complete");
    Some(format!("tls:{protocol}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_port_without_banner_has_zero_confidence() {
        assert_eq!(probe_template(54321).0, "unknown");
    }

    #[test]
    fn ssh_banner_extracts_version() {
        let fp = fingerprint_banner("ssh", "SSH-2.0-OpenSSH_9.7\r\n");
        assert_eq!(fp, Some(("ssh".to_string(), Some("2.0-OpenSSH_9.7".to_string()))));
    }

    #[test]
    fn http_banner_matches_without_version_extraction() {
        let fp = fingerprint_banner("http", "HTTP/1.1 200 OK\r\n");
        assert!(fp.is_some());
    }

    #[tokio::test]
    async fn closed_port_is_passed_through_unmodified() {
        let result = PortResult::new(9, PortState::Closed);
        let out = identify("127.0.0.1".parse().unwrap(), result, Duration::from_millis(50)).await;
        assert_eq!(out.state, PortState::Closed);
        assert_eq!(out.confidence, 0.0);
    }
}
