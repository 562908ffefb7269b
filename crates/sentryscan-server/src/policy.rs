//! Denylist/allowlist gating and the pre-scan reachability probe. Lists
//! are reloaded from disk on every request rather than cached, so edits
//! to the files take effect immediately.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

pub struct ListPaths {
    pub denylist: PathBuf,
    pub allowlist: PathBuf,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ListVerdict {
    Denied,
    AllowlistNotice,
    Ok,
}

/// Case-insensitive line membership check against a newline-delimited
/// file. Returns `false` (not an error) if the file does not exist.
async fn contains_line(path: &Path, needle: &str) -> bool {
    let Ok(file) = tokio::fs::File::open(path).await else {
        return false;
    };
    let normalized = needle.trim().to_lowercase();
    let mut lines = tokio::io::BufReader::new(file).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let candidate = line.trim().to_lowercase();
        if !candidate.is_empty() && candidate == normalized {
            return true;
        }
    }
    false
}

/// Checks `raw_target` (and, for the allowlist, the resolved IP too —
/// operators commonly allowlist by address) against the denylist/allowlist
/// files. An allowlist that exists but omits the target yields
/// `AllowlistNotice` rather than a hard denial.
pub async fn check_lists(paths: &ListPaths, raw_target: &str, resolved_ip: Option<IpAddr>) -> ListVerdict {
    if contains_line(&paths.denylist, raw_target).await {
        return ListVerdict::Denied;
    }
    if let Some(ip) = resolved_ip {
        if contains_line(&paths.denylist, &ip.to_string()).await {
            return ListVerdict::Denied;
        }
    }

    if !paths.allowlist.exists() {
        return ListVerdict::Ok;
    }

    let target_allowed = contains_line(&paths.allowlist, raw_target).await;
    let ip_allowed = match resolved_ip {
        Some(ip) => contains_line(&paths.allowlist, &ip.to_string()).await,
        None => false,
    };

    if target_allowed || ip_allowed {
        ListVerdict::Ok
    } else {
        ListVerdict::AllowlistNotice
    }
}

/// Quick reachability probe on common web ports. Returns `true` as soon
/// as any port accepts a connection.
pub async fn is_reachable(ip: IpAddr, ports: &[u16], probe_timeout: Duration) -> bool {
    for &port in ports {
        let addr = std::net::SocketAddr::new(ip, port);
        if timeout(probe_timeout, TcpStream::connect(addr)).await.is_ok_and(|r| r.is_ok()) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_list(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[tokio::test]
    async fn denylisted_target_is_denied_case_insensitively() {
        let deny = write_list("Example.COM\n");
        let allow = write_list("");
        let paths = ListPaths {
            denylist: deny.path().to_path_buf(),
            allowlist: allow.path().to_path_buf(),
        };
        let verdict = check_lists(&paths, "example.com", None).await;
        assert_eq!(verdict, ListVerdict::Denied);
    }

    #[tokio::test]
    async fn missing_allowlist_file_means_proceed() {
        let deny = write_list("");
        let paths = ListPaths {
            denylist: deny.path().to_path_buf(),
            allowlist: PathBuf::from("/nonexistent/allowlist.txt"),
        };
        let verdict = check_lists(&paths, "example.com", None).await;
        assert_eq!(verdict, ListVerdict::Ok);
    }

    #[tokio::test]
    async fn target_absent_from_existing_allowlist_is_notice() {
        let deny = write_list("");
        let allow = write_list("other.example.com\n");
        let paths = ListPaths {
            denylist: deny.path().to_path_buf(),
            allowlist: allow.path().to_path_buf(),
        };
        let verdict = check_lists(&paths, "example.com", None).await;
        assert_eq!(verdict, ListVerdict::AllowlistNotice);
    }

    #[tokio::test]
    async fn unreachable_loopback_port_is_not_reachable() {
        let reachable = is_reachable(
            "127.0.0.1".parse().unwrap(),
            &[1], // port 1 is almost never bound
            Duration::from_millis(100),
        )
        .await;
        assert!(!reachable);
    }
}
