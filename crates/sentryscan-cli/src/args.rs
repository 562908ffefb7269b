//! CLI argument parsing.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// SentryScan - concurrent, priority-tiered port scanner with live
/// enrichment and streaming results.
#[derive(Parser, Debug)]
#[command(name = "sentryscan", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP/WebSocket/SSE server.
    Serve {
        /// Address to bind, e.g. 0.0.0.0:8080.
        #[arg(long, default_value = "127.0.0.1:8080")]
        listen: SocketAddr,

        /// Path to a TOML config file; falls back to defaults + env vars.
        #[arg(long)]
        config: Option<PathBuf>,

        /// SQLite database path; omit to use an in-memory store.
        #[arg(long)]
        database: Option<PathBuf>,

        /// Newline-delimited denylist file.
        #[arg(long, default_value = "denylist.txt")]
        denylist: PathBuf,

        /// Newline-delimited allowlist file.
        #[arg(long, default_value = "allowlist.txt")]
        allowlist: PathBuf,

        /// Bearer token required on `/scan*` routes; unset disables auth.
        #[arg(long, env = "SENTRYSCAN_API_KEY")]
        api_key: Option<String>,

        /// Shared secret required on `/ws/command`; unset refuses all WS
        /// connections (spec: no token configured means no WS access).
        #[arg(long, env = "SENTRYSCAN_WS_TOKEN")]
        ws_token: Option<String>,

        /// Task retention window, in days, enforced once at startup.
        #[arg(long, default_value_t = 30)]
        retention_days: i64,
    },

    /// Submit a scan to a running server and wait for the result.
    Scan {
        /// Server base URL.
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server: String,

        /// API key, if the server requires one.
        #[arg(long, env = "SENTRYSCAN_API_KEY")]
        api_key: Option<String>,

        /// Target host or IP.
        target: String,

        /// Port set: comma-separated singletons and/or `N-M` ranges.
        ports: String,

        /// Proceed even if the pre-scan reachability probe fails.
        #[arg(long)]
        force: bool,

        /// Poll interval, in milliseconds, while waiting for completion.
        #[arg(long, default_value_t = 500)]
        poll_interval_ms: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults() {
        let cli = Cli::parse_from(["sentryscan", "serve"]);
        match cli.command {
            Command::Serve {
                listen,
                config,
                database,
                denylist,
                allowlist,
                retention_days,
                ..
            } => {
                assert_eq!(listen, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
                assert!(config.is_none());
                assert!(database.is_none());
                assert_eq!(denylist, PathBuf::from("denylist.txt"));
                assert_eq!(allowlist, PathBuf::from("allowlist.txt"));
                assert_eq!(retention_days, 30);
            }
            _ => panic!("expected Serve"),
        }
    }

    #[test]
    fn serve_accepts_overrides() {
        let cli = Cli::parse_from([
            "sentryscan",
            "serve",
            "--listen",
            "0.0.0.0:9000",
            "--database",
            "scans.db",
            "--retention-days",
            "7",
        ]);
        match cli.command {
            Command::Serve {
                listen,
                database,
                retention_days,
                ..
            } => {
                assert_eq!(listen, "0.0.0.0:9000".parse::<SocketAddr>().unwrap());
                assert_eq!(database, Some(PathBuf::from("scans.db")));
                assert_eq!(retention_days, 7);
            }
            _ => panic!("expected Serve"),
        }
    }

    #[test]
    fn scan_requires_target_and_ports() {
        let cli = Cli::parse_from(["sentryscan", "scan", "example.com", "1-1024"]);
        match cli.command {
            Command::Scan {
                server,
                target,
                ports,
                force,
                poll_interval_ms,
                ..
            } => {
                assert_eq!(server, "http://127.0.0.1:8080");
                assert_eq!(target, "example.com");
                assert_eq!(ports, "1-1024");
                assert!(!force);
                assert_eq!(poll_interval_ms, 500);
            }
            _ => panic!("expected Scan"),
        }
    }

    #[test]
    fn scan_force_flag() {
        let cli = Cli::parse_from(["sentryscan", "scan", "--force", "example.com", "80"]);
        match cli.command {
            Command::Scan { force, .. } => assert!(force),
            _ => panic!("expected Scan"),
        }
    }

    #[test]
    fn missing_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["sentryscan"]).is_err());
    }
}
