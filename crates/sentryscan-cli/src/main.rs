//! SentryScan CLI entry point.

use anyhow::Result;
use clap::Parser;
use sentryscan_cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            listen,
            config,
            database,
            denylist,
            allowlist,
            api_key,
            ws_token,
            retention_days,
        } => {
            sentryscan_cli::serve_cmd::run(
                listen,
                config,
                database,
                denylist,
                allowlist,
                api_key,
                ws_token,
                retention_days,
            )
            .await
        }
        Command::Scan {
            server,
            api_key,
            target,
            ports,
            force,
            poll_interval_ms,
        } => {
            sentryscan_cli::scan_cmd::run(
                &server,
                api_key.as_deref(),
                &target,
                &ports,
                force,
                poll_interval_ms,
            )
            .await
        }
    }
}
