//! `sentryscan scan` — submits a scan to a running server over HTTP and
//! polls until it reaches a terminal state.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Serialize)]
struct SubmitBody<'a> {
    target: &'a str,
    ports: &'a str,
    force: bool,
}

pub async fn run(
    server: &str,
    api_key: Option<&str>,
    target: &str,
    ports: &str,
    force: bool,
    poll_interval_ms: u64,
) -> Result<()> {
    let client = reqwest::Client::new();

    let mut request = client
        .post(format!("{server}/scan"))
        .json(&SubmitBody { target, ports, force });
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }

    let response = request.send().await.context("submitting scan")?;
    if !response.status().is_success() {
        bail!("server rejected scan: {} {}", response.status(), response.text().await.unwrap_or_default());
    }
    let submitted: Value = response.json().await.context("parsing submit response")?;
    let task_id = submitted["task_id"]
        .as_str()
        .context("submit response missing task_id")?
        .to_string();

    println!("submitted task {task_id}");

    loop {
        let mut status_request = client.get(format!("{server}/scan/{task_id}"));
        if let Some(key) = api_key {
            status_request = status_request.bearer_auth(key);
        }
        let status: Value = status_request.send().await.context("polling status")?.json().await?;

        let state = status["state"].as_str().unwrap_or("UNKNOWN");
        match state {
            "SUCCESS" | "FAILURE" => {
                println!("{}", serde_json::to_string_pretty(&status)?);
                break;
            }
            _ => {
                tokio::time::sleep(Duration::from_millis(poll_interval_ms)).await;
            }
        }
    }

    Ok(())
}
