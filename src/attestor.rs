//! Attestor Client Module
//!
//! Format-conversion shim in front of the external attestor-core service.
//! Two transports:
//! - HTTP: POST tasks to ATTESTOR_URL and poll them
//! - Subprocess: spawn `node $ATTESTOR_SCRIPT create-claim --json <payload>`
//!
//! Proof generation itself happens entirely on the other side; this module
//! only converts formats and maps task states onto SessionStatus.

use crate::types::{ProviderConfig, SessionStatus};
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::env;
use std::process::Command;
use std::time::Duration;

/// Maximum number of retries for transient HTTP errors
const MAX_RETRIES: u32 = 2;

/// Base delay for exponential backoff (milliseconds)
const BASE_BACKOFF_MS: u64 = 1000;

/// Request timeout for attestor calls
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// How the attestor is reached
#[derive(Debug, Clone)]
pub enum AttestorMode {
    Http { base_url: String },
    Subprocess { node: String, script: String },
}

/// Task handle returned by the attestor
#[derive(Debug, Clone)]
pub struct AttestorTask {
    pub task_id: String,
    pub status: SessionStatus,
    pub detail: Option<String>,
}

/// Pick the transport from the environment
///
/// ATTESTOR_URL wins over ATTESTOR_SCRIPT; ATTESTOR_NODE overrides the
/// node binary (default "node").
pub fn mode_from_env() -> Option<AttestorMode> {
    if let Ok(base_url) = env::var("ATTESTOR_URL") {
        if !base_url.is_empty() {
            return Some(AttestorMode::Http {
                base_url: base_url.trim_end_matches('/').to_string(),
            });
        }
    }
    if let Ok(script) = env::var("ATTESTOR_SCRIPT") {
        if !script.is_empty() {
            return Some(AttestorMode::Subprocess {
                node: env::var("ATTESTOR_NODE").unwrap_or_else(|_| "node".to_string()),
                script,
            });
        }
    }
    None
}

pub struct AttestorClient {
    mode: AttestorMode,
    client: reqwest::Client,
}

impl AttestorClient {
    pub fn new(mode: AttestorMode) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { mode, client }
    }

    /// Submit a provider for attestation
    ///
    /// HTTP mode returns a task to poll; subprocess mode blocks until the
    /// claim either completes or fails.
    pub async fn submit(&self, provider: &ProviderConfig, params: &Value) -> Result<AttestorTask> {
        let payload = serde_json::json!({
            "provider": provider,
            "params": params,
        });

        match &self.mode {
            AttestorMode::Http { base_url } => {
                let url = format!("{}/tasks", base_url);
                let body = self.post_with_retry(&url, &payload).await?;
                Ok(parse_task(&body, None))
            }
            AttestorMode::Subprocess { node, script } => {
                let node = node.clone();
                let script = script.clone();
                let payload_str = serde_json::to_string(&payload)?;
                let output = tokio::task::spawn_blocking(move || {
                    run_node_command(&node, &script, "create-claim", &payload_str)
                })
                .await
                .map_err(|e| anyhow::anyhow!("attestor subprocess task join error: {}", e))??;
                Ok(parse_task(&output, None))
            }
        }
    }

    /// Poll a previously submitted HTTP task
    pub async fn poll(&self, task_id: &str) -> Result<AttestorTask> {
        match &self.mode {
            AttestorMode::Http { base_url } => {
                let url = format!("{}/tasks/{}", base_url, task_id);
                let response = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .with_context(|| format!("Failed to poll attestor task {}", task_id))?;
                if !response.status().is_success() {
                    bail!("attestor poll failed with status {}", response.status());
                }
                let body: Value = response.json().await.context("Failed to parse attestor poll response")?;
                Ok(parse_task(&body, Some(task_id)))
            }
            AttestorMode::Subprocess { .. } => {
                bail!("subprocess attestor tasks complete synchronously; nothing to poll")
            }
        }
    }

    /// POST with exponential backoff on transient failures
    async fn post_with_retry(&self, url: &str, payload: &Value) -> Result<Value> {
        let mut attempt = 0;
        loop {
            let result = self.client.post(url).json(payload).send().await;
            match result {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<Value>()
                        .await
                        .context("Failed to parse attestor response");
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let transient = status == 408 || status == 429 || status >= 500;
                    if !transient || attempt >= MAX_RETRIES {
                        bail!("attestor request failed with status {}", status);
                    }
                }
                Err(e) => {
                    if attempt >= MAX_RETRIES {
                        return Err(e).context("attestor request failed");
                    }
                }
            }
            let backoff = BASE_BACKOFF_MS * 2u64.pow(attempt);
            tokio::time::sleep(Duration::from_millis(backoff)).await;
            attempt += 1;
        }
    }
}

/// Spawn the attestor CLI and parse the last JSON line of its stdout
fn run_node_command(node: &str, script: &str, subcommand: &str, payload: &str) -> Result<Value> {
    let output = Command::new(node)
        .arg(script)
        .arg(subcommand)
        .arg("--json")
        .arg(payload)
        .output()
        .with_context(|| format!("Failed to spawn attestor subprocess {} {}", node, script))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "attestor subprocess exited with {}: {}",
            output.status,
            stderr.trim()
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .rev()
        .find_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
        .context("attestor subprocess produced no JSON output")
}

/// Pull the task id and status out of an attestor response, leniently
fn parse_task(body: &Value, fallback_id: Option<&str>) -> AttestorTask {
    let task_id = body
        .get("taskId")
        .or_else(|| body.get("task_id"))
        .or_else(|| body.get("id"))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .or_else(|| fallback_id.map(|s| s.to_string()))
        .unwrap_or_default();

    let status = body
        .get("status")
        .or_else(|| body.get("state"))
        .and_then(|v| v.as_str())
        .map(map_status)
        .unwrap_or_else(|| {
            // A claim/proof object without a status field means the work is done
            if body.get("claim").is_some() || body.get("proof").is_some() {
                SessionStatus::Completed
            } else {
                SessionStatus::Pending
            }
        });

    let detail = body
        .get("error")
        .or_else(|| body.get("message"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    AttestorTask {
        task_id,
        status,
        detail,
    }
}

/// Map attestor task states onto the 4-value session status
pub fn map_status(s: &str) -> SessionStatus {
    match s.to_lowercase().as_str() {
        "pending" | "queued" | "created" | "accepted" => SessionStatus::Pending,
        "completed" | "done" | "success" | "proof_generated" => SessionStatus::Completed,
        "failed" | "error" | "rejected" | "timeout" => SessionStatus::Failed,
        _ => SessionStatus::Running,
    }
}
