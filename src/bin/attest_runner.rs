//! Attestation Runner Binary
//!
//! Drives the external attestor for every built provider:
//! - creates a pending session per provider without one
//! - submits each pending session and follows the task to a terminal state
//! - records every step in sessions.json and attestor_log.jsonl

use anyhow::Result;
use provider_scout::types::SessionStatus;
use provider_scout::{attestor, notify, session, storage};
use std::collections::HashSet;
use std::time::Duration;

/// Delay between task polls
const POLL_INTERVAL_SECS: u64 = 5;

/// Poll budget per task before giving up
const MAX_POLLS: u32 = 24;

#[tokio::main]
async fn main() -> Result<()> {
    let root = std::env::var("ROOT").unwrap_or_else(|_| ".".to_string());

    let mode = match attestor::mode_from_env() {
        Some(mode) => mode,
        None => {
            eprintln!("No attestor configured. Set ATTESTOR_URL or ATTESTOR_SCRIPT.");
            std::process::exit(2);
        }
    };
    let client = attestor::AttestorClient::new(mode);

    let providers = storage::load_providers(&root)?;
    if providers.providers.is_empty() {
        println!("No providers built yet. Run provider_scout first.");
        return Ok(());
    }

    let mut sessions = session::load_sessions(&root)?;

    // Every provider gets a session
    let covered: HashSet<String> = sessions.sessions.iter().map(|s| s.provider_id.clone()).collect();
    for provider in &providers.providers {
        if !covered.contains(&provider.id) {
            let id = session::create_session(&mut sessions, &provider.id);
            println!("Created session {} for provider {}", id, provider.id);
        }
    }
    session::save_sessions(&root, &mut sessions)?;

    for pending in session::pending_sessions(&sessions) {
        let provider = match providers.providers.iter().find(|p| p.id == pending.provider_id) {
            Some(provider) => provider,
            None => {
                session::update_status(
                    &mut sessions,
                    &pending.id,
                    SessionStatus::Failed,
                    Some("provider no longer exists".to_string()),
                );
                session::save_sessions(&root, &mut sessions)?;
                continue;
            }
        };

        println!("Submitting provider {} (session {})", provider.id, pending.id);
        session::update_status(&mut sessions, &pending.id, SessionStatus::Running, None);
        session::save_sessions(&root, &mut sessions)?;
        session::append_log(&root, &session::log_entry(&pending.id, &provider.id, "submitted", None))?;

        let params = serde_json::json!({});
        let final_status = match client.submit(provider, &params).await {
            Ok(task) => {
                if !task.task_id.is_empty() {
                    session::set_task_id(&mut sessions, &pending.id, &task.task_id);
                }

                let mut status = task.status;
                let mut polls = 0;
                while matches!(status, SessionStatus::Pending | SessionStatus::Running)
                    && !task.task_id.is_empty()
                    && polls < MAX_POLLS
                {
                    tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;
                    match client.poll(&task.task_id).await {
                        Ok(update) => status = update.status,
                        Err(e) => eprintln!("Poll failed for task {}: {}", task.task_id, e),
                    }
                    polls += 1;
                }

                if matches!(status, SessionStatus::Pending | SessionStatus::Running) {
                    session::update_status(
                        &mut sessions,
                        &pending.id,
                        SessionStatus::Failed,
                        Some("attestor task did not reach a terminal state".to_string()),
                    );
                    SessionStatus::Failed
                } else {
                    session::update_status(&mut sessions, &pending.id, status, None);
                    status
                }
            }
            Err(e) => {
                session::update_status(&mut sessions, &pending.id, SessionStatus::Failed, Some(e.to_string()));
                SessionStatus::Failed
            }
        };
        session::save_sessions(&root, &mut sessions)?;
        session::append_log(
            &root,
            &session::log_entry(&pending.id, &provider.id, final_status.as_str(), None),
        )?;

        if let Some(updated) = sessions.sessions.iter().find(|s| s.id == pending.id) {
            let msg = notify::format_session_update(updated);
            // Notification senders use the blocking client
            tokio::task::spawn_blocking(move || notify::send_notifications(&msg))
                .await
                .unwrap_or_else(|e| Err(anyhow::anyhow!("notify task join error: {}", e)))?;
        }
    }

    let completed = sessions
        .sessions
        .iter()
        .filter(|s| s.status == SessionStatus::Completed)
        .count();
    println!(
        "Attestation run complete: {}/{} session(s) completed.",
        completed,
        sessions.sessions.len()
    );

    Ok(())
}
