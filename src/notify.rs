//! Notification Module
//!
//! Sends pipeline and attestation updates to Telegram/Slack/Discord,
//! selected by environment variables. Falls back to stdout when no
//! channel is configured.

use crate::analyzer::AnalysisStats;
use crate::types::Session;
use anyhow::Result;
use std::env;

pub fn send_notifications(msg: &str) -> Result<()> {
    let telegram_token = env::var("TELEGRAM_BOT_TOKEN").ok();
    let telegram_chat = env::var("TELEGRAM_CHAT_ID").ok();
    let slack_webhook = env::var("SLACK_WEBHOOK_URL").ok();
    let discord_webhook = env::var("DISCORD_WEBHOOK_URL").ok();

    let client = reqwest::blocking::Client::new();
    let mut sent = false;

    if let (Some(token), Some(chat_id)) = (telegram_token, telegram_chat) {
        send_telegram(&client, &token, &chat_id, msg)?;
        sent = true;
    }

    if let Some(webhook) = slack_webhook {
        send_slack(&client, &webhook, msg)?;
        sent = true;
    }

    if let Some(webhook) = discord_webhook {
        send_discord(&client, &webhook, msg)?;
        sent = true;
    }

    if !sent {
        println!("No notification channels configured. Message:\n{}", msg);
    }

    Ok(())
}

/// Summary line for a finished analysis run
pub fn format_pipeline_summary(stats: &AnalysisStats, new_providers: usize) -> String {
    format!(
        "[ProviderScout] Analyzed {} flows: {} candidates ({} critical, {} high). Built {} new provider(s).",
        stats.total_flows, stats.candidates, stats.critical, stats.high, new_providers
    )
}

/// One-line status update for an attestation session
pub fn format_session_update(session: &Session) -> String {
    let task = session.attestor_task_id.as_deref().unwrap_or("-");
    match &session.error {
        Some(error) => format!(
            "[ProviderScout] Session {} (provider {}, task {}) -> {}: {}",
            session.id, session.provider_id, task, session.status, error
        ),
        None => format!(
            "[ProviderScout] Session {} (provider {}, task {}) -> {}",
            session.id, session.provider_id, task, session.status
        ),
    }
}

fn send_telegram(client: &reqwest::blocking::Client, token: &str, chat_id: &str, text: &str) -> Result<()> {
    let url = format!("https://api.telegram.org/bot{}/sendMessage", token);
    client
        .post(&url)
        .form(&[("chat_id", chat_id), ("text", text)])
        .send()?;
    Ok(())
}

fn send_slack(client: &reqwest::blocking::Client, webhook_url: &str, text: &str) -> Result<()> {
    client
        .post(webhook_url)
        .json(&serde_json::json!({"text": text}))
        .send()?;
    Ok(())
}

fn send_discord(client: &reqwest::blocking::Client, webhook_url: &str, text: &str) -> Result<()> {
    client
        .post(webhook_url)
        .json(&serde_json::json!({"content": text}))
        .send()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionStatus;

    #[test]
    fn test_format_pipeline_summary() {
        let stats = AnalysisStats {
            total_flows: 42,
            candidates: 5,
            critical: 1,
            high: 2,
            ..Default::default()
        };
        let msg = format_pipeline_summary(&stats, 3);
        assert!(msg.contains("42 flows"));
        assert!(msg.contains("1 critical"));
        assert!(msg.contains("3 new provider(s)"));
    }

    #[test]
    fn test_format_session_update() {
        let session = Session {
            id: "sess-1".to_string(),
            provider_id: "prov-1".to_string(),
            attestor_task_id: Some("task-9".to_string()),
            status: SessionStatus::Failed,
            created_at: String::new(),
            updated_at: String::new(),
            error: Some("attestor timeout".to_string()),
        };
        let msg = format_session_update(&session);
        assert!(msg.contains("task-9"));
        assert!(msg.contains("failed"));
        assert!(msg.contains("attestor timeout"));
    }
}
