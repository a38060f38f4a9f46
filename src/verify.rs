//! Provider Verification Module
//!
//! Replays built providers against their live endpoints and evaluates
//! every responseMatches entry against the real body.
//!
//! Requests run in bounded batches with a polite delay between batches.

use crate::balance_rules::attestor_regex_to_rust;
use crate::types::ProviderConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay between verification batches (milliseconds)
const BATCH_DELAY_MS: u64 = 500;

/// Result of replaying one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderVerification {
    pub provider_id: String,
    pub url: String,
    pub http_status: Option<u16>,
    /// responseMatches values that matched the live body
    pub matched: Vec<String>,
    /// responseMatches values that did not
    pub failed: Vec<String>,
    pub ok: bool,
    pub error: Option<String>,
    pub checked_at: String,
}

/// Verify a batch of providers against their live endpoints
pub async fn verify_providers(
    providers: &[ProviderConfig],
    max_concurrent: usize,
) -> Vec<ProviderVerification> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(20))
        .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());

    let mut results = Vec::new();

    for chunk in providers.chunks(max_concurrent.max(1)) {
        let mut futures = Vec::new();
        for provider in chunk {
            let client = client.clone();
            futures.push(async move { verify_single(&client, provider).await });
        }

        let batch_results = futures::future::join_all(futures).await;
        results.extend(batch_results);

        if results.len() < providers.len() {
            tokio::time::sleep(Duration::from_millis(BATCH_DELAY_MS)).await;
        }
    }

    results
}

/// Replay one provider and evaluate its matches
async fn verify_single(client: &reqwest::Client, provider: &ProviderConfig) -> ProviderVerification {
    let mut request = match provider.method.as_str() {
        "POST" => client.post(&provider.url),
        _ => client.get(&provider.url),
    };
    for (name, value) in &provider.headers {
        request = request.header(name.as_str(), value.as_str());
    }

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => {
            return ProviderVerification {
                provider_id: provider.id.clone(),
                url: provider.url.clone(),
                http_status: None,
                matched: vec![],
                failed: all_match_values(provider),
                ok: false,
                error: Some(format!("request failed: {}", e)),
                checked_at: chrono::Utc::now().to_rfc3339(),
            };
        }
    };

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    let (matched, failed) = evaluate_matches(provider, &body);
    let ok = (200..300).contains(&status) && failed.is_empty() && !matched.is_empty();

    ProviderVerification {
        provider_id: provider.id.clone(),
        url: provider.url.clone(),
        http_status: Some(status),
        matched,
        failed,
        ok,
        error: None,
        checked_at: chrono::Utc::now().to_rfc3339(),
    }
}

/// Evaluate a provider's responseMatches against a body
pub fn evaluate_matches(provider: &ProviderConfig, body: &str) -> (Vec<String>, Vec<String>) {
    let mut matched = Vec::new();
    let mut failed = Vec::new();

    for m in &provider.response_matches {
        let hit = match m.match_type.as_str() {
            "regex" => Regex::new(&attestor_regex_to_rust(&m.value))
                .map(|re| re.is_match(body))
                .unwrap_or(false),
            "contains" => body.contains(&m.value),
            _ => false,
        };
        let passed = hit != m.invert;
        if passed {
            matched.push(m.value.clone());
        } else {
            failed.push(m.value.clone());
        }
    }

    (matched, failed)
}

fn all_match_values(provider: &ProviderConfig) -> Vec<String> {
    provider
        .response_matches
        .iter()
        .map(|m| m.value.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Confidence, ResponseMatch};
    use std::collections::HashMap;

    fn create_test_provider(matches: Vec<ResponseMatch>) -> ProviderConfig {
        ProviderConfig {
            id: "abc".to_string(),
            name: "bank-balance".to_string(),
            url: "https://bank.example.com/api/balance".to_string(),
            url_type: "CONSTANT".to_string(),
            method: "GET".to_string(),
            login_url: "https://bank.example.com/login".to_string(),
            response_matches: matches,
            response_redactions: vec![],
            headers: HashMap::new(),
            confidence: Confidence::High,
            score: 75,
            created_at: String::new(),
        }
    }

    #[test]
    fn test_evaluate_regex_match() {
        let provider = create_test_provider(vec![ResponseMatch {
            match_type: "regex".to_string(),
            value: r#""balance"\s*:\s*"(?<bal>[\d.]+)""#.to_string(),
            invert: false,
        }]);
        let (matched, failed) = evaluate_matches(&provider, r#"{"balance": "123.45"}"#);
        assert_eq!(matched.len(), 1);
        assert!(failed.is_empty());
    }

    #[test]
    fn test_evaluate_contains_match() {
        let provider = create_test_provider(vec![ResponseMatch {
            match_type: "contains".to_string(),
            value: "\"availableBalance\"".to_string(),
            invert: false,
        }]);
        let (matched, failed) = evaluate_matches(&provider, r#"{"availableBalance":"1"}"#);
        assert_eq!(matched.len(), 1);
        assert!(failed.is_empty());

        let (matched, failed) = evaluate_matches(&provider, r#"{"other":"1"}"#);
        assert!(matched.is_empty());
        assert_eq!(failed.len(), 1);
    }

    #[test]
    fn test_evaluate_inverted_match() {
        let provider = create_test_provider(vec![ResponseMatch {
            match_type: "contains".to_string(),
            value: "session expired".to_string(),
            invert: true,
        }]);
        let (matched, failed) = evaluate_matches(&provider, r#"{"balance":"1"}"#);
        assert_eq!(matched.len(), 1);
        assert!(failed.is_empty());

        let (_, failed) = evaluate_matches(&provider, "session expired, log in again");
        assert_eq!(failed.len(), 1);
    }

    #[test]
    fn test_evaluate_broken_regex_fails_closed() {
        let provider = create_test_provider(vec![ResponseMatch {
            match_type: "regex".to_string(),
            value: "(?<broken>[".to_string(),
            invert: false,
        }]);
        let (matched, failed) = evaluate_matches(&provider, "anything");
        assert!(matched.is_empty());
        assert_eq!(failed.len(), 1);
    }
}
