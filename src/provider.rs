//! Provider Builder Module
//!
//! Turns a scored endpoint plus its synthesized extraction rules into the
//! provider configuration object the external attestor consumes.

use crate::analyzer::EndpointCandidate;
use crate::balance_rules::{attestor_regex_to_rust, BalanceKind, ExtractionRule};
use crate::types::{CapturedFlow, ProviderConfig, ResponseMatch, ResponseRedaction};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Request headers safe to replay; everything else is dropped so captured
/// credentials never end up in a provider file
const HEADER_ALLOWLIST: &[&str] = &[
    "accept",
    "accept-language",
    "content-type",
    "user-agent",
    "referer",
    "origin",
    "x-requested-with",
];

/// Provider id: first 16 hex chars of SHA-256 over method + url
pub fn provider_id(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

/// Keep only allowlisted request headers
pub fn sanitize_headers(headers: &[(String, String)]) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|(k, _)| HEADER_ALLOWLIST.contains(&k.to_lowercase().as_str()))
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect()
}

/// Provider display name from the endpoint's domain and categories
fn derive_name(candidate: &EndpointCandidate) -> String {
    let host = candidate
        .domain
        .trim_start_matches("www.")
        .split('.')
        .next()
        .unwrap_or("provider")
        .to_string();
    let category = candidate
        .categories
        .first()
        .map(|c| c.as_str())
        .unwrap_or("data");
    format!("{}-{}", host, category)
}

/// Build a provider config from a candidate and its extraction rules
pub fn build_provider(
    candidate: &EndpointCandidate,
    flow: &CapturedFlow,
    rules: &[ExtractionRule],
    login_url: Option<&str>,
) -> Result<ProviderConfig> {
    if rules.is_empty() {
        bail!("no extraction rules for {}", candidate.url);
    }

    let mut response_matches = Vec::new();
    let mut response_redactions = Vec::new();

    for rule in rules {
        response_matches.push(ResponseMatch {
            match_type: "regex".to_string(),
            value: rule.pattern.clone(),
            invert: false,
        });
        response_redactions.push(ResponseRedaction {
            json_path: rule.json_path.clone(),
            xpath: None,
            regex: if rule.json_path.is_some() {
                None
            } else {
                Some(rule.pattern.clone())
            },
        });
    }

    // Field names stay stable across balance changes; add a structural
    // contains check on the strongest one
    if let Some(field) = candidate
        .balance_hits
        .iter()
        .find(|h| h.kind == BalanceKind::JsonField)
        .and_then(|h| h.field.as_deref())
    {
        response_matches.push(ResponseMatch {
            match_type: "contains".to_string(),
            value: format!("\"{}\"", field),
            invert: false,
        });
    }

    let provider = ProviderConfig {
        id: provider_id(&candidate.method, &candidate.url),
        name: derive_name(candidate),
        url: candidate.url.clone(),
        url_type: "CONSTANT".to_string(),
        method: candidate.method.clone(),
        login_url: login_url.unwrap_or(&candidate.url).to_string(),
        response_matches,
        response_redactions,
        headers: sanitize_headers(&flow.request_headers),
        confidence: candidate.confidence,
        score: candidate.score,
        created_at: Utc::now().to_rfc3339(),
    };

    validate_provider(&provider)?;
    Ok(provider)
}

/// Reject malformed providers before they reach disk or the attestor
pub fn validate_provider(provider: &ProviderConfig) -> Result<()> {
    if !provider.url.starts_with("https://") {
        bail!("provider url must be https: {}", provider.url);
    }
    let host = crate::capture::domain_of(&provider.url);
    if host.is_empty() {
        bail!("provider url has no host: {}", provider.url);
    }
    if provider.response_matches.is_empty() {
        bail!("provider {} has no response matches", provider.id);
    }

    for m in &provider.response_matches {
        match m.match_type.as_str() {
            "regex" => {
                Regex::new(&attestor_regex_to_rust(&m.value))
                    .with_context(|| format!("invalid responseMatch regex: {}", m.value))?;
            }
            "contains" => {
                if m.value.is_empty() {
                    bail!("empty contains match in provider {}", provider.id);
                }
            }
            other => bail!("unknown match type '{}' in provider {}", other, provider.id),
        }
    }

    for r in &provider.response_redactions {
        if let Some(pattern) = &r.regex {
            Regex::new(&attestor_regex_to_rust(pattern))
                .with_context(|| format!("invalid redaction regex: {}", pattern))?;
        }
        if r.json_path.is_none() && r.xpath.is_none() && r.regex.is_none() {
            bail!("empty redaction in provider {}", provider.id);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance_rules::BalanceHit;
    use crate::types::Confidence;

    fn create_test_candidate() -> EndpointCandidate {
        EndpointCandidate {
            url: "https://bank.example.com/api/v1/balance".to_string(),
            method: "GET".to_string(),
            domain: "bank.example.com".to_string(),
            content_type: "application/json".to_string(),
            score: 120,
            confidence: Confidence::Critical,
            reasons: vec![],
            categories: vec!["balance".to_string()],
            balance_hits: vec![BalanceHit {
                raw: "\"availableBalance\":\"2540.75\"".to_string(),
                value: "2540.75".to_string(),
                currency: None,
                field: Some("availableBalance".to_string()),
                kind: BalanceKind::JsonField,
            }],
            requires_auth: true,
            hit_count: 1,
            flow_index: 0,
        }
    }

    fn create_test_flow() -> CapturedFlow {
        CapturedFlow {
            url: "https://bank.example.com/api/v1/balance".to_string(),
            method: "GET".to_string(),
            status: 200,
            request_headers: vec![
                ("Cookie".to_string(), "sid=secret".to_string()),
                ("Authorization".to_string(), "Bearer tok".to_string()),
                ("Accept".to_string(), "application/json".to_string()),
                ("User-Agent".to_string(), "Mozilla/5.0".to_string()),
            ],
            response_headers: vec![],
            content_type: "application/json".to_string(),
            request_body: String::new(),
            response_body: r#"{"availableBalance":"2540.75"}"#.to_string(),
            started_at: String::new(),
        }
    }

    fn create_test_rule() -> ExtractionRule {
        ExtractionRule {
            name: "availableBalance".to_string(),
            pattern: r#""availableBalance"\s*:\s*"?(?<availableBalance>-?[\d.,]+)"?"#.to_string(),
            json_path: Some("$.availableBalance".to_string()),
            sample: "2540.75".to_string(),
        }
    }

    #[test]
    fn test_provider_id_is_stable() {
        let a = provider_id("GET", "https://bank.example.com/api/v1/balance");
        let b = provider_id("GET", "https://bank.example.com/api/v1/balance");
        let c = provider_id("POST", "https://bank.example.com/api/v1/balance");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_sanitize_headers_drops_credentials() {
        let flow = create_test_flow();
        let headers = sanitize_headers(&flow.request_headers);
        assert!(headers.contains_key("accept"));
        assert!(headers.contains_key("user-agent"));
        assert!(!headers.contains_key("cookie"));
        assert!(!headers.contains_key("authorization"));
    }

    #[test]
    fn test_build_provider() {
        let candidate = create_test_candidate();
        let flow = create_test_flow();
        let rules = vec![create_test_rule()];

        let provider = build_provider(
            &candidate,
            &flow,
            &rules,
            Some("https://bank.example.com/login"),
        )
        .unwrap();

        assert_eq!(provider.name, "bank-balance");
        assert_eq!(provider.login_url, "https://bank.example.com/login");
        // regex match per rule plus the structural contains match
        assert_eq!(provider.response_matches.len(), 2);
        assert!(provider
            .response_matches
            .iter()
            .any(|m| m.match_type == "contains" && m.value == "\"availableBalance\""));
        assert_eq!(provider.response_redactions.len(), 1);
        assert_eq!(
            provider.response_redactions[0].json_path.as_deref(),
            Some("$.availableBalance")
        );
        assert!(!provider.headers.contains_key("cookie"));
    }

    #[test]
    fn test_build_provider_requires_rules() {
        let candidate = create_test_candidate();
        let flow = create_test_flow();
        assert!(build_provider(&candidate, &flow, &[], None).is_err());
    }

    #[test]
    fn test_validate_rejects_http_url() {
        let candidate = create_test_candidate();
        let flow = create_test_flow();
        let rules = vec![create_test_rule()];
        let mut provider = build_provider(&candidate, &flow, &rules, None).unwrap();
        provider.url = "http://bank.example.com/api/v1/balance".to_string();
        assert!(validate_provider(&provider).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_regex() {
        let candidate = create_test_candidate();
        let flow = create_test_flow();
        let rules = vec![create_test_rule()];
        let mut provider = build_provider(&candidate, &flow, &rules, None).unwrap();
        provider.response_matches[0].value = "(?<broken>[".to_string();
        assert!(validate_provider(&provider).is_err());
    }
}
