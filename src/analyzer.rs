//! Financial API Analyzer
//!
//! Scores captured endpoints for financial API value with hand-tuned
//! integer bonuses, then thresholds the total into a confidence tier.
//! Weights and thresholds come from Config/scoring.yaml when present.

use crate::balance_rules::{self, BalanceHit, BalanceKind};
use crate::capture;
use crate::types::{CapturedFlow, Confidence, ScoringConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Core keyword categories; two or more of these in one response is the
/// strongest signal short of an extracted balance
pub const BALANCE_KEYWORDS: &[&str] = &[
    "balance", "saldo", "available", "funds", "available_balance", "availablebalance",
];

pub const ACCOUNT_KEYWORDS: &[&str] = &[
    "account", "accounts", "acct", "iban", "deposit", "portfolio", "card",
];

pub const TRANSACTION_KEYWORDS: &[&str] = &[
    "transaction", "transactions", "statement", "history", "movements", "activity",
];

/// Path fragments that mark programmatic endpoints
const API_PATH_HINTS: &[&str] = &[
    "/api/", "/rest/", "/v1/", "/v2/", "/v3/", "/graphql", "/services/", "/ajax/", "/json/",
];

/// Trackers and analytics hosts, never worth attesting
const BLOCKED_DOMAIN_FRAGMENTS: &[&str] = &[
    "google-analytics", "googletagmanager", "doubleclick", "facebook", "hotjar",
    "segment.io", "sentry.io", "newrelic", "optimizely", "adservice", "criteo",
    "clarity.ms", "mixpanel",
];

/// A scored endpoint, ready for rule synthesis and provider building
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointCandidate {
    pub url: String,
    pub method: String,
    pub domain: String,
    pub content_type: String,
    pub score: i32,
    pub confidence: Confidence,
    pub reasons: Vec<String>,
    /// Core keyword categories that matched ("balance", "account", "transaction")
    pub categories: Vec<String>,
    pub balance_hits: Vec<BalanceHit>,
    pub requires_auth: bool,
    /// How many captured flows collapsed into this candidate
    pub hit_count: u32,
    /// Index into the flow list for the best-scoring observation
    #[serde(skip)]
    pub flow_index: usize,
}

/// Statistics from one analysis pass
#[derive(Debug, Default)]
pub struct AnalysisStats {
    pub total_flows: usize,
    pub skipped_static: usize,
    pub skipped_blocked: usize,
    pub skipped_empty: usize,
    pub candidates: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Score every flow and collapse duplicates into ranked candidates
pub fn analyze_flows(
    flows: &[CapturedFlow],
    config: &ScoringConfig,
) -> (Vec<EndpointCandidate>, AnalysisStats) {
    let mut stats = AnalysisStats {
        total_flows: flows.len(),
        ..Default::default()
    };

    // Dedup key: method + URL without query
    let mut by_endpoint: HashMap<(String, String), EndpointCandidate> = HashMap::new();

    for (index, flow) in flows.iter().enumerate() {
        match score_flow(flow, index, config) {
            ScoreOutcome::Static => stats.skipped_static += 1,
            ScoreOutcome::Blocked => stats.skipped_blocked += 1,
            ScoreOutcome::Empty => stats.skipped_empty += 1,
            ScoreOutcome::Scored(candidate) => {
                let key = (candidate.method.clone(), capture::url_without_query(&candidate.url));
                match by_endpoint.get_mut(&key) {
                    Some(existing) => {
                        existing.hit_count += 1;
                        if candidate.score > existing.score {
                            let hit_count = existing.hit_count;
                            *existing = candidate;
                            existing.hit_count = hit_count;
                        }
                    }
                    None => {
                        by_endpoint.insert(key, candidate);
                    }
                }
            }
        }
    }

    let mut candidates: Vec<EndpointCandidate> = by_endpoint.into_values().collect();
    candidates.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.url.cmp(&b.url)));

    for candidate in &candidates {
        match candidate.confidence {
            Confidence::Critical => stats.critical += 1,
            Confidence::High => stats.high += 1,
            Confidence::Medium => stats.medium += 1,
            Confidence::Low => stats.low += 1,
        }
    }
    stats.candidates = candidates.len();

    (candidates, stats)
}

enum ScoreOutcome {
    Scored(EndpointCandidate),
    Static,
    Blocked,
    Empty,
}

/// Score a single flow
fn score_flow(flow: &CapturedFlow, flow_index: usize, config: &ScoringConfig) -> ScoreOutcome {
    if capture::is_static_asset(&flow.url) {
        return ScoreOutcome::Static;
    }

    let domain = capture::domain_of(&flow.url);
    let blocked = BLOCKED_DOMAIN_FRAGMENTS
        .iter()
        .any(|fragment| domain.contains(fragment))
        || config
            .extra_blocked_domains
            .iter()
            .any(|fragment| domain.contains(fragment.as_str()));
    if blocked {
        return ScoreOutcome::Blocked;
    }

    if flow.response_body.trim().is_empty() {
        return ScoreOutcome::Empty;
    }

    let weights = &config.weights;
    let mut score = 0;
    let mut reasons = Vec::new();

    // Content type
    let content_type = flow.content_type.to_lowercase();
    if content_type.contains("json") {
        score += weights.json_content_type;
        reasons.push(format!("JSON response (+{})", weights.json_content_type));
    } else if content_type.contains("html") {
        score += weights.html_content_type;
        reasons.push(format!("HTML response (+{})", weights.html_content_type));
    }

    // URL shape
    let path = capture::path_of(&flow.url).to_lowercase();
    if API_PATH_HINTS.iter().any(|hint| path.contains(hint)) {
        score += weights.api_path;
        reasons.push(format!("API-shaped path (+{})", weights.api_path));
    }

    let url_categories = matched_categories(&path, &config.extra_balance_keywords);
    for category in &url_categories {
        score += weights.url_category;
        reasons.push(format!("'{}' keywords in URL (+{})", category, weights.url_category));
    }

    // Body keyword categories
    let body_lower = flow.response_body.to_lowercase();
    let body_categories = matched_categories(&body_lower, &config.extra_balance_keywords);
    for category in &body_categories {
        score += weights.body_category;
        reasons.push(format!("'{}' keywords in body (+{})", category, weights.body_category));
    }

    // Cross-category bonus: two or more of the three core categories
    if body_categories.len() >= 2 {
        score += weights.cross_category;
        reasons.push(format!(
            "{} of 3 keyword categories matched (+{})",
            body_categories.len(),
            weights.cross_category
        ));
    }

    // Extracted balance evidence
    let balance_hits = balance_rules::extract_balances(&flow.response_body, &flow.content_type);
    if !balance_hits.is_empty() {
        score += weights.balance_evidence;
        reasons.push(format!(
            "{} balance-shaped value(s) extracted (+{})",
            balance_hits.len(),
            weights.balance_evidence
        ));
    }
    if balance_hits.iter().any(|h| h.kind == BalanceKind::JsonField) {
        score += weights.balance_field;
        reasons.push(format!("named JSON balance field (+{})", weights.balance_field));
    }

    // Authenticated requests carry the private data worth attesting
    let requires_auth =
        flow.request_header("authorization").is_some() || flow.request_header("cookie").is_some();
    if requires_auth {
        score += weights.authenticated;
        reasons.push(format!("request carried credentials (+{})", weights.authenticated));
    }

    let mut categories = url_categories;
    for category in body_categories {
        if !categories.contains(&category) {
            categories.push(category);
        }
    }

    let confidence = Confidence::from_score(score, &config.thresholds);

    ScoreOutcome::Scored(EndpointCandidate {
        url: flow.url.clone(),
        method: flow.method.clone(),
        domain,
        content_type: flow.content_type.clone(),
        score,
        confidence,
        reasons,
        categories,
        balance_hits,
        requires_auth,
        hit_count: 1,
        flow_index,
    })
}

/// Which of the three core categories appear in the text
fn matched_categories(text: &str, extra_balance_keywords: &[String]) -> Vec<String> {
    let mut matched = Vec::new();
    let balance_matched = contains_any(text, BALANCE_KEYWORDS)
        || extra_balance_keywords.iter().any(|k| text.contains(k.as_str()));
    if balance_matched {
        matched.push("balance".to_string());
    }
    if contains_any(text, ACCOUNT_KEYWORDS) {
        matched.push("account".to_string());
    }
    if contains_any(text, TRANSACTION_KEYWORDS) {
        matched.push("transaction".to_string());
    }
    matched
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_flow(url: &str, content_type: &str, body: &str) -> CapturedFlow {
        CapturedFlow {
            url: url.to_string(),
            method: "GET".to_string(),
            status: 200,
            request_headers: vec![],
            response_headers: vec![],
            content_type: content_type.to_string(),
            request_body: String::new(),
            response_body: body.to_string(),
            started_at: String::new(),
        }
    }

    #[test]
    fn test_balance_api_scores_high() {
        let mut flow = create_test_flow(
            "https://bank.example.com/api/v1/accounts/balance",
            "application/json",
            r#"{"accountId":"1234","availableBalance":"2540.75","transactions":[{"amount":"-12.00"}]}"#,
        );
        flow.request_headers
            .push(("Cookie".to_string(), "sid=abc".to_string()));

        let config = ScoringConfig::default();
        match score_flow(&flow, 0, &config) {
            ScoreOutcome::Scored(candidate) => {
                assert!(candidate.score >= config.thresholds.high, "score {}", candidate.score);
                assert!(candidate.confidence >= Confidence::High);
                assert!(candidate.requires_auth);
                assert!(candidate.categories.contains(&"balance".to_string()));
            }
            _ => panic!("flow should have been scored"),
        }
    }

    #[test]
    fn test_cross_category_bonus() {
        let flow = create_test_flow(
            "https://bank.example.com/data",
            "application/json",
            r#"{"account":"x","balance":"1.00","transactions":[]}"#,
        );
        let config = ScoringConfig::default();
        match score_flow(&flow, 0, &config) {
            ScoreOutcome::Scored(candidate) => {
                assert!(candidate
                    .reasons
                    .iter()
                    .any(|r| r.contains("keyword categories matched")));
                assert!(candidate.categories.len() >= 2);
            }
            _ => panic!("flow should have been scored"),
        }
    }

    #[test]
    fn test_static_assets_are_skipped() {
        let flow = create_test_flow("https://bank.example.com/app.js", "text/javascript", "var x=1");
        assert!(matches!(
            score_flow(&flow, 0, &ScoringConfig::default()),
            ScoreOutcome::Static
        ));
    }

    #[test]
    fn test_analytics_domains_are_blocked() {
        let flow = create_test_flow(
            "https://www.google-analytics.com/collect",
            "application/json",
            r#"{"balance":"1"}"#,
        );
        assert!(matches!(
            score_flow(&flow, 0, &ScoringConfig::default()),
            ScoreOutcome::Blocked
        ));
    }

    #[test]
    fn test_empty_body_is_skipped() {
        let flow = create_test_flow("https://bank.example.com/api/x", "application/json", "  ");
        assert!(matches!(
            score_flow(&flow, 0, &ScoringConfig::default()),
            ScoreOutcome::Empty
        ));
    }

    #[test]
    fn test_marketing_page_scores_low() {
        let flow = create_test_flow(
            "https://bank.example.com/about-us",
            "text/html",
            "<html><body>We are a friendly bank with great rates.</body></html>",
        );
        match score_flow(&flow, 0, &ScoringConfig::default()) {
            ScoreOutcome::Scored(candidate) => {
                assert_eq!(candidate.confidence, Confidence::Low);
            }
            _ => panic!("flow should have been scored"),
        }
    }

    #[test]
    fn test_analyze_flows_dedups_by_endpoint() {
        let body = r#"{"availableBalance":"100.00","account":"1"}"#;
        let flows = vec![
            create_test_flow("https://bank.example.com/api/balance?t=1", "application/json", body),
            create_test_flow("https://bank.example.com/api/balance?t=2", "application/json", body),
            create_test_flow("https://bank.example.com/logo.png", "image/png", "x"),
        ];
        let (candidates, stats) = analyze_flows(&flows, &ScoringConfig::default());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].hit_count, 2);
        assert_eq!(stats.skipped_static, 1);
        assert_eq!(stats.total_flows, 3);
    }

    #[test]
    fn test_candidates_sorted_by_score() {
        let flows = vec![
            create_test_flow(
                "https://bank.example.com/weak",
                "text/html",
                "<p>account info page</p>",
            ),
            create_test_flow(
                "https://bank.example.com/api/v1/balance",
                "application/json",
                r#"{"availableBalance":"2540.75","account":"1234","transactions":[]}"#,
            ),
        ];
        let (candidates, _) = analyze_flows(&flows, &ScoringConfig::default());
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].score >= candidates[1].score);
        assert!(candidates[0].url.ends_with("/api/v1/balance"));
    }
}
