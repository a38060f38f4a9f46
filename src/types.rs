use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single intercepted HTTP exchange from a capture file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedFlow {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub request_headers: Vec<(String, String)>,
    #[serde(default)]
    pub response_headers: Vec<(String, String)>,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub request_body: String,
    #[serde(default)]
    pub response_body: String,
    #[serde(default)]
    pub started_at: String,
}

impl CapturedFlow {
    /// Case-insensitive request header lookup
    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.request_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.response_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Confidence tier for a scored endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
    Critical,
}

impl Confidence {
    pub fn from_score(score: i32, thresholds: &TierThresholds) -> Self {
        if score >= thresholds.critical {
            Confidence::Critical
        } else if score >= thresholds.high {
            Confidence::High
        } else if score >= thresholds.medium {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
            Confidence::Critical => "critical",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A regex/contains check the attestor runs against the response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMatch {
    #[serde(rename = "type")]
    pub match_type: String,
    pub value: String,
    #[serde(default)]
    pub invert: bool,
}

/// Region of the response revealed to the attestor (everything else is redacted)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRedaction {
    #[serde(rename = "jsonPath", default, skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,
    #[serde(rename = "xPath", default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
}

/// Provider configuration consumed by the external attestor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub id: String,
    pub name: String,
    pub url: String,
    pub url_type: String,
    pub method: String,
    pub login_url: String,
    pub response_matches: Vec<ResponseMatch>,
    pub response_redactions: Vec<ResponseRedaction>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub confidence: Confidence,
    pub score: i32,
    pub created_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProvidersFile {
    pub providers: Vec<ProviderConfig>,
}

/// Coarse attestation session state, updated via file overwrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Correlates a built provider with an attestor task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub provider_id: String,
    #[serde(default)]
    pub attestor_task_id: Option<String>,
    pub status: SessionStatus,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionsFile {
    pub last_updated: String,
    pub sessions: Vec<Session>,
}

/// One line of tracking/attestor_log.jsonl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestorLogEntry {
    pub timestamp: String,
    pub session_id: String,
    pub provider_id: String,
    pub event: String,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Integer bonuses applied by the analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub json_content_type: i32,
    pub html_content_type: i32,
    pub api_path: i32,
    pub url_category: i32,
    pub body_category: i32,
    pub cross_category: i32,
    pub balance_evidence: i32,
    pub balance_field: i32,
    pub authenticated: i32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            json_content_type: 15,
            html_content_type: 5,
            api_path: 10,
            url_category: 10,
            body_category: 10,
            cross_category: 40,
            balance_evidence: 25,
            balance_field: 20,
            authenticated: 10,
        }
    }
}

/// Score cut-offs for the four confidence tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierThresholds {
    pub critical: i32,
    pub high: i32,
    pub medium: i32,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            critical: 90,
            high: 60,
            medium: 30,
        }
    }
}

/// Analyzer configuration loaded from Config/scoring.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: ScoreWeights,
    #[serde(default)]
    pub thresholds: TierThresholds,
    #[serde(default)]
    pub extra_balance_keywords: Vec<String>,
    #[serde(default)]
    pub extra_blocked_domains: Vec<String>,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_max_body_bytes() -> usize {
    262_144
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            thresholds: TierThresholds::default(),
            extra_balance_keywords: vec![],
            extra_blocked_domains: vec![],
            max_body_bytes: default_max_body_bytes(),
        }
    }
}
