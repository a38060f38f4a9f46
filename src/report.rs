//! Report Generation Module
//!
//! Renders tracking/analysis.md, tracking/providers.csv and
//! tracking/verification.md from pipeline output.

use crate::analyzer::{AnalysisStats, EndpointCandidate};
use crate::types::{Confidence, ProviderConfig};
use crate::verify::ProviderVerification;
use chrono::Utc;

/// Generate analysis.md: endpoints grouped by confidence tier
pub fn generate_analysis_md(candidates: &[EndpointCandidate], stats: &AnalysisStats) -> String {
    let mut report = String::from("# Financial API Analysis\n\n");
    report.push_str(&format!(
        "Generated: {}\n\n",
        Utc::now().format("%Y-%m-%d %H:%M UTC")
    ));

    report.push_str("## Summary\n\n");
    report.push_str(&format!("- **Flows analyzed:** {}\n", stats.total_flows));
    report.push_str(&format!(
        "- **Skipped:** {} static, {} trackers, {} empty\n",
        stats.skipped_static, stats.skipped_blocked, stats.skipped_empty
    ));
    report.push_str(&format!("- **Candidates:** {}\n", stats.candidates));
    report.push_str(&format!(
        "- **Tiers:** {} critical / {} high / {} medium / {} low\n",
        stats.critical, stats.high, stats.medium, stats.low
    ));
    report.push_str("\n---\n\n");

    for tier in [
        Confidence::Critical,
        Confidence::High,
        Confidence::Medium,
        Confidence::Low,
    ] {
        let in_tier: Vec<&EndpointCandidate> =
            candidates.iter().filter(|c| c.confidence == tier).collect();

        report.push_str(&format!("## {} ({})\n\n", tier_heading(tier), in_tier.len()));
        if in_tier.is_empty() {
            report.push_str("*No endpoints in this tier*\n\n");
            continue;
        }

        report.push_str("| # | Method | URL | Score | Hits | Categories | Auth |\n");
        report.push_str("|---|--------|-----|-------|------|------------|------|\n");
        for (i, candidate) in in_tier.iter().enumerate() {
            report.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} |\n",
                i + 1,
                candidate.method,
                truncate_str(&candidate.url, 60),
                candidate.score,
                candidate.hit_count,
                candidate.categories.join(", "),
                if candidate.requires_auth { "yes" } else { "no" }
            ));
        }
        report.push('\n');

        // Score breakdown for the actionable tiers only
        if tier >= Confidence::High {
            for candidate in &in_tier {
                report.push_str(&format!("### {}\n\n", truncate_str(&candidate.url, 80)));
                for reason in &candidate.reasons {
                    report.push_str(&format!("- {}\n", reason));
                }
                if !candidate.balance_hits.is_empty() {
                    report.push_str("- Balance evidence: ");
                    let samples: Vec<String> = candidate
                        .balance_hits
                        .iter()
                        .take(3)
                        .map(|h| h.value.clone())
                        .collect();
                    report.push_str(&samples.join(", "));
                    report.push('\n');
                }
                report.push('\n');
            }
        }
        report.push_str("---\n\n");
    }

    report
}

fn tier_heading(tier: Confidence) -> &'static str {
    match tier {
        Confidence::Critical => "Critical",
        Confidence::High => "High",
        Confidence::Medium => "Medium",
        Confidence::Low => "Low",
    }
}

/// Generate providers.csv
pub fn generate_providers_csv(providers: &[ProviderConfig]) -> String {
    let mut csv =
        String::from("id,name,method,url,login_url,confidence,score,matches,redactions,created_at\n");

    for provider in providers {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{}\n",
            provider.id,
            escape_csv(&provider.name),
            provider.method,
            escape_csv(&provider.url),
            escape_csv(&provider.login_url),
            provider.confidence,
            provider.score,
            provider.response_matches.len(),
            provider.response_redactions.len(),
            provider.created_at
        ));
    }

    csv
}

/// Generate verification.md
pub fn generate_verification_md(results: &[ProviderVerification]) -> String {
    let mut report = String::from("# Provider Verification\n\n");
    report.push_str(&format!(
        "Generated: {}\n\n",
        Utc::now().format("%Y-%m-%d %H:%M UTC")
    ));

    let ok_count = results.iter().filter(|r| r.ok).count();
    report.push_str(&format!(
        "{} of {} providers verified against their live endpoints.\n\n",
        ok_count,
        results.len()
    ));

    report.push_str("| Provider | Status | HTTP | Matched | Failed |\n");
    report.push_str("|----------|--------|------|---------|--------|\n");
    for result in results {
        report.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            result.provider_id,
            if result.ok { "ok" } else { "FAILED" },
            result
                .http_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
            result.matched.len(),
            result.failed.len()
        ));
    }
    report.push('\n');

    let failures: Vec<&ProviderVerification> = results.iter().filter(|r| !r.ok).collect();
    if !failures.is_empty() {
        report.push_str("## Failures\n\n");
        for result in failures {
            report.push_str(&format!("### {}\n\n", result.provider_id));
            report.push_str(&format!("- URL: {}\n", result.url));
            if let Some(error) = &result.error {
                report.push_str(&format!("- Error: {}\n", error));
            }
            for value in &result.failed {
                report.push_str(&format!("- No match: `{}`\n", truncate_str(value, 60)));
            }
            report.push('\n');
        }
    }

    report
}

/// Helper to truncate strings for table display (Unicode-safe)
fn truncate_str(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count > max_chars {
        let truncated: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", truncated)
    } else {
        s.to_string()
    }
}

/// Helper to escape CSV fields
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
