use anyhow::Result;
use provider_scout::types::Confidence;
use provider_scout::{analyzer, balance_rules, capture, endpoint_state, login, notify, provider, report, storage};
use std::collections::HashSet;
use std::path::PathBuf;

fn main() -> Result<()> {
    let root = std::env::var("ROOT").unwrap_or_else(|_| ".".to_string());
    let capture_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&root).join("tracking").join("captured_flows.jsonl"));

    // Load scoring config (defaults when Config/scoring.yaml is absent)
    let config = storage::load_scoring_config(&root)?;

    // Ingest the capture
    let (flows, ingest) = capture::load_flows(&capture_path, config.max_body_bytes)?;
    println!(
        "Loaded {} flow(s) from {} ({} skipped)",
        flows.len(),
        capture_path.display(),
        ingest.skipped_lines
    );

    // Score endpoints
    let (candidates, stats) = analyzer::analyze_flows(&flows, &config);
    println!(
        "Scored {} candidate endpoint(s): {} critical, {} high, {} medium, {} low",
        stats.candidates, stats.critical, stats.high, stats.medium, stats.low
    );

    let login_url = login::pick_login_url(&flows);
    if let Some(url) = &login_url {
        println!("Login page: {}", url);
    }

    // Build providers for everything medium confidence and up
    let mut providers_file = storage::load_providers(&root)?;
    let existing: HashSet<String> = providers_file.providers.iter().map(|p| p.id.clone()).collect();
    let state = endpoint_state::EndpointStateStore::new(&root)?;

    let mut new_count = 0;
    for candidate in candidates.iter().filter(|c| c.confidence >= Confidence::Medium) {
        let flow = &flows[candidate.flow_index];

        state.record_observation(
            &candidate.url,
            &candidate.method,
            &flow.response_body,
            candidate.score,
            candidate.confidence.as_str(),
        )?;

        let rules = balance_rules::synthesize_rules(
            &flow.response_body,
            &candidate.content_type,
            &candidate.balance_hits,
        );
        if rules.is_empty() {
            println!("No extraction rules for {}, skipping", candidate.url);
            continue;
        }

        match provider::build_provider(candidate, flow, &rules, login_url.as_deref()) {
            Ok(built) => {
                if existing.contains(&built.id) {
                    continue;
                }
                println!("Built provider {} ({})", built.id, built.name);
                providers_file.providers.push(built);
                new_count += 1;
            }
            Err(e) => eprintln!("Skipping {}: {}", candidate.url, e),
        }
    }

    if new_count > 0 {
        storage::save_providers(&root, &providers_file)?;
    }

    // Reports
    storage::save_report(&root, "analysis.md", &report::generate_analysis_md(&candidates, &stats))?;
    storage::save_report(
        &root,
        "providers.csv",
        &report::generate_providers_csv(&providers_file.providers),
    )?;

    notify::send_notifications(&notify::format_pipeline_summary(&stats, new_count))?;

    Ok(())
}
