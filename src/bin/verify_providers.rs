//! Verify Providers Binary
//!
//! Replays every provider in tracking/providers.json against its live
//! endpoint, evaluates the responseMatches rules, and writes
//! tracking/verification.md. Exits non-zero when any provider fails.

use anyhow::Result;
use provider_scout::{report, storage, verify};

/// How many endpoints are replayed at once
const MAX_CONCURRENT: usize = 5;

#[tokio::main]
async fn main() -> Result<()> {
    let root = std::env::var("ROOT").unwrap_or_else(|_| ".".to_string());

    let providers = storage::load_providers(&root)?;
    if providers.providers.is_empty() {
        println!("No providers to verify.");
        return Ok(());
    }

    println!("Verifying {} provider(s)", providers.providers.len());
    let results = verify::verify_providers(&providers.providers, MAX_CONCURRENT).await;

    for result in &results {
        let status = if result.ok { "ok" } else { "FAILED" };
        println!(
            "  [{}] {} ({} matched, {} failed)",
            status,
            result.url,
            result.matched.len(),
            result.failed.len()
        );
    }

    storage::save_report(&root, "verification.md", &report::generate_verification_md(&results))?;

    let ok_count = results.iter().filter(|r| r.ok).count();
    println!(
        "{}/{} providers verified; report written to tracking/verification.md",
        ok_count,
        results.len()
    );

    if ok_count < results.len() {
        std::process::exit(1);
    }
    Ok(())
}
