//! Tracking File Storage
//!
//! Load/save helpers for everything under <root>/tracking plus the
//! Config/scoring.yaml analyzer configuration. All JSON files are written
//! via whole-file overwrite.

use crate::types::{ProvidersFile, ScoringConfig};
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

const PROVIDERS_FILE: &str = "tracking/providers.json";
const SCORING_CONFIG_FILE: &str = "Config/scoring.yaml";

/// Load the analyzer config, falling back to compiled-in defaults when the
/// file does not exist
pub fn load_scoring_config(root: &str) -> Result<ScoringConfig> {
    let path = PathBuf::from(root).join(SCORING_CONFIG_FILE);

    if !path.exists() {
        return Ok(ScoringConfig::default());
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read scoring config from {:?}", path))?;

    let config: ScoringConfig =
        serde_yaml::from_str(&content).with_context(|| "Failed to parse scoring.yaml")?;

    Ok(config)
}

/// Load built providers; missing or corrupt files yield an empty set
pub fn load_providers(root: &str) -> Result<ProvidersFile> {
    let path = PathBuf::from(root).join(PROVIDERS_FILE);

    if !path.exists() {
        return Ok(ProvidersFile::default());
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read providers from {:?}", path))?;

    let providers: ProvidersFile =
        serde_json::from_str(&content).unwrap_or_else(|_| ProvidersFile::default());

    Ok(providers)
}

pub fn save_providers(root: &str, providers: &ProvidersFile) -> Result<()> {
    let path = PathBuf::from(root).join(PROVIDERS_FILE);
    ensure_parent(&path)?;
    let json = serde_json::to_string_pretty(providers)?;
    fs::write(&path, json).with_context(|| format!("Failed to write providers to {:?}", path))?;
    Ok(())
}

/// Write a generated report under tracking/
pub fn save_report(root: &str, file_name: &str, content: &str) -> Result<()> {
    let path = PathBuf::from(root).join("tracking").join(file_name);
    ensure_parent(&path)?;
    fs::write(&path, content)
        .with_context(|| format!("Failed to write report to {:?}", path))?;
    Ok(())
}

pub(crate) fn ensure_parent(path: &PathBuf) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create tracking directory")?;
    }
    Ok(())
}
