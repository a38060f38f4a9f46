//! Capture Ingestion Module
//!
//! Reads intercepted-traffic dumps into CapturedFlow records:
//! - flat JSONL (one flow object per line, unknown fields ignored)
//! - HAR files (log.entries, base64 bodies decoded)
//!
//! Parsing is deliberately lenient: unparseable lines are skipped and
//! counted, never fatal.

use crate::types::CapturedFlow;
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// File extensions that mark static assets, never API endpoints
const STATIC_EXTENSIONS: &[&str] = &[
    ".js", ".css", ".map", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico",
    ".woff", ".woff2", ".ttf", ".eot", ".mp4", ".webp", ".pdf",
];

/// Result of reading a capture file
#[derive(Debug, Default)]
pub struct IngestStats {
    pub total_lines: usize,
    pub skipped_lines: usize,
}

/// Load flows from a capture file (HAR or JSONL, decided by content)
pub fn load_flows(path: &Path, max_body_bytes: usize) -> Result<(Vec<CapturedFlow>, IngestStats)> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read capture file {:?}", path))?;

    // A HAR file is a single JSON document with log.entries
    if let Ok(doc) = serde_json::from_str::<Value>(&content) {
        if let Some(entries) = doc.pointer("/log/entries").and_then(|v| v.as_array()) {
            let mut stats = IngestStats {
                total_lines: entries.len(),
                skipped_lines: 0,
            };
            let mut flows = Vec::new();
            for entry in entries {
                match flow_from_har_entry(entry, max_body_bytes) {
                    Some(flow) => flows.push(flow),
                    None => stats.skipped_lines += 1,
                }
            }
            return Ok((flows, stats));
        }
        // A top-level JSON array of flow objects also counts
        if let Some(items) = doc.as_array() {
            let mut stats = IngestStats {
                total_lines: items.len(),
                skipped_lines: 0,
            };
            let mut flows = Vec::new();
            for item in items {
                match flow_from_value(item, max_body_bytes) {
                    Some(flow) => flows.push(flow),
                    None => stats.skipped_lines += 1,
                }
            }
            return Ok((flows, stats));
        }
    }

    // Fallback: JSONL, one flow per line
    let mut stats = IngestStats::default();
    let mut flows = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.total_lines += 1;
        let parsed = serde_json::from_str::<Value>(line)
            .ok()
            .and_then(|v| flow_from_value(&v, max_body_bytes));
        match parsed {
            Some(flow) => flows.push(flow),
            None => stats.skipped_lines += 1,
        }
    }
    Ok((flows, stats))
}

/// Map a flat flow object into a CapturedFlow
///
/// Headers are accepted in both map form ({"k": "v"}) and pair-list form
/// ([["k", "v"]]); bodies may be absent.
pub fn flow_from_value(v: &Value, max_body_bytes: usize) -> Option<CapturedFlow> {
    let url = v.get("url").and_then(|u| u.as_str())?.to_string();
    if url.is_empty() {
        return None;
    }
    let method = v
        .get("method")
        .and_then(|m| m.as_str())
        .unwrap_or("GET")
        .to_uppercase();
    let status = v
        .get("status")
        .or_else(|| v.get("status_code"))
        .and_then(|s| s.as_u64())
        .unwrap_or(0) as u16;

    let request_headers = headers_from_value(v.get("request_headers"));
    let response_headers = headers_from_value(v.get("response_headers"));

    let content_type = v
        .get("content_type")
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .or_else(|| {
            response_headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
                .map(|(_, val)| val.clone())
        })
        .unwrap_or_default();

    let request_body = v
        .get("request_body")
        .and_then(|b| b.as_str())
        .unwrap_or("")
        .to_string();
    let mut response_body = v
        .get("response_body")
        .or_else(|| v.get("body"))
        .and_then(|b| b.as_str())
        .unwrap_or("")
        .to_string();
    truncate_body(&mut response_body, max_body_bytes);

    let started_at = v
        .get("started_at")
        .or_else(|| v.get("timestamp"))
        .and_then(|t| t.as_str())
        .unwrap_or("")
        .to_string();

    Some(CapturedFlow {
        url,
        method,
        status,
        request_headers,
        response_headers,
        content_type,
        request_body,
        response_body,
        started_at,
    })
}

/// Map a HAR log entry into a CapturedFlow
fn flow_from_har_entry(entry: &Value, max_body_bytes: usize) -> Option<CapturedFlow> {
    let request = entry.get("request")?;
    let response = entry.get("response")?;

    let url = request.get("url").and_then(|u| u.as_str())?.to_string();
    let method = request
        .get("method")
        .and_then(|m| m.as_str())
        .unwrap_or("GET")
        .to_uppercase();
    let status = response.get("status").and_then(|s| s.as_u64()).unwrap_or(0) as u16;

    let request_headers = har_headers(request.get("headers"));
    let response_headers = har_headers(response.get("headers"));

    let content_type = response
        .pointer("/content/mimeType")
        .and_then(|m| m.as_str())
        .unwrap_or("")
        .to_string();

    let request_body = request
        .pointer("/postData/text")
        .and_then(|t| t.as_str())
        .unwrap_or("")
        .to_string();

    let mut response_body = match response.pointer("/content/text").and_then(|t| t.as_str()) {
        Some(text) => {
            if response.pointer("/content/encoding").and_then(|e| e.as_str()) == Some("base64") {
                STANDARD
                    .decode(text)
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                    .unwrap_or_default()
            } else {
                text.to_string()
            }
        }
        None => String::new(),
    };
    truncate_body(&mut response_body, max_body_bytes);

    let started_at = entry
        .get("startedDateTime")
        .and_then(|t| t.as_str())
        .unwrap_or("")
        .to_string();

    Some(CapturedFlow {
        url,
        method,
        status,
        request_headers,
        response_headers,
        content_type,
        request_body,
        response_body,
        started_at,
    })
}

/// Accept headers as {"k": "v"} or [["k", "v"], ...]
fn headers_from_value(v: Option<&Value>) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    match v {
        Some(Value::Object(map)) => {
            for (k, val) in map {
                if let Some(s) = val.as_str() {
                    headers.push((k.clone(), s.to_string()));
                }
            }
        }
        Some(Value::Array(items)) => {
            for item in items {
                if let Some(pair) = item.as_array() {
                    if let (Some(k), Some(val)) =
                        (pair.first().and_then(|x| x.as_str()), pair.get(1).and_then(|x| x.as_str()))
                    {
                        headers.push((k.to_string(), val.to_string()));
                    }
                }
            }
        }
        _ => {}
    }
    headers
}

/// HAR headers are [{"name": ..., "value": ...}]
fn har_headers(v: Option<&Value>) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    if let Some(items) = v.and_then(|x| x.as_array()) {
        for item in items {
            if let (Some(name), Some(value)) = (
                item.get("name").and_then(|n| n.as_str()),
                item.get("value").and_then(|x| x.as_str()),
            ) {
                headers.push((name.to_string(), value.to_string()));
            }
        }
    }
    headers
}

/// Cap the body at max_body_bytes, on a char boundary
fn truncate_body(body: &mut String, max_body_bytes: usize) {
    if body.len() > max_body_bytes {
        let mut cut = max_body_bytes;
        while cut > 0 && !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
}

/// Check whether a URL points at a static asset
pub fn is_static_asset(url: &str) -> bool {
    let path = path_of(url).to_lowercase();
    STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Extract the host part of a URL
pub fn domain_of(url: &str) -> String {
    let rest = match url.find("://") {
        Some(pos) => &url[pos + 3..],
        None => url,
    };
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let host = &rest[..end];
    // Strip userinfo and port
    let host = host.rsplit('@').next().unwrap_or(host);
    host.split(':').next().unwrap_or(host).to_lowercase()
}

/// Extract the path part of a URL (without query)
pub fn path_of(url: &str) -> String {
    let rest = match url.find("://") {
        Some(pos) => &url[pos + 3..],
        None => url,
    };
    match rest.find('/') {
        Some(pos) => {
            let path = &rest[pos..];
            path.split(['?', '#']).next().unwrap_or(path).to_string()
        }
        None => "/".to_string(),
    }
}

/// URL without its query string, used as the candidate dedup key
pub fn url_without_query(url: &str) -> String {
    url.split(['?', '#']).next().unwrap_or(url).to_string()
}
