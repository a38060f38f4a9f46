//! Universal Balance Extraction Rules
//!
//! The pattern library shared by every target bank:
//! - currency amounts (symbol-first, amount-first, ISO codes)
//! - JSON balance-named fields (quoted and bare numerics)
//! - HTML balance elements and data attributes
//!
//! Also synthesizes named-capture extraction rules from observed responses.
//! Every synthesized rule is re-matched against the source body before it is
//! emitted; rules failing that self-check are dropped.

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Amount shape: grouped thousands or a plain integer, optional decimals
const AMOUNT: &str = r"(?:\d{1,3}(?:[,.\s]\d{3})+|\d+)(?:[.,]\d{1,2})?";

/// ISO 4217 codes seen on retail banking pages
const ISO_CODES: &str = "USD|EUR|GBP|CHF|JPY|CNY|CAD|AUD|INR|TWD|HKD|SGD|NOK|SEK|DKK|PLN|BRL|MXN";

/// JSON keys that carry a balance value
const JSON_BALANCE_FIELD: &str = r#"(?i)"(?P<field>[a-z0-9_]*(?:balance|saldo)[a-z0-9_]*|available[a-z0-9_]*amount|current[a-z0-9_]*amount)"\s*:\s*"?(?P<amount>-?[\d.,]+)"?"#;

/// Upper bound on hits kept per body
const MAX_HITS: usize = 20;

/// Upper bound on synthesized rules per endpoint
const MAX_RULES: usize = 5;

/// Where a balance value was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceKind {
    JsonField,
    CurrencyAmount,
    HtmlElement,
}

/// A balance value extracted from a response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceHit {
    /// Text as it appeared in the body
    pub raw: String,
    /// Normalized amount ("1.234,56" becomes "1234.56")
    pub value: String,
    pub currency: Option<String>,
    /// JSON field name, when the hit came from a JSON key
    pub field: Option<String>,
    pub kind: BalanceKind,
}

/// A synthesized extraction rule, ready to become a provider responseMatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRule {
    pub name: String,
    /// Regex in the attestor's (?<name>...) capture syntax
    pub pattern: String,
    pub json_path: Option<String>,
    /// Value the rule captured from the source body
    pub sample: String,
}

/// Run the universal pattern set over a response body
pub fn extract_balances(body: &str, content_type: &str) -> Vec<BalanceHit> {
    let mut hits = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let looks_json = content_type.contains("json") || body.trim_start().starts_with(['{', '[']);
    let looks_html = content_type.contains("html") || body.contains("</");

    // JSON balance fields first: a named field beats a bare amount
    if looks_json {
        if let Ok(re) = Regex::new(JSON_BALANCE_FIELD) {
            for caps in re.captures_iter(body) {
                let field = caps["field"].to_string();
                let raw_amount = caps["amount"].to_string();
                if let Some(value) = normalize_amount(&raw_amount) {
                    let key = format!("json:{}:{}", field, value);
                    if seen.insert(key) && hits.len() < MAX_HITS {
                        hits.push(BalanceHit {
                            raw: caps[0].to_string(),
                            value,
                            currency: None,
                            field: Some(field),
                            kind: BalanceKind::JsonField,
                        });
                    }
                }
            }
        }
    }

    // Currency amounts, all content types
    let currency_patterns = [
        format!(r"(?P<cur>[$€£¥₹])\s?(?P<amount>{})", AMOUNT),
        format!(r"(?P<amount>{})\s?(?P<cur>[$€£¥₹])", AMOUNT),
        format!(r"(?P<cur>\b(?:{})\b)\s?(?P<amount>{})", ISO_CODES, AMOUNT),
        format!(r"(?P<amount>{})\s?(?P<cur>\b(?:{})\b)", AMOUNT, ISO_CODES),
    ];
    for pattern in &currency_patterns {
        if let Ok(re) = Regex::new(pattern) {
            for caps in re.captures_iter(body) {
                let currency = caps["cur"].to_string();
                if let Some(value) = normalize_amount(&caps["amount"]) {
                    let key = format!("cur:{}:{}", currency, value);
                    if seen.insert(key) && hits.len() < MAX_HITS {
                        hits.push(BalanceHit {
                            raw: caps[0].to_string(),
                            value,
                            currency: Some(currency),
                            field: None,
                            kind: BalanceKind::CurrencyAmount,
                        });
                    }
                }
            }
        }
    }

    // HTML balance elements and data attributes
    if looks_html {
        extract_html_hits(body, &mut hits, &mut seen);
    }

    hits
}

/// Pull amounts out of balance-classed elements and data attributes
fn extract_html_hits(body: &str, hits: &mut Vec<BalanceHit>, seen: &mut HashSet<String>) {
    if let Ok(re) = Regex::new(r#"(?i)data-(?:balance|amount)\s*=\s*"(?P<amount>-?[\d.,\s]+)""#) {
        for caps in re.captures_iter(body) {
            if let Some(value) = normalize_amount(&caps["amount"]) {
                let key = format!("attr:{}", value);
                if seen.insert(key) && hits.len() < MAX_HITS {
                    hits.push(BalanceHit {
                        raw: caps[0].to_string(),
                        value,
                        currency: None,
                        field: None,
                        kind: BalanceKind::HtmlElement,
                    });
                }
            }
        }
    }

    let document = Html::parse_document(body);
    let amount_re = match Regex::new(&format!(r"(?P<cur>[$€£¥₹])?\s?(?P<amount>{})", AMOUNT)) {
        Ok(re) => re,
        Err(_) => return,
    };
    if let Ok(selector) = Selector::parse(r#"[class*="balance"], [id*="balance"], [class*="saldo"]"#) {
        for element in document.select(&selector) {
            let text: String = element.text().collect();
            if let Some(caps) = amount_re.captures(&text) {
                if let Some(value) = normalize_amount(&caps["amount"]) {
                    let key = format!("html:{}", value);
                    if seen.insert(key) && hits.len() < MAX_HITS {
                        hits.push(BalanceHit {
                            raw: caps[0].trim().to_string(),
                            value,
                            currency: caps.name("cur").map(|c| c.as_str().to_string()),
                            field: None,
                            kind: BalanceKind::HtmlElement,
                        });
                    }
                }
            }
        }
    }
}

/// Normalize a raw amount string to digits with a '.' decimal separator
///
/// Decides the decimal separator from the final group: "1.234,56" -> "1234.56",
/// "1,234" -> "1234", "0,5" -> "0.5".
pub fn normalize_amount(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.' || *c == '-')
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let negative = cleaned.starts_with('-');
    let digits_only = cleaned.trim_start_matches('-');

    let last_comma = digits_only.rfind(',');
    let last_dot = digits_only.rfind('.');

    let decimal_sep = match (last_comma, last_dot) {
        (Some(c), Some(d)) => Some(if c > d { ',' } else { '.' }),
        (Some(c), None) => separator_role(digits_only, c, ','),
        (None, Some(d)) => separator_role(digits_only, d, '.'),
        (None, None) => None,
    };

    let mut integer = String::new();
    let mut fraction = String::new();
    let mut in_fraction = false;
    for (i, ch) in digits_only.char_indices() {
        if ch.is_ascii_digit() {
            if in_fraction {
                fraction.push(ch);
            } else {
                integer.push(ch);
            }
        } else if Some(ch) == decimal_sep && Some(i) == digits_only.rfind(ch) {
            in_fraction = true;
        }
    }

    if integer.is_empty() {
        integer.push('0');
    }

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&integer);
    if !fraction.is_empty() {
        out.push('.');
        out.push_str(&fraction);
    }
    Some(out)
}

/// A lone separator is decimal when it has 1-2 trailing digits, thousands otherwise
fn separator_role(s: &str, pos: usize, sep: char) -> Option<char> {
    let occurrences = s.matches(sep).count();
    let trailing = s.len() - pos - 1;
    if occurrences == 1 && (1..=2).contains(&trailing) {
        Some(sep)
    } else {
        None
    }
}

/// Synthesize named-capture extraction rules for the hits in a body
pub fn synthesize_rules(body: &str, content_type: &str, hits: &[BalanceHit]) -> Vec<ExtractionRule> {
    let looks_json = content_type.contains("json") || body.trim_start().starts_with(['{', '[']);
    let json_tree: Option<Value> = if looks_json {
        serde_json::from_str(body).ok()
    } else {
        None
    };

    let mut rules = Vec::new();
    let mut used_names: HashSet<String> = HashSet::new();

    for (i, hit) in hits.iter().enumerate() {
        if rules.len() >= MAX_RULES {
            break;
        }

        let base_name = hit
            .field
            .as_deref()
            .map(sanitize_group_name)
            .unwrap_or_else(|| format!("balance_{}", i + 1));
        let name = unique_name(&base_name, &mut used_names);

        let rule = match (&hit.field, &json_tree) {
            (Some(field), Some(tree)) => synthesize_json_rule(field, &name, tree),
            _ => synthesize_context_rule(body, hit, &name),
        };

        if let Some(rule) = rule {
            // Self-check: the rule must re-match the body it came from
            if let Ok(re) = Regex::new(&attestor_regex_to_rust(&rule.pattern)) {
                if re.is_match(body) {
                    rules.push(rule);
                }
            }
        }
    }

    rules
}

/// Rule for a named JSON field: jsonPath plus a field-anchored regex
fn synthesize_json_rule(field: &str, name: &str, tree: &Value) -> Option<ExtractionRule> {
    let json_path = find_json_path(tree, field);
    let pattern = format!(
        r#""{}"\s*:\s*"?(?<{}>-?[\d.,]+)"?"#,
        regex::escape(field),
        name
    );
    let sample = value_at_field(tree, field).unwrap_or_default();
    Some(ExtractionRule {
        name: name.to_string(),
        pattern,
        json_path,
        sample,
    })
}

/// Rule anchored on the literal context around the hit
fn synthesize_context_rule(body: &str, hit: &BalanceHit, name: &str) -> Option<ExtractionRule> {
    let pos = body.find(&hit.raw)?;
    let start_digit = hit.raw.find(|c: char| c.is_ascii_digit())?;
    let end_digit = hit.raw.rfind(|c: char| c.is_ascii_digit())? + 1;

    let amount_prefix = &hit.raw[..start_digit];
    let amount_suffix = &hit.raw[end_digit..];
    let before = char_window_before(body, pos, 16);
    let after = char_window_after(body, pos + hit.raw.len(), 16);

    let pattern = format!(
        r"{}{}(?<{}>[\d.,\s]+){}{}",
        regex::escape(before),
        regex::escape(amount_prefix),
        name,
        regex::escape(amount_suffix),
        regex::escape(after)
    );
    Some(ExtractionRule {
        name: name.to_string(),
        pattern,
        json_path: None,
        sample: hit.value.clone(),
    })
}

/// Locate a field in a JSON tree, returning a $.a.b[0].c path
pub fn find_json_path(tree: &Value, field: &str) -> Option<String> {
    fn walk(v: &Value, field: &str, path: &str) -> Option<String> {
        match v {
            Value::Object(map) => {
                for (k, child) in map {
                    let child_path = format!("{}.{}", path, k);
                    if k == field && (child.is_number() || child.is_string()) {
                        return Some(child_path);
                    }
                    if let Some(found) = walk(child, field, &child_path) {
                        return Some(found);
                    }
                }
                None
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    let child_path = format!("{}[{}]", path, i);
                    if let Some(found) = walk(child, field, &child_path) {
                        return Some(found);
                    }
                }
                None
            }
            _ => None,
        }
    }
    walk(tree, field, "$")
}

/// First scalar value stored under a field name, as a string
fn value_at_field(tree: &Value, field: &str) -> Option<String> {
    match tree {
        Value::Object(map) => {
            for (k, child) in map {
                if k == field {
                    match child {
                        Value::String(s) => return Some(s.clone()),
                        Value::Number(n) => return Some(n.to_string()),
                        _ => {}
                    }
                }
                if let Some(found) = value_at_field(child, field) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(|c| value_at_field(c, field)),
        _ => None,
    }
}

/// Convert the attestor's (?<name>...) capture syntax to Rust's (?P<name>...)
pub fn attestor_regex_to_rust(pattern: &str) -> String {
    pattern
        .replace("(?<", "(?P<")
        .replace("(?P<=", "(?<=")
        .replace("(?P<!", "(?<!")
}

/// Capture group names must be [A-Za-z][A-Za-z0-9_]*
fn sanitize_group_name(field: &str) -> String {
    let mut name: String = field
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if !name.chars().next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false) {
        name = format!("f_{}", name);
    }
    name
}

fn unique_name(base: &str, used: &mut HashSet<String>) -> String {
    if used.insert(base.to_string()) {
        return base.to_string();
    }
    let mut i = 2;
    loop {
        let candidate = format!("{}_{}", base, i);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        i += 1;
    }
}

fn char_window_before(body: &str, end: usize, max_chars: usize) -> &str {
    let prefix = &body[..end];
    let start = prefix
        .char_indices()
        .rev()
        .take(max_chars)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(end);
    &body[start..end]
}

fn char_window_after(body: &str, start: usize, max_chars: usize) -> &str {
    let suffix = &body[start..];
    let end = suffix
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(suffix.len());
    &suffix[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON_BODY: &str = r#"{"account":{"number":"****1234","availableBalance":"2540.75","currency":"USD"},"pending":12.50}"#;

    const HTML_BODY: &str = r#"<html><body>
        <div class="account-summary">
            <span class="account-balance">$1,234.56</span>
            <span data-balance="987.65"></span>
        </div>
    </body></html>"#;

    #[test]
    fn test_normalize_amount() {
        assert_eq!(normalize_amount("2540.75").as_deref(), Some("2540.75"));
        assert_eq!(normalize_amount("1,234.56").as_deref(), Some("1234.56"));
        assert_eq!(normalize_amount("1.234,56").as_deref(), Some("1234.56"));
        assert_eq!(normalize_amount("1,234").as_deref(), Some("1234"));
        assert_eq!(normalize_amount("0,5").as_deref(), Some("0.5"));
        assert_eq!(normalize_amount("-42.00").as_deref(), Some("-42.00"));
        assert_eq!(normalize_amount("1,234,567.89").as_deref(), Some("1234567.89"));
        assert_eq!(normalize_amount("no digits"), None);
    }

    #[test]
    fn test_extract_json_balance_field() {
        let hits = extract_balances(JSON_BODY, "application/json");
        let field_hit = hits
            .iter()
            .find(|h| h.kind == BalanceKind::JsonField)
            .expect("should find a JSON balance field");
        assert_eq!(field_hit.field.as_deref(), Some("availableBalance"));
        assert_eq!(field_hit.value, "2540.75");
    }

    #[test]
    fn test_extract_currency_amounts_from_html() {
        let hits = extract_balances(HTML_BODY, "text/html");
        assert!(hits.iter().any(|h| h.value == "1234.56"));
        assert!(hits.iter().any(|h| h.value == "987.65"));
    }

    #[test]
    fn test_extract_symbol_first_and_amount_first() {
        let hits = extract_balances("Balance: $500.25 or 300,00 €", "text/plain");
        assert!(hits.iter().any(|h| h.value == "500.25" && h.currency.as_deref() == Some("$")));
        assert!(hits.iter().any(|h| h.value == "300.00" && h.currency.as_deref() == Some("€")));
    }

    #[test]
    fn test_extract_iso_code_amounts() {
        let hits = extract_balances("Total: USD 9,876.54", "text/plain");
        assert!(hits
            .iter()
            .any(|h| h.value == "9876.54" && h.currency.as_deref() == Some("USD")));
    }

    #[test]
    fn test_synthesized_json_rule_matches_source() {
        let hits = extract_balances(JSON_BODY, "application/json");
        let rules = synthesize_rules(JSON_BODY, "application/json", &hits);
        assert!(!rules.is_empty());

        let rule = rules
            .iter()
            .find(|r| r.name == "availableBalance")
            .expect("field-named rule");
        assert_eq!(rule.json_path.as_deref(), Some("$.account.availableBalance"));

        let re = Regex::new(&attestor_regex_to_rust(&rule.pattern)).unwrap();
        let caps = re.captures(JSON_BODY).unwrap();
        assert_eq!(&caps["availableBalance"], "2540.75");
    }

    #[test]
    fn test_synthesized_context_rule_matches_source() {
        let body = "Your balance is $1,234.56 as of today";
        let hits = extract_balances(body, "text/plain");
        let rules = synthesize_rules(body, "text/plain", &hits);
        assert!(!rules.is_empty());

        let re = Regex::new(&attestor_regex_to_rust(&rules[0].pattern)).unwrap();
        assert!(re.is_match(body));
    }

    #[test]
    fn test_find_json_path_nested_array() {
        let tree: Value = serde_json::from_str(
            r#"{"accounts":[{"id":"a"},{"id":"b","balance":100.5}]}"#,
        )
        .unwrap();
        assert_eq!(
            find_json_path(&tree, "balance").as_deref(),
            Some("$.accounts[1].balance")
        );
        assert_eq!(find_json_path(&tree, "missing"), None);
    }

    #[test]
    fn test_attestor_regex_conversion() {
        assert_eq!(attestor_regex_to_rust("(?<bal>\\d+)"), "(?P<bal>\\d+)");
        // Lookbehind must survive the round trip
        assert_eq!(attestor_regex_to_rust("(?<=x)\\d+"), "(?<=x)\\d+");
    }

    #[test]
    fn test_sanitize_group_name() {
        assert_eq!(sanitize_group_name("availableBalance"), "availableBalance");
        assert_eq!(sanitize_group_name("saldo-total"), "saldo_total");
        assert_eq!(sanitize_group_name("1st_balance"), "f_1st_balance");
    }
}
