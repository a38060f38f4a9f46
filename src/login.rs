//! Login Page Detection Module
//!
//! Classifies captured flows as login pages so a provider can carry the
//! URL a user must visit before the attested request fires.

use crate::capture;
use crate::types::CapturedFlow;
use regex::Regex;
use scraper::{Html, Selector};

/// Login classification result
#[derive(Debug, Clone)]
pub struct LoginDetection {
    pub is_login: bool,
    pub reason: LoginReason,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginReason {
    PasswordInput,
    LoginFormAction,
    CredentialPost,
    PathKeyword,
    None,
}

impl Default for LoginDetection {
    fn default() -> Self {
        Self {
            is_login: false,
            reason: LoginReason::None,
            confidence: 0.0,
        }
    }
}

const LOGIN_PATH_KEYWORDS: &[&str] = &[
    "login", "signin", "sign-in", "logon", "auth", "authenticate", "session",
];

/// Classify a flow as a login page
///
/// Checked in order of strength:
/// 1. HTML with a password input
/// 2. a form whose action points at a login path
/// 3. a POST whose body carries credential-shaped fields
/// 4. a login keyword in the URL path
pub fn detect_login(flow: &CapturedFlow) -> LoginDetection {
    let is_html = flow.content_type.contains("html") || flow.response_body.contains("</");

    if is_html && !flow.response_body.is_empty() {
        let document = Html::parse_document(&flow.response_body);

        if let Ok(selector) = Selector::parse("input[type='password']") {
            if document.select(&selector).next().is_some() {
                return LoginDetection {
                    is_login: true,
                    reason: LoginReason::PasswordInput,
                    confidence: 0.9,
                };
            }
        }

        if let Ok(selector) = Selector::parse("form[action]") {
            for element in document.select(&selector) {
                if let Some(action) = element.value().attr("action") {
                    let action = action.to_lowercase();
                    if LOGIN_PATH_KEYWORDS.iter().any(|k| action.contains(k)) {
                        return LoginDetection {
                            is_login: true,
                            reason: LoginReason::LoginFormAction,
                            confidence: 0.8,
                        };
                    }
                }
            }
        }
    }

    if flow.method == "POST" && !flow.request_body.is_empty() {
        if let Ok(re) = Regex::new(r#"(?i)(?:"|&|^)(?:username|user_id|password|passwd|pin)["=]"#) {
            if re.is_match(&flow.request_body) {
                return LoginDetection {
                    is_login: true,
                    reason: LoginReason::CredentialPost,
                    confidence: 0.7,
                };
            }
        }
    }

    let path = capture::path_of(&flow.url).to_lowercase();
    if LOGIN_PATH_KEYWORDS.iter().any(|k| path.contains(k)) {
        return LoginDetection {
            is_login: true,
            reason: LoginReason::PathKeyword,
            confidence: 0.6,
        };
    }

    LoginDetection::default()
}

/// Pick the login URL for a capture: highest confidence wins, HTML GET
/// pages preferred over credential POSTs
pub fn pick_login_url(flows: &[CapturedFlow]) -> Option<String> {
    let mut best: Option<(f32, &CapturedFlow)> = None;

    for flow in flows {
        let detection = detect_login(flow);
        if !detection.is_login {
            continue;
        }
        // The page a user navigates to, not the credentials submission
        let mut rank = detection.confidence;
        if flow.method == "GET" {
            rank += 0.05;
        }
        match best {
            Some((best_rank, _)) if best_rank >= rank => {}
            _ => best = Some((rank, flow)),
        }
    }

    best.map(|(_, flow)| capture::url_without_query(&flow.url))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_flow(url: &str, method: &str, content_type: &str, body: &str) -> CapturedFlow {
        CapturedFlow {
            url: url.to_string(),
            method: method.to_string(),
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
    fn test_password_input_detected() {
        let flow = create_test_flow(
            "https://bank.example.com/welcome",
            "GET",
            "text/html",
            r#"<form><input type="text" name="user"/><input type="password" name="pass"/></form>"#,
        );
        let detection = detect_login(&flow);
        assert!(detection.is_login);
        assert_eq!(detection.reason, LoginReason::PasswordInput);
    }

    #[test]
    fn test_login_form_action_detected() {
        let flow = create_test_flow(
            "https://bank.example.com/home",
            "GET",
            "text/html",
            r#"<form action="/auth/signin"><input type="text" name="user"/></form>"#,
        );
        let detection = detect_login(&flow);
        assert!(detection.is_login);
        assert_eq!(detection.reason, LoginReason::LoginFormAction);
    }

    #[test]
    fn test_credential_post_detected() {
        let mut flow = create_test_flow(
            "https://bank.example.com/do-thing",
            "POST",
            "application/json",
            "{}",
        );
        flow.request_body = r#"{"username":"alice","password":"hunter2"}"#.to_string();
        let detection = detect_login(&flow);
        assert!(detection.is_login);
        assert_eq!(detection.reason, LoginReason::CredentialPost);
    }

    #[test]
    fn test_path_keyword_detected() {
        let flow = create_test_flow(
            "https://bank.example.com/retail/login?next=/home",
            "GET",
            "application/json",
            "{}",
        );
        let detection = detect_login(&flow);
        assert!(detection.is_login);
        assert_eq!(detection.reason, LoginReason::PathKeyword);
    }

    #[test]
    fn test_plain_page_not_login() {
        let flow = create_test_flow(
            "https://bank.example.com/rates",
            "GET",
            "text/html",
            "<html><body>Our savings rates</body></html>",
        );
        assert!(!detect_login(&flow).is_login);
    }

    #[test]
    fn test_pick_login_url_prefers_password_page() {
        let flows = vec![
            create_test_flow(
                "https://bank.example.com/auth/session",
                "POST",
                "application/json",
                "{}",
            ),
            create_test_flow(
                "https://bank.example.com/login?campaign=x",
                "GET",
                "text/html",
                r#"<input type="password" name="p"/>"#,
            ),
        ];
        assert_eq!(
            pick_login_url(&flows).as_deref(),
            Some("https://bank.example.com/login")
        );
    }

    #[test]
    fn test_pick_login_url_none_without_candidates() {
        let flows = vec![create_test_flow(
            "https://bank.example.com/rates",
            "GET",
            "text/html",
            "<p>rates</p>",
        )];
        assert_eq!(pick_login_url(&flows), None);
    }
}
