//! Cookie and web-storage plumbing.
//!
//! Builds CDP parameters and page-context expressions for reading and
//! writing cookies, `localStorage`, and `sessionStorage`, and produces
//! redacted copies of cookie data that are safe to log.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::BrowserError;

/// A browser cookie in the shape CDP reports and accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieInfo {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Seconds since the Unix epoch; `None` (or CDP's `-1`) for session cookies.
    #[serde(default, deserialize_with = "deserialize_expires")]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

fn default_path() -> String {
    "/".to_string()
}

fn deserialize_expires<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw.filter(|v| *v >= 0.0))
}

/// Which web storage API to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageType {
    LocalStorage,
    SessionStorage,
}

impl StorageType {
    /// The JavaScript global for this storage type.
    pub fn js_name(self) -> &'static str {
        match self {
            StorageType::LocalStorage => "localStorage",
            StorageType::SessionStorage => "sessionStorage",
        }
    }
}

/// Parse a `Network.getAllCookies` / `Storage.getCookies` response.
pub fn parse_cookies_response(response: &serde_json::Value) -> Result<Vec<CookieInfo>, BrowserError> {
    let cookies = response
        .get("cookies")
        .cloned()
        .unwrap_or_else(|| serde_json::json!([]));
    serde_json::from_value(cookies).map_err(|e| BrowserError::Protocol {
        detail: format!("malformed cookie list: {e}"),
    })
}

/// Build `Network.setCookies` parameters. HttpOnly cookies are accepted:
/// the browser-level protocol may set them even though page scripts cannot.
pub fn build_set_cookies_params(cookies: &[CookieInfo]) -> serde_json::Value {
    let cookies: Vec<serde_json::Value> = cookies
        .iter()
        .map(|c| {
            let mut json = serde_json::json!({
                "name": c.name,
                "value": c.value,
                "domain": c.domain,
                "path": c.path,
                "httpOnly": c.http_only,
                "secure": c.secure,
            });
            if let Some(expires) = c.expires {
                json["expires"] = serde_json::json!(expires);
            }
            if let Some(same_site) = &c.same_site {
                json["sameSite"] = serde_json::json!(same_site);
            }
            json
        })
        .collect();
    serde_json::json!({ "cookies": cookies })
}

/// Expression returning every entry of the given storage as a JSON object
/// string (`{"key": "value", ...}`).
pub fn read_storage_expression(storage_type: StorageType) -> String {
    let js = storage_type.js_name();
    format!(
        "JSON.stringify(Object.keys({js}).reduce((acc, k) => {{ acc[k] = {js}.getItem(k); return acc; }}, {{}}))"
    )
}

/// Expression that writes every entry into the given storage and evaluates
/// to the number of keys written.
pub fn write_storage_expression(storage_type: StorageType, entries: &BTreeMap<String, String>) -> String {
    let js = storage_type.js_name();
    // A JSON object literal is a valid JavaScript expression.
    let payload = serde_json::to_string(entries).unwrap_or_else(|_| "{}".to_string());
    format!("(() => {{ const e = {payload}; for (const [k, v] of Object.entries(e)) {{ {js}.setItem(k, v); }} return Object.keys(e).length; }})()")
}

/// Parse the string produced by [`read_storage_expression`].
pub fn parse_storage_dump(value: &serde_json::Value) -> Result<BTreeMap<String, String>, BrowserError> {
    let Some(text) = value.as_str() else {
        return Ok(BTreeMap::new());
    };
    // getItem can yield null for keys removed mid-read; drop those.
    let raw: BTreeMap<String, Option<String>> =
        serde_json::from_str(text).map_err(|e| BrowserError::Protocol {
            detail: format!("malformed storage dump: {e}"),
        })?;
    Ok(raw.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))).collect())
}

/// Validate that an origin is an http(s) URL with a host and return it in
/// canonical `scheme://host[:port]` form.
pub fn normalize_origin(origin: &str) -> Result<String, BrowserError> {
    let invalid = |reason: String| BrowserError::Protocol {
        detail: format!("invalid origin '{origin}': {reason}"),
    };
    let parsed = Url::parse(origin).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("scheme '{other}' is not allowed"))),
    }
    if parsed.host_str().is_none() {
        return Err(invalid("origin has no host".to_string()));
    }
    Ok(parsed.origin().ascii_serialization())
}

// ---------------------------------------------------------------------------
// Redaction
// ---------------------------------------------------------------------------

/// Cookie name substrings that indicate authentication material.
const SENSITIVE_COOKIE_PATTERNS: &[&str] = &["session", "token", "auth", "csrf", "sid"];

fn is_sensitive_cookie(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SENSITIVE_COOKIE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// First 4 characters + "***"; short values are fully masked.
pub fn redact_value(value: &str) -> String {
    if value.chars().count() <= 4 {
        "***".to_string()
    } else {
        let prefix: String = value.chars().take(4).collect();
        format!("{prefix}***")
    }
}

/// A copy of the cookie that is safe to log.
pub fn redact_cookie(cookie: &CookieInfo) -> CookieInfo {
    let value = if is_sensitive_cookie(&cookie.name) {
        "***".to_string()
    } else {
        redact_value(&cookie.value)
    };
    CookieInfo {
        value,
        ..cookie.clone()
    }
}
