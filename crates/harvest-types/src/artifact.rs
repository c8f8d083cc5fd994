//! On-disk session artifact format.
//!
//! ```json
//! {
//!   "cookies": [{ "name": "sid", "value": "...", "domain": ".example.com",
//!                 "path": "/", "expires": -1, "httpOnly": true,
//!                 "secure": true, "sameSite": "Lax" }],
//!   "origins": [{ "origin": "https://app.example.com",
//!                 "localStorage": [{ "name": "token", "value": "..." }] }],
//!   "sessionStorage": { "tab": "inventory" }
//! }
//! ```
//!
//! `cookies` and `origins` are required; `sessionStorage` may be omitted,
//! which keeps files written by other storage-state tools readable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Persisted authentication state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionArtifact {
    pub cookies: Vec<StoredCookie>,
    pub origins: Vec<OriginStorage>,
    #[serde(rename = "sessionStorage", default)]
    pub session_storage: BTreeMap<String, String>,
}

impl SessionArtifact {
    /// Parse an artifact. Empty input is rejected like any other malformed
    /// document.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Local storage entries for `origin`, if any were captured.
    pub fn local_storage_for(&self, origin: &str) -> Option<&OriginStorage> {
        self.origins.iter().find(|o| o.origin == origin)
    }
}

/// A cookie as stored in the artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Unix seconds; `-1` marks a session cookie.
    #[serde(default = "session_expiry")]
    pub expires: f64,
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

fn session_expiry() -> f64 {
    -1.0
}

/// Local storage captured for one origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginStorage {
    pub origin: String,
    #[serde(rename = "localStorage", default)]
    pub local_storage: Vec<StorageItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageItem {
    pub name: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_documented_shape() {
        let text = r#"{
            "cookies": [{"name": "sid", "value": "abc", "domain": ".example.com", "path": "/", "expires": -1}],
            "origins": [{"origin": "https://app.example.com", "localStorage": [{"name": "token", "value": "t"}]}],
            "sessionStorage": {"tab": "inventory"}
        }"#;
        let artifact = SessionArtifact::from_json(text).unwrap();
        assert_eq!(artifact.cookies[0].name, "sid");
        assert!(!artifact.cookies[0].http_only);
        assert_eq!(
            artifact.local_storage_for("https://app.example.com").unwrap().local_storage[0].value,
            "t"
        );
        assert_eq!(artifact.session_storage["tab"], "inventory");
    }

    #[test]
    fn test_session_storage_is_optional() {
        let artifact = SessionArtifact::from_json(r#"{"cookies": [], "origins": []}"#).unwrap();
        assert!(artifact.session_storage.is_empty());
    }

    #[test]
    fn test_empty_and_truncated_documents_are_rejected() {
        assert!(SessionArtifact::from_json("").is_err());
        assert!(SessionArtifact::from_json("{}").is_err());
        assert!(SessionArtifact::from_json(r#"{"cookies": [{"name": "sid""#).is_err());
    }

    #[test]
    fn test_serialized_keys_use_wire_names() {
        let artifact = SessionArtifact {
            cookies: vec![StoredCookie {
                name: "sid".into(),
                value: "abc".into(),
                domain: "example.com".into(),
                path: "/".into(),
                expires: -1.0,
                http_only: true,
                secure: false,
                same_site: None,
            }],
            origins: vec![],
            session_storage: BTreeMap::from([("k".to_string(), "v".to_string())]),
        };
        let json: serde_json::Value = serde_json::from_str(&artifact.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["cookies"][0]["httpOnly"], true);
        assert_eq!(json["sessionStorage"]["k"], "v");
        assert!(json["cookies"][0].get("sameSite").is_none());
    }
}
