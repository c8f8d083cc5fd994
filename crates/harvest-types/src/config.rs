//! Configuration types for a harvest run.
//!
//! [`HarvestConfig`] is loaded from `harvest.toml`. Credentials and the base
//! URL may also come from the environment (usually populated from a `.env`
//! file), which overrides whatever the file says.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;

/// Environment variables consulted by [`HarvestConfig::apply_env`], each with
/// its legacy alias. The first name wins when both are set.
pub const ENV_USERNAME: [&str; 2] = ["HARVEST_USERNAME", "APP_USERNAME"];
pub const ENV_PASSWORD: [&str; 2] = ["HARVEST_PASSWORD", "APP_PASSWORD"];
pub const ENV_BASE_URL: [&str; 2] = ["HARVEST_BASE_URL", "BASE_URL"];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    /// Application landing URL. Session restore navigates here.
    #[serde(default)]
    pub base_url: String,
    /// Login entry point, resolved against `base_url`.
    #[serde(default)]
    pub login_path: String,
    #[serde(default)]
    pub credentials: Credentials,
    /// Where the session artifact is stored between runs.
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,
    /// Screenshots and HTML captured when login fails.
    #[serde(default = "default_diagnostics_dir")]
    pub diagnostics_dir: PathBuf,
    #[serde(default)]
    pub browser: BrowserSettings,
    pub selectors: SelectorMap,
    #[serde(default)]
    pub timing: Timing,
}

#[derive(Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Secret,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password)
            .finish()
    }
}

/// A string that never appears in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// How Chrome is started.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Explicit Chrome binary; discovered when unset.
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub debug_port: u16,
    pub user_data_dir: PathBuf,
    pub launch_timeout_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: false,
            debug_port: 9222,
            user_data_dir: PathBuf::from(".harvest/chrome-profile"),
            launch_timeout_ms: 20_000,
        }
    }
}

impl BrowserSettings {
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }
}

/// CSS selectors keyed by logical role. The engine treats them as opaque.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorMap {
    pub login: LoginSelectors,
    /// Controls clicked in order to reach the listing after authentication.
    #[serde(default)]
    pub navigation: Vec<String>,
    #[serde(default)]
    pub listing: ListingSelectors,
    #[serde(default)]
    pub fields: FieldSelectors,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginSelectors {
    pub username: String,
    pub password: String,
    pub submit: String,
    /// Optional screens that may or may not appear after submitting.
    #[serde(default)]
    pub interstitials: Vec<String>,
    /// Final control that must be activated before the app is usable.
    #[serde(default)]
    pub continue_button: Option<String>,
    /// Element that only exists once authenticated.
    pub success_indicator: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListingSelectors {
    /// Waited for after the navigation walk.
    pub container: Option<String>,
    pub card: String,
    /// Element whose text reads like "Showing 20 of 40 products".
    pub total_count: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            container: None,
            card: "div.rounded-lg.border.bg-card".to_string(),
            total_count: "div.text-sm.text-muted-foreground".to_string(),
        }
    }
}

/// Card-relative selectors for one record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FieldSelectors {
    pub title: String,
    pub category: String,
    pub id: String,
    /// Literal prefix stripped from the identifier text.
    pub id_prefix: String,
    pub detail_row: String,
    pub detail_label: String,
    pub detail_value: String,
}

impl Default for FieldSelectors {
    fn default() -> Self {
        Self {
            title: "h3".to_string(),
            category: "div.inline-flex".to_string(),
            id: "p.text-xs.text-muted-foreground.font-mono".to_string(),
            id_prefix: "ID: ".to_string(),
            detail_row: "dl div.flex".to_string(),
            detail_label: "dt".to_string(),
            detail_value: "dd".to_string(),
        }
    }
}

/// Bounded waits and scroll pacing, in milliseconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub required_step_timeout_ms: u64,
    pub optional_step_timeout_ms: u64,
    pub success_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Scroll distance per round, as a multiple of the viewport height.
    pub scroll_viewports: f64,
    pub scroll_pause_ms: u64,
    pub growth_timeout_ms: u64,
    /// Consecutive rounds without growth before giving up.
    pub stagnation_limit: u32,
    /// Expected maximum record count when the page total can't be read.
    pub fallback_total: usize,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            required_step_timeout_ms: 10_000,
            optional_step_timeout_ms: 3_000,
            success_timeout_ms: 10_000,
            poll_interval_ms: 100,
            scroll_viewports: 2.0,
            scroll_pause_ms: 1_500,
            growth_timeout_ms: 5_000,
            stagnation_limit: 1,
            fallback_total: 1_000,
        }
    }
}

impl Timing {
    pub fn required_step_timeout(&self) -> Duration {
        Duration::from_millis(self.required_step_timeout_ms)
    }

    pub fn optional_step_timeout(&self) -> Duration {
        Duration::from_millis(self.optional_step_timeout_ms)
    }

    pub fn success_timeout(&self) -> Duration {
        Duration::from_millis(self.success_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }

    pub fn growth_timeout(&self) -> Duration {
        Duration::from_millis(self.growth_timeout_ms)
    }
}

fn default_session_file() -> PathBuf {
    PathBuf::from(".harvest/session.json")
}

fn default_output_file() -> PathBuf {
    PathBuf::from("products.json")
}

fn default_diagnostics_dir() -> PathBuf {
    PathBuf::from(".harvest/diagnostics")
}

// ---------------------------------------------------------------------------
// Implementation
// ---------------------------------------------------------------------------

impl HarvestConfig {
    /// Read, apply process environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse without applying environment overrides or validating.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            reason: e.to_string(),
        })
    }

    /// Override credentials and base URL from `lookup`, which maps an
    /// environment variable name to its value. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: [&str; 2]| {
            names
                .into_iter()
                .filter_map(|name| lookup(name))
                .find(|value| !value.is_empty())
        };
        if let Some(username) = first(ENV_USERNAME) {
            self.credentials.username = username;
        }
        if let Some(password) = first(ENV_PASSWORD) {
            self.credentials.password = Secret::new(password);
        }
        if let Some(base_url) = first(ENV_BASE_URL) {
            self.base_url = base_url;
        }
    }

    /// Check everything the engine relies on without re-validating.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Missing { field: "base_url" });
        }
        self.landing_url()?;
        self.login_url()?;

        if self.credentials.username.is_empty() {
            return Err(ConfigError::Missing {
                field: "credentials.username",
            });
        }
        if self.credentials.password.is_empty() {
            return Err(ConfigError::Missing {
                field: "credentials.password",
            });
        }

        let login = &self.selectors.login;
        let required = [
            ("selectors.login.username", login.username.as_str()),
            ("selectors.login.password", login.password.as_str()),
            ("selectors.login.submit", login.submit.as_str()),
            (
                "selectors.login.success_indicator",
                login.success_indicator.as_str(),
            ),
            ("selectors.listing.card", self.selectors.listing.card.as_str()),
            (
                "selectors.listing.total_count",
                self.selectors.listing.total_count.as_str(),
            ),
            ("selectors.fields.id", self.selectors.fields.id.as_str()),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing { field });
            }
        }
        if self.selectors.navigation.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "selectors.navigation",
                reason: "entries must not be empty".to_string(),
            });
        }

        let timing = &self.timing;
        if !(timing.scroll_viewports.is_finite() && timing.scroll_viewports > 0.0) {
            return Err(ConfigError::Invalid {
                field: "timing.scroll_viewports",
                reason: format!("must be positive, got {}", timing.scroll_viewports),
            });
        }
        if timing.fallback_total == 0 {
            return Err(ConfigError::Invalid {
                field: "timing.fallback_total",
                reason: "must be greater than zero".to_string(),
            });
        }
        if timing.stagnation_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "timing.stagnation_limit",
                reason: "must be at least 1".to_string(),
            });
        }
        if timing.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "timing.poll_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn landing_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(self.base_url.trim()).map_err(|e| ConfigError::Invalid {
            field: "base_url",
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::Invalid {
                field: "base_url",
                reason: format!("unsupported scheme '{other}'"),
            }),
        }
    }

    /// `login_path` joined onto the base URL. An empty path means the base
    /// URL itself.
    pub fn login_url(&self) -> Result<Url, ConfigError> {
        let base = self.landing_url()?;
        if self.login_path.is_empty() {
            return Ok(base);
        }
        base.join(&self.login_path)
            .map_err(|e| ConfigError::Invalid {
                field: "login_path",
                reason: e.to_string(),
            })
    }
}
