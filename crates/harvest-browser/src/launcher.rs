//! Chrome process launcher and browsing-context factory.
//!
//! Starts a Chrome binary with remote debugging enabled, waits for its
//! DevTools HTTP endpoint, and keeps a browser-level CDP connection used to
//! create isolated browser contexts. Each context starts with an empty
//! cookie jar and empty web storage.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::process::{Child, Command};

use crate::cdp::CdpClient;
use crate::discovery::discover_chrome;
use crate::driver::BrowserDriver;
use crate::error::BrowserError;

/// How to start Chrome.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Explicit binary; discovered when `None`.
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub debug_port: u16,
    /// Profile directory. Kept separate from the user's everyday profile.
    pub user_data_dir: PathBuf,
    /// Bound on how long Chrome may take to expose its DevTools endpoint.
    pub launch_timeout: Duration,
    /// Bound on page loads for drivers created by this process.
    pub load_timeout: Duration,
    pub extra_args: Vec<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: false,
            debug_port: 9222,
            user_data_dir: PathBuf::from(".harvest/chrome-profile"),
            launch_timeout: Duration::from_secs(20),
            load_timeout: crate::driver::DEFAULT_LOAD_TIMEOUT,
            extra_args: Vec::new(),
        }
    }
}

/// Subset of the `/json/version` document.
#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "Browser", default)]
    browser: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// A running Chrome instance. The process is killed when this is dropped.
pub struct ChromeProcess {
    child: Child,
    port: u16,
    browser: CdpClient,
    load_timeout: Duration,
}

impl ChromeProcess {
    /// Discover (if needed) and start Chrome, then connect to its browser
    /// endpoint.
    pub async fn launch(options: &LaunchOptions) -> Result<Self, BrowserError> {
        let binary = discover_chrome(options.chrome_path.as_deref())?;

        std::fs::create_dir_all(&options.user_data_dir).map_err(|e| BrowserError::LaunchFailed {
            reason: format!(
                "cannot create profile dir {}: {e}",
                options.user_data_dir.display()
            ),
        })?;

        let args = build_launch_args(options);
        tracing::info!(
            binary = %binary.path.display(),
            port = options.debug_port,
            headless = options.headless,
            "launching Chrome"
        );

        let child = Command::new(&binary.path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BrowserError::LaunchFailed {
                reason: format!("failed to spawn {}: {e}", binary.path.display()),
            })?;

        let version = wait_for_devtools(options.debug_port, options.launch_timeout).await?;
        tracing::info!(browser = %version.browser, "Chrome DevTools endpoint ready");

        let browser = CdpClient::connect(&version.web_socket_debugger_url).await?;

        Ok(Self {
            child,
            port: options.debug_port,
            browser,
            load_timeout: options.load_timeout,
        })
    }

    /// Create a fresh, isolated browser context with one blank page and
    /// return a driver attached to that page.
    pub async fn new_context(&self) -> Result<BrowserDriver, BrowserError> {
        let created = self
            .browser
            .send_command(
                "Target.createBrowserContext",
                serde_json::json!({ "disposeOnDetach": true }),
            )
            .await?;
        let context_id = string_field(&created, "browserContextId")?;

        let target = self
            .browser
            .send_command(
                "Target.createTarget",
                serde_json::json!({ "url": "about:blank", "browserContextId": context_id }),
            )
            .await?;
        let target_id = string_field(&target, "targetId")?;

        tracing::debug!(context_id = %context_id, target_id = %target_id, "created isolated browser context");

        let client = CdpClient::connect(&page_ws_url(self.port, &target_id)).await?;
        Ok(BrowserDriver::attach(client)
            .await?
            .with_load_timeout(self.load_timeout))
    }

    /// Ask Chrome to exit, falling back to killing the process.
    pub async fn close(mut self) {
        if let Err(e) = self
            .browser
            .send_command_with_timeout("Browser.close", serde_json::json!({}), Duration::from_secs(5))
            .await
        {
            tracing::debug!(error = %e, "Browser.close failed, killing process");
        }
        if tokio::time::timeout(Duration::from_secs(5), self.child.wait())
            .await
            .is_err()
        {
            let _ = self.child.kill().await;
        }
    }
}

fn string_field(value: &Value, field: &str) -> Result<String, BrowserError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BrowserError::Protocol {
            detail: format!("response is missing '{field}'"),
        })
}

/// Poll `/json/version` until Chrome answers or `timeout` elapses.
async fn wait_for_devtools(port: u16, timeout: Duration) -> Result<VersionInfo, BrowserError> {
    let url = format!("http://127.0.0.1:{port}/json/version");
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .map_err(|e| BrowserError::LaunchFailed {
            reason: format!("failed to build HTTP client: {e}"),
        })?;

    let deadline = tokio::time::Instant::now() + timeout;
    let mut last_error = String::from("no response");
    while tokio::time::Instant::now() < deadline {
        match http.get(&url).send().await {
            Ok(resp) => match resp.json::<VersionInfo>().await {
                Ok(info) => return Ok(info),
                Err(e) => last_error = e.to_string(),
            },
            Err(e) => last_error = e.to_string(),
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    Err(BrowserError::LaunchFailed {
        reason: format!("DevTools endpoint {url} not ready after {timeout:?}: {last_error}"),
    })
}

/// Command-line flags for a debuggable, quiet Chrome instance.
pub fn build_launch_args(options: &LaunchOptions) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", options.debug_port),
        format!("--user-data-dir={}", options.user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-popup-blocking".to_string(),
    ];
    if options.headless {
        args.push("--headless=new".to_string());
    }
    args.extend(options.extra_args.iter().cloned());
    args.push("about:blank".to_string());
    args
}

/// DevTools WebSocket URL of a page target on a local debugging port.
pub fn page_ws_url(port: u16, target_id: &str) -> String {
    format!("ws://127.0.0.1:{port}/devtools/page/{target_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_args_headful() {
        let options = LaunchOptions {
            user_data_dir: PathBuf::from("/var/lib/harvest/profile"),
            ..LaunchOptions::default()
        };
        let args = build_launch_args(&options);
        assert_eq!(args[0], "--remote-debugging-port=9222");
        assert!(args.contains(&"--user-data-dir=/var/lib/harvest/profile".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));
    }

    #[test]
    fn test_launch_args_headless_and_extra() {
        let options = LaunchOptions {
            headless: true,
            debug_port: 9333,
            extra_args: vec!["--window-size=1280,2000".to_string()],
            ..LaunchOptions::default()
        };
        let args = build_launch_args(&options);
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--remote-debugging-port=9333".to_string()));
        assert!(args.contains(&"--window-size=1280,2000".to_string()));
    }

    #[test]
    fn test_page_ws_url() {
        assert_eq!(
            page_ws_url(9222, "ABC123"),
            "ws://127.0.0.1:9222/devtools/page/ABC123"
        );
    }

    #[test]
    fn test_version_info_parses_devtools_document() {
        let doc = serde_json::json!({
            "Browser": "Chrome/120.0.6099.109",
            "Protocol-Version": "1.3",
            "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/xyz"
        });
        let info: VersionInfo = serde_json::from_value(doc).unwrap();
        assert_eq!(info.browser, "Chrome/120.0.6099.109");
        assert!(info.web_socket_debugger_url.ends_with("/browser/xyz"));
    }

    #[test]
    fn test_string_field_missing() {
        let err = string_field(&serde_json::json!({}), "targetId").unwrap_err();
        assert!(err.to_string().contains("targetId"));
    }
}
