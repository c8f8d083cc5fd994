//! Finding a Chrome-family binary to launch.
//!
//! A configured path always wins. Otherwise the well-known install
//! locations for this platform and then `PATH` are searched, and the
//! existing candidate with the most preferred channel is used (Stable,
//! then Chromium, then pre-release builds).

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserDiscoveryError {
    #[error("no Chrome or Chromium installation found; set browser.chrome_path")]
    NotFound,

    #[error("configured Chrome binary {path} does not exist")]
    ConfiguredMissing { path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChromeChannel {
    Stable,
    Chromium,
    Beta,
    Dev,
    Canary,
    Unknown,
}

impl ChromeChannel {
    /// Guess the channel from a binary path or a `--version` line.
    pub fn classify(hint: &str) -> Self {
        let hint = hint.to_ascii_lowercase();
        [
            ("canary", ChromeChannel::Canary),
            ("unstable", ChromeChannel::Dev),
            ("dev", ChromeChannel::Dev),
            ("beta", ChromeChannel::Beta),
            ("chromium", ChromeChannel::Chromium),
            ("chrome", ChromeChannel::Stable),
        ]
        .into_iter()
        .find(|(needle, _)| hint.contains(needle))
        .map_or(ChromeChannel::Unknown, |(_, channel)| channel)
    }
}

/// The binary chosen for launch.
#[derive(Debug, Clone)]
pub struct ChromeInfo {
    pub path: PathBuf,
    pub channel: ChromeChannel,
    /// From `--version`, when the binary answered it.
    pub version: Option<String>,
}

#[cfg(target_os = "macos")]
const INSTALL_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/homebrew/bin/chromium",
    "/Applications/Google Chrome Beta.app/Contents/MacOS/Google Chrome Beta",
    "/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
];

#[cfg(target_os = "linux")]
const INSTALL_PATHS: &[&str] = &[
    "/usr/bin/google-chrome-stable",
    "/usr/bin/google-chrome",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/usr/bin/google-chrome-beta",
    "/usr/bin/google-chrome-unstable",
];

#[cfg(target_os = "windows")]
const INSTALL_PATHS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
const INSTALL_PATHS: &[&str] = &[];

const PATH_NAMES: &[&str] = &[
    "google-chrome-stable",
    "google-chrome",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// First dotted version number in `chrome --version` output.
pub fn parse_version(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .find(|token| {
            token.contains('.')
                && token.starts_with(|c: char| c.is_ascii_digit())
                && token.chars().all(|c| c.is_ascii_digit() || c == '.')
        })
        .map(str::to_string)
}

/// Pick the most preferred channel; ties keep the earlier candidate.
fn pick_preferred(candidates: impl IntoIterator<Item = PathBuf>) -> Option<(PathBuf, ChromeChannel)> {
    candidates
        .into_iter()
        .map(|path| {
            let channel = ChromeChannel::classify(&path.to_string_lossy());
            (path, channel)
        })
        .enumerate()
        .min_by_key(|(index, (_, channel))| (*channel, *index))
        .map(|(_, found)| found)
}

fn on_path(name: &str) -> Option<PathBuf> {
    let dirs = std::env::var_os("PATH")?;
    std::env::split_paths(&dirs)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

fn query_version(path: &Path) -> Option<String> {
    match Command::new(path).arg("--version").output() {
        Ok(output) => parse_version(&String::from_utf8_lossy(&output.stdout)),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "chrome --version failed");
            None
        }
    }
}

/// Locate the binary to launch. `configured` must exist when given; a bare
/// name such as `chromium` is also looked up on `PATH`.
pub fn discover_chrome(configured: Option<&Path>) -> Result<ChromeInfo, BrowserDiscoveryError> {
    let path = match configured {
        Some(path) if path.exists() => path.to_path_buf(),
        Some(path) => path
            .to_str()
            .filter(|name| !name.contains(std::path::MAIN_SEPARATOR))
            .and_then(on_path)
            .ok_or_else(|| BrowserDiscoveryError::ConfiguredMissing {
                path: path.to_path_buf(),
            })?,
        None => {
            let installed = INSTALL_PATHS.iter().map(PathBuf::from).filter(|p| p.exists());
            let searched = PATH_NAMES.iter().filter_map(|name| on_path(name));
            pick_preferred(installed.chain(searched))
                .ok_or(BrowserDiscoveryError::NotFound)?
                .0
        }
    };

    let version = query_version(&path);
    let channel = ChromeChannel::classify(&path.to_string_lossy());
    tracing::info!(path = %path.display(), version = ?version, channel = ?channel, "using Chrome binary");
    Ok(ChromeInfo {
        path,
        channel,
        version,
    })
}
