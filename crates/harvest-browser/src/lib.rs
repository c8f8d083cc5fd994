//! Chrome DevTools Protocol plumbing for harvest.
//!
//! - **`cdp`**: WebSocket client with command/response correlation and an
//!   event broadcast feed.
//! - **`driver`**: `BrowserDriver`, the page-level API (navigation,
//!   evaluation, selector polling, click/fill, scrolling, cookies, storage,
//!   screenshots).
//! - **`launcher`**: starts Chrome with remote debugging and creates
//!   isolated browser contexts.
//! - **`discovery`**: locates a Chrome/Chromium binary.
//! - **`storage`**: cookie and web-storage parameter builders and redaction.
//!
//! ```ignore
//! use harvest_browser::{ChromeProcess, LaunchOptions};
//!
//! let chrome = ChromeProcess::launch(&LaunchOptions::default()).await?;
//! let page = chrome.new_context().await?;
//! page.goto("https://example.com").await?;
//! let cards = page.count("div.card").await?;
//! ```

pub mod cdp;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod launcher;
pub mod storage;

pub use cdp::{CdpClient, CdpEvent};
pub use discovery::{discover_chrome, BrowserDiscoveryError, ChromeChannel, ChromeInfo};
pub use driver::{BrowserDriver, NodeId};
pub use error::BrowserError;
pub use launcher::{ChromeProcess, LaunchOptions};
pub use storage::{CookieInfo, StorageType};
