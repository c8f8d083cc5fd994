//! The browser seam the engine is written against.
//!
//! [`Page`] is the set of page operations the login, session, navigation,
//! and collection code needs. Every wait is bounded by the caller's timeout
//! and reports absence as `Ok(false)`, never as an error.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use harvest_browser::{BrowserError, CookieInfo, StorageType};
use harvest_types::FieldSelectors;

use crate::extract::CardSnapshot;

/// One browser tab inside one browsing context.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate and wait for the load event.
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    async fn reload(&self) -> Result<(), BrowserError>;

    /// Wait up to `timeout` for `selector` to become visible.
    async fn probe(&self, selector: &str, timeout: Duration) -> Result<bool, BrowserError>;

    async fn click(&self, selector: &str) -> Result<(), BrowserError>;

    /// Replace the value of an input.
    async fn fill(&self, selector: &str, text: &str) -> Result<(), BrowserError>;

    /// Text of the first match, `None` if nothing matches.
    async fn inner_text(&self, selector: &str) -> Result<Option<String>, BrowserError>;

    /// Number of elements currently matching `selector`.
    async fn count(&self, selector: &str) -> Result<usize, BrowserError>;

    /// Raw texts of every card at position `from` or later, in DOM order.
    /// Field lookups are relative to each card.
    async fn read_cards(
        &self,
        card_selector: &str,
        fields: &FieldSelectors,
        from: usize,
    ) -> Result<Vec<CardSnapshot>, BrowserError>;

    async fn scroll_by_viewports(&self, viewports: f64) -> Result<(), BrowserError>;

    /// Wait up to `timeout` for more than `current` elements to match.
    async fn wait_for_count_above(
        &self,
        selector: &str,
        current: usize,
        timeout: Duration,
    ) -> Result<bool, BrowserError>;

    /// Every cookie in the browsing context.
    async fn cookies(&self) -> Result<Vec<CookieInfo>, BrowserError>;

    async fn set_cookies(&self, cookies: &[CookieInfo]) -> Result<(), BrowserError>;

    /// Storage of the current document's origin.
    async fn read_storage(
        &self,
        storage_type: StorageType,
    ) -> Result<BTreeMap<String, String>, BrowserError>;

    async fn write_storage(
        &self,
        storage_type: StorageType,
        entries: &BTreeMap<String, String>,
    ) -> Result<(), BrowserError>;

    /// Origin of the current document; `"null"` when opaque.
    async fn origin(&self) -> Result<String, BrowserError>;

    /// PNG of the viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError>;

    async fn html(&self) -> Result<String, BrowserError>;
}

/// Source of fresh browsing contexts. Each new context starts with no
/// cookies and empty storage.
#[async_trait]
pub trait ContextFactory: Send + Sync {
    type Page: Page;

    async fn new_context(&self) -> Result<Self::Page, BrowserError>;
}
