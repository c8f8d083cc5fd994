//! [`Page`] and [`ContextFactory`] backed by a real Chrome over CDP.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use harvest_browser::{BrowserDriver, BrowserError, ChromeProcess, CookieInfo, StorageType};
use harvest_types::FieldSelectors;

use crate::extract::{card_read_expression, CardSnapshot};
use crate::page::{ContextFactory, Page};

/// A CDP page plus the interval used when polling for elements.
pub struct DriverPage {
    driver: BrowserDriver,
    poll: Duration,
}

impl DriverPage {
    pub fn new(driver: BrowserDriver, poll: Duration) -> Self {
        Self { driver, poll }
    }
}

#[async_trait]
impl Page for DriverPage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.driver.goto(url).await
    }

    async fn reload(&self) -> Result<(), BrowserError> {
        self.driver.reload().await
    }

    async fn probe(&self, selector: &str, timeout: Duration) -> Result<bool, BrowserError> {
        self.driver.wait_for_selector(selector, timeout, self.poll).await
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        self.driver.click(selector).await
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        self.driver.fill(selector, text).await
    }

    async fn inner_text(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        self.driver.inner_text(selector).await
    }

    async fn count(&self, selector: &str) -> Result<usize, BrowserError> {
        self.driver.count(selector).await
    }

    async fn read_cards(
        &self,
        card_selector: &str,
        fields: &FieldSelectors,
        from: usize,
    ) -> Result<Vec<CardSnapshot>, BrowserError> {
        self.driver
            .evaluate_as(&card_read_expression(card_selector, fields, from))
            .await
    }

    async fn scroll_by_viewports(&self, viewports: f64) -> Result<(), BrowserError> {
        self.driver.scroll_by_viewports(viewports).await
    }

    async fn wait_for_count_above(
        &self,
        selector: &str,
        current: usize,
        timeout: Duration,
    ) -> Result<bool, BrowserError> {
        self.driver
            .wait_for_count_above(selector, current, timeout, self.poll)
            .await
    }

    async fn cookies(&self) -> Result<Vec<CookieInfo>, BrowserError> {
        self.driver.cookies().await
    }

    async fn set_cookies(&self, cookies: &[CookieInfo]) -> Result<(), BrowserError> {
        self.driver.set_cookies(cookies).await
    }

    async fn read_storage(
        &self,
        storage_type: StorageType,
    ) -> Result<BTreeMap<String, String>, BrowserError> {
        self.driver.read_storage(storage_type).await
    }

    async fn write_storage(
        &self,
        storage_type: StorageType,
        entries: &BTreeMap<String, String>,
    ) -> Result<(), BrowserError> {
        self.driver.write_storage(storage_type, entries).await
    }

    async fn origin(&self) -> Result<String, BrowserError> {
        self.driver.get_origin().await
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        self.driver.screenshot().await
    }

    async fn html(&self) -> Result<String, BrowserError> {
        self.driver.get_html().await
    }
}

/// Isolated browser contexts from a running Chrome.
pub struct ChromeContexts<'a> {
    chrome: &'a ChromeProcess,
    poll: Duration,
}

impl<'a> ChromeContexts<'a> {
    pub fn new(chrome: &'a ChromeProcess, poll: Duration) -> Self {
        Self { chrome, poll }
    }
}

#[async_trait]
impl<'a> ContextFactory for ChromeContexts<'a> {
    type Page = DriverPage;

    async fn new_context(&self) -> Result<DriverPage, BrowserError> {
        let driver = self.chrome.new_context().await?;
        Ok(DriverPage::new(driver, self.poll))
    }
}
