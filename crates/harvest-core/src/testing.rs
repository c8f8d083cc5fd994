//! Scripted fakes of [`Page`] and [`ContextFactory`].
//!
//! A [`FakePage`] holds a set of visible selectors, a cookie jar, per-origin
//! storage, and a card listing that grows by one scripted batch per scroll.
//! Every mutating call is recorded so tests can assert on order.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use harvest_browser::{BrowserError, CookieInfo, StorageType};
use harvest_types::FieldSelectors;
use url::Url;

use crate::extract::CardSnapshot;
use crate::page::{ContextFactory, Page};

/// A recorded page interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum PageCall {
    Goto(String),
    Reload,
    Fill { selector: String, value: String },
    Click(String),
    Scroll,
    SetCookies(usize),
    WriteStorage(StorageType, usize),
}

#[derive(Default)]
struct FakeState {
    visible: HashSet<String>,
    texts: HashMap<String, String>,
    html: String,
    calls: Vec<PageCall>,
    reads: Vec<usize>,
    jar: Vec<CookieInfo>,
    goto_cookies: Vec<CookieInfo>,
    origin: Option<String>,
    local: HashMap<String, BTreeMap<String, String>>,
    session: BTreeMap<String, String>,
    card_selector: String,
    rendered: Vec<CardSnapshot>,
    pending: VecDeque<Vec<CardSnapshot>>,
    /// Selector -> message for element waits that fail outright.
    wait_faults: HashMap<String, String>,
    /// Selector -> message for clicks and fills that fail outright.
    action_faults: HashMap<String, String>,
}

impl FakeState {
    fn fault(faults: &HashMap<String, String>, selector: &str) -> Result<(), BrowserError> {
        match faults.get(selector) {
            Some(message) => Err(BrowserError::JsException {
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn count(&self, selector: &str) -> usize {
        if !self.card_selector.is_empty() && selector == self.card_selector {
            self.rendered.len()
        } else {
            usize::from(self.visible.contains(selector) || self.texts.contains_key(selector))
        }
    }
}

/// In-memory page. Clones share state.
#[derive(Clone, Default)]
pub struct FakePage {
    state: Arc<Mutex<FakeState>>,
}

impl std::fmt::Debug for FakePage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("FakePage")
            .field("origin", &state.origin)
            .field("calls", &state.calls.len())
            .field("rendered", &state.rendered.len())
            .finish()
    }
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make selectors visible.
    pub fn show<'s>(&self, selectors: impl IntoIterator<Item = &'s str>) {
        let mut state = self.state();
        state.visible.extend(selectors.into_iter().map(str::to_string));
    }

    /// Visible element with the given inner text.
    pub fn set_text(&self, selector: &str, text: &str) {
        self.state().texts.insert(selector.to_string(), text.to_string());
    }

    pub fn set_html(&self, html: &str) {
        self.state().html = html.to_string();
    }

    /// Cookie the "server" sets on every navigation.
    pub fn on_goto_set_cookie(&self, cookie: CookieInfo) {
        self.state().goto_cookies.push(cookie);
    }

    /// Cards under `card_selector`. The first batch is rendered up front;
    /// each scroll renders the next one.
    pub fn set_listing(&self, card_selector: &str, batches: Vec<Vec<CardSnapshot>>) {
        let mut state = self.state();
        let mut batches: VecDeque<_> = batches.into();
        state.card_selector = card_selector.to_string();
        state.rendered = batches.pop_front().unwrap_or_default();
        state.pending = batches;
    }

    /// Make `probe(selector)` fail with a script error, as it does while
    /// the page is mid-navigation.
    pub fn fail_wait(&self, selector: &str, message: &str) {
        self.state()
            .wait_faults
            .insert(selector.to_string(), message.to_string());
    }

    /// Make `click`/`fill` on `selector` fail with a script error.
    pub fn fail_action(&self, selector: &str, message: &str) {
        self.state()
            .action_faults
            .insert(selector.to_string(), message.to_string());
    }

    pub fn calls(&self) -> Vec<PageCall> {
        self.state().calls.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PageCall::Click(selector) => Some(selector),
                _ => None,
            })
            .collect()
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PageCall::Fill { selector, value } => Some((selector, value)),
                _ => None,
            })
            .collect()
    }

    pub fn scrolls(&self) -> usize {
        self.calls().iter().filter(|c| **c == PageCall::Scroll).count()
    }

    /// `from` positions passed to `read_cards`, in call order.
    pub fn card_reads(&self) -> Vec<usize> {
        self.state().reads.clone()
    }

    pub fn local_storage(&self, origin: &str) -> BTreeMap<String, String> {
        self.state().local.get(origin).cloned().unwrap_or_default()
    }

    pub fn cookie_jar(&self) -> Vec<CookieInfo> {
        self.state().jar.clone()
    }
}

fn merge_cookies(jar: &mut Vec<CookieInfo>, cookies: &[CookieInfo]) {
    for cookie in cookies {
        jar.retain(|c| !(c.name == cookie.name && c.domain == cookie.domain));
        jar.push(cookie.clone());
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        let parsed = Url::parse(url).map_err(|e| BrowserError::NavigationFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let mut state = self.state();
        state.calls.push(PageCall::Goto(url.to_string()));
        state.origin = match parsed.scheme() {
            "http" | "https" => Some(parsed.origin().ascii_serialization()),
            _ => None,
        };
        let set = state.goto_cookies.clone();
        merge_cookies(&mut state.jar, &set);
        Ok(())
    }

    async fn reload(&self) -> Result<(), BrowserError> {
        self.state().calls.push(PageCall::Reload);
        Ok(())
    }

    async fn probe(&self, selector: &str, _timeout: Duration) -> Result<bool, BrowserError> {
        let state = self.state();
        FakeState::fault(&state.wait_faults, selector)?;
        Ok(state.count(selector) > 0)
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let mut state = self.state();
        FakeState::fault(&state.action_faults, selector)?;
        if state.count(selector) == 0 {
            return Err(BrowserError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        state.calls.push(PageCall::Click(selector.to_string()));
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        let mut state = self.state();
        FakeState::fault(&state.action_faults, selector)?;
        state.calls.push(PageCall::Fill {
            selector: selector.to_string(),
            value: text.to_string(),
        });
        Ok(())
    }

    async fn inner_text(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        Ok(self.state().texts.get(selector).cloned())
    }

    async fn count(&self, selector: &str) -> Result<usize, BrowserError> {
        Ok(self.state().count(selector))
    }

    async fn read_cards(
        &self,
        _card_selector: &str,
        _fields: &FieldSelectors,
        from: usize,
    ) -> Result<Vec<CardSnapshot>, BrowserError> {
        let mut state = self.state();
        state.reads.push(from);
        Ok(state.rendered.iter().skip(from).cloned().collect())
    }

    async fn scroll_by_viewports(&self, _viewports: f64) -> Result<(), BrowserError> {
        let mut state = self.state();
        state.calls.push(PageCall::Scroll);
        if let Some(batch) = state.pending.pop_front() {
            state.rendered.extend(batch);
        }
        Ok(())
    }

    async fn wait_for_count_above(
        &self,
        selector: &str,
        current: usize,
        timeout: Duration,
    ) -> Result<bool, BrowserError> {
        let before = self.state().count(selector);
        if before > current {
            return Ok(true);
        }
        tokio::time::sleep(timeout).await;
        let after = self.state().count(selector);
        Ok(after > current)
    }

    async fn cookies(&self) -> Result<Vec<CookieInfo>, BrowserError> {
        Ok(self.state().jar.clone())
    }

    async fn set_cookies(&self, cookies: &[CookieInfo]) -> Result<(), BrowserError> {
        let mut state = self.state();
        state.calls.push(PageCall::SetCookies(cookies.len()));
        merge_cookies(&mut state.jar, cookies);
        Ok(())
    }

    async fn read_storage(
        &self,
        storage_type: StorageType,
    ) -> Result<BTreeMap<String, String>, BrowserError> {
        let state = self.state();
        Ok(match storage_type {
            StorageType::LocalStorage => state
                .origin
                .as_ref()
                .and_then(|o| state.local.get(o).cloned())
                .unwrap_or_default(),
            StorageType::SessionStorage => state.session.clone(),
        })
    }

    async fn write_storage(
        &self,
        storage_type: StorageType,
        entries: &BTreeMap<String, String>,
    ) -> Result<(), BrowserError> {
        let mut state = self.state();
        let Some(origin) = state.origin.clone() else {
            return Err(BrowserError::JsException {
                message: "SecurityError: storage is not available on an opaque origin".to_string(),
            });
        };
        state
            .calls
            .push(PageCall::WriteStorage(storage_type, entries.len()));
        let target = match storage_type {
            StorageType::LocalStorage => state.local.entry(origin).or_default(),
            StorageType::SessionStorage => &mut state.session,
        };
        target.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn origin(&self) -> Result<String, BrowserError> {
        Ok(self.state().origin.clone().unwrap_or_else(|| "null".to_string()))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn html(&self) -> Result<String, BrowserError> {
        Ok(self.state().html.clone())
    }
}

/// Hands out queued pages, then blank ones.
#[derive(Debug, Default)]
pub struct FakeContexts {
    pages: Mutex<VecDeque<FakePage>>,
    created: AtomicUsize,
}

impl FakeContexts {
    pub fn with_pages(pages: impl IntoIterator<Item = FakePage>) -> Self {
        Self {
            pages: Mutex::new(pages.into_iter().collect()),
            created: AtomicUsize::new(0),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextFactory for FakeContexts {
    type Page = FakePage;

    async fn new_context(&self) -> Result<FakePage, BrowserError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let next = self
            .pages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        Ok(next.unwrap_or_default())
    }
}
