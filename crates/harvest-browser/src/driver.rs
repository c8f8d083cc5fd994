//! High-level page driver wrapping the CDP client.
//!
//! Provides the page operations the harvesting engine needs: navigation
//! with load waiting, JavaScript evaluation, selector polling, clicking,
//! form filling, scrolling, cookie/storage access, and diagnostic captures.
//!
//! Selectors are always embedded into page expressions as JSON string
//! literals, so arbitrary selector text cannot break out of the expression.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use crate::cdp::CdpClient;
use crate::error::BrowserError;
use crate::storage::{self, CookieInfo, StorageType};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Opaque handle to a DOM node, as returned by CDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub i64);

/// Bounding box of a DOM element in CSS pixels.
#[derive(Debug, Clone)]
pub struct ElementBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementBox {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Default bound for page loads triggered by `goto`/`reload`.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// BrowserDriver
// ---------------------------------------------------------------------------

/// Driver for one page target.
pub struct BrowserDriver {
    client: CdpClient,
    load_timeout: Duration,
}

impl BrowserDriver {
    /// Wrap a connected page-level client and enable the Page, DOM,
    /// Runtime, and Network domains.
    pub async fn attach(client: CdpClient) -> Result<Self, BrowserError> {
        for domain in ["Page", "DOM", "Runtime", "Network"] {
            client.enable_domain(domain).await?;
        }
        Ok(Self {
            client,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
        })
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// Navigate to `url` and wait for `Page.loadEventFired`.
    ///
    /// Navigation-level failures (e.g. `net::ERR_NAME_NOT_RESOLVED`) surface
    /// as [`BrowserError::NavigationFailed`].
    pub async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        // Subscribe first so a fast load event is not missed.
        let mut events = self.client.subscribe();

        let result = self
            .client
            .send_command("Page.navigate", build_navigate_params(url))
            .await?;

        if let Some(error_text) = result.get("errorText").and_then(Value::as_str) {
            return Err(BrowserError::NavigationFailed {
                url: url.to_string(),
                reason: error_text.to_string(),
            });
        }

        // Same-document navigations (fragment changes) have no loader and
        // fire no load event.
        if result.get("loaderId").is_none() {
            return Ok(());
        }

        wait_for_event(&mut events, "Page.loadEventFired", self.load_timeout).await
    }

    /// Reload the current page and wait for it to load.
    pub async fn reload(&self) -> Result<(), BrowserError> {
        let mut events = self.client.subscribe();
        self.client
            .send_command("Page.reload", serde_json::json!({ "ignoreCache": false }))
            .await?;
        wait_for_event(&mut events, "Page.loadEventFired", self.load_timeout).await
    }

    // -----------------------------------------------------------------------
    // JavaScript evaluation
    // -----------------------------------------------------------------------

    /// Evaluate an expression in the page and return its JSON value.
    ///
    /// Promises are awaited. A thrown exception is returned as
    /// [`BrowserError::JsException`].
    pub async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError> {
        let result = self
            .client
            .send_command("Runtime.evaluate", build_evaluate_params(expression))
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let message = exception
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(Value::as_str)
                .or_else(|| exception.get("text").and_then(Value::as_str))
                .unwrap_or("unknown exception")
                .to_string();
            return Err(BrowserError::JsException { message });
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Evaluate an expression and deserialize its value.
    pub async fn evaluate_as<T: DeserializeOwned>(&self, expression: &str) -> Result<T, BrowserError> {
        let value = self.evaluate(expression).await?;
        serde_json::from_value(value).map_err(|e| BrowserError::Protocol {
            detail: format!("unexpected evaluation result: {e}"),
        })
    }

    // -----------------------------------------------------------------------
    // Selector queries
    // -----------------------------------------------------------------------

    /// Number of elements currently matching `selector`.
    pub async fn count(&self, selector: &str) -> Result<usize, BrowserError> {
        let expr = format!("document.querySelectorAll({}).length", js_str(selector));
        self.evaluate_as(&expr).await
    }

    /// `innerText` of the first element matching `selector`, if any.
    pub async fn inner_text(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        let expr = format!(
            "(() => {{ const el = document.querySelector({}); return el ? el.innerText : null; }})()",
            js_str(selector)
        );
        self.evaluate_as(&expr).await
    }

    /// Poll a boolean page expression until it is true or `timeout` elapses.
    ///
    /// Returns `Ok(false)` on timeout; only transport and script failures
    /// are errors.
    pub async fn wait_until(
        &self,
        predicate: &str,
        timeout: Duration,
        poll: Duration,
    ) -> Result<bool, BrowserError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.evaluate(predicate).await?.as_bool().unwrap_or(false) {
                return Ok(true);
            }
            if tokio::time::Instant::now() + poll > deadline {
                return Ok(false);
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Wait for an element to become visible. `Ok(false)` on timeout.
    pub async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
        poll: Duration,
    ) -> Result<bool, BrowserError> {
        self.wait_until(&visible_expression(selector), timeout, poll).await
    }

    /// Wait for more than `current` elements to match `selector`.
    pub async fn wait_for_count_above(
        &self,
        selector: &str,
        current: usize,
        timeout: Duration,
        poll: Duration,
    ) -> Result<bool, BrowserError> {
        let predicate = format!(
            "document.querySelectorAll({}).length > {current}",
            js_str(selector)
        );
        self.wait_until(&predicate, timeout, poll).await
    }

    async fn get_document_root(&self) -> Result<i64, BrowserError> {
        let result = self
            .client
            .send_command("DOM.getDocument", serde_json::json!({ "depth": 0 }))
            .await?;

        result
            .get("root")
            .and_then(|r| r.get("nodeId"))
            .and_then(Value::as_i64)
            .ok_or_else(|| BrowserError::Protocol {
                detail: "DOM.getDocument did not return a root nodeId".to_string(),
            })
    }

    /// Resolve the first element matching `selector` to a DOM node id.
    pub async fn query_selector(&self, selector: &str) -> Result<Option<NodeId>, BrowserError> {
        let root_id = self.get_document_root().await?;
        let result = self
            .client
            .send_command(
                "DOM.querySelector",
                serde_json::json!({ "nodeId": root_id, "selector": selector }),
            )
            .await?;

        match result.get("nodeId").and_then(Value::as_i64).unwrap_or(0) {
            0 => Ok(None),
            id => Ok(Some(NodeId(id))),
        }
    }

    // -----------------------------------------------------------------------
    // Element interaction
    // -----------------------------------------------------------------------

    async fn get_element_box(&self, node_id: NodeId) -> Result<ElementBox, BrowserError> {
        let result = self
            .client
            .send_command("DOM.getBoxModel", serde_json::json!({ "nodeId": node_id.0 }))
            .await?;

        let quad: Vec<f64> = result
            .get("model")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_array)
            .ok_or_else(|| BrowserError::Protocol {
                detail: "DOM.getBoxModel did not return a content quad".to_string(),
            })?
            .iter()
            .filter_map(Value::as_f64)
            .collect();

        let bbox = box_from_quad(&quad).ok_or_else(|| BrowserError::Protocol {
            detail: format!("content quad has {} usable values, expected 8", quad.len()),
        })?;

        if bbox.width <= 0.0 || bbox.height <= 0.0 {
            return Err(BrowserError::NotClickable {
                reason: format!("element has zero size: {}x{}", bbox.width, bbox.height),
            });
        }
        Ok(bbox)
    }

    async fn require_node(&self, selector: &str) -> Result<NodeId, BrowserError> {
        self.query_selector(selector)
            .await?
            .ok_or_else(|| BrowserError::ElementNotFound {
                selector: selector.to_string(),
            })
    }

    /// Click the first element matching `selector` at its center point.
    ///
    /// The element is scrolled into view first so the dispatched mouse
    /// events land on it.
    pub async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let node_id = self.require_node(selector).await?;

        self.client
            .send_command(
                "DOM.scrollIntoViewIfNeeded",
                serde_json::json!({ "nodeId": node_id.0 }),
            )
            .await?;

        let (cx, cy) = self.get_element_box(node_id).await?.center();

        for event_type in ["mouseMoved", "mousePressed", "mouseReleased"] {
            self.client
                .send_command("Input.dispatchMouseEvent", build_click_params(cx, cy, event_type))
                .await?;
        }
        Ok(())
    }

    /// Replace the value of an input matching `selector` with `text`.
    ///
    /// The field is focused and cleared, then the text is inserted as a
    /// single `Input.insertText`, which fires the same input events as
    /// typing.
    pub async fn fill(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        let node_id = self.require_node(selector).await?;

        self.client
            .send_command("DOM.focus", serde_json::json!({ "nodeId": node_id.0 }))
            .await?;

        let clear = format!(
            "(() => {{ const el = document.querySelector({}); if (el && 'value' in el) {{ el.value = ''; el.dispatchEvent(new Event('input', {{ bubbles: true }})); }} return true; }})()",
            js_str(selector)
        );
        self.evaluate(&clear).await?;

        self.client
            .send_command("Input.insertText", serde_json::json!({ "text": text }))
            .await?;
        Ok(())
    }

    /// Scroll the window forward by `viewports` times its height.
    pub async fn scroll_by_viewports(&self, viewports: f64) -> Result<(), BrowserError> {
        let expr = format!("window.scrollBy(0, Math.round(window.innerHeight * {viewports})); true");
        self.evaluate(&expr).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Cookies and storage
    // -----------------------------------------------------------------------

    /// Every cookie in this page's browser context.
    pub async fn cookies(&self) -> Result<Vec<CookieInfo>, BrowserError> {
        let response = self
            .client
            .send_command("Network.getAllCookies", serde_json::json!({}))
            .await?;
        storage::parse_cookies_response(&response)
    }

    pub async fn set_cookies(&self, cookies: &[CookieInfo]) -> Result<(), BrowserError> {
        if cookies.is_empty() {
            return Ok(());
        }
        self.client
            .send_command("Network.setCookies", storage::build_set_cookies_params(cookies))
            .await?;
        Ok(())
    }

    /// All entries of the given storage for the current document's origin.
    pub async fn read_storage(&self, storage_type: StorageType) -> Result<BTreeMap<String, String>, BrowserError> {
        let value = self
            .evaluate(&storage::read_storage_expression(storage_type))
            .await?;
        storage::parse_storage_dump(&value)
    }

    pub async fn write_storage(
        &self,
        storage_type: StorageType,
        entries: &BTreeMap<String, String>,
    ) -> Result<(), BrowserError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.evaluate(&storage::write_storage_expression(storage_type, entries))
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Page content and captures
    // -----------------------------------------------------------------------

    /// PNG screenshot of the current viewport.
    pub async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        let result = self
            .client
            .send_command("Page.captureScreenshot", serde_json::json!({ "format": "png" }))
            .await?;

        let data_b64 = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol {
                detail: "Page.captureScreenshot did not return 'data' field".to_string(),
            })?;

        B64.decode(data_b64).map_err(|e| BrowserError::Protocol {
            detail: format!("failed to decode screenshot base64: {e}"),
        })
    }

    /// Full HTML of the current document.
    pub async fn get_html(&self) -> Result<String, BrowserError> {
        self.evaluate_as("document.documentElement.outerHTML").await
    }

    /// `window.location.origin`; `"null"` for opaque origins such as
    /// `about:blank`.
    pub async fn get_origin(&self) -> Result<String, BrowserError> {
        self.evaluate_as("window.location.origin").await
    }
}

/// Wait for a named event on an already-subscribed receiver.
async fn wait_for_event(
    events: &mut tokio::sync::broadcast::Receiver<crate::cdp::CdpEvent>,
    method: &str,
    timeout: Duration,
) -> Result<(), BrowserError> {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(evt) if evt.method == method => return Ok(()),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event subscriber lagged");
                }
                Err(RecvError::Closed) => {
                    return Err(BrowserError::Protocol {
                        detail: format!("connection closed while waiting for {method}"),
                    })
                }
            }
        }
    };
    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| BrowserError::LoadTimeout { after: timeout })?
}

// ---------------------------------------------------------------------------
// Parameter and expression builders
// ---------------------------------------------------------------------------

/// Encode `s` as a JavaScript string literal.
pub fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Expression that is true when the first match of `selector` is rendered
/// (has layout boxes and is not `visibility: hidden`).
pub fn visible_expression(selector: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({}); if (!el) return false; const s = window.getComputedStyle(el); return s.visibility !== 'hidden' && el.getClientRects().length > 0; }})()",
        js_str(selector)
    )
}

pub fn build_navigate_params(url: &str) -> Value {
    serde_json::json!({ "url": url })
}

pub fn build_evaluate_params(expression: &str) -> Value {
    serde_json::json!({
        "expression": expression,
        "returnByValue": true,
        "awaitPromise": true,
    })
}

pub fn build_click_params(x: f64, y: f64, event_type: &str) -> Value {
    serde_json::json!({
        "type": event_type,
        "x": x,
        "y": y,
        "button": "left",
        "clickCount": 1,
    })
}

/// Bounding box of a content quad (8 values: x1,y1 .. x4,y4).
pub fn box_from_quad(quad: &[f64]) -> Option<ElementBox> {
    if quad.len() < 8 {
        return None;
    }
    let xs = quad.iter().step_by(2).copied();
    let ys = quad.iter().skip(1).step_by(2).copied();
    let (min_x, max_x) = xs.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let (min_y, max_y) = ys.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    Some(ElementBox {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
