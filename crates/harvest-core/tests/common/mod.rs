//! Shared helpers for integration tests.
//!
//! Each integration test file compiles common/ as its own module, so not
//! every helper is used in every file.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use harvest_browser::CookieInfo;
use harvest_core::testing::FakePage;
use harvest_core::{CardSnapshot, CollectorSettings, DetailText, MemoryRunLog};
use harvest_types::{FieldSelectors, HarvestConfig};

pub const CARD: &str = "div.card";
pub const TOTAL: &str = "div.total";

pub const CONFIG: &str = r##"
base_url = "https://shop.example.com/app"
login_path = "/login"

[credentials]
username = "alice"
password = "hunter2"

[selectors.login]
username = "#user"
password = "#pass"
submit = "#submit"
interstitials = ["#whats-new"]
success_indicator = "#dashboard"
"##;

/// Parsed config with its files placed under `dir`.
pub fn config_in(dir: &Path) -> HarvestConfig {
    let mut config = HarvestConfig::from_toml(CONFIG).expect("test config should parse");
    config.session_file = dir.join("state/session.json");
    config.diagnostics_dir = dir.join("diagnostics");
    config
}

pub fn memory_log() -> Arc<MemoryRunLog> {
    Arc::new(MemoryRunLog::new())
}

/// A page on which the configured login succeeds and the server sets a
/// session cookie.
pub fn login_page() -> FakePage {
    let page = FakePage::new();
    page.show(["#user", "#pass", "#submit", "#dashboard"]);
    page.on_goto_set_cookie(CookieInfo {
        name: "session".to_string(),
        value: "fresh-token".to_string(),
        domain: "shop.example.com".to_string(),
        path: "/".to_string(),
        expires: None,
        http_only: true,
        secure: true,
        same_site: Some("Lax".to_string()),
    });
    page
}

/// A card as the listing renders it.
pub fn card(id: &str) -> CardSnapshot {
    CardSnapshot {
        id: Some(format!("ID: {id}")),
        title: Some(format!("Product {id}")),
        category: Some("Hardware".to_string()),
        details: vec![DetailText {
            label: Some("Cost:".to_string()),
            value: Some("$10.00".to_string()),
        }],
    }
}

/// Cards `p{start}..=p{end}`.
pub fn cards(start: usize, end: usize) -> Vec<CardSnapshot> {
    (start..=end).map(|i| card(&format!("p{i}"))).collect()
}

/// A page showing `total_text` and rendering `batches`, one per scroll.
pub fn listing_page(total_text: &str, batches: Vec<Vec<CardSnapshot>>) -> FakePage {
    let page = FakePage::new();
    page.set_text(TOTAL, total_text);
    page.set_listing(CARD, batches);
    page
}

/// Collector settings with millisecond waits.
pub fn fast_settings(fallback_total: usize) -> CollectorSettings {
    CollectorSettings {
        card_selector: CARD.to_string(),
        total_selector: TOTAL.to_string(),
        fields: FieldSelectors::default(),
        total_timeout: Duration::from_millis(5),
        scroll_viewports: 2.0,
        scroll_pause: Duration::from_millis(1),
        growth_timeout: Duration::from_millis(20),
        stagnation_limit: 1,
        fallback_total,
    }
}

pub fn ids(records: &[harvest_types::ExtractionRecord]) -> Vec<String> {
    records.iter().map(|r| r.id().to_string()).collect()
}
