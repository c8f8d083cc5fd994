//! Scroll-driven incremental collection.
//!
//! The listing announces its size ("Showing 20 of 40 products") and renders
//! more cards as the viewport moves. Each round extracts only cards past
//! the cursor, scrolls, and waits for the card count to grow. Collection
//! ends when the target is reached or growth stalls.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use harvest_browser::BrowserError;
use harvest_types::{ExtractionRecord, FieldSelectors, HarvestConfig};
use regex::Regex;

use crate::extract::extract;
use crate::log::RunLog;
use crate::page::Page;

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// Where the record target came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalTarget {
    /// Parsed from the page's total indicator.
    Announced(usize),
    /// Configured maximum, used when the indicator was unreadable.
    Fallback(usize),
}

impl TotalTarget {
    pub fn value(self) -> usize {
        match self {
            TotalTarget::Announced(n) | TotalTarget::Fallback(n) => n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialReason {
    /// The card count stopped growing for `rounds` consecutive rounds.
    Stagnated { rounds: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectStatus {
    Complete,
    Partial { reason: PartialReason },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectOutcome {
    /// Unique by id, in first-encounter order, never longer than the target.
    pub records: Vec<ExtractionRecord>,
    pub status: CollectStatus,
    pub target: TotalTarget,
}

impl CollectOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == CollectStatus::Complete
    }
}

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub card_selector: String,
    pub total_selector: String,
    pub fields: FieldSelectors,
    /// Bound on waiting for the total indicator to appear.
    pub total_timeout: Duration,
    pub scroll_viewports: f64,
    pub scroll_pause: Duration,
    pub growth_timeout: Duration,
    pub stagnation_limit: u32,
    pub fallback_total: usize,
}

impl CollectorSettings {
    pub fn from_config(config: &HarvestConfig) -> Self {
        let timing = &config.timing;
        Self {
            card_selector: config.selectors.listing.card.clone(),
            total_selector: config.selectors.listing.total_count.clone(),
            fields: config.selectors.fields.clone(),
            total_timeout: timing.required_step_timeout(),
            scroll_viewports: timing.scroll_viewports,
            scroll_pause: timing.scroll_pause(),
            growth_timeout: timing.growth_timeout(),
            stagnation_limit: timing.stagnation_limit.max(1),
            fallback_total: timing.fallback_total,
        }
    }
}

/// Progress of one collection run.
#[derive(Debug, Default)]
struct CollectionState {
    seen: HashSet<String>,
    records: Vec<ExtractionRecord>,
    /// Card positions already extracted.
    cursor: usize,
    stagnant_rounds: u32,
}

impl CollectionState {
    /// Keep `record` unless its id is empty or already seen.
    fn accept(&mut self, record: ExtractionRecord) -> bool {
        let id = record.id();
        if id.is_empty() || self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string());
        self.records.push(record);
        true
    }
}

pub struct IncrementalCollector {
    settings: CollectorSettings,
    log: Arc<dyn RunLog>,
}

impl IncrementalCollector {
    pub fn new(settings: CollectorSettings, log: Arc<dyn RunLog>) -> Self {
        Self { settings, log }
    }

    /// Collect every reachable card on `page`.
    ///
    /// Stagnation is not an error: the outcome is flagged
    /// [`CollectStatus::Partial`] and carries whatever was collected.
    pub async fn collect<P: Page + ?Sized>(self, page: &P) -> Result<CollectOutcome, CollectError> {
        let settings = &self.settings;
        let target = self.read_target(page).await?;
        let goal = target.value();
        self.log.info(&format!("expecting {goal} records"));

        let mut state = CollectionState::default();
        let status = loop {
            let rendered = page.count(&settings.card_selector).await?;
            if rendered > state.cursor {
                let cards = page
                    .read_cards(&settings.card_selector, &settings.fields, state.cursor)
                    .await?;
                let mut accepted = 0;
                for card in &cards {
                    if state.accept(extract(card, &settings.fields)) {
                        accepted += 1;
                    }
                }
                state.cursor += cards.len();
                self.log.info(&format!(
                    "collected {}/{goal} records (+{accepted} from {} new cards)",
                    state.records.len(),
                    cards.len()
                ));
            }

            if state.records.len() >= goal {
                break CollectStatus::Complete;
            }

            page.scroll_by_viewports(settings.scroll_viewports).await?;
            tokio::time::sleep(settings.scroll_pause).await;

            if page.count(&settings.card_selector).await? > state.cursor {
                state.stagnant_rounds = 0;
                continue;
            }
            let grew = page
                .wait_for_count_above(&settings.card_selector, state.cursor, settings.growth_timeout)
                .await?;
            if grew {
                state.stagnant_rounds = 0;
                continue;
            }

            state.stagnant_rounds += 1;
            self.log.debug(&format!(
                "no new cards after scrolling ({} of {} rounds)",
                state.stagnant_rounds, settings.stagnation_limit
            ));
            if state.stagnant_rounds >= settings.stagnation_limit {
                self.log.warn(&format!(
                    "listing stopped growing at {}/{goal} records; returning partial result",
                    state.records.len()
                ));
                break CollectStatus::Partial {
                    reason: PartialReason::Stagnated {
                        rounds: state.stagnant_rounds,
                    },
                };
            }
        };

        let mut records = state.records;
        if records.len() > goal {
            self.log.info(&format!(
                "trimming {} records beyond the target of {goal}",
                records.len() - goal
            ));
            records.truncate(goal);
        }

        Ok(CollectOutcome {
            records,
            status,
            target,
        })
    }

    async fn read_target<P: Page + ?Sized>(&self, page: &P) -> Result<TotalTarget, CollectError> {
        let settings = &self.settings;
        let text = if page
            .probe(&settings.total_selector, settings.total_timeout)
            .await?
        {
            page.inner_text(&settings.total_selector).await?
        } else {
            None
        };

        match text.as_deref().and_then(parse_total) {
            Some(total) => Ok(TotalTarget::Announced(total)),
            None => {
                self.log.warn(&format!(
                    "could not read a total from {:?}; using fallback total of {}",
                    text.unwrap_or_default(),
                    settings.fallback_total
                ));
                Ok(TotalTarget::Fallback(settings.fallback_total))
            }
        }
    }
}

const NUMBER_PATTERN: &str = r"-?\d{1,3}(?:,\d{3})+|-?\d+";

fn number_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(NUMBER_PATTERN).ok()).as_ref()
}

/// The last integer in `text`, if it is positive. Digit grouping with
/// commas is accepted.
pub fn parse_total(text: &str) -> Option<usize> {
    let last = number_pattern()?.find_iter(text).last()?;
    let digits = last.as_str().replace(',', "");
    if digits.starts_with('-') {
        return None;
    }
    digits.parse::<usize>().ok().filter(|n| *n > 0)
}
