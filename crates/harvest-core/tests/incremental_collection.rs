//! Integration tests for scroll-driven collection.
//!
//! Drives `IncrementalCollector` against a scripted listing that renders one
//! batch of cards per scroll.

mod common;

use std::time::{Duration, Instant};

use harvest_core::{
    CollectStatus, IncrementalCollector, LogLevel, PartialReason, TotalTarget,
};

use common::{card, cards, fast_settings, ids, listing_page, memory_log};

#[tokio::test]
async fn forty_cards_in_three_batches_complete_in_order() {
    let page = listing_page(
        "Showing 40 of 40 products",
        vec![cards(1, 15), cards(16, 30), cards(31, 40)],
    );

    let outcome = IncrementalCollector::new(fast_settings(1000), memory_log())
        .collect(&page)
        .await
        .unwrap();

    let expected: Vec<String> = (1..=40).map(|i| format!("p{i}")).collect();
    assert_eq!(ids(&outcome.records), expected);
    assert_eq!(outcome.status, CollectStatus::Complete);
    assert_eq!(outcome.target, TotalTarget::Announced(40));
    assert_eq!(page.scrolls(), 2);
    // Each batch is read from the cursor, never from the start.
    assert_eq!(page.card_reads(), [0, 15, 30]);
}

#[tokio::test]
async fn same_id_in_two_batches_yields_one_record() {
    let mut second = cards(4, 6);
    second.insert(0, card("p2"));
    second.push(card("p5"));
    let page = listing_page("Showing 6 of 6", vec![cards(1, 3), second]);

    let outcome = IncrementalCollector::new(fast_settings(1000), memory_log())
        .collect(&page)
        .await
        .unwrap();

    assert_eq!(ids(&outcome.records), ["p1", "p2", "p3", "p4", "p5", "p6"]);
    assert!(outcome.is_complete());
}

#[tokio::test]
async fn order_follows_first_encounter() {
    let page = listing_page(
        "Showing 5 of 5",
        vec![
            vec![card("c"), card("a")],
            vec![card("a"), card("e"), card("b")],
            vec![card("c"), card("d")],
        ],
    );

    let outcome = IncrementalCollector::new(fast_settings(1000), memory_log())
        .collect(&page)
        .await
        .unwrap();

    assert_eq!(ids(&outcome.records), ["c", "a", "e", "b", "d"]);
}

#[tokio::test]
async fn cards_without_id_are_ignored() {
    let mut batch = cards(1, 2);
    batch.insert(1, harvest_core::CardSnapshot::default());
    let page = listing_page("Showing 2 of 2", vec![batch]);

    let outcome = IncrementalCollector::new(fast_settings(1000), memory_log())
        .collect(&page)
        .await
        .unwrap();

    assert_eq!(ids(&outcome.records), ["p1", "p2"]);
    assert!(outcome.is_complete());
}

#[tokio::test]
async fn overshoot_is_truncated_to_announced_prefix() {
    // Twelve cards render although the page announces ten.
    let page = listing_page("Showing 10 of 10", vec![cards(1, 8), cards(9, 12)]);

    let outcome = IncrementalCollector::new(fast_settings(1000), memory_log())
        .collect(&page)
        .await
        .unwrap();

    let expected: Vec<String> = (1..=10).map(|i| format!("p{i}")).collect();
    assert_eq!(ids(&outcome.records), expected);
    assert!(outcome.is_complete());
}

#[tokio::test]
async fn stagnation_returns_partial_within_bound() {
    let page = listing_page("Showing 40 of 40 products", vec![cards(1, 15), cards(16, 25)]);
    let log = memory_log();

    let started = Instant::now();
    let outcome = IncrementalCollector::new(fast_settings(1000), log.clone())
        .collect(&page)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(outcome.records.len(), 25);
    assert_eq!(
        outcome.status,
        CollectStatus::Partial {
            reason: PartialReason::Stagnated { rounds: 1 }
        }
    );
    assert!(!outcome.is_complete());
    assert_eq!(log.count_matching(LogLevel::Warn, "stopped growing"), 1);
}

#[tokio::test]
async fn stagnation_limit_allows_extra_rounds() {
    let page = listing_page("Showing 9 of 9", vec![cards(1, 3)]);
    let mut settings = fast_settings(1000);
    settings.stagnation_limit = 3;

    let outcome = IncrementalCollector::new(settings, memory_log())
        .collect(&page)
        .await
        .unwrap();

    assert_eq!(page.scrolls(), 3);
    assert_eq!(
        outcome.status,
        CollectStatus::Partial {
            reason: PartialReason::Stagnated { rounds: 3 }
        }
    );
}

#[tokio::test]
async fn unparsable_total_uses_fallback_once() {
    let mut second = cards(4, 7);
    second.push(card("p1"));
    let page = listing_page("", vec![cards(1, 3), second]);
    let log = memory_log();

    let outcome = IncrementalCollector::new(fast_settings(50), log.clone())
        .collect(&page)
        .await
        .unwrap();

    assert_eq!(outcome.target, TotalTarget::Fallback(50));
    assert_eq!(ids(&outcome.records), ["p1", "p2", "p3", "p4", "p5", "p6", "p7"]);
    assert_eq!(log.count_matching(LogLevel::Warn, "fallback total of 50"), 1);
    assert!(!outcome.is_complete());
}

#[tokio::test]
async fn fallback_total_caps_the_result() {
    let page = listing_page("Showing products", vec![cards(1, 6), cards(7, 12)]);

    let outcome = IncrementalCollector::new(fast_settings(5), memory_log())
        .collect(&page)
        .await
        .unwrap();

    assert_eq!(outcome.target, TotalTarget::Fallback(5));
    assert_eq!(ids(&outcome.records), ["p1", "p2", "p3", "p4", "p5"]);
    assert!(outcome.is_complete());
    assert_eq!(page.scrolls(), 0);
}

#[tokio::test]
async fn missing_total_indicator_uses_fallback() {
    let page = harvest_core::testing::FakePage::new();
    page.set_listing(common::CARD, vec![cards(1, 2)]);
    let log = memory_log();

    let outcome = IncrementalCollector::new(fast_settings(2), log.clone())
        .collect(&page)
        .await
        .unwrap();

    assert_eq!(outcome.target, TotalTarget::Fallback(2));
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(log.count_matching(LogLevel::Warn, "fallback total"), 1);
}

#[tokio::test]
async fn records_carry_extracted_fields() {
    let page = listing_page("Showing 1 of 1", vec![vec![card("p9")]]);

    let outcome = IncrementalCollector::new(fast_settings(1000), memory_log())
        .collect(&page)
        .await
        .unwrap();

    let record = &outcome.records[0];
    assert_eq!(record.get("title"), Some("Product p9"));
    assert_eq!(record.get("category"), Some("Hardware"));
    assert_eq!(record.get("Cost"), Some("$10.00"));
}
