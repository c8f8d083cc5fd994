//! Card field extraction.
//!
//! A card is read in a single page evaluation into a [`CardSnapshot`] of raw
//! texts, with every lookup scoped to that card's element. [`extract`] then
//! turns the snapshot into an [`ExtractionRecord`] without touching the
//! page.

use harvest_browser::driver::js_str;
use harvest_types::{ExtractionRecord, FieldSelectors, ID_FIELD};
use serde::Deserialize;

/// Raw texts read from one card. `None` means the sub-element was absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CardSnapshot {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub details: Vec<DetailText>,
}

/// One label/value row of a card's detail list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DetailText {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl CardSnapshot {
    /// Snapshot with the given identifier text, as the page would render it.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }
}

/// Map one card to a record: `id`, `title`, `category`, then one field per
/// labelled detail row in page order.
///
/// Absent sub-elements become empty strings. The identifier has
/// `fields.id_prefix` removed; detail labels lose a trailing colon. A detail
/// label that repeats an earlier field name overwrites its value.
pub fn extract(card: &CardSnapshot, fields: &FieldSelectors) -> ExtractionRecord {
    let text = |value: &Option<String>| value.as_deref().unwrap_or("").trim().to_string();

    let raw_id = text(&card.id);
    let id = raw_id
        .strip_prefix(fields.id_prefix.as_str())
        .unwrap_or(&raw_id)
        .trim()
        .to_string();

    let mut record = ExtractionRecord::new();
    record.insert(ID_FIELD, id);
    record.insert("title", text(&card.title));
    record.insert("category", text(&card.category));

    for row in &card.details {
        let label = text(&row.label);
        let label = label.trim_end_matches(':').trim_end();
        if label.is_empty() {
            continue;
        }
        record.insert(label, text(&row.value));
    }
    record
}

/// Page expression returning a [`CardSnapshot`] array for every element
/// matching `card_selector` at position `from` or later.
pub fn card_read_expression(card_selector: &str, fields: &FieldSelectors, from: usize) -> String {
    format!(
        r#"(() => {{
  const text = (root, sel) => {{
    if (!sel) return null;
    const el = root.querySelector(sel);
    return el ? el.innerText : null;
  }};
  const cards = Array.from(document.querySelectorAll({card})).slice({from});
  return cards.map((card) => ({{
    id: text(card, {id}),
    title: text(card, {title}),
    category: text(card, {category}),
    details: ({row} ? Array.from(card.querySelectorAll({row})) : []).map((row) => ({{
      label: text(row, {label}),
      value: text(row, {value}),
    }})),
  }}));
}})()"#,
        card = js_str(card_selector),
        id = js_str(&fields.id),
        title = js_str(&fields.title),
        category = js_str(&fields.category),
        row = js_str(&fields.detail_row),
        label = js_str(&fields.detail_label),
        value = js_str(&fields.detail_value),
    )
}
