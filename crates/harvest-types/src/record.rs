//! Extracted records.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Name of the field that identifies a record.
pub const ID_FIELD: &str = "id";

/// One extracted record: text values keyed by field name.
///
/// Fields keep insertion order, so a record serializes with `id`, `title`,
/// and `category` first, followed by detail fields in the order the page
/// listed them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractionRecord {
    fields: IndexMap<String, String>,
}

impl ExtractionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// The dedup key; empty when the card had no identifier.
    pub fn id(&self) -> &str {
        self.get(ID_FIELD).unwrap_or("")
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Set a field. An existing field keeps its position and takes the new value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ExtractionRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_defaults_to_empty() {
        let record = ExtractionRecord::from_iter([("title", "Widget")]);
        assert_eq!(record.id(), "");
    }

    #[test]
    fn test_serializes_flat_in_insertion_order() {
        let record = ExtractionRecord::from_iter([
            ("id", "p1"),
            ("title", "Widget"),
            ("category", "Tools"),
            ("Cost", "$4.00"),
        ]);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"id":"p1","title":"Widget","category":"Tools","Cost":"$4.00"}"#
        );
    }

    #[test]
    fn test_reinsert_keeps_position() {
        let mut record = ExtractionRecord::from_iter([("id", "p1"), ("title", "a")]);
        record.insert("id", "p2");
        let names: Vec<&str> = record.fields().map(|(k, _)| k).collect();
        assert_eq!(names, ["id", "title"]);
        assert_eq!(record.id(), "p2");
    }
}
