//! JSON export of collected records.

use std::path::Path;

use anyhow::Context;
use harvest_core::write_atomic;
use harvest_types::ExtractionRecord;

/// Write `records` as a pretty-printed JSON array, replacing `path`
/// atomically. Parent directories are created as needed.
pub fn write_records(path: &Path, records: &[ExtractionRecord]) -> anyhow::Result<()> {
    let mut json = serde_json::to_string_pretty(records).context("failed to serialize records")?;
    json.push('\n');
    write_atomic(path, json.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), count = records.len(), "records exported");
    Ok(())
}
