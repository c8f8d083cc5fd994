//! Failure snapshots.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::log::RunLog;
use crate::page::Page;

/// Save a PNG screenshot and the page HTML as `<dir>/<prefix>-<UTC>.png`
/// and `.html`. Returns the path of whichever files were written, with the
/// screenshot preferred. `None` if neither could be taken.
pub async fn capture<P: Page + ?Sized>(
    page: &P,
    dir: &Path,
    prefix: &str,
    log: &dyn RunLog,
) -> Option<PathBuf> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        log.warn(&format!("cannot create diagnostics directory {}: {e}", dir.display()));
        return None;
    }
    let stem = format!("{prefix}-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"));

    let png = dir.join(format!("{stem}.png"));
    let png_written = match page.screenshot().await {
        Ok(bytes) => write(&png, &bytes, log),
        Err(e) => {
            log.warn(&format!("screenshot for diagnostics failed: {e}"));
            false
        }
    };

    let html = dir.join(format!("{stem}.html"));
    let html_written = match page.html().await {
        Ok(text) => write(&html, text.as_bytes(), log),
        Err(e) => {
            log.warn(&format!("HTML capture for diagnostics failed: {e}"));
            false
        }
    };

    let saved = match (png_written, html_written) {
        (true, _) => Some(png),
        (false, true) => Some(html),
        (false, false) => None,
    };
    if let Some(path) = &saved {
        log.info(&format!("diagnostics saved to {}", path.display()));
    }
    saved
}

fn write(path: &Path, contents: &[u8], log: &dyn RunLog) -> bool {
    match std::fs::write(path, contents) {
        Ok(()) => true,
        Err(e) => {
            log.warn(&format!("failed to write diagnostics file {}: {e}", path.display()));
            false
        }
    }
}
