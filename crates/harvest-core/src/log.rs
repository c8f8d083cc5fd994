//! Run-scoped logging.
//!
//! Engine components log through a [`RunLog`] handed to them at
//! construction instead of calling `tracing` macros directly, so a run's
//! messages share one span and tests can assert on what was logged.

use std::sync::Mutex;

use uuid::Uuid;

/// Logging collaborator for one run.
pub trait RunLog: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn debug(&self, _message: &str) {}
}

/// Forwards to `tracing` inside a `run` span tagged with a fresh `run_id`.
#[derive(Debug)]
pub struct TracingRunLog {
    run_id: Uuid,
    span: tracing::Span,
}

impl TracingRunLog {
    pub fn new() -> Self {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", run_id = %run_id);
        Self { run_id, span }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

impl Default for TracingRunLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLog for TracingRunLog {
    fn info(&self, message: &str) {
        let _entered = self.span.enter();
        tracing::info!("{message}");
    }

    fn warn(&self, message: &str) {
        let _entered = self.span.enter();
        tracing::warn!("{message}");
    }

    fn debug(&self, message: &str) {
        let _entered = self.span.enter();
        tracing::debug!("{message}");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemoryRunLog {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl MemoryRunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Lines at `level` whose text contains `needle`.
    pub fn count_matching(&self, level: LogLevel, needle: &str) -> usize {
        self.lines()
            .iter()
            .filter(|(l, text)| *l == level && text.contains(needle))
            .count()
    }

    fn push(&self, level: LogLevel, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((level, message.to_string()));
        }
    }
}

impl RunLog for MemoryRunLog {
    fn info(&self, message: &str) {
        self.push(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(LogLevel::Warn, message);
    }

    fn debug(&self, message: &str) {
        self.push(LogLevel::Debug, message);
    }
}
