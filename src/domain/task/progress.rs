//! Run progress
//!
//! One increment per finished account, serialized behind a mutex.

use std::sync::Arc;
use tokio::sync::Mutex;

/// Width of the rendered bar in characters
const BAR_LENGTH: usize = 30;

/// Fire-and-forget progress observer
pub trait ProgressSink: Send + Sync {
    fn report_progress(&self, current: usize, total: usize, description: &str);
}

/// Renders a text bar through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report_progress(&self, current: usize, total: usize, description: &str) {
        tracing::info!("{}", render_bar(current, total, description));
    }
}

/// `[description] [█████░░░░░] 3/10 (30.0%)`
pub fn render_bar(current: usize, total: usize, description: &str) -> String {
    let percentage = if total == 0 {
        100.0
    } else {
        (current as f64 / total as f64) * 100.0
    };
    let filled = ((BAR_LENGTH as f64 * percentage / 100.0) as usize).min(BAR_LENGTH);
    format!(
        "[{}] [{}{}] {}/{} ({:.1}%)",
        description,
        "█".repeat(filled),
        "░".repeat(BAR_LENGTH - filled),
        current,
        total,
        percentage
    )
}

/// Shared completion counter
pub struct ProgressTracker {
    total: usize,
    description: String,
    current: Mutex<usize>,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressTracker {
    pub fn new(total: usize, description: impl Into<String>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            total,
            description: description.into(),
            current: Mutex::new(0),
            sink,
        }
    }

    /// Count one finished account and notify the sink. Returns the new value.
    pub async fn increment(&self) -> usize {
        let mut current = self.current.lock().await;
        *current += 1;
        self.sink
            .report_progress(*current, self.total, &self.description);
        *current
    }

    pub async fn current(&self) -> usize {
        *self.current.lock().await
    }

    pub fn total(&self) -> usize {
        self.total
    }
}
