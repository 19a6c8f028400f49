//! # Stage Log
//!
//! The ordered, human-readable trail of one pipeline invocation: what was
//! extracted, which protocol won, how many generation attempts ran, what
//! validation scored. Advisory for operators; not part of the data
//! contract. Every entry is mirrored to `tracing`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PipelineStage;

/// One log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub stage: PipelineStage,
    pub message: String,
}

/// Ordered log of pipeline-stage messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageLog {
    entries: Vec<LogEntry>,
}

impl StageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, mirroring it to tracing.
    pub fn push(&mut self, stage: PipelineStage, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(stage = ?stage, "{}", message);
        self.entries.push(LogEntry {
            at: Utc::now(),
            stage,
            message,
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The log as one printable block.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("[{:?}] {}", e.stage, e.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
