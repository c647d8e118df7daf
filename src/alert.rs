// src/alert.rs

//! Failure notification boundary.
//!
//! The engine reports terminal run failures to an injected [`AlertSink`].
//! Formatting and transport (webhooks, chat cards) live outside this crate;
//! the sink only receives the structured payload. The default sink does
//! nothing, which keeps the engine testable without process-wide state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::error;

/// Everything a notifier needs to report a failed run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowFailure {
    pub workflow: String,
    pub started_at: DateTime<Utc>,
    pub failed_task: String,
    pub error: String,
    pub completed: Vec<String>,
    pub uncompleted: Vec<String>,
    /// Logical date of the run when it is part of a backfill.
    pub date_point: Option<NaiveDate>,
}

pub trait AlertSink: Send + Sync {
    fn workflow_failed(&self, failure: &WorkflowFailure);
}

/// Default sink: swallow the alert.
#[derive(Debug, Default)]
pub struct NoopAlert;

impl AlertSink for NoopAlert {
    fn workflow_failed(&self, _failure: &WorkflowFailure) {}
}

/// Sink that emits the failure as a structured log event.
#[derive(Debug, Default)]
pub struct LogAlert;

impl AlertSink for LogAlert {
    fn workflow_failed(&self, failure: &WorkflowFailure) {
        error!(
            workflow = %failure.workflow,
            failed_task = %failure.failed_task,
            error = %failure.error,
            completed = ?failure.completed,
            uncompleted = ?failure.uncompleted,
            date_point = ?failure.date_point,
            "workflow run failed"
        );
    }
}
