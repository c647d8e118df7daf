// src/engine/record.rs

//! Append-only run history.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;

/// Terminal status of one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Success,
    Failed,
}

/// One entry of the run history, created per engine run and immutable once
/// the run ends.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub workflow: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub status: RunStatus,
    /// Snapshot of the parameter store the run used.
    pub params: BTreeMap<String, Value>,
    /// The scope filters the caller requested.
    pub start_from: Option<String>,
    pub end_at: Option<String>,
    pub only_tasks: Option<Vec<String>>,
    /// Task ids that completed, in completion order.
    pub completed: Vec<String>,
    /// First task that failed, if any, and its error message.
    pub failed_task: Option<String>,
    pub error: Option<String>,
    /// Planned tasks that neither completed nor failed first.
    pub uncompleted: Vec<String>,
    /// Logical date of the run when it is part of a backfill.
    pub date_point: Option<NaiveDate>,
}
