// src/engine/scope.rs

//! Scope filters: which task ids are eligible to execute in a run.

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::warn;

use crate::dag::DependencyGraph;
use crate::errors::{Error, Result};

/// Per-run options for [`ExecutionEngine::execute`](crate::ExecutionEngine::execute).
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Run this task and everything downstream of it.
    pub start_from: Option<String>,
    /// Run this task and everything upstream of it.
    pub end_at: Option<String>,
    /// Run exactly these tasks. Takes precedence over `start_from`/`end_at`.
    pub only_tasks: Option<Vec<String>>,
    /// Abort the run at the first task failure (default).
    pub fail_fast: bool,
    /// Logical date recorded with the run when backfilling.
    pub date_point: Option<NaiveDate>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            start_from: None,
            end_at: None,
            only_tasks: None,
            fail_fast: true,
            date_point: None,
        }
    }
}

impl RunOptions {
    pub fn start_from(id: impl Into<String>) -> Self {
        Self {
            start_from: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn only_tasks<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            only_tasks: Some(ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }
}

/// Compute the set of task ids eligible to execute.
///
/// An explicit `only_tasks` subset wins; `start_from`/`end_at` are ignored
/// when it is present. Every referenced id must exist in the graph.
pub(crate) fn compute_scope(
    graph: &DependencyGraph,
    opts: &RunOptions,
) -> Result<HashSet<String>> {
    if let Some(only) = &opts.only_tasks {
        if opts.start_from.is_some() || opts.end_at.is_some() {
            warn!("only_tasks given; ignoring start_from/end_at filters");
        }

        let mut scope = HashSet::new();
        for id in only {
            if !graph.contains(id) {
                return Err(Error::UnknownTask(id.clone()));
            }
            scope.insert(id.clone());
        }
        return Ok(scope);
    }

    let mut scope: HashSet<String> = graph.task_ids().map(str::to_string).collect();

    if let Some(start) = &opts.start_from {
        if !graph.contains(start) {
            return Err(Error::UnknownTask(start.clone()));
        }
        let mut reachable = graph.downstream_of(start);
        reachable.insert(start.clone());
        scope.retain(|id| reachable.contains(id));
    }

    if let Some(end) = &opts.end_at {
        if !graph.contains(end) {
            return Err(Error::UnknownTask(end.clone()));
        }
        let mut reachable = graph.upstream_of(end);
        reachable.insert(end.clone());
        scope.retain(|id| reachable.contains(id));
    }

    Ok(scope)
}
