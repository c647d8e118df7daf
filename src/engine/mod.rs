// src/engine/mod.rs

//! Execution engine: one scoped, level-by-level run over a dependency graph.
//!
//! A run:
//! 1. levels the graph (which is where a cycle surfaces),
//! 2. computes the scope from the requested filters,
//! 3. dispatches each level in order, feeding every task the results of its
//!    direct upstreams,
//! 4. records an [`ExecutionRecord`] in the append-only history, and
//! 5. re-raises any failure after recording it.
//!
//! Levels are strict barriers: no task of level k starts before level k-1
//! has finished. Within a level the engine awaits tasks one at a time; no
//! edges exist inside a level, so any dispatch order is equivalent.
//!
//! Under `fail_fast` (the default) the first task failure aborts the run.
//! Without it, the remaining scoped tasks still run, including tasks
//! downstream of the failure; they are attempted, not skipped.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::alert::{AlertSink, NoopAlert, WorkflowFailure};
use crate::dag::DependencyGraph;
use crate::errors::{Error, Result};
use crate::params::ParameterStore;
use crate::task::TaskResults;

pub mod record;
pub mod scope;

pub use record::{ExecutionRecord, RunStatus};
pub use scope::RunOptions;

pub struct ExecutionEngine {
    alert: Arc<dyn AlertSink>,
    history: Vec<ExecutionRecord>,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionEngine {
    pub fn new() -> Self {
        Self::with_alert(Arc::new(NoopAlert))
    }

    /// Create an engine that reports terminal failures to `alert`.
    pub fn with_alert(alert: Arc<dyn AlertSink>) -> Self {
        Self {
            alert,
            history: Vec::new(),
        }
    }

    /// The append-only history of every run this engine has performed.
    pub fn history(&self) -> &[ExecutionRecord] {
        &self.history
    }

    /// Run the graph once and return the result map of the completed tasks.
    ///
    /// A record is appended to the history whether the run succeeds or
    /// fails; failures are re-raised afterwards, never swallowed.
    pub async fn execute(
        &mut self,
        graph: &mut DependencyGraph,
        store: &ParameterStore,
        opts: &RunOptions,
    ) -> Result<TaskResults> {
        let started_at = Utc::now();
        let timer = Instant::now();
        info!(workflow = %graph.name(), "starting workflow run");

        let run = run_scoped(graph, store, opts).await;

        let finished_at = Utc::now();
        let status = if run.error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Success
        };

        let mut uncompleted: Vec<String> = run
            .scope
            .iter()
            .filter(|id| {
                !run.completed.contains(id) && run.failed_task.as_deref() != Some(id.as_str())
            })
            .cloned()
            .collect();
        uncompleted.sort_unstable();

        let record = ExecutionRecord {
            workflow: graph.name().to_string(),
            started_at,
            finished_at,
            duration_secs: timer.elapsed().as_secs_f64(),
            status,
            params: store.snapshot(),
            start_from: opts.start_from.clone(),
            end_at: opts.end_at.clone(),
            only_tasks: opts.only_tasks.clone(),
            completed: run.completed.clone(),
            failed_task: run.failed_task.clone(),
            error: run.error.as_ref().map(ToString::to_string),
            uncompleted: uncompleted.clone(),
            date_point: opts.date_point,
        };
        self.history.push(record);

        info!(
            workflow = %graph.name(),
            status = ?status,
            elapsed = ?timer.elapsed(),
            "workflow run finished"
        );

        if let (Some(failed_task), Some(err)) = (&run.failed_task, &run.error) {
            self.alert.workflow_failed(&WorkflowFailure {
                workflow: graph.name().to_string(),
                started_at,
                failed_task: failed_task.clone(),
                error: err.to_string(),
                completed: run.completed.clone(),
                uncompleted,
                date_point: opts.date_point,
            });
        }

        match run.error {
            Some(err) => Err(err),
            None => Ok(run.results),
        }
    }
}

#[derive(Default)]
struct ScopedRun {
    results: TaskResults,
    completed: Vec<String>,
    scope: std::collections::HashSet<String>,
    failed_task: Option<String>,
    /// First error of the run: a cycle, a bad scope filter, or the first
    /// task failure.
    error: Option<Error>,
}

async fn run_scoped(
    graph: &mut DependencyGraph,
    store: &ParameterStore,
    opts: &RunOptions,
) -> ScopedRun {
    let mut run = ScopedRun::default();

    let levels = match graph.levels() {
        Ok(levels) => levels,
        Err(err) => {
            run.error = Some(err);
            return run;
        }
    };

    run.scope = match scope::compute_scope(graph, opts) {
        Ok(scope) => scope,
        Err(err) => {
            run.error = Some(err);
            return run;
        }
    };

    'levels: for (depth, level) in levels.iter().enumerate() {
        let ids: Vec<&String> = level.iter().filter(|id| run.scope.contains(*id)).collect();
        if ids.is_empty() {
            continue;
        }

        debug!(depth, tasks = ?ids, "dispatching level");

        for id in ids {
            let upstream: TaskResults = graph
                .direct_upstream_of(id)
                .filter_map(|up| run.results.get(up).map(|v| (up.to_string(), v.clone())))
                .collect();

            let timer = Instant::now();
            info!(task = %id, "starting task");

            match execute_task(graph, id, store, &upstream).await {
                Ok(value) => {
                    info!(task = %id, elapsed = ?timer.elapsed(), "task succeeded");
                    run.results.insert(id.clone(), value);
                    run.completed.push(id.clone());
                }
                Err(err) => {
                    error!(task = %id, elapsed = ?timer.elapsed(), error = %err, "task failed");
                    // Only the first failure is recorded; later ones (in a
                    // non-fail-fast run) are visible in the logs.
                    if run.failed_task.is_none() {
                        run.failed_task = Some(id.clone());
                        run.error = Some(err);
                    }
                    if opts.fail_fast {
                        break 'levels;
                    }
                }
            }
        }
    }

    run
}

async fn execute_task(
    graph: &mut DependencyGraph,
    id: &str,
    store: &ParameterStore,
    upstream: &TaskResults,
) -> Result<Value> {
    let Some(task) = graph.task_mut(id) else {
        // Scope is always a subset of the graph's nodes; reaching this
        // would mean the graph was mutated mid-run.
        return Err(Error::TaskExecution {
            task: id.to_string(),
            message: "task missing from graph".to_string(),
        });
    };

    task.resolve_params(store).map_err(|err| Error::TaskExecution {
        task: id.to_string(),
        message: err.to_string(),
    })?;

    task.execute(upstream)
        .await
        .map_err(|err| Error::TaskExecution {
            task: id.to_string(),
            message: format!("{err:#}"),
        })
}
