// src/task/mod.rs

//! The runnable-unit contract consumed by the execution engine.
//!
//! The engine only ever calls the two contract methods: `resolve_params`
//! before dispatch and `execute` with the results of the task's direct
//! upstreams. Concrete runnable kinds are additive; the engine never needs
//! to know about them. This crate ships two:
//! - [`ShellTask`]: process invocation through the platform shell
//! - [`FnTask`]: an in-process callable
//!
//! SQL-engine runnables and similar vendor integrations plug in from the
//! outside by implementing [`Task`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;
use crate::params::ParameterStore;

pub mod func;
pub mod shell;

pub use func::FnTask;
pub use shell::ShellTask;

/// Results of already-executed tasks, keyed by task id. A task receives
/// only the entries of its direct upstreams.
pub type TaskResults = HashMap<String, Value>;

/// A single named unit of work.
#[async_trait]
pub trait Task: Send {
    /// Unique id of this task within its graph.
    fn id(&self) -> &str;

    /// Replace every string-valued parameter on the task with its resolved
    /// form. Must be idempotent for an unchanged store.
    fn resolve_params(&mut self, store: &ParameterStore) -> Result<()>;

    /// Perform the unit of work. The engine does not inspect the error
    /// beyond its display form.
    async fn execute(&mut self, upstream: &TaskResults) -> anyhow::Result<Value>;
}
