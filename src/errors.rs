// src/errors.rs

//! Crate-wide error taxonomy.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A dependency edge references a task id that was never added.
    #[error("unknown task '{0}' referenced by a dependency")]
    UnknownNode(String),

    /// The dependency relation is not acyclic. Discovered while levelling
    /// the graph; we do not try to name the cycle members.
    #[error("dependency graph contains a cycle")]
    Cycle,

    /// A scope filter (`start_from`, `end_at`, `only_tasks`) names a task
    /// that does not exist in the graph.
    #[error("scope filter references unknown task '{0}'")]
    UnknownTask(String),

    #[error("invalid date range: {0}")]
    InvalidDateRange(String),

    /// A runnable unit failed. The engine only carries the stringified
    /// message; it never inspects the underlying error.
    #[error("task '{task}' failed: {message}")]
    TaskExecution { task: String, message: String },

    /// A parameter resolves to a reference to itself, directly or through a
    /// chain of other parameters.
    #[error("parameter '{0}' resolves through a reference cycle")]
    CyclicParameter(String),
}

pub type Result<T> = std::result::Result<T, Error>;
