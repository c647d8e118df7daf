// src/lib.rs

//! `dagrun`: a dependency-graph job scheduler.
//!
//! Declare named tasks, wire them into a DAG, and execute the graph in
//! dependency order with partial re-execution (start/end/subset filters),
//! fail-fast control, `${...}`-templated parameters with a date-offset
//! mini-language, and historical backfill over a range of logical dates.
//!
//! ```
//! use dagrun::{DependencyGraph, ExecutionEngine, FnTask, ParameterStore, RunOptions};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = DependencyGraph::new("daily-report");
//! graph.add_task(Box::new(FnTask::new("extract", |_, _| Ok(json!({ "rows": 42 })))));
//! graph.add_task(Box::new(FnTask::new("load", |upstream, _| {
//!     Ok(upstream["extract"]["rows"].clone())
//! })));
//! graph.add_dependency("extract", "load")?;
//!
//! let mut engine = ExecutionEngine::new();
//! let store = ParameterStore::new();
//! let results = engine.execute(&mut graph, &store, &RunOptions::default()).await?;
//! assert_eq!(results["load"], json!(42));
//! # Ok(())
//! # }
//! ```

pub mod alert;
pub mod backfill;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod params;
pub mod task;

pub use alert::{AlertSink, LogAlert, NoopAlert, WorkflowFailure};
pub use backfill::{
    BackfillOptions, BackfillPlan, BackfillPlanner, BackfillReport, ConfirmGate, DateSpec,
    DatePoint, Granularity, GraphFactory, GraphTemplate,
};
pub use dag::DependencyGraph;
pub use engine::{ExecutionEngine, ExecutionRecord, RunOptions, RunStatus};
pub use errors::{Error, Result};
pub use params::ParameterStore;
pub use task::{FnTask, ShellTask, Task, TaskResults};
