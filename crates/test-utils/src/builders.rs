#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use dagrun::DependencyGraph;
use serde_json::Value;

use crate::probe_task::{ExecutionLog, ProbeTask};

/// Builder for a [`DependencyGraph`] of probe tasks, to simplify test setup.
///
/// Edges are applied in `build()` so tasks can be declared in any order.
pub struct GraphBuilder {
    name: String,
    tasks: Vec<ProbeSpec>,
    edges: Vec<(String, String)>,
    log: ExecutionLog,
}

struct ProbeSpec {
    id: String,
    fail: bool,
    params: Vec<(String, Value)>,
}

impl GraphBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tasks: Vec::new(),
            edges: Vec::new(),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a succeeding probe task.
    pub fn task(mut self, id: &str) -> Self {
        self.tasks.push(ProbeSpec {
            id: id.to_string(),
            fail: false,
            params: Vec::new(),
        });
        self
    }

    /// Add a probe task that fails when executed.
    pub fn failing_task(mut self, id: &str) -> Self {
        self.tasks.push(ProbeSpec {
            id: id.to_string(),
            fail: true,
            params: Vec::new(),
        });
        self
    }

    /// Attach a parameter to the most recently added task.
    pub fn param(mut self, key: &str, value: Value) -> Self {
        if let Some(spec) = self.tasks.last_mut() {
            spec.params.push((key.to_string(), value));
        }
        self
    }

    /// Declare that `downstream` depends on `upstream`.
    pub fn edge(mut self, upstream: &str, downstream: &str) -> Self {
        self.edges.push((upstream.to_string(), downstream.to_string()));
        self
    }

    /// Declare a chain of dependencies, e.g. `chain(&["a", "b", "c"])` for
    /// a -> b -> c.
    pub fn chain(mut self, ids: &[&str]) -> Self {
        for pair in ids.windows(2) {
            self.edges.push((pair[0].to_string(), pair[1].to_string()));
        }
        self
    }

    pub fn build(self) -> (DependencyGraph, ExecutionLog) {
        let mut graph = DependencyGraph::new(&self.name);

        for spec in self.tasks {
            let mut task = ProbeTask::new(&spec.id, Arc::clone(&self.log));
            if spec.fail {
                task = task.failing();
            }
            for (key, value) in spec.params {
                task = task.with_param(key, value);
            }
            graph.add_task(Box::new(task));
        }

        for (upstream, downstream) in &self.edges {
            graph
                .add_dependency(upstream, downstream)
                .expect("builder edge references a declared task");
        }

        (graph, self.log)
    }
}

/// Drain the execution log into a plain list of task ids.
pub fn executed(log: &ExecutionLog) -> Vec<String> {
    log.lock().expect("execution log poisoned").clone()
}
