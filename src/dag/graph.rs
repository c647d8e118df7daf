// src/dag/graph.rs

//! In-memory DAG of tasks keyed by task id.
//!
//! The graph stores each task's runnable unit, the forward dependency
//! relation (downstream id -> set of upstream ids) and a derived reverse
//! relation for cheap downstream traversal. It is built once, before a run,
//! and is not mutated while a run is in flight.
//!
//! Acyclicity is not enforced edge by edge; it is discovered when the graph
//! is levelled for execution.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::warn;

use crate::errors::{Error, Result};
use crate::task::Task;

pub struct DependencyGraph {
    name: String,
    description: String,
    tasks: HashMap<String, Box<dyn Task>>,
    /// downstream id -> ids it depends on.
    upstreams: HashMap<String, HashSet<String>>,
    /// upstream id -> ids that depend on it.
    downstreams: HashMap<String, HashSet<String>>,
}

impl DependencyGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tasks: HashMap::new(),
            upstreams: HashMap::new(),
            downstreams: HashMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Add a task, keyed by its id. Adding a task under an id that already
    /// exists replaces the previous runnable (last write wins).
    pub fn add_task(&mut self, task: Box<dyn Task>) -> &mut Self {
        let id = task.id().to_string();
        if self.tasks.insert(id.clone(), task).is_some() {
            warn!(task = %id, "task already exists; replacing its runnable");
        }
        self
    }

    /// Declare that `downstream` depends on `upstream`.
    pub fn add_dependency(&mut self, upstream: &str, downstream: &str) -> Result<&mut Self> {
        if !self.tasks.contains_key(upstream) {
            return Err(Error::UnknownNode(upstream.to_string()));
        }
        if !self.tasks.contains_key(downstream) {
            return Err(Error::UnknownNode(downstream.to_string()));
        }

        self.upstreams
            .entry(downstream.to_string())
            .or_default()
            .insert(upstream.to_string());
        self.downstreams
            .entry(upstream.to_string())
            .or_default()
            .insert(downstream.to_string());

        Ok(self)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    /// All declared edges as `(upstream, downstream)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.upstreams.iter().flat_map(|(downstream, upstreams)| {
            upstreams
                .iter()
                .map(move |upstream| (upstream.as_str(), downstream.as_str()))
        })
    }

    pub(crate) fn task_mut(&mut self, id: &str) -> Option<&mut Box<dyn Task>> {
        self.tasks.get_mut(id)
    }

    /// Direct dependencies of a task.
    pub fn direct_upstream_of<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a str> {
        self.upstreams
            .get(id)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Group tasks into execution waves with Kahn's algorithm: every wave
    /// contains only tasks whose dependencies are all in earlier waves, so
    /// a wave may run sequentially or in parallel with identical results.
    pub fn levels(&self) -> Result<Vec<Vec<String>>> {
        let mut in_degree: HashMap<&str, usize> = self
            .tasks
            .keys()
            .map(|id| {
                let degree = self.upstreams.get(id).map_or(0, HashSet::len);
                (id.as_str(), degree)
            })
            .collect();

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut levels = Vec::new();
        let mut placed = 0;

        while !queue.is_empty() {
            let level: Vec<&str> = queue.drain(..).collect();

            for &id in &level {
                for downstream in self.downstreams.get(id).into_iter().flatten() {
                    if let Some(degree) = in_degree.get_mut(downstream.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(downstream.as_str());
                        }
                    }
                }
            }

            placed += level.len();
            levels.push(level.into_iter().map(str::to_string).collect());
        }

        // Any node left unplaced is on a cycle.
        if placed != self.tasks.len() {
            return Err(Error::Cycle);
        }

        Ok(levels)
    }

    /// All transitive dependents of `id`, excluding `id` itself.
    pub fn downstream_of(&self, id: &str) -> HashSet<String> {
        self.closure(id, &self.downstreams)
    }

    /// All transitive dependencies of `id`, excluding `id` itself.
    pub fn upstream_of(&self, id: &str) -> HashSet<String> {
        self.closure(id, &self.upstreams)
    }

    fn closure(&self, id: &str, edges: &HashMap<String, HashSet<String>>) -> HashSet<String> {
        let mut result = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([id]);
        let mut visited = HashSet::new();

        while let Some(current) = queue.pop_front() {
            visited.insert(current);

            for next in edges.get(current).into_iter().flatten() {
                result.insert(next.clone());
                if !visited.contains(next.as_str()) {
                    queue.push_back(next.as_str());
                }
            }
        }

        result
    }
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("name", &self.name)
            .field("tasks", &self.tasks.keys().collect::<Vec<_>>())
            .field("upstreams", &self.upstreams)
            .finish_non_exhaustive()
    }
}
