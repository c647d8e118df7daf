// src/task/func.rs

//! In-process callable task.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;
use crate::params::ParameterStore;
use crate::task::{Task, TaskResults};

type TaskFn =
    dyn FnMut(&TaskResults, &BTreeMap<String, Value>) -> anyhow::Result<Value> + Send;

/// A task backed by a plain closure.
///
/// The closure receives the upstream results and the task's (resolved)
/// parameters and returns the task result.
pub struct FnTask {
    id: String,
    params: BTreeMap<String, Value>,
    func: Box<TaskFn>,
}

impl FnTask {
    pub fn new<F>(id: impl Into<String>, func: F) -> Self
    where
        F: FnMut(&TaskResults, &BTreeMap<String, Value>) -> anyhow::Result<Value>
            + Send
            + 'static,
    {
        Self {
            id: id.into(),
            params: BTreeMap::new(),
            func: Box::new(func),
        }
    }

    /// Attach a task-level parameter. String values are resolved through
    /// the store before execution.
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

impl std::fmt::Debug for FnTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTask")
            .field("id", &self.id)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Task for FnTask {
    fn id(&self) -> &str {
        &self.id
    }

    fn resolve_params(&mut self, store: &ParameterStore) -> Result<()> {
        for value in self.params.values_mut() {
            if let Value::String(s) = value {
                *value = Value::String(store.resolve(s)?);
            }
        }
        Ok(())
    }

    async fn execute(&mut self, upstream: &TaskResults) -> anyhow::Result<Value> {
        (self.func)(upstream, &self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn closure_sees_resolved_params() {
        let mut store = ParameterStore::new();
        store.set([("env".to_string(), json!("prod"))]);

        let mut task = FnTask::new("emit", |_, params| Ok(params["target"].clone()))
            .with_param("target", json!("cluster-${env}"));

        task.resolve_params(&store).unwrap();
        let out = task.execute(&TaskResults::new()).await.unwrap();
        assert_eq!(out, json!("cluster-prod"));
    }

    #[tokio::test]
    async fn closure_sees_upstream_results() {
        let mut task = FnTask::new("sum", |upstream, _| {
            let a = upstream["a"]["n"].as_i64().unwrap_or(0);
            let b = upstream["b"]["n"].as_i64().unwrap_or(0);
            Ok(json!({ "n": a + b }))
        });

        let mut upstream = TaskResults::new();
        upstream.insert("a".to_string(), json!({ "n": 2 }));
        upstream.insert("b".to_string(), json!({ "n": 3 }));

        let out = task.execute(&upstream).await.unwrap();
        assert_eq!(out, json!({ "n": 5 }));
    }
}
