use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dagrun::params::ParameterStore;
use dagrun::task::{Task, TaskResults};
use serde_json::{Value, json};

/// Shared record of which tasks executed, in execution order.
pub type ExecutionLog = Arc<Mutex<Vec<String>>>;

/// A task that:
/// - records its id in a shared [`ExecutionLog`] when executed
/// - optionally fails on purpose
/// - returns its id, resolved params and received upstream ids as its
///   result, so tests can assert on all three through the result map.
pub struct ProbeTask {
    id: String,
    fail: bool,
    params: BTreeMap<String, Value>,
    log: ExecutionLog,
}

impl ProbeTask {
    pub fn new(id: impl Into<String>, log: ExecutionLog) -> Self {
        Self {
            id: id.into(),
            fail: false,
            params: BTreeMap::new(),
            log,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

#[async_trait]
impl Task for ProbeTask {
    fn id(&self) -> &str {
        &self.id
    }

    fn resolve_params(&mut self, store: &ParameterStore) -> dagrun::Result<()> {
        for value in self.params.values_mut() {
            if let Value::String(s) = value {
                *value = Value::String(store.resolve(s)?);
            }
        }
        Ok(())
    }

    async fn execute(&mut self, upstream: &TaskResults) -> anyhow::Result<Value> {
        self.log
            .lock()
            .expect("execution log poisoned")
            .push(self.id.clone());

        if self.fail {
            anyhow::bail!("probe task '{}' failed on purpose", self.id);
        }

        let mut upstream_ids: Vec<&str> = upstream.keys().map(String::as_str).collect();
        upstream_ids.sort_unstable();

        Ok(json!({
            "task": self.id,
            "params": self.params,
            "upstream": upstream_ids,
        }))
    }
}
