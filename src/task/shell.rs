// src/task/shell.rs

//! Shell-command task: process invocation through the platform shell.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::Result;
use crate::params::ParameterStore;
use crate::task::{Task, TaskResults};

/// A task that runs a shell command.
///
/// The command may reference the task's own parameters as `${name}`; those
/// parameters are in turn resolved against the run's [`ParameterStore`]
/// before execution, so a command like `etl.sh --day ${day_id}` picks up
/// whatever `day_id` resolves to for this run.
#[derive(Debug)]
pub struct ShellTask {
    id: String,
    command: String,
    params: BTreeMap<String, Value>,
    working_dir: Option<PathBuf>,
}

impl ShellTask {
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            params: BTreeMap::new(),
            working_dir: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Substitute `${name}` references to this task's own parameters into
    /// the command. Unknown references are left for the shell to see.
    fn rendered_command(&self) -> String {
        let mut command = self.command.clone();
        for (key, value) in &self.params {
            let token = format!("${{{key}}}");
            if !command.contains(&token) {
                continue;
            }
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            command = command.replace(&token, &rendered);
        }
        command
    }
}

#[async_trait]
impl Task for ShellTask {
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

    async fn execute(&mut self, _upstream: &TaskResults) -> anyhow::Result<Value> {
        let rendered = self.rendered_command();
        info!(task = %self.id, cmd = %rendered, "starting shell command");

        // Build a shell command appropriate for the platform.
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&rendered);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&rendered);
            c
        };

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for task '{}'", self.id))?;

        let stdout_lines = collect_lines(child.stdout.take(), self.id.clone(), false);
        let stderr_lines = collect_lines(child.stderr.take(), self.id.clone(), true);

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for process of task '{}'", self.id))?;

        let stdout = stdout_lines.await.unwrap_or_default();
        let stderr = stderr_lines.await.unwrap_or_default();
        let code = status.code().unwrap_or(-1);

        if !status.success() {
            bail!("command exited with code {code}: {stderr}");
        }

        Ok(json!({
            "exit_code": code,
            "stdout": stdout,
            "stderr": stderr,
        }))
    }
}

/// Stream a child pipe line by line, logging each line tagged with the task
/// id, and return the collected output once the pipe closes.
fn collect_lines<R>(
    pipe: Option<R>,
    task_id: String,
    is_stderr: bool,
) -> tokio::task::JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(pipe) = pipe else {
            return String::new();
        };

        let mut lines = BufReader::new(pipe).lines();
        let mut collected = Vec::new();

        while let Ok(Some(line)) = lines.next_line().await {
            if is_stderr {
                debug!(task = %task_id, "stderr: {}", line);
            } else {
                info!(task = %task_id, "{}", line);
            }
            collected.push(line);
        }

        collected.join("\n")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let mut task = ShellTask::new("greet", "echo hello");
        let out = task.execute(&TaskResults::new()).await.unwrap();
        assert_eq!(out["exit_code"], 0);
        assert_eq!(out["stdout"], "hello");
    }

    #[tokio::test]
    async fn own_params_substitute_into_command() {
        let mut task = ShellTask::new("greet", "echo ${who}")
            .with_param("who", json!("world"));
        let out = task.execute(&TaskResults::new()).await.unwrap();
        assert_eq!(out["stdout"], "world");
    }

    #[tokio::test]
    async fn store_params_flow_through_task_params() {
        let mut store = ParameterStore::new();
        store.set([("day_id".to_string(), json!("2024-01-10"))]);

        let mut task = ShellTask::new("load", "echo ${day}")
            .with_param("day", json!("${day_id}"));
        task.resolve_params(&store).unwrap();

        let out = task.execute(&TaskResults::new()).await.unwrap();
        assert_eq!(out["stdout"], "2024-01-10");
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let mut task = ShellTask::new("boom", "echo oops >&2; exit 3");
        let err = task.execute(&TaskResults::new()).await.unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("code 3"), "unexpected error: {message}");
        assert!(message.contains("oops"), "unexpected error: {message}");
    }

    #[tokio::test]
    async fn working_dir_is_honoured() {
        let dir = tempfile::tempdir().unwrap();
        let mut task = ShellTask::new("pwd", "pwd").with_working_dir(dir.path());
        let out = task.execute(&TaskResults::new()).await.unwrap();
        let reported = out["stdout"].as_str().unwrap_or_default();
        // Compare canonicalised paths; macOS tempdirs live behind /private.
        assert_eq!(
            std::fs::canonicalize(reported).unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
    }
}
