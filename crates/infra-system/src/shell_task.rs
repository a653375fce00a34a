// Shell task handler
// Runs a child process per job with environment allowlisting
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use resq_core::domain::JobArgs;
use resq_core::port::{TaskError, TaskHandler};

/// Longest stderr excerpt carried into a failure message
const STDERR_EXCERPT_LEN: usize = 512;

/// Job arguments understood by `ShellTask`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShellArgs {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default)]
    pub working_dir: Option<String>,

    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ShellArgs {
    pub fn parse(args: &JobArgs) -> Result<Self, TaskError> {
        serde_json::from_value(serde_json::Value::Object(args.clone()))
            .map_err(|e| TaskError::InvalidArgs(e.to_string()))
    }
}

/// Spawns isolated child processes; a non-zero exit fails the job
pub struct ShellTask {
    env_allowlist: Vec<String>,
    default_timeout: Option<Duration>,
}

impl ShellTask {
    /// Create a shell task
    ///
    /// # Arguments
    /// * `env_allowlist` - Job-supplied variables that may reach the child
    ///
    /// # Example
    /// ```ignore
    /// let task = ShellTask::new(vec!["RUST_LOG".to_string()]);
    /// registry.register("shell", Arc::new(task));
    /// ```
    pub fn new(env_allowlist: Vec<String>) -> Self {
        Self {
            env_allowlist,
            default_timeout: None,
        }
    }

    /// Limit applied when the job does not set `timeout_ms`
    pub fn with_default_timeout(mut self, limit: Duration) -> Self {
        self.default_timeout = Some(limit);
        self
    }

    /// Filter environment variables to allowlist only
    fn filter_env(&self, env: &HashMap<String, String>) -> HashMap<String, String> {
        env.iter()
            .filter(|(k, _)| self.env_allowlist.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Spawn child process and wait for output
    async fn spawn_and_wait(&self, shell: &ShellArgs) -> Result<Output, TaskError> {
        let mut command = Command::new(&shell.command);
        command
            .args(&shell.args)
            .envs(self.filter_env(&shell.env))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed out or abandoned child must not outlive its job
            .kill_on_drop(true);
        if let Some(dir) = &shell.working_dir {
            command.current_dir(dir);
        }

        let child = command
            .spawn()
            .map_err(|e| TaskError::Failed(format!("spawn '{}' failed: {}", shell.command, e)))?;

        let limit = shell
            .timeout_ms
            .map(Duration::from_millis)
            .or(self.default_timeout);

        match limit {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(output) => output.map_err(|e| TaskError::Failed(e.to_string())),
                Err(_) => Err(TaskError::Timeout(limit)),
            },
            None => child
                .wait_with_output()
                .await
                .map_err(|e| TaskError::Failed(e.to_string())),
        }
    }
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_EXCERPT_LEN {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_EXCERPT_LEN;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

#[async_trait]
impl TaskHandler for ShellTask {
    async fn perform(&self, args: &JobArgs) -> Result<(), TaskError> {
        let shell = ShellArgs::parse(args)?;
        let started = Instant::now();

        info!(
            command = %shell.command,
            args = ?shell.args,
            working_dir = ?shell.working_dir,
            timeout_ms = ?shell.timeout_ms,
            "Starting subprocess"
        );

        let output = self.spawn_and_wait(&shell).await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        debug!(
            command = %shell.command,
            stdout = %String::from_utf8_lossy(&output.stdout),
            "Subprocess output"
        );
        info!(
            command = %shell.command,
            duration_ms,
            exit_code = ?output.status.code(),
            "Subprocess finished"
        );

        if output.status.success() {
            Ok(())
        } else {
            Err(TaskError::Failed(format!(
                "'{}' exited with {}: {}",
                shell.command,
                output
                    .status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                stderr_excerpt(&output.stderr)
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: serde_json::Value) -> JobArgs {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_execute_success() {
        let task = ShellTask::new(vec!["PATH".to_string(), "HOME".to_string()]);
        let result = task
            .perform(&args(json!({"command": "echo", "args": ["hello"]})))
            .await;
        tokio_test::assert_ok!(result);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let task = ShellTask::new(vec![]);
        let result = task
            .perform(&args(json!({"command": "sh", "args": ["-c", "echo oops >&2; exit 3"]})))
            .await;

        match result {
            Err(TaskError::Failed(msg)) => {
                assert!(msg.contains("exited with 3"));
                assert!(msg.contains("oops"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let task = ShellTask::new(vec![]);
        let result = task
            .perform(&args(json!({"command": "sleep", "args": ["10"], "timeout_ms": 100})))
            .await;
        assert_eq!(result, Err(TaskError::Timeout(Duration::from_millis(100))));
    }

    #[tokio::test]
    async fn test_missing_command_is_invalid_args() {
        let task = ShellTask::new(vec![]);
        let result = task.perform(&args(json!({"args": ["x"]}))).await;
        assert!(matches!(result, Err(TaskError::InvalidArgs(_))));
    }

    #[tokio::test]
    async fn test_unknown_binary_is_failure() {
        let task = ShellTask::new(vec![]);
        let result = task
            .perform(&args(json!({"command": "/nonexistent/resq-binary"})))
            .await;
        assert!(matches!(result, Err(TaskError::Failed(_))));
    }

    #[tokio::test]
    async fn test_env_allowlist_reaches_child() {
        let task = ShellTask::new(vec!["ALLOWED_VAR".to_string()]);
        let script = r#"[ "$ALLOWED_VAR" = "value1" ] && [ -z "$BLOCKED_VAR" ]"#;
        let result = task
            .perform(&args(json!({
                "command": "sh",
                "args": ["-c", script],
                "env": {"ALLOWED_VAR": "value1", "BLOCKED_VAR": "value2"}
            })))
            .await;
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_env_filtering() {
        let task = ShellTask::new(vec!["ALLOWED_VAR".to_string()]);

        let mut env = HashMap::new();
        env.insert("ALLOWED_VAR".to_string(), "value1".to_string());
        env.insert("BLOCKED_VAR".to_string(), "value2".to_string());

        let filtered = task.filter_env(&env);

        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key("ALLOWED_VAR"));
        assert!(!filtered.contains_key("BLOCKED_VAR"));
    }

    #[test]
    fn test_stderr_excerpt_keeps_tail() {
        let long = "x".repeat(600) + "END";
        let excerpt = stderr_excerpt(long.as_bytes());
        assert!(excerpt.starts_with("..."));
        assert!(excerpt.ends_with("END"));
        assert_eq!(excerpt.len(), STDERR_EXCERPT_LEN + 3);
    }
}
