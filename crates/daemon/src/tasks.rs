// Built-in tasks registered by the daemon

use resq_core::port::TaskRegistry;
use resq_infra_system::ShellTask;
use std::sync::Arc;
use tracing::info;

pub const SHELL_TASK: &str = "shell";
pub const ECHO_TASK: &str = "echo";

/// Variables a shell job may pass through to its child process
const SHELL_ENV_ALLOWLIST: [&str; 3] = ["PATH", "HOME", "USER"];

pub fn builtin_registry() -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    registry.register(
        SHELL_TASK,
        Arc::new(ShellTask::new(
            SHELL_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
        )),
    );
    registry.register_fn(ECHO_TASK, |args| async move {
        info!(args = %serde_json::Value::Object(args), "echo");
        Ok(())
    });
    registry
}
