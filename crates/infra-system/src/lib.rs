// resq Infrastructure - System Adapters
// Implements: TaskHandler for subprocess execution

pub mod shell_task;

pub use shell_task::{ShellArgs, ShellTask};
