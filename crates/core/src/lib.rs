// resq Core - Domain Logic, Ports & Dispatch
// NO infrastructure dependencies: stores and handlers are plugged in through ports

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;

pub use config::ResqConfig;
pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
