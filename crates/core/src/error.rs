// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Queue store failure (connectivity, command error). Transient.
    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid pool parameters (zero workers, no queues). Fatal.
    #[error("Pool construction error: {0}")]
    PoolConstruction(String),

    #[error("Reservation error: {0}")]
    Reservation(#[from] crate::application::reservation::ReservationError),

    #[error("Task error: {0}")]
    Task(#[from] crate::port::TaskError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Transient errors are logged and retried by the loop that observed them
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Store(_) | AppError::Io(_))
    }
}
