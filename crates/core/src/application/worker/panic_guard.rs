// Panic isolation for handlers and worker loops
use std::any::Any;
use std::future::Future;
use std::time::Duration;
use tracing::error;

/// Result of a panic-guarded execution
#[derive(Debug, PartialEq, Eq)]
pub enum PanicGuardResult<T> {
    /// Execution completed (the value may itself be an error)
    Success(T),
    /// Execution panicked
    Panicked(String),
    /// Execution exceeded its limit and was aborted
    TimedOut(Duration),
}

/// Run a future on its own task so a panic cannot unwind into the caller
///
/// With `limit` set, the task is aborted once the limit elapses.
///
/// # Example
/// ```text
/// let result = execute_guarded(async { panic!("boom") }, None).await;
/// assert!(matches!(result, PanicGuardResult::Panicked(_)));
/// ```
pub async fn execute_guarded<F, T>(future: F, limit: Option<Duration>) -> PanicGuardResult<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let mut handle = tokio::spawn(future);

    let joined = match limit {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                return PanicGuardResult::TimedOut(limit);
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(value) => PanicGuardResult::Success(value),
        Err(join_err) if join_err.is_panic() => {
            let panic_msg = panic_message(join_err.into_panic());
            error!(panic_msg = %panic_msg, "Guarded task panicked");
            PanicGuardResult::Panicked(panic_msg)
        }
        Err(join_err) => PanicGuardResult::Panicked(format!("task cancelled: {}", join_err)),
    }
}

/// Extract the message of a panic payload
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_passes_value_through() {
        let result = execute_guarded(async { 42 }, None).await;
        assert_eq!(result, PanicGuardResult::Success(42));
    }

    #[tokio::test]
    async fn test_panic_is_caught() {
        let result = execute_guarded(
            async {
                panic!("test panic");
            },
            None,
        )
        .await;
        assert_eq!(result, PanicGuardResult::<()>::Panicked("test panic".to_string()));

        let id = 7;
        let result = execute_guarded(
            async move {
                panic!("job {} exploded", id);
            },
            None,
        )
        .await;
        assert_eq!(result, PanicGuardResult::<()>::Panicked("job 7 exploded".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_aborts_slow_future() {
        let limit = Duration::from_secs(2);
        let result = execute_guarded(
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
            },
            Some(limit),
        )
        .await;
        assert_eq!(result, PanicGuardResult::TimedOut(limit));
    }
}
