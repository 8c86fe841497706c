//! Bounded retry for transient write contention.
//!
//! SQLITE_BUSY and SQLITE_LOCKED surface as [`StorageError::Busy`];
//! this wrapper retries them with exponential backoff up to an attempt
//! ceiling, after which the condition becomes
//! [`StorageError::BusyExhausted`]. Any other error returns on the
//! first occurrence.

use std::time::Duration;

use lore_core::errors::StorageError;

/// Retry policy: attempt ceiling and base delay, doubled per attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
        }
    }
}

/// Run `f`, retrying busy/locked failures per the policy.
pub fn with_busy_retry<T, F>(policy: RetryPolicy, mut f: F) -> Result<T, StorageError>
where
    F: FnMut() -> Result<T, StorageError>,
{
    let attempts = policy.max_attempts.max(1);
    let mut delay = policy.base_delay;
    let mut last_message = String::new();

    for attempt in 1..=attempts {
        match f() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_busy() && attempt < attempts => {
                if let StorageError::Busy { message } = &e {
                    last_message = message.clone();
                }
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "storage busy; backing off");
                std::thread::sleep(delay);
                delay *= 2;
            }
            Err(e) if e.is_busy() => {
                if let StorageError::Busy { message } = e {
                    last_message = message;
                }
                break;
            }
            Err(e) => return Err(e),
        }
    }

    Err(StorageError::BusyExhausted {
        attempts,
        message: last_message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn busy() -> StorageError {
        StorageError::Busy {
            message: "database is locked".to_string(),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn busy_twice_then_success_returns_value() {
        let calls = AtomicU32::new(0);
        let result = with_busy_retry(fast_policy(), || {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(busy())
            } else {
                Ok(17)
            }
        });
        assert_eq!(result.unwrap(), 17);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn persistent_busy_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_busy_retry(fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(busy())
        });
        assert!(matches!(
            result,
            Err(StorageError::BusyExhausted { attempts: 5, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn non_busy_errors_do_not_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_busy_retry(fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Constraint {
                message: "unique".to_string(),
            })
        });
        assert!(matches!(result, Err(StorageError::Constraint { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
