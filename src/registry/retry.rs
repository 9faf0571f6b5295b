// 🔁 Bounded retry as an explicit state machine
//
//   Attempting(n) ──ok──────────────▶ Success
//        │
//        └─err─▶ n < max ─▶ Retry(n) ──sleep(delay)──▶ Attempting(n+1)
//                n = max ─▶ Exhausted
//
// The delay only ever sits between two attempts: never after a success and
// never after the final failure. Sleeping goes through `Sleeper` so tests run
// the full policy without waiting.

use crate::error::AttemptError;
use std::time::Duration;

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Real blocking sleep
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptState<T> {
    Attempting { attempt: u32 },
    Retry { attempt: u32, error: AttemptError },
    Success { attempts: u32, value: T },
    Exhausted { attempts: u32, error: AttemptError },
}

/// Terminal state of one batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome<T> {
    Success { attempts: u32, value: T },
    Exhausted { attempts: u32, error: AttemptError },
}

impl RetryPolicy {
    /// Transition out of `Attempting { attempt }` given that attempt's result
    pub fn after_attempt<T>(&self, attempt: u32, result: Result<T, AttemptError>) -> AttemptState<T> {
        match result {
            Ok(value) => AttemptState::Success {
                attempts: attempt,
                value,
            },
            Err(error) if attempt < self.max_attempts => AttemptState::Retry { attempt, error },
            Err(error) => AttemptState::Exhausted {
                attempts: attempt,
                error,
            },
        }
    }

    /// Drive the machine to a terminal state.
    ///
    /// `attempt_fn` receives the 1-based attempt number.
    pub fn run<T, F>(&self, sleeper: &dyn Sleeper, mut attempt_fn: F) -> BatchOutcome<T>
    where
        F: FnMut(u32) -> Result<T, AttemptError>,
    {
        let mut state = AttemptState::Attempting { attempt: 1 };

        loop {
            state = match state {
                AttemptState::Attempting { attempt } => self.after_attempt(attempt, attempt_fn(attempt)),
                AttemptState::Retry { attempt, error } => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %error,
                        delay_secs = self.delay.as_secs_f64(),
                        "registry attempt failed, retrying"
                    );
                    sleeper.sleep(self.delay);
                    AttemptState::Attempting {
                        attempt: attempt + 1,
                    }
                }
                AttemptState::Success { attempts, value } => {
                    return BatchOutcome::Success { attempts, value };
                }
                AttemptState::Exhausted { attempts, error } => {
                    return BatchOutcome::Exhausted { attempts, error };
                }
            };
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Sleeper;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records requested delays instead of sleeping
    #[derive(Debug, Default)]
    pub struct RecordingSleeper {
        calls: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn new() -> Self {
            RecordingSleeper::default()
        }

        pub fn calls(&self) -> Vec<Duration> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(duration);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingSleeper;
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }

    fn http(status: u16) -> AttemptError {
        AttemptError::HttpStatus { status }
    }

    #[test]
    fn test_transitions() {
        let p = policy();

        assert_eq!(p.after_attempt(1, Ok(7)), AttemptState::Success { attempts: 1, value: 7 });
        assert_eq!(
            p.after_attempt::<u8>(2, Err(http(500))),
            AttemptState::Retry { attempt: 2, error: http(500) }
        );
        assert_eq!(
            p.after_attempt::<u8>(3, Err(http(500))),
            AttemptState::Exhausted { attempts: 3, error: http(500) }
        );
    }

    #[test]
    fn test_immediate_success_never_sleeps() {
        let sleeper = RecordingSleeper::new();
        let outcome = policy().run(&sleeper, |_| Ok("done"));

        assert_eq!(outcome, BatchOutcome::Success { attempts: 1, value: "done" });
        assert!(sleeper.calls().is_empty());
    }

    #[test]
    fn test_two_failures_then_success_sleeps_twice() {
        let sleeper = RecordingSleeper::new();
        let outcome = policy().run(&sleeper, |attempt| {
            if attempt < 3 {
                Err(http(503))
            } else {
                Ok(attempt)
            }
        });

        assert_eq!(outcome, BatchOutcome::Success { attempts: 3, value: 3 });
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(5); 2]);
    }

    #[test]
    fn test_exhaustion_does_not_sleep_after_last_attempt() {
        let sleeper = RecordingSleeper::new();
        let mut calls = 0;
        let outcome: BatchOutcome<()> = policy().run(&sleeper, |_| {
            calls += 1;
            Err(AttemptError::Timeout {
                reason: "slow".to_string(),
            })
        });

        assert_eq!(calls, 3);
        assert!(matches!(outcome, BatchOutcome::Exhausted { attempts: 3, .. }));
        assert_eq!(sleeper.calls().len(), 2);
    }

    #[test]
    fn test_single_attempt_policy() {
        let sleeper = RecordingSleeper::new();
        let p = RetryPolicy {
            max_attempts: 1,
            delay: Duration::from_secs(5),
        };
        let outcome: BatchOutcome<()> = p.run(&sleeper, |_| Err(AttemptError::MissingData));

        assert_eq!(
            outcome,
            BatchOutcome::Exhausted { attempts: 1, error: AttemptError::MissingData }
        );
        assert!(sleeper.calls().is_empty());
    }
}
