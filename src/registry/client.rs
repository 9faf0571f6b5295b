// 🏛️ Registry Client - bulk status lookup with partial failure
//
// Identifiers are normalized and deduplicated, cut into fixed-size batches and
// sent one batch at a time. A batch that exhausts its retries leaves a gap in
// the result and a failure event; it never aborts the lookup. Whatever was
// gathered is returned, including after cancellation.

use super::retry::{BatchOutcome, RetryPolicy, Sleeper};
use super::status::RegistryStatus;
use super::transport::RegistryTransport;
use crate::config::RegistryConfig;
use crate::error::AttemptError;
use crate::record::normalize_identifier;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

// ============================================================================
// EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LookupEvent {
    BatchSucceeded {
        batch: usize,
        attempts: u32,
        requested: usize,
        returned: usize,
    },

    BatchFailed {
        batch: usize,
        attempts: u32,
        identifiers: Vec<String>,
        error: String,
    },

    /// The service answered the same identifier twice; the later answer won
    DuplicateStatus {
        batch: usize,
        identifier: String,
    },

    /// Emitted after every batch, in completion order
    Progress { completed: usize, total: usize },
}

impl LookupEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LookupEvent::BatchSucceeded { .. } => "batch_succeeded",
            LookupEvent::BatchFailed { .. } => "batch_failed",
            LookupEvent::DuplicateStatus { .. } => "duplicate_status",
            LookupEvent::Progress { .. } => "progress",
        }
    }
}

// ============================================================================
// LOOKUP RESULT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupResult {
    /// Keyed by normalized identifier
    pub statuses: HashMap<String, RegistryStatus>,
    pub events: Vec<LookupEvent>,
    /// Unique identifiers requested
    pub total: usize,
    /// Stopped early; later batches were never sent
    pub cancelled: bool,
}

impl LookupResult {
    /// Identifiers of every exhausted batch, in batch order
    pub fn failed_identifiers(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                LookupEvent::BatchFailed { identifiers, .. } => Some(identifiers),
                _ => None,
            })
            .flatten()
            .map(|s| s.as_str())
            .collect()
    }

    pub fn failed_batches(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, LookupEvent::BatchFailed { .. }))
            .count()
    }

    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failed_batches() == 0
    }
}

// ============================================================================
// CLIENT
// ============================================================================

/// Normalize, drop empties, dedupe; first occurrence keeps its position
pub fn prepare_identifiers<'a, I>(identifiers: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    identifiers
        .into_iter()
        .map(normalize_identifier)
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

pub struct RegistryClient<T: RegistryTransport, S: Sleeper> {
    transport: T,
    sleeper: S,
    policy: RetryPolicy,
    batch_size: usize,
}

impl<T: RegistryTransport, S: Sleeper> RegistryClient<T, S> {
    pub fn new(transport: T, sleeper: S, policy: RetryPolicy, batch_size: usize) -> Self {
        RegistryClient {
            transport,
            sleeper,
            policy,
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_config(transport: T, sleeper: S, config: &RegistryConfig) -> Self {
        let policy = RetryPolicy {
            max_attempts: config.max_attempts,
            delay: config.retry_delay(),
        };
        RegistryClient::new(transport, sleeper, policy, config.batch_size)
    }

    pub fn lookup<'a, I>(&self, identifiers: I, on_event: &mut dyn FnMut(&LookupEvent)) -> LookupResult
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.lookup_until(identifiers, &AtomicBool::new(false), on_event)
    }

    /// Look up identifiers, checking `cancel` before each batch.
    ///
    /// `on_event` sees every event as it happens; the same events are also
    /// collected into the result.
    pub fn lookup_until<'a, I>(
        &self,
        identifiers: I,
        cancel: &AtomicBool,
        on_event: &mut dyn FnMut(&LookupEvent),
    ) -> LookupResult
    where
        I: IntoIterator<Item = &'a str>,
    {
        let ids = prepare_identifiers(identifiers);
        let total = ids.len();
        let mut result = LookupResult {
            total,
            ..LookupResult::default()
        };
        let mut emit = |result: &mut LookupResult, event: LookupEvent| {
            on_event(&event);
            result.events.push(event);
        };

        tracing::info!(total, batch_size = self.batch_size, "starting registry lookup");
        let mut completed = 0;

        for (batch, chunk) in ids.chunks(self.batch_size).enumerate() {
            if cancel.load(Ordering::Relaxed) {
                tracing::warn!(completed, total, "registry lookup cancelled");
                result.cancelled = true;
                break;
            }

            let outcome = self
                .policy
                .run(&self.sleeper, |_| self.transport.send(chunk));

            match outcome {
                BatchOutcome::Success { attempts, value } => {
                    let returned = value.len();
                    for entry in value {
                        let status = entry.to_status();
                        if status.identifier.is_empty() {
                            tracing::warn!(batch, "registry entry without b_no ignored");
                            continue;
                        }
                        let identifier = status.identifier.clone();
                        if result.statuses.insert(identifier.clone(), status).is_some() {
                            tracing::warn!(batch, %identifier, "duplicate registry status, keeping the later one");
                            emit(&mut result, LookupEvent::DuplicateStatus { batch, identifier });
                        }
                    }
                    emit(
                        &mut result,
                        LookupEvent::BatchSucceeded {
                            batch,
                            attempts,
                            requested: chunk.len(),
                            returned,
                        },
                    );
                }
                BatchOutcome::Exhausted { attempts, error } => {
                    log_exhausted(batch, attempts, chunk, &error);
                    emit(
                        &mut result,
                        LookupEvent::BatchFailed {
                            batch,
                            attempts,
                            identifiers: chunk.to_vec(),
                            error: error.to_string(),
                        },
                    );
                }
            }

            completed += chunk.len();
            emit(&mut result, LookupEvent::Progress { completed, total });
        }

        tracing::info!(
            found = result.statuses.len(),
            failed_batches = result.failed_batches(),
            cancelled = result.cancelled,
            "registry lookup finished"
        );
        result
    }
}

fn log_exhausted(batch: usize, attempts: u32, chunk: &[String], error: &AttemptError) {
    tracing::error!(
        batch,
        attempts,
        identifiers = chunk.len(),
        error = %error,
        "registry batch failed after all attempts"
    );
}

// ============================================================================
// TESTS
// ============================================================================
