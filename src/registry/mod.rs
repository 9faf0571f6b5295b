// Registry Client - business registration status lookups
//
// Layers, bottom up:
// - status:    closed status enum + mapping from the service's strings
// - wire:      request/response bodies
// - transport: one HTTP request per batch (trait seam for tests)
// - retry:     bounded retry state machine with an injected sleeper
// - client:    dedupe, batching, partial results, progress events

pub mod client;
pub mod retry;
pub mod status;
pub mod transport;
pub mod wire;

pub use client::{prepare_identifiers, LookupEvent, LookupResult, RegistryClient};
pub use retry::{AttemptState, BatchOutcome, RetryPolicy, Sleeper, ThreadSleeper};
pub use status::{BusinessStatus, RegistryStatus, NO_INFO};
pub use transport::{HttpTransport, RegistryTransport};
pub use wire::{StatusEntry, StatusRequest, StatusResponse};
