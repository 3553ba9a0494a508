//! Tessera Domain - custom-domain lifecycle management
//!
//! Drives a DomainBinding from registration request to active traffic
//! routing: `pending_dns -> pending_ssl -> verifying -> ready -> active`,
//! with `failed` reachable from any non-terminal state. Polling is
//! cooperative - every `advance` call either commits one transition or
//! asks to be rescheduled; it never parks a worker waiting on a provider.

#![warn(missing_docs)]

pub mod manager;

pub use manager::{AdvanceOutcome, DomainError, DomainManager};
