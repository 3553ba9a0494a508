//! Tessera Provision - from payment event to provisioned tenant
//!
//! The orchestrator consumes `PaymentConfirmed` events, deduplicates them
//! against the clone-job ledger, and hands the long-running work to the
//! injected job runner. The cloner copies a template's content graph into
//! the tenant namespace and rewrites every embedded reference to the
//! tenant's identity, with idempotency keyed to the triggering
//! subscription activation.

#![warn(missing_docs)]

pub mod cloner;
pub mod orchestrator;

pub use cloner::{CloneError, CloneOutcome, ContentStore, TemplateCloner};
pub use orchestrator::{OrchestratorOutcome, PaymentConfirmed, ProvisioningOrchestrator};
