//! Tessera Tenant - registry, data model, and subscription enforcement
//!
//! The registry is the sole source of truth for tenant, clone-job, domain
//! binding, and subscription state. Workers in different processes
//! coordinate exclusively through its conditional transitions - there are
//! no cross-process locks, only compare-and-swap state changes that fail
//! with `StateConflict` on a stale read. Every successful transition lands
//! in an append-only history log for audit and incident replay.

#![warn(missing_docs)]

pub mod enforcer;
pub mod model;
pub mod registry;

pub use enforcer::{SubscriptionEnforcer, SweepReport};
pub use model::{
    BillingStatus, CloneJob, DomainBinding, DomainState, GraceKind, HistoryEvent, JobStatus,
    SubscriptionState, Tenant, TenantState,
};
pub use registry::{RegistryError, TenantRegistry};
