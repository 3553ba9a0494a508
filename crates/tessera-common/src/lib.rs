//! Tessera Common - Shared types for the tenant provisioning core
//!
//! This crate provides the pieces every subsystem leans on:
//! - Typed identifiers for tenants, templates, jobs, and bindings
//! - The provider error split (transient vs permanent)
//! - Capability traits for DNS/CA, hosting panel, notification, scheduling,
//!   and the cloned-content store
//! - Provisioning configuration knobs
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     PROVISIONING CORE                           │
//! │                                                                 │
//! │  PaymentConfirmed ──▶ Orchestrator ──▶ Cloner ──▶ Registry      │
//! │                            │                        ▲           │
//! │          addDomain ──▶ Domain Manager ──────────────┤           │
//! │                                                     │           │
//! │          interval  ──▶ Subscription Enforcer ───────┘           │
//! │                                                                 │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │ Capabilities: DnsProvider | HostingPanel | Notifier |      │  │
//! │  │               JobScheduler | ContentStore                  │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod capability;
pub mod config;
pub mod error;
pub mod ids;

pub use capability::{
    CertificateStatus, DnsProvider, DnsRecord, EventKind, HostingPanel, JobScheduler, Notifier,
    ProvisioningJob,
};
pub use config::ProvisionConfig;
pub use error::{ProviderError, ProviderResult};
pub use ids::{BindingId, JobId, TemplateId, TenantId};
