//! Capability Seams
//!
//! The core never talks to a concrete DNS registrar, CA, hosting panel, or
//! job queue. Each external system is an injected trait object, and every
//! call is assumed at-least-once: implementations of the core must
//! check-before-create so a retried call after a network failure never
//! double-provisions.

use crate::error::ProviderResult;
use crate::ids::{BindingId, TemplateId, TenantId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Certificate issuance status as reported by the CA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificateStatus {
    /// Issuance still in progress
    Pending,
    /// Certificate issued and installed
    Issued,
    /// CA rejected the order
    Rejected,
}

/// A DNS record as seen by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Fully qualified domain name
    pub domain: String,
    /// Record target (platform ingress host or IP)
    pub target: String,
}

/// DNS/CA capability
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Look up an existing record for `domain`, if any
    async fn find_record(&self, domain: &str) -> ProviderResult<Option<DnsRecord>>;

    /// Create a record pointing `domain` at `target`
    async fn create_record(&self, domain: &str, target: &str) -> ProviderResult<()>;

    /// Poll certificate issuance for `domain`
    async fn check_certificate(&self, domain: &str) -> ProviderResult<CertificateStatus>;

    /// Resolve `domain` and return what it currently points at, if anything
    async fn check_resolution(&self, domain: &str) -> ProviderResult<Option<String>>;
}

/// Hosting-panel capability
#[async_trait]
pub trait HostingPanel: Send + Sync {
    /// Create the tenant's platform subdomain
    async fn create_subdomain(&self, name: &str) -> ProviderResult<()>;

    /// Route traffic for a verified custom domain to the tenant's instance
    async fn add_domain_to_server(&self, domain: &str) -> ProviderResult<()>;
}

/// Events the notification capability can deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Tenant provisioned and serving on its subdomain
    TenantProvisioned,
    /// Custom domain active
    DomainActive,
    /// Custom domain failed and needs owner action
    DomainFailed,
    /// Tenant suspended after an expired grace period
    TenantSuspended,
    /// Provisioning could not be completed - owner-facing counterpart of
    /// the operator escalation
    ProvisioningFailed,
    /// Clone attempts exhausted - operator intervention required
    OperatorEscalation,
}

/// Notification capability - fire and forget, at-least-once delivery
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `kind` for `tenant`. Callers keep their own triggers
    /// idempotent (e.g. the suspension-notified flag).
    async fn notify(&self, tenant: TenantId, kind: EventKind);
}

/// A background job the core asks the runner to execute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisioningJob {
    /// Run (or retry) a template clone
    Clone {
        /// Target tenant
        tenant: TenantId,
        /// Template to clone
        template: TemplateId,
        /// Stable key tied to the triggering subscription activation
        idempotency_key: String,
    },
    /// Advance a domain binding one step
    AdvanceDomain {
        /// Binding to advance
        binding: BindingId,
    },
}

/// Injected background-job runner
///
/// The core never embeds a cron mechanism; deployment environments bring
/// their own runner and multiple worker processes may execute jobs
/// concurrently.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Enqueue `job` for execution after `delay_secs`
    async fn schedule(&self, job: ProvisioningJob, delay_secs: u64);
}
