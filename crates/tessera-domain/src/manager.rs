//! Domain Lifecycle Manager

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tessera_common::{
    BindingId, CertificateStatus, DnsProvider, EventKind, HostingPanel, JobScheduler, Notifier,
    ProviderError, ProvisionConfig, ProvisioningJob, TenantId,
};
use tessera_tenant::{DomainBinding, DomainState, RegistryError, TenantRegistry, TenantState};
use thiserror::Error;
use tracing::{info, warn};

/// Domain lifecycle failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Registry rejected a read or write
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Manual retry requested for a binding that is not failed
    #[error("binding for {0} is not in a failed state")]
    NotFailed(String),
}

/// Result of one cooperative `advance` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Committed one forward transition
    Transitioned(DomainState),
    /// Nothing to commit yet; the follow-up poll is booked after `delay_secs`
    Reschedule {
        /// Suggested delay before the next poll
        delay_secs: u64,
    },
    /// Binding is Active or Failed; no further polls needed
    Settled(DomainState),
}

/// State machine driver for custom domains
pub struct DomainManager {
    registry: Arc<TenantRegistry>,
    dns: Arc<dyn DnsProvider>,
    hosting: Arc<dyn HostingPanel>,
    notifier: Arc<dyn Notifier>,
    scheduler: Arc<dyn JobScheduler>,
    config: ProvisionConfig,
}

impl DomainManager {
    /// New manager over the injected capabilities
    pub fn new(
        registry: Arc<TenantRegistry>,
        dns: Arc<dyn DnsProvider>,
        hosting: Arc<dyn HostingPanel>,
        notifier: Arc<dyn Notifier>,
        scheduler: Arc<dyn JobScheduler>,
        config: ProvisionConfig,
    ) -> Self {
        Self {
            registry,
            dns,
            hosting,
            notifier,
            scheduler,
            config,
        }
    }

    /// Register a custom domain for a tenant
    ///
    /// Idempotent: a second request for the same (tenant, domain) pair
    /// returns the existing binding instead of creating a duplicate, and
    /// the DNS record is checked for before it is created.
    pub async fn add_domain(
        &self,
        tenant: TenantId,
        domain: &str,
    ) -> Result<DomainBinding, DomainError> {
        let owner = self
            .registry
            .tenant(tenant)
            .ok_or(RegistryError::TenantNotFound(tenant))?;

        if let Some(existing) = self
            .registry
            .bindings_for_tenant(tenant)
            .into_iter()
            .find(|b| b.domain == domain)
        {
            return Ok(existing);
        }

        let mut binding = DomainBinding::new(tenant, domain);
        self.registry.upsert_domain_binding(binding.clone())?;
        self.registry.attach_binding(tenant, binding.id)?;
        info!(tenant = %tenant, domain, "domain binding created");

        let target = self.config.platform_host(&owner.subdomain);
        match self.request_record(domain, &target).await {
            Ok(()) => {
                binding.state = DomainState::PendingSsl;
                binding.last_checked = Some(Utc::now());
                self.registry.upsert_domain_binding(binding.clone())?;
                self.schedule_poll(binding.id, self.config.domain_backoff_secs(0))
                    .await;
                Ok(binding)
            }
            Err(ProviderError::Transient(reason)) => {
                // Stay in PendingDns; the scheduled advance retries it
                binding.retry_count += 1;
                binding.last_error = Some(reason);
                binding.last_checked = Some(Utc::now());
                self.registry.upsert_domain_binding(binding.clone())?;
                self.schedule_poll(binding.id, self.config.domain_backoff_secs(binding.retry_count))
                    .await;
                Ok(binding)
            }
            Err(ProviderError::Permanent(reason)) => {
                self.fail(binding, "dns registration", &format!("DNS rejected: {reason}"))
                    .await
            }
        }
    }

    /// Advance a binding one step. Invoked by the scheduled sweep; never
    /// blocks waiting on an external status.
    pub async fn advance(
        &self,
        binding_id: BindingId,
        now: DateTime<Utc>,
    ) -> Result<AdvanceOutcome, DomainError> {
        let mut binding = self
            .registry
            .domain_binding(binding_id)
            .ok_or(RegistryError::BindingNotFound(binding_id))?;
        binding.last_checked = Some(now);

        match binding.state {
            DomainState::Active | DomainState::Failed => {
                Ok(AdvanceOutcome::Settled(binding.state))
            }
            DomainState::PendingDns => {
                let owner = self
                    .registry
                    .tenant(binding.tenant_id)
                    .ok_or(RegistryError::TenantNotFound(binding.tenant_id))?;
                let target = self.config.platform_host(&owner.subdomain);
                match self.request_record(&binding.domain, &target).await {
                    Ok(()) => self.step(binding, DomainState::PendingSsl).await,
                    Err(e) => self.handle_provider_error(binding, "dns registration", e).await,
                }
            }
            DomainState::PendingSsl => match self.dns.check_certificate(&binding.domain).await {
                Ok(CertificateStatus::Issued) => self.step(binding, DomainState::Verifying).await,
                Ok(CertificateStatus::Pending) => self.reschedule(binding).await,
                Ok(CertificateStatus::Rejected) => {
                    self.fail(binding, "certificate issuance", "certificate order rejected")
                        .await
                        .map(|b| AdvanceOutcome::Settled(b.state))
                }
                Err(e) => self.handle_provider_error(binding, "certificate issuance", e).await,
            },
            DomainState::Verifying => {
                let owner = self
                    .registry
                    .tenant(binding.tenant_id)
                    .ok_or(RegistryError::TenantNotFound(binding.tenant_id))?;
                let expected = self.config.platform_host(&owner.subdomain);
                match self.dns.check_resolution(&binding.domain).await {
                    Ok(Some(answer)) if answer == expected => {
                        self.step(binding, DomainState::Ready).await
                    }
                    Ok(_) => self.reschedule(binding).await,
                    Err(e) => self.handle_provider_error(binding, "verification", e).await,
                }
            }
            DomainState::Ready => {
                // Final routing activation waits for the clone, even though
                // everything up to here ran while it was still in flight.
                if !self.registry.has_completed_clone(binding.tenant_id) {
                    return self.reschedule(binding).await;
                }
                match self.hosting.add_domain_to_server(&binding.domain).await {
                    Ok(()) => {
                        let outcome = self.step(binding.clone(), DomainState::Active).await?;
                        self.activate_tenant(binding.tenant_id);
                        self.notifier
                            .notify(binding.tenant_id, EventKind::DomainActive)
                            .await;
                        Ok(outcome)
                    }
                    Err(e) => self.handle_provider_error(binding, "routing activation", e).await,
                }
            }
        }
    }

    /// Restart a failed binding at PendingDns (owner-initiated)
    pub fn retry_domain(&self, binding_id: BindingId) -> Result<DomainBinding, DomainError> {
        let mut binding = self
            .registry
            .domain_binding(binding_id)
            .ok_or(RegistryError::BindingNotFound(binding_id))?;
        if binding.state != DomainState::Failed {
            return Err(DomainError::NotFailed(binding.domain));
        }
        binding.state = DomainState::PendingDns;
        binding.retry_count = 0;
        binding.last_error = None;
        self.registry.upsert_domain_binding(binding.clone())?;
        info!(domain = %binding.domain, "manual retry, binding restarted");
        Ok(binding)
    }

    /// Check-before-create: an existing record for the domain satisfies the
    /// request, so a retried call never double-provisions.
    async fn request_record(&self, domain: &str, target: &str) -> Result<(), ProviderError> {
        if let Some(record) = self.dns.find_record(domain).await? {
            if record.target == target {
                return Ok(());
            }
            return Err(ProviderError::Permanent(format!(
                "domain conflict: {domain} already points elsewhere"
            )));
        }
        self.dns.create_record(domain, target).await
    }

    async fn step(
        &self,
        mut binding: DomainBinding,
        to: DomainState,
    ) -> Result<AdvanceOutcome, DomainError> {
        info!(domain = %binding.domain, from = binding.state.as_str(), to = to.as_str(), "domain transition");
        let id = binding.id;
        binding.state = to;
        binding.retry_count = 0;
        binding.last_error = None;
        self.registry.upsert_domain_binding(binding)?;
        // Active needs no further polls; everything else gets its next one
        if to != DomainState::Active {
            self.schedule_poll(id, 0).await;
        }
        Ok(AdvanceOutcome::Transitioned(to))
    }

    async fn reschedule(&self, binding: DomainBinding) -> Result<AdvanceOutcome, DomainError> {
        let delay_secs = self.config.domain_backoff_secs(binding.retry_count);
        let id = binding.id;
        self.registry.upsert_domain_binding(binding)?;
        self.schedule_poll(id, delay_secs).await;
        Ok(AdvanceOutcome::Reschedule { delay_secs })
    }

    async fn schedule_poll(&self, binding: BindingId, delay_secs: u64) {
        self.scheduler
            .schedule(ProvisioningJob::AdvanceDomain { binding }, delay_secs)
            .await;
    }

    async fn handle_provider_error(
        &self,
        mut binding: DomainBinding,
        step: &'static str,
        error: ProviderError,
    ) -> Result<AdvanceOutcome, DomainError> {
        match error {
            ProviderError::Transient(reason) => {
                binding.retry_count += 1;
                if binding.retry_count > self.config.domain_max_retries {
                    let reason = format!("gave up after {} retries: {reason}", binding.retry_count - 1);
                    return self
                        .fail(binding, step, &reason)
                        .await
                        .map(|b| AdvanceOutcome::Settled(b.state));
                }
                warn!(domain = %binding.domain, step, retry = binding.retry_count, "transient provider error");
                binding.last_error = Some(reason);
                self.reschedule(binding).await
            }
            ProviderError::Permanent(reason) => self
                .fail(binding, step, &reason)
                .await
                .map(|b| AdvanceOutcome::Settled(b.state)),
        }
    }

    async fn fail(
        &self,
        mut binding: DomainBinding,
        step: &'static str,
        reason: &str,
    ) -> Result<DomainBinding, DomainError> {
        warn!(domain = %binding.domain, step, reason, "domain binding failed");
        binding.state = DomainState::Failed;
        binding.last_error = Some(format!("{step}: {reason}"));
        self.registry.upsert_domain_binding(binding.clone())?;
        self.notifier
            .notify(binding.tenant_id, EventKind::DomainFailed)
            .await;
        Ok(binding)
    }

    /// Best effort: the first active domain moves the tenant out of
    /// ActivePendingDomain. A racing worker winning first is fine.
    fn activate_tenant(&self, tenant: TenantId) {
        let _ = self.registry.transition_tenant(
            tenant,
            TenantState::ActivePendingDomain,
            TenantState::Active,
            None,
        );
    }
}
