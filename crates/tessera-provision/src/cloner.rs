//! Template Cloner
//!
//! Copies a template's content graph into a new tenant's namespace and
//! rewrites every reference to the template's canonical domain into the
//! tenant's platform host. Idempotent per provisioning attempt: the clone
//! job ledger in the registry is the dedup point, so concurrent workers and
//! webhook retries never run the same clone twice.

use async_trait::async_trait;
use std::sync::Arc;
use tessera_common::{
    EventKind, HostingPanel, JobId, JobScheduler, Notifier, ProviderError, ProviderResult,
    ProvisionConfig, ProvisioningJob, TemplateId, TenantId,
};
use tessera_content::{encode, rewrite_with_limit, ContentError, Value};
use tessera_tenant::{CloneJob, JobStatus, RegistryError, TenantRegistry, TenantState};
use thiserror::Error;
use tracing::{error, info, warn};

/// The cloned-content owner, at its interface boundary
///
/// Storage, rendering, and cleanup of this content belong to the CMS side
/// of the platform; the cloner only copies and rewrites through this seam.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// The canonical identifier/domain embedded throughout the template
    async fn canonical_identifier(&self, template: &str) -> ProviderResult<String>;

    /// Every (key, value) entry in the template's content graph
    async fn template_entries(&self, template: &str) -> ProviderResult<Vec<(String, Value)>>;

    /// Write one entry into the tenant's namespace
    async fn put(&self, tenant: TenantId, key: &str, value: Value) -> ProviderResult<()>;

    /// Read the tenant's namespace back
    async fn entries(&self, tenant: TenantId) -> ProviderResult<Vec<(String, Value)>>;

    /// Drop everything written for a tenant (deprovisioned mid-clone)
    async fn discard(&self, tenant: TenantId) -> ProviderResult<()>;
}

/// Result of one `clone_template` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneOutcome {
    /// This call ran the clone to completion
    Completed {
        /// The completed job
        job: JobId,
        /// Entries whose rewritten encoding differed and were replaced
        rewritten: usize,
    },
    /// A previous attempt already completed; nothing was re-executed
    AlreadyCompleted(JobId),
    /// Another worker owns an in-flight job for this key or tenant
    InProgress(JobId),
    /// This attempt failed; a retry is scheduled unless the bound is spent
    Failed {
        /// The failed job
        job: JobId,
        /// Backoff before the scheduled retry; None once escalated
        retry_in_secs: Option<u64>,
    },
}

/// Hard errors that prevent the cloner from even recording an attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloneError {
    /// Registry rejected a read or write
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// What sank a clone attempt, and whether retrying can help
enum StepFailure {
    Retryable(String),
    NonRetryable(String),
}

impl From<ProviderError> for StepFailure {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Transient(r) => Self::Retryable(format!("provider: {r}")),
            ProviderError::Permanent(r) => Self::NonRetryable(format!("provider: {r}")),
        }
    }
}

impl From<ContentError> for StepFailure {
    fn from(e: ContentError) -> Self {
        // Corrupt or over-nested content never fixes itself on retry
        Self::NonRetryable(e.to_string())
    }
}

/// Copies and rewrites template content graphs
pub struct TemplateCloner {
    registry: Arc<TenantRegistry>,
    content: Arc<dyn ContentStore>,
    hosting: Arc<dyn HostingPanel>,
    notifier: Arc<dyn Notifier>,
    scheduler: Arc<dyn JobScheduler>,
    config: ProvisionConfig,
}

impl TemplateCloner {
    /// New cloner over the injected capabilities
    pub fn new(
        registry: Arc<TenantRegistry>,
        content: Arc<dyn ContentStore>,
        hosting: Arc<dyn HostingPanel>,
        notifier: Arc<dyn Notifier>,
        scheduler: Arc<dyn JobScheduler>,
        config: ProvisionConfig,
    ) -> Self {
        Self {
            registry,
            content,
            hosting,
            notifier,
            scheduler,
            config,
        }
    }

    /// Run (or dedup) the clone for `idempotency_key`
    pub async fn clone_template(
        &self,
        template: &TemplateId,
        tenant: TenantId,
        idempotency_key: &str,
    ) -> Result<CloneOutcome, CloneError> {
        let mut job = match self.registry.clone_job_by_key(idempotency_key) {
            Some(existing) if existing.status == JobStatus::Completed => {
                info!(key = idempotency_key, "clone already completed, returning cached result");
                return Ok(CloneOutcome::AlreadyCompleted(existing.id));
            }
            Some(existing) if existing.status.is_in_flight() => {
                return Ok(CloneOutcome::InProgress(existing.id));
            }
            Some(failed) => {
                if failed.attempts >= self.config.max_clone_attempts {
                    return self.escalate(failed).await;
                }
                failed
            }
            None => {
                let fresh = CloneJob::new(tenant, template.clone(), idempotency_key);
                match self.registry.upsert_clone_job(fresh.clone()) {
                    Ok(()) => fresh,
                    // Lost the race: another worker holds the tenant's slot
                    Err(RegistryError::JobInFlight(_)) => {
                        let owner = self
                            .registry
                            .clone_job_by_key(idempotency_key)
                            .map(|j| j.id)
                            .unwrap_or(fresh.id);
                        return Ok(CloneOutcome::InProgress(owner));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        job.status = JobStatus::Running;
        job.attempts += 1;
        job.updated_at = chrono::Utc::now();
        self.registry.upsert_clone_job(job.clone())?;

        // Pending -> Cloning on the first attempt; retries find it there
        let _ = self
            .registry
            .transition_tenant(tenant, TenantState::Pending, TenantState::Cloning, Some(job.id));

        match self.run(&mut job).await {
            Ok(rewritten) => {
                job.status = JobStatus::Completed;
                job.error = None;
                self.registry.upsert_clone_job(job.clone())?;
                self.finish(&job).await?;
                Ok(CloneOutcome::Completed {
                    job: job.id,
                    rewritten,
                })
            }
            Err(failure) => self.record_failure(job, failure).await,
        }
    }

    /// The actual clone: copy, then rewrite. Runs under a `Running` job.
    async fn run(&self, job: &mut CloneJob) -> Result<usize, StepFailure> {
        self.registry
            .ensure_content_writable(job.tenant_id)
            .map_err(|e| StepFailure::NonRetryable(e.to_string()))?;

        let tenant = self
            .registry
            .tenant(job.tenant_id)
            .ok_or_else(|| StepFailure::NonRetryable("tenant record missing".into()))?;

        // At-least-once safe: the panel treats an existing subdomain as
        // satisfied, and the name is derived from the tenant record
        self.hosting.create_subdomain(&tenant.subdomain).await?;

        let canonical = self.content.canonical_identifier(&job.template_id).await?;
        let replacement = self.config.platform_host(&tenant.subdomain);
        let entries = self.content.template_entries(&job.template_id).await?;

        for (key, value) in &entries {
            self.content.put(job.tenant_id, key, value.clone()).await?;
        }
        info!(job = %job.id, count = entries.len(), "template copied, starting rewrite");

        job.status = JobStatus::Rewriting;
        self.registry
            .upsert_clone_job(job.clone())
            .map_err(|e| StepFailure::NonRetryable(e.to_string()))?;

        let mut rewritten = 0usize;
        for (key, value) in &entries {
            let out = rewrite_with_limit(
                value,
                &canonical,
                &replacement,
                self.config.rewrite_depth_limit,
            )?;
            // Only replace entries whose bytes actually changed, so
            // unrelated content keeps its unmodified status
            if encode(&out) != encode(value) {
                self.content.put(job.tenant_id, key, out).await?;
                rewritten += 1;
            }
        }
        info!(job = %job.id, rewritten, "rewrite pass complete");
        Ok(rewritten)
    }

    /// Post-completion bookkeeping: discard output for a tenant that was
    /// deprovisioned while the clone was in flight, otherwise surface it.
    async fn finish(&self, job: &CloneJob) -> Result<(), CloneError> {
        let state = self
            .registry
            .tenant(job.tenant_id)
            .map(|t| t.state)
            .ok_or(RegistryError::TenantNotFound(job.tenant_id))?;

        if state == TenantState::Deprovisioned {
            warn!(job = %job.id, "tenant deprovisioned mid-clone, discarding output");
            if let Err(e) = self.content.discard(job.tenant_id).await {
                error!(job = %job.id, error = %e, "discard failed");
            }
            return Ok(());
        }

        self.registry.transition_tenant(
            job.tenant_id,
            TenantState::Cloning,
            TenantState::ActivePendingDomain,
            Some(job.id),
        )?;
        self.notifier
            .notify(job.tenant_id, EventKind::TenantProvisioned)
            .await;
        Ok(())
    }

    async fn record_failure(
        &self,
        mut job: CloneJob,
        failure: StepFailure,
    ) -> Result<CloneOutcome, CloneError> {
        let (reason, retryable) = match failure {
            StepFailure::Retryable(r) => (r, true),
            StepFailure::NonRetryable(r) => (r, false),
        };
        warn!(job = %job.id, attempt = job.attempts, reason, retryable, "clone attempt failed");

        job.status = JobStatus::Failed;
        job.error = Some(reason.clone());
        self.registry.upsert_clone_job(job.clone())?;
        self.registry
            .set_last_error(job.tenant_id, &format!("clone failed: {reason}"))?;

        if !retryable || job.attempts >= self.config.max_clone_attempts {
            return self.escalate(job).await;
        }

        let delay = self.config.clone_backoff_secs(job.attempts);
        self.scheduler
            .schedule(
                ProvisioningJob::Clone {
                    tenant: job.tenant_id,
                    template: job.template_id.clone(),
                    idempotency_key: job.idempotency_key.clone(),
                },
                delay,
            )
            .await;
        Ok(CloneOutcome::Failed {
            job: job.id,
            retry_in_secs: Some(delay),
        })
    }

    /// Bounded retries spent (or the failure can never succeed): park the
    /// tenant for an operator and stop scheduling work.
    async fn escalate(&self, job: CloneJob) -> Result<CloneOutcome, CloneError> {
        error!(job = %job.id, tenant = %job.tenant_id, "clone attempts exhausted, escalating");
        let current = self
            .registry
            .tenant(job.tenant_id)
            .map(|t| t.state)
            .ok_or(RegistryError::TenantNotFound(job.tenant_id))?;
        // Only a tenant still mid-provisioning gets parked; an already
        // escalated (or gated) tenant is not re-notified
        if matches!(current, TenantState::Pending | TenantState::Cloning) {
            let _ = self.registry.transition_tenant(
                job.tenant_id,
                current,
                TenantState::ManualIntervention,
                Some(job.id),
            );
            self.notifier
                .notify(job.tenant_id, EventKind::OperatorEscalation)
                .await;
            self.notifier
                .notify(job.tenant_id, EventKind::ProvisioningFailed)
                .await;
        }
        Ok(CloneOutcome::Failed {
            job: job.id,
            retry_in_secs: None,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use tessera_content::decode;
    use tessera_tenant::Tenant;

    const TPL: &str = "TPL-A";
    const CANONICAL: &str = "tpl-a.templates.tessera.app";

    struct Fixture {
        registry: Arc<TenantRegistry>,
        content: Arc<FakeContentStore>,
        hosting: Arc<FakeHosting>,
        notifier: Arc<CountingNotifier>,
        scheduler: Arc<RecordingScheduler>,
        cloner: TemplateCloner,
        tenant: TenantId,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(TenantRegistry::new());
        let content = FakeContentStore::new();
        content.seed_template(TPL, CANONICAL, reviews_template());
        let hosting = FakeHosting::new();
        let notifier = CountingNotifier::new();
        let scheduler = RecordingScheduler::new();
        let cloner = TemplateCloner::new(
            registry.clone(),
            content.clone(),
            hosting.clone(),
            notifier.clone(),
            scheduler.clone(),
            ProvisionConfig::default(),
        );
        let tenant = registry
            .create_tenant(Tenant::new("i-1", "acct", "sub-1", TPL.into(), "acme"))
            .id;
        Fixture {
            registry,
            content,
            hosting,
            notifier,
            scheduler,
            cloner,
            tenant,
        }
    }

    #[tokio::test]
    async fn test_clone_rewrites_and_activates() {
        let f = fixture();
        let outcome = f.cloner.clone_template(&TPL.into(), f.tenant, "sub-1").await.unwrap();

        let rewritten = match outcome {
            CloneOutcome::Completed { rewritten, .. } => rewritten,
            other => panic!("expected completion, got {other:?}"),
        };
        // home, nav, and the composite widget referenced the canonical
        // domain; footer and year did not and must keep their bytes
        assert_eq!(rewritten, 3);

        assert_eq!(
            f.registry.tenant(f.tenant).unwrap().state,
            TenantState::ActivePendingDomain
        );

        let entries = f.content.entries(f.tenant).await.unwrap();
        for (_, value) in &entries {
            assert!(!format!("{value:?}").contains(CANONICAL));
        }
        let widget_raw = entries
            .iter()
            .find(|(k, _)| k == "widget")
            .map(|(_, v)| match v {
                Value::Composite(raw) => raw.clone(),
                other => panic!("expected composite, got {other:?}"),
            })
            .unwrap();
        // Composite stayed internally consistent after the rewrite
        let widget = decode(&widget_raw).unwrap();
        assert!(format!("{widget:?}").contains("acme.tessera.app"));
        assert_eq!(f.notifier.count(EventKind::TenantProvisioned), 1);
        assert_eq!(f.hosting.subdomains.lock().as_slice(), ["acme"]);
    }

    #[tokio::test]
    async fn test_completed_key_is_cached() {
        let f = fixture();
        let first = f.cloner.clone_template(&TPL.into(), f.tenant, "sub-1").await.unwrap();
        let job = match first {
            CloneOutcome::Completed { job, .. } => job,
            other => panic!("expected completion, got {other:?}"),
        };

        let puts_after_first = *f.content.puts.lock();
        let second = f.cloner.clone_template(&TPL.into(), f.tenant, "sub-1").await.unwrap();
        assert_eq!(second, CloneOutcome::AlreadyCompleted(job));
        // No side effects on the cached path
        assert_eq!(*f.content.puts.lock(), puts_after_first);
    }

    #[tokio::test]
    async fn test_in_flight_job_not_duplicated() {
        let f = fixture();
        // Another worker's job occupies the tenant's slot
        let theirs = CloneJob::new(f.tenant, TPL.into(), "sub-1");
        f.registry.upsert_clone_job(theirs.clone()).unwrap();

        let outcome = f.cloner.clone_template(&TPL.into(), f.tenant, "sub-1").await.unwrap();
        assert_eq!(outcome, CloneOutcome::InProgress(theirs.id));
        assert_eq!(*f.content.puts.lock(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_schedules_backoff_retry() {
        let f = fixture();
        *f.content.fetch_faults.lock() = 1;

        let outcome = f.cloner.clone_template(&TPL.into(), f.tenant, "sub-1").await.unwrap();
        match outcome {
            CloneOutcome::Failed { retry_in_secs, .. } => assert!(retry_in_secs.is_some()),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(f.scheduler.jobs.lock().len(), 1);
        // Visible state unchanged apart from last_error
        let tenant = f.registry.tenant(f.tenant).unwrap();
        assert_eq!(tenant.state, TenantState::Cloning);
        assert!(tenant.last_error.unwrap().contains("clone failed"));

        // Retry with the same key succeeds and bumps the attempt counter
        let retry = f.cloner.clone_template(&TPL.into(), f.tenant, "sub-1").await.unwrap();
        assert!(matches!(retry, CloneOutcome::Completed { .. }));
        let job = f.registry.clone_job_by_key("sub-1").unwrap();
        assert_eq!(job.attempts, 2);
    }

    #[tokio::test]
    async fn test_attempts_exhausted_escalates_once() {
        let f = fixture();
        let max = ProvisionConfig::default().max_clone_attempts;
        *f.content.fetch_faults.lock() = max + 2;

        for _ in 0..max {
            f.cloner.clone_template(&TPL.into(), f.tenant, "sub-1").await.unwrap();
        }
        let spent = f.cloner.clone_template(&TPL.into(), f.tenant, "sub-1").await.unwrap();
        assert!(matches!(
            spent,
            CloneOutcome::Failed {
                retry_in_secs: None,
                ..
            }
        ));
        assert_eq!(
            f.registry.tenant(f.tenant).unwrap().state,
            TenantState::ManualIntervention
        );
        // Operator and owner each informed exactly once
        assert_eq!(f.notifier.count(EventKind::OperatorEscalation), 1);
        assert_eq!(f.notifier.count(EventKind::ProvisioningFailed), 1);

        // Calling again does not re-notify
        f.cloner.clone_template(&TPL.into(), f.tenant, "sub-1").await.unwrap();
        assert_eq!(f.notifier.count(EventKind::OperatorEscalation), 1);
        assert_eq!(f.notifier.count(EventKind::ProvisioningFailed), 1);
    }

    #[tokio::test]
    async fn test_malformed_composite_is_non_retryable() {
        let f = fixture();
        f.content.seed_template(
            "TPL-BAD",
            CANONICAL,
            vec![("broken".into(), Value::Composite(vec![0xff, 0x00]))],
        );
        let tenant = f
            .registry
            .create_tenant(Tenant::new("i-2", "acct", "sub-2", "TPL-BAD".into(), "beta"))
            .id;

        let outcome = f
            .cloner
            .clone_template(&"TPL-BAD".into(), tenant, "sub-2")
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CloneOutcome::Failed {
                retry_in_secs: None,
                ..
            }
        ));
        // No retry scheduled for corrupt content
        assert!(f.scheduler.jobs.lock().is_empty());
        let job = f.registry.clone_job_by_key("sub-2").unwrap();
        assert!(job.error.unwrap().contains("malformed encoding"));
    }

    #[tokio::test]
    async fn test_deprovisioned_mid_clone_discards_output() {
        let f = fixture();
        *f.content.deprovision_on_fetch.lock() = Some((f.registry.clone(), f.tenant));

        let outcome = f.cloner.clone_template(&TPL.into(), f.tenant, "sub-1").await.unwrap();
        // The job finished rather than being interrupted mid-write
        assert!(matches!(outcome, CloneOutcome::Completed { .. }));
        // ...but its output is gone and the tenant stays deprovisioned
        assert!(f.content.entries(f.tenant).await.unwrap().is_empty());
        assert_eq!(
            f.registry.tenant(f.tenant).unwrap().state,
            TenantState::Deprovisioned
        );
    }

    #[tokio::test]
    async fn test_content_gated_tenant_cannot_clone() {
        let f = fixture();
        f.registry
            .transition_tenant(f.tenant, TenantState::Pending, TenantState::Cloning, None)
            .unwrap();
        f.registry
            .transition_tenant(f.tenant, TenantState::Cloning, TenantState::ActivePendingDomain, None)
            .unwrap();
        f.registry
            .transition_tenant(
                f.tenant,
                TenantState::ActivePendingDomain,
                TenantState::GraceCancelled,
                None,
            )
            .unwrap();

        let outcome = f.cloner.clone_template(&TPL.into(), f.tenant, "sub-1").await.unwrap();
        assert!(matches!(
            outcome,
            CloneOutcome::Failed {
                retry_in_secs: None,
                ..
            }
        ));
        assert_eq!(*f.content.puts.lock(), 0);
    }
}
