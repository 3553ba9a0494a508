//! Tenant Registry
//!
//! Sole source of truth. All writes go through conditional operations that
//! fail with `StateConflict` on a stale read; multiple worker processes
//! coordinate through these, never through in-process locks.

use crate::model::{
    BillingStatus, CloneJob, DomainBinding, HistoryEvent, SubscriptionState, Tenant, TenantState,
};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use tessera_common::{BindingId, JobId, TenantId};
use thiserror::Error;
use tracing::info;

/// Registry failure modes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No such tenant
    #[error("tenant not found: {0}")]
    TenantNotFound(TenantId),

    /// No such domain binding
    #[error("domain binding not found: {0}")]
    BindingNotFound(BindingId),

    /// Stale read: the caller must re-fetch and retry
    #[error("state conflict on {entity}: expected {expected}, found {actual}")]
    StateConflict {
        /// Which record conflicted
        entity: &'static str,
        /// State the caller assumed
        expected: String,
        /// State actually stored
        actual: String,
    },

    /// A non-terminal clone job already exists for this tenant
    #[error("clone job already in flight for tenant {0}")]
    JobInFlight(TenantId),

    /// Content-mutating operations are rejected during cancellation grace
    #[error("content writes gated for tenant {0} (cancellation grace)")]
    ContentGated(TenantId),
}

/// Durable store of tenant/domain/job/subscription state
pub struct TenantRegistry {
    tenants: RwLock<HashMap<TenantId, Tenant>>,
    jobs: RwLock<HashMap<JobId, CloneJob>>,
    bindings: RwLock<HashMap<BindingId, DomainBinding>>,
    subscriptions: DashMap<TenantId, SubscriptionState>,
    history: RwLock<Vec<HistoryEvent>>,
}

impl TenantRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
            jobs: RwLock::new(HashMap::new()),
            bindings: RwLock::new(HashMap::new()),
            subscriptions: DashMap::new(),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Insert a freshly created tenant and its subscription record
    pub fn create_tenant(&self, tenant: Tenant) -> Tenant {
        info!(tenant = %tenant.id, subdomain = %tenant.subdomain, "tenant created");
        self.subscriptions
            .insert(tenant.id, SubscriptionState::current(tenant.id));
        self.append_history(HistoryEvent {
            tenant_id: tenant.id,
            event_type: "tenant".into(),
            from: "-".into(),
            to: tenant.state.as_str().into(),
            at: Utc::now(),
            cause: None,
        });
        self.tenants.write().insert(tenant.id, tenant.clone());
        tenant
    }

    /// Fetch a tenant
    pub fn tenant(&self, id: TenantId) -> Option<Tenant> {
        self.tenants.read().get(&id).cloned()
    }

    /// Fetch a tenant by its provisioning intent (webhook retries carry the
    /// same intent id)
    pub fn tenant_by_intent(&self, intent_id: &str) -> Option<Tenant> {
        self.tenants
            .read()
            .values()
            .find(|t| t.intent_id == intent_id)
            .cloned()
    }

    /// Conditionally move a tenant from `from` to `to`
    ///
    /// The compare and the swap happen under one write lock, so concurrent
    /// workers racing on the same tenant serialize here: exactly one wins,
    /// the rest see `StateConflict`.
    pub fn transition_tenant(
        &self,
        id: TenantId,
        from: TenantState,
        to: TenantState,
        cause: Option<JobId>,
    ) -> Result<(), RegistryError> {
        let mut tenants = self.tenants.write();
        let tenant = tenants.get_mut(&id).ok_or(RegistryError::TenantNotFound(id))?;
        if tenant.state != from {
            return Err(RegistryError::StateConflict {
                entity: "tenant",
                expected: from.as_str().into(),
                actual: tenant.state.as_str().into(),
            });
        }
        if from.is_terminal() {
            return Err(RegistryError::StateConflict {
                entity: "tenant",
                expected: from.as_str().into(),
                actual: "terminal".into(),
            });
        }
        tenant.state = to;
        tenant.updated_at = Utc::now();
        drop(tenants);

        info!(tenant = %id, from = from.as_str(), to = to.as_str(), "tenant transition");
        self.append_history(HistoryEvent {
            tenant_id: id,
            event_type: "tenant".into(),
            from: from.as_str().into(),
            to: to.as_str().into(),
            at: Utc::now(),
            cause,
        });
        Ok(())
    }

    /// Record a provisioning failure on the tenant without touching its state
    pub fn set_last_error(&self, id: TenantId, message: &str) -> Result<(), RegistryError> {
        let mut tenants = self.tenants.write();
        let tenant = tenants.get_mut(&id).ok_or(RegistryError::TenantNotFound(id))?;
        tenant.last_error = Some(message.to_string());
        tenant.updated_at = Utc::now();
        Ok(())
    }

    /// Attach a domain binding id to its tenant
    pub fn attach_binding(&self, id: TenantId, binding: BindingId) -> Result<(), RegistryError> {
        let mut tenants = self.tenants.write();
        let tenant = tenants.get_mut(&id).ok_or(RegistryError::TenantNotFound(id))?;
        if !tenant.domain_bindings.contains(&binding) {
            tenant.domain_bindings.push(binding);
            tenant.updated_at = Utc::now();
        }
        Ok(())
    }

    /// Reject content-mutating work while the tenant sits in cancellation
    /// grace; reads stay open
    pub fn ensure_content_writable(&self, id: TenantId) -> Result<(), RegistryError> {
        let tenants = self.tenants.read();
        let tenant = tenants.get(&id).ok_or(RegistryError::TenantNotFound(id))?;
        if tenant.state == TenantState::GraceCancelled {
            return Err(RegistryError::ContentGated(id));
        }
        Ok(())
    }

    /// Insert or update a clone job
    ///
    /// Guards two invariants: a `Completed` job is immutable, and a tenant
    /// holds at most one in-flight job at a time (the "job in flight"
    /// marker that replaces per-tenant locks).
    pub fn upsert_clone_job(&self, job: CloneJob) -> Result<(), RegistryError> {
        let mut jobs = self.jobs.write();
        let previous = jobs.get(&job.id).cloned();

        if let Some(prev) = &previous {
            if prev.status == crate::model::JobStatus::Completed && job.status != prev.status {
                return Err(RegistryError::StateConflict {
                    entity: "clone_job",
                    expected: job.status.as_str().into(),
                    actual: prev.status.as_str().into(),
                });
            }
        } else if job.status.is_in_flight() {
            let clash = jobs
                .values()
                .any(|j| j.tenant_id == job.tenant_id && j.status.is_in_flight());
            if clash {
                return Err(RegistryError::JobInFlight(job.tenant_id));
            }
        }

        let from = previous
            .map(|p| p.status.as_str())
            .unwrap_or("-")
            .to_string();
        if from != job.status.as_str() {
            self.append_history(HistoryEvent {
                tenant_id: job.tenant_id,
                event_type: "clone_job".into(),
                from,
                to: job.status.as_str().into(),
                at: Utc::now(),
                cause: Some(job.id),
            });
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    /// Fetch a clone job by id
    pub fn clone_job(&self, id: JobId) -> Option<CloneJob> {
        self.jobs.read().get(&id).cloned()
    }

    /// Fetch a clone job by idempotency key
    pub fn clone_job_by_key(&self, key: &str) -> Option<CloneJob> {
        self.jobs
            .read()
            .values()
            .find(|j| j.idempotency_key == key)
            .cloned()
    }

    /// Whether any clone for this tenant has completed - the gate in front
    /// of final domain routing activation
    pub fn has_completed_clone(&self, tenant: TenantId) -> bool {
        self.jobs
            .read()
            .values()
            .any(|j| j.tenant_id == tenant && j.status == crate::model::JobStatus::Completed)
    }

    /// Insert or update a domain binding, validating the state transition
    pub fn upsert_domain_binding(&self, binding: DomainBinding) -> Result<(), RegistryError> {
        let mut bindings = self.bindings.write();
        if let Some(prev) = bindings.get(&binding.id) {
            if prev.state != binding.state && !prev.state.can_transition(binding.state) {
                return Err(RegistryError::StateConflict {
                    entity: "domain_binding",
                    expected: binding.state.as_str().into(),
                    actual: prev.state.as_str().into(),
                });
            }
            if prev.state != binding.state {
                self.append_history(HistoryEvent {
                    tenant_id: binding.tenant_id,
                    event_type: "domain".into(),
                    from: prev.state.as_str().into(),
                    to: binding.state.as_str().into(),
                    at: Utc::now(),
                    cause: None,
                });
            }
        } else {
            self.append_history(HistoryEvent {
                tenant_id: binding.tenant_id,
                event_type: "domain".into(),
                from: "-".into(),
                to: binding.state.as_str().into(),
                at: Utc::now(),
                cause: None,
            });
        }
        bindings.insert(binding.id, binding);
        Ok(())
    }

    /// Fetch a domain binding
    pub fn domain_binding(&self, id: BindingId) -> Option<DomainBinding> {
        self.bindings.read().get(&id).cloned()
    }

    /// All bindings owned by a tenant
    pub fn bindings_for_tenant(&self, id: TenantId) -> Vec<DomainBinding> {
        self.bindings
            .read()
            .values()
            .filter(|b| b.tenant_id == id)
            .cloned()
            .collect()
    }

    /// Store a subscription record
    pub fn upsert_subscription(&self, sub: SubscriptionState) {
        self.subscriptions.insert(sub.tenant_id, sub);
    }

    /// Fetch a subscription record
    pub fn subscription(&self, id: TenantId) -> Option<SubscriptionState> {
        self.subscriptions.get(&id).map(|s| s.clone())
    }

    /// Subscriptions the enforcer sweep cares about
    pub fn subscriptions_needing_enforcement(&self) -> Vec<SubscriptionState> {
        self.subscriptions
            .iter()
            .filter(|s| s.billing_status != BillingStatus::Current)
            .map(|s| s.clone())
            .collect()
    }

    /// Append an audit record
    pub fn record_history_event(&self, event: HistoryEvent) {
        self.append_history(event);
    }

    /// Full history, oldest first
    pub fn history(&self) -> Vec<HistoryEvent> {
        self.history.read().clone()
    }

    /// History for one tenant, oldest first
    pub fn history_for_tenant(&self, id: TenantId) -> Vec<HistoryEvent> {
        self.history
            .read()
            .iter()
            .filter(|e| e.tenant_id == id)
            .cloned()
            .collect()
    }

    fn append_history(&self, event: HistoryEvent) {
        self.history.write().push(event);
    }
}

impl Default for TenantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DomainState, JobStatus};

    fn tenant() -> Tenant {
        Tenant::new("intent-1", "acct-1", "sub-1", "TPL-A".into(), "acme")
    }

    #[test]
    fn test_transition_cas() {
        let registry = TenantRegistry::new();
        let t = registry.create_tenant(tenant());

        registry
            .transition_tenant(t.id, TenantState::Pending, TenantState::Cloning, None)
            .unwrap();

        // Second worker with a stale read loses
        let err = registry
            .transition_tenant(t.id, TenantState::Pending, TenantState::Cloning, None)
            .unwrap_err();
        assert!(matches!(err, RegistryError::StateConflict { .. }));

        assert_eq!(registry.tenant(t.id).unwrap().state, TenantState::Cloning);
    }

    #[test]
    fn test_history_appended_per_transition() {
        let registry = TenantRegistry::new();
        let t = registry.create_tenant(tenant());
        registry
            .transition_tenant(t.id, TenantState::Pending, TenantState::Cloning, None)
            .unwrap();
        registry
            .transition_tenant(t.id, TenantState::Cloning, TenantState::ActivePendingDomain, None)
            .unwrap();

        let history = registry.history_for_tenant(t.id);
        assert_eq!(history.len(), 3); // creation + two transitions
        assert_eq!(history[2].from, "cloning");
        assert_eq!(history[2].to, "active_pending_domain");
    }

    #[test]
    fn test_single_in_flight_job_per_tenant() {
        let registry = TenantRegistry::new();
        let t = registry.create_tenant(tenant());

        let job = CloneJob::new(t.id, "TPL-A".into(), "key-1");
        registry.upsert_clone_job(job.clone()).unwrap();

        let second = CloneJob::new(t.id, "TPL-A".into(), "key-1");
        assert!(matches!(
            registry.upsert_clone_job(second),
            Err(RegistryError::JobInFlight(_))
        ));

        // Finishing the first frees the slot
        let mut done = job;
        done.status = JobStatus::Completed;
        registry.upsert_clone_job(done).unwrap();
        registry
            .upsert_clone_job(CloneJob::new(t.id, "TPL-A".into(), "key-2"))
            .unwrap();
    }

    #[test]
    fn test_completed_job_immutable() {
        let registry = TenantRegistry::new();
        let t = registry.create_tenant(tenant());
        let mut job = CloneJob::new(t.id, "TPL-A".into(), "key-1");
        job.status = JobStatus::Completed;
        registry.upsert_clone_job(job.clone()).unwrap();

        job.status = JobStatus::Running;
        assert!(matches!(
            registry.upsert_clone_job(job),
            Err(RegistryError::StateConflict { .. })
        ));
    }

    #[test]
    fn test_binding_transition_validated() {
        let registry = TenantRegistry::new();
        let t = registry.create_tenant(tenant());
        let mut binding = DomainBinding::new(t.id, "reviews.acme.com");
        registry.upsert_domain_binding(binding.clone()).unwrap();

        // Skipping straight to Active is rejected
        binding.state = DomainState::Active;
        assert!(registry.upsert_domain_binding(binding.clone()).is_err());

        binding.state = DomainState::PendingSsl;
        registry.upsert_domain_binding(binding).unwrap();
    }

    #[test]
    fn test_content_gated_in_cancellation_grace() {
        let registry = TenantRegistry::new();
        let t = registry.create_tenant(tenant());
        registry
            .transition_tenant(t.id, TenantState::Pending, TenantState::Cloning, None)
            .unwrap();
        registry
            .transition_tenant(t.id, TenantState::Cloning, TenantState::ActivePendingDomain, None)
            .unwrap();
        registry
            .transition_tenant(
                t.id,
                TenantState::ActivePendingDomain,
                TenantState::GraceCancelled,
                None,
            )
            .unwrap();

        assert!(matches!(
            registry.ensure_content_writable(t.id),
            Err(RegistryError::ContentGated(_))
        ));
    }
}
