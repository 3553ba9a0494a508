//! Provisioning Orchestrator
//!
//! The inbound edge of the core: consumes payment-confirmed events from the
//! (already verified) webhook layer, guards against duplicate work, and
//! hands the long-running clone to the injected job runner so the event
//! handler returns immediately.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_common::{JobScheduler, ProvisioningJob, TemplateId, TenantId};
use tessera_tenant::{RegistryError, Tenant, TenantRegistry};
use tracing::info;

/// A confirmed payment for a provisioning intent
///
/// Signature verification and payload validation happened upstream; these
/// fields are trusted inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmed {
    /// Intent id, stable across webhook redeliveries
    pub tenant_intent_id: String,
    /// Subscription that was activated
    pub subscription_id: String,
    /// Owning account
    pub owner_account: String,
    /// Template chosen at signup
    pub template_id: TemplateId,
    /// Subdomain chosen at signup
    pub subdomain: String,
}

impl PaymentConfirmed {
    /// Clone idempotency key: derived from the activation event, stable
    /// across retries and redeliveries of the same activation
    pub fn idempotency_key(&self) -> String {
        format!("activation-{}", self.subscription_id)
    }
}

/// What the orchestrator decided to do with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorOutcome {
    /// First activation: clone scheduled, tenant record ready
    Scheduled {
        /// The tenant being provisioned
        tenant: TenantId,
    },
    /// A completed clone already exists - this is a renewal, not a first
    /// activation
    Renewal {
        /// The already provisioned tenant
        tenant: TenantId,
    },
    /// A clone is already in flight for this tenant
    InFlight {
        /// The tenant whose clone is running
        tenant: TenantId,
    },
}

/// Coordinates cloner and domain manager from payment events
pub struct ProvisioningOrchestrator {
    registry: Arc<TenantRegistry>,
    scheduler: Arc<dyn JobScheduler>,
}

impl ProvisioningOrchestrator {
    /// New orchestrator over `registry` and the injected job runner
    pub fn new(registry: Arc<TenantRegistry>, scheduler: Arc<dyn JobScheduler>) -> Self {
        Self {
            registry,
            scheduler,
        }
    }

    /// Handle one `PaymentConfirmed` event
    ///
    /// Never blocks on the clone itself: the work is scheduled and the
    /// handler returns. Safe under webhook redelivery - the clone-job
    /// ledger deduplicates by idempotency key and by in-flight tenant.
    pub async fn handle_payment_confirmed(
        &self,
        event: PaymentConfirmed,
    ) -> Result<OrchestratorOutcome, RegistryError> {
        let tenant = match self.registry.tenant_by_intent(&event.tenant_intent_id) {
            Some(existing) => existing,
            None => self.registry.create_tenant(Tenant::new(
                &event.tenant_intent_id,
                &event.owner_account,
                &event.subscription_id,
                event.template_id.clone(),
                &event.subdomain,
            )),
        };

        // Renewal is a tenant-level check: a completed clone under any
        // earlier subscription means this tenant's content is live, and a
        // re-activation under a fresh subscription id must not re-copy it.
        if self.registry.has_completed_clone(tenant.id) {
            info!(tenant = %tenant.id, "completed clone exists, treating as renewal");
            return Ok(OrchestratorOutcome::Renewal { tenant: tenant.id });
        }

        let key = event.idempotency_key();
        if let Some(job) = self.registry.clone_job_by_key(&key) {
            if job.status.is_in_flight() {
                return Ok(OrchestratorOutcome::InFlight { tenant: tenant.id });
            }
            // Failed jobs rejoin the queue below; the cloner enforces the
            // attempt bound
        }

        info!(tenant = %tenant.id, template = %event.template_id, "scheduling clone");
        self.scheduler
            .schedule(
                ProvisioningJob::Clone {
                    tenant: tenant.id,
                    template: event.template_id,
                    idempotency_key: key,
                },
                0,
            )
            .await;
        Ok(OrchestratorOutcome::Scheduled { tenant: tenant.id })
    }
}
