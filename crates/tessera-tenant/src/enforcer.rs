//! Subscription Enforcer
//!
//! Periodic sweep that applies grace-period and suspension policy. Billing
//! observations arrive from the payment layer between sweeps; the sweep
//! itself opens grace windows and suspends tenants whose deadline passed.
//! Nothing here deletes content - grace only gates, suspension only
//! transitions state.

use crate::model::{BillingStatus, GraceKind, SubscriptionState, TenantState};
use crate::registry::{RegistryError, TenantRegistry};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tessera_common::{EventKind, Notifier, ProvisionConfig, TenantId};
use tracing::{info, warn};

/// What one sweep did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Grace windows opened this sweep
    pub graces_started: usize,
    /// Tenants suspended this sweep
    pub suspended: usize,
    /// Suspension notifications sent this sweep
    pub notified: usize,
}

/// Applies billing policy against the registry on a fixed interval
pub struct SubscriptionEnforcer {
    registry: Arc<TenantRegistry>,
    notifier: Arc<dyn Notifier>,
    config: ProvisionConfig,
}

impl SubscriptionEnforcer {
    /// New enforcer over `registry`
    pub fn new(
        registry: Arc<TenantRegistry>,
        notifier: Arc<dyn Notifier>,
        config: ProvisionConfig,
    ) -> Self {
        Self {
            registry,
            notifier,
            config,
        }
    }

    /// Record a failed renewal payment observed by the payment layer
    pub fn observe_payment_failure(&self, tenant: TenantId) {
        if let Some(mut sub) = self.registry.subscription(tenant) {
            sub.billing_status = BillingStatus::PastDue;
            self.registry.upsert_subscription(sub);
        }
    }

    /// Record a subscription cancellation
    pub fn observe_cancellation(&self, tenant: TenantId) {
        if let Some(mut sub) = self.registry.subscription(tenant) {
            sub.billing_status = BillingStatus::Cancelled;
            self.registry.upsert_subscription(sub);
        }
    }

    /// Payment resumed: clear any grace and restore the tenant
    ///
    /// Content was only gated during grace, never deleted, so restoring is
    /// purely a state transition.
    pub fn observe_payment_resumed(&self, tenant: TenantId) -> Result<(), RegistryError> {
        if let Some(sub) = self.registry.subscription(tenant) {
            self.registry.upsert_subscription(SubscriptionState {
                billing_status: BillingStatus::Current,
                grace: GraceKind::None,
                grace_deadline: None,
                suspension_notified: false,
                ..sub
            });
        }
        let current = self
            .registry
            .tenant(tenant)
            .ok_or(RegistryError::TenantNotFound(tenant))?
            .state;
        match current {
            TenantState::GraceBilling | TenantState::GraceCancelled | TenantState::Suspended => {
                self.registry
                    .transition_tenant(tenant, current, TenantState::Active, None)?;
                info!(tenant = %tenant, from = current.as_str(), "payment resumed, tenant restored");
            }
            _ => {}
        }
        Ok(())
    }

    /// One enforcement pass over every subscription that is not current
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for sub in self.registry.subscriptions_needing_enforcement() {
            match sub.billing_status {
                BillingStatus::Current => {}
                BillingStatus::PastDue => {
                    if sub.grace != GraceKind::Billing {
                        self.start_grace(
                            sub,
                            GraceKind::Billing,
                            now + Duration::days(self.config.billing_grace_days),
                        );
                        report.graces_started += 1;
                    } else if deadline_passed(&sub, now) {
                        self.suspend(sub, &mut report).await;
                    }
                }
                BillingStatus::Cancelled => {
                    if sub.grace != GraceKind::Cancellation {
                        let tenant = sub.tenant_id;
                        self.start_grace(
                            sub,
                            GraceKind::Cancellation,
                            now + Duration::days(self.config.cancellation_grace_days),
                        );
                        report.graces_started += 1;
                        self.move_to(tenant, TenantState::GraceCancelled);
                    } else if deadline_passed(&sub, now) {
                        self.suspend(sub, &mut report).await;
                    }
                }
            }
        }
        report
    }

    fn start_grace(&self, sub: SubscriptionState, kind: GraceKind, deadline: DateTime<Utc>) {
        info!(tenant = %sub.tenant_id, kind = ?kind, %deadline, "grace window opened");
        self.registry.upsert_subscription(SubscriptionState {
            grace: kind,
            grace_deadline: Some(deadline),
            ..sub
        });
    }

    async fn suspend(&self, sub: SubscriptionState, report: &mut SweepReport) {
        let tenant = sub.tenant_id;
        if self.move_to(tenant, TenantState::Suspended) {
            report.suspended += 1;
        }
        if !sub.suspension_notified {
            self.notifier.notify(tenant, EventKind::TenantSuspended).await;
            self.registry.upsert_subscription(SubscriptionState {
                suspension_notified: true,
                ..sub
            });
            report.notified += 1;
            warn!(tenant = %tenant, "tenant suspended, owner notified");
        }
    }

    /// CAS the tenant into `to` from wherever it currently sits. Returns
    /// false when it is already there or a racing worker won.
    fn move_to(&self, tenant: TenantId, to: TenantState) -> bool {
        let Some(current) = self.registry.tenant(tenant).map(|t| t.state) else {
            return false;
        };
        if current == to || current == TenantState::Deprovisioned {
            return false;
        }
        self.registry
            .transition_tenant(tenant, current, to, None)
            .is_ok()
    }
}

fn deadline_passed(sub: &SubscriptionState, now: DateTime<Utc>) -> bool {
    sub.grace_deadline.map(|d| now >= d).unwrap_or(false)
}
