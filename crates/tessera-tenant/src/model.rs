//! Tenant Data Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_common::{BindingId, JobId, TemplateId, TenantId};
use uuid::Uuid;

/// Tenant lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenantState {
    /// Payment intent received, nothing provisioned yet
    Pending,
    /// Clone job in flight
    Cloning,
    /// Content cloned, serving on the platform subdomain only
    ActivePendingDomain,
    /// Fully provisioned
    Active,
    /// Billing problem, inside the billing grace window
    GraceBilling,
    /// Cancelled, inside the cancellation grace window (content writes gated)
    GraceCancelled,
    /// Grace expired without resolution
    Suspended,
    /// Clone attempts exhausted - operator owns this tenant now
    ManualIntervention,
    /// Deprovisioned. Terminal; resource cleanup happens outside this core
    Deprovisioned,
}

impl TenantState {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deprovisioned)
    }

    /// Short name used in the history log
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Cloning => "cloning",
            Self::ActivePendingDomain => "active_pending_domain",
            Self::Active => "active",
            Self::GraceBilling => "grace_billing",
            Self::GraceCancelled => "grace_cancelled",
            Self::Suspended => "suspended",
            Self::ManualIntervention => "manual_intervention",
            Self::Deprovisioned => "deprovisioned",
        }
    }
}

/// One provisioned customer instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Unique tenant ID
    pub id: TenantId,
    /// Provisioning intent that created this tenant (stable across webhook retries)
    pub intent_id: String,
    /// Owning account
    pub owner_account: String,
    /// Subscription backing this tenant
    pub subscription_id: String,
    /// Lifecycle state
    pub state: TenantState,
    /// Template the tenant was cloned from
    pub template_id: TemplateId,
    /// Platform subdomain ("acme" serves acme.<platform>)
    pub subdomain: String,
    /// Custom domain bindings
    pub domain_bindings: Vec<BindingId>,
    /// Most recent provisioning failure, human readable
    pub last_error: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// New tenant in `Pending`
    pub fn new(
        intent_id: impl Into<String>,
        owner_account: impl Into<String>,
        subscription_id: impl Into<String>,
        template_id: TemplateId,
        subdomain: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            intent_id: intent_id.into(),
            owner_account: owner_account.into(),
            subscription_id: subscription_id.into(),
            state: TenantState::Pending,
            template_id,
            subdomain: subdomain.into(),
            domain_bindings: Vec::new(),
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Clone job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Accepted, waiting for a worker
    Queued,
    /// Copying the template content graph
    Running,
    /// Rewrite pass over the copied values
    Rewriting,
    /// Done. Permanent - never re-executed for the same idempotency key
    Completed,
    /// Failed; retryable until the attempt bound
    Failed,
}

impl JobStatus {
    /// Whether a worker currently owns this job
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Queued | Self::Running | Self::Rewriting)
    }

    /// Short name used in the history log
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Rewriting => "rewriting",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// A template clone attempt, keyed by the triggering activation event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneJob {
    /// Job ID
    pub id: JobId,
    /// Target tenant
    pub tenant_id: TenantId,
    /// Source template
    pub template_id: TemplateId,
    /// Stable across retries of the same subscription activation
    pub idempotency_key: String,
    /// Current status
    pub status: JobStatus,
    /// Attempts consumed so far
    pub attempts: u32,
    /// Last failure, human readable
    pub error: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl CloneJob {
    /// New queued job
    pub fn new(tenant_id: TenantId, template_id: TemplateId, idempotency_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            template_id,
            idempotency_key: idempotency_key.into(),
            status: JobStatus::Queued,
            attempts: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Domain binding state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainState {
    /// DNS record requested
    PendingDns,
    /// Record accepted, certificate order in progress
    PendingSsl,
    /// Certificate issued, checking resolution and ownership
    Verifying,
    /// Verified, waiting for routing activation (gated on clone completion)
    Ready,
    /// Serving traffic
    Active,
    /// Dead until a manual retry restarts it at PendingDns
    Failed,
}

impl DomainState {
    /// The single forward step from this state, if any
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::PendingDns => Some(Self::PendingSsl),
            Self::PendingSsl => Some(Self::Verifying),
            Self::Verifying => Some(Self::Ready),
            Self::Ready => Some(Self::Active),
            Self::Active | Self::Failed => None,
        }
    }

    /// Transitions are forward-only, plus Failed from any non-terminal
    /// state and the manual Failed -> PendingDns restart.
    pub fn can_transition(&self, to: Self) -> bool {
        match (self, to) {
            (Self::Failed, Self::PendingDns) => true,
            (from, Self::Failed) => !matches!(from, Self::Active | Self::Failed),
            (from, to) => from.next() == Some(to),
        }
    }

    /// Short name used in the history log
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingDns => "pending_dns",
            Self::PendingSsl => "pending_ssl",
            Self::Verifying => "verifying",
            Self::Ready => "ready",
            Self::Active => "active",
            Self::Failed => "failed",
        }
    }
}

/// A custom domain attached to a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainBinding {
    /// Binding ID
    pub id: BindingId,
    /// Fully qualified domain name
    pub domain: String,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// State machine position
    pub state: DomainState,
    /// Ownership token the resolution check must answer with
    pub verification_token: String,
    /// Transient-error retries consumed
    pub retry_count: u32,
    /// Last poll time
    pub last_checked: Option<DateTime<Utc>>,
    /// Last failure, human readable
    pub last_error: Option<String>,
}

impl DomainBinding {
    /// New binding in `PendingDns`
    pub fn new(tenant_id: TenantId, domain: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            domain: domain.into(),
            tenant_id,
            state: DomainState::PendingDns,
            verification_token: format!("tessera-verify-{}", Uuid::new_v4()),
            retry_count: 0,
            last_checked: None,
            last_error: None,
        }
    }
}

/// Billing status as observed from the payment provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingStatus {
    /// Paid up
    Current,
    /// Renewal payment failed
    PastDue,
    /// Subscription cancelled
    Cancelled,
}

/// Which grace window, if any, is open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraceKind {
    /// No grace window
    None,
    /// Payment-failure grace
    Billing,
    /// Cancellation grace
    Cancellation,
}

/// Subscription standing for one tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionState {
    /// Tenant this subscription backs
    pub tenant_id: TenantId,
    /// Observed billing status
    pub billing_status: BillingStatus,
    /// Open grace window
    pub grace: GraceKind,
    /// Hard deadline for the open window; recomputed only when the billing
    /// status transitions, never on repeated sweeps
    pub grace_deadline: Option<DateTime<Utc>>,
    /// Set at most once per suspension so at-least-once notification
    /// delivery cannot double-send
    pub suspension_notified: bool,
}

impl SubscriptionState {
    /// Healthy subscription for `tenant_id`
    pub fn current(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            billing_status: BillingStatus::Current,
            grace: GraceKind::None,
            grace_deadline: None,
            suspension_notified: false,
        }
    }
}

/// Append-only audit record for one successful transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// Tenant the transition belongs to
    pub tenant_id: TenantId,
    /// Which machine moved: "tenant", "clone_job", or "domain"
    pub event_type: String,
    /// State before
    pub from: String,
    /// State after
    pub to: String,
    /// When the transition committed
    pub at: DateTime<Utc>,
    /// Clone job that caused it, when one did
    pub cause: Option<JobId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_forward_only() {
        assert!(DomainState::PendingDns.can_transition(DomainState::PendingSsl));
        assert!(!DomainState::PendingDns.can_transition(DomainState::Active));
        assert!(!DomainState::Verifying.can_transition(DomainState::PendingSsl));
        assert!(!DomainState::Active.can_transition(DomainState::Failed));
    }

    #[test]
    fn test_domain_failed_paths() {
        for s in [
            DomainState::PendingDns,
            DomainState::PendingSsl,
            DomainState::Verifying,
            DomainState::Ready,
        ] {
            assert!(s.can_transition(DomainState::Failed));
        }
        assert!(DomainState::Failed.can_transition(DomainState::PendingDns));
        assert!(!DomainState::Failed.can_transition(DomainState::Verifying));
    }

    #[test]
    fn test_job_in_flight() {
        assert!(JobStatus::Queued.is_in_flight());
        assert!(JobStatus::Rewriting.is_in_flight());
        assert!(!JobStatus::Completed.is_in_flight());
        assert!(!JobStatus::Failed.is_in_flight());
    }
}
