//! Provisioning Configuration

use serde::{Deserialize, Serialize};

/// Tunables for the provisioning core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Clone attempts before escalating to manual intervention
    pub max_clone_attempts: u32,
    /// Base of the exponential clone backoff, in seconds
    pub clone_backoff_base_secs: u64,
    /// Transient-error retries per domain binding before it fails
    pub domain_max_retries: u32,
    /// Base of the domain polling backoff, in seconds
    pub domain_backoff_base_secs: u64,
    /// Billing grace window, in days
    pub billing_grace_days: i64,
    /// Cancellation grace window, in days
    pub cancellation_grace_days: i64,
    /// Maximum nesting the rewrite engine will decode
    pub rewrite_depth_limit: u32,
    /// Apex domain tenant subdomains hang off of
    pub platform_apex: String,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            max_clone_attempts: 5,
            clone_backoff_base_secs: 2,
            domain_max_retries: 10,
            domain_backoff_base_secs: 30,
            billing_grace_days: 7,
            cancellation_grace_days: 30,
            rewrite_depth_limit: 50,
            platform_apex: "tessera.app".into(),
        }
    }
}

impl ProvisionConfig {
    /// Fully qualified platform host for a tenant subdomain
    pub fn platform_host(&self, subdomain: &str) -> String {
        format!("{subdomain}.{}", self.platform_apex)
    }

    /// Exponential backoff delay for clone attempt `attempt` (1-based)
    pub fn clone_backoff_secs(&self, attempt: u32) -> u64 {
        self.clone_backoff_base_secs.saturating_mul(1u64 << attempt.min(10))
    }

    /// Backoff delay for the `retry`-th domain poll
    pub fn domain_backoff_secs(&self, retry: u32) -> u64 {
        self.domain_backoff_base_secs.saturating_mul(1u64 << retry.min(6))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let cfg = ProvisionConfig::default();
        assert!(cfg.clone_backoff_secs(1) < cfg.clone_backoff_secs(3));
        // Capped shift keeps the delay finite for absurd attempt counts
        assert_eq!(cfg.clone_backoff_secs(10), cfg.clone_backoff_secs(99));
    }
}
