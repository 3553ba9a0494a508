//! Provider error split
//!
//! Every external capability call resolves to one of two buckets: transient
//! (retried with backoff) or permanent (surfaced immediately, no retry).
//! Callers never see raw provider codes - the message is the human-readable
//! reason that ends up on the tenant's provisioning status.

use thiserror::Error;

/// Error returned by external DNS/CA/hosting/notification capabilities
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Timeout or 5xx class failure - safe to retry with backoff
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Unrecoverable rejection (domain bound elsewhere, quota exhausted)
    #[error("permanent provider error: {0}")]
    Permanent(String),
}

impl ProviderError {
    /// Whether a retry with backoff is worthwhile
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Result type for capability calls
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_split() {
        assert!(ProviderError::Transient("timeout".into()).is_transient());
        assert!(!ProviderError::Permanent("domain conflict".into()).is_transient());
    }
}
