//! Token validation contract
//!
//! Token issuance and refresh live outside this system; the pipeline only
//! consumes a validation verdict before doing any cache or fetch work.

use crate::errors::AuthReason;
use async_trait::async_trait;

/// Verdict on the caller's current session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenStatus {
    pub valid: bool,
    pub reason: Option<AuthReason>,
}

impl TokenStatus {
    #[must_use]
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    #[must_use]
    pub fn invalid(reason: AuthReason) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}

/// Validates the caller's current session token.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate_current_token(&self) -> TokenStatus;
}

/// Fixed-verdict validator, for tests and local development.
#[derive(Debug, Clone)]
pub struct StaticValidator {
    status: TokenStatus,
}

impl StaticValidator {
    #[must_use]
    pub fn accepting() -> Self {
        Self {
            status: TokenStatus::valid(),
        }
    }

    #[must_use]
    pub fn rejecting(reason: AuthReason) -> Self {
        Self {
            status: TokenStatus::invalid(reason),
        }
    }
}

#[async_trait]
impl TokenValidator for StaticValidator {
    async fn validate_current_token(&self) -> TokenStatus {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_validator_reports_its_verdict() {
        let status = StaticValidator::accepting().validate_current_token().await;
        assert!(status.valid);
        assert!(status.reason.is_none());

        let status = StaticValidator::rejecting(AuthReason::Revoked)
            .validate_current_token()
            .await;
        assert!(!status.valid);
        assert_eq!(status.reason, Some(AuthReason::Revoked));
    }
}
