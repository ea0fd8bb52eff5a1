use serde::{Deserialize, Serialize};

use crate::error::{LicenseError, Result};
use crate::models::{AuthorityMeta, Instance, LicenseDetails};

/// Why the authority (or the local pre-check) refused a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    /// Failed the local format check; nothing was sent
    MalformedKey,
    /// HTTP 404
    NotFound { message: String },
    /// The authority answered with a negative verdict
    NotValid { message: String },
    StoreMismatch { expected: u64, actual: u64 },
    ProductMismatch { expected: u64, actual: u64 },
    /// Positive verdict without the ownership block needed to check it
    MissingMeta,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedKey => write!(f, "license key is malformed"),
            Self::NotFound { message } => write!(f, "license key not found: {}", message),
            Self::NotValid { message } => write!(f, "{}", message),
            Self::StoreMismatch { expected, actual } => write!(
                f,
                "license belongs to store {} (expected {})",
                actual, expected
            ),
            Self::ProductMismatch { expected, actual } => write!(
                f,
                "license belongs to product {} (expected {})",
                actual, expected
            ),
            Self::MissingMeta => write!(f, "response did not identify the store and product"),
        }
    }
}

/// Accepted authority response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorityGrant {
    pub meta: Option<AuthorityMeta>,
    pub instance: Option<Instance>,
    pub license_key: Option<LicenseDetails>,
    /// Full response body, persisted as `apiData`
    pub raw: serde_json::Value,
}

/// Outcome of a single authority request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AuthorityResult {
    Valid(AuthorityGrant),
    Invalid { reason: RejectionReason },
    TransportError {
        http_status: Option<u16>,
        message: String,
    },
}

impl AuthorityResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, AuthorityResult::Valid(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            AuthorityResult::TransportError {
                http_status: Some(429),
                ..
            }
        )
    }

    /// Fold into the crate error taxonomy.
    pub fn into_result(self) -> Result<AuthorityGrant> {
        match self {
            AuthorityResult::Valid(grant) => Ok(grant),
            AuthorityResult::Invalid {
                reason: RejectionReason::MalformedKey,
            } => Err(LicenseError::InvalidKeyFormat),
            AuthorityResult::Invalid { reason } => Err(LicenseError::Rejected {
                not_found: matches!(reason, RejectionReason::NotFound { .. }),
                reason: reason.to_string(),
            }),
            AuthorityResult::TransportError {
                http_status: Some(429),
                ..
            } => Err(LicenseError::RateLimited),
            AuthorityResult::TransportError {
                http_status,
                message,
            } => Err(LicenseError::transport(message, http_status)),
        }
    }
}
