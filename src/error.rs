//! Error types for lemonlock

use thiserror::Error;

/// Stable error codes recorded in the error history and shown to users
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Key failed the local format check
    InvalidKeyFormat,
    /// Authority said the key is invalid, unknown, or for another product
    LicenseRejected,
    /// Authority answered 429
    RateLimited,
    /// Network, timeout or unexpected HTTP status
    NetworkError,
    /// A key is already bound to this installation
    AlreadyBound,
    /// No key is bound to this installation
    NotBound,
    /// Gated feature requested without a license
    FeatureLocked,
    /// Persisted state could not be read or written
    StorageError,
    /// Invalid configuration value
    ConfigError,
    /// Recorded by the retry executor for each failed attempt
    RetryError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidKeyFormat => write!(f, "INVALID_KEY_FORMAT"),
            Self::LicenseRejected => write!(f, "LICENSE_REJECTED"),
            Self::RateLimited => write!(f, "RATE_LIMITED"),
            Self::NetworkError => write!(f, "NETWORK_ERROR"),
            Self::AlreadyBound => write!(f, "ALREADY_BOUND"),
            Self::NotBound => write!(f, "NOT_BOUND"),
            Self::FeatureLocked => write!(f, "FEATURE_LOCKED"),
            Self::StorageError => write!(f, "STORAGE_ERROR"),
            Self::ConfigError => write!(f, "CONFIG_ERROR"),
            Self::RetryError => write!(f, "RETRY_ERROR"),
        }
    }
}

/// lemonlock error
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Key does not have the `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX` shape.
    #[error("invalid license key format")]
    InvalidKeyFormat,

    /// The authority explicitly refused the key.
    #[error("license rejected: {reason}")]
    Rejected {
        reason: String,
        /// HTTP 404: the key does not exist at all
        not_found: bool,
    },

    #[error("licensing service rate limited the request")]
    RateLimited,

    #[error("network error: {message}")]
    Transport {
        message: String,
        status_code: Option<u16>,
    },

    #[error("a license is already active; deactivate it first")]
    AlreadyBound,

    #[error("no license is active")]
    NotBound,

    #[error("{feature} requires an active license")]
    FeatureLocked { feature: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LicenseError {
    /// Create a rejection error
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
            not_found: false,
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self::Transport {
            message: message.into(),
            status_code,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidKeyFormat => ErrorCode::InvalidKeyFormat,
            Self::Rejected { .. } => ErrorCode::LicenseRejected,
            Self::RateLimited => ErrorCode::RateLimited,
            Self::Transport { .. } => ErrorCode::NetworkError,
            Self::AlreadyBound => ErrorCode::AlreadyBound,
            Self::NotBound => ErrorCode::NotBound,
            Self::FeatureLocked { .. } => ErrorCode::FeatureLocked,
            Self::Storage(_) | Self::Serialization(_) => ErrorCode::StorageError,
            Self::Config(_) => ErrorCode::ConfigError,
        }
    }

    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Transport { .. })
    }

    /// Whether the authority gave a definitive "not licensed" answer.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Result type for lemonlock operations
pub type Result<T> = std::result::Result<T, LicenseError>;
