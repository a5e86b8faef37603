//! Error taxonomy for the voucher controllers.
//!
//! Every failure a controller can observe falls into one of three classes:
//! malformed local input, transport failure reaching the ledger, or an
//! explicit ledger rejection. Controllers never propagate these past their
//! boundary; they turn them into a displayed message and a state transition.

use thiserror::Error;

/// Shown for transport failures.
pub const NETWORK_FALLBACK_MESSAGE: &str = "Something went wrong, please try again later";

/// Shown for ledger rejections that carry no message of their own.
pub const DOMAIN_FALLBACK_MESSAGE: &str = "The ticket service rejected the request";

/// Errors observed by the issuance, ticket view and redemption controllers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoucherError {
    /// Malformed input, detected before any network call
    #[error("invalid input: {0}")]
    Validation(String),

    /// Transport-level failure reaching the ledger (non-2xx, malformed body, I/O)
    #[error("ledger unreachable: {0}")]
    Network(String),

    /// The ledger explicitly rejected the request
    #[error("ledger rejected request: {}", message.as_deref().unwrap_or("no message"))]
    Domain {
        /// Human-readable message supplied by the ledger, if any
        message: Option<String>,
    },
}

impl VoucherError {
    /// Ledger rejection with a message
    #[must_use]
    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain {
            message: Some(message.into()),
        }
    }

    /// Ledger rejection, keeping the message only if it is non-blank
    #[must_use]
    pub fn domain_from(message: Option<String>) -> Self {
        Self::Domain {
            message: message.filter(|m| !m.trim().is_empty()),
        }
    }

    /// Transport failure
    #[must_use]
    pub fn network(reason: impl Into<String>) -> Self {
        Self::Network(reason.into())
    }

    /// The message a controller displays for this error
    ///
    /// Validation and domain messages are shown verbatim; transport details
    /// are logged but never shown.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Network(_) => NETWORK_FALLBACK_MESSAGE.to_string(),
            Self::Domain { message } => message
                .clone()
                .unwrap_or_else(|| DOMAIN_FALLBACK_MESSAGE.to_string()),
        }
    }

    /// Whether this error is a ledger rejection
    #[must_use]
    pub const fn is_domain(&self) -> bool {
        matches!(self, Self::Domain { .. })
    }
}

/// Errors from the local device binding store
#[derive(Debug, Error)]
pub enum BindingError {
    /// Reading or writing the binding record failed
    #[error("binding store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The stored record could not be decoded
    #[error("binding record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// The diagnostic reset was requested while diagnostics are disabled
    #[error("binding reset is only available with diagnostics enabled")]
    DiagnosticsDisabled,
}

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was present but could not be parsed
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        /// Environment variable name
        key: &'static str,
        /// Raw value found
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// A variable required by the selected configuration is missing
    #[error("missing required variable {0}")]
    Missing(&'static str),
}
