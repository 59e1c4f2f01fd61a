//! Typed errors with stable string codes
//!
//! Every failure surfaced by the orchestrators carries an [`ErrorCode`] so
//! reactive consumers can branch on a stable identifier instead of matching
//! message text. Collaborator traits return `eyre::Result`; anything that
//! bubbles up from them is normalized through [`WalletError::normalize`].

use std::fmt;
use std::sync::Arc;

/// Stable machine-readable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoAvailableTokens,
    TokenNotAvailable,
    PairTokenNotFound,
    AccountNotCompatibleWithToken,
    AmountBelowMinimum,
    AmountAboveMaximum,
    InsufficientFeeTokenBalance,
    BridgeNotReady,
    SwapNotReady,
    Timeout,
    Unexpected,
}

impl ErrorCode {
    /// Get the code as its wire-stable string form
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoAvailableTokens => "NO_AVAILABLE_TOKENS",
            ErrorCode::TokenNotAvailable => "TOKEN_NOT_AVAILABLE",
            ErrorCode::PairTokenNotFound => "PAIR_TOKEN_NOT_FOUND",
            ErrorCode::AccountNotCompatibleWithToken => "ACCOUNT_NOT_COMPATIBLE_WITH_TOKEN",
            ErrorCode::AmountBelowMinimum => "AMOUNT_BELOW_MINIMUM",
            ErrorCode::AmountAboveMaximum => "AMOUNT_ABOVE_MAXIMUM",
            ErrorCode::InsufficientFeeTokenBalance => "INSUFFICIENT_FEE_TOKEN_BALANCE",
            ErrorCode::BridgeNotReady => "BRIDGE_NOT_READY",
            ErrorCode::SwapNotReady => "SWAP_NOT_READY",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Unexpected => "UNEXPECTED_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized error carried by both propagation channels: field `error`
/// slots for reactive consumers and `Err` returns for imperative callers.
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct WalletError {
    code: ErrorCode,
    message: String,
    cause: Option<Arc<eyre::Report>>,
}

impl WalletError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// Wrap an arbitrary failure as `UNEXPECTED_ERROR`, preserving the
    /// original as cause
    pub fn unexpected(cause: eyre::Report) -> Self {
        Self {
            code: ErrorCode::Unexpected,
            message: "an unexpected error occurred".to_string(),
            cause: Some(Arc::new(cause)),
        }
    }

    /// Convert a collaborator failure into a typed error. A `WalletError`
    /// buried inside the report comes back out unchanged; anything else is
    /// wrapped as `UNEXPECTED_ERROR`.
    pub fn normalize(report: eyre::Report) -> Self {
        match report.downcast::<WalletError>() {
            Ok(err) => err,
            Err(report) => Self::unexpected(report),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&eyre::Report> {
        self.cause.as_deref()
    }
}

impl From<eyre::Report> for WalletError {
    fn from(report: eyre::Report) -> Self {
        Self::normalize(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::eyre;

    #[test]
    fn test_code_strings_are_stable() {
        assert_eq!(ErrorCode::NoAvailableTokens.as_str(), "NO_AVAILABLE_TOKENS");
        assert_eq!(
            ErrorCode::AccountNotCompatibleWithToken.as_str(),
            "ACCOUNT_NOT_COMPATIBLE_WITH_TOKEN"
        );
        assert_eq!(ErrorCode::Unexpected.as_str(), "UNEXPECTED_ERROR");
    }

    #[test]
    fn test_normalize_recovers_typed_error() {
        let original = WalletError::new(ErrorCode::AmountBelowMinimum, "amount is below the minimum");
        let report = eyre::Report::new(original.clone());

        let normalized = WalletError::normalize(report);
        assert_eq!(normalized.code(), ErrorCode::AmountBelowMinimum);
        assert_eq!(normalized.message(), original.message());
    }

    #[test]
    fn test_normalize_wraps_untyped_error() {
        let normalized = WalletError::normalize(eyre!("connection reset"));
        assert_eq!(normalized.code(), ErrorCode::Unexpected);
        assert!(normalized.cause().is_some());
        assert!(normalized.cause().unwrap().to_string().contains("connection reset"));
    }

    #[test]
    fn test_display_includes_code_and_message() {
        let err = WalletError::new(ErrorCode::BridgeNotReady, "required parameters are not set");
        assert_eq!(err.to_string(), "[BRIDGE_NOT_READY] required parameters are not set");
    }
}
