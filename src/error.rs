//! Unified error types for the signer adapter
//!
//! All errors flow through this module for consistent handling by the
//! host wallet. Translation errors propagate unmodified since they mean
//! the transaction cannot legally be constructed for this device.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for all signer adapter operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl SignerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors

    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidPath, msg)
    }

    pub fn invalid_output(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidOutput, msg)
    }

    pub fn script_type_not_supported(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ScriptTypeNotSupported, msg)
    }

    pub fn internal_inconsistency(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalInconsistency, msg)
    }

    pub fn missing_previous_tx(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::MissingPreviousTransaction, msg)
    }

    pub fn user_cancelled() -> Self {
        Self::new(ErrorCode::UserCancelled, "Cancelled on device")
    }

    pub fn device_too_old(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeviceTooOld, msg)
    }

    pub fn device_unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeviceUnavailable, msg)
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unsupported, msg)
    }

    pub fn invalid_init(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInitParams, msg)
    }

    pub fn invalid_label(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidLabel, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }

    /// User declined on-device. Callers surface this as a benign abort,
    /// not an error toast.
    pub fn is_cancel(&self) -> bool {
        self.code == ErrorCode::UserCancelled
    }
}

impl fmt::Display for SignerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for SignerError {}

/// Error codes for categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Translation errors
    InvalidPath,
    InvalidOutput,
    ScriptTypeNotSupported,
    InternalInconsistency,

    // Session errors
    MissingPreviousTransaction,
    UserCancelled,

    // Device errors
    DeviceTooOld,
    DeviceUnavailable,
    Unsupported,

    // Initialization errors
    InvalidInitParams,
    InvalidLabel,

    // Internal
    Internal,
}

/// Result type alias for signer adapter operations
pub type SignerResult<T> = Result<T, SignerError>;

// Conversions from common error types

impl From<crate::path::PathParseError> for SignerError {
    fn from(e: crate::path::PathParseError) -> Self {
        SignerError::new(ErrorCode::InvalidPath, e.to_string())
    }
}

impl From<hex::FromHexError> for SignerError {
    fn from(e: hex::FromHexError) -> Self {
        SignerError::new(ErrorCode::Internal, e.to_string())
    }
}

impl From<serde_json::Error> for SignerError {
    fn from(e: serde_json::Error) -> Self {
        SignerError::new(ErrorCode::Internal, e.to_string())
    }
}

impl From<bitcoin::bip32::Error> for SignerError {
    fn from(e: bitcoin::bip32::Error) -> Self {
        SignerError::new(ErrorCode::Internal, format!("BIP32 error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = SignerError::device_too_old("Outdated firmware for device labelled 'alpha'")
            .with_details("Minimum firmware: 1.0.5");

        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("device_too_old"));
        assert!(json.contains("Outdated firmware"));
    }

    #[test]
    fn test_cancel_is_benign() {
        assert!(SignerError::user_cancelled().is_cancel());
        assert!(!SignerError::internal("boom").is_cancel());
    }
}
