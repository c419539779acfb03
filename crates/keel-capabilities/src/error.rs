//! Capability and restricted-method errors.

use keel_core::{JsonRpcError, PluginId, error_codes};
use keel_crypto::CryptoError;
use thiserror::Error;

/// Errors raised while granting or invoking restricted methods.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// A grant's caveats do not satisfy its target's validator.
    #[error("invalid caveats: {0}")]
    InvalidCaveats(String),

    /// The subject type may not hold a grant for this target.
    #[error("subject type {subject_type} may not be granted {target}")]
    SubjectTypeNotAllowed {
        /// Offending subject type.
        subject_type: String,
        /// Target name.
        target: String,
    },

    /// The request falls outside what the grant's caveats permit.
    #[error("permission denied for {target}: {message}")]
    PermissionDenied {
        /// Target name.
        target: String,
        /// What was refused.
        message: String,
    },

    /// No restricted method with this name exists.
    #[error("unknown restricted method: {0}")]
    UnknownTarget(String),

    /// The subject holds no grant for the target.
    #[error("{subject} has not been granted {target}")]
    NotGranted {
        /// The calling plugin.
        subject: PluginId,
        /// Target name.
        target: String,
    },

    /// The requested curve is not supported.
    #[error("unsupported curve: {0}")]
    UnsupportedCurve(String),

    /// A hook failed to supply secret material.
    #[error("entropy source error: {0}")]
    EntropySource(String),

    /// The unlock precondition could not be satisfied.
    #[error("unlock failed: {0}")]
    Unlock(String),

    /// Request parameters are malformed.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Key derivation failed.
    #[error("derivation failed: {0}")]
    Derivation(String),
}

impl CapabilityError {
    /// JSON-RPC error reported back across the sandbox boundary.
    #[must_use]
    pub fn to_rpc_error(&self) -> JsonRpcError {
        let code = match self {
            Self::InvalidCaveats(_) | Self::InvalidParams(_) | Self::UnsupportedCurve(_) => {
                error_codes::INVALID_PARAMS
            },
            Self::PermissionDenied { .. }
            | Self::NotGranted { .. }
            | Self::SubjectTypeNotAllowed { .. } => error_codes::UNAUTHORIZED,
            Self::UnknownTarget(_) => error_codes::METHOD_NOT_FOUND,
            Self::EntropySource(_) | Self::Unlock(_) | Self::Derivation(_) => {
                error_codes::INTERNAL_ERROR
            },
        };
        JsonRpcError::new(code, self.to_string())
    }
}

impl From<CryptoError> for CapabilityError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::UnsupportedCurve(curve) => Self::UnsupportedCurve(curve),
            CryptoError::InvalidPath(msg) => Self::InvalidParams(msg),
            other => Self::Derivation(other.to_string()),
        }
    }
}

/// Result type for capability operations.
pub type CapabilityResult<T> = Result<T, CapabilityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_codes() {
        let denied = CapabilityError::PermissionDenied {
            target: "snap_getBip32Entropy".into(),
            message: "path not permitted".into(),
        };
        assert_eq!(denied.to_rpc_error().code, error_codes::UNAUTHORIZED);
        assert_eq!(
            CapabilityError::UnknownTarget("x".into()).to_rpc_error().code,
            error_codes::METHOD_NOT_FOUND
        );
        assert_eq!(
            CapabilityError::InvalidCaveats("x".into()).to_rpc_error().code,
            error_codes::INVALID_PARAMS
        );
    }

    #[test]
    fn test_from_crypto_error() {
        assert_eq!(
            CapabilityError::from(CryptoError::UnsupportedCurve("p256".into())),
            CapabilityError::UnsupportedCurve("p256".into())
        );
        assert!(matches!(
            CapabilityError::from(CryptoError::InvalidPath("bad".into())),
            CapabilityError::InvalidParams(_)
        ));
    }
}
