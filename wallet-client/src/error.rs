// wallet-client/src/error.rs
use thiserror::Error;

use crate::provider::ProviderError;

/// Failures talking to the backend session collaborator
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid backend url: {0}")]
    Url(#[from] url::ParseError),
    #[error("backend responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Why a login attempt ended in `Failed`.
///
/// Stored in the attempt state, so it is `Clone` and carries backend failures
/// as text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoginError {
    #[error("Provider missing")]
    ProviderMissing,
    #[error("Operation cancelled by user")]
    UserRejected,
    #[error("Wallet did not report an address and chain id")]
    WalletUnavailable,
    #[error("Failed to fetch nonce for signature")]
    NonceUnavailable,
    #[error("{0}")]
    Verification(String),
    #[error("Wallet provider error: {0}")]
    Provider(ProviderError),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Invalid sign-in message: {0}")]
    Message(String),
}

impl LoginError {
    /// A user rejection ends the attempt for good; everything else may be
    /// retried with a fresh login (and a fresh nonce).
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LoginError::UserRejected)
    }
}

impl From<ProviderError> for LoginError {
    fn from(error: ProviderError) -> Self {
        if error.is_user_rejection() {
            LoginError::UserRejected
        } else {
            LoginError::Provider(error)
        }
    }
}

impl From<BackendError> for LoginError {
    fn from(error: BackendError) -> Self {
        LoginError::Backend(error.to_string())
    }
}

/// Network switch failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Provider missing")]
    ProviderMissing,
    #[error("Unable to switch network automatically, switch to {chain} manually in your wallet: {source}")]
    SwitchFailed { chain: String, source: ProviderError },
}
