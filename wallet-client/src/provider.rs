// wallet-client/src/provider.rs
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

pub const ETH_REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
pub const ETH_ACCOUNTS: &str = "eth_accounts";
pub const ETH_CHAIN_ID: &str = "eth_chainId";
pub const PERSONAL_SIGN: &str = "personal_sign";
pub const WALLET_SWITCH_CHAIN: &str = "wallet_switchEthereumChain";
pub const WALLET_ADD_CHAIN: &str = "wallet_addEthereumChain";

/// EIP-1193: the user rejected the request
pub const USER_REJECTED_REQUEST: i64 = 4001;
/// EIP-3326: the requested chain has not been added to the wallet
pub const UNRECOGNIZED_CHAIN: i64 = 4902;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("user rejected the request")]
    UserRejected,
    #[error("unrecognized chain")]
    UnrecognizedChain,
    #[error("provider rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed provider response: {0}")]
    Malformed(String),
    #[error("provider disconnected")]
    Disconnected,
}

impl ProviderError {
    /// Map a JSON-RPC error code to a provider error
    pub fn from_rpc(code: i64, message: impl Into<String>) -> Self {
        match code {
            USER_REJECTED_REQUEST => ProviderError::UserRejected,
            UNRECOGNIZED_CHAIN => ProviderError::UnrecognizedChain,
            _ => ProviderError::Rpc {
                code,
                message: message.into(),
            },
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        matches!(self, ProviderError::UserRejected)
    }
}

/// A provider request: `{method, params}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(method: &str, params: Option<Value>) -> Self {
        Self {
            method: method.to_string(),
            params,
        }
    }

    /// Prompting account request
    pub fn request_accounts() -> Self {
        Self::new(ETH_REQUEST_ACCOUNTS, None)
    }

    /// Non-prompting account read
    pub fn accounts() -> Self {
        Self::new(ETH_ACCOUNTS, None)
    }

    pub fn chain_id() -> Self {
        Self::new(ETH_CHAIN_ID, None)
    }

    /// `personal_sign` over already hex-encoded message bytes
    pub fn personal_sign(message_hex: &str, address: &str) -> Self {
        Self::new(PERSONAL_SIGN, Some(json!([message_hex, address])))
    }

    pub fn switch_chain(chain_id_hex: &str) -> Self {
        Self::new(WALLET_SWITCH_CHAIN, Some(json!([{ "chainId": chain_id_hex }])))
    }

    pub fn add_chain(chain: Value) -> Self {
        Self::new(WALLET_ADD_CHAIN, Some(json!([chain])))
    }
}

/// Connection events emitted by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<String>),
    /// Chain id as reported, usually `0x`-hex
    ChainChanged(String),
    Connect { chain_id: Option<String> },
    Disconnect { reason: Option<String> },
}

impl ProviderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderEvent::AccountsChanged(_) => "accountsChanged",
            ProviderEvent::ChainChanged(_) => "chainChanged",
            ProviderEvent::Connect { .. } => "connect",
            ProviderEvent::Disconnect { .. } => "disconnect",
        }
    }
}

/// Capability exposed by an injected wallet.
///
/// Only `request` is mandatory. Event subscription and the `login`/`logout`
/// lifecycle are optional; the defaults report them as absent. Consumers
/// never keep a provider across an `.await`; they re-read it from the
/// [`ProviderLocator`](crate::locator::ProviderLocator).
#[async_trait]
pub trait WalletProvider: Send + Sync + fmt::Debug {
    async fn request(&self, request: RpcRequest) -> Result<Value, ProviderError>;

    /// Subscribe to connection events, `None` when the provider has no event API
    fn events(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        None
    }

    /// Whether `login`/`logout` are implemented
    fn has_lifecycle(&self) -> bool {
        false
    }

    async fn login(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn logout(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

pub type SharedProvider = Arc<dyn WalletProvider>;

/// Identity comparison of two provider handles
pub fn same_provider(a: &SharedProvider, b: &SharedProvider) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert!(ProviderError::from_rpc(4001, "User rejected").is_user_rejection());
        assert_eq!(ProviderError::from_rpc(4902, "x"), ProviderError::UnrecognizedChain);
        assert_eq!(
            ProviderError::from_rpc(-32603, "internal"),
            ProviderError::Rpc { code: -32603, message: "internal".to_string() }
        );
    }

    #[test]
    fn test_request_shapes() {
        let switch = serde_json::to_value(RpcRequest::switch_chain("0xaef3")).unwrap();
        assert_eq!(switch["method"], "wallet_switchEthereumChain");
        assert_eq!(switch["params"][0]["chainId"], "0xaef3");

        let accounts = serde_json::to_value(RpcRequest::request_accounts()).unwrap();
        assert!(accounts.get("params").is_none());
    }
}
