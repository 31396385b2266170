// Scripted wallet provider and backend shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use common::{SessionSnapshot, SessionUser, SignInRequest, SignInResponse};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use wallet_client::{ProviderError, ProviderEvent, RpcRequest, SessionBackend, WalletProvider};
use wallet_client::provider::{PERSONAL_SIGN, WALLET_SWITCH_CHAIN};
use wallet_client::BackendError;

pub const ADDRESS: &str = "0xABCD00000000000000000000000000000000123A";
pub const ADDRESS_LOWER: &str = "0xabcd00000000000000000000000000000000123a";
pub const SIGNATURE: &str = "0xdeadbeef";

#[derive(Debug)]
pub struct MockProvider {
    accounts: Mutex<Vec<String>>,
    chain_id: Mutex<String>,
    sign_result: Mutex<Result<String, ProviderError>>,
    sign_delay: Mutex<Duration>,
    accounts_delay: Mutex<Duration>,
    switch_errors: Mutex<VecDeque<ProviderError>>,
    calls: Mutex<Vec<RpcRequest>>,
    events: broadcast::Sender<ProviderEvent>,
    lifecycle: bool,
    logged_out: AtomicBool,
}

impl MockProvider {
    pub fn new(address: &str, chain_id: &str) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            accounts: Mutex::new(vec![address.to_string()]),
            chain_id: Mutex::new(chain_id.to_string()),
            sign_result: Mutex::new(Ok(SIGNATURE.to_string())),
            sign_delay: Mutex::new(Duration::ZERO),
            accounts_delay: Mutex::new(Duration::ZERO),
            switch_errors: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            events,
            lifecycle: false,
            logged_out: AtomicBool::new(false),
        }
    }

    pub fn with_lifecycle(mut self) -> Self {
        self.lifecycle = true;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn reject_signature(&self) {
        *self.sign_result.lock().unwrap() = Err(ProviderError::from_rpc(4001, "User rejected the request."));
    }

    pub fn set_sign_delay(&self, delay: Duration) {
        *self.sign_delay.lock().unwrap() = delay;
    }

    /// Slow down `eth_requestAccounts` and `eth_accounts`
    pub fn set_accounts_delay(&self, delay: Duration) {
        *self.accounts_delay.lock().unwrap() = delay;
    }

    pub fn fail_next_switch(&self, error: ProviderError) {
        self.switch_errors.lock().unwrap().push_back(error);
    }

    pub fn set_accounts(&self, accounts: Vec<String>) {
        *self.accounts.lock().unwrap() = accounts;
    }

    pub fn chain_id(&self) -> String {
        self.chain_id.lock().unwrap().clone()
    }

    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.events.send(event);
    }

    pub fn calls(&self) -> Vec<RpcRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|r| r.method == method).count()
    }

    pub fn sign_calls(&self) -> usize {
        self.count(PERSONAL_SIGN)
    }

    pub fn is_logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletProvider for MockProvider {
    async fn request(&self, request: RpcRequest) -> Result<Value, ProviderError> {
        self.calls.lock().unwrap().push(request.clone());
        match request.method.as_str() {
            "eth_requestAccounts" | "eth_accounts" => {
                let delay = *self.accounts_delay.lock().unwrap();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(json!(self.accounts.lock().unwrap().clone()))
            }
            "eth_chainId" => Ok(json!(self.chain_id())),
            PERSONAL_SIGN => {
                let delay = *self.sign_delay.lock().unwrap();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                self.sign_result.lock().unwrap().clone().map(Value::String)
            }
            WALLET_SWITCH_CHAIN => {
                if let Some(error) = self.switch_errors.lock().unwrap().pop_front() {
                    return Err(error);
                }
                let target = request.params.as_ref().and_then(|p| p[0]["chainId"].as_str()).unwrap_or_default();
                *self.chain_id.lock().unwrap() = target.to_string();
                Ok(Value::Null)
            }
            "wallet_addEthereumChain" => Ok(Value::Null),
            other => Err(ProviderError::Rpc {
                code: -32601,
                message: format!("method {} not supported", other),
            }),
        }
    }

    fn events(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        Some(self.events.subscribe())
    }

    fn has_lifecycle(&self) -> bool {
        self.lifecycle
    }

    async fn logout(&self) -> Result<(), ProviderError> {
        self.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory backend that accepts any signature unless told otherwise
pub struct MockBackend {
    nonce: Mutex<Option<String>>,
    nonce_delay: Mutex<Duration>,
    reject_with: Mutex<Option<String>>,
    signed_in: AtomicBool,
    roles: Vec<String>,
    pub nonce_calls: AtomicUsize,
    pub sign_in_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
    pub last_request: Mutex<Option<SignInRequest>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_roles(&["user"])
    }

    pub fn with_roles(roles: &[&str]) -> Self {
        Self {
            nonce: Mutex::new(Some("abcdef0123456789".to_string())),
            nonce_delay: Mutex::new(Duration::ZERO),
            reject_with: Mutex::new(None),
            signed_in: AtomicBool::new(false),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            nonce_calls: AtomicUsize::new(0),
            sign_in_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Backend that already holds an authenticated session
    pub fn signed_in(self) -> Self {
        self.signed_in.store(true, Ordering::SeqCst);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn without_nonce(&self) {
        *self.nonce.lock().unwrap() = None;
    }

    pub fn set_nonce_delay(&self, delay: Duration) {
        *self.nonce_delay.lock().unwrap() = delay;
    }

    pub fn reject_sign_in(&self, error: &str) {
        *self.reject_with.lock().unwrap() = Some(error.to_string());
    }

    pub fn sign_ins(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionBackend for MockBackend {
    async fn fetch_nonce(&self) -> Result<Option<String>, BackendError> {
        self.nonce_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.nonce_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.nonce.lock().unwrap().clone())
    }

    async fn sign_in(&self, request: &SignInRequest) -> Result<SignInResponse, BackendError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        if let Some(error) = self.reject_with.lock().unwrap().clone() {
            return Ok(SignInResponse::failure(401, error));
        }
        self.signed_in.store(true, Ordering::SeqCst);
        Ok(SignInResponse::success(request.callback_url.clone()))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.signed_in.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn session(&self) -> Result<SessionSnapshot, BackendError> {
        if !self.signed_in.load(Ordering::SeqCst) {
            return Ok(SessionSnapshot::unauthenticated());
        }
        Ok(SessionSnapshot::authenticated(
            SessionUser {
                address: ADDRESS_LOWER.to_string(),
                roles: self.roles.clone(),
            },
            None,
        ))
    }
}
