// wallet-client/src/store.rs
use common::{normalize_address, parse_chain_id, SessionSnapshot};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::locator::ProviderLocator;
use crate::provider::{ProviderError, ProviderEvent, RpcRequest, SharedProvider};

/// Wallet-level identity; both fields absent until a wallet is connected
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalletIdentity {
    pub address: Option<String>,
    pub chain_id: Option<u64>,
}

impl WalletIdentity {
    pub fn is_empty(&self) -> bool {
        self.address.is_none() && self.chain_id.is_none()
    }

    /// Both address and chain id are known
    pub fn is_complete(&self) -> bool {
        self.address.is_some() && self.chain_id.is_some()
    }
}

/// The last observed `{address, chainId}` pair.
///
/// Updated from provider events and poll results. Addresses are stored
/// normalized (`0x` + 40 lower-case hex), anything else is dropped. Reads
/// that started before `invalidate` are not applied.
#[derive(Clone)]
pub struct WalletStore {
    locator: ProviderLocator,
    identity: Arc<watch::Sender<WalletIdentity>>,
    epoch: Arc<AtomicU64>,
}

impl WalletStore {
    pub fn new(locator: ProviderLocator) -> Self {
        let (identity, _) = watch::channel(WalletIdentity::default());
        Self {
            locator,
            identity: Arc::new(identity),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn locator(&self) -> &ProviderLocator {
        &self.locator
    }

    pub fn identity(&self) -> WalletIdentity {
        self.identity.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WalletIdentity> {
        self.identity.subscribe()
    }

    /// Replace the identity with a poll result
    pub fn set_identity(&self, identity: WalletIdentity) {
        self.identity.send_if_modified(|current| {
            if *current == identity {
                return false;
            }
            *current = identity;
            true
        });
    }

    pub fn clear(&self) {
        self.set_identity(WalletIdentity::default());
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Mark every wallet read still in flight as stale
    pub fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Apply a read that started at `epoch`; false if it was invalidated since
    pub fn set_identity_if_current(&self, epoch: u64, identity: WalletIdentity) -> bool {
        let mut applied = false;
        self.identity.send_if_modified(|current| {
            // Checked under the channel lock so a concurrent clear wins
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            applied = true;
            if *current == identity {
                return false;
            }
            *current = identity;
            true
        });
        applied
    }

    /// Ask the wallet for its account and chain, prompting for unlock if
    /// needed. No provider yields an empty identity; provider failures
    /// (including a rejected unlock prompt) propagate.
    pub async fn request_wallet(&self) -> Result<WalletIdentity, ProviderError> {
        let Some(provider) = self.locator.get_provider() else {
            tracing::warn!("request_wallet called without a provider");
            return Ok(WalletIdentity::default());
        };
        tracing::debug!("Requesting wallet details");
        fetch_identity(&provider, RpcRequest::request_accounts()).await
    }

    /// Like `request_wallet`, but only when the backend session is
    /// authenticated, so pages without a session never trigger an unlock
    /// prompt.
    pub async fn check_wallet(&self, session: &SessionSnapshot) -> Result<WalletIdentity, ProviderError> {
        if !session.is_authenticated() {
            tracing::debug!("check_wallet called without an authenticated session");
            return Ok(WalletIdentity::default());
        }
        self.request_wallet().await
    }

    /// `check_wallet` and apply the result, unless the store was invalidated
    /// while the wallet was answering. Returns the applied identity.
    pub async fn sync_wallet(&self, session: &SessionSnapshot) -> Result<Option<WalletIdentity>, ProviderError> {
        let epoch = self.epoch();
        let identity = self.check_wallet(session).await?;
        if !self.set_identity_if_current(epoch, identity.clone()) {
            tracing::debug!("Dropping wallet read that outlived a logout");
            return Ok(None);
        }
        Ok(Some(identity))
    }

    /// Silent reconnect: read already-authorized accounts without prompting
    /// and apply the result. `None` when the store was invalidated meanwhile.
    pub async fn reconnect(&self) -> Result<Option<WalletIdentity>, ProviderError> {
        let epoch = self.epoch();
        let Some(provider) = self.locator.get_provider() else {
            return Err(ProviderError::Disconnected);
        };
        let identity = fetch_identity(&provider, RpcRequest::accounts()).await?;
        if identity.address.is_none() {
            return Ok(Some(identity));
        }
        if !self.set_identity_if_current(epoch, identity.clone()) {
            tracing::debug!("Dropping reconnect result that outlived a logout");
            return Ok(None);
        }
        Ok(Some(identity))
    }

    /// Apply a provider event to the stored identity
    pub fn apply_event(&self, event: &ProviderEvent) {
        tracing::debug!("Wallet event: {}", event.name());
        match event {
            ProviderEvent::AccountsChanged(accounts) => {
                match accounts.first().and_then(|a| normalize_address(a)) {
                    Some(address) => self.identity.send_if_modified(|current| {
                        if current.address.as_deref() == Some(address.as_str()) {
                            return false;
                        }
                        current.address = Some(address);
                        true
                    }),
                    // Locked or disconnected wallet
                    None => self.identity.send_if_modified(|current| {
                        let changed = !current.is_empty();
                        *current = WalletIdentity::default();
                        changed
                    }),
                };
            }
            ProviderEvent::ChainChanged(chain_id) => {
                let chain_id = parse_chain_id(&Value::String(chain_id.clone()));
                self.identity.send_if_modified(|current| {
                    if current.chain_id == chain_id {
                        return false;
                    }
                    current.chain_id = chain_id;
                    true
                });
            }
            ProviderEvent::Connect { chain_id } => {
                tracing::info!("Wallet connected");
                if let Some(chain_id) = chain_id.as_ref().and_then(|c| parse_chain_id(&Value::String(c.clone()))) {
                    self.identity.send_if_modified(|current| {
                        if current.chain_id == Some(chain_id) {
                            return false;
                        }
                        current.chain_id = Some(chain_id);
                        true
                    });
                }
            }
            ProviderEvent::Disconnect { reason } => {
                tracing::info!("Wallet disconnected: {}", reason.as_deref().unwrap_or("no reason given"));
                self.clear();
            }
        }
    }

    /// Register for the current provider's events.
    ///
    /// `None` when there is no provider or it has no event capability. The
    /// returned subscription releases the handler when dropped.
    pub fn subscribe_events(&self) -> Option<EventSubscription> {
        let provider = self.locator.get_provider()?;
        let receiver = provider.events()?;
        Some(EventSubscription::spawn(self.clone(), receiver))
    }
}

async fn fetch_identity(provider: &SharedProvider, accounts_request: RpcRequest) -> Result<WalletIdentity, ProviderError> {
    let accounts = provider.request(accounts_request).await?;
    let chain_id = provider.request(RpcRequest::chain_id()).await?;

    let accounts = match accounts {
        Value::Array(accounts) => accounts,
        Value::Null => Vec::new(),
        other => return Err(ProviderError::Malformed(format!("accounts: {}", other))),
    };

    let address = match accounts.first().and_then(Value::as_str) {
        Some(raw) => {
            let normalized = normalize_address(raw);
            if normalized.is_none() {
                tracing::warn!("Wallet reported an invalid address: {}", raw);
            }
            normalized
        }
        None => None,
    };

    let identity = WalletIdentity {
        address,
        chain_id: parse_chain_id(&chain_id),
    };
    tracing::debug!("Wallet details: {:?}", identity);
    Ok(identity)
}

/// Live event registration; unsubscribes on drop
#[derive(Debug)]
pub struct EventSubscription {
    task: Option<JoinHandle<()>>,
}

impl EventSubscription {
    fn spawn(store: WalletStore, mut receiver: broadcast::Receiver<ProviderEvent>) -> Self {
        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => store.apply_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Missed {} wallet events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("Wallet event stream closed");
                        return;
                    }
                }
            }
        });
        Self { task: Some(task) }
    }

    pub fn unsubscribe(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
