// wallet-client/src/login.rs
use chrono::{Duration, Utc};
use common::{to_checksum_address, SessionSnapshot, SignInRequest, SiweConfig, SiweMessage};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::backend::BackendSession;
use crate::error::LoginError;
use crate::notice::{Notice, NoticeBus};
use crate::provider::RpcRequest;
use crate::reconnect::ReconnectGuard;
use crate::store::WalletStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoginPhase {
    Idle,
    Connecting,
    AwaitingSignature,
    Verifying,
    Authenticated,
    Failed,
}

/// Attempt state exposed to the UI layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginAttemptState {
    pub loading: bool,
    pub error: Option<LoginError>,
}

/// How a call to `login` ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated,
    Failed(LoginError),
    /// Another login was already in flight
    Ignored,
    /// A logout or a newer attempt replaced this one while it was waiting
    Superseded,
}

/// Parameters of the messages this client asks wallets to sign
#[derive(Debug, Clone)]
pub struct LoginSettings {
    pub domain: String,
    pub uri: String,
    pub statement: String,
    pub callback_url: Option<String>,
    /// Message validity in seconds, 0 for none
    pub message_ttl_seconds: i64,
}

impl LoginSettings {
    pub fn from_config(siwe: &SiweConfig, callback_url: &str) -> Self {
        Self {
            domain: siwe.domain.clone(),
            uri: siwe.uri.clone(),
            statement: siwe.statement(),
            callback_url: Some(callback_url.to_string()),
            message_ttl_seconds: siwe.message_ttl_seconds,
        }
    }
}

/// SIWE login state machine.
///
/// ```text
/// Idle -> Connecting -> AwaitingSignature -> Verifying -> Authenticated
///             |                 |                |
///             +-----------------+----------------+--> Failed
/// ```
///
/// Provider requests cannot be cancelled, so every `.await` is followed by a
/// check that the attempt is still current. A response that arrives after a
/// logout or a newer attempt is dropped instead of being applied.
#[derive(Clone)]
pub struct LoginFlow {
    store: WalletStore,
    session: BackendSession,
    notices: NoticeBus,
    guard: ReconnectGuard,
    settings: Arc<LoginSettings>,
    generation: Arc<AtomicU64>,
    phase: Arc<watch::Sender<LoginPhase>>,
    state: Arc<watch::Sender<LoginAttemptState>>,
}

impl LoginFlow {
    pub fn new(
        store: WalletStore,
        session: BackendSession,
        notices: NoticeBus,
        guard: ReconnectGuard,
        settings: LoginSettings,
    ) -> Self {
        let (phase, _) = watch::channel(LoginPhase::Idle);
        let (state, _) = watch::channel(LoginAttemptState::default());
        Self {
            store,
            session,
            notices,
            guard,
            settings: Arc::new(settings),
            generation: Arc::new(AtomicU64::new(0)),
            phase: Arc::new(phase),
            state: Arc::new(state),
        }
    }

    pub fn store(&self) -> &WalletStore {
        &self.store
    }

    pub fn phase(&self) -> LoginPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<LoginPhase> {
        self.phase.subscribe()
    }

    pub fn state(&self) -> LoginAttemptState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LoginAttemptState> {
        self.state.subscribe()
    }

    /// Wallet layer has settled.
    ///
    /// False until a provider is reachable; true as soon as an address has
    /// been observed; otherwise true when no attempt is loading.
    pub fn ready(&self) -> bool {
        if !self.store.locator().is_available() {
            return false;
        }
        if self.store.identity().address.is_some() {
            return true;
        }
        !self.state.borrow().loading
    }

    /// Run one login attempt for an explicit user intent
    pub async fn login(&self) -> LoginOutcome {
        let Some(_permit) = self.guard.begin_login().await else {
            tracing::debug!("Login already in flight, ignoring");
            return LoginOutcome::Ignored;
        };

        let attempt = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("Login attempt {} started", attempt);

        self.state.send_replace(LoginAttemptState {
            loading: true,
            error: None,
        });
        self.phase.send_replace(LoginPhase::Connecting);

        match self.run_attempt(attempt).await {
            Ok(Step::Done) => {
                self.finish(LoginPhase::Authenticated, None);
                tracing::info!("Login attempt {} authenticated", attempt);
                LoginOutcome::Authenticated
            }
            Ok(Step::Superseded) => {
                tracing::debug!("Login attempt {} superseded, dropping its result", attempt);
                LoginOutcome::Superseded
            }
            Err(error) => {
                if !self.is_current(attempt) {
                    tracing::debug!("Login attempt {} failed after being superseded: {}", attempt, error);
                    return LoginOutcome::Superseded;
                }
                self.fail(attempt, error.clone());
                LoginOutcome::Failed(error)
            }
        }
    }

    async fn run_attempt(&self, attempt: u64) -> Result<Step, LoginError> {
        let Some(provider) = self.store.locator().get_provider() else {
            return Err(LoginError::ProviderMissing);
        };

        if provider.has_lifecycle() {
            provider.login().await?;
            if !self.is_current(attempt) {
                return Ok(Step::Superseded);
            }
        }
        // Connecting may have swapped the provider; request_wallet re-reads it
        let identity = self.store.request_wallet().await?;
        if !self.is_current(attempt) {
            return Ok(Step::Superseded);
        }
        let (Some(address), Some(chain_id)) = (identity.address.clone(), identity.chain_id) else {
            tracing::warn!("Login attempt {}: missing address or chain id", attempt);
            return Err(LoginError::WalletUnavailable);
        };
        self.store.set_identity(identity);
        self.phase.send_replace(LoginPhase::AwaitingSignature);

        let nonce = match self.session.backend().fetch_nonce().await {
            Ok(Some(nonce)) => nonce,
            Ok(None) => return Err(LoginError::NonceUnavailable),
            Err(e) => {
                tracing::error!("Failure fetching nonce: {}", e);
                return Err(LoginError::NonceUnavailable);
            }
        };
        if !self.is_current(attempt) {
            return Ok(Step::Superseded);
        }

        let checksum_address = to_checksum_address(&address).ok_or_else(|| LoginError::Message(address.clone()))?;
        let message = self.build_message(&checksum_address, chain_id, nonce);
        let prepared = message.prepare_message();

        // Never reuse the provider captured before the awaits above
        let provider = self.store.locator().get_provider().ok_or(LoginError::ProviderMissing)?;
        let message_hex = format!("0x{}", hex::encode(prepared.as_bytes()));
        let signature = provider
            .request(RpcRequest::personal_sign(&message_hex, &checksum_address))
            .await?;
        if !self.is_current(attempt) {
            return Ok(Step::Superseded);
        }
        let signature = signature
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LoginError::Message("signature is not a string".to_string()))?;

        self.phase.send_replace(LoginPhase::Verifying);
        let request = SignInRequest {
            message: serde_json::to_string(&message).map_err(|e| LoginError::Message(e.to_string()))?,
            signature,
            callback_url: self.settings.callback_url.clone(),
        };
        let result = self.session.backend().sign_in(&request).await?;
        if !self.is_current(attempt) {
            return Ok(Step::Superseded);
        }

        if !result.is_success() {
            tracing::error!(
                "An error occurred while signing in. Code: {} - {}",
                result.status,
                result.error.as_deref().unwrap_or("unknown")
            );
            return Err(LoginError::Verification(
                result
                    .error
                    .unwrap_or_else(|| "Unable to authenticate the message".to_string()),
            ));
        }

        let snapshot = self.session.refresh().await;
        if !self.is_current(attempt) {
            return Ok(Step::Superseded);
        }
        if let Some(user) = &snapshot.user {
            tracing::info!("User signed in: {}", user.address);
        }
        Ok(Step::Done)
    }

    fn build_message(&self, checksum_address: &str, chain_id: u64, nonce: String) -> SiweMessage {
        let message = SiweMessage::new(
            self.settings.domain.clone(),
            checksum_address,
            Some(self.settings.statement.clone()),
            self.settings.uri.clone(),
            chain_id,
            nonce,
        );
        if self.settings.message_ttl_seconds > 0 {
            message.with_expiration(Utc::now() + Duration::seconds(self.settings.message_ttl_seconds))
        } else {
            message
        }
    }

    /// End the backend session and the wallet connection. Valid in any
    /// state and idempotent; local state is reset even if the backend call
    /// fails, in which case the backend error is returned.
    pub async fn logout(&self) -> Result<(), LoginError> {
        // Outstanding responses of the current attempt and of background
        // wallet reads are now stale; a pending prompt no longer blocks login
        let logout = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.store.invalidate();
        self.guard.release_login();
        tracing::info!("Logging out");

        let backend_result = self.session.backend().sign_out().await;
        if let Err(e) = &backend_result {
            tracing::warn!("Backend sign-out failed: {}", e);
        }
        if !self.is_current(logout) {
            tracing::debug!("Login started during logout, leaving its state alone");
            return backend_result.map_err(LoginError::from);
        }

        if let Some(provider) = self.store.locator().get_provider() {
            if provider.has_lifecycle() {
                if let Err(e) = provider.logout().await {
                    tracing::warn!("Wallet logout failed: {}", e);
                }
            }
        }
        if !self.is_current(logout) {
            tracing::debug!("Login started during logout, leaving its state alone");
            return backend_result.map_err(LoginError::from);
        }

        self.store.clear();
        self.session.set(SessionSnapshot::unauthenticated());
        self.state.send_replace(LoginAttemptState::default());
        self.phase.send_replace(LoginPhase::Idle);

        backend_result.map_err(LoginError::from)
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == attempt
    }

    fn finish(&self, phase: LoginPhase, error: Option<LoginError>) {
        self.state.send_replace(LoginAttemptState { loading: false, error });
        self.phase.send_replace(phase);
    }

    fn fail(&self, attempt: u64, error: LoginError) {
        tracing::warn!("Login attempt {} failed: {}", attempt, error);
        if error == LoginError::UserRejected {
            self.notices.publish(Notice::login_cancelled());
        }
        self.finish(LoginPhase::Failed, Some(error));
    }
}

enum Step {
    Done,
    Superseded,
}
