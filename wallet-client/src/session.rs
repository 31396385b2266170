// wallet-client/src/session.rs

use common::{Config, SessionSnapshot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::backend::{BackendSession, HttpSessionBackend, SessionBackend};
use crate::error::{BackendError, LoginError, NetworkError};
use crate::locator::{PollHandle, ProviderLocator};
use crate::login::{LoginAttemptState, LoginFlow, LoginOutcome, LoginPhase, LoginSettings};
use crate::network::{NetworkMonitor, NetworkPolicy};
use crate::notice::{Notice, NoticeBus};
use crate::reconciler::{spawn_reconciler, ReconcilerHandle, SessionView};
use crate::reconnect::{ReconnectGuard, ReconnectSupervisor};
use crate::store::{EventSubscription, WalletIdentity, WalletStore};

/// The one object the UI layer talks to.
///
/// Owns the stores and flows. `start` spawns the background work and returns
/// a `SessionTasks` that tears all of it down when dropped.
#[derive(Clone)]
pub struct WalletSession {
    locator: ProviderLocator,
    store: WalletStore,
    session: BackendSession,
    notices: NoticeBus,
    flow: LoginFlow,
    policy: NetworkPolicy,
    reconnect: ReconnectSupervisor,
    poll_interval: Duration,
}

impl WalletSession {
    /// Session against the configured backend, using the process-wide
    /// provider slot
    pub fn from_config(config: &Config) -> Result<Self, BackendError> {
        let backend = HttpSessionBackend::new(&config.client.backend_url)?;
        Ok(Self::new(ProviderLocator::global().clone(), Arc::new(backend), config))
    }

    pub fn new(locator: ProviderLocator, backend: Arc<dyn SessionBackend>, config: &Config) -> Self {
        let store = WalletStore::new(locator.clone());
        let session = BackendSession::new(backend);
        let notices = NoticeBus::new();
        let guard = ReconnectGuard::new();

        let flow = LoginFlow::new(
            store.clone(),
            session.clone(),
            notices.clone(),
            guard.clone(),
            LoginSettings::from_config(&config.siwe, &config.client.callback_url),
        );
        let policy = NetworkPolicy::new(&config.chains, locator.clone(), notices.clone());
        let reconnect = ReconnectSupervisor::new(store.clone(), guard);

        Self {
            locator,
            store,
            session,
            notices,
            flow,
            policy,
            reconnect,
            poll_interval: Duration::from_millis(config.client.poll_interval_ms.max(1)),
        }
    }

    pub fn locator(&self) -> &ProviderLocator {
        &self.locator
    }

    pub fn wallet(&self) -> WalletIdentity {
        self.store.identity()
    }

    pub fn backend_session(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn login_state(&self) -> LoginAttemptState {
        self.flow.state()
    }

    pub fn login_phase(&self) -> LoginPhase {
        self.flow.phase()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect.attempts()
    }

    pub fn is_correct_network(&self) -> bool {
        self.policy.is_correct_network(self.store.identity().chain_id)
    }

    pub async fn login(&self) -> LoginOutcome {
        self.flow.login().await
    }

    pub async fn logout(&self) -> Result<(), LoginError> {
        self.flow.logout().await
    }

    pub async fn switch_network(&self) -> Result<(), NetworkError> {
        self.policy.switch_network().await
    }

    pub async fn refresh_session(&self) -> SessionSnapshot {
        self.session.refresh().await
    }

    /// Spawn the background tasks. Must be called within a tokio runtime.
    pub fn start(&self) -> SessionTasks {
        let active = Arc::new(AtomicBool::new(true));
        let mut tasks = Vec::new();

        // Initial session read leaves `loading`
        let session = self.session.clone();
        tasks.push(tokio::spawn(async move {
            session.refresh().await;
        }));

        let (discovered_tx, discovered_rx) = watch::channel(self.locator.is_available());
        let discovery = self.locator.poll_until_available(self.poll_interval, move |_| {
            discovered_tx.send_replace(true);
        });
        tasks.push(self.spawn_wallet_sync(discovered_rx, active.clone()));

        let events: Arc<Mutex<Option<EventSubscription>>> = Arc::new(Mutex::new(None));
        let identity_watch = self.watch_provider_identity(events.clone(), active.clone());

        let reconciler = spawn_reconciler(self.flow.clone(), self.session.clone());
        tasks.push(self.spawn_supervisor(reconciler.subscribe()));

        SessionTasks {
            active,
            tasks,
            polls: vec![discovery, identity_watch],
            events,
            reconciler,
        }
    }

    /// Once a provider has been found and the backend session is
    /// authenticated, read the wallet without waiting for user action.
    fn spawn_wallet_sync(&self, mut discovered: watch::Receiver<bool>, active: Arc<AtomicBool>) -> JoinHandle<()> {
        let store = self.store.clone();
        let session = self.session.clone();
        let mut session_rx = session.subscribe();

        tokio::spawn(async move {
            loop {
                let snapshot = session.snapshot();
                if *discovered.borrow() && snapshot.is_authenticated() && store.identity().address.is_none() {
                    if !active.load(Ordering::SeqCst) {
                        return;
                    }
                    // A logout while the wallet answers makes the read stale
                    if let Err(e) = store.sync_wallet(&snapshot).await {
                        tracing::warn!("Failed to check wallet: {}", e);
                    }
                }

                let changed = tokio::select! {
                    r = discovered.changed() => r,
                    r = session_rx.changed() => r,
                };
                if changed.is_err() {
                    // Discovery finished and dropped its sender; keep following the session
                    if session_rx.changed().await.is_err() {
                        return;
                    }
                }
            }
        })
    }

    /// Re-register event handlers whenever the provider instance changes
    fn watch_provider_identity(
        &self,
        events: Arc<Mutex<Option<EventSubscription>>>,
        active: Arc<AtomicBool>,
    ) -> PollHandle {
        let store = self.store.clone();
        self.locator.watch_identity(self.poll_interval, move |provider| {
            if !active.load(Ordering::SeqCst) {
                return;
            }
            let Ok(mut slot) = events.lock() else {
                tracing::error!("Event subscription lock poisoned");
                return;
            };
            // Release the old provider's handlers before binding new ones
            slot.take();
            if provider.is_some() {
                *slot = store.subscribe_events();
                if slot.is_none() {
                    tracing::debug!("Wallet provider exposes no events");
                }
            }
        })
    }

    /// React to view and wallet changes: silent reconnects and network notices
    fn spawn_supervisor(&self, mut view_rx: watch::Receiver<SessionView>) -> JoinHandle<()> {
        let store = self.store.clone();
        let session = self.session.clone();
        let policy = self.policy.clone();
        let reconnect = self.reconnect.clone();
        let notices = self.notices.clone();
        let mut identity_rx = store.subscribe();

        tokio::spawn(async move {
            let mut monitor = NetworkMonitor::new();
            loop {
                let view = view_rx.borrow_and_update().clone();

                let known_address = session.snapshot().user.map(|user| user.address);
                if view.authenticated {
                    let outcome = reconnect.evaluate(known_address.as_deref()).await;
                    tracing::debug!("Reconnect evaluation: {:?}", outcome);
                }

                if let Some(notice) = monitor.evaluate(&view, store.identity().chain_id, &policy) {
                    notices.publish(notice);
                }

                let changed = tokio::select! {
                    r = view_rx.changed() => r,
                    r = identity_rx.changed() => r,
                };
                if changed.is_err() {
                    return;
                }
            }
        })
    }
}

/// Background work of a started session; everything stops on drop
pub struct SessionTasks {
    active: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
    polls: Vec<PollHandle>,
    events: Arc<Mutex<Option<EventSubscription>>>,
    reconciler: ReconcilerHandle,
}

impl SessionTasks {
    pub fn view(&self) -> SessionView {
        self.reconciler.view()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<SessionView> {
        self.reconciler.subscribe()
    }

    /// Whether provider events are currently bound
    pub fn events_bound(&self) -> bool {
        self.events
            .lock()
            .map(|slot| slot.as_ref().map(EventSubscription::is_active).unwrap_or(false))
            .unwrap_or(false)
    }
}

impl Drop for SessionTasks {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        for task in &self.tasks {
            task.abort();
        }
        for poll in &mut self.polls {
            poll.cancel();
        }
        if let Ok(mut slot) = self.events.lock() {
            slot.take();
        }
    }
}
