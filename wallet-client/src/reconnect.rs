// wallet-client/src/reconnect.rs
use common::normalize_address;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::store::WalletStore;

#[derive(Default)]
struct GuardFlags {
    reconnecting: AtomicBool,
    /// Ticket of the login attempt that owns the flag, 0 when free
    login_owner: AtomicU64,
    next_ticket: AtomicU64,
    reconnect_settled: Notify,
}

/// The `reconnecting` / `loginInFlight` pair.
///
/// Background reconnects and foreground logins never run against the
/// provider at the same time. Each side holds a permit while it works and
/// dropping the permit clears its flag, however the work ended.
#[derive(Clone, Default)]
pub struct ReconnectGuard {
    flags: Arc<GuardFlags>,
}

impl ReconnectGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_reconnecting(&self) -> bool {
        self.flags.reconnecting.load(Ordering::SeqCst)
    }

    pub fn is_login_in_flight(&self) -> bool {
        self.flags.login_owner.load(Ordering::SeqCst) != 0
    }

    /// Free the login flag while the attempt holding it is still waiting.
    ///
    /// Used when that attempt has been superseded: its permit no longer owns
    /// the flag, so dropping it later leaves a newer attempt's claim alone.
    pub fn release_login(&self) {
        self.flags.login_owner.store(0, Ordering::SeqCst);
    }

    /// Claim the login flag. `None` if a login is already running. Waits
    /// for an in-flight reconnect to settle before handing out the permit.
    pub async fn begin_login(&self) -> Option<LoginPermit> {
        let ticket = self.flags.next_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .flags
            .login_owner
            .compare_exchange(0, ticket, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        let permit = LoginPermit {
            flags: self.flags.clone(),
            ticket,
        };

        loop {
            // Register before checking so a settle in between is not lost
            let settled = self.flags.reconnect_settled.notified();
            if !self.is_reconnecting() {
                break;
            }
            tracing::debug!("Login waiting for reconnect to settle");
            settled.await;
        }

        Some(permit)
    }

    /// Claim the reconnect flag. `None` while a login is in flight or
    /// another reconnect holds it.
    pub fn try_begin_reconnect(&self) -> Option<ReconnectPermit> {
        if self.is_login_in_flight() {
            return None;
        }
        self.flags
            .reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| ReconnectPermit { flags: self.flags.clone() })
    }
}

/// Held while a login attempt runs
pub struct LoginPermit {
    flags: Arc<GuardFlags>,
    ticket: u64,
}

impl Drop for LoginPermit {
    fn drop(&mut self) {
        // No-op once released; a newer attempt may own the flag by now
        let _ = self.flags.login_owner.compare_exchange(self.ticket, 0, Ordering::SeqCst, Ordering::SeqCst);
    }
}

/// Held while a reconnect runs
pub struct ReconnectPermit {
    flags: Arc<GuardFlags>,
}

impl Drop for ReconnectPermit {
    fn drop(&mut self) {
        self.flags.reconnecting.store(false, Ordering::SeqCst);
        self.flags.reconnect_settled.notify_waiters();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// No normalized address to reconnect to
    NoKnownAddress,
    /// The wallet store already reports a connection
    AlreadyConnected,
    LoginInFlight,
    AlreadyReconnecting,
    Reconnected(Option<String>),
    /// A logout happened while the wallet was being read
    Superseded,
    /// Best effort; the error is logged and dropped
    Failed(String),
}

/// Silent reconnect of a previously known wallet
#[derive(Clone)]
pub struct ReconnectSupervisor {
    store: WalletStore,
    guard: ReconnectGuard,
    attempts: Arc<AtomicU64>,
}

impl ReconnectSupervisor {
    pub fn new(store: WalletStore, guard: ReconnectGuard) -> Self {
        Self {
            store,
            guard,
            attempts: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of reconnects actually started
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Evaluate once: reconnect if an address is known, no connection is
    /// confirmed and neither a login nor another reconnect is in flight.
    pub async fn evaluate(&self, known_address: Option<&str>) -> ReconnectOutcome {
        let Some(address) = known_address.and_then(normalize_address) else {
            return ReconnectOutcome::NoKnownAddress;
        };
        if self.store.identity().address.is_some() {
            return ReconnectOutcome::AlreadyConnected;
        }
        if self.guard.is_login_in_flight() {
            tracing::debug!("Skipping reconnect, login in flight");
            return ReconnectOutcome::LoginInFlight;
        }
        let Some(_permit) = self.guard.try_begin_reconnect() else {
            return if self.guard.is_login_in_flight() {
                ReconnectOutcome::LoginInFlight
            } else {
                ReconnectOutcome::AlreadyReconnecting
            };
        };

        self.attempts.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Attempting silent reconnect for {}", address);

        match self.store.reconnect().await {
            Ok(Some(identity)) => {
                if identity.address.as_deref() != Some(address.as_str()) {
                    tracing::info!("Reconnected wallet reports a different account than {}", address);
                }
                ReconnectOutcome::Reconnected(identity.address)
            }
            Ok(None) => ReconnectOutcome::Superseded,
            Err(e) => {
                tracing::warn!("Silent reconnect failed: {}", e);
                ReconnectOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::ProviderLocator;
    use std::time::Duration;

    #[tokio::test]
    async fn test_login_blocks_reconnect() {
        let guard = ReconnectGuard::new();
        let permit = guard.begin_login().await.unwrap();
        assert!(guard.try_begin_reconnect().is_none());
        assert!(guard.begin_login().await.is_none());
        drop(permit);
        assert!(!guard.is_login_in_flight());
        assert!(guard.try_begin_reconnect().is_some());
    }

    #[tokio::test]
    async fn test_reconnect_is_exclusive() {
        let guard = ReconnectGuard::new();
        let permit = guard.try_begin_reconnect().unwrap();
        assert!(guard.try_begin_reconnect().is_none());
        drop(permit);
        assert!(!guard.is_reconnecting());
    }

    #[tokio::test]
    async fn test_login_waits_for_reconnect_to_settle() {
        let guard = ReconnectGuard::new();
        let reconnect = guard.try_begin_reconnect().unwrap();

        let waiter = guard.clone();
        let login = tokio::spawn(async move { waiter.begin_login().await.is_some() });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!login.is_finished());
        assert!(guard.is_login_in_flight());

        drop(reconnect);
        assert!(login.await.unwrap());
    }

    #[tokio::test]
    async fn test_released_login_permit_leaves_newer_claim() {
        let guard = ReconnectGuard::new();
        let stale = guard.begin_login().await.unwrap();

        guard.release_login();
        assert!(!guard.is_login_in_flight());

        let current = guard.begin_login().await.unwrap();
        drop(stale);
        assert!(guard.is_login_in_flight());
        assert!(guard.begin_login().await.is_none());

        drop(current);
        assert!(!guard.is_login_in_flight());
    }

    #[tokio::test]
    async fn test_failed_reconnect_clears_flag() {
        // No provider installed, so the reconnect itself fails
        let store = WalletStore::new(ProviderLocator::new());
        let guard = ReconnectGuard::new();
        let supervisor = ReconnectSupervisor::new(store, guard.clone());

        let outcome = supervisor
            .evaluate(Some("0x71C7656EC7ab88b098defB751B7401B5f6d8976F"))
            .await;
        assert!(matches!(outcome, ReconnectOutcome::Failed(_)));
        assert!(!guard.is_reconnecting());
        assert_eq!(supervisor.attempts(), 1);

        assert_eq!(supervisor.evaluate(None).await, ReconnectOutcome::NoKnownAddress);
        assert_eq!(supervisor.evaluate(Some("not an address")).await, ReconnectOutcome::NoKnownAddress);
        assert_eq!(supervisor.attempts(), 1);
    }
}
