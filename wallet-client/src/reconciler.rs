// wallet-client/src/reconciler.rs
use common::models::session::ROLE_ADMIN;
use common::{normalize_address, SessionSnapshot, SessionStatus};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::BackendSession;
use crate::login::LoginFlow;
use crate::store::WalletIdentity;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub address: Option<String>,
    /// Backend session is authenticated; wallet connectivity alone never is
    pub authenticated: bool,
    pub is_admin: bool,
    pub is_ready: bool,
}

/// Derive the session view.
///
/// The live wallet address wins over the backend session's address, which
/// only fills in before a wallet has attached. The view is always recomputed
/// from every input, never patched.
pub fn reconcile(identity: &WalletIdentity, session: &SessionSnapshot, wallet_ready: bool) -> SessionView {
    let session_address = session
        .user
        .as_ref()
        .map(|user| normalize_address(&user.address).unwrap_or_else(|| user.address.clone()));

    SessionView {
        address: identity.address.clone().or(session_address),
        authenticated: session.status == SessionStatus::Authenticated,
        is_admin: session
            .user
            .as_ref()
            .map(|user| user.has_role(ROLE_ADMIN))
            .unwrap_or(false),
        is_ready: session.status != SessionStatus::Loading && wallet_ready,
    }
}

/// Running reconciler; the task stops when the handle is dropped
pub struct ReconcilerHandle {
    view: watch::Receiver<SessionView>,
    task: JoinHandle<()>,
}

impl ReconcilerHandle {
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn current_view(flow: &LoginFlow, session: &BackendSession) -> SessionView {
    reconcile(&flow.store().identity(), &session.snapshot(), flow.ready())
}

/// Recompute the view on every change of wallet identity, backend session,
/// login attempt state or provider slot.
pub fn spawn_reconciler(flow: LoginFlow, session: BackendSession) -> ReconcilerHandle {
    let (sender, view) = watch::channel(current_view(&flow, &session));

    let mut identity_rx = flow.store().subscribe();
    let mut session_rx = session.subscribe();
    let mut attempt_rx = flow.subscribe_state();
    let mut provider_rx = flow.store().locator().subscribe();

    let task = tokio::spawn(async move {
        loop {
            let changed = tokio::select! {
                r = identity_rx.changed() => r,
                r = session_rx.changed() => r,
                r = attempt_rx.changed() => r,
                r = provider_rx.changed() => r,
            };
            if changed.is_err() {
                tracing::debug!("Reconciler input closed, stopping");
                return;
            }

            let next = current_view(&flow, &session);
            sender.send_if_modified(|current| {
                if *current == next {
                    return false;
                }
                tracing::debug!("Session view: {:?}", next);
                *current = next;
                true
            });
        }
    });

    ReconcilerHandle { view, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::SessionUser;

    const WALLET: &str = "0x71c7656ec7ab88b098defb751b7401b5f6d8976f";
    const SESSION_ADDRESS: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";

    fn authenticated(roles: &[&str]) -> SessionSnapshot {
        SessionSnapshot::authenticated(
            SessionUser {
                address: SESSION_ADDRESS.to_string(),
                roles: roles.iter().map(|r| r.to_string()).collect(),
            },
            None,
        )
    }

    #[test]
    fn test_wallet_address_takes_precedence() {
        let identity = WalletIdentity {
            address: Some(WALLET.to_string()),
            chain_id: Some(1),
        };
        let view = reconcile(&identity, &authenticated(&["user"]), true);
        assert_eq!(view.address.as_deref(), Some(WALLET));
        assert!(view.authenticated);
        assert!(view.is_ready);
        assert!(!view.is_admin);
    }

    #[test]
    fn test_session_address_is_fallback() {
        let view = reconcile(&WalletIdentity::default(), &authenticated(&["user", "admin"]), true);
        assert_eq!(view.address.as_deref(), Some(SESSION_ADDRESS));
        assert!(view.is_admin);
    }

    #[test]
    fn test_wallet_alone_is_not_authenticated() {
        let identity = WalletIdentity {
            address: Some(WALLET.to_string()),
            chain_id: Some(1),
        };
        let view = reconcile(&identity, &SessionSnapshot::unauthenticated(), true);
        assert!(!view.authenticated);
        assert_eq!(view.address.as_deref(), Some(WALLET));
    }

    #[test]
    fn test_loading_session_is_not_ready() {
        let view = reconcile(&WalletIdentity::default(), &SessionSnapshot::loading(), true);
        assert!(!view.is_ready);
        let view = reconcile(&WalletIdentity::default(), &SessionSnapshot::unauthenticated(), false);
        assert!(!view.is_ready);
        assert_eq!(view.address, None);
    }
}
