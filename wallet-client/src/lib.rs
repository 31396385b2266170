// wallet-client/src/lib.rs
pub mod backend;
pub mod error;
pub mod locator;
pub mod login;
pub mod network;
pub mod notice;
pub mod provider;
pub mod reconciler;
pub mod reconnect;
pub mod session;
pub mod store;

pub use backend::{BackendSession, HttpSessionBackend, SessionBackend};
pub use error::{BackendError, LoginError, NetworkError};
pub use locator::{PollHandle, ProviderLocator};
pub use login::{LoginAttemptState, LoginFlow, LoginOutcome, LoginPhase, LoginSettings};
pub use network::{NetworkMonitor, NetworkPolicy};
pub use notice::{Notice, NoticeBus, NoticeVariant};
pub use provider::{ProviderError, ProviderEvent, RpcRequest, SharedProvider, WalletProvider};
pub use reconciler::{reconcile, SessionView};
pub use reconnect::{ReconnectGuard, ReconnectOutcome, ReconnectSupervisor};
pub use session::{SessionTasks, WalletSession};
pub use store::{EventSubscription, WalletIdentity, WalletStore};
