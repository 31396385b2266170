// wallet-client/src/locator.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::provider::{same_provider, SharedProvider};

static GLOBAL_LOCATOR: OnceLock<ProviderLocator> = OnceLock::new();

/// Handle to the provider slot.
///
/// The wallet SDK fills, replaces or clears the slot whenever it likes.
/// Injection has no ready signal, so discovery is polled.
#[derive(Clone)]
pub struct ProviderLocator {
    slot: Arc<watch::Sender<Option<SharedProvider>>>,
}

impl Default for ProviderLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderLocator {
    /// A fresh, empty slot (tests and embedded use)
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot: Arc::new(slot) }
    }

    /// The well-known process-wide slot
    pub fn global() -> &'static ProviderLocator {
        GLOBAL_LOCATOR.get_or_init(ProviderLocator::new)
    }

    /// Current provider, if one has been injected
    pub fn get_provider(&self) -> Option<SharedProvider> {
        self.slot.borrow().clone()
    }

    pub fn is_available(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Inject or replace the provider
    pub fn install(&self, provider: SharedProvider) {
        let previous = self.slot.send_replace(Some(provider));
        if previous.is_some() {
            tracing::debug!("Wallet provider replaced");
        } else {
            tracing::debug!("Wallet provider injected");
        }
    }

    /// Remove the provider from the slot
    pub fn clear(&self) {
        if self.slot.send_replace(None).is_some() {
            tracing::debug!("Wallet provider removed");
        }
    }

    /// True if `provider` is still the one in the slot
    pub fn is_current(&self, provider: &SharedProvider) -> bool {
        self.slot
            .borrow()
            .as_ref()
            .map(|current| same_provider(current, provider))
            .unwrap_or(false)
    }

    /// Receiver notified on every install/replace/clear
    pub fn subscribe(&self) -> watch::Receiver<Option<SharedProvider>> {
        self.slot.subscribe()
    }

    /// Poll until a provider is available, then call `on_ready` exactly once.
    ///
    /// The first check happens immediately. Cancelling (or dropping) the
    /// handle guarantees the callback is not invoked afterwards.
    pub fn poll_until_available<F>(&self, interval: Duration, on_ready: F) -> PollHandle
    where
        F: FnOnce(SharedProvider) + Send + 'static,
    {
        let locator = self.clone();
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if flag.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(provider) = locator.get_provider() {
                    tracing::debug!("Wallet provider became available");
                    on_ready(provider);
                    return;
                }
            }
        });

        PollHandle::new(task, cancelled)
    }

    /// Poll provider identity and report every change, including removal.
    ///
    /// Identity is pointer identity: a provider replaced by an equal-looking
    /// instance is still a change.
    pub fn watch_identity<F>(&self, interval: Duration, mut on_change: F) -> PollHandle
    where
        F: FnMut(Option<SharedProvider>) + Send + 'static,
    {
        let locator = self.clone();
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut last_seen: Option<SharedProvider> = None;
            loop {
                ticker.tick().await;
                if flag.load(Ordering::SeqCst) {
                    return;
                }
                let current = locator.get_provider();
                let changed = match (&last_seen, &current) {
                    (Some(previous), Some(now)) => !same_provider(previous, now),
                    (None, None) => false,
                    _ => true,
                };
                if changed {
                    tracing::warn!("Wallet provider instance changed");
                    last_seen = current.clone();
                    on_change(current);
                }
            }
        });

        PollHandle::new(task, cancelled)
    }
}

/// Cancellable polling subscription; aborts its task on drop
#[derive(Debug)]
pub struct PollHandle {
    task: Option<JoinHandle<()>>,
    cancelled: Arc<AtomicBool>,
}

impl PollHandle {
    fn new(task: JoinHandle<()>, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            task: Some(task),
            cancelled,
        }
    }

    /// Stop polling; no callback runs after this returns
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// True once the poll loop has ended, by success or cancellation
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderError, RpcRequest, WalletProvider};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct NullProvider;

    #[async_trait]
    impl WalletProvider for NullProvider {
        async fn request(&self, _request: RpcRequest) -> Result<Value, ProviderError> {
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn test_get_provider_reads_slot() {
        let locator = ProviderLocator::new();
        assert!(locator.get_provider().is_none());

        let provider: SharedProvider = Arc::new(NullProvider);
        locator.install(provider.clone());
        assert!(locator.is_current(&provider));

        let replacement: SharedProvider = Arc::new(NullProvider);
        locator.install(replacement);
        assert!(!locator.is_current(&provider));

        locator.clear();
        assert!(!locator.is_available());
    }

    #[tokio::test]
    async fn test_poll_invokes_callback_once() {
        let locator = ProviderLocator::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let handle = locator.poll_until_available(Duration::from_millis(5), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        locator.install(Arc::new(NullProvider));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_cancelled_poll_never_fires() {
        let locator = ProviderLocator::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut handle = locator.poll_until_available(Duration::from_millis(5), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.cancel();

        locator.install(Arc::new(NullProvider));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_watch_identity_reports_replacement() {
        let locator = ProviderLocator::new();
        locator.install(Arc::new(NullProvider));

        let changes = Arc::new(AtomicUsize::new(0));
        let counter = changes.clone();
        let _handle = locator.watch_identity(Duration::from_millis(5), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(changes.load(Ordering::SeqCst), 1);

        locator.install(Arc::new(NullProvider));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(changes.load(Ordering::SeqCst), 2);

        locator.clear();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(changes.load(Ordering::SeqCst), 3);
    }
}
