// wallet-client/src/notice.rs
// Transient user-facing notifications (toasts)
use std::time::Duration;
use tokio::sync::broadcast;

const NOTICE_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeVariant {
    Default,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub variant: NoticeVariant,
    /// `None` keeps the notice until dismissed
    pub duration: Option<Duration>,
}

impl Notice {
    pub fn login_cancelled() -> Self {
        Self {
            title: "Login Failed".to_string(),
            description: "Operation cancelled by user".to_string(),
            variant: NoticeVariant::Destructive,
            duration: Some(Duration::from_secs(5)),
        }
    }

    pub fn wrong_network(chain_name: &str) -> Self {
        Self {
            title: "Network Error".to_string(),
            description: format!("Please switch to {} to use this app", chain_name),
            variant: NoticeVariant::Destructive,
            duration: None,
        }
    }

    pub fn network_connected(chain_name: &str) -> Self {
        Self {
            title: "Network Connected".to_string(),
            description: format!("Successfully connected to {}", chain_name),
            variant: NoticeVariant::Default,
            duration: Some(Duration::from_secs(3)),
        }
    }

    pub fn switch_failed(chain_name: &str) -> Self {
        Self {
            title: "Network Switch Failed".to_string(),
            description: format!(
                "Unable to switch network automatically. Please switch to {} manually in your wallet.",
                chain_name
            ),
            variant: NoticeVariant::Destructive,
            duration: Some(Duration::from_secs(5)),
        }
    }
}

/// Fan-out channel for notices
#[derive(Clone)]
pub struct NoticeBus {
    sender: broadcast::Sender<Notice>,
}

impl Default for NoticeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NoticeBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish a notice; nobody listening is fine
    pub fn publish(&self, notice: Notice) {
        tracing::info!("Notice: {} - {}", notice.title, notice.description);
        let _ = self.sender.send(notice);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }
}
