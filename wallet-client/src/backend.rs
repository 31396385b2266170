// wallet-client/src/backend.rs
// Backend session collaborator: nonce, credential sign-in, session read, sign-out
use async_trait::async_trait;
use common::{NonceResponse, SessionSnapshot, SignInRequest, SignInResponse};
use std::sync::Arc;
use tokio::sync::watch;
use url::Url;

use crate::error::BackendError;

pub const NONCE_PATH: &str = "/api/auth/nonce";
pub const SIGN_IN_PATH: &str = "/api/auth/signin";
pub const SIGN_OUT_PATH: &str = "/api/auth/signout";
pub const SESSION_PATH: &str = "/api/auth/session";

#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// A fresh single-use nonce, `None` when the backend has none to give
    async fn fetch_nonce(&self) -> Result<Option<String>, BackendError>;

    /// Submit a signed message; rejections come back as `ok == false`
    async fn sign_in(&self, request: &SignInRequest) -> Result<SignInResponse, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    async fn session(&self) -> Result<SessionSnapshot, BackendError>;
}

/// HTTP implementation against the web server; keeps the session cookie
pub struct HttpSessionBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpSessionBackend {
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.base_url.join(path)?)
    }
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    async fn fetch_nonce(&self) -> Result<Option<String>, BackendError> {
        let response = self.client.get(self.endpoint(NONCE_PATH)?).send().await?;
        let body: NonceResponse = error_for_status(response).await?.json().await?;
        Ok(body.nonce.filter(|n| !n.is_empty()))
    }

    async fn sign_in(&self, request: &SignInRequest) -> Result<SignInResponse, BackendError> {
        let response = self
            .client
            .post(self.endpoint(SIGN_IN_PATH)?)
            .json(request)
            .send()
            .await?;

        // Rejections carry a SignInResponse body with a non-2xx status
        let status = response.status().as_u16();
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|_| BackendError::Status { status, body })
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let response = self.client.post(self.endpoint(SIGN_OUT_PATH)?).send().await?;
        error_for_status(response).await?;
        Ok(())
    }

    async fn session(&self) -> Result<SessionSnapshot, BackendError> {
        let response = self.client.get(self.endpoint(SESSION_PATH)?).send().await?;
        Ok(error_for_status(response).await?.json().await?)
    }
}

/// Latest known backend session, starting in `loading`
#[derive(Clone)]
pub struct BackendSession {
    backend: Arc<dyn SessionBackend>,
    snapshot: Arc<watch::Sender<SessionSnapshot>>,
}

impl BackendSession {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot::loading());
        Self {
            backend,
            snapshot: Arc::new(snapshot),
        }
    }

    pub fn backend(&self) -> &Arc<dyn SessionBackend> {
        &self.backend
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn set(&self, snapshot: SessionSnapshot) {
        self.snapshot.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    /// Re-read the session from the backend. A failed read counts as
    /// unauthenticated.
    pub async fn refresh(&self) -> SessionSnapshot {
        let snapshot = match self.backend.session().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Failed to read backend session: {}", e);
                SessionSnapshot::unauthenticated()
            }
        };
        tracing::debug!("Backend session status: {:?}", snapshot.status);
        self.set(snapshot.clone());
        snapshot
    }
}
