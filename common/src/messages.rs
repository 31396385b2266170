// common/src/messages.rs
// Wire types shared between the wallet client and the web server
use serde::{Deserialize, Serialize};

/// Backend session status as seen by a client.
///
/// `Loading` only exists on the client side, before the first session read
/// has completed. The server answers `Authenticated` or `Unauthenticated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Loading,
    Authenticated,
    Unauthenticated,
}

/// User attached to an authenticated backend session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub address: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl SessionUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Snapshot of the backend session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<SessionUser>,
    /// RFC 3339 expiry of the session, when authenticated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
}

impl SessionSnapshot {
    pub fn loading() -> Self {
        Self::default()
    }

    pub fn unauthenticated() -> Self {
        Self {
            status: SessionStatus::Unauthenticated,
            user: None,
            expires: None,
        }
    }

    pub fn authenticated(user: SessionUser, expires: Option<String>) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            user: Some(user),
            expires,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }
}

/// Response of the nonce endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceResponse {
    pub nonce: Option<String>,
}

/// Credential sign-in: the JSON-serialized SIWE message and its signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub message: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

/// Result of a credential sign-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl SignInResponse {
    pub fn success(url: Option<String>) -> Self {
        Self {
            ok: true,
            error: None,
            status: 200,
            url,
        }
    }

    pub fn failure(status: u16, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            status,
            url: None,
        }
    }

    /// The sign-in succeeded and carries no error
    pub fn is_success(&self) -> bool {
        self.ok && self.error.is_none()
    }
}
