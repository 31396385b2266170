// common/src/models/session.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, SecondsFormat, Utc};

use crate::messages::{SessionSnapshot, SessionUser};

/// Role every signed-in address receives
pub const ROLE_USER: &str = "user";
/// Role granted to configured admin addresses
pub const ROLE_ADMIN: &str = "admin";

/// Server-side record of a wallet session created by a verified SIWE sign-in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletSession {
    /// Unique session identifier, carried in the session token
    pub session_id: Uuid,
    /// Normalized wallet address that signed the message
    pub address: String,
    /// Chain the message was signed for
    pub chain_id: u64,
    pub roles: Vec<String>,
    /// Timestamp when the session was created
    pub created_at: DateTime<Utc>,
    /// Timestamp of last client activity
    pub last_active: DateTime<Utc>,
}

impl WalletSession {
    /// Create a new session for a verified address
    pub fn new(address: String, chain_id: u64, roles: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            address,
            chain_id,
            roles,
            created_at: now,
            last_active: now,
        }
    }

    /// Update session activity timestamp
    pub fn update_activity(&mut self) {
        self.last_active = Utc::now();
    }

    /// Check if the session has expired based on TTL
    pub fn is_expired(&self, ttl_seconds: i64) -> bool {
        let age = Utc::now().signed_duration_since(self.last_active);
        age.num_seconds() > ttl_seconds
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn expires_at(&self, ttl_seconds: i64) -> DateTime<Utc> {
        self.last_active + Duration::seconds(ttl_seconds)
    }

    /// Client-facing view of this session
    pub fn snapshot(&self, ttl_seconds: i64) -> SessionSnapshot {
        SessionSnapshot::authenticated(
            SessionUser {
                address: self.address.clone(),
                roles: self.roles.clone(),
            },
            Some(self.expires_at(ttl_seconds).to_rfc3339_opts(SecondsFormat::Secs, true)),
        )
    }
}

/// Roles for an address given the configured admin list
pub fn roles_for(address: &str, admin_addresses: &[String]) -> Vec<String> {
    let mut roles = vec![ROLE_USER.to_string()];
    if admin_addresses
        .iter()
        .any(|admin| admin.eq_ignore_ascii_case(address))
    {
        roles.push(ROLE_ADMIN.to_string());
    }
    roles
}

/// Result of session operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionResult {
    Success(WalletSession),
    NotFound,
    Expired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_for_admin() {
        let admins = vec!["0x71C7656EC7ab88b098defB751B7401B5f6d8976F".to_string()];
        assert_eq!(
            roles_for("0x71c7656ec7ab88b098defb751b7401b5f6d8976f", &admins),
            vec!["user".to_string(), "admin".to_string()]
        );
        assert_eq!(roles_for("0x0000000000000000000000000000000000000001", &admins), vec!["user".to_string()]);
    }

    #[test]
    fn test_session_expiry() {
        let mut session = WalletSession::new("0xabc".to_string(), 1, vec![]);
        assert!(!session.is_expired(60));
        session.last_active = Utc::now() - Duration::seconds(120);
        assert!(session.is_expired(60));
        session.update_activity();
        assert!(!session.is_expired(60));
    }

    #[test]
    fn test_snapshot_is_authenticated() {
        let session = WalletSession::new("0xabc".to_string(), 1, vec![ROLE_USER.to_string()]);
        let snapshot = session.snapshot(3600);
        assert!(snapshot.is_authenticated());
        assert_eq!(snapshot.user.unwrap().address, "0xabc");
        assert!(snapshot.expires.is_some());
    }
}
