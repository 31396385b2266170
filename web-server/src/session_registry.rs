// web-server/src/session_registry.rs
use actix::{Actor, Context, Handler, Message, AsyncContext, MessageResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use common::models::session::{SessionResult, WalletSession};
use common::SessionConfig;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use crate::utils::token::generate_nonce;

/// Actor message: Issue a fresh single-use nonce
#[derive(Message)]
#[rtype(result = "String")]
pub struct IssueNonce;

/// Actor message: Consume a nonce. True only the first time a live nonce is
/// presented; the nonce is gone afterwards either way.
#[derive(Message)]
#[rtype(result = "bool")]
pub struct ConsumeNonce {
    pub nonce: String,
}

/// Actor message: Create a session for a verified address
#[derive(Message)]
#[rtype(result = "WalletSession")]
pub struct CreateSession {
    pub address: String,
    pub chain_id: u64,
    pub roles: Vec<String>,
}

/// Actor message: Get a session by id, refreshing its activity
#[derive(Message)]
#[rtype(result = "SessionResult")]
pub struct GetSession {
    pub session_id: Uuid,
}

/// Actor message: Remove a session
#[derive(Message)]
#[rtype(result = "bool")]
pub struct InvalidateSession {
    pub session_id: Uuid,
}

/// Actor message: Drop expired sessions and nonces
#[derive(Message)]
#[rtype(result = "usize")]
pub struct CleanupExpired;

/// Actor message: Get session metrics
#[derive(Message)]
#[rtype(result = "SessionMetrics")]
pub struct GetSessionMetrics;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionMetrics {
    pub active_sessions: usize,
    pub admin_sessions: usize,
    pub outstanding_nonces: usize,
    pub nonces_issued: usize,
    pub nonces_rejected: usize,
    pub expired_count: usize,
    pub avg_session_age_seconds: f64,
}

/// SessionRegistryActor owns nonces and sessions
pub struct SessionRegistryActor {
    // Nonce -> time of issue
    nonces: Arc<DashMap<String, DateTime<Utc>>>,
    sessions: Arc<DashMap<Uuid, WalletSession>>,
    session_ttl: i64,
    nonce_ttl: i64,
    cleanup_interval: u64,
    metrics: SessionMetrics,
}

impl Default for SessionRegistryActor {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}

impl SessionRegistryActor {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            nonces: Arc::new(DashMap::new()),
            sessions: Arc::new(DashMap::new()),
            session_ttl: config.ttl_seconds,
            nonce_ttl: config.nonce_ttl_seconds,
            cleanup_interval: config.cleanup_interval_seconds.max(1),
            metrics: SessionMetrics::default(),
        }
    }

    fn nonce_expired(&self, issued_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(issued_at) > ChronoDuration::seconds(self.nonce_ttl)
    }

    fn update_metrics(&mut self) {
        let now = Utc::now();
        let mut admin_count = 0;
        let mut age_sum = 0.0;

        for entry in self.sessions.iter() {
            let session = entry.value();
            if session.has_role(common::models::session::ROLE_ADMIN) {
                admin_count += 1;
            }
            age_sum += now.signed_duration_since(session.created_at).num_seconds() as f64;
        }

        let total = self.sessions.len();
        self.metrics.active_sessions = total;
        self.metrics.admin_sessions = admin_count;
        self.metrics.outstanding_nonces = self.nonces.len();
        self.metrics.avg_session_age_seconds = if total > 0 { age_sum / total as f64 } else { 0.0 };
    }

    fn cleanup(&mut self) -> usize {
        let now = Utc::now();

        let expired_sessions: Vec<Uuid> = self.sessions.iter()
            .filter(|entry| entry.value().is_expired(self.session_ttl))
            .map(|entry| *entry.key())
            .collect();
        for session_id in &expired_sessions {
            self.sessions.remove(session_id);
        }

        let expired_nonces: Vec<String> = self.nonces.iter()
            .filter(|entry| self.nonce_expired(*entry.value(), now))
            .map(|entry| entry.key().clone())
            .collect();
        for nonce in &expired_nonces {
            self.nonces.remove(nonce);
        }

        self.metrics.expired_count += expired_sessions.len();
        self.update_metrics();

        expired_sessions.len() + expired_nonces.len()
    }
}

impl Actor for SessionRegistryActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            "SessionRegistryActor started with session TTL: {}s, nonce TTL: {}s",
            self.session_ttl,
            self.nonce_ttl
        );

        ctx.run_interval(Duration::from_secs(self.cleanup_interval), |act, _ctx| {
            let removed = act.cleanup();
            if removed > 0 {
                tracing::info!("Cleaned up {} expired sessions and nonces", removed);
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            "SessionRegistryActor stopped. Final metrics: {} active sessions, {} expired during lifetime",
            self.metrics.active_sessions,
            self.metrics.expired_count
        );
    }
}

impl Handler<IssueNonce> for SessionRegistryActor {
    type Result = MessageResult<IssueNonce>;

    fn handle(&mut self, _msg: IssueNonce, _ctx: &mut Self::Context) -> Self::Result {
        let nonce = generate_nonce();
        self.nonces.insert(nonce.clone(), Utc::now());
        self.metrics.nonces_issued += 1;
        tracing::debug!("Issued nonce, {} outstanding", self.nonces.len());
        MessageResult(nonce)
    }
}

impl Handler<ConsumeNonce> for SessionRegistryActor {
    type Result = MessageResult<ConsumeNonce>;

    fn handle(&mut self, msg: ConsumeNonce, _ctx: &mut Self::Context) -> Self::Result {
        let valid = match self.nonces.remove(&msg.nonce) {
            Some((_, issued_at)) => !self.nonce_expired(issued_at, Utc::now()),
            None => false,
        };
        if !valid {
            self.metrics.nonces_rejected += 1;
            tracing::warn!("Rejected unknown, replayed or expired nonce");
        }
        MessageResult(valid)
    }
}

impl Handler<CreateSession> for SessionRegistryActor {
    type Result = MessageResult<CreateSession>;

    fn handle(&mut self, msg: CreateSession, _ctx: &mut Self::Context) -> Self::Result {
        let session = WalletSession::new(msg.address, msg.chain_id, msg.roles);
        self.sessions.insert(session.session_id, session.clone());
        tracing::info!("Created session {} for {}", session.session_id, session.address);
        MessageResult(session)
    }
}

impl Handler<GetSession> for SessionRegistryActor {
    type Result = MessageResult<GetSession>;

    fn handle(&mut self, msg: GetSession, _ctx: &mut Self::Context) -> Self::Result {
        let result = if let Some(mut entry) = self.sessions.get_mut(&msg.session_id) {
            let session = entry.value_mut();
            if session.is_expired(self.session_ttl) {
                tracing::debug!("Session expired: {}", session.session_id);
                SessionResult::Expired
            } else {
                session.update_activity();
                SessionResult::Success(session.clone())
            }
        } else {
            tracing::debug!("Session not found: {}", msg.session_id);
            SessionResult::NotFound
        };

        if matches!(result, SessionResult::Expired) {
            self.sessions.remove(&msg.session_id);
            self.metrics.expired_count += 1;
        }

        MessageResult(result)
    }
}

impl Handler<InvalidateSession> for SessionRegistryActor {
    type Result = MessageResult<InvalidateSession>;

    fn handle(&mut self, msg: InvalidateSession, _ctx: &mut Self::Context) -> Self::Result {
        let removed = self.sessions.remove(&msg.session_id).is_some();
        if removed {
            tracing::info!("Invalidated session {}", msg.session_id);
        }
        MessageResult(removed)
    }
}

impl Handler<CleanupExpired> for SessionRegistryActor {
    type Result = MessageResult<CleanupExpired>;

    fn handle(&mut self, _msg: CleanupExpired, _ctx: &mut Self::Context) -> Self::Result {
        let removed = self.cleanup();
        tracing::info!("Cleaned up {} expired sessions and nonces", removed);
        MessageResult(removed)
    }
}

impl Handler<GetSessionMetrics> for SessionRegistryActor {
    type Result = MessageResult<GetSessionMetrics>;

    fn handle(&mut self, _msg: GetSessionMetrics, _ctx: &mut Self::Context) -> Self::Result {
        self.update_metrics();
        MessageResult(self.metrics.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix::Actor;

    #[actix::test]
    async fn test_nonce_is_single_use() {
        let registry = SessionRegistryActor::default().start();

        let nonce = registry.send(IssueNonce).await.unwrap();
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(registry.send(ConsumeNonce { nonce: nonce.clone() }).await.unwrap());
        assert!(!registry.send(ConsumeNonce { nonce }).await.unwrap());
        assert!(!registry.send(ConsumeNonce { nonce: "neverissued1".to_string() }).await.unwrap());

        let metrics = registry.send(GetSessionMetrics).await.unwrap();
        assert_eq!(metrics.nonces_issued, 1);
        assert_eq!(metrics.nonces_rejected, 2);
        assert_eq!(metrics.outstanding_nonces, 0);
    }

    #[actix::test]
    async fn test_expired_nonce_is_rejected() {
        let config = SessionConfig {
            nonce_ttl_seconds: -1,
            ..SessionConfig::default()
        };
        let registry = SessionRegistryActor::new(&config).start();

        let nonce = registry.send(IssueNonce).await.unwrap();
        assert!(!registry.send(ConsumeNonce { nonce }).await.unwrap());
        registry.send(IssueNonce).await.unwrap();
        assert_eq!(registry.send(CleanupExpired).await.unwrap(), 1);
    }

    #[actix::test]
    async fn test_session_lifecycle() {
        let registry = SessionRegistryActor::default().start();
        let session = registry
            .send(CreateSession {
                address: "0x71c7656ec7ab88b098defb751b7401b5f6d8976f".to_string(),
                chain_id: 44787,
                roles: vec!["user".to_string(), "admin".to_string()],
            })
            .await
            .unwrap();

        match registry.send(GetSession { session_id: session.session_id }).await.unwrap() {
            SessionResult::Success(found) => assert_eq!(found.address, session.address),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(registry.send(GetSessionMetrics).await.unwrap().admin_sessions, 1);

        assert!(registry.send(InvalidateSession { session_id: session.session_id }).await.unwrap());
        assert!(!registry.send(InvalidateSession { session_id: session.session_id }).await.unwrap());
        assert!(matches!(
            registry.send(GetSession { session_id: session.session_id }).await.unwrap(),
            SessionResult::NotFound
        ));
    }

    #[actix::test]
    async fn test_expired_session_is_removed() {
        let config = SessionConfig {
            ttl_seconds: -1,
            ..SessionConfig::default()
        };
        let registry = SessionRegistryActor::new(&config).start();
        let session = registry
            .send(CreateSession {
                address: "0x71c7656ec7ab88b098defb751b7401b5f6d8976f".to_string(),
                chain_id: 1,
                roles: vec![],
            })
            .await
            .unwrap();

        assert!(matches!(
            registry.send(GetSession { session_id: session.session_id }).await.unwrap(),
            SessionResult::Expired
        ));
        assert_eq!(registry.send(GetSessionMetrics).await.unwrap().active_sessions, 0);
    }
}
