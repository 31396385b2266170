// web-server/src/api/auth.rs
// Nonce issue, SIWE sign-in, session read and sign-out
use actix::Addr;
use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::http::StatusCode;
use actix_web::{get, post, web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use common::models::session::{roles_for, SessionResult, WalletSession};
use common::{
    generate_session_token, validate_session_token, Config, NonceResponse, SessionConfig, SessionSnapshot,
    SignInRequest, SignInResponse, SiweConfig, SiweError, SiweMessage,
};
use serde_json::json;
use thiserror::Error;

use crate::error::ApiError;
use crate::session_registry::{
    ConsumeNonce, CreateSession, GetSession, InvalidateSession, IssueNonce, SessionRegistryActor,
};
use crate::verifier::{verify_signature, SignatureError};

/// Why a sign-in was refused
#[derive(Debug, Error)]
pub enum SignInError {
    #[error("Invalid message: {0}")]
    Message(#[from] SiweError),
    #[error("Domain mismatch: expected {expected}, got {found}")]
    DomainMismatch { expected: String, found: String },
    #[error("Invalid nonce")]
    InvalidNonce,
    #[error("Invalid signature: {0}")]
    Signature(#[from] SignatureError),
}

/// Check a parsed SIWE message and its signature. Returns the normalized
/// signer address.
pub fn check_message(
    message: &SiweMessage,
    signature: &str,
    siwe: &SiweConfig,
    nonce_valid: bool,
    now: DateTime<Utc>,
) -> Result<String, SignInError> {
    message.validate(now)?;
    if message.domain != siwe.domain {
        return Err(SignInError::DomainMismatch {
            expected: siwe.domain.clone(),
            found: message.domain.clone(),
        });
    }
    if !nonce_valid {
        return Err(SignInError::InvalidNonce);
    }
    let address = message.normalized_address()?;
    verify_signature(&message.prepare_message(), signature, &address)?;
    Ok(address)
}

fn reject(status: StatusCode, error: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(SignInResponse::failure(status.as_u16(), error))
}

fn session_cookie(config: &SessionConfig, token: String) -> Cookie<'static> {
    Cookie::build(config.cookie_name.clone(), token)
        .path("/")
        .secure(config.cookie_secure)
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(config.ttl_seconds))
        .finish()
}

fn clear_cookie(config: &SessionConfig) -> Cookie<'static> {
    Cookie::build(config.cookie_name.clone(), "")
        .path("/")
        .max_age(CookieDuration::seconds(0))
        .finish()
}

/// Session behind the request's cookie, if it is valid and live
pub async fn current_session(
    req: &HttpRequest,
    registry: &Addr<SessionRegistryActor>,
    config: &Config,
) -> Result<Option<WalletSession>, ApiError> {
    let Some(cookie) = req.cookie(&config.session.cookie_name) else {
        return Ok(None);
    };
    let session_id = match validate_session_token(cookie.value(), config.session.jwt_secret.as_bytes()) {
        Ok((session_id, _claims)) => session_id,
        Err(e) => {
            tracing::debug!("Rejected session token: {}", e);
            return Ok(None);
        }
    };

    match registry.send(GetSession { session_id }).await.map_err(ApiError::internal)? {
        SessionResult::Success(found) => Ok(Some(found)),
        SessionResult::Expired | SessionResult::NotFound => Ok(None),
    }
}

#[get("/auth/nonce")]
pub async fn nonce(registry: web::Data<Addr<SessionRegistryActor>>) -> Result<HttpResponse, ApiError> {
    let nonce = registry.send(IssueNonce).await.map_err(ApiError::internal)?;
    Ok(HttpResponse::Ok().json(NonceResponse { nonce: Some(nonce) }))
}

#[post("/auth/signin")]
pub async fn sign_in(
    body: web::Json<SignInRequest>,
    registry: web::Data<Addr<SessionRegistryActor>>,
    config: web::Data<Config>,
) -> HttpResponse {
    let request = body.into_inner();

    let message: SiweMessage = match serde_json::from_str(&request.message) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Unparseable sign-in message: {}", e);
            return reject(StatusCode::BAD_REQUEST, "Invalid message");
        }
    };

    // Any presentation burns the nonce, successful or not
    let nonce_valid = match registry.send(ConsumeNonce { nonce: message.nonce.clone() }).await {
        Ok(valid) => valid,
        Err(e) => {
            tracing::error!("Error consuming nonce: {}", e);
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    let address = match check_message(&message, &request.signature, &config.siwe, nonce_valid, Utc::now()) {
        Ok(address) => address,
        Err(e) => {
            tracing::warn!("Sign-in rejected for {}: {}", message.address, e);
            return reject(StatusCode::UNAUTHORIZED, e.to_string());
        }
    };

    let roles = roles_for(&address, &config.session.admin_addresses);
    let new_session = match registry
        .send(CreateSession {
            address,
            chain_id: message.chain_id,
            roles,
        })
        .await
    {
        Ok(created) => created,
        Err(e) => {
            tracing::error!("Error creating session: {}", e);
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    let token = match generate_session_token(
        &new_session.session_id,
        &new_session.address,
        &new_session.roles,
        config.session.ttl_seconds,
        config.session.jwt_secret.as_bytes(),
    ) {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("Error issuing session token: {}", e);
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    tracing::info!("User signed in: {} (roles: {:?})", new_session.address, new_session.roles);
    HttpResponse::Ok()
        .cookie(session_cookie(&config.session, token))
        .json(SignInResponse::success(request.callback_url))
}

#[get("/auth/session")]
pub async fn session(
    req: HttpRequest,
    registry: web::Data<Addr<SessionRegistryActor>>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let snapshot = match current_session(&req, &registry, &config).await? {
        Some(current) => current.snapshot(config.session.ttl_seconds),
        None => SessionSnapshot::unauthenticated(),
    };
    Ok(HttpResponse::Ok().json(snapshot))
}

/// Ends the session if there is one; always succeeds
#[post("/auth/signout")]
pub async fn sign_out(
    req: HttpRequest,
    registry: web::Data<Addr<SessionRegistryActor>>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let session_id = req
        .cookie(&config.session.cookie_name)
        .and_then(|cookie| validate_session_token(cookie.value(), config.session.jwt_secret.as_bytes()).ok())
        .map(|(session_id, _)| session_id);

    if let Some(session_id) = session_id {
        let removed = registry
            .send(InvalidateSession { session_id })
            .await
            .map_err(ApiError::internal)?;
        tracing::info!("Sign-out for session {} (was live: {})", session_id, removed);
    }

    Ok(HttpResponse::Ok()
        .cookie(clear_cookie(&config.session))
        .json(json!({ "status": "success" })))
}
