// common/src/utils.rs
use tracing_subscriber::{fmt, EnvFilter};
use jsonwebtoken::{encode, decode, Header, Algorithm, Validation, EncodingKey, DecodingKey};
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use chrono::Utc;

/// Setup tracing for consistent logging across crates.
///
/// Honors `RUST_LOG`, defaults to `info`. `APP_LOG_JSON=1` switches to JSON
/// lines. Safe to call more than once; later calls are ignored.
pub fn setup_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let use_json = std::env::var("APP_LOG_JSON")
        .map(|value| value == "1")
        .unwrap_or(false);

    if use_json {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .try_init();
    } else {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .try_init();
    }
}

// Session token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,        // session_id
    pub wallet: String,     // normalized wallet address
    pub roles: Vec<String>,
    pub exp: usize,         // expiration time
    pub iat: usize,         // issued at time
}

/// Issue a signed session token for a verified wallet session
pub fn generate_session_token(
    session_id: &Uuid,
    wallet_address: &str,
    roles: &[String],
    ttl_seconds: i64,
    secret: &[u8],
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp().max(0) as usize;

    let claims = SessionClaims {
        sub: session_id.to_string(),
        wallet: wallet_address.to_string(),
        roles: roles.to_vec(),
        iat: now,
        exp: now + ttl_seconds.max(0) as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret)
    )
}

/// Validate a session token and extract the session id and its claims
pub fn validate_session_token(token: &str, secret: &[u8]) -> Result<(Uuid, SessionClaims), jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);

    let token_data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret),
        &validation
    )?;

    let session_id = Uuid::parse_str(&token_data.claims.sub)
        .map_err(|_| jsonwebtoken::errors::ErrorKind::InvalidSubject)?;

    Ok((session_id, token_data.claims))
}
