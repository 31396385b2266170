// common/src/siwe.rs
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::normalize_address;

/// The only message version defined by EIP-4361
pub const SIWE_VERSION: &str = "1";

/// Minimum nonce length required by EIP-4361
const MIN_NONCE_LEN: usize = 8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SiweError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("unsupported message version: {0}")]
    UnsupportedVersion(String),
    #[error("invalid nonce")]
    InvalidNonce,
    #[error("invalid chain id")]
    InvalidChainId,
    #[error("invalid timestamp in {field}: {value}")]
    InvalidTimestamp { field: &'static str, value: String },
    #[error("message expired")]
    Expired,
    #[error("message not yet valid")]
    NotYetValid,
    #[error("malformed message: {0}")]
    Malformed(String),
}

/// Structured SIWE (EIP-4361) message, serialized in camelCase to match the
/// wire format used by browser SIWE libraries.
///
/// The server parses the JSON back and prepares the text again, so
/// `prepare_message` must be a pure function of the fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiweMessage {
    pub domain: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
    pub uri: String,
    pub version: String,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
}

impl SiweMessage {
    /// Create a version 1 message issued now
    pub fn new(
        domain: impl Into<String>,
        address: impl Into<String>,
        statement: Option<String>,
        uri: impl Into<String>,
        chain_id: u64,
        nonce: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            address: address.into(),
            statement,
            uri: uri.into(),
            version: SIWE_VERSION.to_string(),
            chain_id,
            nonce: nonce.into(),
            issued_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            expiration_time: None,
            not_before: None,
            request_id: None,
            resources: Vec::new(),
        }
    }

    /// Set an expiration time
    pub fn with_expiration(mut self, at: DateTime<Utc>) -> Self {
        self.expiration_time = Some(at.to_rfc3339_opts(SecondsFormat::Millis, true));
        self
    }

    /// Render the EIP-4361 plain-text message that the wallet signs
    pub fn prepare_message(&self) -> String {
        let header = format!(
            "{} wants you to sign in with your Ethereum account:",
            self.domain
        );

        let mut lines = vec![
            format!("URI: {}", self.uri),
            format!("Version: {}", self.version),
            format!("Chain ID: {}", self.chain_id),
            format!("Nonce: {}", self.nonce),
            format!("Issued At: {}", self.issued_at),
        ];
        if let Some(expiration_time) = &self.expiration_time {
            lines.push(format!("Expiration Time: {}", expiration_time));
        }
        if let Some(not_before) = &self.not_before {
            lines.push(format!("Not Before: {}", not_before));
        }
        if let Some(request_id) = &self.request_id {
            lines.push(format!("Request ID: {}", request_id));
        }
        if !self.resources.is_empty() {
            lines.push("Resources:".to_string());
            for resource in &self.resources {
                lines.push(format!("- {}", resource));
            }
        }

        let statement = match &self.statement {
            Some(statement) => format!("{}\n", statement),
            None => String::new(),
        };

        format!(
            "{}\n{}\n\n{}\n{}",
            header,
            self.address,
            statement,
            lines.join("\n")
        )
    }

    /// Normalized form of the signing address
    pub fn normalized_address(&self) -> Result<String, SiweError> {
        normalize_address(&self.address).ok_or_else(|| SiweError::InvalidAddress(self.address.clone()))
    }

    /// Field and time-window validation. Does not check the signature, the
    /// domain binding or nonce freshness; those belong to the verifier.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), SiweError> {
        self.normalized_address()?;

        if self.version != SIWE_VERSION {
            return Err(SiweError::UnsupportedVersion(self.version.clone()));
        }
        if self.chain_id == 0 {
            return Err(SiweError::InvalidChainId);
        }
        if self.nonce.len() < MIN_NONCE_LEN || !self.nonce.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SiweError::InvalidNonce);
        }
        if self.domain.trim().is_empty() || self.domain.contains('\n') {
            return Err(SiweError::Malformed("domain".to_string()));
        }
        if let Some(statement) = &self.statement {
            if statement.contains('\n') {
                return Err(SiweError::Malformed("statement".to_string()));
            }
        }

        parse_timestamp("issuedAt", &self.issued_at)?;
        if let Some(expiration_time) = &self.expiration_time {
            if parse_timestamp("expirationTime", expiration_time)? <= now {
                return Err(SiweError::Expired);
            }
        }
        if let Some(not_before) = &self.not_before {
            if parse_timestamp("notBefore", not_before)? > now {
                return Err(SiweError::NotYetValid);
            }
        }

        Ok(())
    }
}

fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, SiweError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| SiweError::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
}
