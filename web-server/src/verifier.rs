// web-server/src/verifier.rs
// EIP-191 personal_sign recovery for SIWE messages
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use sha3::{Digest, Keccak256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature is not valid hex")]
    InvalidHex,
    #[error("signature must decode to 65 bytes")]
    InvalidLength,
    #[error("invalid ECDSA signature bytes")]
    InvalidSignature,
    #[error("signature recovery id must be 0/1 or 27/28")]
    InvalidRecoveryId,
    #[error("failed recovering signer from signature")]
    RecoveryFailed,
    #[error("signature does not match {expected}")]
    SignerMismatch { expected: String, recovered: String },
}

/// Check that `signature_hex` is a personal_sign of `message` by `expected`
/// (normalized address).
pub fn verify_signature(message: &str, signature_hex: &str, expected: &str) -> Result<(), SignatureError> {
    let recovered = recover_address(message, signature_hex)?;
    if recovered != expected {
        return Err(SignatureError::SignerMismatch {
            expected: expected.to_string(),
            recovered,
        });
    }
    Ok(())
}

/// Recover the signing address of a personal_sign signature
pub fn recover_address(message: &str, signature_hex: &str) -> Result<String, SignatureError> {
    let raw = signature_hex.strip_prefix("0x").unwrap_or(signature_hex);
    let bytes = hex::decode(raw).map_err(|_| SignatureError::InvalidHex)?;
    if bytes.len() != 65 {
        return Err(SignatureError::InvalidLength);
    }

    let signature = EcdsaSignature::try_from(&bytes[..64]).map_err(|_| SignatureError::InvalidSignature)?;
    let recovery_id = normalize_recovery_id(bytes[64])?;
    let prehash = personal_sign_hash(message);
    let key = VerifyingKey::recover_from_prehash(&prehash, &signature, recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;
    Ok(address_from_key(&key))
}

fn normalize_recovery_id(raw: u8) -> Result<RecoveryId, SignatureError> {
    let id = match raw {
        27 | 28 => raw - 27,
        0 | 1 => raw,
        _ => return Err(SignatureError::InvalidRecoveryId),
    };
    RecoveryId::try_from(id).map_err(|_| SignatureError::InvalidRecoveryId)
}

/// keccak256("\x19Ethereum Signed Message:\n" + len + message)
pub fn personal_sign_hash(message: &str) -> [u8; 32] {
    let bytes = message.as_bytes();
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", bytes.len()).as_bytes());
    hasher.update(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Lower-case `0x` address of an uncompressed secp256k1 key
pub fn address_from_key(key: &VerifyingKey) -> String {
    let encoded = key.to_encoded_point(false);
    let digest = Keccak256::digest(&encoded.as_bytes()[1..]);
    format!("0x{}", hex::encode(&digest[12..]))
}
