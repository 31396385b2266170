// web-server/src/utils/token.rs
use rand::{thread_rng, Rng};
use rand::distributions::Alphanumeric;

/// Length of SIWE nonces handed out by the nonce endpoint
pub const NONCE_LENGTH: usize = 17;

/// Generate a cryptographically secure random token of specified length
pub fn generate_secure_token(length: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Generate a SIWE nonce. EIP-4361 allows only alphanumerics, at least 8.
pub fn generate_nonce() -> String {
    generate_secure_token(NONCE_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_secure_token() {
        let token = generate_secure_token(32);
        assert_eq!(token.len(), 32);
    }

    #[test]
    fn test_generate_nonce() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), NONCE_LENGTH);
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));

        // Nonces should be unique
        assert_ne!(nonce, generate_nonce());
    }
}
