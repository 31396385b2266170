// common/src/address.rs
use serde_json::Value;
use sha3::{Digest, Keccak256};

/// Number of hex characters in an account address (20 bytes)
const ADDRESS_HEX_LEN: usize = 40;

/// Normalize a wallet address to `0x` + 40 lower-case hex characters.
///
/// Returns `None` for anything that is not a 20-byte hex address, including
/// values without the `0x` prefix.
pub fn normalize_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))?;

    if hex.len() != ADDRESS_HEX_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    Some(format!("0x{}", hex.to_ascii_lowercase()))
}

/// True if the value already is in normalized (case-folded) form
pub fn is_normalized_address(value: &str) -> bool {
    value.len() == ADDRESS_HEX_LEN + 2
        && value.starts_with("0x")
        && value[2..]
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// EIP-55 mixed-case checksum encoding of an address.
///
/// Wallets expect the checksummed form inside SIWE messages and as the
/// `personal_sign` account parameter.
pub fn to_checksum_address(raw: &str) -> Option<String> {
    let normalized = normalize_address(raw)?;
    let hex = &normalized[2..];

    let digest = Keccak256::digest(hex.as_bytes());

    let mut out = String::with_capacity(ADDRESS_HEX_LEN + 2);
    out.push_str("0x");
    for (i, c) in hex.chars().enumerate() {
        let byte = digest[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Parse a chain id as reported by a wallet.
///
/// Providers report `0x`-hex strings, some report decimal strings or plain
/// numbers. Zero is not a valid chain id.
pub fn parse_chain_id(value: &Value) -> Option<u64> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16).ok(),
                None => s.parse::<u64>().ok(),
            }
        }
        _ => None,
    };
    parsed.filter(|id| *id > 0)
}

/// Format a chain id the way `wallet_switchEthereumChain` expects it
pub fn chain_id_hex(chain_id: u64) -> String {
    format!("0x{:x}", chain_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_address() {
        let normalized = normalize_address("0x71C7656EC7ab88b098defB751B7401B5f6d8976F").unwrap();
        assert_eq!(normalized, "0x71c7656ec7ab88b098defb751b7401b5f6d8976f");
        assert!(is_normalized_address(&normalized));

        assert!(normalize_address("71c7656ec7ab88b098defb751b7401b5f6d8976f").is_none());
        assert!(normalize_address("0x123").is_none());
        assert!(normalize_address(&format!("0x{}", "g".repeat(40))).is_none());
    }

    #[test]
    fn test_is_normalized_rejects_upper_case() {
        assert!(!is_normalized_address("0x71C7656EC7ab88b098defB751B7401B5f6d8976F"));
        assert!(!is_normalized_address("0x71c7"));
    }

    #[test]
    fn test_checksum_address() {
        // Reference vectors from EIP-55
        assert_eq!(
            to_checksum_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap(),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
        assert_eq!(
            to_checksum_address("0xFB6916095CA1DF60BB79CE92CE3EA74C37C5D359").unwrap(),
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359"
        );
    }

    #[test]
    fn test_parse_chain_id() {
        assert_eq!(parse_chain_id(&json!("0x1")), Some(1));
        assert_eq!(parse_chain_id(&json!("0xaa36a7")), Some(11155111));
        assert_eq!(parse_chain_id(&json!("44787")), Some(44787));
        assert_eq!(parse_chain_id(&json!(42220)), Some(42220));
        assert_eq!(parse_chain_id(&json!("0x0")), None);
        assert_eq!(parse_chain_id(&json!("not a chain")), None);
        assert_eq!(parse_chain_id(&json!(null)), None);
    }

    #[test]
    fn test_chain_id_hex() {
        assert_eq!(chain_id_hex(1), "0x1");
        assert_eq!(chain_id_hex(44787), "0xaef3");
    }
}
