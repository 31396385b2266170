// common/src/config.rs
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use config::{Config as ConfigFile, File, Environment};

/// Central configuration for the web server and the wallet client
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub web_server_addr: String,

    /// SIWE message parameters
    pub siwe: SiweConfig,

    /// Chain the application requires plus the chains it knows about
    pub chains: ChainsConfig,

    /// Server-side session settings
    pub session: SessionConfig,

    /// Wallet client settings
    pub client: ClientConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SiweConfig {
    /// Host the message is bound to, e.g. `app.example.com`
    pub domain: String,
    /// Origin the user signs in to, e.g. `https://app.example.com`
    pub uri: String,
    pub project_name: String,
    /// Validity window of an issued message in seconds, 0 disables expiry
    pub message_ttl_seconds: i64,
}

impl SiweConfig {
    pub fn statement(&self) -> String {
        format!("{} - Please sign this message to log in to the app.", self.project_name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub block_explorer_url: Option<String>,
    #[serde(default)]
    pub native_currency: Option<NativeCurrency>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainsConfig {
    /// The single chain the application operates on
    pub required: ChainConfig,
    pub known: Vec<ChainConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub ttl_seconds: i64,
    pub nonce_ttl_seconds: i64,
    pub cleanup_interval_seconds: u64,
    pub jwt_secret: String,
    /// Addresses granted the `admin` role on sign-in
    pub admin_addresses: Vec<String>,
    /// Max nonce requests per client IP per minute
    pub nonce_rate_limit: usize,
    /// Mark the session cookie `Secure`; off for plain-http development
    pub cookie_secure: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub backend_url: String,
    pub callback_url: String,
    /// Interval for provider discovery and identity polling
    pub poll_interval_ms: u64,
}

fn celo_alfajores() -> ChainConfig {
    ChainConfig {
        id: 44787,
        name: "Celo Alfajores".to_string(),
        rpc_url: Some("https://alfajores-forno.celo-testnet.org".to_string()),
        block_explorer_url: Some("https://celo-alfajores.blockscout.com".to_string()),
        native_currency: Some(NativeCurrency {
            name: "CELO".to_string(),
            symbol: "A-CELO".to_string(),
            decimals: 18,
        }),
    }
}

fn known_chain(id: u64, name: &str, explorer: &str, symbol: &str) -> ChainConfig {
    ChainConfig {
        id,
        name: name.to_string(),
        rpc_url: None,
        block_explorer_url: Some(explorer.to_string()),
        native_currency: Some(NativeCurrency {
            name: symbol.to_string(),
            symbol: symbol.to_string(),
            decimals: 18,
        }),
    }
}

impl Default for ChainsConfig {
    fn default() -> Self {
        Self {
            required: celo_alfajores(),
            known: vec![
                celo_alfajores(),
                known_chain(11155111, "Sepolia", "https://sepolia.etherscan.io", "ETH"),
                known_chain(42220, "Celo", "https://celoscan.io", "CELO"),
                known_chain(1, "Ethereum", "https://etherscan.io", "ETH"),
            ],
        }
    }
}

impl Default for SiweConfig {
    fn default() -> Self {
        Self {
            domain: "localhost:8081".to_string(),
            uri: "http://localhost:8081".to_string(),
            project_name: "Wallet Session".to_string(),
            message_ttl_seconds: 600,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "siwe_session".to_string(),
            ttl_seconds: 86400,
            nonce_ttl_seconds: 300,
            cleanup_interval_seconds: 3600,
            jwt_secret: "dev_secret".to_string(),
            admin_addresses: Vec::new(),
            nonce_rate_limit: 30,
            cookie_secure: false,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8081".to_string(),
            callback_url: "/dashboard".to_string(),
            poll_interval_ms: 100,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            web_server_addr: "127.0.0.1:8081".to_string(),
            siwe: SiweConfig::default(),
            chains: ChainsConfig::default(),
            session: SessionConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        // Get the run mode, defaulting to "development"
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        // Locate the config directory
        let config_dir = env::var("CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                // Check if we're in the project root or a subcrate
                let mut path = PathBuf::from("./config");
                if !path.exists() {
                    path = PathBuf::from("../config");
                }
                path
            });

        tracing::info!("Loading configuration from {}", config_dir.display());
        tracing::info!("Using run mode: {}", run_mode);

        let config = ConfigFile::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", run_mode))).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // APP__SESSION__JWT_SECRET=... style overrides
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load from files, falling back to plain environment variables
    pub fn from_env() -> Self {
        match Self::load() {
            Ok(config) => {
                tracing::info!("Configuration loaded from files and environment");
                config
            },
            Err(e) => {
                tracing::warn!("Failed to load configuration from files: {}", e);
                tracing::info!("Falling back to environment variables only");

                let mut config = Self::default();

                if let Ok(addr) = env::var("WEB_SERVER_ADDR") {
                    config.web_server_addr = addr;
                }
                if let Ok(domain) = env::var("SIWE_DOMAIN") {
                    config.siwe.domain = domain;
                }
                if let Ok(uri) = env::var("SIWE_URI") {
                    config.siwe.uri = uri;
                }
                if let Ok(name) = env::var("PROJECT_NAME") {
                    config.siwe.project_name = name;
                }
                if let Ok(secret) = env::var("SESSION_JWT_SECRET") {
                    config.session.jwt_secret = secret;
                }
                if let Some(ttl) = env::var("SESSION_TTL_SECONDS").ok().and_then(|v| v.parse().ok()) {
                    config.session.ttl_seconds = ttl;
                }
                if let Ok(admins) = env::var("ADMIN_ADDRESSES") {
                    config.session.admin_addresses = admins
                        .split(',')
                        .map(|a| a.trim().to_string())
                        .filter(|a| !a.is_empty())
                        .collect();
                }
                if let Some(chain_id) = env::var("REQUIRED_CHAIN_ID").ok().and_then(|v| v.parse::<u64>().ok()) {
                    if let Some(chain) = config.chains.known.iter().find(|c| c.id == chain_id) {
                        config.chains.required = chain.clone();
                    } else {
                        tracing::warn!("REQUIRED_CHAIN_ID {} is not a known chain, keeping {}", chain_id, config.chains.required.name);
                    }
                }
                if let Ok(url) = env::var("BACKEND_URL") {
                    config.client.backend_url = url;
                }

                config
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let config = Config::default();
        assert!(config.chains.known.iter().any(|c| c.id == config.chains.required.id));
        assert_eq!(config.client.poll_interval_ms, 100);
        assert!(config.siwe.statement().starts_with("Wallet Session - "));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = serde_json::from_str(r#"{"siwe": {"domain": "app.example.com"}}"#).unwrap();
        assert_eq!(parsed.siwe.domain, "app.example.com");
        assert_eq!(parsed.siwe.message_ttl_seconds, 600);
        assert_eq!(parsed.session.cookie_name, "siwe_session");
    }
}
