// wallet-client/src/network.rs
// Network policy: one required chain, user-consented switching
use common::{chain_id_hex, ChainConfig, ChainsConfig};
use serde_json::{json, Value};

use crate::error::NetworkError;
use crate::locator::ProviderLocator;
use crate::notice::{Notice, NoticeBus};
use crate::provider::{ProviderError, RpcRequest};
use crate::reconciler::SessionView;

#[derive(Clone)]
pub struct NetworkPolicy {
    required: ChainConfig,
    known: Vec<ChainConfig>,
    locator: ProviderLocator,
    notices: NoticeBus,
}

impl NetworkPolicy {
    pub fn new(chains: &ChainsConfig, locator: ProviderLocator, notices: NoticeBus) -> Self {
        Self {
            required: chains.required.clone(),
            known: chains.known.clone(),
            locator,
            notices,
        }
    }

    pub fn required_chain(&self) -> &ChainConfig {
        &self.required
    }

    /// True iff the wallet is on the required chain; an unknown chain id is
    /// never correct.
    pub fn is_correct_network(&self, chain_id: Option<u64>) -> bool {
        chain_id == Some(self.required.id)
    }

    /// Configured chain for a chain id
    pub fn chain(&self, chain_id: Option<u64>) -> Option<&ChainConfig> {
        let chain_id = chain_id?;
        self.known
            .iter()
            .chain(std::iter::once(&self.required))
            .find(|chain| chain.id == chain_id)
    }

    /// Ask the wallet to switch to the required chain.
    ///
    /// Switching needs user consent, so a failure is reported (notice plus
    /// error) and never retried behind the user's back. The only retry is
    /// after adding a chain the wallet did not know.
    pub async fn switch_network(&self) -> Result<(), NetworkError> {
        let result = self.try_switch().await;
        if let Err(e) = &result {
            tracing::error!("Error switching network: {}", e);
            self.notices.publish(Notice::switch_failed(&self.required.name));
        }
        result
    }

    async fn try_switch(&self) -> Result<(), NetworkError> {
        let Some(provider) = self.locator.get_provider() else {
            return Err(NetworkError::ProviderMissing);
        };
        let target = chain_id_hex(self.required.id);
        tracing::info!("Requesting network switch to {} ({})", self.required.name, target);

        match provider.request(RpcRequest::switch_chain(&target)).await {
            Ok(_) => Ok(()),
            Err(ProviderError::UnrecognizedChain) => {
                tracing::info!("Wallet does not know {}, adding it", self.required.name);
                // The add prompt may have swapped the provider
                let provider = self.locator.get_provider().ok_or(NetworkError::ProviderMissing)?;
                provider
                    .request(RpcRequest::add_chain(add_chain_params(&self.required)))
                    .await
                    .map_err(|source| self.switch_failed(source))?;
                let provider = self.locator.get_provider().ok_or(NetworkError::ProviderMissing)?;
                provider
                    .request(RpcRequest::switch_chain(&target))
                    .await
                    .map(|_| ())
                    .map_err(|source| self.switch_failed(source))
            }
            Err(source) => Err(self.switch_failed(source)),
        }
    }

    fn switch_failed(&self, source: ProviderError) -> NetworkError {
        NetworkError::SwitchFailed {
            chain: self.required.name.clone(),
            source,
        }
    }
}

fn add_chain_params(chain: &ChainConfig) -> Value {
    let mut params = json!({
        "chainId": chain_id_hex(chain.id),
        "chainName": chain.name,
    });
    if let Some(currency) = &chain.native_currency {
        params["nativeCurrency"] = json!({
            "name": currency.name,
            "symbol": currency.symbol,
            "decimals": currency.decimals,
        });
    }
    if let Some(rpc_url) = &chain.rpc_url {
        params["rpcUrls"] = json!([rpc_url]);
    }
    if let Some(explorer) = &chain.block_explorer_url {
        params["blockExplorerUrls"] = json!([explorer]);
    }
    params
}

/// Watches the session for a wrong network and announces it.
///
/// Only an authenticated, ready session with a known chain id is checked.
/// Recovery is announced once, and only after a wrong network was seen.
#[derive(Default)]
pub struct NetworkMonitor {
    was_wrong_network: bool,
}

impl NetworkMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(&mut self, view: &SessionView, chain_id: Option<u64>, policy: &NetworkPolicy) -> Option<Notice> {
        if !view.is_ready || !view.authenticated || chain_id.is_none() {
            return None;
        }

        let chain_name = &policy.required_chain().name;
        if !policy.is_correct_network(chain_id) {
            self.was_wrong_network = true;
            return Some(Notice::wrong_network(chain_name));
        }
        if std::mem::take(&mut self.was_wrong_network) {
            return Some(Notice::network_connected(chain_name));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> NetworkPolicy {
        let chains = ChainsConfig {
            required: ChainConfig {
                id: 1,
                name: "Ethereum".to_string(),
                rpc_url: None,
                block_explorer_url: None,
                native_currency: None,
            },
            known: vec![],
        };
        NetworkPolicy::new(&chains, ProviderLocator::new(), NoticeBus::new())
    }

    fn ready_view() -> SessionView {
        SessionView {
            address: Some("0x71c7656ec7ab88b098defb751b7401b5f6d8976f".to_string()),
            authenticated: true,
            is_admin: false,
            is_ready: true,
        }
    }

    #[test]
    fn test_is_correct_network() {
        let policy = policy();
        assert!(policy.is_correct_network(Some(1)));
        assert!(!policy.is_correct_network(Some(5)));
        assert!(!policy.is_correct_network(None));
        assert_eq!(policy.chain(Some(1)).map(|c| c.name.as_str()), Some("Ethereum"));
        assert!(policy.chain(Some(5)).is_none());
    }

    #[test]
    fn test_add_chain_params() {
        let chain = ChainsConfig::default().required;
        let params = add_chain_params(&chain);
        assert_eq!(params["chainId"], "0xaef3");
        assert_eq!(params["nativeCurrency"]["decimals"], 18);
        assert!(params["rpcUrls"].is_array());
    }

    #[tokio::test]
    async fn test_switch_without_provider_fails() {
        let policy = policy();
        let mut notices = policy.notices.subscribe();
        assert_eq!(policy.switch_network().await, Err(NetworkError::ProviderMissing));
        assert_eq!(notices.recv().await.unwrap().title, "Network Switch Failed");
    }

    #[test]
    fn test_monitor_announces_recovery_once() {
        let policy = policy();
        let mut monitor = NetworkMonitor::new();
        let view = ready_view();

        assert!(monitor.evaluate(&view, Some(1), &policy).is_none());
        assert_eq!(monitor.evaluate(&view, Some(5), &policy).unwrap().title, "Network Error");
        assert_eq!(monitor.evaluate(&view, Some(1), &policy).unwrap().title, "Network Connected");
        assert!(monitor.evaluate(&view, Some(1), &policy).is_none());

        let mut anonymous = ready_view();
        anonymous.authenticated = false;
        assert!(monitor.evaluate(&anonymous, Some(5), &policy).is_none());
        assert!(monitor.evaluate(&view, None, &policy).is_none());
    }
}
