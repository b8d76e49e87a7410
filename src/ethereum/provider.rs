use crate::config::Config;
use crate::error::{InsightError, InsightResult};
use alloy::{
    providers::{ProviderBuilder, RootProvider},
    transports::http::{reqwest::Url, Client, Http},
};
use std::collections::HashMap;

/// Explorer and RPC endpoints for a single chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEndpoint {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub explorer_api_url: String,
    pub explorer_api_key_env: Option<String>,
}

impl ChainEndpoint {
    pub fn explorer_api_key(&self) -> Option<String> {
        self.explorer_api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct ChainEndpointResolver {
    endpoints: HashMap<u64, ChainEndpoint>,
}

impl ChainEndpointResolver {
    pub fn new(config: &Config) -> Self {
        let mut names: Vec<&String> = config.chains.keys().collect();
        names.sort();

        let mut endpoints: HashMap<u64, ChainEndpoint> = HashMap::new();
        for name in names {
            let chain = &config.chains[name];
            if let Some(existing) = endpoints.get(&chain.chain_id) {
                tracing::warn!(
                    "Chain id {} configured twice ({} and {}), keeping {}",
                    chain.chain_id,
                    existing.name,
                    name,
                    existing.name
                );
                continue;
            }
            endpoints.insert(
                chain.chain_id,
                ChainEndpoint {
                    name: name.clone(),
                    chain_id: chain.chain_id,
                    rpc_url: chain.rpc_url.clone(),
                    explorer_api_url: chain.explorer_api_url.clone(),
                    explorer_api_key_env: chain.explorer_api_key_env.clone(),
                },
            );
        }

        Self { endpoints }
    }

    pub fn resolve(&self, chain_id: u64) -> InsightResult<&ChainEndpoint> {
        self.endpoints.get(&chain_id).ok_or_else(|| {
            tracing::debug!("Chain id {} not supported", chain_id);
            InsightError::UnsupportedChain(chain_id)
        })
    }

    pub fn supported_chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.endpoints.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn provider(&self, chain_id: u64) -> InsightResult<RootProvider<Http<Client>>> {
        let endpoint = self.resolve(chain_id)?;
        let url = endpoint.rpc_url.parse::<Url>().map_err(|e| {
            InsightError::InvalidInput(format!(
                "Invalid RPC URL '{}' for {}: {}",
                endpoint.rpc_url, endpoint.name, e
            ))
        })?;

        Ok(ProviderBuilder::new().on_http(url))
    }
}
