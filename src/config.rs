use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chains: HashMap<String, ChainConfig>,
    pub social_graph: SocialGraphConfig,
    pub completion: CompletionConfig,
    pub identity: IdentityConfig,
    pub server: ServerConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub rpc_url: String,
    /// Environment variable that, when set, replaces `rpc_url`
    pub rpc_url_env: Option<String>,
    pub explorer_api_url: String,
    pub explorer_api_key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialGraphConfig {
    pub endpoint: String,
    pub page_size: u32,
    pub max_pages: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub jwks_url: String,
    pub issuer: String,
    pub audience: String,
    pub verification_site: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let mut chains = HashMap::new();

        chains.insert(
            "ethereum".to_string(),
            ChainConfig {
                chain_id: 1,
                rpc_url: "https://eth.merkle.io".to_string(),
                rpc_url_env: Some("INFURA_RPC_API_ETH_MAINNET".to_string()),
                explorer_api_url: "https://api.etherscan.io/api".to_string(),
                explorer_api_key_env: Some("ETHERSCAN_API_KEY".to_string()),
            },
        );

        chains.insert(
            "goerli".to_string(),
            ChainConfig {
                chain_id: 5,
                rpc_url: "https://rpc.ankr.com/eth_goerli".to_string(),
                rpc_url_env: Some("INFURA_RPC_API_ETH_GOERLI".to_string()),
                explorer_api_url: "https://api-goerli.etherscan.io/api".to_string(),
                explorer_api_key_env: Some("ETHERSCAN_API_KEY".to_string()),
            },
        );

        chains.insert(
            "polygon".to_string(),
            ChainConfig {
                chain_id: 137,
                rpc_url: "https://polygon-rpc.com".to_string(),
                rpc_url_env: Some("INFURA_RPC_API_POLYGON_MAINNET".to_string()),
                explorer_api_url: "https://api.polygonscan.com/api".to_string(),
                explorer_api_key_env: Some("POLYGONSCAN_API_KEY".to_string()),
            },
        );

        chains.insert(
            "mumbai".to_string(),
            ChainConfig {
                chain_id: 80001,
                rpc_url: "https://rpc-mumbai.maticvigil.com".to_string(),
                rpc_url_env: Some("INFURA_RPC_API_POLYGON_MUMBAI".to_string()),
                explorer_api_url: "https://api-testnet.polygonscan.com/api".to_string(),
                explorer_api_key_env: Some("POLYGONSCAN_API_KEY".to_string()),
            },
        );

        chains.insert(
            "linea-testnet".to_string(),
            ChainConfig {
                chain_id: 59140,
                rpc_url: "https://rpc.goerli.linea.build".to_string(),
                rpc_url_env: Some("INFURA_RPC_API_LINEA_TESTNET".to_string()),
                explorer_api_url: "https://explorer.goerli.linea.build/api".to_string(),
                explorer_api_key_env: None,
            },
        );

        Self {
            chains,
            social_graph: SocialGraphConfig {
                endpoint: "https://api.lens.dev".to_string(),
                page_size: 50,
                max_pages: 10,
            },
            completion: CompletionConfig {
                endpoint: "https://api.openai.com".to_string(),
                model: "gpt-3.5-turbo".to_string(),
                api_key_env: "GPT_API_KEY".to_string(),
            },
            identity: IdentityConfig {
                jwks_url: "https://id.worldcoin.org/jwks.json".to_string(),
                issuer: "https://id.worldcoin.org".to_string(),
                audience: "app_f91c6534554696a6072fd51a1d39df92".to_string(),
                verification_site: "https://eth-tokyo-social-security-snap-site.vercel.app/"
                    .to_string(),
            },
            server: ServerConfig {
                bind: "0.0.0.0:3000".to_string(),
                request_timeout_secs: 15,
            },
            store: StoreConfig { path: None },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        Ok(config)
    }

    /// Load configuration with fallback to default
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        config.apply_env_vars();
        config
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_vars(&mut self) {
        for (chain_name, chain) in &mut self.chains {
            let Some(var) = &chain.rpc_url_env else {
                continue;
            };
            match std::env::var(var) {
                Ok(url) if !url.is_empty() => {
                    chain.rpc_url = url;
                    tracing::debug!("Using {} for {} RPC URL", var, chain_name);
                }
                _ => {
                    tracing::debug!("{} not set, using public RPC for {}", var, chain_name);
                }
            }
        }

        if let Ok(endpoint) = std::env::var("GPT_API_ENDPOINT") {
            tracing::info!("Using GPT_API_ENDPOINT environment variable for completions");
            self.completion.endpoint = endpoint;
        }

        if std::env::var(&self.completion.api_key_env).is_err() {
            tracing::warn!(
                "{} is not set, completion requests will be sent without credentials",
                self.completion.api_key_env
            );
        }

        if let Ok(audience) = std::env::var("WORLDCOIN_APP_ID") {
            self.identity.audience = audience;
        }
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("tx-insight").join("config.toml"))
    }

    /// Where the identity record lives when no path is configured
    pub fn store_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.store.path {
            return Ok(path.clone());
        }
        let data_dir =
            dirs::data_dir().ok_or_else(|| anyhow!("Could not determine data directory"))?;
        Ok(data_dir.join("tx-insight").join("state.json"))
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let sample_config = r#"# tx-insight configuration file

# Chains keyed by name. rpc_url_env / explorer_api_key_env name environment
# variables read at startup / request time.
[chains.ethereum]
chain_id = 1
rpc_url = "https://eth.merkle.io"
rpc_url_env = "INFURA_RPC_API_ETH_MAINNET"
explorer_api_url = "https://api.etherscan.io/api"
explorer_api_key_env = "ETHERSCAN_API_KEY"

[chains.goerli]
chain_id = 5
rpc_url = "https://rpc.ankr.com/eth_goerli"
rpc_url_env = "INFURA_RPC_API_ETH_GOERLI"
explorer_api_url = "https://api-goerli.etherscan.io/api"
explorer_api_key_env = "ETHERSCAN_API_KEY"

[chains.polygon]
chain_id = 137
rpc_url = "https://polygon-rpc.com"
rpc_url_env = "INFURA_RPC_API_POLYGON_MAINNET"
explorer_api_url = "https://api.polygonscan.com/api"
explorer_api_key_env = "POLYGONSCAN_API_KEY"

[chains.mumbai]
chain_id = 80001
rpc_url = "https://rpc-mumbai.maticvigil.com"
rpc_url_env = "INFURA_RPC_API_POLYGON_MUMBAI"
explorer_api_url = "https://api-testnet.polygonscan.com/api"
explorer_api_key_env = "POLYGONSCAN_API_KEY"

[chains.linea-testnet]
chain_id = 59140
rpc_url = "https://rpc.goerli.linea.build"
rpc_url_env = "INFURA_RPC_API_LINEA_TESTNET"
explorer_api_url = "https://explorer.goerli.linea.build/api"

[social_graph]
endpoint = "https://api.lens.dev"
page_size = 50
max_pages = 10

[completion]
endpoint = "https://api.openai.com"
model = "gpt-3.5-turbo"
api_key_env = "GPT_API_KEY"

[identity]
jwks_url = "https://id.worldcoin.org/jwks.json"
issuer = "https://id.worldcoin.org"
audience = "app_f91c6534554696a6072fd51a1d39df92"
verification_site = "https://eth-tokyo-social-security-snap-site.vercel.app/"

[server]
bind = "0.0.0.0:3000"
request_timeout_secs = 15

[store]
# path = "/var/lib/tx-insight/state.json"

# Environment variables that can be used:
# ETHERSCAN_API_KEY / POLYGONSCAN_API_KEY - explorer API keys
# INFURA_RPC_API_* - per-chain RPC URLs (see rpc_url_env above)
# GPT_API_KEY - bearer token for the completion endpoint
# GPT_API_ENDPOINT - overrides [completion].endpoint
# WORLDCOIN_APP_ID - overrides [identity].audience
"#;
        sample_config.to_string()
    }
}
