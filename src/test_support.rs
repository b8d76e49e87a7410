//! Shared fixtures for unit tests: local stand-ins for upstream APIs.

use alloy::{json_abi::JsonAbi, primitives::Address};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use crate::config::{ChainConfig, Config};
use crate::error::{InsightError, InsightResult};
use crate::ethereum::{ApprovalReport, ContractLookup, ContractMetadata, DecodedCall, SocialProfile};
use crate::insight::{InsightBackend, InsightPanel};

pub const OPERATOR: &str = "0x1e0049783f008a0085193e00003d00cd54003c71";
pub const CONTRACT: &str = "0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e";
pub const WALLET: &str = "0x0000000000000000000000000000000000000001";

pub const ERC721_ABI: &str = r#"[
  {"type":"function","name":"setApprovalForAll","stateMutability":"nonpayable",
   "inputs":[{"name":"operator","type":"address"},{"name":"approved","type":"bool"}],
   "outputs":[]},
  {"type":"function","name":"isApprovedForAll","stateMutability":"view",
   "inputs":[{"name":"owner","type":"address"},{"name":"operator","type":"address"}],
   "outputs":[{"name":"","type":"bool"}]},
  {"type":"function","name":"transferFrom","stateMutability":"nonpayable",
   "inputs":[{"name":"from","type":"address"},{"name":"to","type":"address"},{"name":"tokenId","type":"uint256"}],
   "outputs":[]},
  {"type":"function","name":"burn","stateMutability":"nonpayable",
   "inputs":[{"name":"tokenId","type":"uint256"}],
   "outputs":[]}
]"#;

pub fn erc721_abi() -> JsonAbi {
    serde_json::from_str(ERC721_ABI).unwrap()
}

/// Calldata for `setApprovalForAll(operator, approved)`
pub fn set_approval_for_all_input(operator: &str, approved: bool) -> Vec<u8> {
    let mut input = hex::decode("a22cb465").unwrap();
    input.extend_from_slice(&[0u8; 12]);
    input.extend_from_slice(Address::from_str(operator).unwrap().as_slice());
    let mut flag = [0u8; 32];
    flag[31] = approved as u8;
    input.extend_from_slice(&flag);
    input
}

/// Text of every line under `heading`, in order
pub fn panel_text(panel: &InsightPanel, heading: &str) -> Vec<String> {
    panel
        .section(heading)
        .map(|section| section.lines.iter().map(|line| line.as_str().to_string()).collect())
        .unwrap_or_default()
}

/// Serves `router` on an ephemeral local port and returns its base URL
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Default config reduced to a single chain with the given endpoints
pub fn config_with_chain(chain_id: u64, rpc_url: &str, explorer_api_url: &str) -> Config {
    let mut config = Config::default();
    config.chains.clear();
    config.chains.insert(
        "local".to_string(),
        ChainConfig {
            chain_id,
            rpc_url: rpc_url.to_string(),
            rpc_url_env: None,
            explorer_api_url: explorer_api_url.to_string(),
            explorer_api_key_env: None,
        },
    );
    config
}

pub const VALID_TOKEN: &str = "valid-world-id-token";
pub const HUMAN_SUB: &str = "0x2ae86d6d747702b3b2c81811cd2b39875e8fa6b780ee4a207bdc203a7860b535";

const COLLECTION_SOURCE: &str = "contract Collection {\n    function setApprovalForAll(address operator, bool approved) public {\n        approvals[msg.sender][operator] = approved;\n    }\n}\n";

/// In-process stand-in for every upstream service.
///
/// Follows alice (approved, has called the contract), bob (RPC fails) and
/// carol (not approved, has called the contract).
/// Profile, following and summarize calls each sleep for `delay`.
pub struct FakeBackend {
    verified: bool,
    supported_chain: u64,
    delay: Duration,
    identity_accepted: bool,
    social_down: bool,
    summarizer_down: bool,
    pub lookup_calls: AtomicUsize,
    pub summarize_calls: AtomicUsize,
    pub operators: StdMutex<Vec<String>>,
    pub snippets: StdMutex<Vec<String>>,
}

impl FakeBackend {
    fn new(verified: bool) -> Self {
        Self {
            verified,
            supported_chain: 1,
            delay: Duration::ZERO,
            identity_accepted: true,
            social_down: false,
            summarizer_down: false,
            lookup_calls: AtomicUsize::new(0),
            summarize_calls: AtomicUsize::new(0),
            operators: StdMutex::new(Vec::new()),
            snippets: StdMutex::new(Vec::new()),
        }
    }

    pub fn verified() -> Self {
        Self::new(true)
    }

    pub fn unverified() -> Self {
        Self::new(false)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn rejecting_identity(mut self) -> Self {
        self.identity_accepted = false;
        self
    }

    pub fn with_social_down(mut self) -> Self {
        self.social_down = true;
        self
    }

    pub fn with_summarizer_down(mut self) -> Self {
        self.summarizer_down = true;
        self
    }

    fn check_chain(&self, chain_id: u64) -> InsightResult<()> {
        if chain_id == self.supported_chain {
            Ok(())
        } else {
            Err(InsightError::UnsupportedChain(chain_id))
        }
    }

    fn profile(handle: &str, last_byte: u8) -> SocialProfile {
        let mut bytes = [0u8; 20];
        bytes[19] = last_byte;
        SocialProfile {
            wallet_address: Address::from(bytes).to_string(),
            handle: handle.to_string(),
        }
    }
}

#[async_trait]
impl InsightBackend for FakeBackend {
    async fn verify_identity(&self, token: &str) -> InsightResult<Value> {
        if self.identity_accepted && token == VALID_TOKEN {
            Ok(json!({ "sub": HUMAN_SUB }))
        } else {
            Err(InsightError::IdentityRejected("invalid audience".to_string()))
        }
    }

    async fn contract_lookup(
        &self,
        chain_id: u64,
        _contract_address: &str,
    ) -> InsightResult<ContractLookup> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.check_chain(chain_id)?;
        if !self.verified {
            return Ok(ContractLookup::NotVerified);
        }
        Ok(ContractLookup::Verified(ContractMetadata {
            name: "Collection".to_string(),
            source_text: COLLECTION_SOURCE.to_string(),
            abi: erc721_abi(),
        }))
    }

    async fn default_profile(&self, _wallet_address: &str) -> InsightResult<Option<SocialProfile>> {
        tokio::time::sleep(self.delay).await;
        if self.social_down {
            return Err(InsightError::SocialGraphUnavailable("HTTP 503".to_string()));
        }
        Ok(Some(Self::profile("me.lens", 0xee)))
    }

    async fn following(&self, _wallet_address: &str) -> InsightResult<Vec<SocialProfile>> {
        tokio::time::sleep(self.delay).await;
        if self.social_down {
            return Err(InsightError::SocialGraphUnavailable("HTTP 503".to_string()));
        }
        Ok(vec![
            Self::profile("alice.lens", 0xa1),
            Self::profile("bob.lens", 0xb0),
            Self::profile("carol.lens", 0xc0),
        ])
    }

    async fn contract_senders(
        &self,
        chain_id: u64,
        _contract_address: &str,
    ) -> InsightResult<Vec<String>> {
        self.check_chain(chain_id)?;
        let alice = Self::profile("alice.lens", 0xa1).wallet_address.to_lowercase();
        let carol = Self::profile("carol.lens", 0xc0).wallet_address;
        Ok(vec![
            alice,
            format!("0x{}", carol[2..].to_uppercase()),
            "0x00000000000000000000000000000000000000dd".to_string(),
        ])
    }

    async fn check_approvals(
        &self,
        _contract_address: &str,
        owners: &[SocialProfile],
        operator_address: &str,
        chain_id: u64,
    ) -> InsightResult<ApprovalReport> {
        self.check_chain(chain_id)?;
        self.operators
            .lock()
            .unwrap()
            .push(operator_address.to_lowercase());

        let mut report = ApprovalReport::default();
        for owner in owners {
            match owner.handle.as_str() {
                "alice.lens" => report.approved.push(owner.handle.clone()),
                "bob.lens" => report.failures.push(InsightError::RpcCallFailed {
                    address: owner.wallet_address.clone(),
                    message: "execution reverted".to_string(),
                }),
                _ => {}
            }
        }
        Ok(report)
    }

    async fn summarize(
        &self,
        _contract_address: &str,
        _contract_name: &str,
        call: &DecodedCall,
        source_snippet: &str,
    ) -> InsightResult<String> {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        self.snippets.lock().unwrap().push(source_snippet.to_string());
        tokio::time::sleep(self.delay).await;
        if self.summarizer_down {
            return Err(InsightError::SummarizationFailed("HTTP 500".to_string()));
        }
        Ok(format!("{} summary", call.function_name))
    }
}
