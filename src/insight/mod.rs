//! Transaction insight flow: the collaborator seam plus the pieces shared by
//! the HTTP routes and the wallet plugin entry points.

pub mod aggregator;
pub mod panel;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::completion::{Explanation, InsightSummarizer};
use crate::config::Config;
use crate::error::{InsightError, InsightResult};
use crate::ethereum::{
    abi::ContractMetadataFetcher,
    approval::OnChainApprovalChecker,
    decoder::CallDataDecoder,
    provider::ChainEndpointResolver,
    utils, ApprovalReport, ContractLookup, ContractMetadata, DecodedCall, SocialProfile,
};
use crate::identity::IdentityVerifier;
use crate::lens::SocialGraphClient;

pub use aggregator::{InsightAggregator, TransactionEvent};
pub use panel::InsightPanel;

/// Everything the insight flow asks of the outside world
#[async_trait]
pub trait InsightBackend: Send + Sync {
    async fn verify_identity(&self, token: &str) -> InsightResult<Value>;

    async fn contract_lookup(&self, chain_id: u64, contract_address: &str)
        -> InsightResult<ContractLookup>;

    async fn default_profile(&self, wallet_address: &str) -> InsightResult<Option<SocialProfile>>;

    async fn following(&self, wallet_address: &str) -> InsightResult<Vec<SocialProfile>>;

    /// Lowercased, distinct senders of transactions to the contract
    async fn contract_senders(&self, chain_id: u64, contract_address: &str)
        -> InsightResult<Vec<String>>;

    async fn check_approvals(
        &self,
        contract_address: &str,
        owners: &[SocialProfile],
        operator_address: &str,
        chain_id: u64,
    ) -> InsightResult<ApprovalReport>;

    async fn summarize(
        &self,
        contract_address: &str,
        contract_name: &str,
        call: &DecodedCall,
        source_snippet: &str,
    ) -> InsightResult<String>;
}

/// Live backend wired to the configured upstream services
#[derive(Debug, Clone)]
pub struct InsightServices {
    metadata: ContractMetadataFetcher,
    social: SocialGraphClient,
    approvals: OnChainApprovalChecker,
    summarizer: InsightSummarizer,
    identity: IdentityVerifier,
}

impl InsightServices {
    pub fn new(config: &Config) -> Result<Self> {
        let client = http_client(config.request_timeout())?;
        let resolver = Arc::new(ChainEndpointResolver::new(config));

        info!(
            "Insight services ready for chains {:?}",
            resolver.supported_chain_ids()
        );

        Ok(Self {
            metadata: ContractMetadataFetcher::new(client.clone(), resolver.clone()),
            social: SocialGraphClient::new(client.clone(), config.social_graph.clone()),
            approvals: OnChainApprovalChecker::new(resolver, config.request_timeout()),
            summarizer: InsightSummarizer::new(client.clone(), config.completion.clone()),
            identity: IdentityVerifier::new(client, config.identity.clone()),
        })
    }
}

/// Shared client for every upstream HTTP API; `timeout` bounds each request
fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))
}

#[async_trait]
impl InsightBackend for InsightServices {
    async fn verify_identity(&self, token: &str) -> InsightResult<Value> {
        self.identity.verify(token).await
    }

    async fn contract_lookup(
        &self,
        chain_id: u64,
        contract_address: &str,
    ) -> InsightResult<ContractLookup> {
        self.metadata.fetch(chain_id, contract_address).await
    }

    async fn default_profile(&self, wallet_address: &str) -> InsightResult<Option<SocialProfile>> {
        self.social.default_profile(wallet_address).await
    }

    async fn following(&self, wallet_address: &str) -> InsightResult<Vec<SocialProfile>> {
        self.social.following(wallet_address).await
    }

    async fn contract_senders(
        &self,
        chain_id: u64,
        contract_address: &str,
    ) -> InsightResult<Vec<String>> {
        self.metadata
            .transaction_senders(chain_id, contract_address)
            .await
    }

    async fn check_approvals(
        &self,
        contract_address: &str,
        owners: &[SocialProfile],
        operator_address: &str,
        chain_id: u64,
    ) -> InsightResult<ApprovalReport> {
        self.approvals
            .check_approved_for_all(contract_address, owners, operator_address, chain_id)
            .await
    }

    async fn summarize(
        &self,
        contract_address: &str,
        contract_name: &str,
        call: &DecodedCall,
        source_snippet: &str,
    ) -> InsightResult<String> {
        self.summarizer
            .summarize(contract_address, contract_name, call, source_snippet)
            .await
    }
}

#[derive(Debug, Clone)]
pub enum DecodeOutcome {
    Decoded {
        metadata: ContractMetadata,
        call: DecodedCall,
    },
    Unverified,
}

/// Fetch the contract's published ABI and decode `input` against it
pub async fn decode_transaction<B: InsightBackend + ?Sized>(
    backend: &B,
    chain_id: u64,
    contract_address: &str,
    input: &[u8],
) -> InsightResult<DecodeOutcome> {
    match backend.contract_lookup(chain_id, contract_address).await? {
        ContractLookup::NotVerified => {
            debug!("{} on chain {} is not verified", contract_address, chain_id);
            Ok(DecodeOutcome::Unverified)
        }
        ContractLookup::Verified(metadata) => {
            let call = CallDataDecoder::decode(input, &metadata.abi)?;
            debug!("Decoded call to {}.{}", metadata.name, call.function_name);
            Ok(DecodeOutcome::Decoded { metadata, call })
        }
    }
}

/// Unverified contracts get the fixed warning and no completion request
pub async fn summarize_decoded<B: InsightBackend + ?Sized>(
    backend: &B,
    contract_address: &str,
    outcome: &DecodeOutcome,
) -> InsightResult<Explanation> {
    match outcome {
        DecodeOutcome::Unverified => Ok(Explanation::Unverified),
        DecodeOutcome::Decoded { metadata, call } => {
            let snippet =
                CallDataDecoder::extract_source_snippet(&metadata.source_text, &call.function_name);
            backend
                .summarize(contract_address, &metadata.name, call, &snippet)
                .await
                .map(Explanation::Summary)
        }
    }
}

pub async fn explain_call<B: InsightBackend + ?Sized>(
    backend: &B,
    chain_id: u64,
    contract_address: &str,
    input: &[u8],
) -> InsightResult<Explanation> {
    let outcome = decode_transaction(backend, chain_id, contract_address, input).await?;
    summarize_decoded(backend, contract_address, &outcome).await
}

/// An explicit operator wins; otherwise the first argument of the decoded
/// call is used.
pub async fn resolve_operator<B: InsightBackend + ?Sized>(
    backend: &B,
    chain_id: u64,
    contract_address: &str,
    operator_address: Option<&str>,
    input: Option<&[u8]>,
) -> InsightResult<String> {
    if let Some(operator) = operator_address {
        return utils::validate_address(operator).map(|address| address.to_string());
    }

    let input = input.ok_or_else(|| {
        InsightError::InvalidInput("operatorAddress or inputData is required".to_string())
    })?;

    match decode_transaction(backend, chain_id, contract_address, input).await? {
        DecodeOutcome::Unverified => Err(InsightError::InvalidInput(format!(
            "{} is not verified; pass operatorAddress explicitly",
            contract_address
        ))),
        DecodeOutcome::Decoded { call, .. } => call
            .leading_address()
            .map(|address| address.to_string())
            .ok_or_else(|| {
                InsightError::InvalidInput(format!(
                    "first argument of {} is not an address",
                    call.function_name
                ))
            }),
    }
}

/// Handles followed by `wallet_address` whose owners approved `operator_address`
pub async fn approved_following<B: InsightBackend + ?Sized>(
    backend: &B,
    chain_id: u64,
    wallet_address: &str,
    contract_address: &str,
    operator_address: &str,
) -> InsightResult<ApprovalReport> {
    let owners = backend.following(wallet_address).await?;
    let report = backend
        .check_approvals(contract_address, &owners, operator_address, chain_id)
        .await?;

    info!(
        "{} of {} followed profiles approved {} ({} lookups failed)",
        report.approved.len(),
        owners.len(),
        operator_address,
        report.failures.len()
    );
    Ok(report)
}

/// Handles followed by `wallet_address` that have sent transactions to the
/// contract, in following order and without duplicates
pub async fn tx_send_following<B: InsightBackend + ?Sized>(
    backend: &B,
    chain_id: u64,
    wallet_address: &str,
    contract_address: &str,
) -> InsightResult<Vec<String>> {
    let (owners, senders) = tokio::try_join!(
        backend.following(wallet_address),
        backend.contract_senders(chain_id, contract_address),
    )?;

    let mut handles: Vec<String> = Vec::new();
    for owner in owners {
        if senders
            .iter()
            .any(|sender| sender.eq_ignore_ascii_case(&owner.wallet_address))
            && !handles.contains(&owner.handle)
        {
            handles.push(owner.handle);
        }
    }

    info!(
        "{} followed profiles of {} have called {}",
        handles.len(),
        wallet_address,
        contract_address
    );
    Ok(handles)
}
