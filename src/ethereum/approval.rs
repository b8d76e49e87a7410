use alloy::{
    primitives::{Address, Bytes},
    providers::{Provider, RootProvider},
    rpc::types::TransactionRequest,
    sol,
    sol_types::SolCall,
    transports::http::{Client, Http},
};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{provider::ChainEndpointResolver, utils, ApprovalReport, SocialProfile};
use crate::error::{InsightError, InsightResult};

/// Upper bound on `eth_call`s in flight for one check
const MAX_CONCURRENT_CALLS: usize = 16;

sol! {
    function isApprovedForAll(address owner, address operator) external view returns (bool);
}

/// Reads ERC-721/1155 `isApprovedForAll` for a set of owners
#[derive(Debug, Clone)]
pub struct OnChainApprovalChecker {
    resolver: Arc<ChainEndpointResolver>,
    timeout: Duration,
}

impl OnChainApprovalChecker {
    pub fn new(resolver: Arc<ChainEndpointResolver>, timeout: Duration) -> Self {
        Self { resolver, timeout }
    }

    /// One `eth_call` per owner, at most `MAX_CONCURRENT_CALLS` at a time.
    /// Results keep the order of `owners`. A failed call is recorded against
    /// that owner and does not affect the others.
    pub async fn check_approved_for_all(
        &self,
        contract_address: &str,
        owners: &[SocialProfile],
        operator_address: &str,
        chain_id: u64,
    ) -> InsightResult<ApprovalReport> {
        let contract = utils::validate_address(contract_address)?;
        let operator = utils::validate_address(operator_address)?;
        let provider = self.resolver.provider(chain_id)?;

        debug!(
            "Checking {} owners for approval of {} on {}",
            owners.len(),
            operator,
            contract
        );

        let calls: Vec<_> = owners
            .iter()
            .map(|owner| self.is_approved(&provider, contract, owner, operator))
            .collect();
        let results: Vec<_> = stream::iter(calls)
            .buffered(MAX_CONCURRENT_CALLS)
            .collect()
            .await;

        let mut report = ApprovalReport::default();
        for (owner, result) in owners.iter().zip(results) {
            match result {
                Ok(true) => report.approved.push(owner.handle.clone()),
                Ok(false) => {}
                Err(e) => {
                    warn!("{}", e);
                    report.failures.push(e);
                }
            }
        }

        Ok(report)
    }

    async fn is_approved(
        &self,
        provider: &RootProvider<Http<Client>>,
        contract: Address,
        owner: &SocialProfile,
        operator: Address,
    ) -> InsightResult<bool> {
        let failed = |message: String| InsightError::RpcCallFailed {
            address: owner.wallet_address.clone(),
            message,
        };

        let owner_address =
            utils::validate_address(&owner.wallet_address).map_err(|e| failed(e.to_string()))?;

        let call = isApprovedForAllCall {
            owner: owner_address,
            operator,
        };
        let request = TransactionRequest::default()
            .to(contract)
            .input(Bytes::from(call.abi_encode()).into());

        let output = tokio::time::timeout(self.timeout, provider.call(&request))
            .await
            .map_err(|_| failed(utils::interpret_rpc_error("request timed out")))?
            .map_err(|e| failed(utils::interpret_rpc_error(&e.to_string())))?;

        let decoded = isApprovedForAllCall::abi_decode_returns(&output, true)
            .map_err(|e| failed(format!("Failed to decode isApprovedForAll result: {}", e)))?;

        Ok(decoded._0)
    }
}
