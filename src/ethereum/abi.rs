use alloy::json_abi::JsonAbi;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::{provider::ChainEndpointResolver, utils, ContractLookup, ContractMetadata};
use crate::error::{InsightError, InsightResult};

/// Fetches verified source, ABI and name from Etherscan-compatible explorers
#[derive(Debug, Clone)]
pub struct ContractMetadataFetcher {
    client: Client,
    resolver: Arc<ChainEndpointResolver>,
}

impl ContractMetadataFetcher {
    pub fn new(client: Client, resolver: Arc<ChainEndpointResolver>) -> Self {
        Self { client, resolver }
    }

    pub async fn fetch(&self, chain_id: u64, address: &str) -> InsightResult<ContractLookup> {
        let address = utils::validate_address(address)?.to_string();
        let body = self
            .explorer_get(chain_id, &address, "contract", &[("action", "getsourcecode")])
            .await?;
        parse_source_response(&body, &address)
    }

    /// Distinct senders (lowercased) of the contract's transactions, oldest first
    pub async fn transaction_senders(
        &self,
        chain_id: u64,
        address: &str,
    ) -> InsightResult<Vec<String>> {
        let address = utils::validate_address(address)?.to_string();
        let body = self
            .explorer_get(
                chain_id,
                &address,
                "account",
                &[
                    ("action", "txlist"),
                    ("startblock", "0"),
                    ("endblock", "99999999"),
                    ("sort", "asc"),
                ],
            )
            .await?;
        parse_txlist_response(&body, &address)
    }

    async fn explorer_get(
        &self,
        chain_id: u64,
        address: &str,
        module: &str,
        params: &[(&str, &str)],
    ) -> InsightResult<Value> {
        let endpoint = self.resolver.resolve(chain_id)?;

        info!(
            "Querying {} explorer ({}) for {}",
            endpoint.name,
            params.first().map(|(_, action)| *action).unwrap_or_default(),
            address
        );

        let mut query: Vec<(&str, String)> = vec![("module", module.to_string())];
        query.extend(params.iter().map(|(key, value)| (*key, value.to_string())));
        query.push(("address", address.to_string()));
        if let Some(api_key) = endpoint.explorer_api_key() {
            query.push(("apikey", api_key));
        }

        let response = self
            .client
            .get(&endpoint.explorer_api_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                InsightError::FetchFailed(utils::interpret_explorer_error(&e.to_string(), address))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(InsightError::FetchFailed(utils::interpret_explorer_error(
                &format!("HTTP {}", status.as_u16()),
                address,
            )));
        }

        response.json().await.map_err(|e| {
            InsightError::FetchFailed(format!("Failed to parse explorer response: {}", e))
        })
    }
}

/// Interprets a `txlist` response body. "No transactions found" is an empty
/// history, not an error.
fn parse_txlist_response(body: &Value, address: &str) -> InsightResult<Vec<String>> {
    let transactions = match &body["result"] {
        Value::Array(transactions) => transactions,
        Value::String(message) if body["status"] == "0" => {
            if body["message"] == "No transactions found" {
                return Ok(Vec::new());
            }
            return Err(InsightError::FetchFailed(utils::interpret_explorer_error(
                message, address,
            )));
        }
        other => {
            return Err(InsightError::FetchFailed(format!(
                "Unexpected txlist result for {}: {}",
                address, other
            )))
        }
    };

    let mut senders: Vec<String> = Vec::new();
    for sender in transactions
        .iter()
        .filter_map(|tx| tx["from"].as_str())
        .map(str::to_lowercase)
    {
        if !senders.contains(&sender) {
            senders.push(sender);
        }
    }

    debug!("{} has {} distinct senders", address, senders.len());
    Ok(senders)
}

/// Interprets a `getsourcecode` response body
fn parse_source_response(body: &Value, address: &str) -> InsightResult<ContractLookup> {
    let entry = match &body["result"] {
        Value::Array(entries) => match entries.first() {
            Some(entry) => entry,
            None => return Ok(ContractLookup::NotVerified),
        },
        Value::String(message) if body["status"] == "0" => {
            return Err(InsightError::FetchFailed(utils::interpret_explorer_error(
                message, address,
            )));
        }
        _ => return Ok(ContractLookup::NotVerified),
    };

    let field = |key: &str| entry[key].as_str().unwrap_or_default().trim().to_string();
    let name = field("ContractName");
    let source_text = field("SourceCode");
    let abi_text = field("ABI");

    if name.is_empty() || source_text.is_empty() || abi_text.is_empty() {
        debug!("Contract {} is not verified", address);
        return Ok(ContractLookup::NotVerified);
    }

    let abi: JsonAbi = match serde_json::from_str(&abi_text) {
        Ok(abi) => abi,
        Err(e) => {
            debug!("ABI for {} did not parse ({}), treating as unverified", address, e);
            return Ok(ContractLookup::NotVerified);
        }
    };

    Ok(ContractLookup::Verified(ContractMetadata {
        name,
        source_text,
        abi,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, ERC721_ABI};
    use axum::{extract::Query, routing::get, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    const CONTRACT: &str = "0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e";

    #[test]
    fn test_parse_verified_contract() {
        let body = json!({
            "status": "1",
            "message": "OK",
            "result": [{
                "ContractName": "Collection",
                "SourceCode": "contract Collection {}",
                "ABI": ERC721_ABI,
            }]
        });

        match parse_source_response(&body, CONTRACT).unwrap() {
            ContractLookup::Verified(metadata) => {
                assert_eq!(metadata.name, "Collection");
                assert!(metadata.abi.function("setApprovalForAll").is_some());
            }
            ContractLookup::NotVerified => panic!("expected verified contract"),
        }
    }

    #[test]
    fn test_parse_unverified_contract() {
        let body = json!({
            "status": "1",
            "message": "OK",
            "result": [{
                "ContractName": "",
                "SourceCode": "",
                "ABI": "Contract source code not verified",
            }]
        });
        assert!(matches!(
            parse_source_response(&body, CONTRACT).unwrap(),
            ContractLookup::NotVerified
        ));

        let empty = json!({ "status": "1", "result": [] });
        assert!(matches!(
            parse_source_response(&empty, CONTRACT).unwrap(),
            ContractLookup::NotVerified
        ));
    }

    #[test]
    fn test_parse_explorer_error_is_fetch_failure() {
        let body = json!({ "status": "0", "message": "NOTOK", "result": "Invalid API Key" });
        assert!(matches!(
            parse_source_response(&body, CONTRACT),
            Err(InsightError::FetchFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_queries_getsourcecode() {
        let router = Router::new().route(
            "/api",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("action").map(String::as_str), Some("getsourcecode"));
                Json(json!({
                    "status": "1",
                    "result": [{
                        "ContractName": "Collection",
                        "SourceCode": "contract Collection {}",
                        "ABI": ERC721_ABI,
                    }]
                }))
            }),
        );
        let base = test_support::serve(router).await;
        let config = test_support::config_with_chain(1, &base, &format!("{}/api", base));
        let fetcher = ContractMetadataFetcher::new(
            Client::new(),
            Arc::new(ChainEndpointResolver::new(&config)),
        );

        let lookup = fetcher.fetch(1, CONTRACT).await.unwrap();
        assert!(matches!(lookup, ContractLookup::Verified(_)));
    }

    #[tokio::test]
    async fn test_fetch_non_success_status_is_fetch_failure() {
        let router = Router::new().route(
            "/api",
            get(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let base = test_support::serve(router).await;
        let config = test_support::config_with_chain(1, &base, &format!("{}/api", base));
        let fetcher = ContractMetadataFetcher::new(
            Client::new(),
            Arc::new(ChainEndpointResolver::new(&config)),
        );

        assert!(matches!(
            fetcher.fetch(1, CONTRACT).await,
            Err(InsightError::FetchFailed(_))
        ));
        assert_eq!(
            fetcher.fetch(99, CONTRACT).await.unwrap_err(),
            InsightError::UnsupportedChain(99)
        );
    }

    #[test]
    fn test_parse_txlist_dedupes_senders() {
        let body = json!({
            "status": "1",
            "message": "OK",
            "result": [
                { "from": "0x00000000000000000000000000000000000000A1", "to": CONTRACT },
                { "from": "0x00000000000000000000000000000000000000b2", "to": CONTRACT },
                { "from": "0x00000000000000000000000000000000000000a1", "to": CONTRACT },
            ]
        });
        assert_eq!(
            parse_txlist_response(&body, CONTRACT).unwrap(),
            vec![
                "0x00000000000000000000000000000000000000a1".to_string(),
                "0x00000000000000000000000000000000000000b2".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_txlist_without_transactions() {
        let body = json!({ "status": "0", "message": "No transactions found", "result": [] });
        assert!(parse_txlist_response(&body, CONTRACT).unwrap().is_empty());

        let body = json!({ "status": "0", "message": "No transactions found", "result": "" });
        assert!(parse_txlist_response(&body, CONTRACT).unwrap().is_empty());

        let body = json!({ "status": "0", "message": "NOTOK", "result": "Max rate limit reached" });
        assert!(matches!(
            parse_txlist_response(&body, CONTRACT),
            Err(InsightError::FetchFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_transaction_senders_queries_txlist() {
        let router = Router::new().route(
            "/api",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("module").map(String::as_str), Some("account"));
                assert_eq!(params.get("action").map(String::as_str), Some("txlist"));
                assert_eq!(params.get("sort").map(String::as_str), Some("asc"));
                Json(json!({
                    "status": "1",
                    "message": "OK",
                    "result": [{ "from": "0x00000000000000000000000000000000000000C3" }]
                }))
            }),
        );
        let base = test_support::serve(router).await;
        let config = test_support::config_with_chain(1, &base, &format!("{}/api", base));
        let fetcher = ContractMetadataFetcher::new(
            Client::new(),
            Arc::new(ChainEndpointResolver::new(&config)),
        );

        assert_eq!(
            fetcher.transaction_senders(1, CONTRACT).await.unwrap(),
            vec!["0x00000000000000000000000000000000000000c3".to_string()]
        );
        assert_eq!(
            fetcher.transaction_senders(5, CONTRACT).await.unwrap_err(),
            InsightError::UnsupportedChain(5)
        );
    }
}
