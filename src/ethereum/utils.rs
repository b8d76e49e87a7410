use alloy::primitives::{Address, Bytes};
use std::str::FromStr;

use crate::error::{InsightError, InsightResult};

/// Validates and normalizes an Ethereum address
pub fn validate_address(address: &str) -> InsightResult<Address> {
    let address = address.trim();

    if address.is_empty() {
        return Err(InsightError::InvalidInput(
            "Address cannot be empty".to_string(),
        ));
    }

    if !address.starts_with("0x") && !address.starts_with("0X") {
        return Err(InsightError::InvalidInput(format!(
            "Invalid address format: '{}'. Ethereum addresses must start with '0x'",
            address
        )));
    }

    if address.len() != 42 {
        return Err(InsightError::InvalidInput(format!(
            "Invalid address length: '{}'. Ethereum addresses must be exactly 42 characters (0x + 40 hex characters)",
            address
        )));
    }

    if !address[2..].chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(InsightError::InvalidInput(format!(
            "Invalid address format: '{}'. Contains non-hexadecimal characters",
            address
        )));
    }

    Address::from_str(address).map_err(|e| {
        InsightError::InvalidInput(format!("Invalid Ethereum address: '{}'. Error: {}", address, e))
    })
}

/// Parses transaction input data given as hex, with or without `0x`
pub fn parse_input_data(input: &str) -> InsightResult<Bytes> {
    let input = input.trim();
    let hex_part = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);

    hex::decode(hex_part)
        .map(Bytes::from)
        .map_err(|e| InsightError::InvalidInput(format!("Invalid input data '{}': {}", input, e)))
}

/// Parses a chain id as sent by wallets: `eip155:<n>`, decimal or `0x` hex
pub fn parse_chain_id(chain_id: &str) -> InsightResult<u64> {
    let raw = chain_id.trim();
    let raw = raw.rsplit(':').next().unwrap_or(raw);

    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex_part) => u64::from_str_radix(hex_part, 16),
        None => raw.parse::<u64>(),
    };

    parsed.map_err(|_| InsightError::InvalidInput(format!("Invalid chain id: '{}'", chain_id)))
}

/// Creates user-friendly error messages for common RPC errors
pub fn interpret_rpc_error(error: &str) -> String {
    if error.contains("execution reverted") {
        "Call reverted: the contract does not implement isApprovedForAll or rejected the arguments."
            .to_string()
    } else if error.contains("connection refused") || error.contains("network unreachable") {
        "Network error: Cannot connect to RPC endpoint. Check your internet connection and RPC URL configuration.".to_string()
    } else if error.contains("timeout") || error.contains("timed out") {
        "Network error: Request timed out. The RPC endpoint may be overloaded or unreachable."
            .to_string()
    } else if error.contains("rate limit") || error.contains("429") {
        "Rate limit error: Too many requests to the RPC endpoint. Try again in a few moments or use a different endpoint.".to_string()
    } else if error.contains("method not found") {
        "RPC error: The requested method is not supported by this RPC endpoint. Try using a different endpoint.".to_string()
    } else {
        format!("RPC error: {}", error)
    }
}

/// Creates user-friendly error messages for explorer API errors
pub fn interpret_explorer_error(error: &str, contract_address: &str) -> String {
    if error.contains("rate limit") || error.contains("429") {
        "API rate limit: Too many requests to the block explorer API. Try again in a few moments or configure an explorer API key.".to_string()
    } else if error.contains("invalid API key") || error.contains("Invalid API Key") || error.contains("403") {
        "API authentication error: Invalid explorer API key. Check the explorer API key environment variable.".to_string()
    } else if error.contains("timeout") || error.contains("timed out") {
        "Timeout error: Request to the block explorer API timed out. Try again in a few moments."
            .to_string()
    } else {
        format!("Explorer lookup for {} failed: {}", contract_address, error)
    }
}
