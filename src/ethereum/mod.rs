pub mod abi;
pub mod approval;
pub mod decoder;
pub mod provider;
pub mod utils;

use alloy::{
    dyn_abi::DynSolValue,
    json_abi::{Function, JsonAbi},
};
use serde::{Deserialize, Serialize};

/// Verified contract details as published on a block explorer.
#[derive(Debug, Clone)]
pub struct ContractMetadata {
    pub name: String,
    pub source_text: String,
    pub abi: JsonAbi,
}

/// Outcome of an explorer lookup. `NotVerified` is the common case for EOAs
/// and unpublished contracts.
#[derive(Debug, Clone)]
pub enum ContractLookup {
    Verified(ContractMetadata),
    NotVerified,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCall {
    pub function_name: String,
    pub arguments: Vec<DynSolValue>,
    pub function_abi: Option<Function>,
}

impl DecodedCall {
    /// First argument, when it is an address
    pub fn leading_address(&self) -> Option<alloy::primitives::Address> {
        match self.arguments.first() {
            Some(DynSolValue::Address(address)) => Some(*address),
            _ => None,
        }
    }

    pub fn formatted_arguments(&self) -> Vec<String> {
        self.arguments.iter().map(decoder::format_value).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialProfile {
    pub wallet_address: String,
    pub handle: String,
}

/// Handles whose owners approved the operator, plus per-owner RPC failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApprovalReport {
    pub approved: Vec<String>,
    pub failures: Vec<crate::error::InsightError>,
}
