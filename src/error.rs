use thiserror::Error;

/// Failures of the insight components.
///
/// An unverified contract is not represented here; see
/// [`ContractLookup::NotVerified`](crate::ethereum::ContractLookup).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InsightError {
    #[error("Chain id {0} is not supported")]
    UnsupportedChain(u64),

    #[error("Contract metadata fetch failed: {0}")]
    FetchFailed(String),

    #[error("RPC call for {address} failed: {message}")]
    RpcCallFailed { address: String, message: String },

    #[error("Social graph unavailable: {0}")]
    SocialGraphUnavailable(String),

    #[error("Summarization failed: {0}")]
    SummarizationFailed(String),

    #[error("No ABI function matches selector {0}")]
    UnknownSelector(String),

    #[error("Failed to decode call data: {0}")]
    Decode(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing required transaction field: {0}")]
    MissingPrecondition(&'static str),

    #[error("Identity token rejected: {0}")]
    IdentityRejected(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("State store error: {0}")]
    Store(String),
}

pub type InsightResult<T> = std::result::Result<T, InsightError>;
