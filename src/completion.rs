use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::CompletionConfig;
use crate::error::{InsightError, InsightResult};
use crate::ethereum::DecodedCall;

pub const UNVERIFIED_WARNING: &str = "【WARNING】 The safety of the function you are trying to execute cannot be confirmed because it has not verified.";

/// What the completion endpoint says about a call, or why nothing was asked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Explanation {
    Summary(String),
    Unverified,
}

impl Explanation {
    pub fn text(&self) -> &str {
        match self {
            Explanation::Summary(text) => text,
            Explanation::Unverified => UNVERIFIED_WARNING,
        }
    }
}

/// Deterministic prompt describing the call being made
pub fn build_prompt(
    contract_address: &str,
    contract_name: &str,
    call: &DecodedCall,
    source_snippet: &str,
) -> String {
    let function_abi = call
        .function_abi
        .as_ref()
        .and_then(|function| serde_json::to_string(function).ok())
        .unwrap_or_else(|| "{}".to_string());

    format!(
        "・ContractAddress: {}\n・ContractName: {}\n・FunctionName: {}\n・FunctionArgs: {}\n・FunctionABI: {}\n・FunctionSourceCode: {}\nPlease tell me what the above smart contract executes.",
        contract_address,
        contract_name,
        call.function_name,
        call.formatted_arguments().join(","),
        function_abi,
        source_snippet
    )
}

/// Chat-completion client for OpenAI-compatible endpoints
#[derive(Debug, Clone)]
pub struct InsightSummarizer {
    client: Client,
    config: CompletionConfig,
}

impl InsightSummarizer {
    pub fn new(client: Client, config: CompletionConfig) -> Self {
        Self { client, config }
    }

    pub async fn summarize(
        &self,
        contract_address: &str,
        contract_name: &str,
        call: &DecodedCall,
        source_snippet: &str,
    ) -> InsightResult<String> {
        let prompt = build_prompt(contract_address, contract_name, call, source_snippet);
        let url = format!(
            "{}/v1/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        );
        debug!("Requesting completion for {} from {}", call.function_name, url);

        let mut request = self.client.post(&url).json(&json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
        }));
        if let Ok(api_key) = std::env::var(&self.config.api_key_env) {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| InsightError::SummarizationFailed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(InsightError::SummarizationFailed(format!(
                "completion endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| InsightError::SummarizationFailed(format!("invalid response: {}", e)))?;

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                InsightError::SummarizationFailed("response has no completion content".to_string())
            })?;

        info!("Received completion for {}", call.function_name);
        Ok(content.trim().to_string())
    }
}
