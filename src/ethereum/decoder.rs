use alloy::{
    dyn_abi::{DynSolValue, JsonAbiExt},
    json_abi::JsonAbi,
};
use tracing::debug;

use super::DecodedCall;
use crate::error::{InsightError, InsightResult};

const FUNCTION_KEYWORD: &str = "function";

pub struct CallDataDecoder;

impl CallDataDecoder {
    /// Decode transaction input against a contract ABI.
    ///
    /// The leading 4 bytes select the function; the rest is ABI-decoded
    /// according to that function's inputs.
    pub fn decode(input: &[u8], abi: &JsonAbi) -> InsightResult<DecodedCall> {
        if input.len() < 4 {
            return Err(InsightError::UnknownSelector(format!(
                "0x{}",
                hex::encode(input)
            )));
        }
        let selector = &input[..4];

        let function = abi
            .functions()
            .find(|f| f.selector().as_slice() == selector)
            .ok_or_else(|| InsightError::UnknownSelector(format!("0x{}", hex::encode(selector))))?;

        let arguments = function.abi_decode_input(&input[4..], false).map_err(|e| {
            InsightError::Decode(format!("arguments of '{}': {}", function.signature(), e))
        })?;

        Ok(DecodedCall {
            function_name: function.name.clone(),
            arguments,
            function_abi: Some(function.clone()),
        })
    }

    /// Best-effort text search for a function's source.
    ///
    /// Splits the flattened source on the `function` keyword and keeps every
    /// fragment with a line where `function_name` is later followed by `{`.
    /// Overloads come back concatenated; a name that only appears in comments
    /// followed by a brace is a false positive.
    pub fn extract_source_snippet(source: &str, function_name: &str) -> String {
        if function_name.is_empty() {
            return String::new();
        }

        let mut snippet = String::new();
        for (index, fragment) in source.split(FUNCTION_KEYWORD).enumerate() {
            if !opens_block_after(fragment, function_name) {
                continue;
            }
            if index > 0 {
                snippet.push_str(FUNCTION_KEYWORD);
            }
            snippet.push_str(fragment);
        }

        if snippet.is_empty() {
            debug!("Function '{}' not found in contract source", function_name);
        }
        snippet
    }
}

fn opens_block_after(fragment: &str, name: &str) -> bool {
    fragment.lines().any(|line| {
        line.find(name)
            .is_some_and(|pos| line[pos + name.len()..].contains('{'))
    })
}

/// Renders a decoded value for display and prompts
pub fn format_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Address(addr) => addr.to_checksum(None),
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Uint(num, _) => num.to_string(),
        DynSolValue::Int(num, _) => num.to_string(),
        DynSolValue::String(s) => s.clone(),
        DynSolValue::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
        DynSolValue::FixedBytes(word, size) => format!("0x{}", hex::encode(&word[..*size])),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            let inner: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", inner.join(", "))
        }
        DynSolValue::Tuple(items) => {
            let inner: Vec<String> = items.iter().map(format_value).collect();
            format!("({})", inner.join(", "))
        }
        other => format!("{:?}", other),
    }
}
