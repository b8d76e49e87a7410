//! Wallet plugin entry points: the transaction-insight hook and the small
//! RPC surface the companion site uses to hand over the identity token.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{InsightError, InsightResult};
use crate::insight::{InsightAggregator, InsightPanel, TransactionEvent};
use crate::store::{load_identity, save_identity, IdentityRecord, StateStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapRpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

pub async fn on_transaction(
    aggregator: &InsightAggregator,
    store: &dyn StateStore,
    chain_id: Option<&str>,
    transaction: &TransactionEvent,
) -> InsightResult<InsightPanel> {
    aggregator.run(store, chain_id, transaction).await
}

/// `setData` replaces the identity record, `getData` returns it (or null)
pub async fn on_rpc_request(store: &dyn StateStore, request: SnapRpcRequest) -> InsightResult<Value> {
    debug!("Plugin RPC request: {}", request.method);

    match request.method.as_str() {
        "setData" => {
            let world_id = request
                .params
                .get("worldId")
                .and_then(Value::as_str)
                .filter(|token| !token.is_empty())
                .ok_or_else(|| InsightError::InvalidInput("setData requires params.worldId".to_string()))?;

            save_identity(
                store,
                &IdentityRecord {
                    world_id: world_id.to_string(),
                },
            )
            .await?;
            info!("Identity token updated");
            Ok(Value::Null)
        }
        "getData" => match load_identity(store).await? {
            Some(record) => {
                serde_json::to_value(record).map_err(|e| InsightError::Store(e.to_string()))
            }
            None => Ok(Value::Null),
        },
        other => Err(InsightError::MethodNotFound(other.to_string())),
    }
}
