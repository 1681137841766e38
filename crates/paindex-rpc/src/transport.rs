//! The `RpcTransport` trait.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// A JSON-RPC endpoint.
///
/// Object-safe; stored as `Arc<dyn RpcTransport>` so tests can script
/// responses without a network.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// Endpoint URL or a descriptive name.
    fn url(&self) -> &str;
}

/// Call `method` and deserialize the result.
pub async fn call<T: DeserializeOwned>(
    transport: &dyn RpcTransport,
    id: u64,
    method: &str,
    params: Vec<Value>,
) -> Result<T, TransportError> {
    let resp = transport
        .send(JsonRpcRequest::new(id, method, params))
        .await?;
    let result = resp.into_result().map_err(TransportError::Rpc)?;
    Ok(serde_json::from_value(result)?)
}
