//! paindex-rpc — the upstream JSON-RPC side of the indexer.
//!
//! - [`RpcTransport`] — async trait every transport implements
//! - [`JsonRpcRequest`] / [`JsonRpcResponse`] — wire types
//! - [`TransportError`] — structured error type
//! - [`rate_limiter`] — token buckets shared per provider key
//! - [`retry`] — exponential backoff
//! - [`HttpTransport`] — `reqwest` transport applying both policies
//!
//! ```text
//! Request → [RateLimiter(key)] → [RetryPolicy] → [HTTP]
//! ```

pub mod error;
pub mod http;
pub mod rate_limiter;
pub mod request;
pub mod retry;
pub mod transport;

pub use error::TransportError;
pub use http::{HttpConfig, HttpTransport};
pub use rate_limiter::{acquire_blocking, Acquire, KeyedRateLimiter, RateLimiter, TokenBucket};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use retry::{RetryConfig, RetryPolicy};
pub use transport::{call, RpcTransport};
