//! RPC request envelope and unique id generation.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Unique identifier for an RPC request.
///
/// Combines a second-resolution timestamp with an atomic counter so ids
/// stay unique across restarts and within the same process.
pub type RequestId = u64;

/// Name of the RPC method to call (`post_message`, `get_stats`, `health_check`).
pub type MethodName = String;

/// Method arguments as a JSON value.
pub type RpcArgs = serde_json::Value;

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// An RPC request sent from the router to a backend.
///
/// The envelope is method-agnostic; the typed payload structs in
/// [`crate::protocol::wire`] define what goes into `args` for each
/// method.
///
/// # Example
///
/// ```
/// use sessmesh_common::protocol::Request;
/// use serde_json::json;
///
/// let request = Request::new("health_check", json!({})).with_timeout(2000);
/// assert_eq!(request.method, "health_check");
/// assert_eq!(request.timeout_ms, Some(2000));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    /// Unique request identifier
    pub id: RequestId,
    /// Method name to call
    pub method: MethodName,
    /// Method arguments
    pub args: RpcArgs,
    /// Optional deadline in milliseconds
    pub timeout_ms: Option<u64>,
}

impl Request {
    /// Creates a new RPC request with a freshly allocated id.
    pub fn new(method: impl Into<String>, args: RpcArgs) -> Self {
        Request {
            id: generate_request_id(),
            method: method.into(),
            args,
            timeout_ms: None,
        }
    }

    /// Sets the deadline for this request.
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Generates a unique request id.
///
/// Upper 32 bits: seconds since the UNIX epoch (valid until 2106).
/// Lower 32 bits: atomic counter.
fn generate_request_id() -> RequestId {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    // Relaxed is enough; we only need uniqueness, not ordering.
    let counter = REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed);

    (timestamp << 32) | (counter & 0xFFFF_FFFF)
}
