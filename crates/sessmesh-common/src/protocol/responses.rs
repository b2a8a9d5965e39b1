use super::RequestId;
use serde::{Deserialize, Serialize};

pub type RpcResult = serde_json::Value;

/// An RPC response envelope.
///
/// Envelope-level failure (`success == false`) means the backend could
/// not process the request at all (unknown method, malformed arguments).
/// Application-level rejection travels inside the typed reply payload
/// instead, so the router can tell the two apart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub id: RequestId,
    pub result: Option<RpcResult>,
    pub error: Option<String>,
    pub success: bool,
}

impl Response {
    pub fn success(id: RequestId, result: RpcResult) -> Self {
        Response {
            id,
            result: Some(result),
            error: None,
            success: true,
        }
    }

    pub fn error(id: RequestId, error: impl Into<String>) -> Self {
        Response {
            id,
            result: None,
            error: Some(error.into()),
            success: false,
        }
    }
}
