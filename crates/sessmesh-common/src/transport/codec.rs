use crate::protocol::error::Result;
use crate::protocol::{Request, Response};

/// JSON codec for protocol envelopes.
///
/// # Example
///
/// ```
/// use sessmesh_common::transport::JsonCodec;
/// use sessmesh_common::protocol::Request;
/// use serde_json::json;
///
/// let request = Request::new("health_check", json!({}));
/// let encoded = JsonCodec::encode_request(&request).unwrap();
/// let decoded = JsonCodec::decode_request(&encoded).unwrap();
/// assert_eq!(request, decoded);
/// ```
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(request)?)
    }

    pub fn decode_request(data: &[u8]) -> Result<Request> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(response)?)
    }

    pub fn decode_response(data: &[u8]) -> Result<Response> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_round_trip() {
        let request = Request::new("post_message", json!({"session_id": "s", "payload": "m"}));

        let encoded = JsonCodec::encode_request(&request).unwrap();
        let decoded = JsonCodec::decode_request(&encoded).unwrap();

        assert_eq!(request, decoded);
    }

    #[test]
    fn test_response_round_trip() {
        let response = Response::success(9, json!({"healthy": true}));

        let encoded = JsonCodec::encode_response(&response).unwrap();
        let decoded = JsonCodec::decode_response(&encoded).unwrap();

        assert_eq!(response, decoded);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(JsonCodec::decode_request(b"not json").is_err());
        assert!(JsonCodec::decode_response(b"{").is_err());
    }
}
