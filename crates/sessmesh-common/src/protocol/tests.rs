use super::error::SessmeshError;
use super::wire::*;
use super::{Request, Response};
use serde_json::json;

#[test]
fn test_post_message_params_round_trip() {
    let params = PostMessageParams {
        session_id: "session-7".to_string(),
        payload: "hello there".to_string(),
        sender_id: "user-3".to_string(),
        timestamp: 1_700_000_000,
    };

    let request = Request::new(METHOD_POST_MESSAGE, serde_json::to_value(&params).unwrap());
    let decoded: PostMessageParams = serde_json::from_value(request.args.clone()).unwrap();

    assert_eq!(params, decoded);
}

#[test]
fn test_post_message_reply_round_trip() {
    let reply = PostMessageReply {
        success: true,
        server_id: "backend-a".to_string(),
        cache_tier: CacheTier::L2,
        message_count: 12,
        error_message: String::new(),
    };

    let response = Response::success(1, serde_json::to_value(&reply).unwrap());
    let decoded: PostMessageReply =
        serde_json::from_value(response.result.clone().unwrap()).unwrap();

    assert_eq!(reply, decoded);
}

#[test]
fn test_cache_tier_wire_names() {
    assert_eq!(serde_json::to_value(CacheTier::L1).unwrap(), json!("l1"));
    assert_eq!(serde_json::to_value(CacheTier::L2).unwrap(), json!("l2"));
    assert_eq!(serde_json::to_value(CacheTier::Miss).unwrap(), json!("miss"));
    assert_eq!(
        serde_json::to_value(CacheTier::Unknown).unwrap(),
        json!("unknown")
    );
}

#[test]
fn test_cache_tier_defaults_to_unknown() {
    assert_eq!(CacheTier::default(), CacheTier::Unknown);
}

#[test]
fn test_reply_missing_error_message_defaults_empty() {
    let value = json!({
        "success": true,
        "server_id": "backend-a",
        "cache_tier": "miss",
        "message_count": 1
    });
    let reply: PostMessageReply = serde_json::from_value(value).unwrap();
    assert_eq!(reply.error_message, "");
}

#[test]
fn test_stats_reply_round_trip() {
    let reply = StatsReply {
        server_id: "backend-b".to_string(),
        l1_size: 2,
        l1_capacity: 5,
        l2_size: 4,
        l2_capacity: 20,
        total_requests: 10,
        hits: 6,
        misses: 4,
        l1_hits: 5,
        l2_hits: 1,
        demotions: 2,
        evictions: 0,
        l1_ids: vec!["s1".into(), "s2".into()],
        l2_ids: vec!["s3".into()],
    };

    let encoded = serde_json::to_vec(&reply).unwrap();
    let decoded: StatsReply = serde_json::from_slice(&encoded).unwrap();
    assert_eq!(reply, decoded);
}

#[test]
fn test_error_response_envelope() {
    let response = Response::error(42, "unknown method: bogus");
    assert!(!response.success);
    assert!(response.result.is_none());
    assert_eq!(response.error.as_deref(), Some("unknown method: bogus"));
}

#[test]
fn test_per_attempt_classification() {
    assert!(SessmeshError::Unreachable {
        address: "127.0.0.1:1".into(),
        cause: "refused".into()
    }
    .is_per_attempt());
    assert!(SessmeshError::ServerRejected {
        server_id: "backend-a".into(),
        message: "shutting down".into()
    }
    .is_per_attempt());
    assert!(SessmeshError::Timeout(10).is_per_attempt());

    assert!(!SessmeshError::NoBackends.is_per_attempt());
    assert!(!SessmeshError::AllExhausted("x".into()).is_per_attempt());
    assert!(!SessmeshError::BackendUnknown("b".into()).is_per_attempt());
    assert!(!SessmeshError::CapacityInvalid.is_per_attempt());
}
