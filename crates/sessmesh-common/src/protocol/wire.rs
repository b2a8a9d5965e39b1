//! Typed payloads for the backend RPC surface.
//!
//! These structs are the single source of truth for the wire shape of
//! the three backend methods. They serialize into the `args` / `result`
//! fields of the [`Request`](super::Request) / [`Response`](super::Response)
//! envelopes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Method name for appending a message to a session.
pub const METHOD_POST_MESSAGE: &str = "post_message";
/// Method name for fetching backend cache statistics.
pub const METHOD_GET_STATS: &str = "get_stats";
/// Method name for the liveness probe.
pub const METHOD_HEALTH_CHECK: &str = "health_check";

/// Which cache tier a session was resident in when a request arrived.
///
/// `Miss` means the session did not exist and was created by the
/// request. `Unknown` only appears when a reply predates the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    #[default]
    Unknown,
    L1,
    L2,
    Miss,
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTier::L1 => write!(f, "L1"),
            CacheTier::L2 => write!(f, "L2"),
            CacheTier::Miss => write!(f, "MISS"),
            CacheTier::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Arguments of `post_message`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostMessageParams {
    /// The logical session this message belongs to (the ring key)
    pub session_id: String,
    /// Message body
    pub payload: String,
    /// Originating user
    pub sender_id: String,
    /// Client-side send time, seconds since the UNIX epoch
    pub timestamp: i64,
}

/// Reply of `post_message`.
///
/// `cache_tier` reports where the session was resident *before* the
/// append (`Miss` for a freshly created session); `message_count` is the
/// count *after* the append.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostMessageReply {
    pub success: bool,
    pub server_id: String,
    pub cache_tier: CacheTier,
    pub message_count: i32,
    #[serde(default)]
    pub error_message: String,
}

/// Reply of `get_stats`.
///
/// `l1_ids` / `l2_ids` are ordered front-to-back, most recently used
/// first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsReply {
    pub server_id: String,
    pub l1_size: usize,
    pub l1_capacity: usize,
    pub l2_size: usize,
    pub l2_capacity: usize,
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub demotions: u64,
    pub evictions: u64,
    pub l1_ids: Vec<String>,
    pub l2_ids: Vec<String>,
}

/// Reply of `health_check`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReply {
    pub healthy: bool,
    pub server_id: String,
    pub uptime_seconds: i64,
}
