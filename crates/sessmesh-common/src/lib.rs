//! Sessmesh Common Types and Transport
//!
//! This crate provides the protocol definitions and TCP transport layer
//! shared by the sessmesh router and backend.
//!
//! # Overview
//!
//! Sessmesh is a distributed stateful-session layer: clients address
//! logical sessions by opaque string id, a consistent-hash router picks
//! the owning backend, and each backend keeps session history in a
//! two-tier LRU cache. This crate contains the pieces both sides agree
//! on:
//!
//! - **Protocol Layer**: request/response envelopes, the typed payloads
//!   of the three backend RPC methods, and the error taxonomy
//! - **Transport Layer**: length-prefixed JSON over TCP
//!
//! # Example
//!
//! ```
//! use sessmesh_common::protocol::{Request, Response};
//! use sessmesh_common::protocol::wire::{PostMessageParams, METHOD_POST_MESSAGE};
//! use serde_json::json;
//!
//! let params = PostMessageParams {
//!     session_id: "session-42".into(),
//!     payload: "hello".into(),
//!     sender_id: "user-1".into(),
//!     timestamp: 1_700_000_000,
//! };
//! let request = Request::new(METHOD_POST_MESSAGE, serde_json::to_value(&params).unwrap());
//! let response = Response::success(request.id, json!({"success": true}));
//! assert!(response.success);
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
