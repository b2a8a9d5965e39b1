//! Sessmesh Protocol Definitions
//!
//! This module defines the core protocol types exchanged between the
//! session router and the backends: a generic request/response envelope,
//! the typed payloads of the three backend methods, and the error
//! taxonomy surfaced by the core.
//!
//! # Protocol Types
//!
//! - **[`Request`]**: an RPC envelope with method name, JSON arguments
//!   and an optional deadline
//! - **[`Response`]**: the matching envelope carrying a result or error
//! - **[`SessmeshError`]**: the error enum; terminal classifications
//!   (`NoBackends`, `AllExhausted`) are what callers of the router see
//!
//! # Methods
//!
//! The backend surface has exactly three methods, described by the typed
//! structs in [`wire`]:
//!
//! | method | params | reply |
//! |---|---|---|
//! | `post_message` | [`wire::PostMessageParams`] | [`wire::PostMessageReply`] |
//! | `get_stats` | none | [`wire::StatsReply`] |
//! | `health_check` | none | [`wire::HealthReply`] |

pub mod error;
pub mod requests;
pub mod responses;
pub mod wire;

#[cfg(test)]
mod tests;

pub use error::{Result, SessmeshError};
pub use requests::{MethodName, Request, RequestId, RpcArgs};
pub use responses::{Response, RpcResult};
