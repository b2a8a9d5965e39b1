//! Sessmesh Transport Layer
//!
//! Length-prefixed JSON over TCP, identical in both directions:
//!
//! ```text
//! [4-byte length as u32 big-endian] [JSON data]
//! ```
//!
//! # Components
//!
//! - **[`JsonCodec`]**: encode/decode protocol envelopes to JSON
//! - **[`TcpTransport`]**: async client-side transport with explicit
//!   connect and request deadlines
//! - **[`TcpServer`]**: async accept loop driving a request handler
//!
//! All implementations enforce a 100 MB maximum message size.

pub mod codec;
pub mod tcp;
pub mod tcp_server;

pub use codec::JsonCodec;
pub use tcp::TcpTransport;
pub use tcp_server::TcpServer;

/// Maximum accepted message size on the wire.
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;
