//! Sessmesh Router
//!
//! The client side of the sessmesh session layer. The router owns a
//! weighted consistent-hash ring over the registered backends, keeps one
//! connection per backend address with a health flag, and sends each
//! message to the session's primary owner, failing over along the ring
//! to the next distinct owner when an attempt does not succeed.
//!
//! # Why successors rather than retry-same
//!
//! Remapping a session to the next distinct ring owner when its primary
//! is unreachable preserves consistent-hashing semantics under transient
//! failure: load displaced from a dead backend spreads across its ring
//! successors instead of piling onto a single predefined replica.
//!
//! # Main Components
//!
//! - [`HashRing`]: weighted virtual-node ring, pure data structure
//! - [`Connection`]: per-backend transport with health lifecycle
//! - [`SessionRouter`]: registration, the failover send loop, counters

pub mod connection;
pub mod ring;
pub mod router;

pub use connection::{Connection, ConnectionState};
pub use ring::{BackendInfo, HashRing, VirtualNode, DEFAULT_VIRTUAL_NODES};
pub use router::{RouterConfig, RouterStats, SessionRouter};
