//! Sessmesh Backend
//!
//! One backend node of the sessmesh session layer. A backend owns a
//! [`TieredCache`], a two-level LRU over chat sessions that models a
//! tiny hot tier in front of a larger warm tier, and exposes it over
//! the three-method RPC surface (`post_message`, `get_stats`,
//! `health_check`).
//!
//! # Residency model
//!
//! A session lives in exactly one of L1, L2, or nowhere. Every access
//! lands it at the front of L1; pressure pushes the least recently used
//! L1 entry down into L2, and the least recently used L2 entry out of
//! the cache entirely. A session evicted from L2 is gone; there is no
//! durability below the warm tier.
//!
//! # Main Components
//!
//! - [`TieredCache`]: the residency cache, internally synchronised
//! - [`Backend`]: request dispatch, shutdown flag, uptime

pub mod backend;
pub mod cache;

pub use backend::{Backend, BackendConfig};
pub use cache::{CacheSnapshot, CacheStats, Message, Session, TieredCache};
