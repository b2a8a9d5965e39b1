//! Per-backend connection record.
//!
//! Lifecycle: `Unopened → Healthy ↔ Unhealthy → Closed`. An open
//! success makes a connection healthy; a transport error or a manual
//! mark-down makes it unhealthy; deregistration closes it. An unhealthy
//! connection whose transport has been dropped is re-opened by the next
//! send that reaches it, and a successful open returns it to healthy
//! without any explicit recovery step. An unhealthy connection that
//! still holds a live transport (a manual mark-down) is skipped until
//! marked up again.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};

/// Observable lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, no open attempted yet
    Unopened,
    /// Last open or request succeeded
    Healthy,
    /// Open failed, transport errored, or manually marked down
    Unhealthy,
    /// Deregistered; never used again
    Closed,
}

const STATE_UNOPENED: u8 = 0;
const STATE_HEALTHY: u8 = 1;
const STATE_UNHEALTHY: u8 = 2;
const STATE_CLOSED: u8 = 3;

/// A connection slot for one backend address.
///
/// The transport is shared by every concurrent send targeting the
/// address; the stream mutex serialises the request/response exchanges.
/// The health flag is read without taking the mutex.
pub struct Connection {
    address: String,
    state: AtomicU8,
    transport: Mutex<Option<TcpStream>>,
}

impl Connection {
    pub fn new(address: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            address: address.into(),
            state: AtomicU8::new(STATE_UNOPENED),
            transport: Mutex::new(None),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::SeqCst) {
            STATE_UNOPENED => ConnectionState::Unopened,
            STATE_HEALTHY => ConnectionState::Healthy,
            STATE_UNHEALTHY => ConnectionState::Unhealthy,
            _ => ConnectionState::Closed,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_HEALTHY
    }

    pub fn is_closed(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_CLOSED
    }

    /// Flips to healthy (open success or manual mark-up). No effect on
    /// a closed connection.
    pub fn mark_healthy(&self) {
        let _ = self.state.compare_exchange(
            STATE_UNOPENED,
            STATE_HEALTHY,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        let _ = self.state.compare_exchange(
            STATE_UNHEALTHY,
            STATE_HEALTHY,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Flips to unhealthy (open failure, transport error, or manual
    /// mark-down). No effect on a closed connection.
    pub fn mark_unhealthy(&self) {
        let _ = self.state.compare_exchange(
            STATE_UNOPENED,
            STATE_UNHEALTHY,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        let _ = self.state.compare_exchange(
            STATE_HEALTHY,
            STATE_UNHEALTHY,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Terminal transition on deregistration; drops the transport.
    pub async fn close(&self) {
        self.state.store(STATE_CLOSED, Ordering::SeqCst);
        *self.transport.lock().await = None;
    }

    /// Locks the transport slot for the duration of one exchange. The
    /// slot holds `None` when no live transport exists; the send loop
    /// fills it after a successful open and empties it after a transport
    /// error.
    pub async fn lock_transport(&self) -> MutexGuard<'_, Option<TcpStream>> {
        self.transport.lock().await
    }

    /// Whether a live transport is currently attached. Advisory only:
    /// the answer may be stale by the time it is used.
    pub async fn has_transport(&self) -> bool {
        self.transport.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_connection_is_unopened() {
        let conn = Connection::new("127.0.0.1:9000");
        assert_eq!(conn.state(), ConnectionState::Unopened);
        assert!(!conn.is_healthy());
    }

    #[test]
    fn test_lifecycle_transitions() {
        let conn = Connection::new("127.0.0.1:9000");

        conn.mark_healthy();
        assert_eq!(conn.state(), ConnectionState::Healthy);

        conn.mark_unhealthy();
        assert_eq!(conn.state(), ConnectionState::Unhealthy);

        conn.mark_healthy();
        assert_eq!(conn.state(), ConnectionState::Healthy);
    }

    #[test]
    fn test_open_failure_from_unopened() {
        let conn = Connection::new("127.0.0.1:9000");
        conn.mark_unhealthy();
        assert_eq!(conn.state(), ConnectionState::Unhealthy);
    }

    #[tokio::test]
    async fn test_close_is_terminal() {
        let conn = Connection::new("127.0.0.1:9000");
        conn.mark_healthy();
        conn.close().await;

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.has_transport().await);

        // Marks after close do not resurrect it.
        conn.mark_healthy();
        assert_eq!(conn.state(), ConnectionState::Closed);
        conn.mark_unhealthy();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_transport_slot() {
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let conn = Connection::new(addr.clone());
        assert!(!conn.has_transport().await);

        let stream = TcpStream::connect(&addr).await.unwrap();
        *conn.lock_transport().await = Some(stream);
        conn.mark_healthy();

        assert!(conn.has_transport().await);
        assert!(conn.is_healthy());
    }
}
