//! The session router: consistent-hash placement plus client-driven
//! failover.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use sessmesh_common::protocol::error::{Result, SessmeshError};
use sessmesh_common::protocol::wire::{
    HealthReply, PostMessageParams, PostMessageReply, StatsReply, METHOD_GET_STATS,
    METHOD_HEALTH_CHECK, METHOD_POST_MESSAGE,
};
use sessmesh_common::protocol::{Request, Response};
use sessmesh_common::transport::TcpTransport;

use crate::connection::Connection;
use crate::ring::{BackendInfo, HashRing};

/// Router configuration. Non-positive values fall back to the defaults.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Virtual nodes for backends registered without an explicit weight
    pub virtual_nodes: u32,
    /// How many distinct backends one send may try
    pub max_attempts: usize,
    /// Deadline for establishing a connection
    pub connect_timeout: Duration,
    /// Deadline for one request/response exchange
    pub request_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            virtual_nodes: 100,
            max_attempts: 3,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl RouterConfig {
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.virtual_nodes == 0 {
            self.virtual_nodes = defaults.virtual_nodes;
        }
        if self.max_attempts == 0 {
            self.max_attempts = defaults.max_attempts;
        }
        if self.connect_timeout.is_zero() {
            self.connect_timeout = defaults.connect_timeout;
        }
        if self.request_timeout.is_zero() {
            self.request_timeout = defaults.request_timeout;
        }
        self
    }
}

/// Snapshot of the router's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub primary_hits: u64,
    pub failovers: u64,
}

#[derive(Default)]
struct Counters {
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    primary_hits: AtomicU64,
    failovers: AtomicU64,
}

/// Routes session traffic to backends by consistent hashing, failing
/// over along the ring when an attempt does not succeed.
///
/// Counter updates use atomics and the connection map lock is never held
/// across network I/O; only the per-connection transport lock is, which
/// is what serialises concurrent sends to one backend.
pub struct SessionRouter {
    ring: HashRing,
    connections: RwLock<HashMap<String, Arc<Connection>>>,
    config: RouterConfig,
    counters: Counters,
}

impl SessionRouter {
    pub fn new(config: RouterConfig) -> Self {
        let config = config.sanitized();
        Self {
            ring: HashRing::new(config.virtual_nodes),
            connections: RwLock::new(HashMap::new()),
            config,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn ring(&self) -> &HashRing {
        &self.ring
    }

    pub fn backend_count(&self) -> usize {
        self.ring.node_count()
    }

    /// Adds a backend to the ring and eagerly opens a connection. If the
    /// open fails the backend stays in the ring with an unhealthy
    /// connection; the next send that reaches it retries the open.
    pub async fn register_backend(&self, id: &str, address: &str, weight: u32) {
        self.ring.add_node(id, weight, address);

        let conn = {
            let mut connections = self.connections.write().await;
            connections
                .entry(address.to_string())
                .or_insert_with(|| Connection::new(address))
                .clone()
        };

        match TcpTransport::connect(address, self.config.connect_timeout).await {
            Ok(stream) => {
                *conn.lock_transport().await = Some(stream);
                conn.mark_healthy();
                info!(backend = id, address, weight, "registered backend");
            }
            Err(e) => {
                conn.mark_unhealthy();
                warn!(
                    backend = id,
                    address,
                    error = %e,
                    "could not connect at registration, will retry on send"
                );
            }
        }
    }

    /// Removes a backend from the ring and closes its connection.
    pub async fn deregister_backend(&self, id: &str) -> Result<()> {
        let address = self
            .ring
            .address_of(id)
            .ok_or_else(|| SessmeshError::BackendUnknown(id.to_string()))?;

        self.ring.remove_node(id);

        let conn = self.connections.write().await.remove(&address);
        if let Some(conn) = conn {
            conn.close().await;
        }

        info!(backend = id, address, "deregistered backend");
        Ok(())
    }

    /// Marks a backend's connection unhealthy without touching the ring.
    /// Used to record externally observed failures or to simulate them.
    pub async fn mark_down(&self, id: &str) -> Result<()> {
        let conn = self.connection_for(id).await?;
        conn.mark_unhealthy();
        info!(backend = id, "marked down");
        Ok(())
    }

    /// Clears a backend's mark-down.
    pub async fn mark_up(&self, id: &str) -> Result<()> {
        let conn = self.connection_for(id).await?;
        conn.mark_healthy();
        info!(backend = id, "marked up");
        Ok(())
    }

    /// Pure routing query: the backend currently owning `session_id`.
    pub fn target_for(&self, session_id: &str) -> Option<BackendInfo> {
        self.ring.lookup(session_id)
    }

    /// Sends one message for `session_id`, trying the owner first and
    /// then each distinct ring successor, up to `max_attempts` backends.
    ///
    /// Per-attempt failures stay internal; the caller sees the reply of
    /// the first backend that accepts, or `NoBackends` /
    /// `AllExhausted` carrying the last underlying cause.
    pub async fn send(
        &self,
        session_id: &str,
        sender_id: &str,
        payload: &str,
    ) -> Result<PostMessageReply> {
        self.counters.total.fetch_add(1, Ordering::Relaxed);

        let targets = self.ring.successors(session_id, self.config.max_attempts);
        if targets.is_empty() {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            return Err(SessmeshError::NoBackends);
        }

        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let params = PostMessageParams {
            session_id: session_id.to_string(),
            payload: payload.to_string(),
            sender_id: sender_id.to_string(),
            timestamp,
        };
        let request = Request::new(METHOD_POST_MESSAGE, serde_json::to_value(&params)?)
            .with_timeout(self.config.request_timeout.as_millis() as u64);

        let mut last_cause: Option<SessmeshError> = None;

        for (attempt, target) in targets.iter().enumerate() {
            debug!(
                session = session_id,
                backend = %target.id,
                attempt = attempt + 1,
                of = targets.len(),
                "routing message"
            );

            let conn = self.connections.read().await.get(&target.address).cloned();
            let Some(conn) = conn else {
                last_cause = Some(SessmeshError::Unreachable {
                    address: target.address.clone(),
                    cause: "no connection registered".to_string(),
                });
                continue;
            };

            // A mark-down leaves the transport in place; skip those. An
            // unhealthy connection without a transport is the reopen
            // path and falls through to the call.
            if !conn.is_healthy() && (conn.is_closed() || conn.has_transport().await) {
                last_cause = Some(SessmeshError::Unreachable {
                    address: target.address.clone(),
                    cause: "marked down".to_string(),
                });
                continue;
            }

            match self.call_backend(&conn, &request).await {
                Ok(response) => {
                    if !response.success {
                        last_cause = Some(SessmeshError::ServerRejected {
                            server_id: target.id.clone(),
                            message: response.error.unwrap_or_default(),
                        });
                        continue;
                    }
                    let reply: PostMessageReply = match response
                        .result
                        .ok_or_else(|| {
                            SessmeshError::InvalidResponse("missing result".to_string())
                        })
                        .and_then(|v| serde_json::from_value(v).map_err(Into::into))
                    {
                        Ok(reply) => reply,
                        Err(e) => {
                            last_cause = Some(e);
                            continue;
                        }
                    };

                    if reply.success {
                        self.counters.success.fetch_add(1, Ordering::Relaxed);
                        if attempt == 0 {
                            self.counters.primary_hits.fetch_add(1, Ordering::Relaxed);
                        } else {
                            self.counters.failovers.fetch_add(1, Ordering::Relaxed);
                            info!(
                                session = session_id,
                                backend = %reply.server_id,
                                "failover succeeded"
                            );
                        }
                        return Ok(reply);
                    }

                    debug!(
                        session = session_id,
                        backend = %reply.server_id,
                        reason = %reply.error_message,
                        "backend rejected request"
                    );
                    last_cause = Some(SessmeshError::ServerRejected {
                        server_id: reply.server_id,
                        message: reply.error_message,
                    });
                }
                Err(e) => {
                    debug!(session = session_id, backend = %target.id, error = %e, "attempt failed");
                    last_cause = Some(e);
                }
            }
        }

        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        Err(SessmeshError::AllExhausted(
            last_cause
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".to_string()),
        ))
    }

    /// RPC liveness probe for one backend. Transport failures come back
    /// as `Ok(false)`; only an unknown id is an error.
    pub async fn health_check(&self, id: &str) -> Result<bool> {
        let conn = self.connection_for(id).await?;

        let request = Request::new(METHOD_HEALTH_CHECK, serde_json::Value::Object(Default::default()))
            .with_timeout(self.config.request_timeout.as_millis() as u64);

        match self.call_backend(&conn, &request).await {
            Ok(response) => {
                let healthy = response
                    .result
                    .and_then(|v| serde_json::from_value::<HealthReply>(v).ok())
                    .map(|reply| reply.healthy)
                    .unwrap_or(false);
                Ok(healthy)
            }
            Err(_) => Ok(false),
        }
    }

    /// Fetches cache statistics from one backend.
    pub async fn fetch_stats(&self, id: &str) -> Result<StatsReply> {
        let conn = self.connection_for(id).await?;

        let request = Request::new(METHOD_GET_STATS, serde_json::Value::Object(Default::default()))
            .with_timeout(self.config.request_timeout.as_millis() as u64);

        let response = self.call_backend(&conn, &request).await?;
        if !response.success {
            return Err(SessmeshError::ServerRejected {
                server_id: id.to_string(),
                message: response.error.unwrap_or_default(),
            });
        }
        response
            .result
            .ok_or_else(|| SessmeshError::InvalidResponse("missing result".to_string()))
            .and_then(|v| serde_json::from_value(v).map_err(Into::into))
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            total: self.counters.total.load(Ordering::Relaxed),
            success: self.counters.success.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            primary_hits: self.counters.primary_hits.load(Ordering::Relaxed),
            failovers: self.counters.failovers.load(Ordering::Relaxed),
        }
    }

    /// Closes every connection. The ring is left as-is.
    pub async fn close(&self) {
        let connections: Vec<_> = {
            let mut map = self.connections.write().await;
            map.drain().map(|(_, conn)| conn).collect()
        };
        for conn in connections {
            conn.close().await;
            debug!(address = conn.address(), "closed connection");
        }
    }

    async fn connection_for(&self, id: &str) -> Result<Arc<Connection>> {
        let address = self
            .ring
            .address_of(id)
            .ok_or_else(|| SessmeshError::BackendUnknown(id.to_string()))?;

        self.connections
            .read()
            .await
            .get(&address)
            .cloned()
            .ok_or(SessmeshError::Unreachable {
                address,
                cause: "no connection registered".to_string(),
            })
    }

    /// One request/response exchange with a backend, opening a transport
    /// first if none is attached. A transport error drops the stream and
    /// marks the connection unhealthy, so the next send re-opens.
    async fn call_backend(&self, conn: &Arc<Connection>, request: &Request) -> Result<Response> {
        let mut guard = conn.lock_transport().await;

        if guard.is_none() {
            match TcpTransport::connect(conn.address(), self.config.connect_timeout).await {
                Ok(stream) => {
                    *guard = Some(stream);
                    conn.mark_healthy();
                }
                Err(e) => {
                    conn.mark_unhealthy();
                    return Err(SessmeshError::Unreachable {
                        address: conn.address().to_string(),
                        cause: e.to_string(),
                    });
                }
            }
        }

        let Some(stream) = guard.as_mut() else {
            return Err(SessmeshError::Unreachable {
                address: conn.address().to_string(),
                cause: "no transport".to_string(),
            });
        };

        match TcpTransport::send_request(stream, request, self.config.request_timeout).await {
            Ok(response) => Ok(response),
            Err(e) => {
                *guard = None;
                conn.mark_unhealthy();
                Err(SessmeshError::Unreachable {
                    address: conn.address().to_string(),
                    cause: e.to_string(),
                })
            }
        }
    }
}
