//! The backend RPC server: method dispatch over the tiered cache.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use sessmesh_common::protocol::error::Result;
use sessmesh_common::protocol::wire::{
    CacheTier, HealthReply, PostMessageParams, PostMessageReply, StatsReply, METHOD_GET_STATS,
    METHOD_HEALTH_CHECK, METHOD_POST_MESSAGE,
};
use sessmesh_common::protocol::{Request, Response};
use sessmesh_common::transport::TcpServer;

use crate::cache::{Message, TieredCache};

/// Configuration for one backend node.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Identifier reported in every reply
    pub server_id: String,
    /// Hot tier capacity; zero falls back to the default
    pub l1_capacity: usize,
    /// Warm tier capacity; zero is taken literally only when
    /// [`allow_zero_warm`](Self::allow_zero_warm) is set
    pub l2_capacity: usize,
    /// Treat `l2_capacity == 0` as "no warm tier" instead of "use the
    /// default"
    pub allow_zero_warm: bool,
}

impl BackendConfig {
    pub const DEFAULT_L1_CAPACITY: usize = 5;
    pub const DEFAULT_L2_CAPACITY: usize = 20;

    pub fn new(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            l1_capacity: Self::DEFAULT_L1_CAPACITY,
            l2_capacity: Self::DEFAULT_L2_CAPACITY,
            allow_zero_warm: false,
        }
    }

    pub fn with_capacities(mut self, l1: usize, l2: usize) -> Self {
        self.l1_capacity = l1;
        self.l2_capacity = l2;
        self
    }

    fn sanitized(mut self) -> Self {
        if self.l1_capacity == 0 {
            self.l1_capacity = Self::DEFAULT_L1_CAPACITY;
        }
        if self.l2_capacity == 0 && !self.allow_zero_warm {
            self.l2_capacity = Self::DEFAULT_L2_CAPACITY;
        }
        self
    }
}

/// One backend node: a tiered session cache behind the three-method RPC
/// surface.
///
/// The backend is `Arc`-shared into the server's per-connection tasks;
/// every method dispatch is synchronous in-memory work, so handlers
/// never await while holding cache state.
pub struct Backend {
    server_id: String,
    cache: TieredCache,
    started_at: Instant,
    shutting_down: AtomicBool,
}

impl Backend {
    pub fn new(config: BackendConfig) -> Result<Arc<Self>> {
        let config = config.sanitized();
        let cache = TieredCache::new(&config.server_id, config.l1_capacity, config.l2_capacity)?;

        info!(
            server = %config.server_id,
            l1 = config.l1_capacity,
            l2 = config.l2_capacity,
            "backend created"
        );

        Ok(Arc::new(Self {
            server_id: config.server_id,
            cache,
            started_at: Instant::now(),
            shutting_down: AtomicBool::new(false),
        }))
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    /// Makes subsequent `post_message` calls return an application-level
    /// rejection so routers fail over; in-flight handlers complete.
    pub fn begin_shutdown(&self) {
        info!(server = %self.server_id, "shutting down");
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_healthy(&self) -> bool {
        !self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn uptime_seconds(&self) -> i64 {
        self.started_at.elapsed().as_secs() as i64
    }

    /// Dispatches one request envelope.
    ///
    /// Unknown methods and malformed arguments produce envelope errors;
    /// a shutdown rejection travels inside the typed reply instead.
    pub fn handle(&self, request: Request) -> Response {
        match request.method.as_str() {
            METHOD_POST_MESSAGE => match serde_json::from_value::<PostMessageParams>(request.args)
            {
                Ok(params) => {
                    let reply = self.post_message(params);
                    match serde_json::to_value(&reply) {
                        Ok(value) => Response::success(request.id, value),
                        Err(e) => Response::error(request.id, e.to_string()),
                    }
                }
                Err(e) => Response::error(request.id, format!("malformed arguments: {}", e)),
            },
            METHOD_GET_STATS => match serde_json::to_value(self.get_stats()) {
                Ok(value) => Response::success(request.id, value),
                Err(e) => Response::error(request.id, e.to_string()),
            },
            METHOD_HEALTH_CHECK => match serde_json::to_value(self.health_check()) {
                Ok(value) => Response::success(request.id, value),
                Err(e) => Response::error(request.id, e.to_string()),
            },
            other => Response::error(request.id, format!("unknown method: {}", other)),
        }
    }

    fn post_message(&self, params: PostMessageParams) -> PostMessageReply {
        if self.shutting_down.load(Ordering::SeqCst) {
            return PostMessageReply {
                success: false,
                server_id: self.server_id.clone(),
                cache_tier: CacheTier::Unknown,
                message_count: 0,
                error_message: "server is shutting down".to_string(),
            };
        }

        let msg = Message {
            content: params.payload,
            sender_id: params.sender_id,
            timestamp: params.timestamp,
        };
        let (session, tier) = self.cache.append_message(&params.session_id, msg);

        debug!(
            server = %self.server_id,
            session = %params.session_id,
            tier = %tier,
            messages = session.message_count(),
            "message appended"
        );

        PostMessageReply {
            success: true,
            server_id: self.server_id.clone(),
            cache_tier: tier,
            message_count: session.message_count() as i32,
            error_message: String::new(),
        }
    }

    fn get_stats(&self) -> StatsReply {
        let snap = self.cache.snapshot();
        StatsReply {
            server_id: self.server_id.clone(),
            l1_size: snap.l1_size,
            l1_capacity: snap.l1_capacity,
            l2_size: snap.l2_size,
            l2_capacity: snap.l2_capacity,
            total_requests: snap.stats.total_requests,
            hits: snap.stats.hits,
            misses: snap.stats.misses,
            l1_hits: snap.stats.l1_hits,
            l2_hits: snap.stats.l2_hits,
            demotions: snap.stats.demotions,
            evictions: snap.stats.evictions,
            l1_ids: snap.l1_ids,
            l2_ids: snap.l2_ids,
        }
    }

    fn health_check(&self) -> HealthReply {
        HealthReply {
            healthy: self.is_healthy(),
            server_id: self.server_id.clone(),
            uptime_seconds: self.uptime_seconds(),
        }
    }

    /// Runs the accept loop of `server`, dispatching every request to
    /// this backend.
    pub async fn serve(self: Arc<Self>, server: TcpServer) -> Result<()> {
        let backend = Arc::clone(&self);
        server
            .run_with_handler(move |request| {
                let backend = Arc::clone(&backend);
                async move { Ok(backend.handle(request)) }
            })
            .await
    }
}
