//! # Sessmesh CLI Entry Point
//!
//! Main binary for the sessmesh session layer.
//!
//! ## Usage
//!
//! ```bash
//! # Run a single backend node
//! sessmesh backend --id backend-a --bind 0.0.0.0:9001 --l1 5 --l2 20
//!
//! # Run the in-process three-node failover demo
//! sessmesh demo
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use tracing_subscriber::EnvFilter;

use sessmesh_backend::{Backend, BackendConfig};
use sessmesh_common::transport::TcpServer;
use sessmesh_router::{RouterConfig, SessionRouter};

/// sessmesh - distributed session routing with tiered caching
#[derive(FromArgs)]
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Backend(BackendCmd),
    Demo(DemoCmd),
}

/// run a single backend node
#[derive(FromArgs)]
#[argh(subcommand, name = "backend")]
struct BackendCmd {
    /// backend identifier reported in replies
    #[argh(option, short = 'i')]
    id: String,

    /// address to bind, e.g. 0.0.0.0:9001
    #[argh(option, short = 'b', default = "String::from(\"127.0.0.1:9001\")")]
    bind: String,

    /// hot tier capacity
    #[argh(option, default = "5")]
    l1: usize,

    /// warm tier capacity
    #[argh(option, default = "20")]
    l2: usize,
}

/// run the in-process three-node failover demo
#[derive(FromArgs)]
#[argh(subcommand, name = "demo")]
struct DemoCmd {
    /// total messages to send
    #[argh(option, default = "50")]
    messages: usize,

    /// number of distinct sessions
    #[argh(option, default = "25")]
    sessions: usize,

    /// stop backend-b after this many messages
    #[argh(option, default = "10")]
    kill_after: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli: Cli = argh::from_env();
    match cli.command {
        Commands::Backend(cmd) => run_backend(cmd).await,
        Commands::Demo(cmd) => run_demo(cmd).await,
    }
}

async fn run_backend(cmd: BackendCmd) -> Result<()> {
    let backend = Backend::new(
        BackendConfig::new(&cmd.id).with_capacities(cmd.l1, cmd.l2),
    )?;
    let server = TcpServer::bind(&cmd.bind).await?;
    let addr = server.local_addr()?;
    println!("backend {} listening on {}", cmd.id, addr);

    tokio::select! {
        result = Arc::clone(&backend).serve(server) => result?,
        _ = tokio::signal::ctrl_c() => {
            backend.begin_shutdown();
            println!("backend {} shutting down", cmd.id);
        }
    }
    Ok(())
}

/// The demo from the original design pitch: three backends of uneven
/// weight, steady traffic over a fixed session population, one backend
/// killed mid-run, and the router shown failing its sessions over.
async fn run_demo(cmd: DemoCmd) -> Result<()> {
    println!("sessmesh failover demo");
    println!("{}", "=".repeat(60));

    // Phase 1: backends. B carries 1.5x the virtual nodes.
    let specs = [("backend-a", 100u32), ("backend-b", 150), ("backend-c", 100)];
    let mut backends = Vec::new();
    for (id, weight) in specs {
        let backend = Backend::new(BackendConfig::new(id).with_capacities(5, 20))?;
        let server = TcpServer::bind("127.0.0.1:0").await?;
        let addr = server.local_addr()?.to_string();
        tokio::spawn(Arc::clone(&backend).serve(server));
        println!("started {} (weight {}) on {}", id, weight, addr);
        backends.push((id, weight, addr, backend));
    }

    // Phase 2: router.
    let router = SessionRouter::new(RouterConfig {
        connect_timeout: Duration::from_secs(1),
        request_timeout: Duration::from_secs(2),
        ..Default::default()
    });
    for (id, weight, addr, _) in &backends {
        router.register_backend(id, addr, *weight).await;
    }
    println!();

    // Phase 3 and 4: traffic, with a mid-run failure.
    let mut killed = false;
    for i in 1..=cmd.messages {
        let session_id = format!("session-{:03}", (i - 1) % cmd.sessions.max(1));
        let sender_id = format!("user-{}", i % 100);
        let payload = format!("message {} in {}", i, session_id);

        match router.send(&session_id, &sender_id, &payload).await {
            Ok(reply) => println!(
                "message {:>3} -> {} [{}] {} (messages: {})",
                i, reply.server_id, reply.cache_tier, session_id, reply.message_count
            ),
            Err(e) => println!("message {:>3} failed: {}", i, e),
        }

        if i == cmd.kill_after && !killed {
            killed = true;
            println!();
            println!("killing backend-b");
            if let Some((_, _, _, backend)) = backends.iter().find(|(id, ..)| *id == "backend-b") {
                backend.begin_shutdown();
            }
            router.mark_down("backend-b").await?;

            for s in 0..cmd.sessions {
                let session_id = format!("session-{:03}", s);
                if let Some(target) = router.target_for(&session_id) {
                    if target.id == "backend-b" {
                        let fallback = router.ring().successors(&session_id, 2);
                        if let Some(next) = fallback.get(1) {
                            println!("  {} fails over: backend-b -> {}", session_id, next.id);
                        }
                    }
                }
            }
            println!();
        }
    }

    // Phase 5: statistics.
    println!();
    println!("{}", "=".repeat(60));
    let stats = router.stats();
    println!("router: total={} success={} failed={}", stats.total, stats.success, stats.failed);
    println!(
        "        primary_hits={} failovers={}",
        stats.primary_hits, stats.failovers
    );

    for (id, ..) in &backends {
        match router.fetch_stats(id).await {
            Ok(s) => println!(
                "{}: l1={}/{} l2={}/{} requests={} hits={} misses={} demotions={} evictions={}",
                s.server_id,
                s.l1_size,
                s.l1_capacity,
                s.l2_size,
                s.l2_capacity,
                s.total_requests,
                s.hits,
                s.misses,
                s.demotions,
                s.evictions
            ),
            Err(e) => println!("{}: stats unavailable ({})", id, e),
        }
    }

    router.close().await;
    Ok(())
}
