//! admin-gate server.
//!
//! Exposes every configured protected operation at `POST /ops/{operation}`
//! behind the gate pipeline, plus the gated audit read side and a health
//! endpoint.
//!
//! ```text
//!   client ──▶ request id ─▶ trace ─▶ body limit ─▶ handler
//!                                                      │
//!              ┌───────────────────────────────────────┘
//!              ▼
//!        ┌──────────┐   ┌────────────┐   ┌───────────┐   ┌──────────┐
//!        │ identity │──▶│ rate limit │──▶│ validator │──▶│ upstream │
//!        └──────────┘   └────────────┘   └───────────┘   └──────────┘
//!              │               │               │               │
//!              └───────────────┴───────┬───────┴───────────────┘
//!                                      ▼
//!                              ┌──────────────┐
//!                              │  audit sink  │ (JSONL, fsync per entry)
//!                              └──────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use admin_gate::clock::{Clock, SystemClock};
use admin_gate::config::{load_config, GateConfig};
use admin_gate::gate::Gate;
use admin_gate::http::{AppState, GateServer};
use admin_gate::lifecycle::{signals, startup, Shutdown};
use admin_gate::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "admin-gate")]
#[command(about = "Identity, rate limit, validation and audit gate for privileged operations", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "ADMIN_GATE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GateConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!("admin-gate v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        operations = config.operations.len(),
        sessions = config.identity.sessions.len(),
        request_timeout_ms = config.timeouts.request_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let audit = startup::open_audit_logger(&config.audit, clock.clone()).await?;
    let gate = Arc::new(Gate::from_config(&config, audit, clock.clone())?);

    let shutdown = Shutdown::new();
    let sweeper = startup::spawn_sweeper(&config.rate_limit, gate.limiter().clone(), clock, &shutdown);
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_millis(config.timeouts.request_ms))
        .build()?;
    let state = AppState::new(gate, &client);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    GateServer::new(state, config.listener.max_body_bytes)
        .run(listener, shutdown.clone())
        .await?;

    shutdown.trigger();
    let _ = sweeper.await;
    tracing::info!("Shutdown complete");
    Ok(())
}
