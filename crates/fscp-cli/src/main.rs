//! fscpd - the FSCP daemon.
//!
//! Loads the TOML configuration, materializes identity and trust stores,
//! binds the engine and runs it until a termination signal. Initialization
//! failures (bad configuration, unreadable identity, bind errors) exit
//! non-zero before the engine starts.

mod config;
mod pid_file;

use anyhow::{Context, Result};
use clap::Parser;
use config::DaemonConfig;
use fscp_core::{Engine, EngineEvent, ForwardingMode};
use fscp_transport::MemoryTap;
use pid_file::PidFile;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fscpd", version, about = "FreeLAN Secure Channel Protocol daemon")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "/etc/fscp/fscpd.toml")]
    config: PathBuf,

    /// Override the listen address
    #[arg(short, long)]
    listen: Option<std::net::SocketAddr>,

    /// Override the PID file path
    #[arg(long)]
    pid_file: Option<PathBuf>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args = Args::parse();
    let daemon_config = DaemonConfig::load(&args.config)?;

    let mut engine_config = daemon_config.engine_config()?;
    if let Some(listen) = args.listen {
        engine_config.listen_on = listen;
    }

    engine_config.contact_endpoints = daemon_config
        .resolved_contact_endpoints(engine_config.hostname_resolution_protocol)
        .await?;

    let identity = daemon_config.identity()?;
    let trust = daemon_config.trust_store()?;

    let _pid_file = match args.pid_file.clone().or(daemon_config.pid_file.clone()) {
        Some(path) => Some(PidFile::create(path)?),
        None => None,
    };

    // Platform TAP adapters implement `TapDevice` out of tree; without one
    // the engine runs against an in-memory frame pipe.
    let (tap, _tap_handle) = MemoryTap::new([0x02, 0xFC, 0x50, 0x00, 0x00, 0x01]);

    let forwarding_mode = engine_config.forwarding_mode;
    let contact_endpoints = engine_config.contact_endpoints.clone();

    let engine = Engine::bind(engine_config, identity, trust, tap)
        .await
        .context("engine initialization failed")?;

    if forwarding_mode == ForwardingMode::Router {
        engine.set_local_routes(daemon_config.local_routes()?);
    }

    engine.start().await;
    tracing::info!(
        listen = %engine.local_addr()?,
        fingerprint = %hex::encode(engine.fingerprint()),
        "fscpd running"
    );

    // Log lifecycle events for the operator.
    let mut events = engine.subscribe();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                EngineEvent::SessionEstablished {
                    endpoint,
                    session_number,
                } => {
                    tracing::info!(peer = %endpoint, session_number, "session established");
                }
                EngineEvent::SessionLost { endpoint } => {
                    tracing::info!(peer = %endpoint, "session lost");
                }
                EngineEvent::PresentationRejected { endpoint, reason } => {
                    tracing::warn!(peer = %endpoint, ?reason, "presentation rejected");
                }
                EngineEvent::ContactLearned {
                    fingerprint,
                    endpoint,
                } => {
                    tracing::info!(
                        fingerprint = %hex::encode(&fingerprint[..8]),
                        peer = %endpoint,
                        "contact learned"
                    );
                }
                EngineEvent::NegotiationTimedOut { endpoint } => {
                    tracing::warn!(peer = %endpoint, "session negotiation timed out");
                }
                EngineEvent::PeerBlacklisted { endpoint } => {
                    tracing::warn!(peer = %endpoint, "peer blacklisted");
                }
            }
        }
    });

    // Kick off the configured contacts.
    for endpoint in contact_endpoints {
        if let Err(err) = engine.introduce_to(endpoint).await {
            tracing::warn!(peer = %endpoint, error = %err, "initial contact failed");
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("cannot wait for termination signal")?;
    tracing::info!("termination signal received");

    engine.stop().await;
    event_task.abort();

    Ok(())
}
