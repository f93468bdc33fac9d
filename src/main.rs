use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use gen1_trade_link::{
    codec::PokemonRecord,
    config::Config,
    link::{self, bridge},
    server::{self, ApiState},
    session::TradeSession,
    storage::SlotStore,
    types::StatusSnapshot,
};
use parking_lot::{Mutex, RwLock};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".into());
    let config = Config::from_file(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;

    let store = SlotStore::open(&config.storage.slots_dir, config.storage.slot_count)
        .context("failed to open slot store")?;
    if store.slot_info(0)?.is_none() {
        info!("slot 0 empty, seeding the built-in starter");
        store.save(0, &PokemonRecord::starter())?;
    }
    let store = Arc::new(Mutex::new(store));
    let status = Arc::new(RwLock::new(StatusSnapshot::idle()));

    let (port, wire, cancel) = link::link_pair(config.link.handshake_timeout());

    let bridge_listener = TcpListener::bind(&config.link.bridge_addr)
        .await
        .with_context(|| format!("failed to bind wire bridge on {}", config.link.bridge_addr))?;
    info!("wire bridge listening on {}", config.link.bridge_addr);
    tokio::spawn(bridge::serve_wire(bridge_listener, wire));

    // Sessions run back to back; each waits for a master to start clocking.
    {
        let mut session = TradeSession::new(
            port,
            cancel.clone(),
            Arc::clone(&store),
            Arc::clone(&status),
            config.link.clone(),
            config.trade,
        );
        tokio::spawn(async move {
            loop {
                match session.run().await {
                    Ok(outcome) => info!(?outcome, "session finished"),
                    Err(e) => warn!("session error: {e}"),
                }
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        });
    }

    let api_state = ApiState {
        status,
        store,
        cancel,
    };
    let app = server::build_router(api_state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server host/port")?;
    let listener = TcpListener::bind(addr).await?;
    info!("status api listening on {addr}");

    tokio::select! {
        res = axum::serve(listener, app) => {
            res.context("status api server error")?;
        }
        _ = signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    Ok(())
}
