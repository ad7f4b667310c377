use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::time::MissedTickBehavior;

use backend::api::{router, AppState};
use backend::config::AppConfig;
use common::time::now_ms;
use common::init_logger;
use mint::{MintEngine, MintStore};
use observer::{
    run_block_scanner, run_mempool_scanner, BlockScanner, Cadence, LedgerClient, MempoolScanner,
};
use rpcpool::{HttpTransport, RpcPool};

/// Spawns the two ledger observer loops. The block scanner runs on its
/// fixed period; the mempool scanner sleeps on the cadence it republishes
/// after each cycle.
fn start_observers(engine: MintEngine, pool: Arc<RpcPool>, block_period: Duration) {
    let ledger = LedgerClient::new(pool);
    let cadence = Arc::new(Cadence::new());

    let blocks = BlockScanner::new(engine.clone(), ledger.clone());
    tokio::spawn(run_block_scanner(blocks, block_period));

    let mempool = MempoolScanner::new(engine, ledger, cadence.clone());
    tokio::spawn(run_mempool_scanner(mempool, cadence));
}

/// The sweeper is the only component allowed to release reservations
/// without an observed payment.
fn start_sweeper(engine: MintEngine, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match engine.sweep(now_ms()).await {
                Ok(0) => {}
                Ok(released) => tracing::info!(released, "stale sessions swept"),
                Err(e) => tracing::error!(error = %e, "sweep cycle failed"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger("mintgate");

    let cfg = AppConfig::from_env();

    let store = MintStore::connect(&cfg.database_path)
        .await
        .context("open database")?;
    store.migrate().await.context("migrate schema")?;

    let engine = MintEngine::new(store, cfg.payment_address.clone());

    let transport = Arc::new(HttpTransport::new().context("build rpc transport")?);
    let pool = Arc::new(RpcPool::new(cfg.endpoints.clone(), transport));

    start_observers(engine.clone(), pool, cfg.block_scan_period);
    start_sweeper(engine.clone(), cfg.sweep_period);

    let app = router(AppState {
        engine: Arc::new(engine),
    });

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(addr = %addr, "http api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("serve http api")?;

    Ok(())
}
