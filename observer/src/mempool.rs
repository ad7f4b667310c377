//! Mempool scanner: early detection of not-yet-confirmed payments.
//!
//! Seeing the payment in the mempool moves the session to
//! `payment_pending`, which shields it from the sweeper while the
//! transaction waits for a block. This tier is best-effort and budget-bound;
//! the block scanner alone is sufficient for correctness.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info};

use mint::MintEngine;

use crate::cadence::Cadence;
use crate::index::PendingIndex;
use crate::ledger::LedgerClient;
use crate::recent::RecentSet;

/// Skip mempool work entirely when the remaining daily budget drops below
/// this many units.
const MIN_BUDGET: u64 = 5_000;

/// Hard per-cycle ceiling on inspected transactions.
const MAX_TX_PER_CYCLE: usize = 150;

/// Remaining-budget units reserved per inspected transaction.
const BUDGET_PER_TX: u64 = 20;

const RECENT_CAP: usize = 500;

const TX_PAUSE: Duration = Duration::from_millis(100);

pub struct MempoolScanner {
    engine: MintEngine,
    ledger: LedgerClient,
    cadence: Arc<Cadence>,
    recent: RecentSet,
    tx_pause: Duration,
}

impl MempoolScanner {
    pub fn new(engine: MintEngine, ledger: LedgerClient, cadence: Arc<Cadence>) -> Self {
        Self {
            engine,
            ledger,
            cadence,
            recent: RecentSet::new(RECENT_CAP),
            tx_pause: TX_PAUSE,
        }
    }

    /// Override the pause between transaction fetches; tests zero it.
    pub fn with_tx_pause(mut self, pause: Duration) -> Self {
        self.tx_pause = pause;
        self
    }

    pub async fn scan_once(&mut self) -> Result<()> {
        let cap = self.ledger.capacity();
        if cap.total_remaining < MIN_BUDGET {
            debug!(
                remaining = cap.total_remaining,
                "rpc budget low; skipping mempool cycle"
            );
            self.cadence.observe_usage(cap.usage());
            return Ok(());
        }

        let open = self.engine.store().open_sessions().await?;
        if open.is_empty() {
            debug!("no open sessions; mempool scan idle");
            self.cadence.observe_usage(cap.usage());
            return Ok(());
        }
        let mut index = PendingIndex::build(&open);

        let Some(txids) = self.ledger.raw_mempool().await else {
            self.cadence.observe_usage(self.ledger.capacity().usage());
            return Ok(());
        };

        let limit = ((cap.total_remaining / BUDGET_PER_TX) as usize).min(MAX_TX_PER_CYCLE);
        let candidates: Vec<String> = txids
            .into_iter()
            .filter(|t| !self.recent.contains(t))
            .take(limit)
            .collect();

        debug!(
            candidates = candidates.len(),
            watched = index.len(),
            "mempool cycle"
        );

        for txid in candidates {
            if let Some(tx) = self.ledger.raw_transaction(&txid).await {
                for out in &tx.vout {
                    if !out.pays_to(self.engine.payment_address()) {
                        continue;
                    }
                    if let Some(entry) = index.take(out.amount()) {
                        info!(
                            session_id = %entry.session_id,
                            txid = %tx.txid,
                            "unconfirmed payment matched"
                        );
                        self.engine
                            .mark_payment_pending(&entry.session_id, &tx.txid)
                            .await?;
                    }
                }
            }

            self.recent.insert(txid);

            if !self.tx_pause.is_zero() {
                tokio::time::sleep(self.tx_pause).await;
            }
        }

        self.cadence.observe_usage(self.ledger.capacity().usage());
        Ok(())
    }
}

pub async fn run_mempool_scanner(mut scanner: MempoolScanner, cadence: Arc<Cadence>) {
    info!("mempool scanner started");

    loop {
        if let Err(e) = scanner.scan_once().await {
            error!(error = ?e, "mempool scan cycle failed");
        }
        tokio::time::sleep(cadence.current()).await;
    }
}
