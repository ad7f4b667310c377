//! Confirmed-block scanner.
//!
//! Tails the ledger from a persisted cursor, one full-verbosity block per
//! call, and completes any session whose unique amount shows up in an
//! output paying the drop address. The cursor advances only after a block
//! is fully processed, so a crash re-scans at most one block; re-scanning
//! is harmless because completion is idempotent.

use std::time::Duration;

use anyhow::Result;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use mint::store::LAST_SCANNED_BLOCK;
use mint::MintEngine;

use crate::index::PendingIndex;
use crate::ledger::LedgerClient;

/// How far behind the tip a fresh cursor starts.
const BOOTSTRAP_DEPTH: u64 = 100;

const BLOCK_PAUSE: Duration = Duration::from_millis(250);

pub const BLOCK_SCAN_PERIOD: Duration = Duration::from_secs(120);

pub struct BlockScanner {
    engine: MintEngine,
    ledger: LedgerClient,
    block_pause: Duration,
}

impl BlockScanner {
    pub fn new(engine: MintEngine, ledger: LedgerClient) -> Self {
        Self {
            engine,
            ledger,
            block_pause: BLOCK_PAUSE,
        }
    }

    /// Override the pause between consecutive block fetches; tests zero it.
    pub fn with_block_pause(mut self, pause: Duration) -> Self {
        self.block_pause = pause;
        self
    }

    /// One scan cycle. An unavailable tip or block aborts the cycle; the
    /// next tick picks up from the persisted cursor.
    pub async fn scan_once(&self) -> Result<()> {
        let open = self.engine.store().open_sessions().await?;
        if open.is_empty() {
            debug!("no open sessions; block scan idle");
            return Ok(());
        }
        let mut index = PendingIndex::build(&open);

        let Some(tip) = self.ledger.tip_height().await else {
            debug!("tip height unavailable; skipping block scan cycle");
            return Ok(());
        };

        let cursor = self.engine.store().cursor(LAST_SCANNED_BLOCK).await?;
        let last = cursor.unwrap_or_else(|| tip.saturating_sub(BOOTSTRAP_DEPTH));

        for height in (last + 1)..=tip {
            let Some(block) = self.ledger.block_at(height).await else {
                debug!(height, "block unavailable; aborting scan cycle");
                return Ok(());
            };

            for tx in &block.tx {
                for out in &tx.vout {
                    if !out.pays_to(self.engine.payment_address()) {
                        continue;
                    }
                    if let Some(entry) = index.take(out.amount()) {
                        info!(
                            session_id = %entry.session_id,
                            txid = %tx.txid,
                            height,
                            "confirmed payment matched"
                        );
                        self.engine
                            .assign_and_complete(&entry.session_id, &tx.txid)
                            .await?;
                    }
                }
            }

            self.engine
                .store()
                .set_cursor(LAST_SCANNED_BLOCK, height)
                .await?;

            if height < tip && !self.block_pause.is_zero() {
                tokio::time::sleep(self.block_pause).await;
            }
        }

        Ok(())
    }
}

pub async fn run_block_scanner(scanner: BlockScanner, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(every_secs = period.as_secs(), "block scanner started");

    loop {
        ticker.tick().await;
        if let Err(e) = scanner.scan_once().await {
            error!(error = ?e, "block scan cycle failed");
        }
    }
}
