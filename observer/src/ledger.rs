//! Typed ledger calls over the RPC pool.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use rpcpool::{Capacity, RpcPool};

use crate::chain::{Block, RawTx};

// Unit costs charged against an endpoint's daily quota. Full-verbosity
// blocks dominate the budget; everything else is cheap.
const COST_TIP: u64 = 1;
const COST_BLOCK_HASH: u64 = 1;
const COST_BLOCK: u64 = 10;
const COST_MEMPOOL: u64 = 5;
const COST_TX: u64 = 2;

#[derive(Clone)]
pub struct LedgerClient {
    pool: Arc<RpcPool>,
}

impl LedgerClient {
    pub fn new(pool: Arc<RpcPool>) -> Self {
        Self { pool }
    }

    pub fn capacity(&self) -> Capacity {
        self.pool.capacity()
    }

    pub async fn tip_height(&self) -> Option<u64> {
        self.pool
            .call("getblockcount", json!([]), COST_TIP)
            .await?
            .as_u64()
    }

    /// Resolve a height to its hash and fetch the block at full verbosity.
    pub async fn block_at(&self, height: u64) -> Option<Block> {
        let hash = self
            .pool
            .call("getblockhash", json!([height]), COST_BLOCK_HASH)
            .await?;
        let hash = hash.as_str()?;

        let raw = self
            .pool
            .call("getblock", json!([hash, 2]), COST_BLOCK)
            .await?;

        match serde_json::from_value(raw) {
            Ok(block) => Some(block),
            Err(e) => {
                warn!(height, error = %e, "undecodable block");
                None
            }
        }
    }

    pub async fn raw_mempool(&self) -> Option<Vec<String>> {
        let raw = self
            .pool
            .call("getrawmempool", json!([]), COST_MEMPOOL)
            .await?;

        match serde_json::from_value(raw) {
            Ok(txids) => Some(txids),
            Err(e) => {
                warn!(error = %e, "undecodable mempool listing");
                None
            }
        }
    }

    pub async fn raw_transaction(&self, txid: &str) -> Option<RawTx> {
        let raw = self
            .pool
            .call("getrawtransaction", json!([txid, 1]), COST_TX)
            .await?;

        match serde_json::from_value(raw) {
            Ok(tx) => Some(tx),
            Err(e) => {
                warn!(txid, error = %e, "undecodable transaction");
                None
            }
        }
    }
}
