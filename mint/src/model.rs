use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::amount::Amount;
use crate::SESSION_TIMEOUT_MS;

/// Persisted session states. "expired" is not one of them: a timed-out
/// `pending` session reads as expired at the API (`Session::timed_out`)
/// until the sweeper deletes its row outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    PaymentPending,
    Complete,
    Failed,
}

impl SessionStatus {
    /// Open sessions still hold reservations and are watched by the observers.
    pub fn is_open(self) -> bool {
        matches!(self, SessionStatus::Pending | SessionStatus::PaymentPending)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Pending => "pending",
            SessionStatus::PaymentPending => "payment_pending",
            SessionStatus::Complete => "complete",
            SessionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for SessionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SessionStatus::Pending),
            "payment_pending" => Ok(SessionStatus::PaymentPending),
            "complete" => Ok(SessionStatus::Complete),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(anyhow::anyhow!("Invalid SessionStatus value: {}", other)),
        }
    }
}

/// A single buyer's attempt to purchase a batch of items.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub quantity: u32,

    /// Globally unique across all sessions ever; the on-chain correlation token.
    pub amount_due: Amount,

    pub status: SessionStatus,
    pub txid: Option<String>,

    /// Ordered content refs, written exactly once at completion.
    pub assigned_refs: Vec<String>,

    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Session {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// A pending session past the reservation window reads as expired even
    /// before the sweeper removes the row.
    pub fn timed_out(&self, now_ms: u64) -> bool {
        self.status == SessionStatus::Pending
            && now_ms.saturating_sub(self.created_at_ms) > SESSION_TIMEOUT_MS
    }
}

/// A pre-enumerated collectible with a stable content reference.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: i64,
    pub content_ref: String,
    pub claimed: bool,
    pub session_ref: Option<String>,
}

/// Returned by `create_intent`; everything a buyer needs to pay.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub session_id: String,
    pub amount_due: Amount,
    pub address: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MintProgress {
    pub total: u64,
    pub minted: u64,
    pub reserved: u64,
    pub available: u64,
    pub percentage: f64,
}
