//! Reservation & correlation engine.
//!
//! Every operation here is one store transaction. Reservation is the
//! critical section: all `create_intent` calls serialize on the single
//! writer, and the row-count check after the reserving UPDATE is the last
//! word on whether the session got its items.

use rand::RngCore;
use sqlx::{Row, Sqlite, Transaction};
use tracing::{info, warn};

use common::time::now_ms;

use crate::amount::Amount;
use crate::error::MintError;
use crate::model::{MintProgress, PaymentIntent, Session, SessionStatus};
use crate::store::{row_to_session, MintStore, SESSION_COUNTER};
use crate::{
    MAX_QUANTITY, MAX_SUPPLY, MIN_QUANTITY, PAYMENT_PENDING_TIMEOUT_MS, PRICE_PER_ITEM,
    SESSION_TIMEOUT_MS,
};

#[derive(Clone)]
pub struct MintEngine {
    store: MintStore,
    payment_address: String,
}

impl MintEngine {
    pub fn new(store: MintStore, payment_address: String) -> Self {
        Self {
            store,
            payment_address,
        }
    }

    pub fn store(&self) -> &MintStore {
        &self.store
    }

    pub fn payment_address(&self) -> &str {
        &self.payment_address
    }

    /// Reserve `quantity` items and mint the session's unique payment amount.
    pub async fn create_intent(&self, quantity: u32) -> Result<PaymentIntent, MintError> {
        if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&quantity) {
            return Err(MintError::InvalidQuantity(quantity));
        }

        let mut tx = self.store.pool().begin().await?;

        let available: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM items WHERE claimed = 0 AND session_ref IS NULL AND id <= ?",
        )
        .bind(MAX_SUPPLY)
        .fetch_one(&mut *tx)
        .await?;

        if (available as u64) < quantity as u64 {
            return Err(MintError::InsufficientInventory);
        }

        let next_id = next_session_seq(&mut tx).await?;

        // The low-order perturbation below any plausible fee jitter that
        // makes this session findable on the ledger.
        let amount_due =
            Amount::from_base_units(PRICE_PER_ITEM.base_units() * quantity as u64 + next_id);

        let session_id = new_session_id();
        let now = now_ms();

        let inserted = sqlx::query(
            "INSERT INTO sessions \
             (session_id, quantity, amount_due, status, created_at_ms, updated_at_ms) \
             VALUES (?, ?, ?, 'pending', ?, ?)",
        )
        .bind(&session_id)
        .bind(quantity as i64)
        .bind(amount_due.base_units() as i64)
        .bind(now as i64)
        .bind(now as i64)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Err(MintError::AmountCollision),
            Err(e) => return Err(e.into()),
        }

        let reserved = sqlx::query(
            r#"
            UPDATE items SET session_ref = ?
            WHERE id IN (
                SELECT id FROM items
                WHERE claimed = 0 AND session_ref IS NULL AND id <= ?
                ORDER BY RANDOM()
                LIMIT ?
            );
        "#,
        )
        .bind(&session_id)
        .bind(MAX_SUPPLY)
        .bind(quantity as i64)
        .execute(&mut *tx)
        .await?;

        if reserved.rows_affected() != quantity as u64 {
            // Dropping the transaction rolls the session row back too.
            return Err(MintError::ReservationRace);
        }

        tx.commit().await?;

        info!(
            session_id = %session_id,
            quantity,
            amount = %amount_due,
            "payment intent created"
        );

        Ok(PaymentIntent {
            session_id,
            amount_due,
            address: self.payment_address.clone(),
        })
    }

    /// Claim the session's reserved items after a confirmed payment.
    ///
    /// No-op once the session has left the open states, so re-scanning a
    /// block after a crash cannot double-assign.
    pub async fn assign_and_complete(
        &self,
        session_id: &str,
        txid: &str,
    ) -> Result<(), MintError> {
        let mut tx = self.store.pool().begin().await?;

        let Some(session) = fetch_session(&mut tx, session_id).await? else {
            return Ok(());
        };
        if !session.is_open() {
            return Ok(());
        }

        let rows = sqlx::query(
            "SELECT id, content_ref FROM items \
             WHERE session_ref = ? AND claimed = 0 AND id <= ? ORDER BY id",
        )
        .bind(session_id)
        .bind(MAX_SUPPLY)
        .fetch_all(&mut *tx)
        .await?;

        let now = now_ms();

        if (rows.len() as u32) < session.quantity {
            sqlx::query("UPDATE items SET session_ref = NULL WHERE session_ref = ? AND claimed = 0")
                .bind(session_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE sessions SET status = 'failed', updated_at_ms = ? WHERE session_id = ?")
                .bind(now as i64)
                .bind(session_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            warn!(
                session_id = %session_id,
                txid = %txid,
                have = rows.len(),
                want = session.quantity,
                "reservations lost before completion; session failed"
            );
            return Ok(());
        }

        let refs: Vec<String> = rows.iter().map(|r| r.get("content_ref")).collect();

        sqlx::query("UPDATE items SET claimed = 1 WHERE session_ref = ? AND claimed = 0")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE sessions \
             SET status = 'complete', txid = ?, assigned_refs = ?, updated_at_ms = ? \
             WHERE session_id = ?",
        )
        .bind(txid)
        .bind(serde_json::to_string(&refs)?)
        .bind(now as i64)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            session_id = %session_id,
            txid = %txid,
            quantity = session.quantity,
            "session completed"
        );
        Ok(())
    }

    /// Record that a matching transaction was seen in the mempool.
    ///
    /// Only a `pending` session moves; a completed session winning the race
    /// against the mempool scanner stays completed.
    pub async fn mark_payment_pending(
        &self,
        session_id: &str,
        txid: &str,
    ) -> Result<bool, MintError> {
        let res = sqlx::query(
            "UPDATE sessions SET status = 'payment_pending', txid = ?, updated_at_ms = ? \
             WHERE session_id = ? AND status = 'pending'",
        )
        .bind(txid)
        .bind(now_ms() as i64)
        .bind(session_id)
        .execute(self.store.pool())
        .await?;

        let moved = res.rows_affected() == 1;
        if moved {
            info!(session_id = %session_id, txid = %txid, "payment seen in mempool");
        }
        Ok(moved)
    }

    /// Release a single pending session that never attracted a payment.
    pub async fn expire(&self, session_id: &str) -> Result<bool, MintError> {
        let mut tx = self.store.pool().begin().await?;

        let Some(session) = fetch_session(&mut tx, session_id).await? else {
            return Ok(false);
        };
        if session.status != SessionStatus::Pending {
            return Ok(false);
        }

        release_and_delete(&mut tx, session_id).await?;
        tx.commit().await?;

        info!(session_id = %session_id, "session expired; reservations released");
        Ok(true)
    }

    /// Release every stale session in one transaction. Returns how many were
    /// removed. `complete` and `failed` are never touched.
    pub async fn sweep(&self, now_ms: u64) -> Result<u64, MintError> {
        let pending_cutoff = now_ms.saturating_sub(SESSION_TIMEOUT_MS);
        let unconfirmed_cutoff = now_ms.saturating_sub(PAYMENT_PENDING_TIMEOUT_MS);

        let mut tx = self.store.pool().begin().await?;

        let stale: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT session_id FROM sessions
            WHERE (status = 'pending' AND created_at_ms < ?)
               OR (status = 'payment_pending' AND updated_at_ms < ?)
        "#,
        )
        .bind(pending_cutoff as i64)
        .bind(unconfirmed_cutoff as i64)
        .fetch_all(&mut *tx)
        .await?;

        for session_id in &stale {
            release_and_delete(&mut tx, session_id).await?;
        }

        tx.commit().await?;
        Ok(stale.len() as u64)
    }

    pub async fn progress(&self) -> Result<MintProgress, MintError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN claimed = 1 THEN 1 ELSE 0 END), 0) AS minted,
                COALESCE(SUM(CASE WHEN claimed = 0 AND session_ref IS NOT NULL THEN 1 ELSE 0 END), 0) AS reserved
            FROM items WHERE id <= ?
        "#,
        )
        .bind(MAX_SUPPLY)
        .fetch_one(self.store.pool())
        .await?;

        let total = row.get::<i64, _>("total") as u64;
        let minted = row.get::<i64, _>("minted") as u64;
        let reserved = row.get::<i64, _>("reserved") as u64;
        let available = total - minted - reserved;

        let percentage = if total == 0 {
            0.0
        } else {
            (minted as f64 / total as f64 * 10_000.0).round() / 100.0
        };

        Ok(MintProgress {
            total,
            minted,
            reserved,
            available,
            percentage,
        })
    }
}

async fn fetch_session(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: &str,
) -> Result<Option<Session>, MintError> {
    let row = sqlx::query("SELECT * FROM sessions WHERE session_id = ?")
        .bind(session_id)
        .fetch_optional(&mut **tx)
        .await?;

    row.as_ref().map(row_to_session).transpose()
}

async fn next_session_seq(tx: &mut Transaction<'_, Sqlite>) -> Result<u64, MintError> {
    let current: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(SESSION_COUNTER)
        .fetch_optional(&mut **tx)
        .await?;

    let next = current.and_then(|v| v.parse::<u64>().ok()).unwrap_or(0) + 1;

    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(SESSION_COUNTER)
    .bind(next.to_string())
    .execute(&mut **tx)
    .await?;

    Ok(next)
}

async fn release_and_delete(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: &str,
) -> Result<(), MintError> {
    sqlx::query("UPDATE items SET session_ref = NULL WHERE session_ref = ? AND claimed = 0")
        .bind(session_id)
        .execute(&mut **tx)
        .await?;

    sqlx::query("DELETE FROM sessions WHERE session_id = ?")
        .bind(session_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

fn new_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
