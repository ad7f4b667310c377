//! SQLite persistence for inventory, sessions, and scan cursors.
//!
//! The store is the single source of truth: every state transition performed
//! by the engine, the observers, or the sweeper happens inside one of its
//! transactions. The pool is capped at one connection, so concurrent
//! transactions from the service's loops serialize here and over-allocation
//! is structurally impossible.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::amount::Amount;
use crate::error::MintError;
use crate::model::{Item, Session};
use crate::MAX_SUPPLY;

/// Settings key for the block scanner's cursor.
pub const LAST_SCANNED_BLOCK: &str = "last_scanned_block";

/// Settings key for the monotonic sequence behind payment amounts. Never
/// decremented, even when sessions are deleted, so amounts stay unique
/// across all sessions ever.
pub const SESSION_COUNTER: &str = "session_counter";

#[derive(Clone)]
pub struct MintStore {
    pool: SqlitePool,
}

impl MintStore {
    /// Open (creating if missing) the database at `path`.
    pub async fn connect(path: &str) -> Result<Self, MintError> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> Result<(), MintError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY,
                content_ref TEXT NOT NULL,
                claimed INTEGER NOT NULL DEFAULT 0,
                session_ref TEXT
            );
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                quantity INTEGER NOT NULL,
                amount_due INTEGER NOT NULL UNIQUE,
                status TEXT NOT NULL,
                txid TEXT,
                assigned_refs TEXT,
                created_at_ms INTEGER NOT NULL,
                updated_at_ms INTEGER NOT NULL
            );
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
        "#,
        )
        .execute(&self.pool)
        .await?;

        for ddl in [
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_amount ON sessions(amount_due);",
            "CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);",
            "CREATE INDEX IF NOT EXISTS idx_items_claimed ON items(claimed);",
            "CREATE INDEX IF NOT EXISTS idx_items_session ON items(session_ref);",
            "CREATE INDEX IF NOT EXISTS idx_items_content ON items(content_ref);",
        ] {
            sqlx::query(ddl).execute(&self.pool).await?;
        }

        Ok(())
    }

    pub async fn session(&self, session_id: &str) -> Result<Option<Session>, MintError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_session).transpose()
    }

    /// All sessions still holding reservations, for the observers' pending
    /// index.
    pub async fn open_sessions(&self) -> Result<Vec<Session>, MintError> {
        let rows =
            sqlx::query("SELECT * FROM sessions WHERE status IN ('pending', 'payment_pending')")
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(row_to_session).collect()
    }

    pub async fn items_for_session(&self, session_id: &str) -> Result<Vec<Item>, MintError> {
        let rows = sqlx::query(
            "SELECT id, content_ref, claimed, session_ref FROM items \
             WHERE session_ref = ? ORDER BY id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| Item {
                id: r.get("id"),
                content_ref: r.get("content_ref"),
                claimed: r.get::<i64, _>("claimed") != 0,
                session_ref: r.get("session_ref"),
            })
            .collect())
    }

    pub async fn cursor(&self, key: &str) -> Result<Option<u64>, MintError> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value.and_then(|v| v.parse().ok()))
    }

    pub async fn set_cursor(&self, key: &str, height: u64) -> Result<(), MintError> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(height.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Bulk-load inventory rows. Seeding proper is an operator tool; tests
    /// load their fixtures through the same path.
    pub async fn insert_items<I>(&self, items: I) -> Result<(), MintError>
    where
        I: IntoIterator<Item = (i64, String)>,
    {
        let mut tx = self.pool.begin().await?;

        for (id, content_ref) in items {
            sqlx::query("INSERT INTO items (id, content_ref, claimed) VALUES (?, ?, 0)")
                .bind(id)
                .bind(content_ref)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Unclaimed, unreserved items still inside the supply cap.
    pub async fn available_count(&self) -> Result<u64, MintError> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM items WHERE claimed = 0 AND session_ref IS NULL AND id <= ?",
        )
        .bind(MAX_SUPPLY)
        .fetch_one(&self.pool)
        .await?;

        Ok(n as u64)
    }
}

pub(crate) fn row_to_session(row: &SqliteRow) -> Result<Session, MintError> {
    let status_str: String = row.get("status");
    let status = status_str
        .parse()
        .map_err(|e: anyhow::Error| MintError::Corrupt(e.to_string()))?;

    let assigned: Option<String> = row.get("assigned_refs");
    let assigned_refs = match assigned {
        Some(json) => serde_json::from_str(&json)?,
        None => Vec::new(),
    };

    Ok(Session {
        session_id: row.get("session_id"),
        quantity: row.get::<i64, _>("quantity") as u32,
        amount_due: Amount::from_base_units(row.get::<i64, _>("amount_due") as u64),
        status,
        txid: row.get("txid"),
        assigned_refs,
        created_at_ms: row.get::<i64, _>("created_at_ms") as u64,
        updated_at_ms: row.get::<i64, _>("updated_at_ms") as u64,
    })
}
