use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::{FeeTrackerError, Result};

/// Count and sum of a card's qualifying transactions inside a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnAggregate {
    pub count: u64,
    pub amount_sum: Decimal,
}

/// Read-only view over the transaction ledger collaborator.
///
/// The window is half-open: `[window_start, window_end)`. Outages surface as
/// `DependencyUnavailable` so the caller can defer to the next batch run.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    async fn aggregate(
        &self,
        card_id: i64,
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> Result<TxnAggregate>;
}

/// Read-only view over the rewards-points collaborator. Evaluation only reads
/// the balance; the actual point exchange is a separate user action.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PointsBalance: Send + Sync {
    async fn balance(&self, card_id: i64) -> Result<Decimal>;
}

/// SQLite adapter over the ledger tables the surrounding app maintains.
/// Amounts are integer cents so sums stay exact. Used by the CLI; tests mock
/// the traits directly.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| FeeTrackerError::DependencyUnavailable(e.to_string()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS card_transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                card_id INTEGER NOT NULL,
                txn_date TEXT NOT NULL,
                amount_cents INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| FeeTrackerError::DependencyUnavailable(e.to_string()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS card_points (
                card_id INTEGER PRIMARY KEY,
                points INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| FeeTrackerError::DependencyUnavailable(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn record_transaction(
        &self,
        card_id: i64,
        txn_date: NaiveDate,
        amount: Decimal,
    ) -> Result<()> {
        let cents = (amount * Decimal::from(100)).round().to_i64().ok_or_else(|| {
            FeeTrackerError::Validation(format!("Amount out of range: {}", amount))
        })?;
        self.conn
            .lock()
            .expect("ledger mutex poisoned")
            .execute(
                "INSERT INTO card_transactions (card_id, txn_date, amount_cents)
                 VALUES (?1, ?2, ?3)",
                params![card_id, txn_date.to_string(), cents],
            )
            .map_err(|e| FeeTrackerError::DependencyUnavailable(e.to_string()))?;
        Ok(())
    }

    pub fn set_points(&self, card_id: i64, points: i64) -> Result<()> {
        self.conn
            .lock()
            .expect("ledger mutex poisoned")
            .execute(
                "INSERT INTO card_points (card_id, points) VALUES (?1, ?2)
                 ON CONFLICT(card_id) DO UPDATE SET points = excluded.points",
                params![card_id, points],
            )
            .map_err(|e| FeeTrackerError::DependencyUnavailable(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl TransactionLedger for SqliteLedger {
    async fn aggregate(
        &self,
        card_id: i64,
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> Result<TxnAggregate> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        let (count, sum_cents): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(amount_cents), 0)
                 FROM card_transactions
                 WHERE card_id = ?1 AND txn_date >= ?2 AND txn_date < ?3",
                params![card_id, window_start.to_string(), window_end.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| FeeTrackerError::DependencyUnavailable(e.to_string()))?;

        Ok(TxnAggregate {
            count: count as u64,
            amount_sum: Decimal::new(sum_cents, 2),
        })
    }
}

#[async_trait]
impl PointsBalance for SqliteLedger {
    async fn balance(&self, card_id: i64) -> Result<Decimal> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        let points: Option<i64> = conn
            .query_row(
                "SELECT points FROM card_points WHERE card_id = ?1",
                [card_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| FeeTrackerError::DependencyUnavailable(e.to_string()))?;
        Ok(Decimal::from(points.unwrap_or(0)))
    }
}
