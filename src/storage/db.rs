use chrono::NaiveDate;
use rusqlite::{params, Connection, ErrorCode};
use rust_decimal::Decimal;

use crate::{
    catalog::{FeeRule, FeeType},
    error::{FeeTrackerError, Result},
    storage::models::{FeeRecord, ReminderRecord, ReminderStatus, ReminderType, WaiverStatus},
};

pub struct Database {
    conn: Connection,
}

fn text_conversion_err(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn parse_date(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    s.parse().map_err(|e| text_conversion_err(idx, e))
}

fn parse_decimal(idx: usize, s: &str) -> rusqlite::Result<Decimal> {
    s.parse().map_err(|e| text_conversion_err(idx, e))
}

impl Database {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS fee_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                fee_type TEXT NOT NULL,
                base_fee TEXT NOT NULL,
                waiver_condition_value TEXT NOT NULL,
                waiver_period_months INTEGER NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS fee_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                card_id INTEGER NOT NULL,
                fee_year INTEGER NOT NULL,
                cycle_start TEXT NOT NULL,
                due_date TEXT NOT NULL,
                fee_amount TEXT NOT NULL,
                rule_id INTEGER NOT NULL,
                waiver_status TEXT NOT NULL,
                waiver_condition_met INTEGER NOT NULL,
                current_progress TEXT NOT NULL,
                payment_date TEXT,
                version INTEGER NOT NULL DEFAULT 0,
                UNIQUE(card_id, fee_year),
                FOREIGN KEY (rule_id) REFERENCES fee_rules(id)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS reminders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                card_id INTEGER NOT NULL,
                fee_record_id INTEGER,
                reminder_type TEXT NOT NULL,
                threshold_days INTEGER,
                message TEXT NOT NULL,
                scheduled_at TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // Indexes for the daily batch scan and reminder dedup lookups
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_fee_records_status ON fee_records(waiver_status)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_reminders_record ON reminders(fee_record_id)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_reminders_status ON reminders(status)",
            [],
        )?;

        Ok(())
    }

    // ===== Fee rules =====

    pub fn insert_rule(&self, rule: &FeeRule) -> Result<i64> {
        rule.validate()?;

        self.conn.execute(
            "INSERT INTO fee_rules
             (name, fee_type, base_fee, waiver_condition_value, waiver_period_months)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                rule.name,
                rule.fee_type.to_string(),
                rule.base_fee.to_string(),
                rule.waiver_condition_value.to_string(),
                rule.waiver_period_months,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_rule(&self, id: i64) -> Result<Option<FeeRule>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, fee_type, base_fee, waiver_condition_value, waiver_period_months
             FROM fee_rules WHERE id = ?1",
        )?;

        let mut rows = stmt.query_map([id], |row| {
            let fee_type: String = row.get(2)?;
            let base_fee: String = row.get(3)?;
            let condition: String = row.get(4)?;
            Ok(FeeRule {
                id: row.get(0)?,
                name: row.get(1)?,
                fee_type: fee_type
                    .parse::<FeeType>()
                    .map_err(|e| text_conversion_err(2, e))?,
                base_fee: parse_decimal(3, &base_fee)?,
                waiver_condition_value: parse_decimal(4, &condition)?,
                waiver_period_months: row.get(5)?,
            })
        })?;

        Ok(rows.next().transpose()?)
    }

    /// Rule lookup where absence is a business error (a live FeeRecord should
    /// always reference an existing rule).
    pub fn require_rule(&self, id: i64) -> Result<FeeRule> {
        self.get_rule(id)?.ok_or_else(|| {
            FeeTrackerError::BusinessRule(format!("No fee rule with id {}", id))
        })
    }

    // ===== Fee records =====

    const FEE_RECORD_COLS: &'static str =
        "id, card_id, fee_year, cycle_start, due_date, fee_amount, rule_id,
         waiver_status, waiver_condition_met, current_progress, payment_date, version";

    fn row_to_fee_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<FeeRecord> {
        let cycle_start: String = row.get(3)?;
        let due_date: String = row.get(4)?;
        let fee_amount: String = row.get(5)?;
        let status: String = row.get(7)?;
        let progress: String = row.get(9)?;
        let payment_date: Option<String> = row.get(10)?;

        Ok(FeeRecord {
            id: row.get(0)?,
            card_id: row.get(1)?,
            fee_year: row.get(2)?,
            cycle_start: parse_date(3, &cycle_start)?,
            due_date: parse_date(4, &due_date)?,
            fee_amount: parse_decimal(5, &fee_amount)?,
            rule_id: row.get(6)?,
            waiver_status: status
                .parse::<WaiverStatus>()
                .map_err(|e| text_conversion_err(7, e))?,
            waiver_condition_met: row.get(8)?,
            current_progress: parse_decimal(9, &progress)?,
            payment_date: payment_date
                .map(|s| parse_date(10, &s))
                .transpose()?,
            version: row.get(11)?,
        })
    }

    /// Insert a new fee record. The (card_id, fee_year) uniqueness invariant
    /// is enforced by the schema and surfaced as a business-rule error.
    pub fn insert_fee_record(&self, record: &FeeRecord) -> Result<i64> {
        let result = self.conn.execute(
            "INSERT INTO fee_records
             (card_id, fee_year, cycle_start, due_date, fee_amount, rule_id,
              waiver_status, waiver_condition_met, current_progress, payment_date, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0)",
            params![
                record.card_id,
                record.fee_year,
                record.cycle_start.to_string(),
                record.due_date.to_string(),
                record.fee_amount.to_string(),
                record.rule_id,
                record.waiver_status.to_string(),
                record.waiver_condition_met,
                record.current_progress.to_string(),
                record.payment_date.map(|d| d.to_string()),
            ],
        );

        match result {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(FeeTrackerError::BusinessRule(format!(
                    "Fee record already exists for card {} year {}",
                    record.card_id, record.fee_year
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_fee_record(&self, card_id: i64, fee_year: i32) -> Result<Option<FeeRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM fee_records WHERE card_id = ?1 AND fee_year = ?2",
            Self::FEE_RECORD_COLS
        ))?;
        let mut rows = stmt.query_map(params![card_id, fee_year], Self::row_to_fee_record)?;
        Ok(rows.next().transpose()?)
    }

    pub fn get_fee_record_by_id(&self, id: i64) -> Result<Option<FeeRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM fee_records WHERE id = ?1",
            Self::FEE_RECORD_COLS
        ))?;
        let mut rows = stmt.query_map([id], Self::row_to_fee_record)?;
        Ok(rows.next().transpose()?)
    }

    /// Most recent fee year on file for a card, used for the annual rollover.
    pub fn get_latest_fee_record(&self, card_id: i64) -> Result<Option<FeeRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM fee_records WHERE card_id = ?1 ORDER BY fee_year DESC LIMIT 1",
            Self::FEE_RECORD_COLS
        ))?;
        let mut rows = stmt.query_map([card_id], Self::row_to_fee_record)?;
        Ok(rows.next().transpose()?)
    }

    /// Records the daily batch still needs to look at (Pending or Overdue).
    pub fn get_open_fee_records(&self) -> Result<Vec<FeeRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM fee_records
             WHERE waiver_status IN ('Pending', 'Overdue')
             ORDER BY due_date ASC",
            Self::FEE_RECORD_COLS
        ))?;
        let records = stmt
            .query_map([], Self::row_to_fee_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Optimistic write: succeeds only if the stored version still matches
    /// `record.version`, then bumps it. Mismatch means another trigger won the
    /// race and the caller should re-read and retry.
    pub fn update_fee_record(&self, record: &mut FeeRecord) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE fee_records
             SET waiver_status = ?1, waiver_condition_met = ?2, current_progress = ?3,
                 payment_date = ?4, version = version + 1
             WHERE id = ?5 AND version = ?6",
            params![
                record.waiver_status.to_string(),
                record.waiver_condition_met,
                record.current_progress.to_string(),
                record.payment_date.map(|d| d.to_string()),
                record.id,
                record.version,
            ],
        )?;

        if updated == 0 {
            return Err(FeeTrackerError::ConcurrencyConflict(format!(
                "Fee record {} was modified concurrently (expected version {})",
                record.id, record.version
            )));
        }

        record.version += 1;
        Ok(())
    }

    // ===== Reminders =====

    const REMINDER_COLS: &'static str =
        "id, card_id, fee_record_id, reminder_type, threshold_days, message,
         scheduled_at, status, created_at";

    fn row_to_reminder(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReminderRecord> {
        let reminder_type: String = row.get(3)?;
        let scheduled_at: String = row.get(6)?;
        let status: String = row.get(7)?;
        let created_at: String = row.get(8)?;

        Ok(ReminderRecord {
            id: row.get(0)?,
            card_id: row.get(1)?,
            fee_record_id: row.get(2)?,
            reminder_type: reminder_type
                .parse::<ReminderType>()
                .map_err(|e| text_conversion_err(3, e))?,
            threshold_days: row.get(4)?,
            message: row.get(5)?,
            scheduled_at: scheduled_at
                .parse()
                .map_err(|e| text_conversion_err(6, e))?,
            status: status
                .parse::<ReminderStatus>()
                .map_err(|e| text_conversion_err(7, e))?,
            created_at: created_at
                .parse()
                .map_err(|e| text_conversion_err(8, e))?,
        })
    }

    pub fn insert_reminder(&self, reminder: &ReminderRecord) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO reminders
             (card_id, fee_record_id, reminder_type, threshold_days, message,
              scheduled_at, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                reminder.card_id,
                reminder.fee_record_id,
                reminder.reminder_type.to_string(),
                reminder.threshold_days,
                reminder.message,
                reminder.scheduled_at.to_rfc3339(),
                reminder.status.to_string(),
                reminder.created_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_reminders_for_record(&self, fee_record_id: i64) -> Result<Vec<ReminderRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM reminders WHERE fee_record_id = ?1 ORDER BY created_at ASC, id ASC",
            Self::REMINDER_COLS
        ))?;
        let reminders = stmt
            .query_map([fee_record_id], Self::row_to_reminder)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(reminders)
    }

    /// Outbox scan for the delivery collaborator.
    pub fn get_pending_reminders(&self, limit: Option<usize>) -> Result<Vec<ReminderRecord>> {
        let mut query = format!(
            "SELECT {} FROM reminders WHERE status = 'Pending' ORDER BY scheduled_at ASC, id ASC",
            Self::REMINDER_COLS
        );
        if let Some(lim) = limit {
            query.push_str(&format!(" LIMIT {}", lim));
        }

        let mut stmt = self.conn.prepare(&query)?;
        let reminders = stmt
            .query_map([], Self::row_to_reminder)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(reminders)
    }

    pub fn mark_reminder_sent(&self, id: i64) -> Result<()> {
        self.set_reminder_status(id, ReminderStatus::Sent)
    }

    pub fn mark_reminder_read(&self, id: i64) -> Result<()> {
        self.set_reminder_status(id, ReminderStatus::Read)
    }

    fn set_reminder_status(&self, id: i64, status: ReminderStatus) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE reminders SET status = ?1 WHERE id = ?2",
            params![status.to_string(), id],
        )?;
        if updated == 0 {
            return Err(FeeTrackerError::RecordNotFound(format!("reminder {}", id)));
        }
        Ok(())
    }

    // ===== Stats =====

    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(DatabaseStats {
            total_fee_records: count("SELECT COUNT(*) FROM fee_records")?,
            pending: count("SELECT COUNT(*) FROM fee_records WHERE waiver_status = 'Pending'")?,
            waived: count("SELECT COUNT(*) FROM fee_records WHERE waiver_status = 'Waived'")?,
            paid: count("SELECT COUNT(*) FROM fee_records WHERE waiver_status = 'Paid'")?,
            overdue: count("SELECT COUNT(*) FROM fee_records WHERE waiver_status = 'Overdue'")?,
            total_reminders: count("SELECT COUNT(*) FROM reminders")?,
            pending_reminders: count("SELECT COUNT(*) FROM reminders WHERE status = 'Pending'")?,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DatabaseStats {
    pub total_fee_records: usize,
    pub pending: usize,
    pub waived: usize,
    pub paid: usize,
    pub overdue: usize,
    pub total_reminders: usize,
    pub pending_reminders: usize,
}
