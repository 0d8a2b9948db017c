use chrono::{DateTime, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    error::{FeeTrackerError, Result},
    reminders::ReminderGenerator,
    storage::models::{FeeRecord, WaiverStatus},
    storage::Database,
    utils::round_money,
    waiver::evaluator::{ProgressEvaluator, WaiverProgress},
    waiver::machine::{Transition, WaiverStateMachine},
};

/// What one daily pass did to one fee record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Collaborator outage; record untouched, next run retries.
    Deferred,
    Processed {
        transition: Transition,
        reminder_generated: bool,
    },
}

/// Orchestrates evaluation, transitions, and reminder generation for fee
/// records. Holds the store plus the stateless evaluator and generator; the
/// caller supplies the clock.
pub struct FeeWaiverService {
    db: Database,
    evaluator: ProgressEvaluator,
    generator: ReminderGenerator,
    max_transition_retries: u32,
    dry_run: bool,
}

impl FeeWaiverService {
    pub fn new(
        db: Database,
        evaluator: ProgressEvaluator,
        generator: ReminderGenerator,
        max_transition_retries: u32,
    ) -> Self {
        Self {
            db,
            evaluator,
            generator,
            max_transition_retries,
            dry_run: false,
        }
    }

    /// Dry-run mode: the daily pass evaluates and reports would-be
    /// transitions and reminders without writing anything.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    // ===== Card lifecycle =====

    /// Open a fee year anchored at `cycle_start` (the activation anniversary,
    /// or the prior record's due date on rollover). Due date is one year out;
    /// the fee year is the due date's calendar year.
    pub fn open_fee_year(
        &self,
        card_id: i64,
        rule_id: i64,
        cycle_start: NaiveDate,
    ) -> Result<FeeRecord> {
        if card_id <= 0 {
            return Err(FeeTrackerError::Validation(format!(
                "Invalid card id: {}",
                card_id
            )));
        }

        let rule = self.db.require_rule(rule_id)?;
        let due_date = cycle_start
            .checked_add_months(Months::new(12))
            .ok_or_else(|| {
                FeeTrackerError::Validation(format!("Due date overflows for {}", cycle_start))
            })?;

        let mut record = FeeRecord {
            id: 0,
            card_id,
            fee_year: chrono::Datelike::year(&due_date),
            cycle_start,
            due_date,
            fee_amount: round_money(rule.base_fee),
            rule_id,
            waiver_status: WaiverStatus::Pending,
            waiver_condition_met: false,
            current_progress: Decimal::ZERO,
            payment_date: None,
            version: 0,
        };

        record.id = self.db.insert_fee_record(&record)?;
        debug!(
            "Opened fee year {} for card {} (due {})",
            record.fee_year, card_id, due_date
        );
        Ok(record)
    }

    /// Roll a card into its next fee year, anchored at the latest record's
    /// due date. The old record stays as the audit trail.
    pub fn open_next_year(&self, card_id: i64) -> Result<FeeRecord> {
        let latest = self.db.get_latest_fee_record(card_id)?.ok_or_else(|| {
            FeeTrackerError::RecordNotFound(format!("no fee records for card {}", card_id))
        })?;
        self.open_fee_year(card_id, latest.rule_id, latest.due_date)
    }

    // ===== Inbound payment event =====

    /// Payment confirmation for a fee year. Retries internally on a version
    /// conflict with a concurrent batch run.
    pub fn confirm_payment(
        &self,
        card_id: i64,
        fee_year: i32,
        payment_date: NaiveDate,
    ) -> Result<Transition> {
        let mut attempts = 0;
        loop {
            let mut record = self.db.get_fee_record(card_id, fee_year)?.ok_or_else(|| {
                FeeTrackerError::RecordNotFound(format!(
                    "card {} fee year {}",
                    card_id, fee_year
                ))
            })?;

            let transition = WaiverStateMachine::record_payment(&mut record, payment_date)?;
            if !transition.changed_state() {
                return Ok(transition);
            }

            match self.db.update_fee_record(&mut record) {
                Ok(()) => return Ok(transition),
                Err(FeeTrackerError::ConcurrencyConflict(msg)) => {
                    attempts += 1;
                    if attempts > self.max_transition_retries {
                        return Err(FeeTrackerError::ConcurrencyConflict(msg));
                    }
                    debug!(
                        "Payment write conflict for card {} year {}, retry {}",
                        card_id, fee_year, attempts
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ===== Queries =====

    pub fn get_fee_record(&self, card_id: i64, fee_year: i32) -> Result<FeeRecord> {
        self.db.get_fee_record(card_id, fee_year)?.ok_or_else(|| {
            FeeTrackerError::RecordNotFound(format!("card {} fee year {}", card_id, fee_year))
        })
    }

    pub async fn get_waiver_progress(
        &self,
        fee_record_id: i64,
        clock: &dyn Clock,
    ) -> Result<WaiverProgress> {
        let record = self.db.get_fee_record_by_id(fee_record_id)?.ok_or_else(|| {
            FeeTrackerError::RecordNotFound(format!("fee record {}", fee_record_id))
        })?;
        let rule = self.db.require_rule(record.rule_id)?;
        self.evaluator.progress_view(&record, &rule, clock).await
    }

    // ===== Daily per-record pass =====

    /// One record's daily pass: evaluate, transition, remind. The read ->
    /// decide -> write sequence is guarded by the record's version; a conflict
    /// re-reads and retries up to the configured bound.
    pub async fn process_record(
        &self,
        record_id: i64,
        clock: &dyn Clock,
        now: DateTime<Utc>,
    ) -> Result<RecordOutcome> {
        let mut attempts = 0;
        loop {
            match self.process_record_once(record_id, clock, now).await {
                Err(FeeTrackerError::ConcurrencyConflict(msg)) => {
                    attempts += 1;
                    if attempts > self.max_transition_retries {
                        return Err(FeeTrackerError::ConcurrencyConflict(msg));
                    }
                    debug!("Version conflict on record {}, retry {}", record_id, attempts);
                }
                other => return other,
            }
        }
    }

    async fn process_record_once(
        &self,
        record_id: i64,
        clock: &dyn Clock,
        now: DateTime<Utc>,
    ) -> Result<RecordOutcome> {
        let mut record = self.db.get_fee_record_by_id(record_id)?.ok_or_else(|| {
            FeeTrackerError::RecordNotFound(format!("fee record {}", record_id))
        })?;

        if !record.is_open() {
            return Ok(RecordOutcome::Processed {
                transition: Transition::None,
                reminder_generated: false,
            });
        }

        let rule = self.db.require_rule(record.rule_id)?;
        let today = clock.today();

        let evaluation = match self.evaluator.evaluate(&record, &rule).await {
            Ok(eval) => eval,
            Err(FeeTrackerError::DependencyUnavailable(msg)) => {
                // Fail closed: no transition on partial data, next run retries.
                warn!(
                    "Evaluation deferred for card {} year {}: {}",
                    record.card_id, record.fee_year, msg
                );
                return Ok(RecordOutcome::Deferred);
            }
            Err(e) => return Err(e),
        };

        let before = record.clone();
        let mut transition = WaiverStateMachine::apply_evaluation(&mut record, &rule, evaluation, today);
        if !transition.changed_state() {
            transition = WaiverStateMachine::check_overdue(&mut record, today);
        }

        let dirty = record.waiver_status != before.waiver_status
            || record.current_progress != before.current_progress
            || record.waiver_condition_met != before.waiver_condition_met;
        if dirty && !self.dry_run {
            self.db.update_fee_record(&mut record)?;
        }

        let existing = self.db.get_reminders_for_record(record.id)?;
        let reminder = if transition.changed_state() {
            self.generator.after_transition(&record, transition, &existing, now)
        } else if record.waiver_status == WaiverStatus::Overdue {
            // The state write and the reminder insert are separate writes; a
            // run stopped between them leaves an Overdue record without its
            // reminder. Re-deriving it here is idempotent via the dedup check.
            self.generator
                .after_transition(&record, Transition::Overdue, &existing, now)
        } else {
            self.generator.proximity_check(&record, today, &existing, now)
        };
        let reminder_generated = reminder.is_some();
        if let Some(reminder) = reminder {
            if self.dry_run {
                info!(
                    "DRY RUN: would generate {} reminder for card {} year {}",
                    reminder.reminder_type, record.card_id, record.fee_year
                );
            } else {
                self.db.insert_reminder(&reminder)?;
            }
        }

        if self.dry_run && transition.changed_state() {
            info!(
                "DRY RUN: card {} year {} would transition to {}",
                record.card_id, record.fee_year, record.waiver_status
            );
        }

        Ok(RecordOutcome::Processed {
            transition,
            reminder_generated,
        })
    }
}
