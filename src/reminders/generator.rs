use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use crate::{
    storage::models::{FeeRecord, ReminderRecord, ReminderStatus, ReminderType, WaiverStatus},
    utils::round_money,
    waiver::machine::Transition,
};

/// Derives at most one new reminder per check from a fee record's state and
/// due-date proximity, deduplicating against the reminders already generated
/// for that record. Stateless; persistence is the caller's job.
pub struct ReminderGenerator {
    /// Due-soon thresholds in days, ascending.
    thresholds: Vec<i64>,
}

impl ReminderGenerator {
    pub fn new(mut thresholds: Vec<i64>) -> Self {
        thresholds.sort_unstable();
        thresholds.dedup();
        Self { thresholds }
    }

    /// Reminder for a fresh state transition: fee_waived on Waived,
    /// fee_overdue on Overdue. Payment needs no reminder.
    pub fn after_transition(
        &self,
        record: &FeeRecord,
        transition: Transition,
        existing: &[ReminderRecord],
        now: DateTime<Utc>,
    ) -> Option<ReminderRecord> {
        let (reminder_type, message) = match transition {
            Transition::Waived => (
                ReminderType::FeeWaived,
                format!(
                    "Annual fee of {} for card {} has been waived for {}",
                    round_money(record.fee_amount),
                    record.card_id,
                    record.fee_year
                ),
            ),
            Transition::Overdue => (
                ReminderType::FeeOverdue,
                format!(
                    "Annual fee of {} for card {} was due on {} and is now overdue",
                    round_money(record.fee_amount),
                    record.card_id,
                    record.due_date
                ),
            ),
            Transition::Paid | Transition::None => return None,
        };

        self.emit(record, reminder_type, None, message, now, existing)
    }

    /// Routine daily proximity check, independent of transitions. While the
    /// record is Pending, the tightest configured threshold at or above
    /// days-remaining fires once; crossing a new threshold later fires again.
    pub fn proximity_check(
        &self,
        record: &FeeRecord,
        today: NaiveDate,
        existing: &[ReminderRecord],
        now: DateTime<Utc>,
    ) -> Option<ReminderRecord> {
        if record.waiver_status != WaiverStatus::Pending {
            return None;
        }

        let days_remaining = (record.due_date - today).num_days();
        if days_remaining < 0 {
            // Past due: the overdue transition path owns that reminder.
            return None;
        }

        let threshold = *self.thresholds.iter().find(|&&t| days_remaining <= t)?;

        let message = format!(
            "Annual fee of {} for card {} is due in {} day(s) on {}",
            round_money(record.fee_amount),
            record.card_id,
            days_remaining,
            record.due_date
        );

        self.emit(
            record,
            ReminderType::FeeDueSoon,
            Some(threshold),
            message,
            now,
            existing,
        )
    }

    fn emit(
        &self,
        record: &FeeRecord,
        reminder_type: ReminderType,
        threshold_days: Option<i64>,
        message: String,
        now: DateTime<Utc>,
        existing: &[ReminderRecord],
    ) -> Option<ReminderRecord> {
        // An un-Read reminder of the same type/threshold already exists:
        // duplicate generation is a no-op.
        if existing.iter().any(|r| r.blocks(reminder_type, threshold_days)) {
            debug!(
                "Card {} record {}: {} reminder already pending, skipping",
                record.card_id, record.id, reminder_type
            );
            return None;
        }

        Some(ReminderRecord {
            id: 0,
            card_id: record.card_id,
            fee_record_id: Some(record.id),
            reminder_type,
            threshold_days,
            message,
            scheduled_at: now,
            status: ReminderStatus::Pending,
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn record(status: WaiverStatus, due: NaiveDate) -> FeeRecord {
        FeeRecord {
            id: 10,
            card_id: 7,
            fee_year: 2026,
            cycle_start: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            due_date: due,
            fee_amount: Decimal::new(30000, 2),
            rule_id: 1,
            waiver_status: status,
            waiver_condition_met: false,
            current_progress: Decimal::ZERO,
            payment_date: None,
            version: 0,
        }
    }

    fn generator() -> ReminderGenerator {
        ReminderGenerator::new(vec![30, 15, 7, 3, 0])
    }

    fn due() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    #[test]
    fn waived_transition_emits_once() {
        let g = generator();
        let r = record(WaiverStatus::Waived, due());
        let now = Utc::now();

        let first = g
            .after_transition(&r, Transition::Waived, &[], now)
            .unwrap();
        assert_eq!(first.reminder_type, ReminderType::FeeWaived);
        assert_eq!(first.fee_record_id, Some(10));
        assert_eq!(first.status, ReminderStatus::Pending);

        let rerun = g.after_transition(&r, Transition::Waived, &[first], now);
        assert!(rerun.is_none());
    }

    #[test]
    fn overdue_transition_emits_exactly_once() {
        let g = generator();
        let r = record(WaiverStatus::Overdue, due());
        let now = Utc::now();

        let first = g
            .after_transition(&r, Transition::Overdue, &[], now)
            .unwrap();
        assert_eq!(first.reminder_type, ReminderType::FeeOverdue);

        assert!(g.after_transition(&r, Transition::Overdue, &[first], now).is_none());
    }

    #[test]
    fn paid_and_noop_transitions_emit_nothing() {
        let g = generator();
        let r = record(WaiverStatus::Paid, due());
        let now = Utc::now();
        assert!(g.after_transition(&r, Transition::Paid, &[], now).is_none());
        assert!(g.after_transition(&r, Transition::None, &[], now).is_none());
    }

    #[test]
    fn proximity_fires_tightest_crossed_threshold() {
        let g = generator();
        let r = record(WaiverStatus::Pending, due());
        let now = Utc::now();

        // 20 days out: 30 is the tightest threshold at or above 20
        let today = due() - chrono::Duration::days(20);
        let reminder = g.proximity_check(&r, today, &[], now).unwrap();
        assert_eq!(reminder.reminder_type, ReminderType::FeeDueSoon);
        assert_eq!(reminder.threshold_days, Some(30));
    }

    #[test]
    fn crossing_successive_thresholds_emits_one_each() {
        let g = generator();
        let r = record(WaiverStatus::Pending, due());
        let now = Utc::now();
        let mut existing: Vec<ReminderRecord> = Vec::new();

        // Day at 25 remaining: threshold 30 fires
        let first = g
            .proximity_check(&r, due() - chrono::Duration::days(25), &existing, now)
            .unwrap();
        assert_eq!(first.threshold_days, Some(30));
        existing.push(first);

        // Same day rerun: no duplicate
        assert!(g
            .proximity_check(&r, due() - chrono::Duration::days(25), &existing, now)
            .is_none());

        // Later, 12 days remaining: threshold 15 fires
        let second = g
            .proximity_check(&r, due() - chrono::Duration::days(12), &existing, now)
            .unwrap();
        assert_eq!(second.threshold_days, Some(15));
        existing.push(second);

        // Rerun still quiet
        assert!(g
            .proximity_check(&r, due() - chrono::Duration::days(12), &existing, now)
            .is_none());
    }

    #[test]
    fn due_today_hits_zero_threshold() {
        let g = generator();
        let r = record(WaiverStatus::Pending, due());
        let reminder = g.proximity_check(&r, due(), &[], Utc::now()).unwrap();
        assert_eq!(reminder.threshold_days, Some(0));
    }

    #[test]
    fn far_out_or_past_due_stays_quiet() {
        let g = generator();
        let r = record(WaiverStatus::Pending, due());
        let now = Utc::now();

        // 60 days out: no threshold crossed yet
        assert!(g
            .proximity_check(&r, due() - chrono::Duration::days(60), &[], now)
            .is_none());

        // Past due: proximity path yields to the overdue transition
        assert!(g
            .proximity_check(&r, due() + chrono::Duration::days(1), &[], now)
            .is_none());
    }

    #[test]
    fn non_pending_records_get_no_proximity_reminders() {
        let g = generator();
        let now = Utc::now();
        for status in [WaiverStatus::Waived, WaiverStatus::Paid, WaiverStatus::Overdue] {
            let r = record(status, due());
            assert!(g
                .proximity_check(&r, due() - chrono::Duration::days(3), &[], now)
                .is_none());
        }
    }

    #[test]
    fn read_reminder_no_longer_blocks() {
        let g = generator();
        let r = record(WaiverStatus::Pending, due());
        let now = Utc::now();
        let today = due() - chrono::Duration::days(5);

        let mut first = g.proximity_check(&r, today, &[], now).unwrap();
        assert_eq!(first.threshold_days, Some(7));

        // Un-read blocks, acknowledged does not
        assert!(g.proximity_check(&r, today, std::slice::from_ref(&first), now).is_none());
        first.status = ReminderStatus::Read;
        assert!(g.proximity_check(&r, today, &[first], now).is_some());
    }
}
