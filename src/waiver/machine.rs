use chrono::NaiveDate;
use tracing::info;

use crate::{
    catalog::FeeRule,
    error::{FeeTrackerError, Result},
    storage::models::{FeeRecord, WaiverStatus},
    waiver::evaluator::Evaluation,
};

/// What a state-machine call did to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No state change (progress fields may still have been refreshed).
    None,
    Waived,
    Overdue,
    Paid,
}

impl Transition {
    pub fn changed_state(&self) -> bool {
        !matches!(self, Transition::None)
    }
}

/// Applies evaluator output and due-date/payment events to a fee record.
///
/// Allowed edges: Pending -> Waived, Pending -> Overdue, Pending -> Paid,
/// Overdue -> Paid. Waived and Paid are terminal for the fee year; calls
/// against terminal records are silent no-ops, except paying an
/// already-waived fee which is a business-rule error.
pub struct WaiverStateMachine;

impl WaiverStateMachine {
    /// Fold an evaluation into the record. Progress fields are refreshed for
    /// any open record; the Waived transition fires only from Pending, for a
    /// waivable rule, strictly before the due date.
    pub fn apply_evaluation(
        record: &mut FeeRecord,
        rule: &FeeRule,
        evaluation: Evaluation,
        today: NaiveDate,
    ) -> Transition {
        if !record.is_open() {
            return Transition::None;
        }

        record.current_progress = evaluation.progress;
        record.waiver_condition_met = evaluation.met && rule.is_waivable();

        if record.waiver_status == WaiverStatus::Pending
            && record.waiver_condition_met
            && today < record.due_date
        {
            record.waiver_status = WaiverStatus::Waived;
            info!(
                "Card {} year {}: annual fee waived ({} rule, progress {})",
                record.card_id, record.fee_year, rule.fee_type, evaluation.progress
            );
            return Transition::Waived;
        }

        Transition::None
    }

    /// Scheduled due-date check: a Pending record past its due date goes
    /// Overdue. Everything else is left alone.
    pub fn check_overdue(record: &mut FeeRecord, today: NaiveDate) -> Transition {
        if record.waiver_status == WaiverStatus::Pending && today > record.due_date {
            record.waiver_status = WaiverStatus::Overdue;
            info!(
                "Card {} year {}: annual fee overdue (due {})",
                record.card_id, record.fee_year, record.due_date
            );
            return Transition::Overdue;
        }
        Transition::None
    }

    /// Payment confirmation. Allowed from Pending or Overdue; paying an
    /// already-waived fee is rejected; a repeated payment on a Paid record is
    /// ignored.
    pub fn record_payment(record: &mut FeeRecord, payment_date: NaiveDate) -> Result<Transition> {
        match record.waiver_status {
            WaiverStatus::Pending | WaiverStatus::Overdue => {
                record.waiver_status = WaiverStatus::Paid;
                record.payment_date = Some(payment_date);
                info!(
                    "Card {} year {}: annual fee paid on {}",
                    record.card_id, record.fee_year, payment_date
                );
                Ok(Transition::Paid)
            }
            WaiverStatus::Paid => Ok(Transition::None),
            WaiverStatus::Waived => Err(FeeTrackerError::BusinessRule(format!(
                "Fee for card {} year {} is already waived; payment rejected",
                record.card_id, record.fee_year
            ))),
        }
    }
}
