use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::FeeTrackerError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WaiverStatus {
    Pending,
    Waived,
    Paid,
    Overdue,
}

impl WaiverStatus {
    /// Waived and Paid close out the fee year.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WaiverStatus::Waived | WaiverStatus::Paid)
    }
}

impl std::fmt::Display for WaiverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaiverStatus::Pending => write!(f, "Pending"),
            WaiverStatus::Waived => write!(f, "Waived"),
            WaiverStatus::Paid => write!(f, "Paid"),
            WaiverStatus::Overdue => write!(f, "Overdue"),
        }
    }
}

impl std::str::FromStr for WaiverStatus {
    type Err = FeeTrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(WaiverStatus::Pending),
            "Waived" => Ok(WaiverStatus::Waived),
            "Paid" => Ok(WaiverStatus::Paid),
            "Overdue" => Ok(WaiverStatus::Overdue),
            other => Err(FeeTrackerError::Validation(format!(
                "Unknown waiver status: {}",
                other
            ))),
        }
    }
}

/// One card's fee obligation for one fee year. Never deleted; the next year's
/// record supersedes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeRecord {
    pub id: i64,
    pub card_id: i64,
    pub fee_year: i32,
    /// Anchor of the evaluation window: activation anniversary, or the prior
    /// record's due date for later years.
    pub cycle_start: NaiveDate,
    pub due_date: NaiveDate,
    pub fee_amount: Decimal,
    pub rule_id: i64,
    pub waiver_status: WaiverStatus,
    pub waiver_condition_met: bool,
    pub current_progress: Decimal,
    pub payment_date: Option<NaiveDate>,
    /// Optimistic-concurrency version, bumped on every write.
    pub version: i64,
}

impl FeeRecord {
    pub fn is_open(&self) -> bool {
        !self.waiver_status.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReminderType {
    FeeDueSoon,
    FeeOverdue,
    FeeWaived,
}

impl std::fmt::Display for ReminderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReminderType::FeeDueSoon => write!(f, "fee_due_soon"),
            ReminderType::FeeOverdue => write!(f, "fee_overdue"),
            ReminderType::FeeWaived => write!(f, "fee_waived"),
        }
    }
}

impl std::str::FromStr for ReminderType {
    type Err = FeeTrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fee_due_soon" => Ok(ReminderType::FeeDueSoon),
            "fee_overdue" => Ok(ReminderType::FeeOverdue),
            "fee_waived" => Ok(ReminderType::FeeWaived),
            other => Err(FeeTrackerError::Validation(format!(
                "Unknown reminder type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReminderStatus {
    Pending,
    Sent,
    Read,
}

impl std::fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReminderStatus::Pending => write!(f, "Pending"),
            ReminderStatus::Sent => write!(f, "Sent"),
            ReminderStatus::Read => write!(f, "Read"),
        }
    }
}

impl std::str::FromStr for ReminderStatus {
    type Err = FeeTrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ReminderStatus::Pending),
            "Sent" => Ok(ReminderStatus::Sent),
            "Read" => Ok(ReminderStatus::Read),
            other => Err(FeeTrackerError::Validation(format!(
                "Unknown reminder status: {}",
                other
            ))),
        }
    }
}

/// Audit-trail notification record. `fee_record_id` is a weak reference; a
/// dangling id after card deletion is tolerated and only suppresses
/// fee-specific content at render time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub id: i64,
    pub card_id: i64,
    pub fee_record_id: Option<i64>,
    pub reminder_type: ReminderType,
    /// For FeeDueSoon, the proximity threshold (in days) that fired.
    pub threshold_days: Option<i64>,
    pub message: String,
    pub scheduled_at: DateTime<Utc>,
    pub status: ReminderStatus,
    pub created_at: DateTime<Utc>,
}

impl ReminderRecord {
    /// An un-Read reminder of the same type (and threshold) blocks regeneration.
    pub fn blocks(&self, reminder_type: ReminderType, threshold_days: Option<i64>) -> bool {
        self.reminder_type == reminder_type
            && self.threshold_days == threshold_days
            && self.status != ReminderStatus::Read
    }
}
