use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{FeeTrackerError, Result};

/// How a card's annual fee can be waived.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FeeType {
    /// Fee is always charged, never waivable.
    Rigid,
    /// Waived after N qualifying transactions in the cycle window.
    TransactionCount,
    /// Waived after the window's transaction amounts sum past a threshold.
    TransactionAmount,
    /// Waivable by exchanging reward points (balance checked, never deducted here).
    PointsExchange,
}

impl std::fmt::Display for FeeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeeType::Rigid => write!(f, "Rigid"),
            FeeType::TransactionCount => write!(f, "TransactionCount"),
            FeeType::TransactionAmount => write!(f, "TransactionAmount"),
            FeeType::PointsExchange => write!(f, "PointsExchange"),
        }
    }
}

impl std::str::FromStr for FeeType {
    type Err = FeeTrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Rigid" => Ok(FeeType::Rigid),
            "TransactionCount" => Ok(FeeType::TransactionCount),
            "TransactionAmount" => Ok(FeeType::TransactionAmount),
            "PointsExchange" => Ok(FeeType::PointsExchange),
            other => Err(FeeTrackerError::Validation(format!(
                "Unknown fee type: {}",
                other
            ))),
        }
    }
}

/// A waiver policy. Immutable once a live FeeRecord references it; edits go
/// through the admin collaborator by creating a new rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeRule {
    pub id: i64,
    pub name: String,
    pub fee_type: FeeType,
    pub base_fee: Decimal,
    /// Threshold the progress measure is compared against. Meaningless for Rigid.
    pub waiver_condition_value: Decimal,
    /// Evaluation window length. Annual cards use 12.
    pub waiver_period_months: u32,
}

pub const DEFAULT_WAIVER_PERIOD_MONTHS: u32 = 12;

impl FeeRule {
    /// Validate a rule before it is persisted.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(FeeTrackerError::Validation(
                "Rule name must not be empty".to_string(),
            ));
        }

        if self.base_fee < Decimal::ZERO {
            return Err(FeeTrackerError::Validation(format!(
                "Base fee must not be negative (got {})",
                self.base_fee
            )));
        }

        if self.fee_type != FeeType::Rigid && self.waiver_condition_value <= Decimal::ZERO {
            return Err(FeeTrackerError::Validation(format!(
                "Waiver condition for {} rules must be positive (got {})",
                self.fee_type, self.waiver_condition_value
            )));
        }

        if self.waiver_period_months == 0 || self.waiver_period_months > 24 {
            return Err(FeeTrackerError::Validation(format!(
                "Waiver period must be 1-24 months (got {})",
                self.waiver_period_months
            )));
        }

        Ok(())
    }

    pub fn is_waivable(&self) -> bool {
        self.fee_type != FeeType::Rigid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn rule(fee_type: FeeType, threshold: i64) -> FeeRule {
        FeeRule {
            id: 1,
            name: "Gold annual".to_string(),
            fee_type,
            base_fee: Decimal::new(30000, 2),
            waiver_condition_value: Decimal::from(threshold),
            waiver_period_months: 12,
        }
    }

    #[test]
    fn valid_count_rule_passes() {
        assert!(rule(FeeType::TransactionCount, 12).validate().is_ok());
    }

    #[test]
    fn rigid_rule_ignores_threshold() {
        assert!(rule(FeeType::Rigid, 0).validate().is_ok());
    }

    #[test]
    fn non_rigid_rule_requires_positive_threshold() {
        let err = rule(FeeType::TransactionAmount, 0).validate().unwrap_err();
        assert!(matches!(err, FeeTrackerError::Validation(_)));
    }

    #[test]
    fn negative_base_fee_rejected() {
        let mut r = rule(FeeType::Rigid, 0);
        r.base_fee = Decimal::new(-100, 2);
        assert!(r.validate().is_err());
    }

    #[test]
    fn period_out_of_range_rejected() {
        let mut r = rule(FeeType::TransactionCount, 12);
        r.waiver_period_months = 0;
        assert!(r.validate().is_err());
        r.waiver_period_months = 36;
        assert!(r.validate().is_err());
    }

    #[test]
    fn fee_type_round_trips_through_string() {
        for t in [
            FeeType::Rigid,
            FeeType::TransactionCount,
            FeeType::TransactionAmount,
            FeeType::PointsExchange,
        ] {
            assert_eq!(t.to_string().parse::<FeeType>().unwrap(), t);
        }
        assert!("Bogus".parse::<FeeType>().is_err());
    }
}
