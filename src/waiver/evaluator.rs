use std::sync::Arc;

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use tracing::debug;

use crate::{
    catalog::{FeeRule, FeeType},
    clock::Clock,
    error::{FeeTrackerError, Result},
    ledger::{PointsBalance, TransactionLedger},
    storage::models::FeeRecord,
    utils::round_money,
};

/// Evaluator output for one fee record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub progress: Decimal,
    pub met: bool,
}

/// Progress view exposed to UI/reporting layers.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WaiverProgress {
    pub progress: Decimal,
    pub threshold: Decimal,
    pub met: bool,
    pub days_remaining: i64,
}

/// Computes `(progress, met)` for a fee record against its rule and the
/// card's activity in the rule's evaluation window. Stateless; the only I/O
/// is the read-only collaborator queries.
pub struct ProgressEvaluator {
    ledger: Arc<dyn TransactionLedger>,
    points: Arc<dyn PointsBalance>,
}

impl ProgressEvaluator {
    pub fn new(ledger: Arc<dyn TransactionLedger>, points: Arc<dyn PointsBalance>) -> Self {
        Self { ledger, points }
    }

    /// Half-open evaluation window `[cycle_start, cycle_start + period)`.
    pub fn window(record: &FeeRecord, rule: &FeeRule) -> Result<(NaiveDate, NaiveDate)> {
        let end = record
            .cycle_start
            .checked_add_months(Months::new(rule.waiver_period_months))
            .ok_or_else(|| {
                FeeTrackerError::Validation(format!(
                    "Evaluation window overflows for cycle start {}",
                    record.cycle_start
                ))
            })?;
        Ok((record.cycle_start, end))
    }

    pub async fn evaluate(&self, record: &FeeRecord, rule: &FeeRule) -> Result<Evaluation> {
        if rule.id != record.rule_id {
            return Err(FeeTrackerError::BusinessRule(format!(
                "Fee record {} references rule {}, got rule {}",
                record.id, record.rule_id, rule.id
            )));
        }

        let evaluation = match rule.fee_type {
            // A rigid fee can never be waived; no collaborator call needed.
            FeeType::Rigid => Evaluation {
                progress: Decimal::ZERO,
                met: false,
            },

            FeeType::TransactionCount => {
                let (start, end) = Self::window(record, rule)?;
                let agg = self.ledger.aggregate(record.card_id, start, end).await?;
                let progress = Decimal::from(agg.count);
                Evaluation {
                    progress,
                    met: progress >= rule.waiver_condition_value,
                }
            }

            FeeType::TransactionAmount => {
                let (start, end) = Self::window(record, rule)?;
                let agg = self.ledger.aggregate(record.card_id, start, end).await?;
                let progress = round_money(agg.amount_sum);
                Evaluation {
                    progress,
                    met: progress >= rule.waiver_condition_value,
                }
            }

            FeeType::PointsExchange => {
                // Balance check only. Deducting points is a separate
                // user-initiated exchange outside this subsystem.
                let progress = self.points.balance(record.card_id).await?;
                Evaluation {
                    progress,
                    met: progress >= rule.waiver_condition_value,
                }
            }
        };

        debug!(
            "Card {} year {}: progress {}/{} ({}), met: {}",
            record.card_id,
            record.fee_year,
            evaluation.progress,
            rule.waiver_condition_value,
            rule.fee_type,
            evaluation.met
        );

        Ok(evaluation)
    }

    /// The `GetWaiverProgress` query: evaluation plus due-date distance.
    pub async fn progress_view(
        &self,
        record: &FeeRecord,
        rule: &FeeRule,
        clock: &dyn Clock,
    ) -> Result<WaiverProgress> {
        let evaluation = self.evaluate(record, rule).await?;
        let days_remaining = (record.due_date - clock.today()).num_days();
        Ok(WaiverProgress {
            progress: evaluation.progress,
            threshold: rule.waiver_condition_value,
            met: evaluation.met,
            days_remaining,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{MockPointsBalance, MockTransactionLedger, TxnAggregate};
    use crate::storage::models::WaiverStatus;

    fn rule(fee_type: FeeType, threshold: i64) -> FeeRule {
        FeeRule {
            id: 1,
            name: "test".to_string(),
            fee_type,
            base_fee: Decimal::new(30000, 2),
            waiver_condition_value: Decimal::from(threshold),
            waiver_period_months: 12,
        }
    }

    fn record() -> FeeRecord {
        FeeRecord {
            id: 10,
            card_id: 7,
            fee_year: 2026,
            cycle_start: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            fee_amount: Decimal::new(30000, 2),
            rule_id: 1,
            waiver_status: WaiverStatus::Pending,
            waiver_condition_met: false,
            current_progress: Decimal::ZERO,
            payment_date: None,
            version: 0,
        }
    }

    fn evaluator_with_aggregate(count: u64, sum: Decimal) -> ProgressEvaluator {
        let mut ledger = MockTransactionLedger::new();
        ledger
            .expect_aggregate()
            .returning(move |_, _, _| Ok(TxnAggregate { count, amount_sum: sum }));
        ProgressEvaluator::new(Arc::new(ledger), Arc::new(MockPointsBalance::new()))
    }

    #[tokio::test]
    async fn rigid_is_never_met() {
        // No collaborator expectations: rigid evaluation must not call out.
        let evaluator = ProgressEvaluator::new(
            Arc::new(MockTransactionLedger::new()),
            Arc::new(MockPointsBalance::new()),
        );

        let eval = evaluator.evaluate(&record(), &rule(FeeType::Rigid, 0)).await.unwrap();
        assert_eq!(eval.progress, Decimal::ZERO);
        assert!(!eval.met);
    }

    #[tokio::test]
    async fn count_rule_met_at_threshold() {
        let evaluator = evaluator_with_aggregate(12, Decimal::ZERO);
        let eval = evaluator
            .evaluate(&record(), &rule(FeeType::TransactionCount, 12))
            .await
            .unwrap();
        assert_eq!(eval.progress, Decimal::from(12));
        assert!(eval.met);

        let evaluator = evaluator_with_aggregate(11, Decimal::ZERO);
        let eval = evaluator
            .evaluate(&record(), &rule(FeeType::TransactionCount, 12))
            .await
            .unwrap();
        assert!(!eval.met);
    }

    #[tokio::test]
    async fn amount_rule_rounds_half_up_before_compare() {
        // 4999.995 rounds to 5000.00, meeting a 5000 threshold exactly.
        let evaluator = evaluator_with_aggregate(30, Decimal::new(4999995, 3));
        let eval = evaluator
            .evaluate(&record(), &rule(FeeType::TransactionAmount, 5000))
            .await
            .unwrap();
        assert_eq!(eval.progress, Decimal::new(500000, 2));
        assert!(eval.met);
    }

    #[tokio::test]
    async fn points_rule_reads_balance() {
        let mut points = MockPointsBalance::new();
        points.expect_balance().returning(|_| Ok(Decimal::from(80_000)));
        let evaluator =
            ProgressEvaluator::new(Arc::new(MockTransactionLedger::new()), Arc::new(points));

        let eval = evaluator
            .evaluate(&record(), &rule(FeeType::PointsExchange, 50_000))
            .await
            .unwrap();
        assert_eq!(eval.progress, Decimal::from(80_000));
        assert!(eval.met);
    }

    #[tokio::test]
    async fn ledger_outage_propagates_as_dependency_unavailable() {
        let mut ledger = MockTransactionLedger::new();
        ledger.expect_aggregate().returning(|_, _, _| {
            Err(FeeTrackerError::DependencyUnavailable(
                "ledger down".to_string(),
            ))
        });
        let evaluator =
            ProgressEvaluator::new(Arc::new(ledger), Arc::new(MockPointsBalance::new()));

        let err = evaluator
            .evaluate(&record(), &rule(FeeType::TransactionCount, 12))
            .await
            .unwrap_err();
        assert!(matches!(err, FeeTrackerError::DependencyUnavailable(_)));
    }

    #[tokio::test]
    async fn mismatched_rule_rejected() {
        let evaluator = evaluator_with_aggregate(0, Decimal::ZERO);
        let mut wrong = rule(FeeType::TransactionCount, 12);
        wrong.id = 99;
        let err = evaluator.evaluate(&record(), &wrong).await.unwrap_err();
        assert!(matches!(err, FeeTrackerError::BusinessRule(_)));
    }

    #[tokio::test]
    async fn progress_is_monotonic_as_activity_accumulates() {
        let r = rule(FeeType::TransactionCount, 12);
        let mut last = Decimal::MIN;
        for count in [0u64, 3, 3, 7, 12] {
            let evaluator = evaluator_with_aggregate(count, Decimal::ZERO);
            let eval = evaluator.evaluate(&record(), &r).await.unwrap();
            assert!(eval.progress >= last);
            last = eval.progress;
        }
    }

    #[test]
    fn window_is_cycle_start_plus_period() {
        let r = rule(FeeType::TransactionCount, 12);
        let (start, end) = ProgressEvaluator::window(&record(), &r).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());
    }
}
