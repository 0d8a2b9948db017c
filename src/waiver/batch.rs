use chrono::Utc;
use std::time::Duration;
use tracing::{info, warn};

use crate::{
    clock::Clock,
    error::Result,
    waiver::machine::Transition,
    waiver::service::{FeeWaiverService, RecordOutcome},
};

/// Daily batch runner: sweeps all open fee records in chunks, evaluating and
/// transitioning each one. Safe to cancel and re-run; per-record processing
/// is idempotent within a day.
pub struct BatchRunner {
    service: FeeWaiverService,
    batch_size: usize,
    batch_delay: Duration,
}

impl BatchRunner {
    pub fn new(service: FeeWaiverService, batch_size: usize, batch_delay_ms: u64) -> Self {
        Self {
            service,
            batch_size: batch_size.max(1),
            batch_delay: Duration::from_millis(batch_delay_ms),
        }
    }

    pub fn service(&self) -> &FeeWaiverService {
        &self.service
    }

    pub fn into_service(self) -> FeeWaiverService {
        self.service
    }

    pub async fn run_daily(&self, clock: &dyn Clock) -> Result<BatchSummary> {
        let open = self.service.db().get_open_fee_records()?;
        let now = Utc::now();

        info!(
            "Daily waiver run for {}: {} open fee records",
            clock.today(),
            open.len()
        );

        let mut summary = BatchSummary::default();
        summary.total_records = open.len();

        let chunk_count = open.len().div_ceil(self.batch_size);
        for (chunk_num, chunk) in open.chunks(self.batch_size).enumerate() {
            for record in chunk {
                match self.service.process_record(record.id, clock, now).await {
                    Ok(RecordOutcome::Deferred) => summary.deferred += 1,
                    Ok(RecordOutcome::Processed {
                        transition,
                        reminder_generated,
                    }) => {
                        match transition {
                            Transition::Waived => summary.waived += 1,
                            Transition::Overdue => summary.overdue += 1,
                            Transition::Paid => {}
                            Transition::None => {}
                        }
                        if reminder_generated {
                            summary.reminders_generated += 1;
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Failed to process fee record {} (card {}): {}",
                            record.id, record.card_id, e
                        );
                        summary.failed += 1;
                    }
                }
            }

            if chunk_num + 1 < chunk_count && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        info!(
            "Daily run complete: {} waived, {} overdue, {} reminders, {} deferred, {} failed",
            summary.waived,
            summary.overdue,
            summary.reminders_generated,
            summary.deferred,
            summary.failed
        );

        Ok(summary)
    }
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct BatchSummary {
    pub total_records: usize,
    pub waived: usize,
    pub overdue: usize,
    pub reminders_generated: usize,
    pub deferred: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn print_summary(&self) {
        println!("\n=== Daily Waiver Run Summary ===");
        println!("Open records:    {}", self.total_records);
        println!("Waived:          {}", self.waived);
        println!("Overdue:         {}", self.overdue);
        println!("Reminders:       {}", self.reminders_generated);
        println!("Deferred:        {}", self.deferred);
        println!("Failed:          {}", self.failed);
        println!("================================");
    }
}
