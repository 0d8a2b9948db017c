use async_trait::async_trait;
use tracing::{info, warn};

use crate::{error::Result, storage::models::ReminderRecord, storage::Database};

/// Delivery transport collaborator (push/SMS/email lives outside this crate).
/// It consumes Pending reminders; user acknowledgment later marks them Read.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReminderDelivery: Send + Sync {
    async fn deliver(&self, reminder: &ReminderRecord) -> Result<()>;
}

/// Stand-in transport that just logs, for local runs and the ops CLI.
pub struct LoggingDelivery;

#[async_trait]
impl ReminderDelivery for LoggingDelivery {
    async fn deliver(&self, reminder: &ReminderRecord) -> Result<()> {
        info!(
            "[reminder {}] card {}: {}",
            reminder.reminder_type, reminder.card_id, reminder.message
        );
        Ok(())
    }
}

/// Drain the outbox: hand each Pending reminder to the transport and mark it
/// Sent on success. A failed delivery stays Pending for the next drain.
pub async fn drain_outbox(
    db: &Database,
    delivery: &dyn ReminderDelivery,
    limit: Option<usize>,
) -> Result<usize> {
    let pending = db.get_pending_reminders(limit)?;
    let mut sent = 0;

    for reminder in &pending {
        match delivery.deliver(reminder).await {
            Ok(()) => {
                db.mark_reminder_sent(reminder.id)?;
                sent += 1;
            }
            Err(e) => {
                warn!(
                    "Delivery failed for reminder {} (card {}): {}",
                    reminder.id, reminder.card_id, e
                );
            }
        }
    }

    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeeTrackerError;
    use crate::storage::models::{ReminderStatus, ReminderType};
    use chrono::Utc;
    use tempfile::NamedTempFile;

    fn seed_reminder(db: &Database, card_id: i64) -> i64 {
        let now = Utc::now();
        db.insert_reminder(&ReminderRecord {
            id: 0,
            card_id,
            fee_record_id: None,
            reminder_type: ReminderType::FeeDueSoon,
            threshold_days: Some(7),
            message: "Annual fee due soon".to_string(),
            scheduled_at: now,
            status: ReminderStatus::Pending,
            created_at: now,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn successful_delivery_marks_sent() {
        let file = NamedTempFile::new().unwrap();
        let db = Database::new(file.path().to_str().unwrap()).unwrap();
        seed_reminder(&db, 1);
        seed_reminder(&db, 2);

        let mut delivery = MockReminderDelivery::new();
        delivery.expect_deliver().times(2).returning(|_| Ok(()));

        let sent = drain_outbox(&db, &delivery, None).await.unwrap();
        assert_eq!(sent, 2);
        assert!(db.get_pending_reminders(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_delivery_stays_pending() {
        let file = NamedTempFile::new().unwrap();
        let db = Database::new(file.path().to_str().unwrap()).unwrap();
        seed_reminder(&db, 1);

        let mut delivery = MockReminderDelivery::new();
        delivery.expect_deliver().returning(|_| {
            Err(FeeTrackerError::DependencyUnavailable(
                "transport down".to_string(),
            ))
        });

        let sent = drain_outbox(&db, &delivery, None).await.unwrap();
        assert_eq!(sent, 0);
        assert_eq!(db.get_pending_reminders(None).unwrap().len(), 1);
    }
}
