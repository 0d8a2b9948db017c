pub mod generator;
pub mod outbox;

pub use generator::ReminderGenerator;
pub use outbox::{LoggingDelivery, ReminderDelivery};
