use chrono::{NaiveDate, Utc};

/// Source of "today" for due-date comparisons. Injected everywhere instead of
/// reading the system clock so time-crossing scenarios are testable.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Wall-clock implementation used by the CLI and batch service.
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Clock pinned to one date, for batch runs with a `--date` override.
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
