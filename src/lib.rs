pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod reminders;
pub mod storage;
pub mod utils;
pub mod waiver;

pub use config::Config;
pub use error::{FeeTrackerError, Result};
