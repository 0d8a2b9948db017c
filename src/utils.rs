use colored::Colorize;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::storage::models::WaiverStatus;

/// Round a monetary amount to 2 decimal places, half-up.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Format an amount for display
pub fn format_money(amount: Decimal) -> String {
    format!("{:.2}", round_money(amount)).yellow().to_string()
}

pub fn format_date(date: &chrono::NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Status with the color scheme used across the CLI output
pub fn format_status(status: WaiverStatus) -> String {
    let s = status.to_string();
    match status {
        WaiverStatus::Pending => s.cyan().to_string(),
        WaiverStatus::Waived => s.green().to_string(),
        WaiverStatus::Paid => s.blue().to_string(),
        WaiverStatus::Overdue => s.red().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_up_at_two_decimals() {
        assert_eq!(round_money(Decimal::new(12345, 3)), Decimal::new(1235, 2)); // 12.345 -> 12.35
        assert_eq!(round_money(Decimal::new(12344, 3)), Decimal::new(1234, 2)); // 12.344 -> 12.34
        assert_eq!(round_money(Decimal::new(1005, 3)), Decimal::new(101, 2)); // 1.005 -> 1.01
    }
}
