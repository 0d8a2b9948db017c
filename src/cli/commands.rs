use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

#[derive(Parser)]
#[command(name = "fee-tracker")]
#[command(about = "Annual fee waiver tracking and reminder generation for registered cards")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and print the loaded configuration
    Init,

    /// Register a fee waiver rule
    AddRule {
        /// Rule name, e.g. "Platinum annual"
        name: String,

        /// Fee type: Rigid, TransactionCount, TransactionAmount, PointsExchange
        #[arg(short, long)]
        fee_type: String,

        /// Annual fee amount
        #[arg(short, long)]
        base_fee: Decimal,

        /// Waiver threshold (count, amount, or points; ignored for Rigid)
        #[arg(short = 'c', long, default_value = "0")]
        condition: Decimal,

        /// Evaluation window in months
        #[arg(short, long, default_value = "12")]
        period_months: u32,
    },

    /// Open a card's fee year (card activation or anniversary)
    OpenYear {
        /// Card id
        card: i64,

        /// Fee rule id
        #[arg(short, long)]
        rule: i64,

        /// Cycle start date (activation anniversary), YYYY-MM-DD
        #[arg(short, long)]
        start: NaiveDate,
    },

    /// Roll a card into its next fee year from the prior due date
    RollYear {
        /// Card id
        card: i64,
    },

    /// Run the daily waiver batch: evaluate, transition, generate reminders
    Run {
        /// Evaluate as of this date instead of today, YYYY-MM-DD
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Report would-be transitions and reminders without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Record a payment confirmation for a fee year
    Pay {
        /// Card id
        card: i64,

        /// Fee year
        #[arg(short, long)]
        year: i32,

        /// Payment date, YYYY-MM-DD (defaults to today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Show waiver progress for a card's fee year
    Progress {
        /// Card id
        card: i64,

        /// Fee year
        #[arg(short, long)]
        year: i32,
    },

    /// Record a qualifying transaction in the demo ledger
    RecordTxn {
        /// Card id
        card: i64,

        /// Transaction amount
        #[arg(short, long)]
        amount: Decimal,

        /// Transaction date, YYYY-MM-DD (defaults to today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Set a card's points balance in the demo ledger
    SetPoints {
        /// Card id
        card: i64,

        /// Points balance
        points: i64,
    },

    /// Drain pending reminders through the delivery transport
    Deliver {
        /// Maximum reminders to deliver in one drain
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Mark a reminder as read (user acknowledgment)
    Ack {
        /// Reminder id
        reminder: i64,
    },

    /// Show fee record and reminder statistics
    Stats {
        /// Output format: table or json
        #[arg(short, long, default_value = "table")]
        format: String,
    },
}
