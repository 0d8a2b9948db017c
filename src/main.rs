mod cli;

use std::sync::Arc;

use chrono::NaiveDate;
use clap::Parser;
use colored::*;
use tracing::{error, info};

use cli::{Cli, Commands};
use fee_tracker::{
    catalog::{FeeRule, FeeType},
    clock::{Clock, FixedClock, SystemClock},
    error::Result,
    ledger::SqliteLedger,
    reminders::{self, LoggingDelivery, ReminderGenerator},
    storage::Database,
    utils,
    waiver::{BatchRunner, FeeWaiverService, ProgressEvaluator, Transition},
    Config,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("fee_tracker=debug,info")
        .init();

    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Init => initialize(&config),

        Commands::AddRule {
            name,
            fee_type,
            base_fee,
            condition,
            period_months,
        } => add_rule(&config, name, &fee_type, base_fee, condition, period_months),

        Commands::OpenYear { card, rule, start } => open_year(&config, card, rule, start),

        Commands::RollYear { card } => roll_year(&config, card),

        Commands::Run { date, dry_run } => run_daily(&config, date, dry_run).await,

        Commands::Pay { card, year, date } => pay(&config, card, year, date),

        Commands::Progress { card, year } => show_progress(&config, card, year).await,

        Commands::RecordTxn { card, amount, date } => record_txn(&config, card, amount, date),

        Commands::SetPoints { card, points } => set_points(&config, card, points),

        Commands::Deliver { limit } => deliver(&config, limit).await,

        Commands::Ack { reminder } => ack(&config, reminder),

        Commands::Stats { format } => show_stats(&config, &format),
    };

    if let Err(e) = result {
        error!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

fn build_service(config: &Config) -> Result<FeeWaiverService> {
    let db = Database::new(&config.database.path)?;
    let ledger = Arc::new(SqliteLedger::open(&config.database.path)?);
    let evaluator = ProgressEvaluator::new(ledger.clone(), ledger);
    let generator = ReminderGenerator::new(config.sorted_thresholds());
    Ok(FeeWaiverService::new(
        db,
        evaluator,
        generator,
        config.waiver.max_transition_retries,
    ))
}

fn clock_for(date: Option<NaiveDate>) -> Box<dyn Clock> {
    match date {
        Some(d) => Box::new(FixedClock(d)),
        None => Box::new(SystemClock),
    }
}

fn initialize(config: &Config) -> Result<()> {
    let _db = Database::new(&config.database.path)?;
    let _ledger = SqliteLedger::open(&config.database.path)?;
    println!("{}", "✓ Database initialized".green());
    println!("\n{}", "Configuration:".cyan());
    println!("  Database:          {}", config.database.path);
    println!(
        "  Reminder steps:    {:?} days before due",
        config.reminders.due_soon_thresholds
    );
    println!(
        "  Conflict retries:  {}",
        config.waiver.max_transition_retries
    );
    Ok(())
}

fn add_rule(
    config: &Config,
    name: String,
    fee_type: &str,
    base_fee: rust_decimal::Decimal,
    condition: rust_decimal::Decimal,
    period_months: u32,
) -> Result<()> {
    let db = Database::new(&config.database.path)?;
    let rule = FeeRule {
        id: 0,
        name,
        fee_type: fee_type.parse::<FeeType>()?,
        base_fee,
        waiver_condition_value: condition,
        waiver_period_months: period_months,
    };
    let id = db.insert_rule(&rule)?;
    println!("✓ Rule {} registered: {} ({})", id, rule.name, rule.fee_type);
    Ok(())
}

fn open_year(config: &Config, card: i64, rule: i64, start: NaiveDate) -> Result<()> {
    let service = build_service(config)?;
    let record = service.open_fee_year(card, rule, start)?;
    println!(
        "✓ Fee year {} opened for card {} | fee {} due {}",
        record.fee_year,
        card,
        utils::format_money(record.fee_amount),
        utils::format_date(&record.due_date)
    );
    Ok(())
}

fn roll_year(config: &Config, card: i64) -> Result<()> {
    let service = build_service(config)?;
    let record = service.open_next_year(card)?;
    println!(
        "✓ Card {} rolled into fee year {} (due {})",
        card,
        record.fee_year,
        utils::format_date(&record.due_date)
    );
    Ok(())
}

async fn run_daily(config: &Config, date: Option<NaiveDate>, dry_run: bool) -> Result<()> {
    let service = build_service(config)?.with_dry_run(dry_run);
    let runner = BatchRunner::new(
        service,
        config.waiver.batch_size,
        config.waiver.batch_delay_ms,
    );
    let clock = clock_for(date);

    if dry_run {
        println!("{}", "DRY RUN: no changes will be written".yellow());
    }

    let summary = runner.run_daily(clock.as_ref()).await?;
    summary.print_summary();
    Ok(())
}

fn pay(config: &Config, card: i64, year: i32, date: Option<NaiveDate>) -> Result<()> {
    let service = build_service(config)?;
    let payment_date = date.unwrap_or_else(|| SystemClock.today());

    match service.confirm_payment(card, year, payment_date)? {
        Transition::Paid => {
            println!(
                "✓ Payment recorded for card {} fee year {} ({})",
                card,
                year,
                utils::format_date(&payment_date)
            );
        }
        _ => {
            println!("{}", "Fee was already paid; nothing to do".yellow());
        }
    }
    Ok(())
}

async fn show_progress(config: &Config, card: i64, year: i32) -> Result<()> {
    let service = build_service(config)?;
    let record = service.get_fee_record(card, year)?;
    let clock = SystemClock;
    let progress = service.get_waiver_progress(record.id, &clock).await?;

    println!("{}", format!("Card {} - fee year {}", card, year).cyan().bold());
    println!("  Status:          {}", utils::format_status(record.waiver_status));
    println!("  Fee amount:      {}", utils::format_money(record.fee_amount));
    println!("  Due date:        {}", utils::format_date(&record.due_date));
    println!("  Progress:        {} / {}", progress.progress, progress.threshold);
    println!(
        "  Condition met:   {}",
        if progress.met { "yes".green() } else { "no".red() }
    );
    println!("  Days remaining:  {}", progress.days_remaining);
    if let Some(paid) = record.payment_date {
        println!("  Paid on:         {}", utils::format_date(&paid));
    }
    Ok(())
}

fn record_txn(
    config: &Config,
    card: i64,
    amount: rust_decimal::Decimal,
    date: Option<NaiveDate>,
) -> Result<()> {
    let ledger = SqliteLedger::open(&config.database.path)?;
    let txn_date = date.unwrap_or_else(|| SystemClock.today());
    ledger.record_transaction(card, txn_date, amount)?;
    println!(
        "✓ Transaction of {} recorded for card {} on {}",
        utils::format_money(amount),
        card,
        utils::format_date(&txn_date)
    );
    Ok(())
}

fn set_points(config: &Config, card: i64, points: i64) -> Result<()> {
    let ledger = SqliteLedger::open(&config.database.path)?;
    ledger.set_points(card, points)?;
    println!("✓ Points balance for card {} set to {}", card, points);
    Ok(())
}

async fn deliver(config: &Config, limit: Option<usize>) -> Result<()> {
    let db = Database::new(&config.database.path)?;
    let sent = reminders::outbox::drain_outbox(&db, &LoggingDelivery, limit).await?;
    info!("Delivered {} reminder(s)", sent);
    println!("✓ {} reminder(s) handed to delivery", sent);
    Ok(())
}

fn ack(config: &Config, reminder: i64) -> Result<()> {
    let db = Database::new(&config.database.path)?;
    db.mark_reminder_read(reminder)?;
    println!("✓ Reminder {} marked as read", reminder);
    Ok(())
}

fn show_stats(config: &Config, format: &str) -> Result<()> {
    let db = Database::new(&config.database.path)?;
    let stats = db.get_stats()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", "=== Annual Fee Tracker Statistics ===".cyan().bold());
    println!("\nFee records:");
    println!("  Total:      {}", stats.total_fee_records);
    println!("  Pending:    {}", stats.pending.to_string().cyan());
    println!("  Waived:     {}", stats.waived.to_string().green());
    println!("  Paid:       {}", stats.paid.to_string().blue());
    println!("  Overdue:    {}", stats.overdue.to_string().red());

    println!("\nReminders:");
    println!("  Total:      {}", stats.total_reminders);
    println!("  Pending:    {}", stats.pending_reminders);
    Ok(())
}
