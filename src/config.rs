use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub waiver: WaiverConfig,
    #[serde(default)]
    pub reminders: ReminderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WaiverConfig {
    /// Retries for an optimistic-version conflict before surfacing it.
    pub max_transition_retries: u32,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReminderConfig {
    /// Due-date proximity thresholds in days, e.g. [30, 15, 7, 3, 0].
    pub due_soon_thresholds: Vec<i64>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::Environment::with_prefix("FEEBOT").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Thresholds sorted ascending so the tightest crossed one is found first.
    pub fn sorted_thresholds(&self) -> Vec<i64> {
        let mut thresholds = self.reminders.due_soon_thresholds.clone();
        thresholds.sort_unstable();
        thresholds.dedup();
        thresholds
    }
}

impl Default for WaiverConfig {
    fn default() -> Self {
        Self {
            max_transition_retries: 3,
            batch_size: 50,
            batch_delay_ms: 0,
        }
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            due_soon_thresholds: vec![30, 15, 7, 3, 0],
        }
    }
}
