//! Handles settings for the application. Configuration is written in
//! `settings.toml`; any key can be overridden from the environment with the
//! `CADENCE__` prefix (e.g. `CADENCE__SERVER__PORT=8080`).
//!
//! See `settings.toml` for the configuration.
use config::{Config, ConfigError, Environment, File};
use engine::EngineSettings;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct App {
    pub level: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub bind: Option<String>,
    pub port: u16,
    pub database: Database,
}

/// Monthly maintenance run: period extension, everything-else sweep and
/// status refresh.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Scheduler {
    pub enabled: bool,
    /// Day of the month, 1 to 28.
    pub run_day: u32,
    pub run_hour_utc: u32,
    pub max_run_minutes: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            enabled: true,
            run_day: 1,
            run_hour_utc: 2,
            max_run_minutes: 9,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: App,
    pub server: Option<Server>,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub scheduler: Scheduler,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::with_name("settings"))
            .add_source(Environment::with_prefix("CADENCE").separator("__"))
            .build()?
            .try_deserialize()?;

        if !(1..=28).contains(&settings.scheduler.run_day) {
            return Err(ConfigError::Message(
                "scheduler.run_day must be between 1 and 28".to_string(),
            ));
        }
        if settings.scheduler.run_hour_utc > 23 {
            return Err(ConfigError::Message(
                "scheduler.run_hour_utc must be between 0 and 23".to_string(),
            ));
        }
        Ok(settings)
    }
}
