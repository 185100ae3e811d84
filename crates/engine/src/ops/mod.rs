use std::time::Duration;

use sea_orm::DatabaseConnection;
use serde::Deserialize;

use crate::{Currency, EngineError, ResultEngine};

mod access;
mod calendar;
mod checklist;
mod extension;
mod occurrences;
mod projection;
mod resources;
mod summaries;
mod totals;
mod transactions;

pub use extension::ExtensionReport;
pub use projection::ProjectionOutcome;
pub use resources::DurationChange;
pub use summaries::BackfillReport;
pub use totals::{TotalsReport, TotalsTarget};

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

/// Tunables of the engine. Every field has a default, so a partial
/// `[engine]` section deserializes.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Rolling window kept materialized ahead of now.
    pub horizon_months: u32,
    /// Most writes committed in one store transaction by batch operations.
    pub batch_chunk_size: usize,
    /// Pause between summary keys during a backfill.
    pub backfill_throttle_ms: u64,
    pub occurrence_tolerance_days: i64,
    pub due_soon_days: i64,
    pub calendar_first_year: i32,
    pub calendar_last_year: i32,
    /// Currency of bootstrapped users and of writes that name none.
    pub currency: Currency,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            horizon_months: 12,
            batch_chunk_size: 500,
            backfill_throttle_ms: 50,
            occurrence_tolerance_days: crate::occurrences::DEFAULT_TOLERANCE_DAYS,
            due_soon_days: 3,
            calendar_first_year: 2023,
            calendar_last_year: 2033,
            currency: Currency::Usd,
        }
    }
}

impl EngineSettings {
    pub fn backfill_throttle(&self) -> Duration {
        Duration::from_millis(self.backfill_throttle_ms)
    }

    fn validate(&self) -> ResultEngine<()> {
        if self.batch_chunk_size == 0 {
            return Err(EngineError::InvalidField(
                "batch_chunk_size must be > 0".to_string(),
            ));
        }
        if self.horizon_months == 0 {
            return Err(EngineError::InvalidField(
                "horizon_months must be > 0".to_string(),
            ));
        }
        if self.occurrence_tolerance_days < 0 || self.due_soon_days < 0 {
            return Err(EngineError::InvalidField(
                "day tolerances must not be negative".to_string(),
            ));
        }
        if self.calendar_first_year > self.calendar_last_year {
            return Err(EngineError::InvalidField(
                "calendar_first_year must not be after calendar_last_year".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    settings: EngineSettings,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    settings: EngineSettings,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Override the default tunables
    pub fn settings(mut self, settings: EngineSettings) -> EngineBuilder {
        self.settings = settings;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        self.settings.validate()?;
        Ok(Engine {
            database: self.database,
            settings: self.settings,
        })
    }
}
