//! The module contains the error the engine can throw.
//!
//! The errors follow the taxonomy used across the engine:
//!
//! - validation: [`InvalidAmount`], [`InvalidField`], [`InvalidPeriod`];
//! - not found: [`KeyNotFound`], [`MissingCalendar`];
//! - permission: [`Forbidden`];
//! - infrastructure: [`Database`], [`Serialization`].
//!
//! Derived updates (reconciliation, summaries) never surface these to the
//! caller of the primary write: they are logged and left for a backfill.
//!
//!  [`InvalidAmount`]: EngineError::InvalidAmount
//!  [`InvalidField`]: EngineError::InvalidField
//!  [`InvalidPeriod`]: EngineError::InvalidPeriod
//!  [`KeyNotFound`]: EngineError::KeyNotFound
//!  [`MissingCalendar`]: EngineError::MissingCalendar
//!  [`Forbidden`]: EngineError::Forbidden
//!  [`Database`]: EngineError::Database
//!  [`Serialization`]: EngineError::Serialization
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid field: {0}")]
    InvalidField(String),
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Missing calendar: {0}")]
    MissingCalendar(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Returns `true` for errors caused by the request itself (validation,
    /// not found, permission), as opposed to infrastructure failures.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Database(_) | Self::Serialization(_))
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidField(a), Self::InvalidField(b)) => a == b,
            (Self::InvalidPeriod(a), Self::InvalidPeriod(b)) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::MissingCalendar(a), Self::MissingCalendar(b)) => a == b,
            (Self::Forbidden(a), Self::Forbidden(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            (Self::Serialization(a), Self::Serialization(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
