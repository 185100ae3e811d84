//! Internal helpers for input validation and normalization.
//!
//! These utilities are **not** part of the public API. They centralize the
//! bounds enforced on user input so every write path applies the same rules.

use unicode_normalization::UnicodeNormalization;

use crate::{
    Currency, EngineError, Money, ResultEngine,
    resources::{Frequency, ResourceDetails},
};

/// Longest accepted resource name, in characters.
pub(crate) const MAX_NAME_CHARS: usize = 200;
/// Largest accepted base amount, in major units.
pub(crate) const MAX_AMOUNT_MAJOR: i64 = 1_000_000;

/// NFC-normalizes, trims and collapses inner whitespace.
pub(crate) fn normalize_display(value: &str) -> String {
    let composed: String = value.nfc().collect();
    composed.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn normalize_required_name(value: &str, label: &str) -> ResultEngine<String> {
    let name = normalize_display(value);
    if name.is_empty() {
        return Err(EngineError::InvalidField(format!(
            "{label} name must not be empty"
        )));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(EngineError::InvalidField(format!(
            "{label} name must be at most {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(name)
}

pub(crate) fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value.map(normalize_display).filter(|s| !s.is_empty())
}

/// Base amounts must lie in `(0, 1_000_000]` major units.
pub(crate) fn validate_base_amount(amount: Money, currency: Currency) -> ResultEngine<()> {
    let max = MAX_AMOUNT_MAJOR * currency.minor_per_major();
    if !amount.is_positive() || amount.minor() > max {
        return Err(EngineError::InvalidAmount(format!(
            "amount must be greater than 0 and at most {}",
            Money::new(max).display(currency)
        )));
    }
    Ok(())
}

pub(crate) fn validate_details(details: &ResourceDetails, frequency: Frequency) -> ResultEngine<()> {
    match details {
        ResourceDetails::Budget {
            is_system_everything_else: true,
            ..
        } => Err(EngineError::InvalidField(
            "the everything-else budget is managed by the system".to_string(),
        )),
        ResourceDetails::Outflow {
            due_day: Some(day),
            ..
        } if frequency == Frequency::Monthly && !(1..=31).contains(day) => Err(
            EngineError::InvalidField("due day must be between 1 and 31".to_string()),
        ),
        _ => Ok(()),
    }
}
