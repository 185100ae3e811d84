use serde::{Deserialize, Serialize};

use crate::EngineError;

/// ISO currency code of a recurring resource and its periods.
///
/// ## Minor units
///
/// Every amount the engine persists is an `i64` number of **minor units**
/// (see [`Money`](crate::Money)). `minor_units()` returns how many decimal
/// digits separate major units (user input, e.g. `10.50 USD`) from stored
/// integers (e.g. `1050`).
///
/// Allocation results are fractional until persistence; they are rounded to
/// this precision exactly once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Eur,
}

impl Currency {
    /// Canonical currency code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
        }
    }

    /// Number of fraction digits used when formatting/parsing amounts.
    #[must_use]
    pub const fn minor_units(self) -> u8 {
        match self {
            Currency::Usd | Currency::Eur => 2,
        }
    }

    /// Number of minor units in one major unit (`100` for cents).
    #[must_use]
    pub const fn minor_per_major(self) -> i64 {
        10_i64.pow(self.minor_units() as u32)
    }

    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Currency::Usd => "$",
            Currency::Eur => "€",
        }
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

impl TryFrom<&str> for Currency {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            other => Err(EngineError::InvalidField(format!(
                "unsupported currency: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codes_case_insensitively() {
        assert_eq!(Currency::try_from("usd").unwrap(), Currency::Usd);
        assert_eq!(Currency::try_from(" EUR ").unwrap(), Currency::Eur);
        assert!(Currency::try_from("GBP").is_err());
    }

    #[test]
    fn minor_per_major_is_cents() {
        assert_eq!(Currency::Usd.minor_per_major(), 100);
    }
}
