use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Granularity of a source period.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodType {
    Weekly,
    BiMonthly,
    Monthly,
}

impl PeriodType {
    pub const ALL: [PeriodType; 3] = [Self::Monthly, Self::BiMonthly, Self::Weekly];

    /// Storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::BiMonthly => "bi_monthly",
            Self::Monthly => "monthly",
        }
    }

    /// Infix used in source period ids (`2025W01`, `2025BM01A`, `2025M01`).
    pub fn id_code(self) -> &'static str {
        match self {
            Self::Weekly => "W",
            Self::BiMonthly => "BM",
            Self::Monthly => "M",
        }
    }
}

impl core::fmt::Display for PeriodType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for PeriodType {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "weekly" => Ok(Self::Weekly),
            "bi_monthly" | "bimonthly" | "bi-monthly" => Ok(Self::BiMonthly),
            "monthly" => Ok(Self::Monthly),
            other => Err(EngineError::InvalidField(format!(
                "invalid period type: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_storage_and_wire_spellings() {
        assert_eq!(PeriodType::try_from("weekly").unwrap(), PeriodType::Weekly);
        assert_eq!(PeriodType::try_from("BI_MONTHLY").unwrap(), PeriodType::BiMonthly);
        assert_eq!(PeriodType::try_from("Monthly").unwrap(), PeriodType::Monthly);
        assert!(PeriodType::try_from("daily").is_err());
    }
}
