use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an accounting window, e.g. "2026-08".
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeriodId(pub String);

impl fmt::Display for PeriodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeriodId {
    fn from(value: &str) -> Self {
        PeriodId(value.to_string())
    }
}

/// The accounting window under which stage costs accumulate before closing.
///
/// Once a period is closed no stage record under it can be reopened or
/// created; corrections go to a new period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WipPeriod {
    pub id: PeriodId,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub closed: bool,
}
