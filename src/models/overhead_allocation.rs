use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::PeriodId;

/// How an overhead rate is applied to a stage/period.
///
/// External configuration carries these as strings; parsing an unknown
/// method fails at the boundary and is mapped to an invalid-input error.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationMethod {
    /// amount = labor hours x rate
    PerHour,
    /// amount = units x rate
    PerUnit,
    /// amount = labor cost x rate, rate expressed as a fraction
    PercentOfLabor,
}

/// A single application of an overhead rate to a stage/period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverheadAllocation {
    pub id: Uuid,
    pub stage_id: Uuid,
    pub period: PeriodId,
    pub method: AllocationMethod,
    pub base_quantity: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn methods_round_trip_through_strings() {
        for method in [
            AllocationMethod::PerHour,
            AllocationMethod::PerUnit,
            AllocationMethod::PercentOfLabor,
        ] {
            let parsed = AllocationMethod::from_str(&method.to_string()).unwrap();
            assert_eq!(parsed, method);
        }
    }

    #[test]
    fn unknown_method_is_rejected() {
        assert!(AllocationMethod::from_str("PER_MACHINE").is_err());
    }
}
