//! Fixed-precision money and quantity helpers.
//!
//! All arithmetic in the engine runs on [`rust_decimal::Decimal`], which is
//! immune to binary floating-point rounding error. Rounding to the currency's
//! minimal unit happens only at record boundaries (when a stage record is
//! closed), never mid-calculation.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Rounds a monetary amount half-up to the currency's minimal unit.
pub fn round_money(amount: Decimal, scale: u32) -> Decimal {
    amount.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// One minimal currency unit at the given scale (0.01 for scale 2).
pub fn minimal_unit(scale: u32) -> Decimal {
    Decimal::new(1, scale)
}

/// Clamps a measured ratio into [0, 1].
///
/// Logging skew can record run time slightly over planned time or counts
/// slightly over totals; clamping absorbs that noise instead of letting
/// ratios above 1 or below 0 reach reports.
pub fn clamp_ratio(ratio: Decimal) -> Decimal {
    ratio.clamp(Decimal::ZERO, Decimal::ONE)
}

/// Per-unit cost of a stage record.
///
/// Division by zero equivalent units yields `Undefined`, a reportable value,
/// not an error and not a silently wrong zero. The quotient is kept at full
/// decimal precision so that `unit_cost * equivalent_units` reconciles with
/// `total_cost` for any realistic unit count.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum UnitCost {
    Defined(Decimal),
    Undefined,
}

impl UnitCost {
    pub fn is_defined(&self) -> bool {
        matches!(self, UnitCost::Defined(_))
    }

    pub fn value(&self) -> Option<Decimal> {
        match self {
            UnitCost::Defined(v) => Some(*v),
            UnitCost::Undefined => None,
        }
    }
}

/// Computes total cost per equivalent unit.
pub fn unit_cost(total_cost: Decimal, equivalent_units: Decimal) -> UnitCost {
    if equivalent_units.is_zero() {
        UnitCost::Undefined
    } else {
        UnitCost::Defined(total_cost / equivalent_units)
    }
}

/// Checks that a unit cost multiplied back by its equivalent units lands
/// within one minimal currency unit of the recorded total.
pub fn reconciles(
    unit_cost: &UnitCost,
    equivalent_units: Decimal,
    total_cost: Decimal,
    scale: u32,
) -> bool {
    match unit_cost {
        UnitCost::Undefined => true,
        UnitCost::Defined(per_unit) => {
            let rebuilt = *per_unit * equivalent_units;
            (rebuilt - total_cost).abs() <= minimal_unit(scale)
        }
    }
}
