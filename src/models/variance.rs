use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PeriodId;

/// Standard (expected) cost per component for a stage/period.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardCost {
    pub material: Decimal,
    pub labor: Decimal,
    pub overhead: Decimal,
}

impl StandardCost {
    pub fn total(&self) -> Decimal {
        self.material + self.labor + self.overhead
    }
}

/// Standard vs. actual cost for a stage/period, decomposed per component.
///
/// Each variance is `standard - actual`, independently signed: positive
/// means favorable (actual came in under standard).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostVarianceRecord {
    pub stage_id: Uuid,
    pub period: PeriodId,
    pub standard: StandardCost,
    pub actual_material: Decimal,
    pub actual_labor: Decimal,
    pub actual_overhead: Decimal,
    pub material_variance: Decimal,
    pub labor_variance: Decimal,
    pub overhead_variance: Decimal,
    pub total_variance: Decimal,
}

impl CostVarianceRecord {
    pub fn actual_total(&self) -> Decimal {
        self.actual_material + self.actual_labor + self.actual_overhead
    }
}
