//! Cost variance: standard vs. actual per component, favorable positive.

use metrics::counter;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::errors::CostingError;
use crate::models::{CostVarianceRecord, PeriodId, StandardCost};
use crate::repositories::RecordStore;

#[derive(Clone)]
pub struct VarianceService {
    store: Arc<dyn RecordStore>,
}

impl VarianceService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Compares the stage record's actual costs against a standard.
    ///
    /// `variance = standard - actual` per component, each independently
    /// signed. Closed records are the intended feed; an open record still
    /// computes (a preview) but is flagged in the log. Transferred-in cost
    /// is excluded; it was already subject to variance at its own stage.
    #[instrument(skip(self, standard))]
    pub fn compute_cost_variance(
        &self,
        mo_id: Uuid,
        stage_id: Uuid,
        period: &PeriodId,
        standard: StandardCost,
    ) -> Result<CostVarianceRecord, CostingError> {
        let record = self
            .store
            .get(&(mo_id, stage_id, period.clone()))
            .ok_or_else(|| {
                CostingError::NotFound(format!(
                    "No stage cost record for order {} stage {} period {}",
                    mo_id, stage_id, period
                ))
            })?;

        if !record.closed {
            warn!(%stage_id, %period, "variance computed over an open record");
        }

        let material_variance = standard.material - record.material_cost;
        let labor_variance = standard.labor - record.labor_cost;
        let overhead_variance = standard.overhead - record.overhead_cost;

        counter!("costing.variance.computed", 1);
        Ok(CostVarianceRecord {
            stage_id,
            period: period.clone(),
            standard,
            actual_material: record.material_cost,
            actual_labor: record.labor_cost,
            actual_overhead: record.overhead_cost,
            material_variance,
            labor_variance,
            overhead_variance,
            total_variance: material_variance + labor_variance + overhead_variance,
        })
    }
}

/// Rolls up variances across stages, weighted by each stage's actual cost.
/// Cost rollups weight by cost; returns zero for an empty input.
pub fn rollup_cost_variance(records: &[CostVarianceRecord]) -> Decimal {
    let total_weight: Decimal = records.iter().map(|r| r.actual_total()).sum();
    if total_weight.is_zero() {
        return Decimal::ZERO;
    }
    let weighted: Decimal = records
        .iter()
        .map(|r| r.total_variance * r.actual_total())
        .sum();
    weighted / total_weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn variance_record(total_variance: Decimal, actual: Decimal) -> CostVarianceRecord {
        CostVarianceRecord {
            stage_id: Uuid::new_v4(),
            period: PeriodId::from("2026-08"),
            standard: StandardCost {
                material: Decimal::ZERO,
                labor: Decimal::ZERO,
                overhead: Decimal::ZERO,
            },
            actual_material: actual,
            actual_labor: Decimal::ZERO,
            actual_overhead: Decimal::ZERO,
            material_variance: total_variance,
            labor_variance: Decimal::ZERO,
            overhead_variance: Decimal::ZERO,
            total_variance,
        }
    }

    #[test]
    fn rollup_weights_by_actual_cost() {
        let records = [
            variance_record(dec!(10), dec!(100)),
            variance_record(dec!(-20), dec!(300)),
        ];
        // (10*100 + -20*300) / 400 = -12.5
        assert_eq!(rollup_cost_variance(&records), dec!(-12.5));
    }

    #[test]
    fn rollup_of_nothing_is_zero() {
        assert_eq!(rollup_cost_variance(&[]), Decimal::ZERO);
    }
}
