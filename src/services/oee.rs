//! Overall Equipment Effectiveness: availability x performance x quality,
//! per work center per period.

use metrics::counter;
use rust_decimal::Decimal;
use tracing::instrument;
use uuid::Uuid;

use crate::money::clamp_ratio;
use crate::models::{OeeRecord, PeriodId, WorkCenterTelemetry};

#[derive(Clone, Default)]
pub struct OeeService;

impl OeeService {
    pub fn new() -> Self {
        Self
    }

    /// Derives an OEE record from raw work-center telemetry.
    ///
    /// availability = (planned - downtime) / planned
    /// performance  = standard time for actual output / actual run time
    /// quality      = good units / total units
    ///
    /// Each ratio is clamped into [0, 1] before multiplication, so logging
    /// skew (run time over planned, counts over totals) degrades gracefully
    /// instead of producing ratios above 1 or below 0. A zero denominator
    /// yields a zero ratio: a measurement gap zeroes the metric rather than
    /// failing the report.
    #[instrument(skip(self, telemetry))]
    pub fn compute_oee(
        &self,
        work_center_id: Uuid,
        period: &PeriodId,
        telemetry: &WorkCenterTelemetry,
    ) -> OeeRecord {
        let availability = ratio(
            telemetry.planned_time_hours - telemetry.downtime_hours,
            telemetry.planned_time_hours,
        );
        let performance = ratio(
            telemetry.standard_time_for_output_hours,
            telemetry.actual_run_time_hours,
        );
        let quality = ratio(telemetry.good_units, telemetry.total_units);

        counter!("costing.oee.computed", 1);
        OeeRecord {
            work_center_id,
            period: period.clone(),
            availability,
            performance,
            quality,
            oee: availability * performance * quality,
        }
    }
}

fn ratio(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    clamp_ratio(numerator / denominator)
}

/// Rolls up efficiency-style ratios across work centers or stages,
/// weighted by standard hours. Returns zero for an empty input.
pub fn rollup_efficiency(ratios_with_standard_hours: &[(Decimal, Decimal)]) -> Decimal {
    let total_weight: Decimal = ratios_with_standard_hours.iter().map(|(_, h)| *h).sum();
    if total_weight.is_zero() {
        return Decimal::ZERO;
    }
    let weighted: Decimal = ratios_with_standard_hours
        .iter()
        .map(|(r, h)| *r * *h)
        .sum();
    weighted / total_weight
}
