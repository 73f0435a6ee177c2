use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PeriodId;

/// Raw production telemetry for one work center over one period, as
/// reported by the work-order execution subsystem. Values arrive noisy
/// (run time can exceed planned time by logging skew); the OEE calculator
/// clamps the derived ratios rather than trusting these blindly.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkCenterTelemetry {
    pub planned_time_hours: Decimal,
    pub downtime_hours: Decimal,
    pub standard_time_for_output_hours: Decimal,
    pub actual_run_time_hours: Decimal,
    pub good_units: Decimal,
    pub total_units: Decimal,
}

/// Overall Equipment Effectiveness for one work center over one period.
/// Every ratio, and therefore their product, lies in [0, 1].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OeeRecord {
    pub work_center_id: Uuid,
    pub period: PeriodId,
    pub availability: Decimal,
    pub performance: Decimal,
    pub quality: Decimal,
    pub oee: Decimal,
}
