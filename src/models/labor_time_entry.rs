use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::PeriodId;

/// A recorded labor booking against a stage/period.
///
/// `rate_at_booking` is the labor rate snapshot taken when the time was
/// recorded. Allocation always uses this snapshot, not the stage's current
/// standard rate, so mid-period rate changes do not rewrite history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
pub struct LaborTimeEntry {
    pub id: Uuid,
    pub stage_id: Uuid,
    pub period: PeriodId,
    pub worker_id: Uuid,
    pub work_center_id: Uuid,
    #[validate(custom = "non_negative")]
    pub hours: Decimal,
    #[validate(custom = "non_negative")]
    pub rate_at_booking: Decimal,
}

fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::new("negative"));
    }
    Ok(())
}

impl LaborTimeEntry {
    /// Cost contribution of this single booking.
    pub fn amount(&self) -> Decimal {
        self.hours * self.rate_at_booking
    }
}
