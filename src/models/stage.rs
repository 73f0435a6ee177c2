use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One step in a production routing (cutting, assembly, ...).
///
/// `sequence` defines the transfer order: closed cost flows from the stage
/// with the next-lower sequence into this one. The stage with the lowest
/// registered sequence is the first stage and receives no transferred-in
/// cost.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: Uuid,
    pub sequence: u32,
    pub work_center_id: Uuid,
    pub standard_labor_rate: Decimal,
    pub standard_overhead_rate: Decimal,
}
