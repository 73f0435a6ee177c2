use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle status of a manufacturing order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MfgOrderStatus {
    Draft,
    InProgress,
    Completed,
    Cancelled,
}

/// A production run, owned by the manufacturing-order subsystem.
///
/// The costing engine reads these and never mutates them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManufacturingOrder {
    pub id: Uuid,
    pub order_number: String,
    pub item_id: Uuid,
    pub target_quantity: Decimal,
    pub status: MfgOrderStatus,
}
