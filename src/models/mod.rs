pub mod labor_time_entry;
pub mod manufacturing_order;
pub mod oee;
pub mod overhead_allocation;
pub mod period;
pub mod stage;
pub mod stage_cost_record;
pub mod variance;

pub use labor_time_entry::LaborTimeEntry;
pub use manufacturing_order::{ManufacturingOrder, MfgOrderStatus};
pub use oee::{OeeRecord, WorkCenterTelemetry};
pub use overhead_allocation::{AllocationMethod, OverheadAllocation};
pub use period::{PeriodId, WipPeriod};
pub use stage::Stage;
pub use stage_cost_record::{CostComponent, CostDelta, LaborPortion, StageCostRecord};
pub use variance::{CostVarianceRecord, StandardCost};
