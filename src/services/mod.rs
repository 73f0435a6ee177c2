pub mod labor;
pub mod oee;
pub mod overhead;
pub mod period_close;
pub mod stage_costs;
pub mod variance;

pub use labor::LaborAllocationService;
pub use oee::OeeService;
pub use overhead::OverheadAllocationService;
pub use period_close::PeriodCloseService;
pub use stage_costs::StageCostService;
pub use variance::VarianceService;
