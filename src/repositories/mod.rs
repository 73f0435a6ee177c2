pub mod stage_cost_store;

pub use stage_cost_store::{CasError, RecordKey, RecordStore, StageCostStore};
