//! Costing Engine Library
//!
//! Stage-based process-costing and manufacturing-efficiency engine:
//! accumulates cost across sequential production stages, allocates labor and
//! overhead, closes work-in-process periods, and derives variance and OEE
//! metrics. Invoked in-process by the surrounding service layer; it owns no
//! wire protocol and no persistence beyond its record arena.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod money;
pub mod repositories;
pub mod services;

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::events::AuditSender;
use crate::models::{ManufacturingOrder, Stage, WipPeriod};
use crate::repositories::StageCostStore;
use crate::services::{
    LaborAllocationService, OeeService, OverheadAllocationService, PeriodCloseService,
    StageCostService, VarianceService,
};

/// The assembled engine: record store plus the services operating on it.
///
/// All collaborators are constructor-passed; there are no ambient
/// singletons. Clone freely: the store is shared behind an `Arc` and every
/// service is cheap to clone.
#[derive(Clone)]
pub struct CostingEngine {
    config: EngineConfig,
    store: Arc<StageCostStore>,
    stage_costs: Arc<StageCostService>,
    labor: Arc<LaborAllocationService>,
    overhead: Arc<OverheadAllocationService>,
    closer: Arc<PeriodCloseService>,
    variance: Arc<VarianceService>,
    oee: Arc<OeeService>,
}

impl CostingEngine {
    /// Wires an engine over a fresh store. Pass `None` for `audit` to run
    /// without an audit collaborator; mutations still succeed (audit is
    /// best-effort by contract).
    pub fn new(config: EngineConfig, audit: Option<AuditSender>) -> Self {
        let store = Arc::new(StageCostStore::new());
        let stage_costs = Arc::new(StageCostService::new(
            store.clone(),
            config.clone(),
            audit.clone(),
        ));
        let labor = Arc::new(LaborAllocationService::new(
            stage_costs.clone(),
            audit.clone(),
        ));
        let overhead = Arc::new(OverheadAllocationService::new(
            stage_costs.clone(),
            audit.clone(),
        ));
        let closer = Arc::new(PeriodCloseService::new(
            store.clone(),
            config.clone(),
            audit,
        ));
        let variance = Arc::new(VarianceService::new(store.clone()));
        Self {
            config,
            store,
            stage_costs,
            labor,
            overhead,
            closer,
            variance,
            oee: Arc::new(OeeService::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registers a routing stage (read-only input from the manufacturing
    /// subsystem).
    pub fn register_stage(&self, stage: Stage) {
        self.store.register_stage(stage);
    }

    /// Caches a manufacturing-order snapshot; allocations against orders
    /// known to be in a terminal or draft status are rejected.
    pub fn register_order(&self, order: ManufacturingOrder) {
        self.store.register_order(order);
    }

    /// Registers an accounting period from the period calendar.
    pub fn register_period(&self, period: WipPeriod) {
        self.store.register_period(period);
    }

    pub fn stage_cost_service(&self) -> Arc<StageCostService> {
        self.stage_costs.clone()
    }

    pub fn labor_service(&self) -> Arc<LaborAllocationService> {
        self.labor.clone()
    }

    pub fn overhead_service(&self) -> Arc<OverheadAllocationService> {
        self.overhead.clone()
    }

    pub fn period_close_service(&self) -> Arc<PeriodCloseService> {
        self.closer.clone()
    }

    pub fn variance_service(&self) -> Arc<VarianceService> {
        self.variance.clone()
    }

    pub fn oee_service(&self) -> Arc<OeeService> {
        self.oee.clone()
    }
}
