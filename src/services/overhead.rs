//! Overhead allocation: applies a configured overhead rate to a
//! stage/period. Resolving which method and rate to use is a configuration
//! concern of the stage or work center; the computation here is pure.

use metrics::{counter, histogram};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::CostingError;
use crate::events::{AuditEvent, AuditSender};
use crate::models::{AllocationMethod, CostDelta, OverheadAllocation, PeriodId, StageCostRecord};
use crate::services::stage_costs::StageCostService;

/// Parses an allocation method from stage/work-center configuration.
/// Unknown method tags are an input error, caught before any computation.
pub fn parse_method(tag: &str) -> Result<AllocationMethod, CostingError> {
    tag.parse::<AllocationMethod>()
        .map_err(|_| CostingError::InvalidInput(format!("Unknown allocation method: {}", tag)))
}

/// Computes the overhead amount for already-resolved parameters.
///
/// `labor_cost_basis` only matters for the percent-of-labor method, where
/// the rate is a fraction of the accumulated labor cost.
pub fn compute_overhead(
    method: AllocationMethod,
    base_quantity: Decimal,
    rate: Decimal,
    labor_cost_basis: Decimal,
) -> Result<Decimal, CostingError> {
    if base_quantity.is_sign_negative() {
        return Err(CostingError::InvalidInput(format!(
            "Overhead base quantity must be non-negative, got: {}",
            base_quantity
        )));
    }
    if rate.is_sign_negative() {
        return Err(CostingError::InvalidInput(format!(
            "Overhead rate must be non-negative, got: {}",
            rate
        )));
    }

    let amount = match method {
        AllocationMethod::PerHour | AllocationMethod::PerUnit => base_quantity * rate,
        AllocationMethod::PercentOfLabor => labor_cost_basis * rate,
    };
    Ok(amount)
}

#[derive(Clone)]
pub struct OverheadAllocationService {
    stage_costs: Arc<StageCostService>,
    audit: Option<AuditSender>,
}

impl OverheadAllocationService {
    pub fn new(stage_costs: Arc<StageCostService>, audit: Option<AuditSender>) -> Self {
        Self { stage_costs, audit }
    }

    /// Applies one overhead allocation to the stage's open record.
    ///
    /// For percent-of-labor the basis is the labor cost accumulated so far
    /// on the record (zero when no record exists yet). `allocation_id` is
    /// the source id; re-applying it is a no-op.
    #[instrument(skip(self))]
    pub async fn apply_overhead(
        &self,
        mo_id: Uuid,
        stage_id: Uuid,
        period: &PeriodId,
        allocation_id: Uuid,
        method: AllocationMethod,
        base_quantity: Decimal,
        rate: Decimal,
    ) -> Result<StageCostRecord, CostingError> {
        let labor_basis = self
            .stage_costs
            .get_stage_costs(mo_id)
            .into_iter()
            .find(|r| r.stage_id == stage_id && &r.period == period)
            .map(|r| r.labor_cost)
            .unwrap_or(Decimal::ZERO);

        let allocation = OverheadAllocation {
            id: allocation_id,
            stage_id,
            period: period.clone(),
            method,
            base_quantity,
            rate,
            amount: compute_overhead(method, base_quantity, rate, labor_basis)?,
        };

        let record = self
            .stage_costs
            .upsert_stage_cost(
                mo_id,
                stage_id,
                period,
                CostDelta::Overhead {
                    dedup_key: format!("overhead:{}", allocation.id),
                    amount: allocation.amount,
                },
            )
            .await?;

        counter!("costing.overhead.applications", 1);
        histogram!(
            "costing.overhead.amount",
            allocation.amount.to_f64().unwrap_or(0.0)
        );

        if let Some(sender) = &self.audit {
            sender
                .send_or_log(AuditEvent::OverheadApplied {
                    mo_id,
                    stage_id,
                    period: period.clone(),
                    allocation_id: allocation.id,
                    method: allocation.method,
                    amount: allocation.amount,
                    timestamp: chrono::Utc::now(),
                })
                .await;
        }

        info!(%stage_id, %period, %method, amount = %allocation.amount, "overhead applied");
        Ok(record)
    }
}
