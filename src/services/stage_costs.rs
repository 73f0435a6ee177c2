//! Stage cost aggregation: merges labor/overhead/material deltas into the
//! open record for a (manufacturing order, stage, period) key and keeps the
//! derived fields consistent.

use metrics::counter;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::errors::CostingError;
use crate::events::{snapshot, AuditEvent, AuditSender};
use crate::models::{CostDelta, MfgOrderStatus, PeriodId, Stage, StageCostRecord};
use crate::repositories::{CasError, RecordStore};

#[derive(Clone)]
pub struct StageCostService {
    store: Arc<dyn RecordStore>,
    config: EngineConfig,
    audit: Option<AuditSender>,
}

impl StageCostService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        config: EngineConfig,
        audit: Option<AuditSender>,
    ) -> Self {
        Self {
            store,
            config,
            audit,
        }
    }

    /// Merges a cost or quantity delta into the stage's open record for the
    /// period, recomputing total cost, equivalent units, unit cost, and
    /// efficiency.
    ///
    /// Idempotent under retry: a delta whose dedup key was already applied
    /// is a no-op returning the current record. Conflicting concurrent
    /// writers recompute the merge against the fresh record; after the
    /// bounded retry budget the conflict is surfaced.
    #[instrument(skip(self, delta))]
    pub async fn upsert_stage_cost(
        &self,
        mo_id: Uuid,
        stage_id: Uuid,
        period: &PeriodId,
        delta: CostDelta,
    ) -> Result<StageCostRecord, CostingError> {
        self.store.ensure_period_open(period)?;
        if let Some(order) = self.store.order(mo_id) {
            if matches!(
                order.status,
                MfgOrderStatus::Cancelled | MfgOrderStatus::Draft
            ) {
                return Err(CostingError::InvalidOperation(format!(
                    "Manufacturing order {} is {}, cost cannot accrue",
                    order.order_number, order.status
                )));
            }
        }
        let stage = self.store.stage(stage_id)?;
        let key = (mo_id, stage_id, period.clone());

        for _attempt in 0..self.config.max_write_retries {
            let existing = self.store.get(&key);

            if let Some(record) = &existing {
                if record.closed {
                    warn!(%stage_id, %period, "merge rejected: stage record is closed");
                    return Err(CostingError::StageClosed {
                        stage_id,
                        period: period.clone(),
                    });
                }
                if delta.fully_applied(record) {
                    counter!("costing.stage_costs.deduplicated", 1);
                    info!(%stage_id, %period, "delta already applied, no-op");
                    return Ok(record.clone());
                }
            }

            let (expected_version, mut record) = match existing {
                Some(r) => (r.version, r),
                None => {
                    let transferred_in = self.resolve_transferred_in(&stage, mo_id, period)?;
                    (
                        0,
                        StageCostRecord::open(mo_id, stage_id, period.clone(), transferred_in),
                    )
                }
            };

            let old_values = snapshot(&record);
            record.apply(&delta);
            record.recompute_derived(stage.standard_labor_rate);

            match self.store.compare_and_swap(key.clone(), expected_version, record) {
                Ok(installed) => {
                    counter!("costing.stage_costs.upserts", 1);
                    metrics::histogram!(
                        "costing.stage_costs.total_cost",
                        installed.total_cost.to_f64().unwrap_or(0.0)
                    );
                    if let Some(sender) = &self.audit {
                        sender
                            .send_or_log(AuditEvent::StageCostUpserted {
                                mo_id,
                                stage_id,
                                period: period.clone(),
                                old_values,
                                new_values: snapshot(&installed),
                                timestamp: chrono::Utc::now(),
                            })
                            .await;
                    }
                    return Ok(installed);
                }
                Err(CasError::VersionConflict) => {
                    counter!("costing.stage_costs.write_conflicts", 1);
                    continue;
                }
                Err(CasError::PeriodClosed) => {
                    warn!(%stage_id, %period, "merge lost the race against a period close");
                    return Err(CostingError::PeriodClosed(period.clone()));
                }
            }
        }

        warn!(%stage_id, %period, "optimistic write retries exhausted");
        Err(CostingError::ConcurrentModification {
            stage_id,
            period: period.clone(),
        })
    }

    /// All of the order's stage records, closed and open, ordered by stage
    /// sequence.
    pub fn get_stage_costs(&self, mo_id: Uuid) -> Vec<StageCostRecord> {
        self.store.records_for_order(mo_id)
    }

    /// Transferred-in cost for a fresh record: the predecessor stage's
    /// closed total for the same order and period, or zero for the first
    /// stage. A non-first stage without a closed predecessor record cannot
    /// accumulate cost yet.
    fn resolve_transferred_in(
        &self,
        stage: &Stage,
        mo_id: Uuid,
        period: &PeriodId,
    ) -> Result<Decimal, CostingError> {
        let Some(predecessor) = self.store.predecessor_of(stage) else {
            return Ok(Decimal::ZERO);
        };
        match self.store.get(&(mo_id, predecessor.id, period.clone())) {
            Some(prior) if prior.closed => Ok(prior.total_cost),
            _ => Err(CostingError::MissingTransfer {
                mo_id,
                stage_id: stage.id,
                period: period.clone(),
            }),
        }
    }
}
