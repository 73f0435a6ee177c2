//! WIP period closing: the only path that flips a stage record from OPEN to
//! CLOSED. The closer holds exclusive write authority over that transition;
//! allocation and close contend on the same version token, so a close is
//! mutually exclusive with any in-flight allocation on the key.

use metrics::counter;
use std::sync::Arc;
use strum::IntoEnumIterator;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::errors::CostingError;
use crate::events::{snapshot, AuditEvent, AuditSender};
use crate::models::{CostComponent, PeriodId, StageCostRecord, WipPeriod};
use crate::repositories::{CasError, RecordStore};

#[derive(Clone)]
pub struct PeriodCloseService {
    store: Arc<dyn RecordStore>,
    config: EngineConfig,
    audit: Option<AuditSender>,
}

impl PeriodCloseService {
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

    /// Closes a stage's record for the period.
    ///
    /// The close is one compare-and-swap: money fields are rounded to the
    /// currency's minimal unit, the total re-derived from the rounded
    /// components, and the closed flag set together. No partial close is
    /// ever observable. Closing an already-closed record is a no-op that
    /// returns the existing record. The closed record's total is the
    /// transferred-in amount the successor stage consumes.
    #[instrument(skip(self))]
    pub async fn close_stage(
        &self,
        mo_id: Uuid,
        stage_id: Uuid,
        period: &PeriodId,
    ) -> Result<StageCostRecord, CostingError> {
        let stage = self.store.stage(stage_id)?;
        let key = (mo_id, stage_id, period.clone());

        for _attempt in 0..self.config.max_write_retries {
            let record = self.store.get(&key).ok_or_else(|| {
                CostingError::NotFound(format!(
                    "No stage cost record for order {} stage {} period {}",
                    mo_id, stage_id, period
                ))
            })?;

            if record.closed {
                info!(%stage_id, %period, "stage already closed, returning existing record");
                return Ok(record);
            }

            self.store.ensure_period_open(period)?;

            for component in CostComponent::iter() {
                if !record.components_applied.contains(&component) {
                    warn!(%stage_id, %period, %component, "close rejected: component missing");
                    return Err(CostingError::IncompleteStage {
                        stage_id,
                        missing: component.to_string(),
                    });
                }
            }

            // Predecessor chain re-check; transferred-in was resolved at
            // record creation but the invariant is cheap to re-verify.
            if let Some(predecessor) = self.store.predecessor_of(&stage) {
                let prior = self.store.get(&(mo_id, predecessor.id, period.clone()));
                if !prior.map(|p| p.closed).unwrap_or(false) {
                    return Err(CostingError::MissingTransfer {
                        mo_id,
                        stage_id,
                        period: period.clone(),
                    });
                }
            }

            let expected_version = record.version;
            let old_values = snapshot(&record);
            let mut closing = record;
            closing.round_boundary(self.config.currency_scale);
            closing.closed = true;
            closing.calculated_at = chrono::Utc::now();

            match self
                .store
                .compare_and_swap(key.clone(), expected_version, closing)
            {
                Ok(closed) => {
                    counter!("costing.stages.closed", 1);
                    if let Some(sender) = &self.audit {
                        sender
                            .send_or_log(AuditEvent::StageClosed {
                                mo_id,
                                stage_id,
                                period: period.clone(),
                                transferred_out: closed.total_cost,
                                old_values,
                                new_values: snapshot(&closed),
                                timestamp: chrono::Utc::now(),
                            })
                            .await;
                    }
                    info!(
                        %stage_id, %period, total_cost = %closed.total_cost,
                        "stage closed"
                    );
                    return Ok(closed);
                }
                Err(CasError::VersionConflict) => {
                    counter!("costing.stages.close_conflicts", 1);
                    continue;
                }
                Err(CasError::PeriodClosed) => {
                    return Err(CostingError::PeriodClosed(period.clone()));
                }
            }
        }

        warn!(%stage_id, %period, "close retries exhausted");
        Err(CostingError::ConcurrentModification {
            stage_id,
            period: period.clone(),
        })
    }

    /// Closes the WIP period itself once every stage record under it is
    /// closed. Further allocations and fresh records for the period are
    /// rejected from then on.
    ///
    /// The store runs the open-record scan and the flip under the period's
    /// entry lock, serializing against concurrent record installs; a merge
    /// racing this close either lands before the scan and blocks it, or is
    /// rejected with `PeriodClosed` after it.
    #[instrument(skip(self))]
    pub async fn close_period(&self, period: &PeriodId) -> Result<WipPeriod, CostingError> {
        let closed = self.store.mark_period_closed(period)?;
        counter!("costing.periods.closed", 1);
        if let Some(sender) = &self.audit {
            sender
                .send_or_log(AuditEvent::PeriodClosed {
                    period: period.clone(),
                    timestamp: chrono::Utc::now(),
                })
                .await;
        }
        info!(%period, "WIP period closed");
        Ok(closed)
    }
}
