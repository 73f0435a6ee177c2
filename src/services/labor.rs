//! Labor time allocation: turns a batch of labor bookings into a single
//! labor-cost contribution for a stage/period.

use metrics::{counter, histogram};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::errors::CostingError;
use crate::events::{AuditEvent, AuditSender};
use crate::models::{CostDelta, LaborPortion, LaborTimeEntry, PeriodId, StageCostRecord};
use crate::services::stage_costs::StageCostService;

#[derive(Clone)]
pub struct LaborAllocationService {
    stage_costs: Arc<StageCostService>,
    audit: Option<AuditSender>,
}

impl LaborAllocationService {
    pub fn new(stage_costs: Arc<StageCostService>, audit: Option<AuditSender>) -> Self {
        Self { stage_costs, audit }
    }

    /// Applies a batch of labor entries to the stage's open record.
    ///
    /// The contribution is `sum(hours x rate_at_booking)`, each entry at the
    /// rate captured when the time was booked. Every entry is validated
    /// before any state is touched; a single bad entry rejects the whole
    /// batch. Each entry carries its own dedup key, so re-applied entries are
    /// skipped individually: a batch overlapping an earlier one contributes
    /// only its unseen entries, and a fully re-applied batch is a no-op.
    #[instrument(skip(self, entries))]
    pub async fn apply_labor(
        &self,
        mo_id: Uuid,
        stage_id: Uuid,
        period: &PeriodId,
        entries: &[LaborTimeEntry],
    ) -> Result<StageCostRecord, CostingError> {
        if entries.is_empty() {
            return Err(CostingError::InvalidInput(
                "Labor application requires at least one time entry".to_string(),
            ));
        }

        for entry in entries {
            entry.validate().map_err(|e| {
                CostingError::InvalidInput(format!("Labor entry {}: {}", entry.id, e))
            })?;
            if entry.stage_id != stage_id {
                return Err(CostingError::InvalidInput(format!(
                    "Labor entry {} was booked against stage {}, not stage {}",
                    entry.id, entry.stage_id, stage_id
                )));
            }
            if &entry.period != period {
                return Err(CostingError::InvalidInput(format!(
                    "Labor entry {} was booked in period {}, not period {}",
                    entry.id, entry.period, period
                )));
            }
        }

        let amount: Decimal = entries.iter().map(LaborTimeEntry::amount).sum();

        let mut entry_ids: Vec<Uuid> = entries.iter().map(|e| e.id).collect();
        entry_ids.sort();

        let portions: Vec<LaborPortion> = entries
            .iter()
            .map(|entry| LaborPortion {
                dedup_key: dedup_key(entry.id),
                amount: entry.amount(),
                hours: entry.hours,
            })
            .collect();

        let record = self
            .stage_costs
            .upsert_stage_cost(mo_id, stage_id, period, CostDelta::Labor { portions })
            .await?;

        counter!("costing.labor.applications", 1);
        histogram!("costing.labor.amount", amount.to_f64().unwrap_or(0.0));

        if let Some(sender) = &self.audit {
            sender
                .send_or_log(AuditEvent::LaborApplied {
                    mo_id,
                    stage_id,
                    period: period.clone(),
                    amount,
                    entry_ids,
                    timestamp: chrono::Utc::now(),
                })
                .await;
        }

        info!(%stage_id, %period, %amount, entries = entries.len(), "labor applied");
        Ok(record)
    }
}

fn dedup_key(entry_id: Uuid) -> String {
    format!("labor:{}", entry_id)
}
