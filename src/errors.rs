use serde::Serialize;
use uuid::Uuid;

use crate::models::PeriodId;

/// Error taxonomy for the costing engine.
///
/// Every variant is caller-facing: operations return these as typed results
/// and never swallow them. An undefined unit cost is deliberately NOT an
/// error; see [`crate::money::UnitCost`].
#[derive(Debug, thiserror::Error, Serialize)]
pub enum CostingError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Stage {stage_id} is closed for period {period}")]
    StageClosed { stage_id: Uuid, period: PeriodId },

    #[error("WIP period {0} is closed")]
    PeriodClosed(PeriodId),

    #[error(
        "Stage {stage_id} has no closed predecessor cost for order {mo_id} in period {period}"
    )]
    MissingTransfer {
        mo_id: Uuid,
        stage_id: Uuid,
        period: PeriodId,
    },

    #[error("Stage {stage_id} cannot close: {missing} cost has not been applied")]
    IncompleteStage { stage_id: Uuid, missing: String },

    #[error("Concurrent modification on stage {stage_id} period {period}")]
    ConcurrentModification { stage_id: Uuid, period: PeriodId },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Audit error: {0}")]
    AuditError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for CostingError {
    fn from(err: validator::ValidationErrors) -> Self {
        CostingError::InvalidInput(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_offending_key() {
        let stage_id = Uuid::new_v4();
        let period = PeriodId::from("2026-08");
        let err = CostingError::StageClosed {
            stage_id,
            period: period.clone(),
        };
        let msg = err.to_string();
        assert!(msg.contains(&stage_id.to_string()));
        assert!(msg.contains("2026-08"));
    }

    #[test]
    fn validation_errors_map_to_invalid_input() {
        let errs = validator::ValidationErrors::new();
        let err: CostingError = errs.into();
        assert!(matches!(err, CostingError::InvalidInput(_)));
    }
}
