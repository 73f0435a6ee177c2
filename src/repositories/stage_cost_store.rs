//! In-memory arena for stage cost records, WIP periods, and the routing
//! table. Records are keyed by (manufacturing order, stage, period); closed
//! records are retained for audit and transfer-chain validation.

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::errors::CostingError;
use crate::models::{ManufacturingOrder, PeriodId, Stage, StageCostRecord, WipPeriod};

pub type RecordKey = (Uuid, Uuid, PeriodId);

/// Signal from the compare-and-swap write path.
#[derive(Debug, PartialEq, Eq)]
pub enum CasError {
    /// The stored version moved since the caller read it; recompute and retry.
    VersionConflict,
    /// The record's period was closed between the caller's period check and
    /// the write. Not retryable.
    PeriodClosed,
}

/// Store surface the services write and read through. Implemented by
/// [`StageCostStore`]; the indirection keeps the services wired to a
/// constructor-passed collaborator rather than a concrete arena.
pub trait RecordStore: Send + Sync {
    fn stage(&self, stage_id: Uuid) -> Result<Stage, CostingError>;
    fn predecessor_of(&self, stage: &Stage) -> Option<Stage>;
    fn order(&self, mo_id: Uuid) -> Option<ManufacturingOrder>;
    fn ensure_period_open(&self, id: &PeriodId) -> Result<(), CostingError>;
    fn mark_period_closed(&self, id: &PeriodId) -> Result<WipPeriod, CostingError>;
    fn get(&self, key: &RecordKey) -> Option<StageCostRecord>;
    fn compare_and_swap(
        &self,
        key: RecordKey,
        expected_version: u64,
        record: StageCostRecord,
    ) -> Result<StageCostRecord, CasError>;
    fn records_for_order(&self, mo_id: Uuid) -> Vec<StageCostRecord>;
    fn records_for_period(&self, period: &PeriodId) -> Vec<StageCostRecord>;
}

/// Shared mutable state of the engine.
///
/// Writers never mutate a stored record in place: a merge is computed on a
/// clone and installed through [`StageCostStore::compare_and_swap`], so no
/// reader ever observes a partially applied merge.
#[derive(Debug, Default)]
pub struct StageCostStore {
    records: DashMap<RecordKey, StageCostRecord>,
    periods: DashMap<PeriodId, WipPeriod>,
    stages: DashMap<Uuid, Stage>,
    orders: DashMap<Uuid, ManufacturingOrder>,
}

impl StageCostStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- routing table -------------------------------------------------

    pub fn register_stage(&self, stage: Stage) {
        self.stages.insert(stage.id, stage);
    }

    pub fn stage(&self, stage_id: Uuid) -> Result<Stage, CostingError> {
        self.stages
            .get(&stage_id)
            .map(|s| s.clone())
            .ok_or_else(|| CostingError::NotFound(format!("Stage {} not registered", stage_id)))
    }

    /// The stage with the highest sequence strictly below the given stage's,
    /// or `None` when this is the first stage of the routing.
    ///
    /// The stage table is engine-global, so sequences are compared across
    /// every registered stage: one engine instance serves one routing.
    /// Concurrent routings each get their own engine (and stage numbering).
    pub fn predecessor_of(&self, stage: &Stage) -> Option<Stage> {
        self.stages
            .iter()
            .filter(|s| s.sequence < stage.sequence)
            .max_by_key(|s| s.sequence)
            .map(|s| s.clone())
    }

    // ---- manufacturing orders ------------------------------------------

    /// Caches a read-only manufacturing-order snapshot from the owning
    /// subsystem. Orders the engine has never seen are not rejected at
    /// allocation time; the gate only applies to known terminal statuses.
    pub fn register_order(&self, order: ManufacturingOrder) {
        self.orders.insert(order.id, order);
    }

    pub fn order(&self, mo_id: Uuid) -> Option<ManufacturingOrder> {
        self.orders.get(&mo_id).map(|o| o.clone())
    }

    // ---- WIP periods ---------------------------------------------------

    pub fn register_period(&self, period: WipPeriod) {
        self.periods.insert(period.id.clone(), period);
    }

    pub fn period(&self, id: &PeriodId) -> Option<WipPeriod> {
        self.periods.get(id).map(|p| p.clone())
    }

    /// Rejects mutation under a closed period. An unregistered period is
    /// treated as open: the accounting calendar is owned by a collaborator
    /// and the engine only enforces closes it has been told about.
    pub fn ensure_period_open(&self, id: &PeriodId) -> Result<(), CostingError> {
        match self.periods.get(id) {
            Some(p) if p.closed => Err(CostingError::PeriodClosed(id.clone())),
            _ => Ok(()),
        }
    }

    /// Flips the period to closed, failing if any record under it is still
    /// open.
    ///
    /// The open-record scan runs while this thread holds the period's entry
    /// lock exclusively. Record installation takes the same lock shared (see
    /// [`StageCostStore::compare_and_swap`]), so every concurrent install
    /// either lands before the scan (and is seen by it) or starts after the
    /// flip (and is rejected by the closed check). No record can slip in
    /// between scan and flip.
    pub fn mark_period_closed(&self, id: &PeriodId) -> Result<WipPeriod, CostingError> {
        let mut period = self
            .periods
            .get_mut(id)
            .ok_or_else(|| CostingError::NotFound(format!("WIP period {} not registered", id)))?;
        let open: Vec<StageCostRecord> = self
            .records
            .iter()
            .filter(|r| &r.period == id && !r.closed)
            .map(|r| r.clone())
            .collect();
        if let Some(first_open) = open.first() {
            debug!(%id, open = open.len(), "period close rejected: open records remain");
            return Err(CostingError::InvalidOperation(format!(
                "Cannot close period {}: stage {} of order {} is still open ({} open record(s))",
                id,
                first_open.stage_id,
                first_open.mo_id,
                open.len()
            )));
        }
        period.closed = true;
        Ok(period.clone())
    }

    // ---- stage cost records --------------------------------------------

    pub fn get(&self, key: &RecordKey) -> Option<StageCostRecord> {
        self.records.get(key).map(|r| r.clone())
    }

    /// Installs `record` if the stored version still matches
    /// `expected_version` (0 for a record the caller believes absent). The
    /// version is bumped on install; the installed value is returned.
    ///
    /// The entry lock makes check-and-replace atomic per key, which gives the
    /// at-most-one-mutation-in-flight guarantee the merge path relies on.
    ///
    /// The write also holds the period's entry lock shared for its duration,
    /// re-checking the closed flag under it. This pairs with the exclusive
    /// lock taken by [`StageCostStore::mark_period_closed`]: a write racing a
    /// period close serializes against it instead of installing a record the
    /// close's scan never saw. Lock order is always period then record, on
    /// both paths.
    pub fn compare_and_swap(
        &self,
        key: RecordKey,
        expected_version: u64,
        mut record: StageCostRecord,
    ) -> Result<StageCostRecord, CasError> {
        let period_guard = self.periods.get(&key.2);
        if let Some(period) = &period_guard {
            if period.closed {
                return Err(CasError::PeriodClosed);
            }
        }
        let entry = self.records.entry(key);
        match entry {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().version != expected_version {
                    debug!(
                        expected = expected_version,
                        found = occupied.get().version,
                        "stage cost record version conflict"
                    );
                    return Err(CasError::VersionConflict);
                }
                record.version = expected_version + 1;
                occupied.insert(record.clone());
                Ok(record)
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                if expected_version != 0 {
                    return Err(CasError::VersionConflict);
                }
                record.version = 1;
                vacant.insert(record.clone());
                Ok(record)
            }
        }
    }

    /// All records for a manufacturing order, closed and open, ordered by
    /// stage sequence then period. Stages missing from the routing table
    /// sort last.
    pub fn records_for_order(&self, mo_id: Uuid) -> Vec<StageCostRecord> {
        let mut records: Vec<StageCostRecord> = self
            .records
            .iter()
            .filter(|r| r.mo_id == mo_id)
            .map(|r| r.clone())
            .collect();
        records.sort_by_key(|r| {
            let sequence = self
                .stages
                .get(&r.stage_id)
                .map(|s| s.sequence)
                .unwrap_or(u32::MAX);
            (sequence, r.period.clone())
        });
        records
    }

    /// All records under one period, across orders and stages.
    pub fn records_for_period(&self, period: &PeriodId) -> Vec<StageCostRecord> {
        self.records
            .iter()
            .filter(|r| &r.period == period)
            .map(|r| r.clone())
            .collect()
    }
}

impl RecordStore for StageCostStore {
    fn stage(&self, stage_id: Uuid) -> Result<Stage, CostingError> {
        StageCostStore::stage(self, stage_id)
    }

    fn predecessor_of(&self, stage: &Stage) -> Option<Stage> {
        StageCostStore::predecessor_of(self, stage)
    }

    fn order(&self, mo_id: Uuid) -> Option<ManufacturingOrder> {
        StageCostStore::order(self, mo_id)
    }

    fn ensure_period_open(&self, id: &PeriodId) -> Result<(), CostingError> {
        StageCostStore::ensure_period_open(self, id)
    }

    fn mark_period_closed(&self, id: &PeriodId) -> Result<WipPeriod, CostingError> {
        StageCostStore::mark_period_closed(self, id)
    }

    fn get(&self, key: &RecordKey) -> Option<StageCostRecord> {
        StageCostStore::get(self, key)
    }

    fn compare_and_swap(
        &self,
        key: RecordKey,
        expected_version: u64,
        record: StageCostRecord,
    ) -> Result<StageCostRecord, CasError> {
        StageCostStore::compare_and_swap(self, key, expected_version, record)
    }

    fn records_for_order(&self, mo_id: Uuid) -> Vec<StageCostRecord> {
        StageCostStore::records_for_order(self, mo_id)
    }

    fn records_for_period(&self, period: &PeriodId) -> Vec<StageCostRecord> {
        StageCostStore::records_for_period(self, period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn stage(sequence: u32) -> Stage {
        Stage {
            id: Uuid::new_v4(),
            sequence,
            work_center_id: Uuid::new_v4(),
            standard_labor_rate: dec!(40),
            standard_overhead_rate: dec!(10),
        }
    }

    #[test]
    fn predecessor_follows_sequence_order() {
        let store = StageCostStore::new();
        let s1 = stage(10);
        let s2 = stage(20);
        let s3 = stage(30);
        store.register_stage(s1.clone());
        store.register_stage(s2.clone());
        store.register_stage(s3.clone());

        assert_eq!(store.predecessor_of(&s1), None);
        assert_eq!(store.predecessor_of(&s2).map(|s| s.id), Some(s1.id));
        assert_eq!(store.predecessor_of(&s3).map(|s| s.id), Some(s2.id));
    }

    #[test]
    fn cas_rejects_stale_version() {
        let store = StageCostStore::new();
        let key = (Uuid::new_v4(), Uuid::new_v4(), PeriodId::from("2026-08"));
        let record =
            StageCostRecord::open(key.0, key.1, key.2.clone(), Decimal::ZERO);

        let installed = store
            .compare_and_swap(key.clone(), 0, record.clone())
            .unwrap();
        assert_eq!(installed.version, 1);

        // A writer holding the pre-install read must now conflict.
        assert_eq!(
            store.compare_and_swap(key.clone(), 0, record),
            Err(CasError::VersionConflict)
        );
    }

    #[test]
    fn unregistered_period_is_open() {
        let store = StageCostStore::new();
        assert!(store.ensure_period_open(&PeriodId::from("2026-09")).is_ok());
    }

    fn period(id: &str, closed: bool) -> WipPeriod {
        WipPeriod {
            id: PeriodId::from(id),
            start: chrono::NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            end: chrono::NaiveDate::from_ymd_opt(2026, 8, 31).unwrap(),
            closed,
        }
    }

    #[test]
    fn cas_rejects_install_under_closed_period() {
        let store = StageCostStore::new();
        store.register_period(period("2026-08", true));

        let key = (Uuid::new_v4(), Uuid::new_v4(), PeriodId::from("2026-08"));
        let record = StageCostRecord::open(key.0, key.1, key.2.clone(), Decimal::ZERO);

        // A writer whose period-open check passed before the close flipped
        // the flag still cannot land its record.
        assert_eq!(
            store.compare_and_swap(key.clone(), 0, record),
            Err(CasError::PeriodClosed)
        );
        assert!(store.get(&key).is_none());
    }

    #[test]
    fn period_close_scans_open_records_under_its_lock() {
        let store = StageCostStore::new();
        store.register_period(period("2026-08", false));

        let key = (Uuid::new_v4(), Uuid::new_v4(), PeriodId::from("2026-08"));
        let record = StageCostRecord::open(key.0, key.1, key.2.clone(), Decimal::ZERO);
        store.compare_and_swap(key.clone(), 0, record).unwrap();

        let rejected = store.mark_period_closed(&PeriodId::from("2026-08"));
        assert!(matches!(rejected, Err(CostingError::InvalidOperation(_))));
        // The flag never flipped, so allocation is still possible.
        assert!(store.ensure_period_open(&PeriodId::from("2026-08")).is_ok());
        assert_eq!(store.records_for_period(&PeriodId::from("2026-08")).len(), 1);

        let mut closing = store.get(&key).unwrap();
        closing.closed = true;
        store.compare_and_swap(key, 1, closing).unwrap();
        assert!(store.mark_period_closed(&PeriodId::from("2026-08")).is_ok());
    }
}
