use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

use crate::money::{self, UnitCost};

use super::PeriodId;

/// One of the three directly-applied cost components of a stage record.
/// Transferred-in cost is not a component: it is resolved from the
/// predecessor stage, never applied by a caller.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CostComponent {
    Material,
    Labor,
    Overhead,
}

/// One labor entry's contribution to a merge, keyed by its source entry id
/// so overlapping batches cannot double-count a shared entry.
#[derive(Clone, Debug, PartialEq)]
pub struct LaborPortion {
    pub dedup_key: String,
    pub amount: Decimal,
    pub hours: Decimal,
}

/// A merge request against an open stage record.
///
/// Cost-bearing variants carry dedup keys derived from the source entry ids
/// plus the operation type; re-submitting an already-applied key is a no-op,
/// which makes retries safe. Labor tracks a key per entry, so a batch that
/// overlaps an earlier one only contributes its unseen entries. Quantity
/// updates set absolute values and are idempotent by construction.
#[derive(Clone, Debug, PartialEq)]
pub enum CostDelta {
    Material {
        dedup_key: String,
        amount: Decimal,
    },
    Labor {
        portions: Vec<LaborPortion>,
    },
    Overhead {
        dedup_key: String,
        amount: Decimal,
    },
    Quantities {
        units_fully_completed: Decimal,
        units_in_process: Decimal,
        stage_completion_fraction: Decimal,
    },
}

impl CostDelta {
    /// True when the record has already absorbed everything this delta
    /// carries, making the merge a no-op.
    pub fn fully_applied(&self, record: &StageCostRecord) -> bool {
        match self {
            CostDelta::Material { dedup_key, .. } | CostDelta::Overhead { dedup_key, .. } => {
                record.applied_keys.contains(dedup_key)
            }
            CostDelta::Labor { portions } => portions
                .iter()
                .all(|p| record.applied_keys.contains(&p.dedup_key)),
            CostDelta::Quantities { .. } => false,
        }
    }
}

/// Accumulated cost of one stage of one manufacturing order in one period.
///
/// Mutable only while `closed` is false. Once closed the record is
/// append-only history; corrections require a superseding record in a new
/// period. `version` is the optimistic-concurrency token compared on every
/// write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageCostRecord {
    pub mo_id: Uuid,
    pub stage_id: Uuid,
    pub period: PeriodId,
    pub transferred_in: Decimal,
    pub material_cost: Decimal,
    pub labor_cost: Decimal,
    pub overhead_cost: Decimal,
    pub total_cost: Decimal,
    pub booked_hours: Decimal,
    pub units_fully_completed: Decimal,
    pub units_in_process: Decimal,
    pub stage_completion_fraction: Decimal,
    pub completed_equivalent_units: Decimal,
    pub unit_cost: UnitCost,
    pub efficiency: Decimal,
    pub closed: bool,
    pub calculated_at: DateTime<Utc>,
    pub version: u64,
    pub applied_keys: BTreeSet<String>,
    pub components_applied: BTreeSet<CostComponent>,
}

impl StageCostRecord {
    /// Fresh open record with its transferred-in cost already resolved
    /// (zero for the first stage of a routing).
    pub fn open(mo_id: Uuid, stage_id: Uuid, period: PeriodId, transferred_in: Decimal) -> Self {
        Self {
            mo_id,
            stage_id,
            period,
            transferred_in,
            material_cost: Decimal::ZERO,
            labor_cost: Decimal::ZERO,
            overhead_cost: Decimal::ZERO,
            total_cost: transferred_in,
            booked_hours: Decimal::ZERO,
            units_fully_completed: Decimal::ZERO,
            units_in_process: Decimal::ZERO,
            stage_completion_fraction: Decimal::ZERO,
            completed_equivalent_units: Decimal::ZERO,
            unit_cost: UnitCost::Undefined,
            efficiency: Decimal::ONE,
            closed: false,
            calculated_at: Utc::now(),
            version: 0,
            applied_keys: BTreeSet::new(),
            components_applied: BTreeSet::new(),
        }
    }

    /// Merges a delta into this open record. The caller has already checked
    /// `closed`; dedup membership is enforced here, key by key, so partially
    /// overlapping labor batches merge their unseen portions only.
    pub fn apply(&mut self, delta: &CostDelta) {
        match delta {
            CostDelta::Material { dedup_key, amount } => {
                self.material_cost += *amount;
                self.applied_keys.insert(dedup_key.clone());
                self.components_applied.insert(CostComponent::Material);
            }
            CostDelta::Labor { portions } => {
                for portion in portions {
                    if !self.applied_keys.insert(portion.dedup_key.clone()) {
                        continue;
                    }
                    self.labor_cost += portion.amount;
                    self.booked_hours += portion.hours;
                }
                self.components_applied.insert(CostComponent::Labor);
            }
            CostDelta::Overhead { dedup_key, amount } => {
                self.overhead_cost += *amount;
                self.applied_keys.insert(dedup_key.clone());
                self.components_applied.insert(CostComponent::Overhead);
            }
            CostDelta::Quantities {
                units_fully_completed,
                units_in_process,
                stage_completion_fraction,
            } => {
                self.units_fully_completed = *units_fully_completed;
                self.units_in_process = *units_in_process;
                self.stage_completion_fraction = *stage_completion_fraction;
            }
        }
    }

    /// Recomputes every derived field from the component fields.
    ///
    /// Weighted-average equivalent units: fully completed units plus
    /// in-process units counted fractionally by completion. Recomputed on
    /// every merge, quantity changes included, not only cost changes.
    /// Intermediate sums stay unrounded; `unit_cost` keeps the quotient at
    /// full precision so it reconciles with `total_cost`.
    pub fn recompute_derived(&mut self, standard_labor_rate: Decimal) {
        self.completed_equivalent_units =
            self.units_fully_completed + self.units_in_process * self.stage_completion_fraction;
        self.total_cost =
            self.transferred_in + self.material_cost + self.labor_cost + self.overhead_cost;
        self.unit_cost = money::unit_cost(self.total_cost, self.completed_equivalent_units);
        self.efficiency = if self.labor_cost.is_zero() {
            Decimal::ONE
        } else {
            let at_standard = self.booked_hours * standard_labor_rate;
            (at_standard / self.labor_cost).max(Decimal::ZERO)
        };
        self.calculated_at = Utc::now();
    }

    /// Rounds the persisted money fields to the currency's minimal unit and
    /// re-derives the total from the rounded components, keeping the
    /// conservation identity exact.
    pub fn round_boundary(&mut self, scale: u32) {
        self.transferred_in = money::round_money(self.transferred_in, scale);
        self.material_cost = money::round_money(self.material_cost, scale);
        self.labor_cost = money::round_money(self.labor_cost, scale);
        self.overhead_cost = money::round_money(self.overhead_cost, scale);
        self.total_cost =
            self.transferred_in + self.material_cost + self.labor_cost + self.overhead_cost;
        self.unit_cost = money::unit_cost(self.total_cost, self.completed_equivalent_units);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn open_record() -> StageCostRecord {
        StageCostRecord::open(
            Uuid::new_v4(),
            Uuid::new_v4(),
            PeriodId::from("2026-08"),
            Decimal::ZERO,
        )
    }

    #[test]
    fn conservation_identity_holds_after_merges() {
        let mut r = open_record();
        r.transferred_in = dec!(1300);
        r.apply(&CostDelta::Material {
            dedup_key: "material:a".into(),
            amount: dec!(300),
        });
        r.apply(&CostDelta::Labor {
            portions: vec![LaborPortion {
                dedup_key: "labor:b".into(),
                amount: dec!(150),
                hours: dec!(5),
            }],
        });
        r.apply(&CostDelta::Overhead {
            dedup_key: "overhead:c".into(),
            amount: dec!(75),
        });
        r.recompute_derived(dec!(30));
        assert_eq!(r.total_cost, dec!(1825));
        assert_eq!(
            r.total_cost,
            r.transferred_in + r.material_cost + r.labor_cost + r.overhead_cost
        );
    }

    #[test]
    fn equivalent_units_count_wip_fractionally() {
        let mut r = open_record();
        r.apply(&CostDelta::Quantities {
            units_fully_completed: dec!(80),
            units_in_process: dec!(40),
            stage_completion_fraction: dec!(0.5),
        });
        r.recompute_derived(Decimal::ZERO);
        assert_eq!(r.completed_equivalent_units, dec!(100.0));
    }

    #[test]
    fn quantity_change_alone_triggers_unit_cost_recompute() {
        let mut r = open_record();
        r.apply(&CostDelta::Material {
            dedup_key: "material:a".into(),
            amount: dec!(500),
        });
        r.recompute_derived(Decimal::ZERO);
        assert_eq!(r.unit_cost, UnitCost::Undefined);

        r.apply(&CostDelta::Quantities {
            units_fully_completed: dec!(100),
            units_in_process: Decimal::ZERO,
            stage_completion_fraction: Decimal::ZERO,
        });
        r.recompute_derived(Decimal::ZERO);
        assert_eq!(r.unit_cost.value(), Some(dec!(5)));
    }

    #[test]
    fn efficiency_compares_standard_to_actual_labor() {
        let mut r = open_record();
        r.apply(&CostDelta::Labor {
            portions: vec![LaborPortion {
                dedup_key: "labor:a".into(),
                amount: dec!(400),
                hours: dec!(10),
            }],
        });
        // 10h at standard rate 50 = 500 standard vs 400 actual
        r.recompute_derived(dec!(50));
        assert_eq!(r.efficiency, dec!(1.25));
    }

    #[test]
    fn overlapping_labor_batches_count_shared_entries_once() {
        let a = LaborPortion {
            dedup_key: "labor:a".into(),
            amount: dec!(100),
            hours: dec!(4),
        };
        let b = LaborPortion {
            dedup_key: "labor:b".into(),
            amount: dec!(50),
            hours: dec!(2),
        };
        let c = LaborPortion {
            dedup_key: "labor:c".into(),
            amount: dec!(25),
            hours: dec!(1),
        };
        let mut r = open_record();
        r.apply(&CostDelta::Labor {
            portions: vec![a.clone(), b.clone()],
        });
        r.apply(&CostDelta::Labor {
            portions: vec![b, c],
        });
        r.recompute_derived(Decimal::ZERO);
        assert_eq!(r.labor_cost, dec!(175));
        assert_eq!(r.booked_hours, dec!(7));
    }

    #[test]
    fn boundary_rounding_keeps_total_equal_to_component_sum() {
        let mut r = open_record();
        r.apply(&CostDelta::Material {
            dedup_key: "material:a".into(),
            amount: dec!(10.005),
        });
        r.apply(&CostDelta::Labor {
            portions: vec![LaborPortion {
                dedup_key: "labor:b".into(),
                amount: dec!(20.004),
                hours: dec!(1),
            }],
        });
        r.recompute_derived(Decimal::ZERO);
        r.round_boundary(2);
        assert_eq!(r.material_cost, dec!(10.01));
        assert_eq!(r.labor_cost, dec!(20.00));
        assert_eq!(
            r.total_cost,
            r.transferred_in + r.material_cost + r.labor_cost + r.overhead_cost
        );
    }
}
