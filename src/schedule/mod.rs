//! Day-by-day capacity scheduling of solved patterns.
//!
//! Every pattern is expanded into whole parent units which are then packed
//! into calendar days. A day holds at most its capacity (reduced on rest
//! days) minus a setup penalty for each distinct pattern it runs.

mod alap;
mod forward;
mod lateness;

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::config::ScheduleParams;
use crate::types::{DailyPlan, DemandLine, Pattern, Produced, ScheduledPattern, SolveResult, Width};

pub use alap::{MAX_LOOKBACK_DAYS, build_schedule_alap};
pub use forward::{DemandTracker, MAX_FORWARD_DAYS, build_schedule_forward};
pub use lateness::{
    ComplianceRow, ComplianceStatus, compliance_report, compute_max_lateness, compute_max_offset,
    reanchor_forward,
};

const CAPACITY_EPSILON: f64 = 1e-9;

/// One parent unit waiting for a slot.
#[derive(Debug, Clone, Copy)]
struct ProductionUnit<'a> {
    code: &'a str,
    pattern: &'a Pattern,
    weight: f64,
}

impl ProductionUnit<'_> {
    fn key(&self) -> (&str, usize) {
        (self.code, self.pattern.id)
    }
}

/// Expands every pattern into `ceil(assigned_units)` units, group by group.
fn expand_units(results: &BTreeMap<String, SolveResult>) -> Vec<ProductionUnit<'_>> {
    let mut units = Vec::new();
    for (code, result) in results {
        for pattern in &result.patterns {
            let weight = pattern.unit_weight();
            if weight <= 0.0 {
                continue;
            }
            for _ in 0..pattern.whole_units() {
                units.push(ProductionUnit {
                    code,
                    pattern,
                    weight,
                });
            }
        }
    }
    units
}

/// First non-empty coil description per group code.
fn description_map(demands: &[DemandLine]) -> HashMap<&str, &str> {
    let mut map = HashMap::new();
    for d in demands {
        if let Some(desc) = d.coil_description.as_deref().filter(|s| !s.trim().is_empty()) {
            map.entry(d.group_code()).or_insert(desc);
        }
    }
    map
}

/// Running contents of one calendar day.
#[derive(Debug)]
struct DayLedger {
    date: NaiveDate,
    entries: Vec<ScheduledPattern>,
    total_tons: f64,
}

impl DayLedger {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            entries: Vec::new(),
            total_tons: 0.0,
        }
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn runs(&self, unit: &ProductionUnit<'_>) -> bool {
        let (code, id) = unit.key();
        self.entries
            .iter()
            .any(|e| e.coil_code == code && e.pattern_id == id)
    }

    /// Whether `unit` fits, counting the setup it would add.
    fn fits(&self, unit: &ProductionUnit<'_>, params: &ScheduleParams) -> bool {
        let setups = self.entries.len() + usize::from(!self.runs(unit));
        let available = params.capacity_on(self.date) - setups as f64 * params.setup_penalty;
        self.total_tons + unit.weight <= available + CAPACITY_EPSILON
    }

    fn place(&mut self, unit: &ProductionUnit<'_>, descriptions: &HashMap<&str, &str>) {
        let (code, id) = unit.key();
        match self
            .entries
            .iter_mut()
            .find(|e| e.coil_code == code && e.pattern_id == id)
        {
            Some(entry) => entry.units += 1,
            None => self.entries.push(ScheduledPattern {
                pattern_id: id,
                units: 1,
                pattern: unit.pattern.clone(),
                coil_code: code.to_string(),
                coil_description: descriptions.get(code).copied().unwrap_or_default().to_string(),
            }),
        }
        self.total_tons += unit.weight;
    }

    fn into_plan(self, params: &ScheduleParams) -> DailyPlan {
        let capacity_tons = params.capacity_on(self.date);
        let setup_penalty_tons = self.entries.len() as f64 * params.setup_penalty;

        let mut produced: BTreeMap<Width, f64> = BTreeMap::new();
        let mut output = 0.0;
        for entry in &self.entries {
            let units = entry.units as f64;
            output += units * entry.pattern.unit_weight() * entry.pattern.yield_percent / 100.0;
            for cut in &entry.pattern.cuts {
                *produced.entry(cut.width).or_insert(0.0) +=
                    units * cut.count as f64 * cut.weight_per_cut;
            }
        }

        let used = self.total_tons + setup_penalty_tons;
        DailyPlan {
            date: self.date,
            patterns: self.entries,
            total_tons: self.total_tons,
            daily_yield: if self.total_tons > 0.0 {
                output / self.total_tons * 100.0
            } else {
                0.0
            },
            produced_items: produced
                .into_iter()
                .map(|(width, tons)| Produced { width, tons })
                .collect(),
            capacity_used_percent: used / capacity_tons * 100.0,
            setup_penalty_tons,
            capacity_tons,
            overloaded: used > capacity_tons + CAPACITY_EPSILON,
        }
    }
}

fn overload_warning(plan: &DailyPlan) -> String {
    tracing::warn!(
        date = %plan.date,
        tons = plan.total_tons,
        setup = plan.setup_penalty_tons,
        capacity = plan.capacity_tons,
        "oversized unit forced into day"
    );
    format!(
        "{}: {:.1} t plus {:.1} t setup exceeds {:.1} t capacity",
        plan.date, plan.total_tons, plan.setup_penalty_tons, plan.capacity_tons
    )
}
