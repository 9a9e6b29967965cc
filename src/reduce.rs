//! Greedy pattern-count reduction: drop the least-used pattern while the
//! re-solved plan stays feasible and within a bounded unit increase.

use crate::error::SolveError;
use crate::lp::{Selection, select_patterns};
use crate::types::{AggregatedDemand, Pattern};

pub const MAX_REDUCTION_ROUNDS: usize = 50;
/// Patterns with usage at or below this are considered inactive.
pub const ACTIVE_EPSILON: f64 = 1e-4;

#[derive(Debug, Clone)]
pub struct Reduction {
    /// Remaining candidate pool.
    pub pool: Vec<Pattern>,
    pub selection: Selection,
    pub baseline_units: f64,
    pub unit_cap: f64,
    pub removed: usize,
}

impl Reduction {
    pub fn active_count(&self) -> usize {
        active(&self.pool, &self.selection).len()
    }
}

fn active<'a>(pool: &'a [Pattern], selection: &Selection) -> Vec<&'a Pattern> {
    pool.iter()
        .filter(|p| selection.usage_of(p.id) > ACTIVE_EPSILON)
        .collect()
}

/// Starts from the patterns active in `initial` and removes them one at a
/// time, least used first. Stops at the first removal that is infeasible
/// or exceeds `baseline * (1 + extra_waste_tolerance)` parent units.
pub fn reduce_patterns(
    candidates: &[Pattern],
    initial: Selection,
    demands: &[AggregatedDemand],
    tolerance_min: f64,
    tolerance_max: f64,
    extra_waste_tolerance: f64,
) -> Reduction {
    let mut pool: Vec<Pattern> = candidates
        .iter()
        .filter(|p| initial.usage_of(p.id) > ACTIVE_EPSILON)
        .cloned()
        .collect();
    let baseline_units = initial.total_units;
    let unit_cap = baseline_units * (1.0 + extra_waste_tolerance);
    let mut selection = initial;
    let mut removed = 0;

    for round in 0..MAX_REDUCTION_ROUNDS {
        let used = active(&pool, &selection);
        if used.len() <= 1 {
            break;
        }
        let Some(candidate) = used
            .iter()
            .min_by(|a, b| selection.usage_of(a.id).total_cmp(&selection.usage_of(b.id)))
            .map(|p| p.id)
        else {
            break;
        };

        let trial: Vec<Pattern> = pool.iter().filter(|p| p.id != candidate).cloned().collect();
        match select_patterns(&trial, demands, tolerance_min, tolerance_max) {
            Ok(next) if next.total_units <= unit_cap => {
                tracing::debug!(
                    round,
                    pattern = candidate,
                    units = next.total_units,
                    cap = unit_cap,
                    "dropped pattern"
                );
                pool = trial;
                selection = next;
                removed += 1;
            }
            Ok(next) => {
                tracing::debug!(
                    round,
                    pattern = candidate,
                    units = next.total_units,
                    cap = unit_cap,
                    "removal exceeds unit cap"
                );
                break;
            }
            Err(SolveError::Infeasible) => {
                tracing::debug!(round, pattern = candidate, "removal infeasible");
                break;
            }
            Err(e) => {
                tracing::warn!(round, error = %e, "reduction stopped on LP failure");
                break;
            }
        }
    }

    Reduction {
        pool,
        selection,
        baseline_units,
        unit_cap,
        removed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cut, Width};

    fn pattern(id: usize, cuts: &[(f64, u32)]) -> Pattern {
        let cuts: Vec<Cut> = cuts
            .iter()
            .map(|&(w, count)| Cut {
                width: Width::from_mm(w),
                count,
                weight_per_cut: w / 1200.0 * 12.0,
            })
            .collect();
        let used: Width = cuts.iter().map(|c| c.width.times(c.count)).sum();
        Pattern {
            id,
            cuts,
            assigned_units: 0.0,
            used_width: used,
            waste_width: Width::from_mm(1200.0) - used,
            yield_percent: used.mm() / 1200.0 * 100.0,
            total_production_weight: 0.0,
        }
    }

    fn demand(width: f64, tons: f64) -> AggregatedDemand {
        AggregatedDemand {
            width: Width::from_mm(width),
            target_tons: tons,
        }
    }

    #[test]
    fn test_reduction_respects_cap_and_count() {
        let demands = vec![demand(400.0, 40.0), demand(300.0, 30.0), demand(200.0, 20.0)];
        let candidates = vec![
            pattern(1, &[(400.0, 3)]),
            pattern(2, &[(300.0, 4)]),
            pattern(3, &[(200.0, 6)]),
            pattern(4, &[(400.0, 1), (300.0, 2), (200.0, 1)]),
            pattern(5, &[(400.0, 2), (200.0, 2)]),
            pattern(6, &[(300.0, 2), (200.0, 3)]),
        ];
        let initial = select_patterns(&candidates, &demands, 10.0, 10.0).unwrap();
        let before = candidates
            .iter()
            .filter(|p| initial.usage_of(p.id) > ACTIVE_EPSILON)
            .count();
        let baseline = initial.total_units;

        let reduction = reduce_patterns(&candidates, initial, &demands, 10.0, 10.0, 0.02);
        assert!(reduction.selection.total_units <= baseline * 1.02 + 1e-9);
        assert!(reduction.active_count() <= before);
        assert!(reduction.active_count() + reduction.removed <= before);
        assert!((reduction.baseline_units - baseline).abs() < 1e-12);
    }

    #[test]
    fn test_single_pattern_is_left_alone() {
        let demands = vec![demand(600.0, 60.0)];
        let candidates = vec![pattern(1, &[(600.0, 2)])];
        let initial = select_patterns(&candidates, &demands, 0.0, 0.0).unwrap();
        let reduction = reduce_patterns(&candidates, initial, &demands, 0.0, 0.0, 0.02);
        assert_eq!(reduction.removed, 0);
        assert_eq!(reduction.active_count(), 1);
    }

    #[test]
    fn test_zero_tolerance_keeps_required_patterns() {
        // Both patterns are needed: dropping either makes 500 or 700 unreachable.
        let demands = vec![demand(500.0, 30.0), demand(700.0, 30.0)];
        let candidates = vec![
            pattern(1, &[(500.0, 2)]),
            pattern(3, &[(700.0, 1), (500.0, 1)]),
        ];
        let initial = select_patterns(&candidates, &demands, 0.0, 0.0).unwrap();
        let reduction = reduce_patterns(&candidates, initial, &demands, 0.0, 0.0, 0.02);
        assert_eq!(reduction.removed, 0);
        assert_eq!(reduction.active_count(), 2);
    }
}
