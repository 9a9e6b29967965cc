//! Pattern selection as a linear program: minimise parent units subject to
//! per-width production bounds.

use std::collections::BTreeMap;

use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable, constraint,
    default_solver, variable,
};

use crate::error::SolveError;
use crate::types::{AggregatedDemand, Pattern};

/// LP values at or below this are treated as unused.
pub const USAGE_EPSILON: f64 = 1e-5;
/// Targets below this many tons only carry an upper bound.
pub const NEGLIGIBLE_TARGET_TONS: f64 = 0.5;

/// Production bounds (tons) for one width.
pub fn demand_bounds(demand: &AggregatedDemand, tolerance_min: f64, tolerance_max: f64) -> (f64, f64) {
    let max = demand.target_tons * (1.0 + tolerance_max / 100.0);
    if demand.target_tons < NEGLIGIBLE_TARGET_TONS {
        (0.0, max)
    } else {
        ((demand.target_tons * (1.0 - tolerance_min / 100.0)).max(0.0), max)
    }
}

/// Fractional parent-unit usage per pattern id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selection {
    pub usage: BTreeMap<usize, f64>,
    pub total_units: f64,
}

impl Selection {
    pub fn usage_of(&self, pattern_id: usize) -> f64 {
        self.usage.get(&pattern_id).copied().unwrap_or(0.0)
    }
}

pub fn select_patterns(
    patterns: &[Pattern],
    demands: &[AggregatedDemand],
    tolerance_min: f64,
    tolerance_max: f64,
) -> Result<Selection, SolveError> {
    let mut vars = ProblemVariables::new();
    let xs: Vec<Variable> = patterns
        .iter()
        .map(|_| vars.add(variable().min(0.0)))
        .collect();
    let objective = xs.iter().fold(Expression::from(0.0), |acc, x| acc + *x);

    let mut rows: Vec<(Expression, f64, f64)> = Vec::with_capacity(demands.len());
    for demand in demands {
        let (min, max) = demand_bounds(demand, tolerance_min, tolerance_max);
        let mut expr = Expression::from(0.0);
        let mut terms = 0usize;
        for (pattern, x) in patterns.iter().zip(&xs) {
            if let Some(cut) = pattern.cut_for(demand.width) {
                expr = expr + (cut.count as f64 * cut.weight_per_cut) * *x;
                terms += 1;
            }
        }
        if terms == 0 {
            if min > 0.0 {
                tracing::debug!(width = %demand.width, "no candidate pattern produces width");
                return Err(SolveError::Infeasible);
            }
            continue;
        }
        rows.push((expr, min, max));
    }

    if xs.is_empty() {
        return Ok(Selection::default());
    }

    let mut model = vars.minimise(objective).using(default_solver);
    for (expr, min, max) in rows {
        model = model
            .with(constraint!(expr.clone() >= min))
            .with(constraint!(expr <= max));
    }

    let solution = match model.solve() {
        Ok(solution) => solution,
        Err(ResolutionError::Infeasible) => return Err(SolveError::Infeasible),
        Err(e) => return Err(SolveError::Lp(e.to_string())),
    };

    let mut selection = Selection::default();
    for (pattern, x) in patterns.iter().zip(&xs) {
        let value = solution.value(*x);
        if value > USAGE_EPSILON {
            selection.usage.insert(pattern.id, value);
            selection.total_units += value;
        }
    }
    Ok(selection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cut, Width};

    fn pattern(id: usize, cuts: &[(f64, u32)], parent_width: f64, parent_weight: f64) -> Pattern {
        let cuts: Vec<Cut> = cuts
            .iter()
            .map(|&(w, count)| Cut {
                width: Width::from_mm(w),
                count,
                weight_per_cut: w / parent_width * parent_weight,
            })
            .collect();
        let used: Width = cuts.iter().map(|c| c.width.times(c.count)).sum();
        Pattern {
            id,
            cuts,
            assigned_units: 0.0,
            used_width: used,
            waste_width: Width::from_mm(parent_width) - used,
            yield_percent: used.mm() / parent_width * 100.0,
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
    fn test_bounds_respect_tolerance() {
        let (min, max) = demand_bounds(&demand(500.0, 10.0), 10.0, 10.0);
        assert!((min - 9.0).abs() < 1e-9);
        assert!((max - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_negligible_target_has_no_lower_bound() {
        let (min, max) = demand_bounds(&demand(500.0, 0.3), 10.0, 10.0);
        assert_eq!(min, 0.0);
        assert!((max - 0.33).abs() < 1e-9);
    }

    #[test]
    fn test_single_pattern_minimum_units() {
        // 2 x 600 from a 1200 mm, 10 t parent: 10 t of 600 strip per unit
        let patterns = vec![pattern(1, &[(600.0, 2)], 1200.0, 10.0)];
        let selection = select_patterns(&patterns, &[demand(600.0, 50.0)], 0.0, 0.0).unwrap();
        assert!((selection.usage_of(1) - 5.0).abs() < 1e-6);
        assert!((selection.total_units - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_lp_stops_at_lower_tolerance() {
        let patterns = vec![pattern(1, &[(600.0, 2)], 1200.0, 10.0)];
        let selection = select_patterns(&patterns, &[demand(600.0, 50.0)], 10.0, 10.0).unwrap();
        assert!((selection.total_units - 4.5).abs() < 1e-6);
    }

    #[test]
    fn test_conflicting_bounds_are_infeasible() {
        // The only pattern producing 500 also produces 700 at a fixed ratio
        // that overshoots the 700 target.
        let patterns = vec![pattern(1, &[(700.0, 1), (500.0, 1)], 1200.0, 12.0)];
        let result = select_patterns(
            &patterns,
            &[demand(500.0, 30.0), demand(700.0, 10.0)],
            0.0,
            0.0,
        );
        assert_eq!(result, Err(SolveError::Infeasible));
    }

    #[test]
    fn test_uncovered_width_is_infeasible() {
        let patterns = vec![pattern(1, &[(600.0, 2)], 1200.0, 10.0)];
        let result = select_patterns(
            &patterns,
            &[demand(600.0, 50.0), demand(1300.0, 5.0)],
            10.0,
            10.0,
        );
        assert_eq!(result, Err(SolveError::Infeasible));
    }

    #[test]
    fn test_combined_pattern_preferred() {
        let patterns = vec![
            pattern(1, &[(500.0, 2)], 1200.0, 12.0),
            pattern(2, &[(700.0, 1)], 1200.0, 12.0),
            pattern(3, &[(700.0, 1), (500.0, 1)], 1200.0, 12.0),
        ];
        let selection = select_patterns(
            &patterns,
            &[demand(500.0, 30.0), demand(700.0, 30.0)],
            0.0,
            0.0,
        )
        .unwrap();
        let combined = selection.usage_of(3);
        assert!(combined > selection.usage_of(1));
        assert!(combined > selection.usage_of(2));
        assert!((combined - 30.0 / 7.0).abs() < 1e-6);
    }
}
