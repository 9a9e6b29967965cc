use rand::Rng;

use crate::config::GroupParams;
use crate::error::SolveError;
use crate::lp::{NEGLIGIBLE_TARGET_TONS, select_patterns};
use crate::patterns::PatternGenerator;
use crate::reduce::{ACTIVE_EPSILON, reduce_patterns};
use crate::types::{AggregatedDemand, Cut, DemandLine, Fulfillment, Pattern, SolveResult, Width, aggregate};

/// Shortfall (tons) below the tolerance band that is still reported as met.
const UNMET_SLACK_TONS: f64 = 0.01;

/// Solves one coil group: generate candidates, select by LP, then reduce
/// the number of distinct patterns.
pub fn solve_group<R: Rng + ?Sized>(
    demands: &[DemandLine],
    params: &GroupParams,
    rng: &mut R,
) -> Result<SolveResult, SolveError> {
    params.validate()?;
    if let Some(bad) = demands
        .iter()
        .find(|d| d.width.raw() <= 0 || !(d.target_tons >= 0.0))
    {
        return Err(SolveError::InvalidConfig(format!(
            "demand width {} mm / {} t is not usable",
            bad.width, bad.target_tons
        )));
    }

    let aggregated = aggregate(demands);
    if aggregated.is_empty() {
        return Ok(SolveResult::empty(params.parent_width));
    }

    let usable = params.usable_width();
    let widths: Vec<Width> = aggregated.iter().map(|d| d.width).collect();
    let vectors = PatternGenerator::new(&widths, usable, params.max_cuts).generate(rng);
    if vectors.is_empty() {
        return Err(SolveError::EmptyPatternPool {
            usable_width: usable,
        });
    }

    let candidates = build_patterns(&vectors, &aggregated, params);
    let initial = select_patterns(
        &candidates,
        &aggregated,
        params.tolerance_min,
        params.tolerance_max,
    )?;

    let reduction = reduce_patterns(
        &candidates,
        initial,
        &aggregated,
        params.tolerance_min,
        params.tolerance_max,
        params.extra_waste_tolerance,
    );
    tracing::debug!(
        candidates = candidates.len(),
        baseline = reduction.baseline_units,
        units = reduction.selection.total_units,
        removed = reduction.removed,
        "pattern selection finished"
    );

    let patterns: Vec<Pattern> = reduction
        .pool
        .into_iter()
        .filter_map(|mut p| {
            let units = reduction.selection.usage_of(p.id);
            if units <= ACTIVE_EPSILON {
                return None;
            }
            p.assigned_units = units;
            p.total_production_weight = units * params.parent_weight;
            Some(p)
        })
        .collect();

    Ok(finalize(patterns, &aggregated, params))
}

/// Turns count vectors (aligned with `aggregated`) into patterns with ids
/// starting at 1.
pub fn build_patterns(
    vectors: &[Vec<u32>],
    aggregated: &[AggregatedDemand],
    params: &GroupParams,
) -> Vec<Pattern> {
    let parent = params.parent();
    vectors
        .iter()
        .enumerate()
        .map(|(idx, counts)| {
            let mut cuts: Vec<Cut> = counts
                .iter()
                .zip(aggregated)
                .filter(|(c, _)| **c > 0)
                .map(|(&count, d)| Cut {
                    width: d.width,
                    count,
                    weight_per_cut: params.strip_weight(d.width),
                })
                .collect();
            cuts.sort_by(|a, b| b.width.cmp(&a.width));
            let used: Width = cuts.iter().map(|c| c.width.times(c.count)).sum();
            Pattern {
                id: idx + 1,
                cuts,
                assigned_units: 0.0,
                used_width: used,
                waste_width: parent.saturating_sub(used),
                yield_percent: used.mm() / params.parent_width * 100.0,
                total_production_weight: 0.0,
            }
        })
        .collect()
}

fn finalize(mut patterns: Vec<Pattern>, aggregated: &[AggregatedDemand], params: &GroupParams) -> SolveResult {
    let fulfillment: Vec<Fulfillment> = aggregated
        .iter()
        .map(|d| Fulfillment {
            width: d.width,
            target_tons: d.target_tons,
            produced_tons: patterns
                .iter()
                .filter_map(|p| {
                    p.cut_for(d.width)
                        .map(|c| p.assigned_units * c.count as f64 * c.weight_per_cut)
                })
                .sum(),
        })
        .collect();

    patterns.sort_by(|a, b| b.assigned_units.total_cmp(&a.assigned_units));
    let total_units: f64 = patterns.iter().map(|p| p.assigned_units).sum();
    let input: f64 = patterns.iter().map(|p| p.total_production_weight).sum();
    let output: f64 = patterns.iter().map(Pattern::output_tons).sum();
    let global_yield = if input > 0.0 { output / input * 100.0 } else { 0.0 };

    SolveResult {
        unmet_demands: unmet_demands(&fulfillment, params.tolerance_min),
        patterns,
        fulfillment,
        total_units,
        global_yield,
        global_waste: 100.0 - global_yield,
        parent_width: params.parent_width,
    }
}

/// Human-readable warnings for widths produced below their tolerance band.
pub fn unmet_demands(fulfillment: &[Fulfillment], tolerance_min: f64) -> Vec<String> {
    fulfillment
        .iter()
        .filter(|f| f.target_tons >= NEGLIGIBLE_TARGET_TONS)
        .filter(|f| {
            let min_required = f.target_tons * (1.0 - tolerance_min / 100.0);
            f.produced_tons < min_required - UNMET_SLACK_TONS
        })
        .map(|f| {
            format!(
                "width {}: {:.1} / {:.1} t",
                f.width, f.produced_tons, f.target_tons
            )
        })
        .collect()
}
