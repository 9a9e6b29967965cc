//! Coil-group orchestration: partition demand by coil code, resolve each
//! group's parent width, solve groups independently and aggregate yield.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{ScheduleMode, SolverConfig};
use crate::error::SolveError;
use crate::master::{MaterialMaster, width_from_description};
use crate::schedule::{build_schedule_alap, build_schedule_forward};
use crate::solver::solve_group;
use crate::types::{BatchResult, DemandLine, GroupSummary, WidthSource};

/// Explicit parent width (mm) per coil code.
pub type WidthOverrides = BTreeMap<String, f64>;

const GENERIC_DESCRIPTION: &str = "Generic coil";

#[derive(Debug, Clone, PartialEq)]
pub struct CoilGroup {
    pub code: String,
    pub description: String,
    pub parent_width: f64,
    pub width_source: WidthSource,
    pub total_demand: f64,
    pub demands: Vec<DemandLine>,
}

/// Override, then master entry, then description hint, then the
/// configured default.
pub fn resolve_parent_width(
    code: &str,
    description: &str,
    config: &SolverConfig,
    master: &MaterialMaster,
    overrides: &WidthOverrides,
) -> (f64, WidthSource) {
    if let Some(&width) = overrides.get(code).filter(|w| **w > 0.0) {
        return (width, WidthSource::Override);
    }
    if let Some(entry) = master.get(code).filter(|e| e.width > 0.0) {
        return (entry.width, WidthSource::Master);
    }
    if let Some(width) = width_from_description(description) {
        return (width, WidthSource::Description);
    }
    (config.parent_width, WidthSource::Default)
}

/// Groups demand lines by coil code, largest total demand first.
pub fn prepare_groups(
    demands: &[DemandLine],
    config: &SolverConfig,
    master: &MaterialMaster,
    overrides: &WidthOverrides,
) -> Vec<CoilGroup> {
    let mut by_code: BTreeMap<&str, Vec<DemandLine>> = BTreeMap::new();
    for d in demands {
        by_code.entry(d.group_code()).or_default().push(d.clone());
    }

    let mut groups: Vec<CoilGroup> = by_code
        .into_iter()
        .map(|(code, lines)| {
            let description = lines
                .iter()
                .filter_map(|d| d.coil_description.as_deref())
                .find(|s| !s.trim().is_empty())
                .unwrap_or(GENERIC_DESCRIPTION)
                .to_string();
            let (parent_width, width_source) =
                resolve_parent_width(code, &description, config, master, overrides);
            CoilGroup {
                code: code.to_string(),
                description,
                parent_width,
                width_source,
                total_demand: lines.iter().map(|d| d.target_tons).sum(),
                demands: lines,
            }
        })
        .collect();
    groups.sort_by(|a, b| b.total_demand.total_cmp(&a.total_demand));
    groups
}

/// RNG for one best-of attempt: seeded streams are reproducible, unseeded
/// ones draw from the OS.
pub fn attempt_rng(seed: Option<u64>, attempt: u32) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(attempt as u64)),
        None => StdRng::from_entropy(),
    }
}

pub fn solve_batch(
    demands: &[DemandLine],
    config: &SolverConfig,
    master: &MaterialMaster,
    overrides: &WidthOverrides,
    generate_schedule: bool,
) -> Result<BatchResult, SolveError> {
    config.validate()?;
    let mut batch = run_attempt(demands, config, master, overrides, 0);
    if generate_schedule {
        schedule_batch(&mut batch, demands, config);
    }
    Ok(batch)
}

/// Runs the randomized pipeline `attempts` times and keeps the best run:
/// higher global yield beyond `best_of_epsilon`, then fewer patterns.
pub fn solve_batch_best_of(
    demands: &[DemandLine],
    config: &SolverConfig,
    master: &MaterialMaster,
    overrides: &WidthOverrides,
    attempts: u32,
    generate_schedule: bool,
) -> Result<BatchResult, SolveError> {
    config.validate()?;
    let runs = (0..attempts.max(1)).map(|attempt| {
        let run = run_attempt(demands, config, master, overrides, attempt);
        tracing::debug!(
            attempt,
            yield_percent = run.total_global_yield,
            patterns = run.total_patterns(),
            "best-of attempt finished"
        );
        run
    });
    let Some(mut best) = pick_best(runs, config.best_of_epsilon) else {
        return Err(SolveError::InvalidConfig("no attempts were run".to_string()));
    };
    tracing::info!(
        attempts,
        yield_percent = best.total_global_yield,
        patterns = best.total_patterns(),
        "best-of solve finished"
    );
    if generate_schedule {
        schedule_batch(&mut best, demands, config);
    }
    Ok(best)
}

/// Folds runs into the winner. The winner always stays within `epsilon`
/// of the highest yield seen, however many ties were accepted.
pub fn pick_best(
    runs: impl IntoIterator<Item = BatchResult>,
    epsilon: f64,
) -> Option<BatchResult> {
    let mut runs = runs.into_iter();
    let mut best = runs.next()?;
    let mut peak = best.total_global_yield;
    for candidate in runs {
        peak = peak.max(candidate.total_global_yield);
        if is_better(&candidate, &best, peak, epsilon) {
            best = candidate;
        }
    }
    Some(best)
}

/// A tie within `epsilon` goes to fewer patterns, but only while the
/// candidate is still within `epsilon` of `peak_yield`.
pub fn is_better(
    candidate: &BatchResult,
    incumbent: &BatchResult,
    peak_yield: f64,
    epsilon: f64,
) -> bool {
    let diff = candidate.total_global_yield - incumbent.total_global_yield;
    if diff > epsilon {
        return true;
    }
    diff.abs() <= epsilon
        && candidate.total_global_yield >= peak_yield - epsilon
        && candidate.total_patterns() < incumbent.total_patterns()
}

/// One pass of the pipeline over every group, using the RNG stream of
/// `attempt`.
pub fn run_attempt(
    demands: &[DemandLine],
    config: &SolverConfig,
    master: &MaterialMaster,
    overrides: &WidthOverrides,
    attempt: u32,
) -> BatchResult {
    let mut rng = attempt_rng(config.seed, attempt);
    solve_groups(demands, config, master, overrides, &mut rng)
}

fn solve_groups<R: Rng + ?Sized>(
    demands: &[DemandLine],
    config: &SolverConfig,
    master: &MaterialMaster,
    overrides: &WidthOverrides,
    rng: &mut R,
) -> BatchResult {
    let mut batch = BatchResult {
        summary: Vec::new(),
        results: BTreeMap::new(),
        failures: BTreeMap::new(),
        total_global_yield: 0.0,
        total_global_input: 0.0,
        total_global_output: 0.0,
        schedule: None,
    };

    for group in prepare_groups(demands, config, master, overrides) {
        let params = config.group_params(group.parent_width);
        match solve_group(&group.demands, &params, rng) {
            Ok(result) => {
                tracing::info!(
                    group = %group.code,
                    parent_width = group.parent_width,
                    patterns = result.pattern_count(),
                    units = result.total_units,
                    yield_percent = result.global_yield,
                    "group solved"
                );
                batch.results.insert(group.code.clone(), result);
            }
            Err(e) => {
                tracing::warn!(group = %group.code, error = %e, "group failed");
                batch.failures.insert(group.code.clone(), e);
            }
        }
        batch.summary.push(GroupSummary {
            coil_code: group.code,
            description: group.description,
            total_input_tons: 0.0,
            total_output_tons: 0.0,
            yield_percent: 0.0,
            waste_percent: 0.0,
            parent_width: group.parent_width,
            width_source: group.width_source,
        });
    }

    refresh_totals(&mut batch);
    batch
}

/// Recomputes per-group summaries and the weighted global yield from the
/// current group results.
pub fn refresh_totals(batch: &mut BatchResult) {
    let mut input = 0.0;
    let mut output = 0.0;
    for row in &mut batch.summary {
        let (group_in, group_out) = batch
            .results
            .get(&row.coil_code)
            .map_or((0.0, 0.0), |r| (r.input_tons(), r.output_tons()));
        row.total_input_tons = group_in;
        row.total_output_tons = group_out;
        row.yield_percent = if group_in > 0.0 {
            group_out / group_in * 100.0
        } else {
            0.0
        };
        row.waste_percent = 100.0 - row.yield_percent;
        input += group_in;
        output += group_out;
    }
    batch
        .summary
        .sort_by(|a, b| b.total_input_tons.total_cmp(&a.total_input_tons));
    batch.total_global_input = input;
    batch.total_global_output = output;
    batch.total_global_yield = if input > 0.0 { output / input * 100.0 } else { 0.0 };
}

/// Re-solves a single coil group in place. On failure the batch is left
/// untouched; on success the stale schedule is dropped.
pub fn reoptimize_group<R: Rng + ?Sized>(
    batch: &mut BatchResult,
    code: &str,
    demands: &[DemandLine],
    config: &SolverConfig,
    master: &MaterialMaster,
    overrides: &WidthOverrides,
    rng: &mut R,
) -> Result<(), SolveError> {
    config.validate()?;
    let group = prepare_groups(demands, config, master, overrides)
        .into_iter()
        .find(|g| g.code == code)
        .ok_or_else(|| SolveError::InvalidConfig(format!("unknown coil group '{code}'")))?;

    let result = solve_group(&group.demands, &config.group_params(group.parent_width), rng)?;
    tracing::info!(
        group = %code,
        patterns = result.pattern_count(),
        yield_percent = result.global_yield,
        "group re-optimized"
    );

    batch.results.insert(group.code.clone(), result);
    batch.failures.remove(&group.code);
    match batch.summary.iter_mut().find(|s| s.coil_code == group.code) {
        Some(row) => {
            row.parent_width = group.parent_width;
            row.width_source = group.width_source;
            row.description = group.description;
        }
        None => batch.summary.push(GroupSummary {
            coil_code: group.code,
            description: group.description,
            total_input_tons: 0.0,
            total_output_tons: 0.0,
            yield_percent: 0.0,
            waste_percent: 0.0,
            parent_width: group.parent_width,
            width_source: group.width_source,
        }),
    }
    refresh_totals(batch);
    batch.schedule = None;
    Ok(())
}

/// Builds the production calendar for the batch's current results.
pub fn schedule_batch(batch: &mut BatchResult, demands: &[DemandLine], config: &SolverConfig) {
    let params = config.schedule_params();
    let schedule = match config.schedule_mode {
        ScheduleMode::Forward => {
            build_schedule_forward(&batch.results, demands, &params, config.anchor_date())
        }
        ScheduleMode::Alap => build_schedule_alap(&batch.results, demands, &params),
    };
    if let Err(e) = schedule.check_complete() {
        tracing::warn!(error = %e, "schedule incomplete");
    }
    batch.schedule = Some(schedule);
}
