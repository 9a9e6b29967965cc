use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, Local, NaiveDate};

use super::{DayLedger, ProductionUnit, description_map, expand_units, overload_warning};
use crate::config::ScheduleParams;
use crate::types::{DemandLine, Schedule, SolveResult, Width};

/// Days a unit may step back from its ideal date looking for room.
pub const MAX_LOOKBACK_DAYS: usize = 730;
/// Stock units aim this far past the latest due date.
const STOCK_HORIZON_DAYS: i64 = 365;

/// Places every unit as late as possible: on its earliest due date minus
/// the lead buffer, or the nearest earlier day with room.
pub fn build_schedule_alap(
    results: &BTreeMap<String, SolveResult>,
    demands: &[DemandLine],
    params: &ScheduleParams,
) -> Schedule {
    let descriptions = description_map(demands);

    let mut earliest_due: HashMap<(&str, Width), NaiveDate> = HashMap::new();
    for d in demands {
        earliest_due
            .entry((d.group_code(), d.width))
            .and_modify(|due| *due = (*due).min(d.due_date))
            .or_insert(d.due_date);
    }
    let latest_due = demands
        .iter()
        .map(|d| d.due_date)
        .max()
        .unwrap_or_else(|| Local::now().date_naive());
    let stock_date = shift(latest_due, STOCK_HORIZON_DAYS);
    let buffer = params.lead_buffer_days;

    let mut tasks: Vec<(NaiveDate, ProductionUnit<'_>)> = expand_units(results)
        .into_iter()
        .map(|unit| {
            let due = unit
                .pattern
                .cuts
                .iter()
                .filter_map(|cut| earliest_due.get(&(unit.code, cut.width)).copied())
                .min()
                .unwrap_or(stock_date);
            (shift(due, -buffer), unit)
        })
        .collect();
    // Latest-needed work claims its slot first.
    tasks.sort_by(|(a, ua), (b, ub)| {
        b.cmp(a)
            .then_with(|| ua.code.cmp(ub.code))
            .then_with(|| ua.pattern.id.cmp(&ub.pattern.id))
    });

    let mut calendar: BTreeMap<NaiveDate, DayLedger> = BTreeMap::new();
    let mut schedule = Schedule::default();
    for (ideal, unit) in &tasks {
        // Units too heavy for any regular day take the first empty one.
        let oversized = unit.weight + params.setup_penalty > params.daily_capacity;
        let mut date = *ideal;
        let mut placed = false;
        for _ in 0..MAX_LOOKBACK_DAYS {
            let ledger = calendar.entry(date).or_insert_with(|| DayLedger::new(date));
            if ledger.fits(unit, params) || (oversized && ledger.is_empty()) {
                ledger.place(unit, &descriptions);
                placed = true;
                break;
            }
            match date.pred_opt() {
                Some(d) => date = d,
                None => break,
            }
        }
        if !placed {
            schedule.unplaced += 1;
        }
    }

    for ledger in calendar.into_values().filter(|l| !l.is_empty()) {
        let plan = ledger.into_plan(params);
        if plan.overloaded {
            schedule.warnings.push(overload_warning(&plan));
        }
        schedule.days.push(plan);
    }

    if schedule.unplaced > 0 {
        tracing::warn!(
            unplaced = schedule.unplaced,
            "no free day within lookback window"
        );
        schedule.warnings.push(format!(
            "{} units found no free day within {} days of their target",
            schedule.unplaced, MAX_LOOKBACK_DAYS
        ));
    }
    tracing::debug!(
        days = schedule.days.len(),
        units = tasks.len() - schedule.unplaced,
        "as-late-as-possible schedule built"
    );
    schedule
}

fn shift(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(Duration::days(days)).unwrap_or(date)
}
