use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use super::{DayLedger, ProductionUnit, description_map, expand_units, overload_warning};
use crate::config::ScheduleParams;
use crate::types::{DemandLine, Schedule, SolveResult, Width};

/// Days the forward pass may open before giving up on remaining units.
pub const MAX_FORWARD_DAYS: usize = 365;
const SATISFIED_TONS: f64 = 0.001;

/// Outstanding tons per due date for one (group, width), consumed in date
/// order through a cursor.
#[derive(Debug, Clone, Default)]
struct DemandQueue {
    entries: Vec<(NaiveDate, f64)>,
    cursor: usize,
}

impl DemandQueue {
    fn peek(&mut self) -> Option<NaiveDate> {
        while self
            .entries
            .get(self.cursor)
            .is_some_and(|&(_, tons)| tons <= SATISFIED_TONS)
        {
            self.cursor += 1;
        }
        self.entries.get(self.cursor).map(|&(date, _)| date)
    }

    fn consume(&mut self, mut tons: f64) {
        while tons > 0.0 && self.peek().is_some() {
            let entry = &mut self.entries[self.cursor];
            let take = entry.1.min(tons);
            entry.1 -= take;
            tons -= take;
        }
    }
}

/// Remaining demand per (group, width), used to give each produced unit
/// the due date it actually serves.
#[derive(Debug, Clone, Default)]
pub struct DemandTracker {
    queues: HashMap<(String, Width), DemandQueue>,
}

impl DemandTracker {
    pub fn new(demands: &[DemandLine]) -> Self {
        let mut queues: HashMap<(String, Width), DemandQueue> = HashMap::new();
        for d in demands.iter().filter(|d| d.target_tons > SATISFIED_TONS) {
            queues
                .entry((d.group_code().to_string(), d.width))
                .or_default()
                .entries
                .push((d.due_date, d.target_tons));
        }
        for queue in queues.values_mut() {
            queue.entries.sort_by_key(|&(date, _)| date);
        }
        Self { queues }
    }

    /// Earliest due date still open for `(code, width)`.
    pub fn peek(&mut self, code: &str, width: Width) -> Option<NaiveDate> {
        self.queues
            .get_mut(&(code.to_string(), width))
            .and_then(DemandQueue::peek)
    }

    pub fn consume(&mut self, code: &str, width: Width, tons: f64) {
        if let Some(queue) = self.queues.get_mut(&(code.to_string(), width)) {
            queue.consume(tons);
        }
    }
}

/// Packs units earliest-due first, starting at `anchor`. Units with no
/// remaining demand are stock and go last.
pub fn build_schedule_forward(
    results: &BTreeMap<String, SolveResult>,
    demands: &[DemandLine],
    params: &ScheduleParams,
    anchor: NaiveDate,
) -> Schedule {
    let descriptions = description_map(demands);
    let mut tracker = DemandTracker::new(demands);

    let mut queue: Vec<(Option<NaiveDate>, ProductionUnit<'_>)> = expand_units(results)
        .into_iter()
        .map(|unit| {
            let urgency = unit
                .pattern
                .cuts
                .iter()
                .filter_map(|cut| tracker.peek(unit.code, cut.width))
                .min();
            for cut in &unit.pattern.cuts {
                tracker.consume(unit.code, cut.width, cut.count as f64 * cut.weight_per_cut);
            }
            (urgency, unit)
        })
        .collect();
    queue.sort_by(|(a, ua), (b, ub)| {
        (a.is_none(), a, ua.code, ua.pattern.id).cmp(&(b.is_none(), b, ub.code, ub.pattern.id))
    });

    let mut schedule = Schedule::default();
    let mut next = 0;
    let mut date = anchor;
    for _ in 0..MAX_FORWARD_DAYS {
        if next >= queue.len() {
            break;
        }
        let mut ledger = DayLedger::new(date);
        while let Some((_, unit)) = queue.get(next) {
            // Units too heavy for any regular day take the first empty one.
            let oversized = unit.weight + params.setup_penalty > params.daily_capacity;
            if !ledger.fits(unit, params) && !(oversized && ledger.is_empty()) {
                break;
            }
            ledger.place(unit, &descriptions);
            next += 1;
        }

        if !ledger.is_empty() {
            let plan = ledger.into_plan(params);
            if plan.overloaded {
                schedule.warnings.push(overload_warning(&plan));
            }
            schedule.days.push(plan);
        }
        match date.succ_opt() {
            Some(d) => date = d,
            None => break,
        }
    }

    schedule.unplaced = queue.len() - next;
    if schedule.unplaced > 0 {
        tracing::warn!(
            unplaced = schedule.unplaced,
            days = schedule.days.len(),
            "forward schedule horizon exhausted"
        );
        schedule.warnings.push(format!(
            "{} units could not be placed within {} days",
            schedule.unplaced, MAX_FORWARD_DAYS
        ));
    }
    tracing::debug!(
        days = schedule.days.len(),
        units = next,
        "forward schedule built"
    );
    schedule
}
