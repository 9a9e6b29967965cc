use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::build_schedule_forward;
use crate::config::ScheduleParams;
use crate::types::{DailyPlan, DemandLine, Schedule, SolveResult, Width};

/// Demand lines at or below this many tons are considered fulfilled.
const OPEN_DEMAND_TONS: f64 = 0.01;
/// Production more than this many days ahead of the due date is early.
const EARLY_AFTER_DAYS: i64 = 5;

/// Earliest production date per (group, width).
fn first_production(days: &[DailyPlan]) -> HashMap<(&str, Width), NaiveDate> {
    let mut first: HashMap<(&str, Width), NaiveDate> = HashMap::new();
    for day in days {
        for entry in &day.patterns {
            for cut in &entry.pattern.cuts {
                first
                    .entry((entry.coil_code.as_str(), cut.width))
                    .and_modify(|d| *d = (*d).min(day.date))
                    .or_insert(day.date);
            }
        }
    }
    first
}

/// Largest signed gap in days between first production and
/// `due - buffer_days` over all open demand lines. Positive means late.
/// `None` when no open demand line is produced at all.
pub fn compute_max_offset(days: &[DailyPlan], demands: &[DemandLine], buffer_days: i64) -> Option<i64> {
    let produced = first_production(days);
    demands
        .iter()
        .filter(|d| d.target_tons > OPEN_DEMAND_TONS)
        .filter_map(|d| {
            let production = produced.get(&(d.group_code(), d.width))?;
            let target = d.due_date - Duration::days(buffer_days);
            Some((*production - target).num_days())
        })
        .max()
}

/// Days by which the latest demand line misses its buffered due date;
/// 0 when every line is on time or nothing is pending.
pub fn compute_max_lateness(days: &[DailyPlan], demands: &[DemandLine], buffer_days: i64) -> i64 {
    compute_max_offset(days, demands, buffer_days).map_or(0, |offset| offset.max(0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComplianceStatus {
    /// Width never produced by the schedule.
    Pending,
    Late,
    OnTime,
    Early,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceRow {
    pub coil_code: String,
    pub width: Width,
    pub target_tons: f64,
    pub due_date: NaiveDate,
    pub production_date: Option<NaiveDate>,
    /// Due date minus production date; negative when late.
    pub days_diff: Option<i64>,
    pub status: ComplianceStatus,
}

/// Per demand line comparison of due date against first production.
pub fn compliance_report(days: &[DailyPlan], demands: &[DemandLine]) -> Vec<ComplianceRow> {
    let produced = first_production(days);
    let mut rows: Vec<ComplianceRow> = demands
        .iter()
        .filter(|d| d.target_tons > OPEN_DEMAND_TONS)
        .map(|d| {
            let production_date = produced.get(&(d.group_code(), d.width)).copied();
            let days_diff = production_date.map(|p| (d.due_date - p).num_days());
            let status = match days_diff {
                None => ComplianceStatus::Pending,
                Some(diff) if diff < 0 => ComplianceStatus::Late,
                Some(diff) if diff > EARLY_AFTER_DAYS => ComplianceStatus::Early,
                Some(_) => ComplianceStatus::OnTime,
            };
            ComplianceRow {
                coil_code: d.group_code().to_string(),
                width: d.width,
                target_tons: d.target_tons,
                due_date: d.due_date,
                production_date,
                days_diff,
                status,
            }
        })
        .collect();
    rows.sort_by(|a, b| a.due_date.cmp(&b.due_date).then_with(|| a.coil_code.cmp(&b.coil_code)));
    rows
}

/// Builds a forward schedule at `anchor`, then shifts the anchor by the
/// signed max offset and reschedules once. Returns the anchor used.
pub fn reanchor_forward(
    results: &BTreeMap<String, SolveResult>,
    demands: &[DemandLine],
    params: &ScheduleParams,
    anchor: NaiveDate,
) -> (Schedule, NaiveDate) {
    let schedule = build_schedule_forward(results, demands, params, anchor);
    let offset = match compute_max_offset(&schedule.days, demands, params.lead_buffer_days) {
        Some(offset) if offset != 0 => offset,
        _ => return (schedule, anchor),
    };
    let Some(shifted) = anchor.checked_sub_signed(Duration::days(offset)) else {
        return (schedule, anchor);
    };
    tracing::info!(offset, from = %anchor, to = %shifted, "re-anchoring forward schedule");
    (build_schedule_forward(results, demands, params, shifted), shifted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::fixtures::*;

    fn two_pattern_results() -> BTreeMap<String, SolveResult> {
        results(vec![(
            "A",
            vec![
                pattern(1, &[(500.0, 2)], 2.0, 10.0),
                pattern(2, &[(300.0, 3)], 2.0, 10.0),
            ],
        )])
    }

    fn demands(due_300: NaiveDate, due_500: NaiveDate) -> Vec<DemandLine> {
        vec![
            DemandLine::new(500.0, 20.0, due_500).with_coil("A", ""),
            DemandLine::new(300.0, 18.0, due_300).with_coil("A", ""),
        ]
    }

    #[test]
    fn test_on_time_schedule_has_no_lateness() {
        let demands = demands(date(11, 12), date(11, 13));
        let schedule = build_schedule_forward(
            &two_pattern_results(),
            &demands,
            &params(30.0, 10.0),
            date(11, 9),
        );
        assert_eq!(compute_max_offset(&schedule.days, &demands, 2), Some(-1));
        assert_eq!(compute_max_lateness(&schedule.days, &demands, 2), 0);
    }

    #[test]
    fn test_late_schedule_reports_days() {
        let demands = demands(date(11, 10), date(11, 11));
        let schedule = build_schedule_forward(
            &two_pattern_results(),
            &demands,
            &params(30.0, 10.0),
            date(11, 9),
        );
        assert_eq!(compute_max_lateness(&schedule.days, &demands, 2), 1);
        assert_eq!(compute_max_lateness(&schedule.days, &demands, 0), 0);
    }

    #[test]
    fn test_no_open_demand_is_zero() {
        let mut demands = demands(date(11, 10), date(11, 11));
        for d in &mut demands {
            d.target_tons = 0.0;
        }
        let schedule = build_schedule_forward(
            &two_pattern_results(),
            &demands,
            &params(30.0, 10.0),
            date(11, 9),
        );
        assert_eq!(compute_max_offset(&schedule.days, &demands, 2), None);
        assert_eq!(compute_max_lateness(&schedule.days, &demands, 2), 0);
        assert_eq!(compute_max_lateness(&[], &demands, 2), 0);
    }

    #[test]
    fn test_compliance_statuses() {
        let mut demands = demands(date(11, 12), date(11, 9));
        demands.push(DemandLine::new(700.0, 5.0, date(11, 12)).with_coil("A", ""));
        demands.push(DemandLine::new(300.0, 1.0, date(11, 30)).with_coil("A", ""));
        let schedule = build_schedule_forward(
            &two_pattern_results(),
            &demands,
            &params(30.0, 10.0),
            date(11, 9),
        );
        // 500 runs on 11-09 (due first), 300 on 11-10.
        let report = compliance_report(&schedule.days, &demands);
        let statuses: Vec<(Width, ComplianceStatus, Option<i64>)> =
            report.iter().map(|r| (r.width, r.status, r.days_diff)).collect();
        assert_eq!(
            statuses,
            vec![
                (Width::from_mm(500.0), ComplianceStatus::OnTime, Some(0)),
                (Width::from_mm(300.0), ComplianceStatus::OnTime, Some(2)),
                (Width::from_mm(700.0), ComplianceStatus::Pending, None),
                (Width::from_mm(300.0), ComplianceStatus::Early, Some(20)),
            ]
        );
    }

    #[test]
    fn test_late_row_has_negative_diff() {
        let demands = demands(date(11, 9), date(11, 9));
        let schedule = build_schedule_forward(
            &two_pattern_results(),
            &demands,
            &params(30.0, 10.0),
            date(11, 9),
        );
        let report = compliance_report(&schedule.days, &demands);
        assert!(report.iter().any(|r| r.status == ComplianceStatus::Late && r.days_diff == Some(-1)));
    }

    #[test]
    fn test_reanchor_pulls_late_schedule_forward() {
        // Tuesday anchor is one day late for both lines.
        let demands = demands(date(11, 11), date(11, 12));
        let results = two_pattern_results();
        let params = params(30.0, 10.0);
        let before = build_schedule_forward(&results, &demands, &params, date(11, 10));
        assert_eq!(compute_max_lateness(&before.days, &demands, 2), 1);

        let (after, anchor) = reanchor_forward(&results, &demands, &params, date(11, 10));
        assert_eq!(anchor, date(11, 9));
        assert_eq!(after.first_date(), Some(date(11, 9)));
        assert_eq!(compute_max_offset(&after.days, &demands, 2), Some(0));
    }

    #[test]
    fn test_reanchor_keeps_exact_schedule() {
        let demands = demands(date(11, 11), date(11, 12));
        let (_, anchor) =
            reanchor_forward(&two_pattern_results(), &demands, &params(30.0, 10.0), date(11, 9));
        assert_eq!(anchor, date(11, 9));
    }
}
