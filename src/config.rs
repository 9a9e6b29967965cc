use chrono::{Datelike, Local, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::SolveError;
use crate::types::Width;

/// Schedule construction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleMode {
    /// Earliest due first, packed forward from the anchor date.
    #[default]
    Forward,
    /// As late as possible before each due date minus the lead buffer.
    Alap,
}

impl std::str::FromStr for ScheduleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward" => Ok(ScheduleMode::Forward),
            "alap" | "jit" => Ok(ScheduleMode::Alap),
            _ => Err(format!(
                "invalid schedule mode '{}', expected: forward or alap",
                s
            )),
        }
    }
}

/// Plant-wide solver settings. Every field has a default so partial JSON
/// files are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SolverConfig {
    /// Fallback parent width (mm) when no override, master entry or
    /// description hint applies.
    pub parent_width: f64,
    /// Total trim across both edges (mm).
    pub edge_trim: f64,
    /// Weight of one parent unit (t).
    pub parent_weight: f64,
    /// Allowed under-production, percent.
    pub tolerance_min: f64,
    /// Allowed over-production, percent.
    pub tolerance_max: f64,
    pub max_cuts: u32,
    /// Tons processed per regular day.
    pub daily_capacity: f64,
    /// Tons of capacity lost per distinct pattern run in a day.
    pub setup_penalty: f64,
    pub schedule_start_date: Option<NaiveDate>,
    pub lead_buffer_days: i64,
    pub rest_days: Vec<Weekday>,
    pub rest_day_factor: f64,
    /// Extra parent units (fraction of baseline) accepted to drop a pattern.
    pub extra_waste_tolerance: f64,
    /// Yield difference (percentage points) below which best-of runs tie.
    pub best_of_epsilon: f64,
    pub attempts: u32,
    pub seed: Option<u64>,
    pub schedule_mode: ScheduleMode,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            parent_width: 1210.0,
            edge_trim: 10.0,
            parent_weight: 11.0,
            tolerance_min: 10.0,
            tolerance_max: 10.0,
            max_cuts: 16,
            daily_capacity: 300.0,
            setup_penalty: 10.0,
            schedule_start_date: None,
            lead_buffer_days: 2,
            rest_days: vec![Weekday::Sun],
            rest_day_factor: 0.5,
            extra_waste_tolerance: 0.02,
            best_of_epsilon: 0.001,
            attempts: 10,
            seed: None,
            schedule_mode: ScheduleMode::Forward,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), SolveError> {
        self.group_params(self.parent_width).validate()?;
        self.schedule_params().validate()?;
        if self.attempts == 0 {
            return Err(invalid("attempts must be at least 1"));
        }
        if !(self.best_of_epsilon >= 0.0) {
            return Err(invalid("best-of epsilon must be non-negative"));
        }
        Ok(())
    }

    pub fn group_params(&self, parent_width: f64) -> GroupParams {
        GroupParams {
            parent_width,
            edge_trim: self.edge_trim,
            parent_weight: self.parent_weight,
            max_cuts: self.max_cuts,
            tolerance_min: self.tolerance_min,
            tolerance_max: self.tolerance_max,
            extra_waste_tolerance: self.extra_waste_tolerance,
        }
    }

    pub fn schedule_params(&self) -> ScheduleParams {
        ScheduleParams {
            daily_capacity: self.daily_capacity,
            setup_penalty: self.setup_penalty,
            lead_buffer_days: self.lead_buffer_days,
            rest_days: self.rest_days.clone(),
            rest_day_factor: self.rest_day_factor,
        }
    }

    /// First day of a forward schedule; today when not configured.
    pub fn anchor_date(&self) -> NaiveDate {
        self.schedule_start_date
            .unwrap_or_else(|| Local::now().date_naive())
    }
}

/// Inputs of a single group solve.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupParams {
    pub parent_width: f64,
    pub edge_trim: f64,
    pub parent_weight: f64,
    pub max_cuts: u32,
    pub tolerance_min: f64,
    pub tolerance_max: f64,
    pub extra_waste_tolerance: f64,
}

impl GroupParams {
    pub fn validate(&self) -> Result<(), SolveError> {
        if !(self.parent_width > 0.0) {
            return Err(invalid("parent width must be positive"));
        }
        if !(self.parent_weight > 0.0) {
            return Err(invalid("parent weight must be positive"));
        }
        if !(self.edge_trim >= 0.0) || self.edge_trim >= self.parent_width {
            return Err(invalid("edge trim must be non-negative and below the parent width"));
        }
        if self.max_cuts == 0 {
            return Err(invalid("max cuts must be at least 1"));
        }
        if !(self.tolerance_min >= 0.0) || !(self.tolerance_max >= 0.0) {
            return Err(invalid("tolerances must be non-negative"));
        }
        if !(self.extra_waste_tolerance >= 0.0) {
            return Err(invalid("extra waste tolerance must be non-negative"));
        }
        Ok(())
    }

    pub fn parent(&self) -> Width {
        Width::from_mm(self.parent_width)
    }

    pub fn usable_width(&self) -> Width {
        Width::from_mm(self.parent_width).saturating_sub(Width::from_mm(self.edge_trim))
    }

    /// Weight of one strip of `width` cut from one parent unit.
    pub fn strip_weight(&self, width: Width) -> f64 {
        width.mm() / self.parent_width * self.parent_weight
    }
}

/// Inputs of the capacity schedulers.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleParams {
    pub daily_capacity: f64,
    pub setup_penalty: f64,
    pub lead_buffer_days: i64,
    pub rest_days: Vec<Weekday>,
    pub rest_day_factor: f64,
}

impl Default for ScheduleParams {
    fn default() -> Self {
        SolverConfig::default().schedule_params()
    }
}

impl ScheduleParams {
    pub fn validate(&self) -> Result<(), SolveError> {
        if !(self.daily_capacity > 0.0) {
            return Err(invalid("daily capacity must be positive"));
        }
        if !(self.setup_penalty >= 0.0) {
            return Err(invalid("setup penalty must be non-negative"));
        }
        if self.lead_buffer_days < 0 {
            return Err(invalid("lead buffer must be non-negative"));
        }
        if !(self.rest_day_factor > 0.0 && self.rest_day_factor <= 1.0) {
            return Err(invalid("rest day factor must be in (0, 1]"));
        }
        Ok(())
    }

    pub fn is_rest_day(&self, date: NaiveDate) -> bool {
        self.rest_days.contains(&date.weekday())
    }

    /// Raw capacity of `date` before setup penalties.
    pub fn capacity_on(&self, date: NaiveDate) -> f64 {
        if self.is_rest_day(date) {
            self.daily_capacity * self.rest_day_factor
        } else {
            self.daily_capacity
        }
    }
}

fn invalid(reason: &str) -> SolveError {
    SolveError::InvalidConfig(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SolverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.group_params(1210.0).usable_width(), Width::from_mm(1200.0));
    }

    #[test]
    fn test_rejects_non_positive_values() {
        let mut config = SolverConfig::default();
        config.parent_width = 0.0;
        assert!(matches!(config.validate(), Err(SolveError::InvalidConfig(_))));

        let mut config = SolverConfig::default();
        config.parent_weight = -1.0;
        assert!(matches!(config.validate(), Err(SolveError::InvalidConfig(_))));

        let mut config = SolverConfig::default();
        config.daily_capacity = 0.0;
        assert!(matches!(config.validate(), Err(SolveError::InvalidConfig(_))));

        let mut config = SolverConfig::default();
        config.edge_trim = 1210.0;
        assert!(matches!(config.validate(), Err(SolveError::InvalidConfig(_))));
    }

    #[test]
    fn test_sunday_capacity_is_halved() {
        let params = ScheduleParams::default();
        let sunday = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert_eq!(sunday.weekday(), Weekday::Sun);
        assert_eq!(params.capacity_on(sunday), 150.0);
        assert_eq!(params.capacity_on(sunday.pred_opt().unwrap()), 300.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SolverConfig =
            serde_json::from_str(r#"{"parentWidth": 1500, "restDays": ["Sat", "Sun"]}"#).unwrap();
        assert_eq!(config.parent_width, 1500.0);
        assert_eq!(config.max_cuts, 16);
        assert_eq!(config.rest_days, vec![Weekday::Sat, Weekday::Sun]);
    }

    #[test]
    fn test_schedule_mode_from_str() {
        assert_eq!("alap".parse::<ScheduleMode>(), Ok(ScheduleMode::Alap));
        assert_eq!("forward".parse::<ScheduleMode>(), Ok(ScheduleMode::Forward));
        assert!("backward".parse::<ScheduleMode>().is_err());
    }
}
