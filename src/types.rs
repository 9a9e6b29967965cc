use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

use crate::error::SolveError;

/// Fixed-point scale: widths are held in hundredths of a millimetre.
pub const SCALE: i64 = 100;

/// Group code used for demand lines without a coil code.
pub const DEFAULT_GROUP: &str = "DEFAULT";

/// A strip or parent width in fixed-point hundredths of a millimetre.
///
/// All fit comparisons go through this type so that exact-fit layouts
/// (e.g. 2 x 600 in 1200) never fail on floating-point drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Width(i64);

impl Width {
    pub const ZERO: Width = Width(0);

    pub fn from_mm(mm: f64) -> Self {
        Self((mm * SCALE as f64).round() as i64)
    }

    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> i64 {
        self.0
    }

    pub fn mm(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }

    pub fn times(self, count: u32) -> Self {
        Self(self.0 * count as i64)
    }

    pub fn saturating_sub(self, other: Width) -> Self {
        Self((self.0 - other.0).max(0))
    }
}

impl std::ops::Add for Width {
    type Output = Width;

    fn add(self, rhs: Width) -> Width {
        Width(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Width {
    type Output = Width;

    fn sub(self, rhs: Width) -> Width {
        Width(self.0 - rhs.0)
    }
}

impl std::iter::Sum for Width {
    fn sum<I: Iterator<Item = Width>>(iter: I) -> Width {
        Width(iter.map(|w| w.0).sum())
    }
}

impl std::fmt::Display for Width {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 % SCALE == 0 {
            write!(f, "{}", self.0 / SCALE)
        } else {
            write!(f, "{:.2}", self.mm())
        }
    }
}

impl Serialize for Width {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.mm())
    }
}

impl<'de> Deserialize<'de> for Width {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mm = f64::deserialize(deserializer)?;
        if !mm.is_finite() || mm < 0.0 {
            return Err(D::Error::custom(format!("invalid width {mm}")));
        }
        Ok(Width::from_mm(mm))
    }
}

/// One line of required production, as handed over by the ingestion layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandLine {
    pub width: Width,
    /// Tons still to manufacture.
    pub target_tons: f64,
    #[serde(default)]
    pub planned_consumption: Option<f64>,
    #[serde(default)]
    pub reserved_stock: Option<f64>,
    #[serde(alias = "date")]
    pub due_date: NaiveDate,
    #[serde(default)]
    pub coil_code: Option<String>,
    #[serde(default)]
    pub coil_description: Option<String>,
}

impl DemandLine {
    pub fn new(width_mm: f64, target_tons: f64, due_date: NaiveDate) -> Self {
        Self {
            width: Width::from_mm(width_mm),
            target_tons,
            planned_consumption: None,
            reserved_stock: None,
            due_date,
            coil_code: None,
            coil_description: None,
        }
    }

    pub fn with_coil(mut self, code: &str, description: &str) -> Self {
        self.coil_code = Some(code.to_string());
        self.coil_description = Some(description.to_string());
        self
    }

    /// The coil group this line belongs to.
    pub fn group_code(&self) -> &str {
        match self.coil_code.as_deref() {
            Some(code) if !code.trim().is_empty() => code,
            _ => DEFAULT_GROUP,
        }
    }
}

/// Total demand for one distinct width within a group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatedDemand {
    pub width: Width,
    pub target_tons: f64,
}

/// Sums target tons per distinct width, ordered by width ascending.
pub fn aggregate(demands: &[DemandLine]) -> Vec<AggregatedDemand> {
    let mut by_width: BTreeMap<Width, f64> = BTreeMap::new();
    for d in demands {
        *by_width.entry(d.width).or_insert(0.0) += d.target_tons;
    }
    by_width
        .into_iter()
        .map(|(width, target_tons)| AggregatedDemand { width, target_tons })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cut {
    pub width: Width,
    pub count: u32,
    /// Weight of one strip of this width from one parent unit.
    pub weight_per_cut: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub id: usize,
    /// Cuts ordered by width descending.
    pub cuts: Vec<Cut>,
    /// Parent units assigned by the LP (fractional).
    pub assigned_units: f64,
    pub used_width: Width,
    /// Unused width including edge trim.
    pub waste_width: Width,
    pub yield_percent: f64,
    pub total_production_weight: f64,
}

impl Pattern {
    pub fn cut_for(&self, width: Width) -> Option<&Cut> {
        self.cuts.iter().find(|c| c.width == width)
    }

    pub fn strip_count(&self) -> u32 {
        self.cuts.iter().map(|c| c.count).sum()
    }

    /// Weight of a single parent unit run through this pattern.
    pub fn unit_weight(&self) -> f64 {
        if self.assigned_units > 0.0 {
            self.total_production_weight / self.assigned_units
        } else {
            0.0
        }
    }

    /// Tons of strip actually produced (production weight net of waste).
    pub fn output_tons(&self) -> f64 {
        self.total_production_weight * self.yield_percent / 100.0
    }

    /// Whole parent units needed to run this pattern on the shop floor.
    pub fn whole_units(&self) -> u32 {
        self.assigned_units.ceil().max(0.0) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fulfillment {
    pub width: Width,
    pub target_tons: f64,
    pub produced_tons: f64,
}

/// Outcome of solving one coil group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveResult {
    pub patterns: Vec<Pattern>,
    pub fulfillment: Vec<Fulfillment>,
    pub total_units: f64,
    pub global_yield: f64,
    pub global_waste: f64,
    pub unmet_demands: Vec<String>,
    pub parent_width: f64,
}

impl SolveResult {
    pub fn empty(parent_width: f64) -> Self {
        Self {
            patterns: Vec::new(),
            fulfillment: Vec::new(),
            total_units: 0.0,
            global_yield: 0.0,
            global_waste: 0.0,
            unmet_demands: Vec::new(),
            parent_width,
        }
    }

    pub fn input_tons(&self) -> f64 {
        self.patterns.iter().map(|p| p.total_production_weight).sum()
    }

    pub fn output_tons(&self) -> f64 {
        self.patterns.iter().map(Pattern::output_tons).sum()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn produced_for(&self, width: Width) -> f64 {
        self.fulfillment
            .iter()
            .find(|f| f.width == width)
            .map_or(0.0, |f| f.produced_tons)
    }
}

/// Where a group's effective parent width came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WidthSource {
    Override,
    Master,
    Description,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub coil_code: String,
    pub description: String,
    pub total_input_tons: f64,
    pub total_output_tons: f64,
    pub yield_percent: f64,
    pub waste_percent: f64,
    pub parent_width: f64,
    pub width_source: WidthSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    /// Sorted by input tons descending.
    pub summary: Vec<GroupSummary>,
    pub results: BTreeMap<String, SolveResult>,
    pub failures: BTreeMap<String, SolveError>,
    pub total_global_yield: f64,
    pub total_global_input: f64,
    pub total_global_output: f64,
    pub schedule: Option<Schedule>,
}

impl BatchResult {
    pub fn total_patterns(&self) -> usize {
        self.results.values().map(SolveResult::pattern_count).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledPattern {
    pub pattern_id: usize,
    pub units: u32,
    pub pattern: Pattern,
    pub coil_code: String,
    pub coil_description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Produced {
    pub width: Width,
    pub tons: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPlan {
    pub date: NaiveDate,
    pub patterns: Vec<ScheduledPattern>,
    pub total_tons: f64,
    pub daily_yield: f64,
    pub produced_items: Vec<Produced>,
    pub capacity_used_percent: f64,
    pub setup_penalty_tons: f64,
    /// Effective capacity of this day (halved on rest days).
    pub capacity_tons: f64,
    /// Set when an oversized unit had to be forced into this day.
    #[serde(default)]
    pub overloaded: bool,
}

impl DailyPlan {
    pub fn unit_count(&self) -> u32 {
        self.patterns.iter().map(|p| p.units).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub days: Vec<DailyPlan>,
    /// Units the bounded horizon could not place.
    pub unplaced: usize,
    pub warnings: Vec<String>,
}

impl Schedule {
    /// `SchedulingOverflow` when units were left unplaced.
    pub fn check_complete(&self) -> Result<(), SolveError> {
        if self.unplaced > 0 {
            Err(SolveError::SchedulingOverflow {
                unplaced: self.unplaced,
            })
        } else {
            Ok(())
        }
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.days.first().map(|d| d.date)
    }
}
