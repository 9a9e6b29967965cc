//! Read-only material master snapshot: coil code to standard parent width
//! and line rate. Callers hand one snapshot to a solve; edits made to the
//! backing store afterwards never reach an in-flight group.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const BUNDLED: &str = include_str!("../data/material_master.json");

/// Descriptions like "BLAC A-36 2.0MM X 1200MM" carry the nominal width.
static WIDTH_IN_DESCRIPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{3,4})\s*MM\b").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterEntry {
    pub code: String,
    #[serde(default)]
    pub description: String,
    /// Standard parent width (mm).
    pub width: f64,
    /// Production rate (t/h).
    #[serde(default, alias = "rhythm")]
    pub rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialMaster {
    entries: HashMap<String, MasterEntry>,
}

impl MaterialMaster {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Later entries replace earlier ones with the same code.
    pub fn from_entries(entries: impl IntoIterator<Item = MasterEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (e.code.clone(), e))
                .collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let entries: Vec<MasterEntry> = serde_json::from_str(json)?;
        Ok(Self::from_entries(entries))
    }

    /// The plant's standard coil table shipped with the crate.
    pub fn bundled() -> Self {
        Self::from_json(BUNDLED).unwrap_or_else(|e| {
            tracing::error!(error = %e, "bundled material master is malformed");
            Self::empty()
        })
    }

    pub fn get(&self, code: &str) -> Option<&MasterEntry> {
        self.entries.get(code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Largest plausible width (600 < w < 2500 mm) mentioned in a coil
/// description. Hot-rolled "BLAC" 1200 coils are delivered at 1210.
pub fn width_from_description(description: &str) -> Option<f64> {
    let upper = description.to_uppercase();
    let width = WIDTH_IN_DESCRIPTION
        .captures_iter(&upper)
        .filter_map(|c| c[1].parse::<u32>().ok())
        .filter(|&w| w > 600 && w < 2500)
        .max()?;
    if width == 1200 && upper.contains("BLAC") {
        return Some(1210.0);
    }
    Some(width as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_table_loads() {
        let master = MaterialMaster::bundled();
        assert_eq!(master.len(), 60);
        let entry = master.get("100452").unwrap();
        assert_eq!(entry.width, 1517.0);
        assert!((entry.rate - 20.2).abs() < 1e-9);
        assert!(master.get("999999").is_none());
    }

    #[test]
    fn test_later_entries_win() {
        let master = MaterialMaster::from_entries(vec![
            MasterEntry {
                code: "A".into(),
                description: String::new(),
                width: 1000.0,
                rate: 0.0,
            },
            MasterEntry {
                code: "A".into(),
                description: String::new(),
                width: 1250.0,
                rate: 0.0,
            },
        ]);
        assert_eq!(master.get("A").map(|e| e.width), Some(1250.0));
    }

    #[test]
    fn test_rhythm_alias_accepted() {
        let master =
            MaterialMaster::from_json(r#"[{"code": "X1", "width": 1204, "rhythm": 9.1}]"#).unwrap();
        assert_eq!(master.get("X1").map(|e| e.rate), Some(9.1));
    }

    #[test]
    fn test_width_from_description() {
        assert_eq!(width_from_description("BESTRUC A-36 3.0MM X 1500 MM"), Some(1500.0));
        assert_eq!(width_from_description("blac a-36 2.0mm x 1200mm"), Some(1210.0));
        assert_eq!(width_from_description("BZLI JISG3302 0.9MM X 1200MM"), Some(1200.0));
        assert_eq!(width_from_description("BLAC A-36 4.0MM X 3000MM"), None);
        assert_eq!(width_from_description(""), None);
    }
}
