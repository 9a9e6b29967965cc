use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Width;

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum SolveError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no demanded width fits in usable width {usable_width} mm")]
    EmptyPatternPool { usable_width: Width },

    #[error("no pattern mix satisfies the tolerance bounds")]
    Infeasible,

    #[error("LP backend failure: {0}")]
    Lp(String),

    #[error("{unplaced} production units could not be placed within the scheduling horizon")]
    SchedulingOverflow { unplaced: usize },
}
