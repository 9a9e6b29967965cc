//! Slitting planner: chooses cutting patterns for parent coils so that
//! strip demand is met within tolerance using as few parent units as
//! possible, then lays the resulting production out on a capacity-limited
//! calendar.

pub mod batch;
pub mod config;
pub mod error;
pub mod lp;
pub mod master;
pub mod patterns;
pub mod reduce;
pub mod render;
pub mod schedule;
pub mod solver;
pub mod types;

pub use batch::{WidthOverrides, reoptimize_group, solve_batch, solve_batch_best_of};
pub use config::{GroupParams, ScheduleMode, ScheduleParams, SolverConfig};
pub use error::SolveError;
pub use master::MaterialMaster;
pub use schedule::{build_schedule_alap, build_schedule_forward, compute_max_lateness};
pub use solver::solve_group;
