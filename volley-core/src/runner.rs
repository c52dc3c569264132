mod config;
mod driver;
mod durations;
mod error;
mod pattern;
mod plan;
mod repeats;
mod report;
mod scope;
mod stats;
#[cfg(test)]
mod testing;
mod worker;

pub use config::{
    DEFAULT_REPORT_INTERVAL, DEFAULT_REQUEST_TIMEOUT, Limits, MAX_PHASE_DURATION,
    MAX_REPEATS_PER_PHASE, MAX_RUNTIME, MIN_PHASE_DURATION, MIN_RUNTIME, RepeatsOverride,
    RunSettings,
};
pub use driver::{Driver, RunEnd, RunReport};
pub use durations::PhaseDurations;
pub use error::{Error, Result};
pub use pattern::{Pattern, PatternExecutor};
pub use plan::{Phase, Plan, WorkerGroup};
pub use repeats::PhaseRepeats;
pub use report::{
    IntervalReport, PhaseEnd, PhaseSummary, SummaryFn, log_phase_summary, log_plan_overview,
};
pub use scope::{Scope, ScopeError};
pub use stats::{Statistics, StatsSnapshot};
pub use worker::{GroupExit, GroupRun, run_worker_group};
