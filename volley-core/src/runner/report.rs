use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::durations::PhaseDurations;
use super::plan::Plan;
use super::repeats::PhaseRepeats;
use super::scope::ScopeError;
use super::stats::StatsSnapshot;

/// Throughput over one reporting interval of a worker group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalReport {
    pub requests_per_sec: f64,
    pub mean_latency: Duration,
    pub errors: u64,
    pub ok: u64,
}

impl IntervalReport {
    pub fn between(earlier: &StatsSnapshot, current: &StatsSnapshot, elapsed: Duration) -> Self {
        let delta = current.since(earlier);
        let secs = elapsed.as_secs_f64().max(1e-9);

        Self {
            requests_per_sec: delta.requests as f64 / secs,
            mean_latency: delta.mean_latency(),
            errors: delta.errors,
            ok: delta.ok(),
        }
    }

    pub fn log(&self, phase: &str, group: usize) {
        tracing::info!(
            phase,
            group,
            "{:.1} req/s, avg latency {:?}, {} errors, {} ok",
            self.requests_per_sec,
            self.mean_latency,
            self.errors,
            self.ok
        );
    }
}

/// How a phase execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum PhaseEnd {
    /// The phase deadline fired.
    DeadlineExceeded,
    /// Every worker group returned before the phase deadline.
    WorkersFinished,
    Canceled,
    SetupFailed,
}

impl From<ScopeError> for PhaseEnd {
    fn from(err: ScopeError) -> Self {
        match err {
            ScopeError::Canceled => Self::Canceled,
            ScopeError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSummary {
    /// 0-based position in the plan.
    pub phase: usize,
    pub name: String,
    /// 1-based execution number of this phase.
    pub execution: u32,
    pub elapsed: Duration,
    pub requests: u64,
    pub errors: u64,
    pub mean_latency: Duration,
    pub status_codes: BTreeMap<u16, u64>,
    pub end: PhaseEnd,
}

/// Observer for finished phases, e.g. structured output.
pub type SummaryFn = Arc<dyn Fn(&PhaseSummary) + Send + Sync + 'static>;

pub fn log_phase_summary(summary: &PhaseSummary) {
    tracing::info!(
        phase = summary.phase + 1,
        name = %summary.name,
        execution = summary.execution,
        took = ?summary.elapsed,
        requests = summary.requests,
        errors = summary.errors,
        avg_latency = ?summary.mean_latency,
        end = %summary.end,
        "phase summary"
    );
    for (code, count) in &summary.status_codes {
        tracing::info!(phase = summary.phase + 1, status = code, count, "status code");
    }
}

pub fn log_plan_overview(plan: &Plan, repeats: &PhaseRepeats, durations: &PhaseDurations) {
    tracing::info!(
        pattern = %plan.pattern,
        phases = plan.phases.len(),
        executions = durations.total_executions(),
        total = ?durations.total_duration(),
        "plan loaded"
    );
    if let (Some(requested), Some(adjusted)) = (durations.runtime(), durations.adjusted_runtime())
        && requested != adjusted
    {
        tracing::warn!(
            ?requested,
            ?adjusted,
            "total duration adjusted to fit the phase duration limits"
        );
    }
    for (i, phase) in plan.phases.iter().enumerate() {
        tracing::info!(
            phase = i + 1,
            name = %phase.name,
            groups = phase.workers.len(),
            repeat = repeats.repeat(i),
            duration = ?durations.phase_duration(i),
            total = ?durations.phase_total_duration(i),
            "phase planned"
        );
    }
}
