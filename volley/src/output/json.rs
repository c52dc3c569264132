use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::sync::Arc;

use volley_core::runner::{PhaseDurations, PhaseRepeats, PhaseSummary, Plan, RunReport, SummaryFn};

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_plan(&self, plan: &Plan, repeats: &PhaseRepeats, durations: &PhaseDurations) {
        emit_json_line(&build_plan_line(plan, repeats, durations));
    }

    fn phase_summary(&self) -> SummaryFn {
        Arc::new(|s: &PhaseSummary| emit_json_line(&build_phase_line(s)))
    }

    fn print_run(&self, report: &RunReport) -> anyhow::Result<()> {
        emit_json_line(&build_run_line(report));
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonPlanPhase {
    pub name: String,
    pub groups: usize,
    pub repeat: u32,
    pub duration_ms: u64,
    pub total_duration_ms: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonPlanLine {
    pub kind: &'static str,
    pub pattern: String,
    pub executions: u64,
    pub total_duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_runtime_ms: Option<u64>,
    pub phases: Vec<JsonPlanPhase>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonPhaseLine {
    pub kind: &'static str,
    /// 1-based.
    pub phase: usize,
    pub name: String,
    pub execution: u32,
    pub end: &'static str,
    pub elapsed_ms: u64,
    pub requests: u64,
    pub errors: u64,
    pub latency_mean_us: u64,
    pub status_codes: BTreeMap<u16, u64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonRunLine {
    pub kind: &'static str,
    pub end: String,
    pub total_executions: u64,
    pub executions: Vec<u32>,
    pub elapsed_ms: u64,
}

fn millis(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn build_plan_line(plan: &Plan, repeats: &PhaseRepeats, durations: &PhaseDurations) -> JsonPlanLine {
    JsonPlanLine {
        kind: "plan",
        pattern: plan.pattern.to_string(),
        executions: durations.total_executions(),
        total_duration_ms: millis(durations.total_duration()),
        requested_runtime_ms: durations.runtime().map(millis),
        phases: plan
            .phases
            .iter()
            .enumerate()
            .map(|(i, p)| JsonPlanPhase {
                name: p.name.clone(),
                groups: p.workers.len(),
                repeat: repeats.repeat(i),
                duration_ms: millis(durations.phase_duration(i)),
                total_duration_ms: millis(durations.phase_total_duration(i)),
            })
            .collect(),
    }
}

fn build_phase_line(s: &PhaseSummary) -> JsonPhaseLine {
    JsonPhaseLine {
        kind: "phase",
        phase: s.phase + 1,
        name: s.name.clone(),
        execution: s.execution,
        end: s.end.into(),
        elapsed_ms: millis(s.elapsed),
        requests: s.requests,
        errors: s.errors,
        latency_mean_us: u64::try_from(s.mean_latency.as_micros()).unwrap_or(u64::MAX),
        status_codes: s.status_codes.clone(),
    }
}

fn build_run_line(report: &RunReport) -> JsonRunLine {
    JsonRunLine {
        kind: "run",
        end: report.end.to_string(),
        total_executions: report.total_executions,
        executions: report.executions.clone(),
        elapsed_ms: millis(report.elapsed),
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
