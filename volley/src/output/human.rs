use std::sync::Arc;

use volley_core::runner::{PhaseDurations, PhaseRepeats, PhaseSummary, Plan, RunReport, SummaryFn};

mod format;

use format::{format_span, render_phase_summary};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput;

impl OutputFormatter for HumanReadableOutput {
    fn print_plan(&self, plan: &Plan, repeats: &PhaseRepeats, durations: &PhaseDurations) {
        println!("pattern: {}", plan.pattern);
        for (i, phase) in plan.phases.iter().enumerate() {
            println!(
                "phase {}: {} groups={} repeat={}",
                i + 1,
                phase.name,
                phase.workers.len(),
                repeats.repeat(i)
            );
        }
        println!("{durations}");
        println!();
    }

    fn phase_summary(&self) -> SummaryFn {
        Arc::new(|s: &PhaseSummary| {
            println!("{}", render_phase_summary(s));
        })
    }

    fn print_run(&self, report: &RunReport) -> anyhow::Result<()> {
        println!(
            "run {}: {} phase executions in {}",
            report.end,
            report.total_executions,
            format_span(report.elapsed)
        );
        for (i, n) in report.executions.iter().enumerate() {
            println!("  phase {}: {n}", i + 1);
        }
        Ok(())
    }
}
