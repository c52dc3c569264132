use crate::cli::OutputFormat;

use volley_core::runner::{PhaseDurations, PhaseRepeats, Plan, RunReport, SummaryFn};

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_plan(&self, plan: &Plan, repeats: &PhaseRepeats, durations: &PhaseDurations);
    fn phase_summary(&self) -> SummaryFn;
    fn print_run(&self, report: &RunReport) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
