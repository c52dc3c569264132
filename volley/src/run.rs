use anyhow::Context as _;

use volley_core::runner::{Limits, PhaseDurations, PhaseRepeats, RepeatsOverride};
use volley_core::{Driver, HttpTarget, Plan, RunSettings, Scope};

use crate::cli::{CheckArgs, PlanArgs, RunArgs};
use crate::exit_codes::ExitCode;
use crate::output;
use crate::plan_file;
use crate::run_error::RunError;

fn settings_from(args: &PlanArgs) -> Result<RunSettings, RunError> {
    let limits = Limits {
        min_phase_duration: args.min_phase_duration,
        ..Limits::default()
    };
    let repeats = RepeatsOverride::from_flag(args.repeats_per_phase, &limits)?;

    Ok(RunSettings {
        limits,
        runtime: args.total_duration,
        repeats,
        pattern_override: args.phase_pattern,
        ..RunSettings::default()
    })
}

async fn load(args: &PlanArgs) -> Result<Plan, RunError> {
    plan_file::load_plan(&args.plan)
        .await
        .map_err(RunError::InvalidInput)
}

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    crate::logging::init(args.log_level.as_deref(), "info");

    let out = output::formatter(args.output);

    let settings = RunSettings {
        report_interval: args.report_interval,
        run_timeout: args.run_timeout,
        ..settings_from(&args.plan)?
    };
    let plan = load(&args.plan).await?;

    let target = HttpTarget::new(&args.host, args.port, args.headers.clone());
    tracing::info!(url = target.url(), "starting run");

    let mut driver = Driver::new(plan, settings, target)?.on_summary(out.phase_summary());
    out.print_plan(driver.plan(), driver.repeats(), driver.durations());

    let root = Scope::root();
    let interrupt = {
        let root = root.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping");
                root.cancel();
            }
        })
    };

    let result = driver.run(&root).await;
    interrupt.abort();

    let report = result?;
    out.print_run(&report)
        .context("failed to print run report")
        .map_err(RunError::RuntimeError)?;

    Ok(ExitCode::Success)
}

/// Validates a plan and prints its duration budget; nothing is sent.
pub async fn check(args: CheckArgs) -> Result<ExitCode, RunError> {
    crate::logging::init(None, "warn");

    let out = output::formatter(args.output);

    let settings = settings_from(&args.plan)?;
    settings.validate()?;

    let plan = load(&args.plan)
        .await?
        .with_pattern(settings.pattern_override)
        .normalize(&settings.limits)?;
    let repeats = PhaseRepeats::from_plan(&plan, settings.repeats, &settings.limits);
    let durations = PhaseDurations::new(settings.runtime, &plan, &repeats, settings.limits);

    out.print_plan(&plan, &repeats, &durations);

    Ok(ExitCode::Success)
}
