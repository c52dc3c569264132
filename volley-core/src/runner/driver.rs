use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tokio::time::Instant;

use super::config::{DEFAULT_REQUEST_TIMEOUT, RunSettings};
use super::durations::PhaseDurations;
use super::error::{Error, Result};
use super::pattern::PatternExecutor;
use super::plan::{Phase, Plan};
use super::repeats::PhaseRepeats;
use super::report::{PhaseEnd, PhaseSummary, SummaryFn, log_phase_summary, log_plan_overview};
use super::scope::{Scope, ScopeError};
use super::stats::Statistics;
use super::worker::{GroupExit, GroupRun, run_worker_group};
use crate::target::{Target, TargetError};

/// Why a run ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RunEnd {
    /// Every phase used up its repeats.
    Completed,
    /// The run timeout fired.
    RunTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Completed executions per phase, in plan order.
    pub executions: Vec<u32>,
    pub total_executions: u64,
    pub elapsed: Duration,
    pub end: RunEnd,
}

/// Encoded action bodies of one phase.
#[derive(Debug, Clone)]
struct Payloads {
    setup: Option<Bytes>,
    workload: Bytes,
    teardown: Option<Bytes>,
}

impl Payloads {
    fn encode(phase: &Phase) -> Result<Self> {
        fn to_bytes(value: &Value) -> Result<Bytes> {
            Ok(Bytes::from(serde_json::to_vec(value)?))
        }

        Ok(Self {
            setup: phase.setup.as_ref().map(to_bytes).transpose()?,
            workload: match &phase.workload {
                Some(v) => to_bytes(v)?,
                None => Bytes::from_static(b"{}"),
            },
            teardown: phase.teardown.as_ref().map(to_bytes).transpose()?,
        })
    }
}

/// Executes a plan phase by phase under the chosen pattern.
pub struct Driver<T: Target> {
    plan: Plan,
    settings: RunSettings,
    repeats: PhaseRepeats,
    durations: PhaseDurations,
    executor: PatternExecutor,
    payloads: Vec<Payloads>,
    target: Arc<T>,
    on_summary: Option<SummaryFn>,
}

impl<T: Target> Driver<T> {
    /// Validates `plan` and `settings` together; nothing is sent to `target` here.
    pub fn new(plan: Plan, settings: RunSettings, target: T) -> Result<Self> {
        settings.validate()?;

        if let Some(pattern) = settings.pattern_override
            && pattern != plan.pattern
        {
            tracing::info!(plan = %plan.pattern, %pattern, "overriding phase pattern");
        }

        let plan = plan
            .with_pattern(settings.pattern_override)
            .normalize(&settings.limits)?;
        let repeats = PhaseRepeats::from_plan(&plan, settings.repeats, &settings.limits);
        let durations = PhaseDurations::new(settings.runtime, &plan, &repeats, settings.limits);
        let payloads = plan
            .phases
            .iter()
            .map(Payloads::encode)
            .collect::<Result<Vec<_>>>()?;
        let executor = PatternExecutor::new(plan.pattern);

        Ok(Self {
            plan,
            settings,
            repeats,
            durations,
            executor,
            payloads,
            target: Arc::new(target),
            on_summary: None,
        })
    }

    /// Replaces the executor built from the plan pattern, e.g. with a seeded one.
    #[must_use]
    pub fn with_executor(mut self, executor: PatternExecutor) -> Self {
        self.executor = executor;
        self
    }

    #[must_use]
    pub fn on_summary(mut self, f: SummaryFn) -> Self {
        self.on_summary = Some(f);
        self
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn repeats(&self) -> &PhaseRepeats {
        &self.repeats
    }

    pub fn durations(&self) -> &PhaseDurations {
        &self.durations
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Runs until every phase is exhausted, the run timeout fires, or `root` is cancelled.
    pub async fn run(&mut self, root: &Scope) -> Result<RunReport> {
        let root = match self.settings.run_timeout {
            Some(timeout) => root.with_timeout(timeout),
            None => root.clone(),
        };

        log_plan_overview(&self.plan, &self.repeats, &self.durations);

        let started = Instant::now();
        let mut executions = vec![0u32; self.plan.phases.len()];
        let mut current = 0usize;

        let end = loop {
            match root.err() {
                Some(ScopeError::Canceled) => return Err(Error::Canceled),
                Some(ScopeError::DeadlineExceeded) => {
                    tracing::info!("run timeout reached, stopping");
                    break RunEnd::RunTimeout;
                }
                None => {}
            }

            if executions[current] >= self.repeats.repeat(current) {
                match self.executor.next_phase(current, &executions, &self.repeats) {
                    Some(next) => {
                        current = next;
                        continue;
                    }
                    None => break RunEnd::Completed,
                }
            }

            let outcome = self
                .execute_phase(&root, current, executions[current] + 1)
                .await;
            executions[current] += 1;

            if outcome? == PhaseEnd::Canceled {
                return Err(Error::Canceled);
            }

            if self
                .executor
                .should_advance_phase(current, &executions, &self.repeats)
            {
                match self.executor.next_phase(current, &executions, &self.repeats) {
                    Some(next) => current = next,
                    None => break RunEnd::Completed,
                }
            }
        };

        let report = RunReport {
            total_executions: executions.iter().map(|&n| u64::from(n)).sum(),
            executions,
            elapsed: started.elapsed(),
            end,
        };
        tracing::info!(
            executions = report.total_executions,
            took = ?report.elapsed,
            end = %report.end,
            "run finished"
        );
        Ok(report)
    }

    async fn execute_phase(&self, root: &Scope, index: usize, execution: u32) -> Result<PhaseEnd> {
        let phase = &self.plan.phases[index];
        let payloads = &self.payloads[index];
        let duration = self.durations.phase_duration(index);
        let scope = root.with_timeout(duration);
        let stats = Arc::new(Statistics::new());
        let started = Instant::now();

        tracing::info!(
            phase = index + 1,
            name = %phase.name,
            execution,
            duration = ?duration,
            "starting phase"
        );

        let mut setup_error = None;
        let end = match self.setup(&scope, payloads).await {
            Err(SetupFailure::Stopped(reason)) => PhaseEnd::from(reason),
            Err(SetupFailure::Target(err)) => {
                tracing::error!(phase = index + 1, name = %phase.name, error = %err, "setup failed");
                setup_error = Some(err);
                PhaseEnd::SetupFailed
            }
            Ok(()) => self.run_groups(&scope, phase, payloads, &stats).await,
        };

        let snapshot = stats.snapshot();
        let summary = PhaseSummary {
            phase: index,
            name: phase.name.clone(),
            execution,
            elapsed: started.elapsed(),
            requests: snapshot.requests,
            errors: snapshot.errors,
            mean_latency: snapshot.mean_latency(),
            status_codes: stats.status_codes(),
            end,
        };
        log_phase_summary(&summary);
        if let Some(f) = &self.on_summary {
            f(&summary);
        }

        self.teardown(index, payloads).await;

        match setup_error {
            Some(source) => Err(Error::Setup {
                phase: index + 1,
                name: phase.name.clone(),
                source,
            }),
            None => Ok(end),
        }
    }

    async fn setup(&self, scope: &Scope, payloads: &Payloads) -> std::result::Result<(), SetupFailure> {
        let Some(body) = &payloads.setup else {
            return Ok(());
        };

        tracing::info!("running setup");
        let res = scope
            .run(self.target.post(body.clone(), Some(DEFAULT_REQUEST_TIMEOUT)))
            .await
            .map_err(SetupFailure::Stopped)?
            .map_err(SetupFailure::Target)?;

        if res.status == 400 {
            tracing::warn!(body = %res.body_lossy(), "setup request rejected");
        }
        Ok(())
    }

    async fn run_groups(
        &self,
        scope: &Scope,
        phase: &Phase,
        payloads: &Payloads,
        stats: &Arc<Statistics>,
    ) -> PhaseEnd {
        for (i, group) in phase.workers.iter().enumerate() {
            let run = GroupRun {
                phase: phase.name.clone(),
                group: i + 1,
                instances: group.instances,
                duration: group.duration,
                delay: group.delay,
                timeout: group.timeout,
                body: payloads.workload.clone(),
                report_interval: self.settings.report_interval,
            };

            let exit = run_worker_group(scope, self.target.clone(), stats.clone(), run).await;

            if let Some(reason) = scope.err() {
                tracing::info!(phase = %phase.name, %reason, "phase completed");
                return PhaseEnd::from(reason);
            }
            if exit == GroupExit::Finished {
                tracing::debug!(phase = %phase.name, group = i + 1, "group ended before its deadline");
            }
        }

        PhaseEnd::WorkersFinished
    }

    /// Runs regardless of how the phase ended; failures are logged and swallowed.
    async fn teardown(&self, index: usize, payloads: &Payloads) {
        let Some(body) = &payloads.teardown else {
            return;
        };

        tracing::info!(phase = index + 1, "running teardown");
        match self
            .target
            .post(body.clone(), Some(DEFAULT_REQUEST_TIMEOUT))
            .await
        {
            Ok(res) if res.status == 400 => {
                tracing::warn!(phase = index + 1, body = %res.body_lossy(), "teardown request rejected");
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(phase = index + 1, error = %err, "teardown failed"),
        }
    }
}

enum SetupFailure {
    Stopped(ScopeError),
    Target(TargetError),
}
