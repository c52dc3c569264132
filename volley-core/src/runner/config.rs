use std::time::Duration;

use super::error::{Error, Result};
use super::pattern::Pattern;

const TWENTY_EIGHT_DAYS: Duration = Duration::from_secs(28 * 24 * 60 * 60);

/// Per-request timeout used when a worker group leaves `timeout` unset.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Cadence of the in-group throughput reports.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);

pub const MIN_PHASE_DURATION: Duration = Duration::from_secs(60);
pub const MAX_PHASE_DURATION: Duration = TWENTY_EIGHT_DAYS;
pub const MAX_REPEATS_PER_PHASE: u32 = 500;

/// Bounds on a total-runtime override.
pub const MIN_RUNTIME: Duration = Duration::from_secs(1);
pub const MAX_RUNTIME: Duration = TWENTY_EIGHT_DAYS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min_phase_duration: Duration,
    pub max_phase_duration: Duration,
    pub max_repeats_per_phase: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_phase_duration: MIN_PHASE_DURATION,
            max_phase_duration: MAX_PHASE_DURATION,
            max_repeats_per_phase: MAX_REPEATS_PER_PHASE,
        }
    }
}

impl Limits {
    pub fn clamp_phase_duration(&self, d: Duration) -> Duration {
        d.max(self.min_phase_duration).min(self.max_phase_duration)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_phase_duration.is_zero() || self.min_phase_duration > self.max_phase_duration
        {
            return Err(Error::InvalidPhaseBounds {
                min: self.min_phase_duration,
                max: self.max_phase_duration,
            });
        }
        if self.max_repeats_per_phase == 0 {
            return Err(Error::InvalidRepeats(0));
        }
        Ok(())
    }
}

/// How phase repeat counts are chosen for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatsOverride {
    /// Use each phase's own `repeat` value.
    #[default]
    FromPlan,
    /// Run every phase up to the per-phase maximum.
    Unlimited,
    /// Run every phase exactly `n` times.
    Fixed(u32),
}

impl RepeatsOverride {
    /// Interprets the command-line form: `-1` = plan values, `0` = unlimited, `n` = fixed.
    pub fn from_flag(value: i64, limits: &Limits) -> Result<Self> {
        match value {
            -1 => Ok(Self::FromPlan),
            0 => Ok(Self::Unlimited),
            n if n > 0 && n <= i64::from(limits.max_repeats_per_phase) => Ok(Self::Fixed(n as u32)),
            n => Err(Error::InvalidRepeats(n)),
        }
    }
}

/// Everything about a run that does not come from the plan file.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub limits: Limits,

    /// Total runtime to spread evenly across all phase executions.
    pub runtime: Option<Duration>,

    pub repeats: RepeatsOverride,

    /// Replaces the plan's own pattern when set.
    pub pattern_override: Option<Pattern>,

    pub report_interval: Duration,

    /// Hard stop for the whole run, independent of the duration budget.
    pub run_timeout: Option<Duration>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            runtime: None,
            repeats: RepeatsOverride::FromPlan,
            pattern_override: None,
            report_interval: DEFAULT_REPORT_INTERVAL,
            run_timeout: None,
        }
    }
}

impl RunSettings {
    pub fn validate(&self) -> Result<()> {
        self.limits.validate()?;

        if let Some(runtime) = self.runtime
            && !(MIN_RUNTIME..=MAX_RUNTIME).contains(&runtime)
        {
            return Err(Error::RuntimeOutOfRange {
                runtime,
                min: MIN_RUNTIME,
                max: MAX_RUNTIME,
            });
        }

        if let RepeatsOverride::Fixed(n) = self.repeats
            && (n == 0 || n > self.limits.max_repeats_per_phase)
        {
            return Err(Error::InvalidRepeats(i64::from(n)));
        }

        if self.report_interval.is_zero() {
            return Err(Error::InvalidReportInterval);
        }

        Ok(())
    }
}
