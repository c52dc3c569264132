use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use super::config::Limits;
use super::plan::Plan;
use super::repeats::PhaseRepeats;

/// Wall-clock budget of every phase execution, computed once per phase.
#[derive(Debug)]
pub struct PhaseDurations {
    limits: Limits,
    runtime: Option<Duration>,
    adjusted_runtime: Option<Duration>,
    total_executions: u64,
    repeats: Vec<u32>,
    intrinsic: Vec<Duration>,
    cached: Vec<OnceLock<Duration>>,
}

impl PhaseDurations {
    pub fn new(
        runtime: Option<Duration>,
        plan: &Plan,
        repeats: &PhaseRepeats,
        limits: Limits,
    ) -> Self {
        let phase_count = plan.phases.len();
        let total_executions = repeats.total_repeats(phase_count).max(1);

        let adjusted_runtime = runtime.filter(|d| !d.is_zero()).map(|runtime| {
            let floor = mul_u64(limits.min_phase_duration, total_executions);
            let ceiling = mul_u64(limits.max_phase_duration, total_executions);
            runtime.max(floor).min(ceiling)
        });

        let intrinsic = plan
            .phases
            .iter()
            .map(|phase| {
                phase
                    .workers
                    .iter()
                    .map(|w| w.effective_duration(&limits))
                    .fold(Duration::ZERO, Duration::saturating_add)
            })
            .collect();

        Self {
            limits,
            runtime: runtime.filter(|d| !d.is_zero()),
            adjusted_runtime,
            total_executions,
            repeats: (0..phase_count).map(|i| repeats.repeat(i)).collect(),
            intrinsic,
            cached: (0..phase_count).map(|_| OnceLock::new()).collect(),
        }
    }

    /// The runtime override as requested, before clamping.
    pub fn runtime(&self) -> Option<Duration> {
        self.runtime
    }

    /// The runtime override after clamping to what the plan can schedule.
    pub fn adjusted_runtime(&self) -> Option<Duration> {
        self.adjusted_runtime
    }

    pub fn total_executions(&self) -> u64 {
        self.total_executions
    }

    pub fn phase_duration(&self, phase: usize) -> Duration {
        let Some(slot) = self.cached.get(phase) else {
            return self.limits.min_phase_duration;
        };

        *slot.get_or_init(|| {
            let raw = match self.adjusted_runtime {
                Some(adjusted) => div_u64(adjusted, self.total_executions),
                None => self.intrinsic[phase],
            };
            self.limits.clamp_phase_duration(raw)
        })
    }

    /// Budget of one phase across all of its repeats.
    pub fn phase_total_duration(&self, phase: usize) -> Duration {
        let repeat = self.repeats.get(phase).copied().unwrap_or(1);
        self.phase_duration(phase).saturating_mul(repeat)
    }

    pub fn total_duration(&self) -> Duration {
        if let Some(adjusted) = self.adjusted_runtime {
            return adjusted;
        }

        (0..self.cached.len())
            .map(|i| self.phase_total_duration(i))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

impl fmt::Display for PhaseDurations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Some(runtime), Some(adjusted)) = (self.runtime, self.adjusted_runtime) {
            if runtime != adjusted {
                writeln!(
                    f,
                    "runtime: {adjusted:?} (adjusted from {runtime:?} to fit phase limits)"
                )?;
            } else {
                writeln!(f, "runtime: {runtime:?}")?;
            }
        }

        for i in 0..self.cached.len() {
            writeln!(
                f,
                "phase {}: {:?} x {} = {:?}",
                i + 1,
                self.phase_duration(i),
                self.repeats.get(i).copied().unwrap_or(1),
                self.phase_total_duration(i)
            )?;
        }

        write!(f, "total: {:?}", self.total_duration())
    }
}

fn mul_u64(d: Duration, n: u64) -> Duration {
    let nanos = d.as_nanos().saturating_mul(u128::from(n));
    Duration::from_nanos(nanos.min(u128::from(u64::MAX)) as u64)
}

fn div_u64(d: Duration, n: u64) -> Duration {
    let nanos = d.as_nanos() / u128::from(n.max(1));
    Duration::from_nanos(nanos.min(u128::from(u64::MAX)) as u64)
}
