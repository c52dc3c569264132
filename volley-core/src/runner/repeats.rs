use std::collections::BTreeMap;

use super::config::{Limits, RepeatsOverride};
use super::plan::Plan;

/// Repeat budget per phase index, with a fallback for phases without an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRepeats {
    default_repeat: u32,
    overrides: BTreeMap<usize, u32>,
}

impl PhaseRepeats {
    pub fn uniform(default_repeat: u32) -> Self {
        Self {
            default_repeat: default_repeat.max(1),
            overrides: BTreeMap::new(),
        }
    }

    pub fn from_plan(plan: &Plan, repeats: RepeatsOverride, limits: &Limits) -> Self {
        let max = limits.max_repeats_per_phase.max(1);

        match repeats {
            RepeatsOverride::Unlimited => {
                tracing::info!(
                    repeats = max,
                    "unlimited repeats requested, using the per-phase maximum"
                );
                Self::uniform(max)
            }
            RepeatsOverride::Fixed(n) => {
                let n = n.clamp(1, max);
                tracing::info!(repeats = n, "overriding plan repeats");
                Self::uniform(n)
            }
            RepeatsOverride::FromPlan => {
                let mut out = Self::uniform(1);
                for (i, phase) in plan.phases.iter().enumerate() {
                    let repeat = if phase.repeat > max {
                        tracing::warn!(
                            phase = i + 1,
                            repeat = phase.repeat,
                            max,
                            "phase repeat count exceeds maximum, capping"
                        );
                        max
                    } else {
                        phase.repeat.max(1)
                    };
                    out.set_repeat(i, repeat);
                }
                out
            }
        }
    }

    pub fn default_repeat(&self) -> u32 {
        self.default_repeat
    }

    pub fn set_repeat(&mut self, phase: usize, repeat: u32) {
        self.overrides.insert(phase, repeat.max(1));
    }

    pub fn repeat(&self, phase: usize) -> u32 {
        self.overrides
            .get(&phase)
            .copied()
            .unwrap_or(self.default_repeat)
    }

    /// Number of phase executions a complete run performs.
    pub fn total_repeats(&self, phase_count: usize) -> u64 {
        (0..phase_count).map(|i| u64::from(self.repeat(i))).sum()
    }
}
