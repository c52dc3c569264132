use std::time::Duration;

use serde_json::Value;

use super::config::{DEFAULT_REQUEST_TIMEOUT, Limits};
use super::error::{Error, Result};
use super::pattern::Pattern;

/// A batch of identically configured workers within a phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerGroup {
    /// Concurrent workers.
    pub instances: u64,
    /// Wall-clock budget for the group; zero means "minimum phase duration".
    pub duration: Duration,
    /// Pause before each request of a single worker.
    pub delay: Duration,
    /// Per-request deadline; zero means [`DEFAULT_REQUEST_TIMEOUT`].
    pub timeout: Duration,
}

impl WorkerGroup {
    pub fn effective_duration(&self, limits: &Limits) -> Duration {
        if self.duration.is_zero() {
            limits.min_phase_duration
        } else {
            self.duration
        }
    }

    pub fn effective_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_REQUEST_TIMEOUT
        } else {
            self.timeout
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Phase {
    pub name: String,
    pub workers: Vec<WorkerGroup>,

    /// Opaque action payloads, forwarded to the target verbatim.
    pub setup: Option<Value>,
    pub workload: Option<Value>,
    pub teardown: Option<Value>,

    /// Desired executions of this phase; zero means once.
    pub repeat: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub pattern: Pattern,
    pub phases: Vec<Phase>,
}

impl Plan {
    /// Validates the plan against `limits` and fills in defaults.
    ///
    /// Errors name phases and workers by their 1-based position in the plan.
    pub fn normalize(mut self, limits: &Limits) -> Result<Self> {
        if self.phases.is_empty() {
            return Err(Error::EmptyPlan);
        }

        for (pi, phase) in self.phases.iter_mut().enumerate() {
            if phase.repeat == 0 {
                phase.repeat = 1;
            }
            if phase.name.trim().is_empty() {
                phase.name = format!("phase {}", pi + 1);
            }

            for (wi, group) in phase.workers.iter_mut().enumerate() {
                if !group.duration.is_zero()
                    && (group.duration < limits.min_phase_duration
                        || group.duration > limits.max_phase_duration)
                {
                    return Err(Error::WorkerDurationOutOfRange {
                        phase: pi + 1,
                        worker: wi + 1,
                        duration: group.duration,
                        min: limits.min_phase_duration,
                        max: limits.max_phase_duration,
                    });
                }

                group.duration = group.effective_duration(limits);
                group.timeout = group.effective_timeout();

                if group.delay >= group.duration {
                    return Err(Error::UnschedulableWorker {
                        phase: pi + 1,
                        worker: wi + 1,
                        delay: group.delay,
                        duration: group.duration,
                    });
                }
            }
        }

        Ok(self)
    }

    pub fn with_pattern(mut self, pattern: Option<Pattern>) -> Self {
        if let Some(pattern) = pattern {
            self.pattern = pattern;
        }
        self
    }
}
