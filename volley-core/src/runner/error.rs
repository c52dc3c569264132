use std::time::Duration;

use crate::TargetError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("plan must contain at least one phase")]
    EmptyPlan,

    #[error("phase {phase} worker {worker}: `duration` {duration:?} is outside [{min:?}, {max:?}]")]
    WorkerDurationOutOfRange {
        phase: usize,
        worker: usize,
        duration: Duration,
        min: Duration,
        max: Duration,
    },

    #[error(
        "phase {phase} worker {worker}: `delay` {delay:?} is not shorter than its duration {duration:?}, no request could ever be sent"
    )]
    UnschedulableWorker {
        phase: usize,
        worker: usize,
        delay: Duration,
        duration: Duration,
    },

    #[error(
        "repeats per phase must be -1 (use plan values), 0 (unlimited), or 1..=max (got {0})"
    )]
    InvalidRepeats(i64),

    #[error("total runtime {runtime:?} must be within [{min:?}, {max:?}]")]
    RuntimeOutOfRange {
        runtime: Duration,
        min: Duration,
        max: Duration,
    },

    #[error("invalid phase duration bounds: min {min:?}, max {max:?}")]
    InvalidPhaseBounds { min: Duration, max: Duration },

    #[error("report interval must be a positive duration")]
    InvalidReportInterval,

    #[error("phase {phase} (`{name}`) setup failed: {source}")]
    Setup {
        phase: usize,
        name: String,
        #[source]
        source: TargetError,
    },

    #[error("run canceled")]
    Canceled,

    #[error("failed to encode phase payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl Error {
    /// Errors detected before any load is generated.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::Setup { .. } | Self::Canceled)
    }
}
