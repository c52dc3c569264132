#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// Invalid CLI flags or plan (bad durations, unknown pattern, out-of-range repeats, etc.).
    InvalidInput = 30,

    /// The run started but could not finish (setup failure, IO errors).
    RuntimeError = 40,

    /// The run was interrupted (Ctrl-C).
    Interrupted = 50,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
