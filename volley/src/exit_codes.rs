#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// At least one request step failed (transport error, assertion or script).
    IterationsFailed = 10,

    /// Invalid CLI flags or test plan (bad durations, unknown mode, unreadable CSV, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (plan did not stop in time, signal handler failure, etc.).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_summary(summary: &volley_core::PlanSummary) -> Self {
        if summary.has_failures() {
            Self::IterationsFailed
        } else {
            Self::Success
        }
    }
}
