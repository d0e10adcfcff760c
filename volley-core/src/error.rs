use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("thread group `{group}`: `{field}` must be a positive integer")]
    InvalidThreads { group: String, field: &'static str },

    #[error("thread group `{group}`: `{upper}` must be >= `{lower}`")]
    InvalidRange {
        group: String,
        lower: &'static str,
        upper: &'static str,
    },

    #[error("thread group `{group}`: `{field}` must be a positive duration")]
    InvalidDuration { group: String, field: &'static str },

    #[error("thread group `{group}`: `loops` must be a positive integer")]
    InvalidLoops { group: String },

    #[error("thread group `{group}` has no requests")]
    EmptyChain { group: String },

    #[error("invalid thread group mode `{0}` (expected `fixed`, `ramp-up`, `spike` or `stairs`)")]
    InvalidMode(String),

    #[error("invalid assertion operator `{0}` (expected one of =, !=, >, >=, <, <=)")]
    InvalidOperator(String),

    #[error("invalid json path `{0}`")]
    InvalidJsonPath(String),

    #[error("plan did not terminate within {0:?} after stop")]
    StopTimeout(Duration),
}
