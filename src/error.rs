use thiserror::Error;

/// Failures of the numeric pipeline for a single student.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no metric data for {identifier} in weeks {week_from} to {week_to}")]
    NoData {
        identifier: String,
        week_from: i32,
        week_to: i32,
    },

    #[error("student not found: {0}")]
    UnknownIdentifier(String),

    #[error("no scorable metric: no weight matches a recorded metric, or only weakness-excluded metrics have data")]
    EmptyMetricSet,

    #[error("invalid week range: {week_from} is after {week_to}")]
    InvalidWeekRange { week_from: i32, week_to: i32 },

    #[error("metric {metric} has value {value} outside the 0..=1 scale (week {week})")]
    MetricOutOfRange {
        metric: String,
        value: f64,
        week: i32,
    },

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// Failures of a coaching message provider. These never leave the pipeline;
/// they are logged and replaced by the fallback message.
#[derive(Debug, Error)]
pub enum CoachError {
    #[error("coaching provider timed out after {0} seconds")]
    Timeout(u64),

    #[error("coaching provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("coaching provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("coaching provider returned a malformed response: {0}")]
    Malformed(String),

    #[error("coaching provider returned an empty message")]
    Empty,
}
