// src/check/error.rs
use std::any::Any;
use std::time::Duration;

/// Failure reported by a single check. The `Display` output is what ends up
/// in the JSON status body, so every variant renders as a plain message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    #[error("{0}")]
    Failed(String),

    #[error("timed out after {}", DurationText(.0))]
    TimedOut(Duration),

    /// An async check that has not completed its first evaluation.
    #[error("no data yet")]
    NoData,

    #[error("check panicked: {0}")]
    Panicked(String),
}

impl CheckError {
    pub fn failed(message: impl Into<String>) -> Self {
        CheckError::Failed(message.into())
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        CheckError::Panicked(message)
    }
}

impl From<String> for CheckError {
    fn from(message: String) -> Self {
        CheckError::Failed(message)
    }
}

impl From<&str> for CheckError {
    fn from(message: &str) -> Self {
        CheckError::Failed(message.to_string())
    }
}

impl From<std::io::Error> for CheckError {
    fn from(err: std::io::Error) -> Self {
        CheckError::Failed(err.to_string())
    }
}

impl From<reqwest::Error> for CheckError {
    fn from(err: reqwest::Error) -> Self {
        CheckError::Failed(err.to_string())
    }
}

struct DurationText<'a>(&'a Duration);

impl std::fmt::Display for DurationText<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_duration(*self.0))
    }
}

/// Renders a duration the way monitoring tools built around Go services
/// expect to read it: `50ms`, `1.5s`, `1m30s`, `2h0m0s`.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();

    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{}ns", nanos);
    }
    if nanos < 1_000_000 {
        return format!("{}µs", decimal(nanos, 1_000));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", decimal(nanos, 1_000_000));
    }

    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = decimal(
        u128::from(total_secs % 60) * 1_000_000_000 + u128::from(d.subsec_nanos()),
        1_000_000_000,
    );

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

// `unit` is a power of ten; trailing zeros of the fraction are dropped.
fn decimal(value: u128, unit: u128) -> String {
    let whole = value / unit;
    let rem = value % unit;
    if rem == 0 {
        return whole.to_string();
    }

    let width = unit.ilog10() as usize;
    let fraction = format!("{:0width$}", rem, width = width);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}
