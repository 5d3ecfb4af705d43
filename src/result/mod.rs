//! Executor outcome type.
//!
//! [`ExecResult`] is the single record every executor produces: one of four
//! statuses plus enough context (the literal command sent, the captured
//! stdout lines, a human message) for the sequence engine to render it and
//! for downstream executors to branch on it via the registry.

use std::cmp::Ordering;
use std::fmt;

/// Outcome of running one executor against one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Skipping,
    Fail,
    Success,
    Changed,
}

impl Status {
    /// Precedence used when combining several child statuses into one
    /// composite result: `Fail > Changed > Success > Skipping`.
    fn rank(self) -> u8 {
        match self {
            Status::Fail => 3,
            Status::Changed => 2,
            Status::Success => 1,
            Status::Skipping => 0,
        }
    }
}

impl PartialOrd for Status {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Status {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Skipping => "SKIPPING",
            Status::Fail => "FAIL",
            Status::Success => "SUCCESS",
            Status::Changed => "CHANGED",
        };
        write!(f, "{s}")
    }
}

/// Outcome of one executor invocation against one host.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    pub status: Option<Status>,
    /// The literal command string actually sent to the session layer.
    pub stdin: String,
    /// Captured stdout, split on `\n` with the trailing empty line preserved.
    pub stdout: Vec<String>,
    /// Reason for SKIPPING/FAIL, or a summary for a composite success.
    pub message: String,
    /// Whether stdout should be rendered verbosely regardless of `-v`.
    pub output_flag: bool,
}

impl ExecResult {
    pub fn status(&self) -> Status {
        self.status.unwrap_or(Status::Skipping)
    }

    pub fn skipping(message: impl Into<String>) -> Self {
        Self {
            status: Some(Status::Skipping),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: Some(Status::Fail),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn fail_with_output(stdin: impl Into<String>, stdout: Vec<String>) -> Self {
        Self {
            status: Some(Status::Fail),
            stdin: stdin.into(),
            stdout,
            ..Default::default()
        }
    }

    pub fn success(stdin: impl Into<String>, stdout: Vec<String>, output_flag: bool) -> Self {
        Self {
            status: Some(Status::Success),
            stdin: stdin.into(),
            stdout,
            output_flag,
            ..Default::default()
        }
    }

    pub fn changed(stdin: impl Into<String>, stdout: Vec<String>, output_flag: bool) -> Self {
        Self {
            status: Some(Status::Changed),
            stdin: stdin.into(),
            stdout,
            output_flag,
            ..Default::default()
        }
    }

    pub fn composite_success(message: impl Into<String>) -> Self {
        Self {
            status: Some(Status::Success),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn composite_changed(message: impl Into<String>) -> Self {
        Self {
            status: Some(Status::Changed),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn is_fail(&self) -> bool {
        self.status() == Status::Fail
    }
}
