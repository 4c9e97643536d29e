//! Per-response assertions. A failing check is counted, never fatal.
use crate::metrics::Status;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assertion {
    /// Response carried exactly this status code.
    Status(u16),
    /// Response completed in strictly less than this.
    MaxDuration(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    pub assertion: Assertion,
}

impl Check {
    #[must_use]
    pub fn new(name: impl Into<String>, assertion: Assertion) -> Self {
        Self {
            name: name.into(),
            assertion,
        }
    }

    /// Attempts that never got a response fail every check.
    #[must_use]
    pub fn passes(&self, status: Status, elapsed: Duration) -> bool {
        match (status, self.assertion) {
            (Status::Failed(_), _) => false,
            (Status::Code(code), Assertion::Status(want)) => code == want,
            (Status::Code(_), Assertion::MaxDuration(max)) => elapsed < max,
        }
    }
}

/// Evaluates every check against one response, in order.
#[must_use]
pub fn run_all(checks: &[Check], status: Status, elapsed: Duration) -> Vec<bool> {
    checks.iter().map(|c| c.passes(status, elapsed)).collect()
}
