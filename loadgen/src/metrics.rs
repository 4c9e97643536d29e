//! Sample sink shared by every virtual user, and the statistics derived from it.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Why a request never produced a response.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FailureKind {
    Timeout,
    Connect,
    Other,
}

/// Outcome of one request attempt. `Failed` is the sentinel for attempts
/// that got no HTTP status at all.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    Code(u16),
    Failed(FailureKind),
}

impl Status {
    #[inline]
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Status::Code(200..=299))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Code(code) => write!(f, "{code}"),
            Status::Failed(FailureKind::Timeout) => f.write_str("timeout"),
            Status::Failed(FailureKind::Connect) => f.write_str("connect_error"),
            Status::Failed(FailureKind::Other) => f.write_str("request_error"),
        }
    }
}

/// One completed request attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Offset from the start of the run at which the request was issued.
    /// Never decreases across the samples of one user.
    pub at: Duration,
    /// Id of the virtual user that issued the request.
    pub user: u64,
    pub status: Status,
    pub duration: Duration,
    pub bytes: u64,
    /// Check results, in the order the collector was given the check names.
    pub checks: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckTally {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Default)]
struct Store {
    durations: Vec<Duration>,
    errors: u64,
    bytes: u64,
    statuses: BTreeMap<Status, u64>,
    checks: Vec<CheckTally>,
    /// Issuance offset of the latest sample per user.
    last_at: BTreeMap<u64, Duration>,
}

/// Aggregates samples from all virtual users.
///
/// `record` only pushes under a single lock; sorting and percentile work
/// happens in `snapshot` after the lock is released.
pub struct MetricsCollector {
    store: Mutex<Store>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new(check_names: &[String]) -> Self {
        let checks = check_names
            .iter()
            .map(|name| CheckTally {
                name: name.clone(),
                passes: 0,
                fails: 0,
            })
            .collect();
        Self {
            store: Mutex::new(Store {
                checks,
                ..Store::default()
            }),
        }
    }

    pub fn record(&self, sample: Sample) {
        // Append-only, so a poisoned store is still consistent
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.durations.push(sample.duration);
        if !sample.status.is_success() {
            store.errors += 1;
        }
        store.bytes += sample.bytes;
        let previous = store.last_at.insert(sample.user, sample.at);
        debug_assert!(
            previous.map_or(true, |prev| prev <= sample.at),
            "user {} recorded a sample issued before its previous one",
            sample.user
        );
        *store.statuses.entry(sample.status).or_insert(0) += 1;
        for (tally, passed) in store.checks.iter_mut().zip(sample.checks) {
            if passed {
                tally.passes += 1;
            } else {
                tally.fails += 1;
            }
        }
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.durations.len() as u64
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let (mut durations, errors, bytes, statuses, checks, users) = {
            let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
            (
                store.durations.clone(),
                store.errors,
                store.bytes,
                store.statuses.clone(),
                store.checks.clone(),
                store.last_at.len() as u64,
            )
        };
        durations.sort_unstable();
        Snapshot {
            count: durations.len() as u64,
            errors,
            bytes,
            statuses,
            checks,
            users,
            durations,
        }
    }
}

/// Point-in-time aggregate view of every sample recorded so far.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub count: u64,
    /// Non-2xx responses plus failed attempts.
    pub errors: u64,
    pub bytes: u64,
    pub statuses: BTreeMap<Status, u64>,
    pub checks: Vec<CheckTally>,
    /// Distinct virtual users that recorded at least one sample.
    pub users: u64,
    durations: Vec<Duration>,
}

impl Snapshot {
    #[must_use]
    pub fn empty() -> Self {
        MetricsCollector::new(&[]).snapshot()
    }

    /// Latency at percentile `p` (0..=100), `None` without samples.
    ///
    /// Linear interpolation between the closest ranks: rank `(n - 1) * p / 100`
    /// over the sorted durations, blending the two neighbouring values by the
    /// fractional part.
    #[must_use]
    pub fn percentile(&self, p: f64) -> Option<Duration> {
        let last = self.durations.len().checked_sub(1)?;
        let rank = last as f64 * p.clamp(0.0, 100.0) / 100.0;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        let frac = rank - lo as f64;
        if lo == hi || frac == 0.0 {
            return Some(self.durations[lo]);
        }
        let (lo, hi) = (self.durations[lo], self.durations[hi]);
        Some(lo + (hi - lo).mul_f64(frac))
    }

    #[must_use]
    pub fn min(&self) -> Option<Duration> {
        self.durations.first().copied()
    }

    #[must_use]
    pub fn max(&self) -> Option<Duration> {
        self.durations.last().copied()
    }

    #[must_use]
    pub fn med(&self) -> Option<Duration> {
        self.percentile(50.0)
    }

    #[must_use]
    pub fn avg(&self) -> Option<Duration> {
        if self.durations.is_empty() {
            return None;
        }
        let total: Duration = self.durations.iter().sum();
        Some(total / self.durations.len() as u32)
    }

    /// Fraction of attempts counted as errors.
    #[must_use]
    pub fn error_rate(&self) -> Option<f64> {
        (self.count > 0).then(|| self.errors as f64 / self.count as f64)
    }

    /// Fraction of passed checks over every check evaluated.
    #[must_use]
    pub fn check_rate(&self) -> Option<f64> {
        let (passes, total) = self
            .checks
            .iter()
            .fold((0u64, 0u64), |(p, t), c| (p + c.passes, t + c.passes + c.fails));
        (total > 0).then(|| passes as f64 / total as f64)
    }
}
