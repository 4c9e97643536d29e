//! Pass/fail conditions on aggregate metrics, e.g. `http_req_duration: p(95)<500`.
use crate::error::{ConfigError, Result};
use crate::metrics::Snapshot;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Request latency, in milliseconds.
    HttpReqDuration,
    /// Share of attempts that were errors.
    HttpReqFailed,
    /// Number of attempts.
    HttpReqs,
    /// Share of passed checks.
    Checks,
}

impl Metric {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Metric::HttpReqDuration => "http_req_duration",
            Metric::HttpReqFailed => "http_req_failed",
            Metric::HttpReqs => "http_reqs",
            Metric::Checks => "checks",
        }
    }

    fn allows(self, aggregate: Aggregate) -> bool {
        match self {
            Metric::HttpReqDuration => matches!(
                aggregate,
                Aggregate::Avg
                    | Aggregate::Min
                    | Aggregate::Max
                    | Aggregate::Med
                    | Aggregate::Percentile(_)
            ),
            Metric::HttpReqFailed | Metric::Checks => aggregate == Aggregate::Rate,
            Metric::HttpReqs => aggregate == Aggregate::Count,
        }
    }
}

impl FromStr for Metric {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "http_req_duration" => Ok(Metric::HttpReqDuration),
            "http_req_failed" => Ok(Metric::HttpReqFailed),
            "http_reqs" => Ok(Metric::HttpReqs),
            "checks" => Ok(Metric::Checks),
            other => Err(ConfigError::UnknownMetric(other.to_string())),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregate {
    Avg,
    Min,
    Max,
    Med,
    Percentile(f64),
    Rate,
    Count,
}

impl Aggregate {
    fn parse(token: &str) -> Option<Self> {
        let agg = match token {
            "avg" => Aggregate::Avg,
            "min" => Aggregate::Min,
            "max" => Aggregate::Max,
            "med" => Aggregate::Med,
            "rate" => Aggregate::Rate,
            "count" => Aggregate::Count,
            _ => {
                let p: f64 = token
                    .strip_prefix("p(")?
                    .strip_suffix(')')?
                    .trim()
                    .parse()
                    .ok()?;
                if !(0.0..=100.0).contains(&p) {
                    return None;
                }
                Aggregate::Percentile(p)
            }
        };
        Some(agg)
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::Avg => f.write_str("avg"),
            Aggregate::Min => f.write_str("min"),
            Aggregate::Max => f.write_str("max"),
            Aggregate::Med => f.write_str("med"),
            Aggregate::Percentile(p) => write!(f, "p({p})"),
            Aggregate::Rate => f.write_str("rate"),
            Aggregate::Count => f.write_str("count"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Operator {
    // Longest symbols first so "<=" is not read as "<"
    const SYMBOLS: [(&'static str, Operator); 6] = [
        ("<=", Operator::Le),
        (">=", Operator::Ge),
        ("==", Operator::Eq),
        ("!=", Operator::Ne),
        ("<", Operator::Lt),
        (">", Operator::Gt),
    ];

    #[must_use]
    pub fn holds(self, measured: f64, bound: f64) -> bool {
        match self {
            Operator::Lt => measured < bound,
            Operator::Le => measured <= bound,
            Operator::Gt => measured > bound,
            Operator::Ge => measured >= bound,
            Operator::Eq => measured == bound,
            Operator::Ne => measured != bound,
        }
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        Self::SYMBOLS
            .iter()
            .find(|(_, op)| *op == self)
            .map_or("?", |(sym, _)| *sym)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: Metric,
    pub aggregate: Aggregate,
    pub op: Operator,
    pub bound: f64,
}

impl Threshold {
    /// Parses one k6-style expression such as `p(95)<500` for `metric`.
    pub fn parse(metric: &str, expr: &str) -> Result<Self> {
        let invalid = |reason: &str| ConfigError::Threshold {
            metric: metric.trim().to_string(),
            expr: expr.to_string(),
            reason: reason.to_string(),
        };
        let metric: Metric = metric.parse()?;
        let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
        let (at, sym, op) = Operator::SYMBOLS
            .iter()
            .filter_map(|(sym, op)| compact.find(sym).map(|at| (at, *sym, *op)))
            .min_by_key(|(at, sym, _)| (*at, usize::MAX - sym.len()))
            .ok_or_else(|| invalid("missing comparison operator"))?;
        let aggregate = Aggregate::parse(&compact[..at])
            .ok_or_else(|| invalid("unknown aggregate"))?;
        if !metric.allows(aggregate) {
            return Err(invalid("aggregate not available for this metric"));
        }
        let bound: f64 = compact[at + sym.len()..]
            .parse()
            .map_err(|_| invalid("bound is not a number"))?;
        if !bound.is_finite() {
            return Err(invalid("bound is not finite"));
        }
        Ok(Self {
            metric,
            aggregate,
            op,
            bound,
        })
    }

    /// The value this threshold compares, `None` when there is no data for it.
    #[must_use]
    pub fn measure(&self, snapshot: &Snapshot) -> Option<f64> {
        let millis = |d: Option<Duration>| d.map(|d| d.as_nanos() as f64 / 1e6);
        match (self.metric, self.aggregate) {
            (Metric::HttpReqDuration, Aggregate::Avg) => millis(snapshot.avg()),
            (Metric::HttpReqDuration, Aggregate::Min) => millis(snapshot.min()),
            (Metric::HttpReqDuration, Aggregate::Max) => millis(snapshot.max()),
            (Metric::HttpReqDuration, Aggregate::Med) => millis(snapshot.med()),
            (Metric::HttpReqDuration, Aggregate::Percentile(p)) => {
                millis(snapshot.percentile(p))
            }
            (Metric::HttpReqFailed, _) => snapshot.error_rate(),
            (Metric::HttpReqs, _) => Some(snapshot.count as f64),
            (Metric::Checks, _) => snapshot.check_rate(),
            // `parse` only builds allowed pairs
            (Metric::HttpReqDuration, _) => None,
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}{}{}",
            self.metric,
            self.aggregate,
            self.op.symbol(),
            self.bound
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed,
    /// The metric had no samples; reported, but not counted as a failure.
    NoData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOutcome {
    pub threshold: Threshold,
    pub measured: Option<f64>,
    pub outcome: Outcome,
}

impl ThresholdOutcome {
    #[inline]
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcome != Outcome::Failed
    }

    /// Distance between the measured value and the bound of a failed threshold.
    #[must_use]
    pub fn excess(&self) -> Option<f64> {
        match (self.outcome, self.measured) {
            (Outcome::Failed, Some(m)) => Some((m - self.threshold.bound).abs()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub outcomes: Vec<ThresholdOutcome>,
    pub passed: bool,
}

impl Verdict {
    pub fn failures(&self) -> impl Iterator<Item = &ThresholdOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }
}

/// Compares every threshold against `snapshot`. The run passes only when
/// no threshold failed.
#[must_use]
pub fn evaluate(snapshot: &Snapshot, thresholds: &[Threshold]) -> Verdict {
    let outcomes: Vec<ThresholdOutcome> = thresholds
        .iter()
        .map(|t| {
            let measured = t.measure(snapshot);
            let outcome = match measured {
                None => Outcome::NoData,
                Some(m) if t.op.holds(m, t.bound) => Outcome::Passed,
                Some(_) => Outcome::Failed,
            };
            ThresholdOutcome {
                threshold: t.clone(),
                measured,
                outcome,
            }
        })
        .collect();
    let passed = outcomes.iter().all(ThresholdOutcome::passed);
    Verdict { outcomes, passed }
}
