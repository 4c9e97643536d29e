//! End-of-run summary, as text for humans or JSON for scripts.
use crate::config::RunConfig;
use crate::metrics::Snapshot;
use crate::scheduler::SchedulerReport;
use crate::threshold::{Outcome, Verdict};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencySummary {
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub med: Option<f64>,
    pub max: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdSummary {
    pub threshold: String,
    pub measured: Option<f64>,
    pub bound: f64,
    pub outcome: Outcome,
    pub excess: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub target: String,
    pub elapsed_secs: f64,
    pub vus_max: u64,
    pub interrupted: bool,
    pub http_reqs: u64,
    pub http_reqs_per_sec: f64,
    pub http_req_failed: Option<f64>,
    pub data_received: u64,
    /// Milliseconds.
    pub http_req_duration: LatencySummary,
    pub statuses: BTreeMap<String, u64>,
    pub checks: Vec<CheckSummary>,
    pub thresholds: Vec<ThresholdSummary>,
    pub passed: bool,
}

fn millis(d: Option<Duration>) -> Option<f64> {
    d.map(|d| d.as_nanos() as f64 / 1e6)
}

impl Summary {
    #[must_use]
    pub fn new(
        config: &RunConfig,
        run: &SchedulerReport,
        snapshot: &Snapshot,
        verdict: &Verdict,
    ) -> Self {
        let secs = run.elapsed.as_secs_f64();
        Self {
            target: config.url.to_string(),
            elapsed_secs: secs,
            vus_max: run.peak_users,
            interrupted: run.interrupted,
            http_reqs: snapshot.count,
            http_reqs_per_sec: if secs > 0.0 {
                snapshot.count as f64 / secs
            } else {
                0.0
            },
            http_req_failed: snapshot.error_rate(),
            data_received: snapshot.bytes,
            http_req_duration: LatencySummary {
                avg: millis(snapshot.avg()),
                min: millis(snapshot.min()),
                med: millis(snapshot.med()),
                max: millis(snapshot.max()),
                p90: millis(snapshot.percentile(90.0)),
                p95: millis(snapshot.percentile(95.0)),
                p99: millis(snapshot.percentile(99.0)),
            },
            statuses: snapshot
                .statuses
                .iter()
                .map(|(status, n)| (status.to_string(), *n))
                .collect(),
            checks: snapshot
                .checks
                .iter()
                .map(|c| CheckSummary {
                    name: c.name.clone(),
                    passes: c.passes,
                    fails: c.fails,
                })
                .collect(),
            thresholds: verdict
                .outcomes
                .iter()
                .map(|o| ThresholdSummary {
                    threshold: o.threshold.to_string(),
                    measured: o.measured,
                    bound: o.threshold.bound,
                    outcome: o.outcome,
                    excess: o.excess(),
                })
                .collect(),
            passed: verdict.passed,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) -> std::fmt::Result {
        let ms = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}ms"));
        let pct = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}%", v * 100.0));

        writeln!(out)?;
        writeln!(
            out,
            "  execution: {}, {:.1}s, {} max VUs{}",
            self.target,
            self.elapsed_secs,
            self.vus_max,
            if self.interrupted { " (interrupted)" } else { "" }
        )?;
        writeln!(out)?;
        for c in &self.checks {
            let total = c.passes + c.fails;
            let rate = (total > 0).then(|| c.passes as f64 / total as f64);
            let mark = if c.fails == 0 { '✓' } else { '✗' };
            writeln!(
                out,
                "     {mark} {:.<30} {} ✓ {} ✗ {}",
                format!("{} ", c.name),
                pct(rate),
                c.passes,
                c.fails
            )?;
        }
        if !self.checks.is_empty() {
            writeln!(out)?;
        }
        let line = |out: &mut String, name: &str, value: String| {
            writeln!(out, "     {:.<28}: {value}", format!("{name} "))
        };
        let (passes, total) = self
            .checks
            .iter()
            .fold((0, 0), |(p, t), c| (p + c.passes, t + c.passes + c.fails));
        line(out, "checks", pct((total > 0).then(|| passes as f64 / total as f64)))?;
        line(out, "data_received", format!("{} B", self.data_received))?;
        let d = &self.http_req_duration;
        line(
            out,
            "http_req_duration",
            format!(
                "avg={} min={} med={} max={} p(90)={} p(95)={} p(99)={}",
                ms(d.avg),
                ms(d.min),
                ms(d.med),
                ms(d.max),
                ms(d.p90),
                ms(d.p95),
                ms(d.p99)
            ),
        )?;
        line(out, "http_req_failed", pct(self.http_req_failed))?;
        line(
            out,
            "http_reqs",
            format!("{} {:.2}/s", self.http_reqs, self.http_reqs_per_sec),
        )?;
        let statuses = self
            .statuses
            .iter()
            .map(|(s, n)| format!("{s}={n}"))
            .collect::<Vec<_>>()
            .join(" ");
        line(out, "status", statuses)?;

        if !self.thresholds.is_empty() {
            writeln!(out)?;
            writeln!(out, "  thresholds")?;
            for t in &self.thresholds {
                let measured = t
                    .measured
                    .map_or_else(|| "no data".to_string(), |m| format!("measured {m:.3}"));
                match t.outcome {
                    Outcome::Failed => writeln!(
                        out,
                        "     ✗ {}  {measured}, bound {}, off by {:.3}",
                        t.threshold,
                        t.bound,
                        t.excess.unwrap_or_default()
                    )?,
                    Outcome::NoData => writeln!(out, "     - {}  {measured}", t.threshold)?,
                    Outcome::Passed => writeln!(out, "     ✓ {}  {measured}", t.threshold)?,
                }
            }
        }
        writeln!(out)?;
        let failed = self.thresholds.iter().filter(|t| t.outcome == Outcome::Failed).count();
        if self.passed {
            writeln!(out, "  result: PASS")?;
        } else {
            writeln!(
                out,
                "  result: FAIL ({failed} of {} thresholds failed)",
                self.thresholds.len()
            )?;
        }
        Ok(())
    }
}
