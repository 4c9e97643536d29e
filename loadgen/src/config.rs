//! Scenario configuration: built-in defaults, an optional TOML file and CLI
//! overrides, layered in that order and validated into a [`RunConfig`].
use crate::check::{Assertion, Check};
use crate::clock::{RampSchedule, Stage};
use crate::error::{ConfigError, Result};
use crate::threshold::Threshold;
use hyper::Uri;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Everything a run needs, validated.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub url: Uri,
    pub schedule: RampSchedule,
    pub thresholds: Vec<Threshold>,
    pub checks: Vec<Check>,
    /// Pause between iterations of one virtual user.
    pub sleep: Duration,
    /// Upper bound on a single request, after which it is recorded as failed.
    pub timeout: Duration,
    /// How often the scheduler reconciles the pool against the schedule.
    pub tick: Duration,
}

impl RunConfig {
    #[must_use]
    pub fn check_names(&self) -> Vec<String> {
        self.checks.iter().map(|c| c.name.clone()).collect()
    }
}

/// Scenario as written in a TOML file. Every field is optional so files and
/// command line flags can be layered over the defaults.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    pub base_url: Option<String>,
    pub path: Option<String>,
    pub sleep: Option<String>,
    pub timeout: Option<String>,
    pub tick: Option<String>,
    pub start_target: Option<i64>,
    pub stages: Option<Vec<StageFile>>,
    pub thresholds: Option<BTreeMap<String, Vec<String>>>,
    pub checks: Option<Vec<CheckFile>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageFile {
    pub duration: String,
    pub target: i64,
}

impl StageFile {
    /// Parses the command line form `DURATION:TARGET`, e.g. `30s:50`.
    pub fn parse(raw: &str) -> Result<Self> {
        let (duration, target) = raw
            .split_once(':')
            .ok_or_else(|| ConfigError::Stage(raw.to_string()))?;
        let target = target
            .trim()
            .parse()
            .map_err(|_| ConfigError::Stage(raw.to_string()))?;
        Ok(Self {
            duration: duration.trim().to_string(),
            target,
        })
    }

    fn resolve(&self) -> Result<Stage> {
        Ok(Stage::new(
            parse_duration(&self.duration)?,
            non_negative(self.target)?,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckFile {
    pub name: String,
    pub status: Option<u16>,
    pub max_duration: Option<String>,
}

impl CheckFile {
    fn resolve(&self) -> Result<Check> {
        let assertion = match (self.status, &self.max_duration) {
            (Some(code), None) => Assertion::Status(code),
            (None, Some(max)) => Assertion::MaxDuration(parse_duration(max)?),
            _ => {
                return Err(ConfigError::Check {
                    name: self.name.clone(),
                    reason: "exactly one of `status` or `max_duration` is required".to_string(),
                })
            }
        };
        Ok(Check::new(self.name.clone(), assertion))
    }
}

impl ScenarioFile {
    /// The stock scenario: ramp to 200 users against `/api/kategori` and
    /// require a p95 latency under 500ms.
    #[must_use]
    pub fn kategori() -> Self {
        let stage = |duration: &str, target| StageFile {
            duration: duration.to_string(),
            target,
        };
        Self {
            base_url: Some("http://localhost:8080/api".to_string()),
            path: Some("kategori".to_string()),
            sleep: Some("1s".to_string()),
            timeout: Some("5s".to_string()),
            tick: Some("1s".to_string()),
            start_target: Some(0),
            stages: Some(vec![
                stage("30s", 50),
                stage("1m", 100),
                stage("1m", 200),
                stage("30s", 0),
            ]),
            thresholds: Some(BTreeMap::from([(
                "http_req_duration".to_string(),
                vec!["p(95)<500".to_string()],
            )])),
            checks: Some(vec![
                CheckFile {
                    name: "is status 200".to_string(),
                    status: Some(200),
                    max_duration: None,
                },
                CheckFile {
                    name: "response time < 500ms".to_string(),
                    status: None,
                    max_duration: Some("500ms".to_string()),
                },
            ]),
        }
    }

    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    /// Fields set in `top` win; lists are replaced, not merged.
    #[must_use]
    pub fn overlay(self, top: ScenarioFile) -> Self {
        Self {
            base_url: top.base_url.or(self.base_url),
            path: top.path.or(self.path),
            sleep: top.sleep.or(self.sleep),
            timeout: top.timeout.or(self.timeout),
            tick: top.tick.or(self.tick),
            start_target: top.start_target.or(self.start_target),
            stages: top.stages.or(self.stages),
            thresholds: top.thresholds.or(self.thresholds),
            checks: top.checks.or(self.checks),
        }
    }

    /// Validates the scenario. Missing fields fall back to [`ScenarioFile::kategori`].
    pub fn resolve(self) -> Result<RunConfig> {
        let file = Self::kategori().overlay(self);
        let url = join_url(
            &file.base_url.unwrap_or_default(),
            &file.path.unwrap_or_default(),
        )?;
        let stages = file
            .stages
            .unwrap_or_default()
            .iter()
            .map(StageFile::resolve)
            .collect::<Result<Vec<_>>>()?;
        let schedule = RampSchedule::new(non_negative(file.start_target.unwrap_or(0))?, stages)?;
        let mut thresholds = Vec::new();
        for (metric, exprs) in file.thresholds.unwrap_or_default() {
            for expr in exprs {
                thresholds.push(Threshold::parse(&metric, &expr)?);
            }
        }
        let checks = file
            .checks
            .unwrap_or_default()
            .iter()
            .map(CheckFile::resolve)
            .collect::<Result<Vec<_>>>()?;
        let sleep = parse_duration(&file.sleep.unwrap_or_default())?;
        let timeout = parse_duration(&file.timeout.unwrap_or_default())?;
        if timeout.is_zero() {
            return Err(ConfigError::Zero { field: "timeout" });
        }
        let tick = parse_duration(&file.tick.unwrap_or_default())?;
        if tick.is_zero() {
            return Err(ConfigError::Zero { field: "tick" });
        }
        Ok(RunConfig {
            url,
            schedule,
            thresholds,
            checks,
            sleep,
            timeout,
            tick,
        })
    }
}

/// Parses `METRIC=EXPR` as given on the command line.
pub fn parse_threshold_flag(raw: &str) -> Result<(String, String)> {
    raw.split_once('=')
        .map(|(metric, expr)| (metric.trim().to_string(), expr.trim().to_string()))
        .ok_or_else(|| ConfigError::Threshold {
            metric: String::new(),
            expr: raw.to_string(),
            reason: "expected METRIC=EXPR".to_string(),
        })
}

/// Parses durations such as `500ms`, `30s`, `1m30s`, `1.5s`.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let s = raw.trim();
    let parsed = if s.contains('.') {
        parse_fractional(s)
    } else {
        humantime::parse_duration(s).ok()
    };
    parsed.ok_or_else(|| ConfigError::Duration(raw.to_string()))
}

/// A single decimal amount with one unit, e.g. `1.5s` or `0.5m`.
fn parse_fractional(s: &str) -> Option<Duration> {
    let split = s.find(|c: char| !(c.is_ascii_digit() || c == '.'))?;
    let (value, unit) = s.split_at(split);
    let value: f64 = value.parse().ok()?;
    let secs_per_unit = match unit {
        "ms" => 1e-3,
        "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        _ => return None,
    };
    Duration::try_from_secs_f64(value * secs_per_unit).ok()
}

fn non_negative(target: i64) -> Result<u64> {
    u64::try_from(target).map_err(|_| ConfigError::Target(target.to_string()))
}

fn join_url(base: &str, path: &str) -> Result<Uri> {
    let base = base.trim().trim_end_matches('/');
    let path = path.trim().trim_start_matches('/');
    let full = if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{path}")
    };
    let invalid = |reason: &str| ConfigError::Url {
        url: full.clone(),
        reason: reason.to_string(),
    };
    let uri: Uri = full.parse().map_err(|_| invalid("not a valid URI"))?;
    if uri.scheme_str() != Some("http") {
        return Err(invalid("only http:// targets are supported"));
    }
    if uri.authority().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threshold::{Aggregate, Metric};

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("1h 30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("0.5m").unwrap(), Duration::from_secs(30));
        for bad in ["", "30", "-1s", "s", "1..2s", "1.5", "1.5x", "1.5s30ms", "-0.5s"] {
            assert!(parse_duration(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn parses_stage_flags() {
        assert_eq!(
            StageFile::parse("30s:50").unwrap(),
            StageFile {
                duration: "30s".to_string(),
                target: 50
            }
        );
        assert!(matches!(StageFile::parse("30s"), Err(ConfigError::Stage(_))));
        assert!(matches!(StageFile::parse("30s:x"), Err(ConfigError::Stage(_))));
    }

    #[test]
    fn default_scenario_matches_kategori_run() {
        let cfg = ScenarioFile::default().resolve().unwrap();
        assert_eq!(cfg.url.to_string(), "http://localhost:8080/api/kategori");
        assert_eq!(cfg.schedule.total_duration(), Duration::from_secs(180));
        assert_eq!(cfg.schedule.max_target(), 200);
        assert_eq!(cfg.sleep, Duration::from_secs(1));
        assert_eq!(cfg.timeout, Duration::from_secs(5));
        assert_eq!(cfg.thresholds.len(), 1);
        assert_eq!(cfg.thresholds[0].metric, Metric::HttpReqDuration);
        assert_eq!(cfg.thresholds[0].aggregate, Aggregate::Percentile(95.0));
        assert_eq!(
            cfg.check_names(),
            vec!["is status 200", "response time < 500ms"]
        );
    }

    #[test]
    fn bundled_scenario_file_parses() {
        let raw = include_str!("../scenarios/kategori.toml");
        let file = ScenarioFile::from_toml_str(raw, Path::new("kategori.toml")).unwrap();
        let cfg = file.resolve().unwrap();
        assert_eq!(cfg.url.to_string(), "http://localhost:8080/api/kategori");
        assert_eq!(cfg.schedule.stages().len(), 4);
        assert_eq!(cfg.checks.len(), 2);
    }

    #[test]
    fn overlay_replaces_lists() {
        let top = ScenarioFile {
            stages: Some(vec![StageFile::parse("1s:2").unwrap()]),
            path: Some("/health".to_string()),
            ..ScenarioFile::default()
        };
        let cfg = ScenarioFile::kategori().overlay(top).resolve().unwrap();
        assert_eq!(cfg.schedule.stages().len(), 1);
        assert_eq!(cfg.url.to_string(), "http://localhost:8080/api/health");
        assert_eq!(cfg.thresholds.len(), 1);
    }

    #[test]
    fn rejects_negative_values() {
        let file = ScenarioFile {
            stages: Some(vec![StageFile {
                duration: "10s".to_string(),
                target: -1,
            }]),
            ..ScenarioFile::default()
        };
        assert!(matches!(file.resolve(), Err(ConfigError::Target(_))));

        let file = ScenarioFile {
            stages: Some(vec![StageFile {
                duration: "-10s".to_string(),
                target: 1,
            }]),
            ..ScenarioFile::default()
        };
        assert!(matches!(file.resolve(), Err(ConfigError::Duration(_))));

        let file = ScenarioFile {
            stages: Some(Vec::new()),
            ..ScenarioFile::default()
        };
        assert!(matches!(file.resolve(), Err(ConfigError::NoStages)));
    }

    #[test]
    fn rejects_bad_targets_and_knobs() {
        let file = ScenarioFile {
            base_url: Some("https://example.com".to_string()),
            ..ScenarioFile::default()
        };
        assert!(matches!(file.resolve(), Err(ConfigError::Url { .. })));

        let file = ScenarioFile {
            timeout: Some("0s".to_string()),
            ..ScenarioFile::default()
        };
        assert!(matches!(
            file.resolve(),
            Err(ConfigError::Zero { field: "timeout" })
        ));

        let toml = "base_url = \"http://x\"\nbogus = 1\n";
        assert!(matches!(
            ScenarioFile::from_toml_str(toml, Path::new("x.toml")),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn rejects_ambiguous_checks() {
        let file = ScenarioFile {
            checks: Some(vec![CheckFile {
                name: "both".to_string(),
                status: Some(200),
                max_duration: Some("1s".to_string()),
            }]),
            ..ScenarioFile::default()
        };
        assert!(matches!(file.resolve(), Err(ConfigError::Check { .. })));
    }

    #[test]
    fn splits_threshold_flags_on_first_equals() {
        assert_eq!(
            parse_threshold_flag("checks=rate==1").unwrap(),
            ("checks".to_string(), "rate==1".to_string())
        );
        assert!(parse_threshold_flag("p(95)<500").is_err());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        assert!(matches!(
            ScenarioFile::load(Path::new("/nonexistent/loadgen.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
