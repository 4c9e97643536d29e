//! Full runs against the stub target, with the ramp compressed into milliseconds.
use loadgen::config::{RunConfig, ScenarioFile, StageFile};
use loadgen::metrics::{FailureKind, Status};
use loadgen::run::{run, EXIT_THRESHOLDS_FAILED};
use loadgen::threshold::Outcome;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The kategori ramp shape (30s/1m/1m/30s to 50/100/200/0) scaled down.
const RAMP: [&str; 4] = ["150ms:5", "300ms:10", "300ms:20", "150ms:0"];

fn scenario(base: String, path: &str, stages: &[&str], thresholds: &[(&str, &str)]) -> RunConfig {
    let mut by_metric: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (metric, expr) in thresholds {
        by_metric
            .entry((*metric).to_string())
            .or_default()
            .push((*expr).to_string());
    }
    ScenarioFile {
        base_url: Some(base),
        path: Some(path.to_string()),
        sleep: Some("20ms".to_string()),
        timeout: Some("200ms".to_string()),
        tick: Some("10ms".to_string()),
        stages: Some(stages.iter().map(|s| StageFile::parse(s).unwrap()).collect()),
        thresholds: Some(by_metric),
        ..ScenarioFile::default()
    }
    .resolve()
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fast_ok_target_passes_p95() {
    let (addr, hits) = http_test_util::stub::spawn("127.0.0.1:0").await.unwrap();
    let config = scenario(
        format!("http://{addr}"),
        "/delay/10",
        &RAMP,
        &[("http_req_duration", "p(95)<500")],
    );
    let outcome = run(config, CancellationToken::new()).await;
    assert!(outcome.verdict.passed);
    assert_eq!(outcome.exit_code(), 0);
    assert!((18..=20).contains(&outcome.report.peak_users));
    assert!(outcome.snapshot.count > 0);
    assert_eq!(outcome.snapshot.errors, 0);
    assert_eq!(outcome.snapshot.count, outcome.report.issued);
    assert_eq!(hits.get(), outcome.report.issued);
    assert!(outcome.snapshot.users > 0);
    assert!(outcome.snapshot.users <= outcome.report.users_started);
    let p95 = outcome.snapshot.percentile(95.0).unwrap();
    assert!(p95 >= Duration::from_millis(10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn server_errors_fail_rate_but_not_latency() {
    let (addr, _hits) = http_test_util::stub::spawn("127.0.0.1:0").await.unwrap();
    let config = scenario(
        format!("http://{addr}"),
        "/status/500",
        &RAMP,
        &[
            ("http_req_duration", "p(95)<500"),
            ("http_req_failed", "rate<0.01"),
        ],
    );
    let outcome = run(config, CancellationToken::new()).await;
    let snap = &outcome.snapshot;
    assert!(snap.count > 0);
    assert_eq!(snap.errors, snap.count);
    assert_eq!(snap.statuses[&Status::Code(500)], snap.count);
    assert!(!outcome.verdict.passed);
    assert_eq!(outcome.exit_code(), EXIT_THRESHOLDS_FAILED);
    assert_eq!(outcome.verdict.outcomes[0].outcome, Outcome::Passed);
    assert_eq!(outcome.verdict.outcomes[1].outcome, Outcome::Failed);
    assert_eq!(outcome.verdict.outcomes[1].measured, Some(1.0));
    assert_eq!(snap.checks[0].passes, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hanging_target_records_timeouts() {
    let (addr, _hits) = http_test_util::stub::spawn("127.0.0.1:0").await.unwrap();
    let config = scenario(
        format!("http://{addr}"),
        "/hang",
        &["100ms:3", "100ms:0"],
        &[("http_req_duration", "p(95)<500")],
    );
    let timeout = config.timeout;
    let outcome = run(config, CancellationToken::new()).await;
    let snap = &outcome.snapshot;
    assert!(snap.count > 0);
    assert_eq!(snap.statuses[&Status::Failed(FailureKind::Timeout)], snap.count);
    assert_eq!(snap.min(), Some(timeout));
    assert_eq!(snap.percentile(95.0), Some(timeout));
    // 200ms timeouts still sit under a 500ms p95
    assert!(outcome.verdict.passed);
}

#[tokio::test]
async fn zero_targets_produce_no_data() {
    let (addr, hits) = http_test_util::stub::spawn("127.0.0.1:0").await.unwrap();
    let config = scenario(
        format!("http://{addr}"),
        "/api/kategori",
        &["50ms:0", "50ms:0"],
        &[("http_req_duration", "p(95)<500"), ("http_reqs", "count==0")],
    );
    let outcome = run(config, CancellationToken::new()).await;
    assert_eq!(outcome.snapshot.count, 0);
    assert_eq!(hits.get(), 0);
    assert_eq!(outcome.verdict.outcomes[0].outcome, Outcome::NoData);
    assert_eq!(outcome.verdict.outcomes[1].outcome, Outcome::Passed);
    assert!(outcome.verdict.passed);
    assert!(outcome.summary.render_text().contains("no data"));
}

#[tokio::test]
async fn unreachable_target_is_recorded_not_fatal() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let config = scenario(
        format!("http://{addr}"),
        "/",
        &["100ms:2"],
        &[("http_req_failed", "rate<0.5")],
    );
    let outcome = run(config, CancellationToken::new()).await;
    let snap = &outcome.snapshot;
    assert!(snap.count > 0);
    assert_eq!(snap.statuses[&Status::Failed(FailureKind::Connect)], snap.count);
    assert!(!outcome.verdict.passed);
}
