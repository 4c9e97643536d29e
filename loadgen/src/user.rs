use crate::check;
use crate::client::{classify, HttpClient};
use crate::config::RunConfig;
use crate::metrics::{FailureKind, MetricsCollector, Sample, Status};
use hyper::StatusCode;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One simulated client: GET, record, sleep, repeat until stopped.
pub struct VirtualUser {
    id: u64,
    config: Arc<RunConfig>,
    client: HttpClient,
    collector: Arc<MetricsCollector>,
    run_started: Instant,
}

impl VirtualUser {
    #[must_use]
    pub fn new(
        id: u64,
        config: Arc<RunConfig>,
        client: HttpClient,
        collector: Arc<MetricsCollector>,
        run_started: Instant,
    ) -> Self {
        Self {
            id,
            config,
            client,
            collector,
            run_started,
        }
    }

    /// Loops until `stop` fires and returns the number of requests issued.
    ///
    /// `stop` is only looked at between a request and the following sleep,
    /// an in-flight request always runs to completion or timeout.
    pub async fn run(self, stop: CancellationToken) -> u64 {
        let mut issued = 0;
        while !stop.is_cancelled() {
            self.iterate().await;
            issued += 1;
            tokio::select! {
                () = stop.cancelled() => break,
                () = sleep(self.config.sleep) => {}
            }
        }
        debug!(user = self.id, issued, "virtual user stopped");
        issued
    }

    async fn iterate(&self) {
        let at = self.run_started.elapsed();
        let begin = Instant::now();
        let outcome = timeout(self.config.timeout, self.client.get(&self.config.url)).await;
        let (status, bytes, duration) = match outcome {
            Ok(Ok(resp)) => {
                let elapsed = begin.elapsed();
                if resp.status != StatusCode::OK {
                    warn!(
                        user = self.id,
                        status = resp.status.as_u16(),
                        body = %resp.body.snippet(),
                        "unexpected status"
                    );
                }
                (Status::Code(resp.status.as_u16()), resp.body.total, elapsed)
            }
            Ok(Err(e)) => {
                debug!(user = self.id, "request failed: {e:#}");
                (Status::Failed(classify(&e)), 0, begin.elapsed())
            }
            Err(_) => {
                debug!(user = self.id, "request timed out after {:?}", self.config.timeout);
                (Status::Failed(FailureKind::Timeout), 0, self.config.timeout)
            }
        };
        let checks = check::run_all(&self.config.checks, status, duration);
        self.collector.record(Sample {
            at,
            user: self.id,
            status,
            duration,
            bytes,
            checks,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScenarioFile;
    use std::time::Duration;

    async fn setup(path: &str, sleep: &str, timeout: &str) -> (Arc<RunConfig>, Arc<MetricsCollector>) {
        let (addr, _hits) = http_test_util::stub::spawn("127.0.0.1:0").await.unwrap();
        let config = ScenarioFile {
            base_url: Some(format!("http://{addr}")),
            path: Some(path.to_string()),
            sleep: Some(sleep.to_string()),
            timeout: Some(timeout.to_string()),
            ..ScenarioFile::default()
        }
        .resolve()
        .unwrap();
        let collector = Arc::new(MetricsCollector::new(&config.check_names()));
        (Arc::new(config), collector)
    }

    fn user(config: &Arc<RunConfig>, collector: &Arc<MetricsCollector>) -> VirtualUser {
        VirtualUser::new(
            7,
            Arc::clone(config),
            HttpClient::new(1),
            Arc::clone(collector),
            Instant::now(),
        )
    }

    #[tokio::test]
    async fn one_sample_per_iteration() {
        let (config, collector) = setup("/delay/1", "10ms", "1s").await;
        let stop = CancellationToken::new();
        let task = tokio::spawn(user(&config, &collector).run(stop.clone()));
        sleep(Duration::from_millis(150)).await;
        stop.cancel();
        let issued = task.await.unwrap();
        assert!(issued >= 2, "issued {issued}");
        let snap = collector.snapshot();
        assert_eq!(snap.count, issued);
        assert_eq!(snap.errors, 0);
        assert_eq!(snap.checks[0].passes, issued);
    }

    #[tokio::test]
    async fn stop_interrupts_sleep_not_request() {
        let (config, collector) = setup("/delay/100", "10s", "1s").await;
        let stop = CancellationToken::new();
        let task = tokio::spawn(user(&config, &collector).run(stop.clone()));
        // Cancel while the first request is still in flight
        sleep(Duration::from_millis(20)).await;
        stop.cancel();
        let issued = timeout(Duration::from_secs(2), task)
            .await
            .expect("user did not stop during its sleep")
            .unwrap();
        assert_eq!(issued, 1);
        assert_eq!(collector.snapshot().statuses[&Status::Code(200)], 1);
    }

    #[tokio::test]
    async fn hanging_target_records_timeout() {
        let (config, collector) = setup("/hang", "10s", "50ms").await;
        let stop = CancellationToken::new();
        let task = tokio::spawn(user(&config, &collector).run(stop.clone()));
        sleep(Duration::from_millis(100)).await;
        stop.cancel();
        assert_eq!(task.await.unwrap(), 1);
        let snap = collector.snapshot();
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.statuses[&Status::Failed(FailureKind::Timeout)], 1);
        assert_eq!(snap.max(), Some(Duration::from_millis(50)));
        assert_eq!(snap.checks[0].fails, 1);
        assert_eq!(snap.checks[1].fails, 1);
    }

    #[tokio::test]
    async fn error_status_is_recorded_as_is() {
        let (config, collector) = setup("/status/500", "10s", "1s").await;
        let stop = CancellationToken::new();
        let task = tokio::spawn(user(&config, &collector).run(stop.clone()));
        sleep(Duration::from_millis(50)).await;
        stop.cancel();
        assert_eq!(task.await.unwrap(), 1);
        let snap = collector.snapshot();
        assert_eq!(snap.statuses[&Status::Code(500)], 1);
        assert_eq!(snap.errors, 1);
    }
}
