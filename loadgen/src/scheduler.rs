use crate::client::HttpClient;
use crate::config::RunConfig;
use crate::metrics::MetricsCollector;
use crate::user::VirtualUser;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerReport {
    /// Requests issued across every user that ran. A user task that
    /// panicked contributes 0 here, so the total then falls short of the
    /// collector's count (logged when the run ends).
    pub issued: u64,
    pub users_started: u64,
    pub peak_users: u64,
    pub elapsed: Duration,
    /// The run was cut short by the shutdown token.
    pub interrupted: bool,
}

/// Keeps the number of running virtual users in line with the ramp schedule.
pub struct Scheduler {
    config: Arc<RunConfig>,
    client: HttpClient,
    collector: Arc<MetricsCollector>,
}

impl Scheduler {
    #[must_use]
    pub fn new(config: Arc<RunConfig>, collector: Arc<MetricsCollector>) -> Self {
        let peak = usize::try_from(config.schedule.max_target()).unwrap_or(usize::MAX);
        Self {
            config,
            client: HttpClient::new(peak.max(1)),
            collector,
        }
    }

    /// Drives the schedule to its end, or until `shutdown` fires, then
    /// stops every user and waits for their in-flight requests.
    pub async fn run(self, shutdown: CancellationToken) -> SchedulerReport {
        let started = Instant::now();
        let mut ticker = interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut active: Vec<CancellationToken> = Vec::new();
        let mut users: JoinSet<u64> = JoinSet::new();
        let mut report = SchedulerReport {
            issued: 0,
            users_started: 0,
            peak_users: 0,
            elapsed: Duration::ZERO,
            interrupted: false,
        };
        let mut stage = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = shutdown.cancelled() => {
                    info!("shutdown requested, stopping {} users", active.len());
                    report.interrupted = true;
                    break;
                }
                Some(joined) = users.join_next(), if !users.is_empty() => {
                    report.issued += issued_by(joined);
                    continue;
                }
            }

            let elapsed = started.elapsed();
            let Some(target) = self.config.schedule.target_at(elapsed) else {
                break;
            };
            let current = self.config.schedule.stage_at(elapsed);
            if current != stage {
                if let Some(index) = current {
                    let s = self.config.schedule.stages()[index];
                    info!(
                        "stage {}/{}: {} users over {:?}",
                        index + 1,
                        self.config.schedule.stages().len(),
                        s.target,
                        s.duration
                    );
                }
                stage = current;
            }

            let target = usize::try_from(target).unwrap_or(usize::MAX);
            if active.len() != target {
                debug!(from = active.len(), to = target, "resizing pool");
            }
            while active.len() < target {
                let stop = shutdown.child_token();
                let user = VirtualUser::new(
                    report.users_started,
                    Arc::clone(&self.config),
                    self.client.clone(),
                    Arc::clone(&self.collector),
                    started,
                );
                users.spawn(user.run(stop.clone()));
                active.push(stop);
                report.users_started += 1;
            }
            // Most recently started users retire first
            while active.len() > target {
                if let Some(stop) = active.pop() {
                    stop.cancel();
                }
            }
            report.peak_users = report.peak_users.max(active.len() as u64);
        }

        for stop in active.drain(..) {
            stop.cancel();
        }
        while let Some(joined) = users.join_next().await {
            report.issued += issued_by(joined);
        }
        report.elapsed = started.elapsed();
        info!(
            issued = report.issued,
            users = report.users_started,
            "run finished in {:.1?}",
            report.elapsed
        );
        report
    }
}

fn issued_by(joined: Result<u64, JoinError>) -> u64 {
    joined.unwrap_or_else(|e| {
        error!("virtual user task failed: {e}");
        0
    })
}
