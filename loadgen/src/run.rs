use crate::config::RunConfig;
use crate::metrics::{MetricsCollector, Snapshot};
use crate::report::Summary;
use crate::scheduler::{Scheduler, SchedulerReport};
use crate::threshold::{evaluate, Verdict};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit code when the run completed but a threshold failed.
pub const EXIT_THRESHOLDS_FAILED: u8 = 99;
/// Exit code when the run could not start.
pub const EXIT_SETUP_FAILED: u8 = 1;

pub struct RunOutcome {
    pub report: SchedulerReport,
    pub snapshot: Snapshot,
    pub verdict: Verdict,
    pub summary: Summary,
}

impl RunOutcome {
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.verdict.passed {
            0
        } else {
            EXIT_THRESHOLDS_FAILED
        }
    }
}

/// Runs the whole schedule against `config.url` and judges the result.
pub async fn run(config: RunConfig, shutdown: CancellationToken) -> RunOutcome {
    info!(
        url = %config.url,
        "{} stages over {:?}, up to {} users",
        config.schedule.stages().len(),
        config.schedule.total_duration(),
        config.schedule.max_target()
    );
    let config = Arc::new(config);
    let collector = Arc::new(MetricsCollector::new(&config.check_names()));
    let report = Scheduler::new(Arc::clone(&config), Arc::clone(&collector))
        .run(shutdown)
        .await;

    let snapshot = collector.snapshot();
    if snapshot.count != report.issued {
        warn!(
            recorded = snapshot.count,
            issued = report.issued,
            "sample count does not match issued requests"
        );
    }
    if snapshot.users > report.users_started {
        warn!(
            reporting = snapshot.users,
            started = report.users_started,
            "samples came from more users than were started"
        );
    }
    let verdict = evaluate(&snapshot, &config.thresholds);
    for failed in verdict.failures() {
        warn!(
            "threshold {} failed: measured {:?}",
            failed.threshold, failed.measured
        );
    }
    let summary = Summary::new(&config, &report, &snapshot, &verdict);
    RunOutcome {
        report,
        snapshot,
        verdict,
        summary,
    }
}
