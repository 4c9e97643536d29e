use clap::Parser;
use loadgen::config::{parse_threshold_flag, ScenarioFile, StageFile};
use loadgen::error::ConfigError;
use loadgen::run::{run, EXIT_SETUP_FAILED};
use mimalloc::MiMalloc;
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Ramp virtual users against one HTTP endpoint and check latency/error thresholds.
#[derive(Parser)]
#[command(name = "loadgen", version)]
struct Cli {
    /// Scenario file (TOML); flags below override its values
    #[arg(long, short, env = "LOADGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the API under test
    #[arg(long, env = "LOADGEN_BASE_URL")]
    base_url: Option<String>,

    /// Endpoint path appended to the base URL
    #[arg(long)]
    path: Option<String>,

    /// Ramp stage as DURATION:TARGET, repeatable (e.g. --stage 30s:50 --stage 1m:100)
    #[arg(long = "stage")]
    stages: Vec<String>,

    /// Threshold as METRIC=EXPR, repeatable (e.g. --threshold 'http_req_duration=p(95)<500')
    #[arg(long = "threshold")]
    thresholds: Vec<String>,

    /// Sleep between iterations of one user
    #[arg(long)]
    sleep: Option<String>,

    /// Per-request timeout
    #[arg(long)]
    timeout: Option<String>,

    /// Scheduler tick interval
    #[arg(long)]
    tick: Option<String>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Only log warnings and errors
    #[arg(long, short)]
    quiet: bool,
}

impl Cli {
    fn scenario(&self) -> Result<ScenarioFile, ConfigError> {
        let file = match &self.config {
            Some(path) => ScenarioFile::load(path)?,
            None => ScenarioFile::default(),
        };
        let stages = if self.stages.is_empty() {
            None
        } else {
            Some(
                self.stages
                    .iter()
                    .map(|s| StageFile::parse(s))
                    .collect::<Result<Vec<_>, _>>()?,
            )
        };
        let thresholds = if self.thresholds.is_empty() {
            None
        } else {
            let mut by_metric: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for raw in &self.thresholds {
                let (metric, expr) = parse_threshold_flag(raw)?;
                by_metric.entry(metric).or_default().push(expr);
            }
            Some(by_metric)
        };
        let flags = ScenarioFile {
            base_url: self.base_url.clone(),
            path: self.path.clone(),
            sleep: self.sleep.clone(),
            timeout: self.timeout.clone(),
            tick: self.tick.clone(),
            stages,
            thresholds,
            ..ScenarioFile::default()
        };
        Ok(file.overlay(flags))
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_filter = if cli.quiet { "loadgen=warn" } else { "loadgen=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .init();

    let config = match cli.scenario().and_then(ScenarioFile::resolve) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(EXIT_SETUP_FAILED);
        }
    };
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to start runtime: {e}");
            return ExitCode::from(EXIT_SETUP_FAILED);
        }
    };
    let _guard = rt.enter();
    let shutdown = CancellationToken::new();
    let on_ctrl_c = shutdown.clone();
    rt.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });
    let outcome = rt.block_on(run(config, shutdown));

    if cli.json {
        match outcome.summary.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::error!("failed to encode summary: {e}"),
        }
    } else {
        print!("{}", outcome.summary.render_text());
    }
    ExitCode::from(outcome.exit_code())
}
