use std::sync::Arc;
use std::time::Duration;

use sheetload_http::HttpClient;
use sheetload_metrics::Registry;
use tracing::info;

use crate::config::ScenarioConfig;
use crate::executor::FlowExecutor;
use crate::flow::{Flow, default_flow};
use crate::lifecycle::{Credentials, Lifecycle};
use crate::progress::{ProgressFn, ProgressSink};
use crate::request_metrics::RunMetricIds;
use crate::schedule::RampingSchedule;
use crate::scheduler::{SchedulerConfig, run_schedule};
use crate::summary::{Summary, SummaryInput, build_summary};
use crate::thresholds_eval::evaluate_thresholds;
use crate::vu::Interrupt;
use crate::Result;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_THINK_TIME: Duration = Duration::from_secs(1);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub base_url: String,
    pub scenario: ScenarioConfig,
    pub credentials: Credentials,
    pub flow: Flow,
    pub think_time: Duration,
    pub request_timeout: Option<Duration>,
    pub scheduler: SchedulerConfig,
}

impl RunOptions {
    pub fn new(base_url: impl Into<String>, scenario: ScenarioConfig) -> Self {
        Self {
            base_url: base_url.into(),
            scenario,
            credentials: Credentials::default(),
            flow: default_flow(),
            think_time: DEFAULT_THINK_TIME,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Setup, ramp the VUs through the flow, teardown, then evaluate thresholds.
///
/// # Errors
/// Fails only before any VU starts, when the metrics registry cannot be built.
pub async fn run(
    options: RunOptions,
    interrupt: Arc<Interrupt>,
    progress: Option<ProgressFn>,
) -> Result<Summary> {
    let RunOptions {
        base_url,
        scenario,
        credentials,
        flow,
        think_time,
        request_timeout,
        scheduler,
    } = options;

    let metrics = Arc::new(Registry::default());
    let ids = RunMetricIds::register(&metrics)?;
    let client = HttpClient::default().with_default_timeout(request_timeout);

    info!(base_url = %base_url, scenario = %scenario.kind, "setup");
    let lifecycle = Lifecycle::setup(&client, &base_url, &credentials, request_timeout).await;

    let executor = Arc::new(FlowExecutor {
        client,
        base_url,
        flow: Arc::new(flow),
        setup: lifecycle.context(),
        metrics: metrics.clone(),
        ids,
        think_time,
        request_timeout,
    });

    let schedule = RampingSchedule::new(scenario.stages.clone());
    info!(
        total_duration = ?schedule.total_duration(),
        peak_vus = schedule.peak_target(),
        stages = schedule.stages().len(),
        "starting VUs"
    );

    let sink = progress.map(|callback| ProgressSink {
        callback,
        metrics: metrics.clone(),
        ids,
    });
    let report = run_schedule(&schedule, &scheduler, interrupt, sink, move |ctx| {
        executor.clone().run_vu(ctx)
    })
    .await;
    info!(
        elapsed = ?report.elapsed,
        peak_vus = report.peak_vus,
        interrupted = report.interrupted,
        "all VUs stopped"
    );

    let setup = lifecycle.teardown(&metrics);

    let thresholds = evaluate_thresholds(&metrics, &scenario.thresholds);
    Ok(build_summary(
        SummaryInput {
            scenario: &scenario,
            report: &report,
            setup: &setup,
            metrics: &metrics,
            ids: &ids,
        },
        thresholds,
    ))
}
