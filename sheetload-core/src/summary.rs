use serde::Serialize;
use sheetload_metrics::{MetricSeriesSummary, Registry, TrendSummary, per_sec};

use crate::config::{ScenarioConfig, ScenarioKind};
use crate::lifecycle::SetupContext;
use crate::request_metrics::{RunMetricIds, TAG_CHECK, TAG_GROUP};
use crate::scheduler::SchedulerReport;
use crate::thresholds_eval::{ThresholdResult, all_passed};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub scenario: ScenarioKind,
    pub total_duration_secs: u64,
    pub elapsed_secs: f64,
    pub configured_peak_vus: u64,
    pub observed_peak_vus: u64,
    pub vus_spawned: u64,
    pub stages: Vec<StageSummary>,
    pub setup: SetupSummary,
    pub http: HttpSummary,
    pub checks: ChecksSummary,
    pub iterations: IterationSummary,
    pub api_requests: ApiRequestsSummary,
    /// Every series in the registry, sorted by name then tags.
    pub metrics: Vec<MetricSeriesSummary>,
    pub thresholds: Vec<ThresholdResult>,
    pub passed: bool,
    pub interrupted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    pub duration_secs: u64,
    pub target: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetupSummary {
    pub healthy: bool,
    pub authenticated: bool,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpSummary {
    pub requests_total: u64,
    pub failed_requests_total: u64,
    /// `failed / total`, 0 with no requests.
    pub failed_rate: f64,
    /// Requests that never produced a response.
    pub transport_errors_total: u64,
    pub requests_per_sec: f64,
    /// Latency in milliseconds.
    pub duration_ms: TrendSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChecksSummary {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub rate: f64,
    pub by_check: Vec<CheckBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckBreakdown {
    pub group: String,
    pub check: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationSummary {
    pub total: u64,
    pub per_sec: f64,
    pub duration_ms: TrendSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiRequestsSummary {
    pub total: u64,
    pub per_sec: f64,
}

/// Everything the summary is computed from.
#[derive(Debug, Clone, Copy)]
pub struct SummaryInput<'a> {
    pub scenario: &'a ScenarioConfig,
    pub report: &'a SchedulerReport,
    pub setup: &'a SetupContext,
    pub metrics: &'a Registry,
    pub ids: &'a RunMetricIds,
}

fn fraction(hits: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Builds the run summary from final state. Metrics that were never written read as zero.
pub fn build_summary(input: SummaryInput<'_>, thresholds: Vec<ThresholdResult>) -> Summary {
    let SummaryInput {
        scenario,
        report,
        setup,
        metrics,
        ids,
    } = input;
    let secs = report.elapsed.as_secs_f64();

    let requests_total = metrics.query(ids.http_reqs).sum_counter_total();
    let (failed_seen, failed_requests_total) = metrics.query(ids.http_req_failed).sum_rate_total();
    let (checks_total, checks_passed) = metrics.query(ids.checks).sum_rate_total();
    let iterations_total = metrics.query(ids.iterations).sum_counter_total();
    let api_total = metrics.query(ids.api_requests).sum_counter_total();

    let group = metrics.resolve_key(TAG_GROUP);
    let check = metrics.resolve_key(TAG_CHECK);
    let mut by_check: Vec<CheckBreakdown> = metrics
        .query(ids.checks)
        .group_by([group, check])
        .sum_rate()
        .into_iter()
        .map(|(tags, (total, hits))| CheckBreakdown {
            group: tags.get(group).map(|k| metrics.resolve_str(k)).unwrap_or_default(),
            check: tags.get(check).map(|k| metrics.resolve_str(k)).unwrap_or_default(),
            passes: hits,
            fails: total.saturating_sub(hits),
        })
        .collect();
    by_check.sort_by(|a, b| a.group.cmp(&b.group).then_with(|| a.check.cmp(&b.check)));

    let passed = all_passed(&thresholds);

    Summary {
        scenario: scenario.kind,
        total_duration_secs: scenario.total_duration().as_secs(),
        elapsed_secs: secs,
        configured_peak_vus: scenario.peak_target(),
        observed_peak_vus: report.peak_vus,
        vus_spawned: report.vus_spawned,
        stages: scenario
            .stages
            .iter()
            .map(|s| StageSummary {
                duration_secs: s.duration.as_secs(),
                target: s.target,
            })
            .collect(),
        setup: SetupSummary {
            healthy: setup.healthy,
            authenticated: setup.authenticated(),
            username: setup.username.clone(),
        },
        http: HttpSummary {
            requests_total,
            failed_requests_total,
            failed_rate: fraction(failed_requests_total, failed_seen),
            transport_errors_total: metrics.query(ids.http_req_errors).sum_counter_total(),
            requests_per_sec: per_sec(requests_total, secs),
            duration_ms: metrics.query(ids.http_req_duration).merge_trend().summary(),
        },
        checks: ChecksSummary {
            total: checks_total,
            passed: checks_passed,
            failed: checks_total.saturating_sub(checks_passed),
            rate: fraction(checks_passed, checks_total),
            by_check,
        },
        iterations: IterationSummary {
            total: iterations_total,
            per_sec: per_sec(iterations_total, secs),
            duration_ms: metrics.query(ids.iteration_duration).merge_trend().summary(),
        },
        api_requests: ApiRequestsSummary {
            total: api_total,
            per_sec: per_sec(api_total, secs),
        },
        metrics: metrics.summarize(),
        thresholds,
        passed,
        interrupted: report.interrupted,
    }
}
