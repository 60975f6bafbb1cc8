use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use sheetload_core::request_metrics::{API_REQUESTS, HTTP_REQ_FAILED, HTTP_REQS, TAG_GROUP};
use sheetload_core::{MetricSeriesSummary, MetricValue, Summary, TrendSummary};

use super::duration::format_duration_single;
use super::format::*;

pub(crate) fn render(summary: &Summary) -> String {
    let mut out = String::new();

    writeln!(&mut out, "summary: {}", summary.scenario).ok();
    writeln!(
        &mut out,
        "  duration: {} of {} planned{}",
        format_duration_single(Duration::from_secs_f64(summary.elapsed_secs.max(0.0))),
        format_duration_single(Duration::from_secs(summary.total_duration_secs)),
        if summary.interrupted { " (interrupted)" } else { "" }
    )
    .ok();

    let stages = summary
        .stages
        .iter()
        .map(|s| {
            format!(
                "{}@{}",
                format_duration_single(Duration::from_secs(s.duration_secs)),
                s.target
            )
        })
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(&mut out, "  stages: {stages}").ok();
    writeln!(
        &mut out,
        "  vus: peak {} (configured {}, spawned {})",
        summary.observed_peak_vus, summary.configured_peak_vus, summary.vus_spawned
    )
    .ok();

    let setup = &summary.setup;
    writeln!(
        &mut out,
        "  setup: healthy={} authenticated={}{}",
        setup.healthy,
        setup.authenticated,
        setup
            .username
            .as_deref()
            .map(|u| format!(" user={u}"))
            .unwrap_or_default()
    )
    .ok();

    out.push_str("\nhttp\n");
    let http = &summary.http;
    writeln!(
        &mut out,
        "  requests: {} (failed {}, {}) rps={}",
        http.requests_total,
        http.failed_requests_total,
        format_pct(http.failed_rate),
        format_rate(http.requests_per_sec)
    )
    .ok();
    if http.transport_errors_total > 0 {
        writeln!(&mut out, "  transport_errors: {}", http.transport_errors_total).ok();
    }
    writeln!(&mut out, "  latency = {}", render_trend(&http.duration_ms)).ok();
    writeln!(
        &mut out,
        "  api_requests: {} ({}/s)",
        summary.api_requests.total,
        format_rate(summary.api_requests.per_sec)
    )
    .ok();
    writeln!(
        &mut out,
        "  iterations: {} ({}/s) duration = {}",
        summary.iterations.total,
        format_rate(summary.iterations.per_sec),
        render_trend(&summary.iterations.duration_ms)
    )
    .ok();

    render_checks(summary, &mut out);
    render_groups(&summary.metrics, &mut out);
    render_thresholds(summary, &mut out);

    out
}

fn render_trend(t: &TrendSummary) -> String {
    format!(
        "avg={} min={} med={} max={} p90={} p95={} p99={} (n={})",
        format_ms(t.avg),
        format_ms(t.min),
        format_ms(t.med),
        format_ms(t.max),
        format_ms(t.p90),
        format_ms(t.p95),
        format_ms(t.p99),
        t.count
    )
}

fn render_checks(summary: &Summary, out: &mut String) {
    let checks = &summary.checks;
    writeln!(
        out,
        "\nchecks: {}/{} passed ({})",
        checks.passed,
        checks.total,
        format_pct(checks.rate)
    )
    .ok();

    let mut current_group: Option<&str> = None;
    for c in &checks.by_check {
        if current_group != Some(c.group.as_str()) {
            current_group = Some(c.group.as_str());
            writeln!(out, "  group: {}", c.group).ok();
        }
        let status = if c.fails > 0 { "FAIL" } else { "OK" };
        writeln!(
            out,
            "    {}: pass={} fail={} [{status}]",
            c.check, c.passes, c.fails
        )
        .ok();
    }
}

#[derive(Debug, Default)]
struct GroupRow {
    requests: u64,
    failed: u64,
    api_requests: u64,
}

/// Folds the per-endpoint series into one row per group.
fn render_groups(series: &[MetricSeriesSummary], out: &mut String) {
    let mut by_group: BTreeMap<&str, GroupRow> = BTreeMap::new();

    for s in series {
        let Some(group) = s
            .tags
            .iter()
            .find(|(k, _)| k == TAG_GROUP)
            .map(|(_, v)| v.as_str())
        else {
            continue;
        };

        match (s.name.as_str(), &s.values) {
            (HTTP_REQS, MetricValue::Counter { count }) => {
                let row = by_group.entry(group).or_default();
                row.requests = row.requests.saturating_add(*count);
            }
            (HTTP_REQ_FAILED, MetricValue::Rate { hits, .. }) => {
                let row = by_group.entry(group).or_default();
                row.failed = row.failed.saturating_add(*hits);
            }
            (API_REQUESTS, MetricValue::Counter { count }) => {
                let row = by_group.entry(group).or_default();
                row.api_requests = row.api_requests.saturating_add(*count);
            }
            _ => {}
        }
    }

    if by_group.is_empty() {
        return;
    }

    out.push_str("\ngroups\n");
    for (group, row) in by_group {
        writeln!(
            out,
            "  {group}: requests={} failed={} api_requests={}",
            row.requests, row.failed, row.api_requests
        )
        .ok();
    }

    let mut endpoints: Vec<&MetricSeriesSummary> =
        series.iter().filter(|s| s.name == HTTP_REQS).collect();
    endpoints.sort_by(|a, b| a.tags.cmp(&b.tags));
    for s in endpoints {
        if let MetricValue::Counter { count } = &s.values {
            writeln!(out, "    {}{} = {count}", s.name, format_tags_inline(&s.tags, &[])).ok();
        }
    }
}

fn render_thresholds(summary: &Summary, out: &mut String) {
    if summary.thresholds.is_empty() {
        return;
    }

    out.push_str("\nthresholds\n");
    for t in &summary.thresholds {
        let mark = if t.passed { "ok" } else { "FAILED" };
        match t.observed {
            Some(v) => writeln!(
                out,
                "  {}: {} (observed {v:.4}) [{mark}]",
                t.metric, t.expression
            )
            .ok(),
            None => writeln!(
                out,
                "  {}: {} (no data) [{mark}]",
                t.metric, t.expression
            )
            .ok(),
        };
    }
    writeln!(
        out,
        "\nresult: {}",
        if summary.passed { "passed" } else { "failed" }
    )
    .ok();
}
