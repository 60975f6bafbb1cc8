use std::time::Duration;

use sheetload_metrics::{MetricId, MetricKind, Registry};

use crate::Result;

pub const HTTP_REQS: &str = "http_reqs";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const HTTP_REQ_ERRORS: &str = "http_req_errors";
pub const CHECKS: &str = "checks";
pub const API_REQUESTS: &str = "api_requests";
pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";

pub const TAG_GROUP: &str = "group";
pub const TAG_ENDPOINT: &str = "endpoint";
pub const TAG_CHECK: &str = "check";
pub const TAG_ERROR_KIND: &str = "error_kind";

#[derive(Debug, Clone, Copy)]
pub struct RunMetricIds {
    pub http_reqs: MetricId,
    /// `true` when the request failed at the transport level or returned an unexpected status.
    pub http_req_failed: MetricId,
    /// Request latency in milliseconds, completed responses only.
    pub http_req_duration: MetricId,
    pub http_req_errors: MetricId,
    pub checks: MetricId,
    pub api_requests: MetricId,
    pub iterations: MetricId,
    /// Iteration wall time in milliseconds.
    pub iteration_duration: MetricId,
}

/// One finished HTTP call.
#[derive(Debug, Clone, Copy)]
pub struct RequestSample<'a> {
    pub group: &'a str,
    pub endpoint: &'a str,
    /// `None` for a network failure.
    pub status: Option<u16>,
    /// Whether the status is one the step lists as expected. Drives `http_req_failed`;
    /// check outcomes are recorded separately under `checks`.
    pub status_expected: bool,
    pub latency: Duration,
    pub error_kind: Option<&'a str>,
}

impl RunMetricIds {
    /// Registers every metric the run writes.
    ///
    /// # Errors
    /// Fails when one of the names is already registered with another kind.
    pub fn register(metrics: &Registry) -> Result<Self> {
        Ok(Self {
            http_reqs: metrics.register(HTTP_REQS, MetricKind::Counter)?,
            http_req_failed: metrics.register(HTTP_REQ_FAILED, MetricKind::Rate)?,
            http_req_duration: metrics.register(HTTP_REQ_DURATION, MetricKind::Trend)?,
            http_req_errors: metrics.register(HTTP_REQ_ERRORS, MetricKind::Counter)?,
            checks: metrics.register(CHECKS, MetricKind::Rate)?,
            api_requests: metrics.register(API_REQUESTS, MetricKind::Counter)?,
            iterations: metrics.register(ITERATIONS, MetricKind::Counter)?,
            iteration_duration: metrics.register(ITERATION_DURATION, MetricKind::Trend)?,
        })
    }

    pub fn record_request(&self, metrics: &Registry, sample: RequestSample<'_>) {
        let tags = metrics.resolve_tags(&[(TAG_GROUP, sample.group), (TAG_ENDPOINT, sample.endpoint)]);

        if let Some(h) = metrics.get_handle(self.http_reqs, tags.clone()) {
            h.add(1);
        }

        let failed = sample.status.is_none() || !sample.status_expected;
        if let Some(h) = metrics.get_handle(self.http_req_failed, tags.clone()) {
            h.observe(failed);
        }

        if sample.status.is_some()
            && let Some(h) = metrics.get_handle(self.http_req_duration, tags)
        {
            h.record(duration_ms(sample.latency));
        }

        if let Some(kind) = sample.error_kind {
            let tags = metrics.resolve_tags(&[(TAG_GROUP, sample.group), (TAG_ERROR_KIND, kind)]);
            if let Some(h) = metrics.get_handle(self.http_req_errors, tags) {
                h.add(1);
            }
        }
    }

    pub fn record_check(&self, metrics: &Registry, group: &str, check: &str, passed: bool) {
        let tags = metrics.resolve_tags(&[(TAG_GROUP, group), (TAG_CHECK, check)]);
        if let Some(h) = metrics.get_handle(self.checks, tags) {
            h.observe(passed);
        }
    }

    pub fn record_api_request(&self, metrics: &Registry, group: &str) {
        let tags = metrics.resolve_tags(&[(TAG_GROUP, group)]);
        if let Some(h) = metrics.get_handle(self.api_requests, tags) {
            h.add(1);
        }
    }

    pub fn record_iteration(&self, metrics: &Registry, elapsed: Duration) {
        let tags = metrics.resolve_tags(&[]);
        if let Some(h) = metrics.get_handle(self.iterations, tags.clone()) {
            h.add(1);
        }
        if let Some(h) = metrics.get_handle(self.iteration_duration, tags) {
            h.record(duration_ms(elapsed));
        }
    }
}

pub(crate) fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetload_metrics::MetricValue;

    fn registry() -> (Registry, RunMetricIds) {
        let reg = Registry::default();
        let ids = RunMetricIds::register(&reg).unwrap_or_else(|e| panic!("register: {e}"));
        (reg, ids)
    }

    fn sample(status: Option<u16>, status_expected: bool) -> RequestSample<'static> {
        RequestSample {
            group: "sheets",
            endpoint: "sheets list",
            status,
            status_expected,
            latency: Duration::from_millis(40),
            error_kind: status.is_none().then_some("request"),
        }
    }

    #[test]
    fn network_failure_counts_as_failed_without_latency() {
        let (reg, ids) = registry();
        ids.record_request(&reg, sample(Some(200), true));
        ids.record_request(&reg, sample(None, false));

        assert_eq!(reg.metric_value(HTTP_REQS), Some(MetricValue::Counter { count: 2 }));
        assert_eq!(
            reg.metric_value(HTTP_REQ_FAILED),
            Some(MetricValue::Rate {
                total: 2,
                hits: 1,
                rate: 0.5
            })
        );

        let latency = reg
            .trend_snapshot(HTTP_REQ_DURATION)
            .unwrap_or_else(|| panic!("trend"));
        assert_eq!(latency.len(), 1);
        assert_eq!(latency.max(), Some(40.0));

        assert_eq!(
            reg.metric_value(HTTP_REQ_ERRORS),
            Some(MetricValue::Counter { count: 1 })
        );
    }

    #[test]
    fn unexpected_status_is_a_failed_request() {
        let (reg, ids) = registry();
        ids.record_request(&reg, sample(Some(500), false));
        match reg.metric_value(HTTP_REQ_FAILED) {
            Some(MetricValue::Rate { rate, .. }) => assert_eq!(rate, 1.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn checks_are_tagged_by_group_and_name() {
        let (reg, ids) = registry();
        ids.record_check(&reg, "sheets", "list is 200", true);
        ids.record_check(&reg, "sheets", "list is 200", false);
        ids.record_check(&reg, "account", "me is 200", true);

        let group = reg.resolve_key(TAG_GROUP);
        let sheets = reg.resolve_key("sheets");
        assert_eq!(reg.query(ids.checks).where_eq(group, sheets).sum_rate_total(), (2, 1));
        assert_eq!(reg.query(ids.checks).sum_rate_total(), (3, 2));
    }

    #[test]
    fn registering_twice_is_a_no_op() {
        let reg = Registry::default();
        let a = RunMetricIds::register(&reg).unwrap_or_else(|e| panic!("{e}"));
        let b = RunMetricIds::register(&reg).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(a.checks, b.checks);
    }

    #[test]
    fn conflicting_kind_fails_registration() {
        let reg = Registry::default();
        reg.register(CHECKS, MetricKind::Counter)
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(RunMetricIds::register(&reg).is_err());
    }
}
