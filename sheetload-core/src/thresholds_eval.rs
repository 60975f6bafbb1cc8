use serde::Serialize;
use sheetload_metrics::{MetricKind, Registry, TrendSnapshot};

use crate::thresholds::{MetricRef, Threshold, ThresholdSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    /// `None` when the metric was never registered, is empty, or the reference does not
    /// apply to its kind. Such a threshold fails.
    pub observed: Option<f64>,
    pub passed: bool,
}

/// Evaluates every threshold against the final registry state, in declaration order.
pub fn evaluate_thresholds(metrics: &Registry, sets: &[ThresholdSet]) -> Vec<ThresholdResult> {
    let mut out = Vec::with_capacity(sets.iter().map(|s| s.thresholds.len()).sum());

    for set in sets {
        let source = MetricSource::load(metrics, &set.metric);
        for threshold in &set.thresholds {
            let observed = source.observe(threshold);
            out.push(ThresholdResult {
                metric: set.metric.clone(),
                expression: threshold.source.clone(),
                observed,
                passed: observed.is_some_and(|v| threshold.op.compare(v, threshold.value)),
            });
        }
    }

    out
}

pub fn all_passed(results: &[ThresholdResult]) -> bool {
    results.iter().all(|r| r.passed)
}

/// Folded view of one metric, loaded once per threshold set.
enum MetricSource {
    Missing,
    Counter(u64),
    Rate { total: u64, hits: u64 },
    Trend(TrendSnapshot),
}

impl MetricSource {
    fn load(metrics: &Registry, name: &str) -> Self {
        let Some((id, kind)) = metrics.lookup_metric(name) else {
            return Self::Missing;
        };
        match kind {
            MetricKind::Counter => Self::Counter(metrics.query(id).sum_counter_total()),
            MetricKind::Rate => {
                let (total, hits) = metrics.query(id).sum_rate_total();
                Self::Rate { total, hits }
            }
            MetricKind::Trend => Self::Trend(metrics.query(id).merge_trend()),
        }
    }

    fn observe(&self, threshold: &Threshold) -> Option<f64> {
        match (self, threshold.metric_ref) {
            (Self::Missing, _) => None,

            (Self::Counter(count), MetricRef::Count | MetricRef::Value) => Some(*count as f64),
            (Self::Counter(_), _) => None,

            (Self::Rate { total, hits }, MetricRef::Rate | MetricRef::Value) => {
                Some(if *total == 0 {
                    0.0
                } else {
                    *hits as f64 / *total as f64
                })
            }
            (Self::Rate { total, .. }, MetricRef::Count) => Some(*total as f64),
            (Self::Rate { .. }, _) => None,

            (Self::Trend(snap), _) if snap.is_empty() => None,
            (Self::Trend(snap), MetricRef::Percentile(p)) => snap.percentile(p),
            (Self::Trend(snap), MetricRef::Avg) => snap.avg(),
            (Self::Trend(snap), MetricRef::Min) => snap.min(),
            (Self::Trend(snap), MetricRef::Med) => snap.percentile(50.0),
            (Self::Trend(snap), MetricRef::Max) => snap.max(),
            (Self::Trend(snap), MetricRef::Count) => Some(snap.len() as f64),
            (Self::Trend(_), MetricRef::Rate | MetricRef::Value) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sets(pairs: &[(&str, &[&str])]) -> Vec<ThresholdSet> {
        pairs
            .iter()
            .map(|(metric, exprs)| ThresholdSet::parse(metric, exprs).unwrap_or_else(|e| panic!("{e}")))
            .collect()
    }

    fn registry() -> Registry {
        let reg = Registry::default();
        let failed = reg
            .register("http_req_failed", MetricKind::Rate)
            .unwrap_or_else(|e| panic!("{e}"));
        let duration = reg
            .register("http_req_duration", MetricKind::Trend)
            .unwrap_or_else(|e| panic!("{e}"));
        let reqs = reg
            .register("http_reqs", MetricKind::Counter)
            .unwrap_or_else(|e| panic!("{e}"));

        let tags = reg.resolve_tags(&[("group", "sheets")]);
        let failed = reg.get_handle(failed, tags.clone()).unwrap_or_else(|| panic!("handle"));
        for i in 0..20 {
            failed.observe(i < 2);
        }
        let duration = reg.get_handle(duration, tags.clone()).unwrap_or_else(|| panic!("handle"));
        for ms in 1..=100 {
            duration.record(f64::from(ms));
        }
        reg.get_handle(reqs, tags)
            .unwrap_or_else(|| panic!("handle"))
            .add(20);
        reg
    }

    #[test]
    fn rate_exactly_at_the_limit_fails_strict_less_than() {
        let results = evaluate_thresholds(
            &registry(),
            &sets(&[("http_req_failed", &["rate<0.1", "rate<=0.1", "http_req_failed<0.2"])]),
        );
        let passed: Vec<bool> = results.iter().map(|r| r.passed).collect();
        assert_eq!(passed, vec![false, true, true]);
        assert_eq!(results[0].observed, Some(0.1));
        assert!(!all_passed(&results));
    }

    #[test]
    fn percentiles_and_trend_stats() {
        let results = evaluate_thresholds(
            &registry(),
            &sets(&[(
                "http_req_duration",
                &["p(95)<96", "p(99)<=99", "avg<50", "min>=1", "max<100", "med<=50"],
            )]),
        );
        let observed: Vec<Option<f64>> = results.iter().map(|r| r.observed).collect();
        assert_eq!(
            observed,
            vec![Some(95.0), Some(99.0), Some(50.5), Some(1.0), Some(100.0), Some(50.0)]
        );
        let passed: Vec<bool> = results.iter().map(|r| r.passed).collect();
        assert_eq!(passed, vec![true, true, false, true, false, true]);
    }

    #[test]
    fn counters_expose_count_and_value() {
        let results = evaluate_thresholds(
            &registry(),
            &sets(&[("http_reqs", &["count>=20", "value>20", "http_reqs<21", "p(95)<1"])]),
        );
        let passed: Vec<bool> = results.iter().map(|r| r.passed).collect();
        assert_eq!(passed, vec![true, false, true, false]);
        assert_eq!(results[3].observed, None);
    }

    #[test]
    fn missing_or_empty_metrics_fail() {
        let reg = registry();
        reg.register("iteration_duration", MetricKind::Trend)
            .unwrap_or_else(|e| panic!("{e}"));

        let results = evaluate_thresholds(
            &reg,
            &sets(&[
                ("checks", &["rate>0.9"]),
                ("iteration_duration", &["p(95)<1000"]),
            ]),
        );
        assert!(results.iter().all(|r| !r.passed && r.observed.is_none()));
    }

    #[test]
    fn no_thresholds_pass_trivially() {
        let results = evaluate_thresholds(&registry(), &[]);
        assert!(results.is_empty());
        assert!(all_passed(&results));
    }
}
