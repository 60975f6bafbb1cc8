use std::collections::HashMap;
use std::sync::atomic::Ordering;

use smallvec::SmallVec;

use crate::key::KeyId;
use crate::metrics::{MetricStorage, TrendSnapshot};
use crate::registry::{MetricId, Registry};
use crate::tags::TagSet;

/// Per-second rate of a delta; `dt_secs` is clamped away from zero.
#[inline]
pub fn per_sec(delta: u64, dt_secs: f64) -> f64 {
    delta as f64 / dt_secs.max(1e-9)
}

/// Filtered, optionally grouped fold over the series of one metric.
#[derive(Debug, Clone)]
pub struct Query<'a> {
    registry: &'a Registry,
    metric: MetricId,
    /// `(key, value)` pairs a series must carry.
    filters: SmallVec<[(KeyId, KeyId); 4]>,
    group_keys: SmallVec<[KeyId; 4]>,
}

impl<'a> Query<'a> {
    pub(crate) fn new(registry: &'a Registry, metric: MetricId) -> Self {
        Self {
            registry,
            metric,
            filters: SmallVec::new(),
            group_keys: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn where_eq(mut self, key: KeyId, value: KeyId) -> Self {
        self.filters.push((key, value));
        self
    }

    #[must_use]
    pub fn group_by(mut self, keys: impl IntoIterator<Item = KeyId>) -> Self {
        self.group_keys = keys.into_iter().collect();
        self.group_keys.sort_unstable();
        self.group_keys.dedup();
        self
    }

    fn matches(&self, tags: &TagSet) -> bool {
        self.filters.iter().all(|&(k, v)| tags.get(k) == Some(v))
    }

    fn group_key(&self, tags: &TagSet) -> TagSet {
        tags.project(&self.group_keys)
    }

    pub fn sum_counter(self) -> HashMap<TagSet, u64> {
        let mut out: HashMap<TagSet, u64> = HashMap::new();

        self.registry.visit_series(self.metric, |tags, storage| {
            if !self.matches(tags) {
                return;
            }
            let MetricStorage::Counter(c) = storage else {
                return;
            };

            let v = c.load(Ordering::Acquire);
            let k = self.group_key(tags);
            out.entry(k)
                .and_modify(|cur| *cur = cur.saturating_add(v))
                .or_insert(v);
        });

        out
    }

    pub fn sum_counter_total(self) -> u64 {
        self.sum_counter().values().copied().sum()
    }

    /// Returns `(total, hits)` per group.
    pub fn sum_rate(self) -> HashMap<TagSet, (u64, u64)> {
        let mut out: HashMap<TagSet, (u64, u64)> = HashMap::new();

        self.registry.visit_series(self.metric, |tags, storage| {
            if !self.matches(tags) {
                return;
            }
            let MetricStorage::Rate(r) = storage else {
                return;
            };

            let (total, hits) = r.load();
            let entry = out.entry(self.group_key(tags)).or_default();
            entry.0 = entry.0.saturating_add(total);
            entry.1 = entry.1.saturating_add(hits);
        });

        out
    }

    pub fn sum_rate_total(self) -> (u64, u64) {
        self.sum_rate()
            .values()
            .fold((0, 0), |acc, (t, h)| (acc.0 + t, acc.1 + h))
    }

    /// All matching observations merged into one snapshot, ignoring `group_by`.
    pub fn merge_trend(self) -> TrendSnapshot {
        let mut values = Vec::new();
        self.registry.visit_series(self.metric, |tags, storage| {
            if !self.matches(tags) {
                return;
            }
            if let MetricStorage::Trend(t) = storage {
                t.extend_into(&mut values);
            }
        });
        TrendSnapshot::from_unsorted(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricKind;

    #[test]
    fn per_sec_clamps_zero_interval() {
        assert!((per_sec(3, 1.5) - 2.0).abs() < 1e-9);
        assert!(per_sec(1, 0.0).is_finite());
    }

    #[test]
    fn query_sum_counter_groups_and_filters() {
        let reg = Registry::default();
        let metric = reg
            .register("api_requests", MetricKind::Counter)
            .unwrap_or_else(|e| panic!("register: {e}"));

        let group_k = reg.resolve_key("group");
        let endpoint_k = reg.resolve_key("endpoint");
        let sheets = reg.resolve_key("sheets");
        let list = reg.resolve_key("list");
        let search = reg.resolve_key("search");

        let tags_list = TagSet::from_pairs([(group_k, sheets), (endpoint_k, list)]);
        let tags_search = TagSet::from_pairs([(group_k, sheets), (endpoint_k, search)]);

        if let Some(h) = reg.get_handle(metric, tags_list) {
            h.add(10);
        }
        if let Some(h) = reg.get_handle(metric, tags_search) {
            h.add(3);
        }

        let grouped = reg
            .query(metric)
            .where_eq(group_k, sheets)
            .group_by([endpoint_k])
            .sum_counter();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped.values().copied().sum::<u64>(), 13);

        let only_list = reg
            .query(metric)
            .where_eq(endpoint_k, list)
            .sum_counter_total();
        assert_eq!(only_list, 10);
    }

    #[test]
    fn query_rate_groups_by_check() {
        let reg = Registry::default();
        let checks = reg
            .register("checks", MetricKind::Rate)
            .unwrap_or_else(|e| panic!("register: {e}"));

        let ok = reg.resolve_tags(&[("group", "health"), ("check", "status is 200")]);
        let arr = reg.resolve_tags(&[("group", "sheets"), ("check", "is array")]);
        if let Some(h) = reg.get_handle(checks, ok) {
            h.observe(true);
            h.observe(true);
        }
        if let Some(h) = reg.get_handle(checks, arr) {
            h.observe(false);
        }

        let group_k = reg.resolve_key("group");
        let by_group = reg.query(checks).group_by([group_k]).sum_rate();
        let health = reg.resolve_tags(&[("group", "health")]);
        let sheets = reg.resolve_tags(&[("group", "sheets")]);
        assert_eq!(by_group.get(&health), Some(&(2, 2)));
        assert_eq!(by_group.get(&sheets), Some(&(1, 0)));
        assert_eq!(reg.query(checks).sum_rate_total(), (3, 2));
    }

    #[test]
    fn merge_trend_respects_tag_filter() {
        let reg = Registry::default();
        let metric = reg
            .register("http_req_duration", MetricKind::Trend)
            .unwrap_or_else(|e| panic!("register: {e}"));

        let group_k = reg.resolve_key("group");

        let list = reg.resolve_tags(&[("group", "sheets"), ("endpoint", "list")]);
        let create = reg.resolve_tags(&[("group", "sheets"), ("endpoint", "create")]);
        let me = reg.resolve_tags(&[("group", "account"), ("endpoint", "me")]);

        for (tags, v) in [(list, 10.0), (create, 20.0), (me, 999.0)] {
            if let Some(h) = reg.get_handle(metric, tags) {
                h.record(v);
            }
        }

        let sheets = reg.resolve_key("sheets");
        let snap = reg.query(metric).where_eq(group_k, sheets).merge_trend();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.max(), Some(20.0));

        let all = reg.query(metric).group_by([group_k]).merge_trend();
        assert_eq!(all.len(), 3);
    }
}
