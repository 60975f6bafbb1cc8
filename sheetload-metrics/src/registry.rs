use dashmap::DashMap;
use parking_lot::RwLock;

use crate::agg::Query;
use crate::error::{Error, Result};
use crate::key::{Interner, KeyId};
use crate::metrics::{
    MetricHandle, MetricKind, MetricSeriesSummary, MetricStorage, MetricValue, TrendSnapshot,
    rate_value,
};
use crate::tags::TagSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(u32);

#[derive(Debug)]
pub struct MetricDef {
    pub name: KeyId,
    pub kind: MetricKind,
}

#[derive(Debug, Default)]
pub struct Registry {
    interner: Interner,
    defs: RwLock<Vec<MetricDef>>,
    storage: DashMap<MetricId, DashMap<TagSet, MetricStorage>>,
}

impl Registry {
    /// Registers `name` as `kind`, returning the existing id when it is already registered
    /// with the same kind.
    ///
    /// # Errors
    /// Returns [`Error::KindMismatch`] when `name` exists with a different kind.
    pub fn register(&self, name: &str, kind: MetricKind) -> Result<MetricId> {
        let name_id = self.interner.get_or_intern(name);

        let mut defs = self.defs.write();
        if let Some((idx, def)) = defs.iter().enumerate().find(|(_, d)| d.name == name_id) {
            if def.kind != kind {
                return Err(Error::KindMismatch {
                    name: name.to_string(),
                    existing: def.kind,
                    requested: kind,
                });
            }
            return Ok(MetricId(idx as u32));
        }

        let id = MetricId(defs.len() as u32);
        defs.push(MetricDef {
            name: name_id,
            kind,
        });
        self.storage.insert(id, DashMap::new());
        Ok(id)
    }

    pub fn lookup_metric(&self, name: &str) -> Option<(MetricId, MetricKind)> {
        let name_id = self.interner.get(name)?;
        let defs = self.defs.read();
        defs.iter()
            .enumerate()
            .find(|(_, d)| d.name == name_id)
            .map(|(idx, d)| (MetricId(idx as u32), d.kind))
    }

    pub fn kind(&self, metric: MetricId) -> Option<MetricKind> {
        self.defs.read().get(metric.0 as usize).map(|d| d.kind)
    }

    pub fn resolve_key(&self, key: &str) -> KeyId {
        self.interner.get_or_intern(key)
    }

    pub fn resolve_str(&self, key: KeyId) -> String {
        self.interner
            .resolve(key)
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    pub fn resolve_tags(&self, tags: &[(&str, &str)]) -> TagSet {
        TagSet::from_pairs(
            tags.iter()
                .map(|(k, v)| (self.resolve_key(k), self.resolve_key(v))),
        )
    }

    pub fn get_handle(&self, metric: MetricId, tags: TagSet) -> Option<MetricHandle> {
        // Read the kind before taking the storage shard: `register` locks them in the other order.
        let kind = self.kind(metric)?;
        let series_map = self.storage.get(&metric)?;

        if let Some(storage) = series_map.get(&tags) {
            return Some(storage.handle());
        }

        // `entry` keeps a concurrent creator of the same series from replacing ours.
        let handle = series_map
            .entry(tags)
            .or_insert_with(|| MetricStorage::new(kind))
            .handle();
        Some(handle)
    }

    pub fn query(&self, metric: MetricId) -> Query<'_> {
        Query::new(self, metric)
    }

    pub(crate) fn visit_series(&self, metric: MetricId, mut f: impl FnMut(&TagSet, &MetricStorage)) {
        let Some(series_map) = self.storage.get(&metric) else {
            return;
        };
        for series in series_map.iter() {
            f(series.key(), series.value());
        }
    }

    /// Folds every series of `metric` into one value, ignoring tags.
    ///
    /// Returns `None` for an unknown metric. A registered metric with no series folds to the
    /// kind's empty value.
    pub fn metric_value(&self, name: &str) -> Option<MetricValue> {
        let (metric, kind) = self.lookup_metric(name)?;
        Some(match kind {
            MetricKind::Counter => MetricValue::Counter {
                count: self.query(metric).sum_counter_total(),
            },
            MetricKind::Rate => {
                let (total, hits) = self.query(metric).sum_rate_total();
                MetricValue::Rate {
                    total,
                    hits,
                    rate: rate_value(total, hits),
                }
            }
            MetricKind::Trend => MetricValue::Trend(self.query(metric).merge_trend().summary()),
        })
    }

    /// Sorted snapshot of every observation of a trend, across all series.
    pub fn trend_snapshot(&self, name: &str) -> Option<TrendSnapshot> {
        let (metric, kind) = self.lookup_metric(name)?;
        (kind == MetricKind::Trend).then(|| self.query(metric).merge_trend())
    }

    pub fn summarize(&self) -> Vec<MetricSeriesSummary> {
        let mut out = Vec::new();
        let defs = self.defs.read();

        for entry in self.storage.iter() {
            let Some(def) = defs.get(entry.key().0 as usize) else {
                continue;
            };
            let name = self.resolve_str(def.name);

            for series in entry.value().iter() {
                let tags = series
                    .key()
                    .iter()
                    .map(|(k, v)| (self.resolve_str(k), self.resolve_str(v)))
                    .collect();

                out.push(MetricSeriesSummary {
                    name: name.clone(),
                    kind: def.kind,
                    tags,
                    values: series.value().value(),
                });
            }
        }

        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tags.cmp(&b.tags)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn register_is_idempotent_for_the_same_kind() {
        let reg = Registry::default();
        let a = reg
            .register("http_reqs", MetricKind::Counter)
            .unwrap_or_else(|e| panic!("register: {e}"));
        let b = reg
            .register("http_reqs", MetricKind::Counter)
            .unwrap_or_else(|e| panic!("register: {e}"));
        assert_eq!(a, b);
        assert_eq!(reg.lookup_metric("http_reqs"), Some((a, MetricKind::Counter)));
    }

    #[test]
    fn register_rejects_kind_mismatch() {
        let reg = Registry::default();
        reg.register("checks", MetricKind::Rate)
            .unwrap_or_else(|e| panic!("register: {e}"));

        match reg.register("checks", MetricKind::Trend) {
            Err(Error::KindMismatch {
                existing, requested, ..
            }) => {
                assert_eq!(existing, MetricKind::Rate);
                assert_eq!(requested, MetricKind::Trend);
            }
            other => panic!("expected kind mismatch, got {other:?}"),
        }
    }

    #[test]
    fn metric_value_folds_all_series() {
        let reg = Registry::default();
        let checks = reg
            .register("checks", MetricKind::Rate)
            .unwrap_or_else(|e| panic!("register: {e}"));

        let a = reg.resolve_tags(&[("group", "health"), ("check", "status is 200")]);
        let b = reg.resolve_tags(&[("group", "sheets"), ("check", "is array")]);

        let ha = reg
            .get_handle(checks, a)
            .unwrap_or_else(|| panic!("handle"));
        let hb = reg
            .get_handle(checks, b)
            .unwrap_or_else(|| panic!("handle"));
        ha.observe(true);
        ha.observe(true);
        hb.observe(false);
        hb.observe(true);

        match reg.metric_value("checks") {
            Some(MetricValue::Rate { total, hits, rate }) => {
                assert_eq!((total, hits), (4, 3));
                assert!((rate - 0.75).abs() < 1e-12);
            }
            other => panic!("unexpected value: {other:?}"),
        }
        assert!(reg.metric_value("missing").is_none());
    }

    #[test]
    fn registered_but_unused_trend_is_empty() {
        let reg = Registry::default();
        reg.register("http_req_duration", MetricKind::Trend)
            .unwrap_or_else(|e| panic!("register: {e}"));

        let snap = reg
            .trend_snapshot("http_req_duration")
            .unwrap_or_else(|| panic!("snapshot"));
        assert!(snap.is_empty());
        assert!(reg.trend_snapshot("unknown").is_none());
    }

    #[test]
    fn summarize_resolves_names_and_tags() {
        let reg = Registry::default();
        let reqs = reg
            .register("http_reqs", MetricKind::Counter)
            .unwrap_or_else(|e| panic!("register: {e}"));
        let tags = reg.resolve_tags(&[("group", "health")]);
        if let Some(h) = reg.get_handle(reqs, tags) {
            h.add(3);
        }

        let out = reg.summarize();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "http_reqs");
        assert_eq!(out[0].tags, vec![("group".to_string(), "health".to_string())]);
        assert_eq!(out[0].values, MetricValue::Counter { count: 3 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_are_all_counted() {
        let reg = Arc::new(Registry::default());
        let reqs = reg
            .register("http_reqs", MetricKind::Counter)
            .unwrap_or_else(|e| panic!("register: {e}"));
        let failed = reg
            .register("http_req_failed", MetricKind::Rate)
            .unwrap_or_else(|e| panic!("register: {e}"));
        let duration = reg
            .register("http_req_duration", MetricKind::Trend)
            .unwrap_or_else(|e| panic!("register: {e}"));

        let mut tasks = Vec::new();
        for worker in 0..8u32 {
            let reg = reg.clone();
            tasks.push(tokio::spawn(async move {
                let tags = reg.resolve_tags(&[("group", if worker % 2 == 0 { "a" } else { "b" })]);
                let (Some(c), Some(r), Some(t)) = (
                    reg.get_handle(reqs, tags.clone()),
                    reg.get_handle(failed, tags.clone()),
                    reg.get_handle(duration, tags),
                ) else {
                    panic!("handles");
                };
                for i in 0..1000u32 {
                    c.add(1);
                    r.observe(i % 4 == 0);
                    t.record(f64::from(i));
                    if i % 100 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }
        for task in tasks {
            task.await.unwrap_or_else(|e| panic!("join: {e}"));
        }

        assert_eq!(
            reg.metric_value("http_reqs"),
            Some(MetricValue::Counter { count: 8000 })
        );
        match reg.metric_value("http_req_failed") {
            Some(MetricValue::Rate { total, hits, rate }) => {
                assert_eq!((total, hits), (8000, 2000));
                assert!((0.0..=1.0).contains(&rate));
            }
            other => panic!("unexpected value: {other:?}"),
        }
        let snap = reg
            .trend_snapshot("http_req_duration")
            .unwrap_or_else(|| panic!("snapshot"));
        assert_eq!(snap.len(), 8000);
        assert_eq!(snap.percentile(100.0), Some(999.0));
        assert_eq!(snap.percentile(0.0), Some(0.0));
    }
}
