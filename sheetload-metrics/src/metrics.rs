use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Rate,
    Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSeriesSummary {
    pub name: String,
    pub kind: MetricKind,
    pub tags: Vec<(String, String)>,
    pub values: MetricValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricValue {
    Counter {
        count: u64,
    },
    Rate {
        total: u64,
        hits: u64,
        /// `hits / total`, 0 when nothing was observed.
        rate: f64,
    },
    Trend(TrendSummary),
}

impl MetricValue {
    /// The single number a bare metric reference evaluates to.
    ///
    /// Counter total, Rate fraction, Trend average (absent for an empty trend).
    #[must_use]
    pub fn primary(&self) -> Option<f64> {
        match self {
            Self::Counter { count } => Some(*count as f64),
            Self::Rate { rate, .. } => Some(*rate),
            Self::Trend(t) => t.avg,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrendSummary {
    pub count: u64,
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub med: Option<f64>,
    pub max: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

/// Sorted copy of a trend's observations, taken at query time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendSnapshot {
    sorted: Vec<f64>,
}

impl TrendSnapshot {
    pub fn from_unsorted(mut values: Vec<f64>) -> Self {
        values.sort_by(f64::total_cmp);
        Self { sorted: values }
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn min(&self) -> Option<f64> {
        self.sorted.first().copied()
    }

    pub fn max(&self) -> Option<f64> {
        self.sorted.last().copied()
    }

    pub fn avg(&self) -> Option<f64> {
        if self.sorted.is_empty() {
            return None;
        }
        Some(self.sorted.iter().sum::<f64>() / self.sorted.len() as f64)
    }

    /// Nearest-rank percentile: the value at `ceil(p / 100 * n) - 1`, clamped to the buffer.
    ///
    /// `p(0)` is the minimum and `p(100)` the maximum.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        let n = self.sorted.len();
        if n == 0 {
            return None;
        }

        // Multiply before dividing so integral ranks stay exact.
        let p = p.clamp(0.0, 100.0);
        let rank = (p * n as f64 / 100.0).ceil() as usize;
        let idx = rank.saturating_sub(1).min(n - 1);
        self.sorted.get(idx).copied()
    }

    pub fn summary(&self) -> TrendSummary {
        TrendSummary {
            count: self.sorted.len() as u64,
            avg: self.avg(),
            min: self.min(),
            med: self.percentile(50.0),
            max: self.max(),
            p90: self.percentile(90.0),
            p95: self.percentile(95.0),
            p99: self.percentile(99.0),
        }
    }
}

/// Fraction-of-true observations.
///
/// `total` is always bumped before `hits` and read after it, so a concurrent reader never
/// sees more hits than observations.
#[derive(Debug, Default)]
pub struct Rate {
    total: AtomicU64,
    hits: AtomicU64,
}

impl Rate {
    pub fn observe(&self, hit: bool) {
        self.total.fetch_add(1, Ordering::AcqRel);
        if hit {
            self.hits.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Returns `(total, hits)`.
    pub fn load(&self) -> (u64, u64) {
        let hits = self.hits.load(Ordering::Acquire);
        let total = self.total.load(Ordering::Acquire);
        (total, hits.min(total))
    }
}

pub(crate) fn rate_value(total: u64, hits: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (hits as f64 / total as f64).clamp(0.0, 1.0)
}

/// Append-only observation buffer for one trend series.
#[derive(Debug, Default)]
pub struct Trend {
    values: Mutex<Vec<f64>>,
}

impl Trend {
    pub fn record(&self, value: f64) {
        if value.is_finite() {
            self.values.lock().push(value);
        }
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn extend_into(&self, out: &mut Vec<f64>) {
        out.extend_from_slice(&self.values.lock());
    }

    pub fn snapshot(&self) -> TrendSnapshot {
        TrendSnapshot::from_unsorted(self.values.lock().clone())
    }
}

#[derive(Debug)]
pub(crate) enum MetricStorage {
    Counter(Arc<AtomicU64>),
    Rate(Arc<Rate>),
    Trend(Arc<Trend>),
}

impl MetricStorage {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter(Arc::new(AtomicU64::new(0))),
            MetricKind::Rate => Self::Rate(Arc::new(Rate::default())),
            MetricKind::Trend => Self::Trend(Arc::new(Trend::default())),
        }
    }

    pub(crate) fn handle(&self) -> MetricHandle {
        match self {
            Self::Counter(c) => MetricHandle::Counter(c.clone()),
            Self::Rate(r) => MetricHandle::Rate(r.clone()),
            Self::Trend(t) => MetricHandle::Trend(t.clone()),
        }
    }

    pub(crate) fn value(&self) -> MetricValue {
        match self {
            Self::Counter(c) => MetricValue::Counter {
                count: c.load(Ordering::Acquire),
            },
            Self::Rate(r) => {
                let (total, hits) = r.load();
                MetricValue::Rate {
                    total,
                    hits,
                    rate: rate_value(total, hits),
                }
            }
            Self::Trend(t) => MetricValue::Trend(t.snapshot().summary()),
        }
    }
}

/// Write handle for one series. Cheap to clone; writes through shared atomics/buffers.
#[derive(Debug, Clone)]
pub enum MetricHandle {
    Counter(Arc<AtomicU64>),
    Rate(Arc<Rate>),
    Trend(Arc<Trend>),
}

impl MetricHandle {
    #[inline]
    pub fn add(&self, value: u64) {
        if let Self::Counter(c) = self {
            c.fetch_add(value, Ordering::AcqRel);
        }
    }

    #[inline]
    pub fn observe(&self, hit: bool) {
        if let Self::Rate(r) = self {
            r.observe(hit);
        }
    }

    #[inline]
    pub fn record(&self, value: f64) {
        if let Self::Trend(t) = self {
            t.record(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_uses_nearest_rank() {
        let snap = TrendSnapshot::from_unsorted((1..=10).rev().map(f64::from).collect());
        assert_eq!(snap.percentile(0.0), Some(1.0));
        assert_eq!(snap.percentile(10.0), Some(1.0));
        assert_eq!(snap.percentile(11.0), Some(2.0));
        assert_eq!(snap.percentile(50.0), Some(5.0));
        assert_eq!(snap.percentile(95.0), Some(10.0));
        assert_eq!(snap.percentile(100.0), Some(10.0));
    }

    #[test]
    fn integral_percentiles_hit_their_exact_rank() {
        let snap = TrendSnapshot::from_unsorted((1..=100).map(f64::from).collect());
        for p in [7.0, 14.0, 28.0, 55.0, 56.0, 95.0, 99.0] {
            assert_eq!(snap.percentile(p), Some(p), "p({p})");
        }
        assert_eq!(snap.percentile(7.5), Some(8.0));
    }

    #[test]
    fn percentile_extremes_match_min_and_max() {
        let snap = TrendSnapshot::from_unsorted(vec![42.5, 3.0, 17.25, 99.0, 0.5]);
        assert_eq!(snap.percentile(0.0), snap.min());
        assert_eq!(snap.percentile(100.0), snap.max());
        assert_eq!(snap.min(), Some(0.5));
        assert_eq!(snap.max(), Some(99.0));
    }

    #[test]
    fn empty_trend_has_no_stats() {
        let s = TrendSnapshot::default().summary();
        assert_eq!(s.count, 0);
        assert!(s.avg.is_none());
        assert!(s.min.is_none());
        assert!(s.p95.is_none());
    }

    #[test]
    fn trend_ignores_non_finite_values() {
        let t = Trend::default();
        t.record(1.0);
        t.record(f64::NAN);
        t.record(f64::INFINITY);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn rate_is_zero_without_observations_and_bounded_otherwise() {
        let r = Rate::default();
        assert_eq!(r.load(), (0, 0));
        assert_eq!(rate_value(0, 0), 0.0);

        for hit in [true, false, true, true] {
            r.observe(hit);
        }
        let (total, hits) = r.load();
        assert_eq!((total, hits), (4, 3));
        assert_eq!(rate_value(total, hits), 0.75);
    }

    #[test]
    fn handle_ignores_writes_of_the_wrong_kind() {
        let storage = MetricStorage::new(MetricKind::Counter);
        let c = storage.handle();
        c.add(2);
        c.observe(true);
        c.record(5.0);
        c.add(3);
        assert_eq!(storage.value(), MetricValue::Counter { count: 5 });
    }

    #[test]
    fn primary_value_per_kind() {
        assert_eq!(MetricValue::Counter { count: 7 }.primary(), Some(7.0));
        let rate = MetricValue::Rate {
            total: 4,
            hits: 1,
            rate: 0.25,
        };
        assert_eq!(rate.primary(), Some(0.25));
        assert_eq!(
            MetricValue::Trend(TrendSummary::default()).primary(),
            None
        );
    }
}
