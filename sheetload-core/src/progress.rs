use std::sync::Arc;
use std::time::Duration;

use sheetload_metrics::Registry;

use crate::request_metrics::RunMetricIds;
use crate::schedule::StageSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageProgress {
    /// 1-based.
    pub stage: usize,
    pub stages: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

impl From<StageSnapshot> for StageProgress {
    fn from(st: StageSnapshot) -> Self {
        Self {
            stage: st.index + 1,
            stages: st.count,
            stage_elapsed: st.stage_elapsed,
            stage_remaining: st.stage_remaining,
            start_target: st.start_target,
            end_target: st.end_target,
            current_target: st.current_target,
        }
    }
}

/// Once-per-second view of a running scenario.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// 1-based emission counter.
    pub tick: u64,
    pub elapsed: Duration,
    pub total_duration: Duration,
    pub stage: Option<StageProgress>,
    pub desired_vus: u64,
    pub active_vus: u64,
    pub peak_vus: u64,
    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub iterations_total: u64,
    /// Requests/sec observed during the last progress interval.
    pub rps_now: f64,
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

/// Where progress numbers come from and where they go.
#[derive(Clone)]
pub struct ProgressSink {
    pub callback: ProgressFn,
    pub metrics: Arc<Registry>,
    pub ids: RunMetricIds,
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSink")
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

/// Running totals read from the registry at each emission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Totals {
    pub requests: u64,
    pub failed: u64,
    pub iterations: u64,
}

impl ProgressSink {
    pub(crate) fn totals(&self) -> Totals {
        let (_, failed) = self.metrics.query(self.ids.http_req_failed).sum_rate_total();
        Totals {
            requests: self.metrics.query(self.ids.http_reqs).sum_counter_total(),
            failed,
            iterations: self.metrics.query(self.ids.iterations).sum_counter_total(),
        }
    }
}
