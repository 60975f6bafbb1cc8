//! Ramp controller: turns a [`RampingSchedule`] into live VU tasks.
//!
//! Every tick compares the desired concurrency with the live count (Idle + Running VUs).
//! Growth creates Idle VUs that start on the following tick. Shrinking cancels Idle VUs
//! first and then drains Running ones, newest first. A draining VU finishes its current
//! iteration before it stops, so in-flight requests are never aborted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::progress::{ProgressSink, ProgressUpdate, Totals};
use crate::schedule::RampingSchedule;
use crate::vu::{ActiveVus, Interrupt, VuContext, VuSignal, VuState};

pub const DEFAULT_TICK: Duration = Duration::from_millis(100);
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick: Duration,
    pub progress_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub elapsed: Duration,
    pub peak_vus: u64,
    pub vus_spawned: u64,
    /// Iterations reported by joined VU tasks.
    pub iterations_total: u64,
    pub interrupted: bool,
}

struct VuSlot {
    id: u64,
    created_tick: u64,
    signal: Arc<VuSignal>,
    handle: JoinHandle<u64>,
}

impl VuSlot {
    fn is_live(&self) -> bool {
        matches!(self.signal.state(), VuState::Idle | VuState::Running)
    }
}

struct ProgressState {
    sink: ProgressSink,
    tick: u64,
    last_at: Instant,
    last_requests: u64,
}

impl ProgressState {
    fn new(sink: ProgressSink, now: Instant) -> Self {
        let last_requests = sink.totals().requests;
        Self {
            sink,
            tick: 0,
            last_at: now,
            last_requests,
        }
    }

    fn due(&self, now: Instant, interval: Duration) -> bool {
        now.duration_since(self.last_at) >= interval
    }

    fn emit(
        &mut self,
        now: Instant,
        elapsed: Duration,
        schedule: &RampingSchedule,
        desired: u64,
        active: &ActiveVus,
    ) {
        let Totals {
            requests,
            failed,
            iterations,
        } = self.sink.totals();
        let dt = now.duration_since(self.last_at);
        let rps_now = sheetload_metrics::per_sec(
            requests.saturating_sub(self.last_requests),
            dt.as_secs_f64(),
        );
        self.last_at = now;
        self.last_requests = requests;
        self.tick = self.tick.saturating_add(1);

        (self.sink.callback)(ProgressUpdate {
            tick: self.tick,
            elapsed,
            total_duration: schedule.total_duration(),
            stage: schedule.stage_snapshot_at(elapsed).map(Into::into),
            desired_vus: desired,
            active_vus: active.active(),
            peak_vus: active.peak(),
            requests_total: requests,
            failed_requests_total: failed,
            iterations_total: iterations,
            rps_now,
        });
    }
}

/// Drives VU tasks along `schedule` until every stage is consumed (or `interrupt` fires)
/// and every VU has stopped. All VU tasks are joined before returning.
///
/// `spawn_vu` builds the body of one VU; it is expected to call [`VuContext::run_loop`].
pub async fn run_schedule<F, Fut>(
    schedule: &RampingSchedule,
    config: &SchedulerConfig,
    interrupt: Arc<Interrupt>,
    progress: Option<ProgressSink>,
    spawn_vu: F,
) -> SchedulerReport
where
    F: Fn(VuContext) -> Fut,
    Fut: Future<Output = u64> + Send + 'static,
{
    let active = Arc::new(ActiveVus::default());
    let started = Instant::now();
    let mut progress = progress.map(|sink| ProgressState::new(sink, started));

    let mut interval = tokio::time::interval(config.tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut vus: Vec<VuSlot> = Vec::new();
    let mut tick: u64 = 0;
    let mut next_id: u64 = 1;
    let mut iterations_total: u64 = 0;
    let mut interrupted = false;

    loop {
        if interrupted {
            interval.tick().await;
        } else {
            tokio::select! {
                _ = interval.tick() => {}
                () = interrupt.wait() => {}
            }
        }
        tick = tick.saturating_add(1);

        let now = Instant::now();
        let elapsed = now.duration_since(started);
        if !interrupted && interrupt.is_triggered() {
            interrupted = true;
            debug!(?elapsed, "scheduler interrupted, stopping all VUs");
        }

        let desired = if interrupted {
            0
        } else {
            schedule.desired_at(elapsed)
        };

        reconcile(&mut vus, desired, tick, &mut next_id, &interrupt, &active, &spawn_vu);

        for vu in vus.iter().filter(|vu| vu.created_tick < tick) {
            if vu.signal.start() {
                debug!(vu_id = vu.id, "vu started");
            }
        }

        iterations_total = iterations_total.saturating_add(reap(&mut vus).await);

        if let Some(p) = progress.as_mut()
            && p.due(now, config.progress_interval)
        {
            p.emit(now, elapsed, schedule, desired, &active);
        }

        if (interrupted || schedule.is_done(elapsed)) && vus.is_empty() {
            break;
        }
    }

    SchedulerReport {
        elapsed: started.elapsed(),
        peak_vus: active.peak(),
        vus_spawned: next_id.saturating_sub(1),
        iterations_total,
        interrupted,
    }
}

fn reconcile<F, Fut>(
    vus: &mut Vec<VuSlot>,
    desired: u64,
    tick: u64,
    next_id: &mut u64,
    interrupt: &Arc<Interrupt>,
    active: &Arc<ActiveVus>,
    spawn_vu: &F,
) where
    F: Fn(VuContext) -> Fut,
    Fut: Future<Output = u64> + Send + 'static,
{
    let live = vus.iter().filter(|vu| vu.is_live()).count() as u64;

    if desired > live {
        let add = desired - live;
        debug!(tick, live, desired, add, "scaling up");
        for _ in 0..add {
            let id = *next_id;
            *next_id = next_id.saturating_add(1);

            let signal = Arc::new(VuSignal::default());
            let ctx = VuContext {
                vu_id: id,
                signal: signal.clone(),
                interrupt: interrupt.clone(),
                active: active.clone(),
            };
            vus.push(VuSlot {
                id,
                created_tick: tick,
                signal,
                handle: tokio::spawn(spawn_vu(ctx)),
            });
        }
    } else if desired < live {
        let mut excess = live - desired;
        debug!(tick, live, desired, excess, "scaling down");

        for vu in vus.iter().rev() {
            if excess == 0 {
                break;
            }
            if vu.signal.cancel() {
                excess -= 1;
            }
        }
        for vu in vus.iter().rev() {
            if excess == 0 {
                break;
            }
            if vu.signal.drain() {
                debug!(vu_id = vu.id, "vu draining");
                excess -= 1;
            }
        }
    }
}

/// Joins every finished VU task; returns the iterations they reported.
async fn reap(vus: &mut Vec<VuSlot>) -> u64 {
    let mut iterations = 0u64;
    let mut i = 0;
    while i < vus.len() {
        if !vus[i].handle.is_finished() {
            i += 1;
            continue;
        }

        let slot = vus.remove(i);
        match slot.handle.await {
            Ok(n) => iterations = iterations.saturating_add(n),
            Err(err) => warn!(vu_id = slot.id, error = %err, "vu task failed"),
        }
    }
    iterations
}
