use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::FromRepr,
)]
#[repr(u8)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VuState {
    Idle = 0,
    Running = 1,
    Draining = 2,
    Stopped = 3,
}

/// Scheduler-to-VU control channel.
///
/// The scheduler moves a VU `Idle -> Running`, `Idle -> Stopped` or `Running -> Draining`;
/// the VU itself moves to `Stopped` when its loop exits.
#[derive(Debug)]
pub struct VuSignal {
    state: AtomicU8,
    notify: Notify,
}

impl Default for VuSignal {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(VuState::Idle as u8),
            notify: Notify::new(),
        }
    }
}

impl VuSignal {
    pub fn state(&self) -> VuState {
        VuState::from_repr(self.state.load(Ordering::Acquire)).unwrap_or(VuState::Stopped)
    }

    fn transition(&self, from: VuState, to: VuState) -> bool {
        let moved = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            self.notify.notify_waiters();
        }
        moved
    }

    pub fn start(&self) -> bool {
        self.transition(VuState::Idle, VuState::Running)
    }

    /// Stops a VU that never started.
    pub fn cancel(&self) -> bool {
        self.transition(VuState::Idle, VuState::Stopped)
    }

    /// Asks a running VU to finish its current iteration and stop.
    pub fn drain(&self) -> bool {
        self.transition(VuState::Running, VuState::Draining)
    }

    pub fn finish(&self) {
        self.state.store(VuState::Stopped as u8, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Waits until the VU leaves `Idle`. Returns `true` if it was started.
    pub async fn wait_start(&self) -> bool {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.state() {
                VuState::Idle => notified.await,
                VuState::Running => return true,
                VuState::Draining | VuState::Stopped => return false,
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == VuState::Running
    }
}

/// Run-wide stop request (Ctrl-C). In-flight requests finish; sleeps are cut short.
#[derive(Debug, Default)]
pub struct Interrupt {
    triggered: AtomicBool,
    notify: Notify,
}

impl Interrupt {
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }

    /// Sleeps for `duration` unless interrupted first. Returns `false` when interrupted.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.is_triggered();
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => !self.is_triggered(),
            () = self.wait() => false,
        }
    }
}

/// Live and peak count of running VUs.
#[derive(Debug, Default)]
pub struct ActiveVus {
    active: AtomicU64,
    peak: AtomicU64,
}

impl ActiveVus {
    pub fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::AcqRel).saturating_add(1);

        let mut cur = self.peak.load(Ordering::Relaxed);
        while now > cur {
            match self
                .peak
                .compare_exchange_weak(cur, now, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(v) => cur = v,
            }
        }
    }

    pub fn exit(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some(v.saturating_sub(1)));
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Acquire)
    }

    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }
}

/// Everything a VU task needs from the scheduler.
#[derive(Debug, Clone)]
pub struct VuContext {
    pub vu_id: u64,
    pub signal: Arc<VuSignal>,
    pub interrupt: Arc<Interrupt>,
    pub active: Arc<ActiveVus>,
}

impl VuContext {
    /// Whether the VU should begin another iteration.
    pub fn keep_going(&self) -> bool {
        self.signal.is_running() && !self.interrupt.is_triggered()
    }

    /// Runs `iteration` until the scheduler drains the VU or the run is interrupted.
    ///
    /// Returns the number of completed iterations. The VU always ends `Stopped`.
    pub async fn run_loop<F, Fut>(self, mut iteration: F) -> u64
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let started = tokio::select! {
            started = self.signal.wait_start() => started,
            () = self.interrupt.wait() => false,
        };
        if !started {
            self.signal.finish();
            return 0;
        }

        self.active.enter();
        let mut iterations = 0u64;
        while self.keep_going() {
            iteration().await;
            iterations = iterations.saturating_add(1);
            // An iteration that never hit a pending await must not starve the scheduler.
            tokio::task::yield_now().await;
        }
        self.active.exit();
        self.signal.finish();

        iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(signal: Arc<VuSignal>, interrupt: Arc<Interrupt>) -> VuContext {
        VuContext {
            vu_id: 1,
            signal,
            interrupt,
            active: Arc::new(ActiveVus::default()),
        }
    }

    #[test]
    fn transitions_only_from_expected_states() {
        let s = VuSignal::default();
        assert_eq!(s.state(), VuState::Idle);
        assert!(!s.drain());
        assert!(s.start());
        assert!(!s.start());
        assert!(!s.cancel());
        assert!(s.drain());
        assert_eq!(s.state(), VuState::Draining);
        s.finish();
        assert_eq!(s.state(), VuState::Stopped);
    }

    #[test]
    fn peak_tracks_the_maximum() {
        let a = ActiveVus::default();
        a.enter();
        a.enter();
        a.enter();
        a.exit();
        a.enter();
        a.exit();
        a.exit();
        assert_eq!(a.active(), 1);
        assert_eq!(a.peak(), 3);
        a.exit();
        a.exit();
        assert_eq!(a.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_idle_vu_never_iterates() {
        let signal = Arc::new(VuSignal::default());
        let interrupt = Arc::new(Interrupt::default());
        let task = tokio::spawn(ctx(signal.clone(), interrupt).run_loop(|| async {}));

        tokio::task::yield_now().await;
        assert!(signal.cancel());

        let iterations = task.await.unwrap_or_else(|e| panic!("join: {e}"));
        assert_eq!(iterations, 0);
        assert_eq!(signal.state(), VuState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn draining_vu_finishes_its_current_iteration() {
        let signal = Arc::new(VuSignal::default());
        let interrupt = Arc::new(Interrupt::default());
        let completed = Arc::new(AtomicU64::new(0));

        let task = {
            let completed = completed.clone();
            tokio::spawn(ctx(signal.clone(), interrupt).run_loop(move || {
                let completed = completed.clone();
                async move {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    completed.fetch_add(1, Ordering::SeqCst);
                }
            }))
        };

        assert!(signal.start());
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(signal.drain());

        let iterations = task.await.unwrap_or_else(|e| panic!("join: {e}"));
        assert_eq!(iterations, 3);
        assert_eq!(completed.load(Ordering::SeqCst), 3);
        assert_eq!(signal.state(), VuState::Stopped);
    }

    #[tokio::test]
    async fn iteration_that_never_awaits_still_lets_the_scheduler_drain() {
        let signal = Arc::new(VuSignal::default());
        let interrupt = Arc::new(Interrupt::default());
        let completed = Arc::new(AtomicU64::new(0));

        assert!(signal.start());
        let task = {
            let completed = completed.clone();
            tokio::spawn(ctx(signal.clone(), interrupt).run_loop(move || {
                completed.fetch_add(1, Ordering::SeqCst);
                async {}
            }))
        };

        while completed.load(Ordering::SeqCst) < 10 {
            tokio::task::yield_now().await;
        }
        assert!(signal.drain());

        let iterations = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap_or_else(|e| panic!("vu did not stop: {e}"))
            .unwrap_or_else(|e| panic!("join: {e}"));
        assert!(iterations >= 10, "iterations={iterations}");
        assert_eq!(signal.state(), VuState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_cuts_sleep_short() {
        let interrupt = Arc::new(Interrupt::default());
        let sleeper = {
            let interrupt = interrupt.clone();
            tokio::spawn(async move { interrupt.sleep(Duration::from_secs(3600)).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        interrupt.trigger();

        let completed = sleeper.await.unwrap_or_else(|e| panic!("join: {e}"));
        assert!(!completed);
        assert!(!interrupt.sleep(Duration::from_secs(1)).await);
    }
}
