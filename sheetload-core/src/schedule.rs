use std::time::Duration;

use crate::config::Stage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// Piecewise-linear VU target over a list of stages, starting from 0.
#[derive(Debug, Clone)]
pub struct RampingSchedule {
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

impl RampingSchedule {
    pub fn new(stages: Vec<Stage>) -> Self {
        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Self {
            stages,
            cumulative_ends,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn peak_target(&self) -> u64 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    /// Index of the stage covering `elapsed`; a stage owns its end instant.
    fn stage_index(&self, elapsed: Duration) -> usize {
        self.cumulative_ends
            .partition_point(|end| *end < elapsed)
            .min(self.stages.len().saturating_sub(1))
    }

    fn bounds(&self, idx: usize) -> (Duration, Duration, u64, u64) {
        let stage_start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };
        let start_target = if idx == 0 {
            0
        } else {
            self.stages[idx - 1].target
        };
        (
            stage_start,
            self.cumulative_ends[idx],
            start_target,
            self.stages[idx].target,
        )
    }

    /// Interpolated target at `elapsed`, rounded to the nearest VU.
    ///
    /// Equals the stage target exactly at each stage end; past the last stage it holds the
    /// final target.
    pub fn target_at(&self, elapsed: Duration) -> u64 {
        if self.stages.is_empty() {
            return 0;
        }

        let idx = self.stage_index(elapsed);
        let (stage_start, stage_end, start_target, end_target) = self.bounds(idx);

        let stage_duration = stage_end.saturating_sub(stage_start);
        if stage_duration.is_zero() || elapsed >= stage_end {
            return end_target;
        }

        let progress =
            elapsed.saturating_sub(stage_start).as_secs_f64() / stage_duration.as_secs_f64();
        let start = start_target as f64;
        let end = end_target as f64;
        let cur = (start + (end - start) * progress).round();
        cur.max(0.0) as u64
    }

    /// Concurrency the scheduler should hold: the ramp target, or 0 once every stage is consumed.
    pub fn desired_at(&self, elapsed: Duration) -> u64 {
        if self.is_done(elapsed) {
            return 0;
        }
        self.target_at(elapsed)
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        if self.stages.is_empty() {
            return None;
        }

        let clamped = elapsed.min(self.total_duration());
        let idx = self.stage_index(clamped);
        let (stage_start, stage_end, start_target, end_target) = self.bounds(idx);

        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = clamped.saturating_sub(stage_start);

        Some(StageSnapshot {
            index: idx,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining: stage_duration.saturating_sub(stage_elapsed),
            start_target,
            end_target,
            current_target: self.target_at(clamped),
        })
    }
}
