//! Ramp schedule: how many virtual users should be active at a point in the run.
use crate::error::{ConfigError, Result};
use std::time::Duration;

/// Reach `target` concurrent users by the end of `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    #[must_use]
    pub const fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

/// Piecewise-linear target concurrency over a sequence of stages.
#[derive(Debug, Clone)]
pub struct RampSchedule {
    start_target: u64,
    stages: Vec<Stage>,
    total: Duration,
}

impl RampSchedule {
    pub fn new(start_target: u64, stages: Vec<Stage>) -> Result<Self> {
        if stages.is_empty() {
            return Err(ConfigError::NoStages);
        }
        let total = stages.iter().map(|s| s.duration).sum();
        Ok(Self {
            start_target,
            stages,
            total,
        })
    }

    #[inline]
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.total
    }

    #[inline]
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    #[must_use]
    pub fn max_target(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start_target, u64::max)
    }

    /// Target concurrency at `elapsed`, rounded to the nearest user.
    /// `None` once the last stage has ended.
    ///
    /// A zero-length stage is never "inside", so its target becomes the
    /// starting point of the next stage immediately.
    #[must_use]
    pub fn target_at(&self, elapsed: Duration) -> Option<u64> {
        let (index, begin, from) = self.locate(elapsed)?;
        let stage = self.stages[index];
        let progress = (elapsed - begin).as_secs_f64() / stage.duration.as_secs_f64();
        let from = from as f64;
        let value = from + (stage.target as f64 - from) * progress;
        Some(value.round().max(0.0) as u64)
    }

    /// Index of the stage running at `elapsed`.
    #[must_use]
    pub fn stage_at(&self, elapsed: Duration) -> Option<usize> {
        self.locate(elapsed).map(|(index, _, _)| index)
    }

    fn locate(&self, elapsed: Duration) -> Option<(usize, Duration, u64)> {
        let mut from = self.start_target;
        let mut begin = Duration::ZERO;
        for (index, stage) in self.stages.iter().enumerate() {
            let end = begin + stage.duration;
            if elapsed < end {
                return Some((index, begin, from));
            }
            from = stage.target;
            begin = end;
        }
        None
    }
}
