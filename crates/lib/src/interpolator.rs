use crate::{Clock, Scheduler};
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum InterpolationError {
    #[error("Step size must be positive, got {0}")]
    NonPositiveStep(f64),
    #[error("Tick interval must be positive, got {0}")]
    NonPositiveInterval(f64),
    #[error("`{field}` must be finite, got {value}")]
    NonFinite { field: &'static str, value: f64 },
    #[error("`{field}` must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },
}

/// Identifies one interpolator run. Every `start` and `cancel` moves to a new
/// generation, ticks carrying an older id have no effect.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(u64);

impl RunId {
    pub(crate) const fn new(generation: u64) -> Self {
        Self(generation)
    }
}

/// How the cadence of a run is given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// Explicit time between ticks.
    Interval(f64),
    /// Total run length, the tick interval is `duration / number_of_steps`.
    Duration(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolationConfig {
    pub start: f64,
    pub target: f64,
    pub step_size: f64,
    pub pacing: Pacing,
}

fn finite(field: &'static str, value: f64) -> Result<f64, InterpolationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(InterpolationError::NonFinite { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<f64, InterpolationError> {
    if finite(field, value)? < 0.0 {
        Err(InterpolationError::Negative { field, value })
    } else {
        Ok(value)
    }
}

impl InterpolationConfig {
    pub fn with_interval(start: f64, target: f64, step_size: f64, interval_millis: f64) -> Self {
        Self {
            start,
            target,
            step_size,
            pacing: Pacing::Interval(interval_millis),
        }
    }

    pub fn with_duration(start: f64, target: f64, step_size: f64, duration_millis: f64) -> Self {
        Self {
            start,
            target,
            step_size,
            pacing: Pacing::Duration(duration_millis),
        }
    }

    /// Covers the distance in `duration / interval` evenly sized steps, so the
    /// step size grows with the distance and the run length stays fixed.
    pub fn spread(
        start: f64,
        target: f64,
        interval_millis: f64,
        duration_millis: f64,
    ) -> Result<Self, InterpolationError> {
        if finite("interval_millis", interval_millis)? <= 0.0 {
            return Err(InterpolationError::NonPositiveInterval(interval_millis));
        }
        non_negative("duration_millis", duration_millis)?;

        let distance = (target - start).abs();
        let step_size = if distance == 0.0 {
            // nothing to cover, the first tick lands on the target
            1.0
        } else if duration_millis <= interval_millis {
            distance
        } else {
            distance * interval_millis / duration_millis
        };

        let config = Self::with_interval(start, target, step_size, interval_millis);
        config.validate()?;
        Ok(config)
    }

    pub fn distance(&self) -> f64 {
        (self.target - self.start).abs()
    }

    pub fn number_of_steps(&self) -> f64 {
        self.distance() / self.step_size
    }

    pub fn tick_interval_millis(&self) -> f64 {
        match self.pacing {
            Pacing::Interval(interval) => interval,
            Pacing::Duration(duration) => {
                let steps = self.number_of_steps();
                if steps > 0.0 {
                    duration / steps
                } else {
                    0.0
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), InterpolationError> {
        finite("start", self.start)?;
        finite("target", self.target)?;
        if !(finite("step_size", self.step_size)? > 0.0) {
            return Err(InterpolationError::NonPositiveStep(self.step_size));
        }
        match self.pacing {
            Pacing::Interval(interval) => non_negative("interval_millis", interval)?,
            Pacing::Duration(duration) => non_negative("duration_millis", duration)?,
        };
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Run {
    id: RunId,
    current: f64,
    target: f64,
    // signed, the direction is fixed when the run starts
    step: f64,
    interval: f64,
}

/// Outcome of delivering a timer to the interpolator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// Moved to the value, another tick is scheduled.
    Progressed(f64),
    /// Reached the target, the run is over.
    Finished(f64),
    /// The timer belongs to a cancelled or superseded run.
    Stale,
}

/// Moves a scalar toward a target in fixed steps at a fixed cadence.
/// Holds at most one run, starting another one supersedes it.
#[derive(Debug, Default)]
pub struct Interpolator {
    generation: u64,
    active: Option<Run>,
}

impl Interpolator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a run from `config.start` and schedules its first tick right away.
    pub fn start<S: Scheduler>(
        &mut self,
        config: &InterpolationConfig,
        scheduler: &mut S,
    ) -> Result<RunId, InterpolationError> {
        config.validate()?;

        self.generation += 1;
        let id = RunId::new(self.generation);
        let step = if config.target > config.start {
            config.step_size
        } else {
            -config.step_size
        };
        let interval = config.tick_interval_millis();

        trace!(
            ?id,
            start = config.start,
            target = config.target,
            step,
            interval,
            "starting interpolation"
        );

        self.active = Some(Run {
            id,
            current: config.start,
            target: config.target,
            step,
            interval,
        });
        scheduler.schedule(0, id);

        Ok(id)
    }

    /// Drops the active run. Timers already handed to the scheduler become stale.
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.active = None;
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn current_run(&self) -> Option<RunId> {
        self.active.map(|run| run.id)
    }

    pub fn current_value(&self) -> Option<f64> {
        self.active.map(|run| run.current)
    }

    /// Advances `run` by one step. Overshooting the target lands exactly on it.
    ///
    /// Unless the target is reached, `on_progress` is called with the new value
    /// and the next tick is scheduled `interval - elapsed` from now, where
    /// `elapsed` covers the step and the callback.
    pub fn tick<C: Clock, S: Scheduler>(
        &mut self,
        run: RunId,
        clock: &C,
        scheduler: &mut S,
        on_progress: impl FnOnce(f64),
    ) -> Tick {
        let started = clock.now_millis();
        let active = match self.active.as_mut() {
            Some(active) if active.id == run => active,
            _ => return Tick::Stale,
        };
        let (target, interval) = (active.target, active.interval);

        let candidate = active.current + active.step;
        let overshoot = if active.step > 0.0 {
            candidate >= target
        } else {
            candidate <= target
        };
        let next = if overshoot { target } else { candidate };
        active.current = next;

        if next == target {
            self.active = None;
            return Tick::Finished(next);
        }

        on_progress(next);

        let elapsed = clock.now_millis().saturating_sub(started).max(0) as f64;
        scheduler.schedule((interval - elapsed).max(0.0).round() as u64, run);

        Tick::Progressed(next)
    }
}
