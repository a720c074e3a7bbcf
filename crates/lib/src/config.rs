use thiserror::Error;

// a shorter interval than this makes the animation longer on slower phones
// since the ticks can't keep up, especially at large balances
pub const DEFAULT_CATCH_UP_INTERVAL_MILLIS: u64 = 75;
pub const DEFAULT_CATCH_UP_DURATION_MILLIS: u64 = 4000;
pub const DEFAULT_DRIFT_STEP_SIZE: u64 = 100;
pub const DEFAULT_PERSIST_THROTTLE_MILLIS: u64 = 1000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
}

/// Timing knobs of the balance display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Tick interval of the fast animation toward the reference balance.
    pub catch_up_interval_millis: u64,
    /// Total length of the fast animation, the step size is derived from it.
    pub catch_up_duration_millis: u64,
    /// Subunits added per tick while drifting toward the end of day balance.
    pub drift_step_size: u64,
    /// Minimum wall-clock time between two writes of the shown balance.
    pub persist_throttle_millis: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            catch_up_interval_millis: DEFAULT_CATCH_UP_INTERVAL_MILLIS,
            catch_up_duration_millis: DEFAULT_CATCH_UP_DURATION_MILLIS,
            drift_step_size: DEFAULT_DRIFT_STEP_SIZE,
            persist_throttle_millis: DEFAULT_PERSIST_THROTTLE_MILLIS,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.catch_up_interval_millis == 0 {
            return Err(ConfigError::Zero("catch_up_interval_millis"));
        }
        if self.drift_step_size == 0 {
            return Err(ConfigError::Zero("drift_step_size"));
        }
        Ok(())
    }
}
