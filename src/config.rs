//! Runtime configuration.

use std::time::Duration;

use crate::error::ConfigError;

/// Wall-clock length of one machine tick unless configured otherwise.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Capacity of the command queue unless configured otherwise.
pub const DEFAULT_CHANNEL_SIZE: usize = 100;

/// Environment variable holding the tick interval, e.g. `500ms` or `2s`.
pub const TICK_INTERVAL_ENV: &str = "TICK_FSM_TICK_INTERVAL";

/// Environment variable holding the command channel size.
pub const CHANNEL_SIZE_ENV: &str = "TICK_FSM_CHANNEL_SIZE";

/// Settings for a machine spawned with [`spawn`](crate::spawn).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    tick_interval: Duration,
    channel_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            channel_size: DEFAULT_CHANNEL_SIZE,
        }
    }
}

impl RuntimeConfig {
    /// One-second ticks and a queue of 100 requests.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wall-clock length of one tick.
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Capacity of the request queue feeding the machine task.
    #[must_use]
    pub fn with_channel_size(mut self, size: usize) -> Self {
        self.channel_size = size;
        self
    }

    /// Default configuration with a human-readable tick interval.
    ///
    /// ```rust
    /// # use std::time::Duration;
    /// let config = tick_fsm::RuntimeConfig::from_interval_str("250ms")?;
    /// assert_eq!(config.tick_interval(), Duration::from_millis(250));
    /// # Ok::<(), tick_fsm::ConfigError>(())
    /// ```
    pub fn from_interval_str(interval: &str) -> Result<Self, ConfigError> {
        Ok(Self::default().with_tick_interval(parse_interval(interval)?))
    }

    /// Reads [`TICK_INTERVAL_ENV`] and [`CHANNEL_SIZE_ENV`], falling back to
    /// the defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(interval) = lookup(TICK_INTERVAL_ENV) {
            config.tick_interval = parse_interval(interval.trim())?;
        }
        if let Some(size) = lookup(CHANNEL_SIZE_ENV) {
            config.channel_size = size
                .trim()
                .parse()
                .map_err(|source| ConfigError::ChannelSize {
                    value: size.clone(),
                    source,
                })?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.channel_size == 0 {
            return Err(ConfigError::ZeroChannelSize);
        }
        Ok(())
    }

    /// Wall-clock length of one tick.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Capacity of the request queue.
    #[must_use]
    pub fn channel_size(&self) -> usize {
        self.channel_size
    }
}

fn parse_interval(value: &str) -> Result<Duration, ConfigError> {
    let interval = humantime::parse_duration(value).map_err(|source| ConfigError::Interval {
        value: value.to_owned(),
        source,
    })?;
    if interval.is_zero() {
        return Err(ConfigError::ZeroInterval);
    }
    Ok(interval)
}
