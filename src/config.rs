//! Engine configuration.

use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::time::Duration;

/// Minimum delay between a disconnect and the next resubscribe attempt.
pub const RECONNECT_FLOOR: Duration = Duration::from_secs(5);

/// Reconnect timing after a transport-reported disconnect.
///
/// The first attempt waits `initial_delay`; every further consecutive attempt
/// multiplies the delay by `multiplier`, capped at `max_delay`. A successful
/// connect resets the sequence. No delay is ever shorter than
/// [`RECONNECT_FLOOR`].
#[derive(Clone, Debug, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    floor: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(RECONNECT_FLOOR, Duration::from_secs(60), 2.0)
    }
}

impl ReconnectPolicy {
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            floor: RECONNECT_FLOOR,
        }
    }

    /// Fixed delay, no backoff.
    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay, 1.0)
    }

    /// Lower the floor below [`RECONNECT_FLOOR`] so test suites can exercise
    /// reconnects in milliseconds. Not for production configs.
    #[doc(hidden)]
    pub fn with_test_floor(mut self, floor: Duration) -> Self {
        self.floor = floor;
        self
    }

    /// The minimum delay this policy enforces.
    pub fn floor(&self) -> Duration {
        self.floor
    }

    /// Delay before the given attempt (0-based). Never below `initial_delay`
    /// or the floor.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(32) as i32);
        let scaled = self.initial_delay.as_secs_f64() * factor;
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
            .max(self.initial_delay)
            .max(self.floor)
    }
}

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Records requested per page.
    /// Default: 20
    pub page_size: u32,

    /// Reconnect timing after a disconnect.
    pub reconnect: ReconnectPolicy,

    /// Max buffered status events per observer before it is dropped.
    /// Default: 256
    pub status_buffer: usize,

    /// Max buffered transport messages before the transport blocks.
    /// Default: 1024
    pub transport_buffer: usize,

    /// Whether inserted notifications are forwarded to the push dispatcher.
    pub present_inserts: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            reconnect: ReconnectPolicy::default(),
            status_buffer: 256,
            transport_buffer: 1024,
            present_inserts: true,
        }
    }
}

/// Serialized form of [`SyncConfig`]; durations are milliseconds.
#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    page_size: u32,
    reconnect_delay_ms: u64,
    reconnect_max_delay_ms: u64,
    reconnect_multiplier: f64,
    status_buffer: usize,
    transport_buffer: usize,
    present_inserts: bool,
}

impl Default for RawConfig {
    fn default() -> Self {
        let config = SyncConfig::default();
        Self {
            page_size: config.page_size,
            reconnect_delay_ms: config.reconnect.initial_delay.as_millis() as u64,
            reconnect_max_delay_ms: config.reconnect.max_delay.as_millis() as u64,
            reconnect_multiplier: config.reconnect.multiplier,
            status_buffer: config.status_buffer,
            transport_buffer: config.transport_buffer,
            present_inserts: config.present_inserts,
        }
    }
}

impl SyncConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(json)?;
        let config = Self {
            page_size: raw.page_size,
            reconnect: ReconnectPolicy::new(
                Duration::from_millis(raw.reconnect_delay_ms),
                Duration::from_millis(raw.reconnect_max_delay_ms),
                raw.reconnect_multiplier,
            ),
            status_buffer: raw.status_buffer,
            transport_buffer: raw.transport_buffer,
            present_inserts: raw.present_inserts,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(SyncError::InvalidConfig("page_size must be positive".into()));
        }
        if self.status_buffer == 0 || self.transport_buffer == 0 {
            return Err(SyncError::InvalidConfig("buffers must be positive".into()));
        }
        if self.reconnect.initial_delay.is_zero() {
            return Err(SyncError::InvalidConfig(
                "reconnect delay must be positive".into(),
            ));
        }
        if self.reconnect.initial_delay < self.reconnect.floor {
            return Err(SyncError::InvalidConfig(format!(
                "reconnect delay {:?} is below the {:?} floor",
                self.reconnect.initial_delay, self.reconnect.floor
            )));
        }
        if self.reconnect.max_delay < self.reconnect.initial_delay {
            return Err(SyncError::InvalidConfig(
                "reconnect max delay is below the initial delay".into(),
            ));
        }
        if !self.reconnect.multiplier.is_finite() || self.reconnect.multiplier < 1.0 {
            return Err(SyncError::InvalidConfig(
                "reconnect multiplier must be >= 1".into(),
            ));
        }
        Ok(())
    }
}
