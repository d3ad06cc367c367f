// SPDX-License-Identifier: MIT OR Apache-2.0
//! Velocity decay driver.

use crate::driver::{iterations_valid, AnimationDriver, DriverConfig, DriverError, Result, Step};
use serde::{Deserialize, Serialize};

/// Change per step below which a decay comes to rest
const REST_THRESHOLD: f64 = 0.1;

fn default_iterations() -> i64 {
    1
}

/// Configuration of a decay driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecayConfig {
    /// Initial velocity in units per millisecond
    pub velocity: f64,
    /// Fraction of velocity kept per millisecond, in `[0, 1)`
    pub deceleration: f64,
    /// Number of plays, `-1` for infinite
    #[serde(default = "default_iterations")]
    pub iterations: i64,
}

impl DecayConfig {
    fn validate(&self) -> Result<()> {
        if !self.velocity.is_finite() {
            return Err(DriverError::InvalidConfig("velocity must be finite".to_string()));
        }
        if !(0.0..1.0).contains(&self.deceleration) {
            return Err(DriverError::InvalidConfig(format!(
                "deceleration must be in [0, 1), got {}",
                self.deceleration
            )));
        }
        if !iterations_valid(self.iterations) {
            return Err(DriverError::InvalidConfig(format!(
                "iterations must be -1 or non-negative, got {}",
                self.iterations
            )));
        }
        Ok(())
    }
}

/// Moves a value along `from + v / (1 - d) * (1 - e^(-(1 - d) * t))`.
///
/// Finishes on the tick whose change drops below 0.1, without
/// writing that tick.
#[derive(Debug, Clone)]
pub struct DecayDriver {
    config: DecayConfig,
    frame_duration_ms: f64,
    start_ms: Option<f64>,
    from_value: Option<f64>,
    last_value: f64,
    current_loop: i64,
}

impl DecayDriver {
    /// Create a decay driver whose first step lands one `frame_duration_ms` after its start
    pub fn new(config: DecayConfig, frame_duration_ms: f64) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            frame_duration_ms,
            start_ms: None,
            from_value: None,
            last_value: 0.0,
            current_loop: 1,
        })
    }
}

impl AnimationDriver for DecayDriver {
    fn advance(&mut self, frame_time_nanos: u64, current: f64) -> Step {
        if self.config.iterations == 0 {
            return Step::done();
        }

        let now_ms = frame_time_nanos as f64 / 1_000_000.0;
        let start = match self.start_ms {
            Some(start) => start,
            None => {
                // The first step lands one frame after the start
                let start = now_ms - self.frame_duration_ms;
                self.start_ms = Some(start);
                self.last_value = *self.from_value.get_or_insert(current);
                start
            }
        };
        let from = self.from_value.unwrap_or(current);

        let kept = 1.0 - self.config.deceleration;
        let value =
            from + self.config.velocity / kept * (1.0 - (-kept * (now_ms - start)).exp());

        if (self.last_value - value).abs() < REST_THRESHOLD {
            if self.config.iterations != -1 && self.current_loop >= self.config.iterations {
                return Step::done();
            }
            self.start_ms = None;
            self.current_loop += 1;
        }
        self.last_value = value;
        Step::write(value)
    }

    fn reset(&mut self, config: DriverConfig) -> Result<()> {
        let DriverConfig::Decay(config) = config else {
            return Err(DriverError::InvalidConfig(format!(
                "cannot reset a decay animation with a {} config",
                config.kind()
            )));
        };
        config.validate()?;
        self.config = config;
        self.start_ms = None;
        self.from_value = None;
        self.current_loop = 1;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "decay"
    }
}
