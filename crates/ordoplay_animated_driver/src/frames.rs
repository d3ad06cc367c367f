// SPDX-License-Identifier: MIT OR Apache-2.0
//! Keyframe driver playing a pre-sampled progress curve.

use crate::driver::{iterations_valid, AnimationDriver, DriverConfig, DriverError, Result, Step};
use serde::{Deserialize, Serialize};

fn default_iterations() -> i64 {
    1
}

/// Configuration of a frames driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FramesConfig {
    /// Progress samples, one per frame, normally from 0 to 1
    pub frames: Vec<f64>,
    /// Value reached at progress 1
    pub to_value: f64,
    /// Number of plays, `-1` for infinite
    #[serde(default = "default_iterations")]
    pub iterations: i64,
}

impl FramesConfig {
    /// Create a single-play config
    pub fn new(frames: Vec<f64>, to_value: f64) -> Self {
        Self { frames, to_value, iterations: 1 }
    }

    fn validate(&self) -> Result<()> {
        if self.frames.is_empty() {
            return Err(DriverError::InvalidConfig("frames must not be empty".to_string()));
        }
        if self.frames.iter().any(|f| !f.is_finite()) || !self.to_value.is_finite() {
            return Err(DriverError::InvalidConfig("frames must be finite".to_string()));
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

/// Plays `from + frames[i] * (toValue - from)`, picking `i` from elapsed time.
///
/// The last sample writes exactly `toValue`. Completion is reported on the
/// tick after that write, so dependents observe the terminal value for one
/// full tick before the animation is torn down.
#[derive(Debug, Clone)]
pub struct FramesDriver {
    config: FramesConfig,
    frame_duration_ms: f64,
    start_nanos: Option<u64>,
    from_value: Option<f64>,
    current_loop: i64,
    last_written: bool,
}

impl FramesDriver {
    /// Create a driver sampling one frame every `frame_duration_ms`
    pub fn new(config: FramesConfig, frame_duration_ms: f64) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            frame_duration_ms,
            start_nanos: None,
            from_value: None,
            current_loop: 1,
            last_written: false,
        })
    }

    fn has_more_loops(&self) -> bool {
        self.config.iterations == -1 || self.current_loop < self.config.iterations
    }
}

impl AnimationDriver for FramesDriver {
    fn advance(&mut self, frame_time_nanos: u64, current: f64) -> Step {
        if self.last_written || self.config.iterations == 0 {
            return Step::done();
        }

        let start = *self.start_nanos.get_or_insert(frame_time_nanos);
        let from = *self.from_value.get_or_insert(current);
        let elapsed_ms = frame_time_nanos.saturating_sub(start) as f64 / 1_000_000.0;
        let index = (elapsed_ms / self.frame_duration_ms).round() as usize;

        let last = self.config.frames.len() - 1;
        if index < last {
            let progress = self.config.frames[index];
            return Step::write(from + progress * (self.config.to_value - from));
        }

        if self.has_more_loops() {
            self.start_nanos = None;
            self.current_loop += 1;
        } else {
            self.last_written = true;
        }
        Step::write(self.config.to_value)
    }

    fn reset(&mut self, config: DriverConfig) -> Result<()> {
        let DriverConfig::Frames(config) = config else {
            return Err(DriverError::InvalidConfig(format!(
                "cannot reset a frames animation with a {} config",
                config.kind()
            )));
        };
        config.validate()?;
        self.config = config;
        self.start_nanos = None;
        self.from_value = None;
        self.current_loop = 1;
        self.last_written = false;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "frames"
    }
}
