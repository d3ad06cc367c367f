// SPDX-License-Identifier: MIT OR Apache-2.0
//! Driver contract, configs and completion records.

use crate::decay::{DecayConfig, DecayDriver};
use crate::frames::{FramesConfig, FramesDriver};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::oneshot;

/// Result type for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;

/// Default sampling interval of frame-based drivers
pub const DEFAULT_FRAME_DURATION_MS: f64 = 1000.0 / 60.0;

/// Caller-chosen identifier for an animation
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(pub u32);

impl fmt::Debug for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DriverId({})", self.0)
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of advancing a driver by one tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Step {
    /// New value for the target node, if the driver writes one this tick
    pub value: Option<f64>,
    /// Whether the driver is done and should be removed
    pub finished: bool,
}

impl Step {
    /// Write a value and keep running
    pub fn write(value: f64) -> Self {
        Self { value: Some(value), finished: false }
    }

    /// Finish without writing
    pub fn done() -> Self {
        Self { value: None, finished: true }
    }
}

/// A per-animation process that writes one value node once per tick
pub trait AnimationDriver: Send {
    /// Compute this tick's value.
    ///
    /// `current` is the target node's value before the write; drivers read
    /// their start value from it on their first step.
    fn advance(&mut self, frame_time_nanos: u64, current: f64) -> Step;

    /// Restart with a new config of the same kind
    fn reset(&mut self, config: DriverConfig) -> Result<()>;

    /// Config type name, for diagnostics
    fn kind(&self) -> &'static str;
}

/// Configuration of a driver, tagged by `"type"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DriverConfig {
    /// Pre-sampled keyframes
    Frames(FramesConfig),
    /// Exponential velocity decay
    Decay(DecayConfig),
}

impl DriverConfig {
    /// Parse a config from the runtime's dynamic mapping type
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Config type name
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Frames(_) => "frames",
            Self::Decay(_) => "decay",
        }
    }

    /// Build a driver for this config
    pub fn into_driver(self, frame_duration_ms: f64) -> Result<Box<dyn AnimationDriver>> {
        if !(frame_duration_ms > 0.0) {
            return Err(DriverError::InvalidConfig(format!(
                "frame duration must be positive, got {frame_duration_ms}"
            )));
        }
        Ok(match self {
            Self::Frames(config) => Box::new(FramesDriver::new(config, frame_duration_ms)?),
            Self::Decay(config) => Box::new(DecayDriver::new(config, frame_duration_ms)?),
        })
    }
}

/// Number of times an animation plays
pub(crate) fn iterations_valid(iterations: i64) -> bool {
    iterations >= -1
}

/// Record passed to a completion callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationEnd {
    /// `true` if the animation ran to completion, `false` if it was stopped
    pub finished: bool,
}

/// Completion notification fired exactly once
pub struct EndCallback(Box<dyn FnOnce(AnimationEnd) + Send>);

impl EndCallback {
    /// Wrap a closure
    pub fn new(callback: impl FnOnce(AnimationEnd) + Send + 'static) -> Self {
        Self(Box::new(callback))
    }

    /// A callback that ignores the result
    pub fn none() -> Self {
        Self::new(|_| {})
    }

    /// A callback that resolves the returned receiver
    pub fn channel() -> (Self, oneshot::Receiver<AnimationEnd>) {
        let (tx, rx) = oneshot::channel();
        let callback = Self::new(move |end| {
            // Receiver may already be dropped; nobody is waiting then.
            let _ = tx.send(end);
        });
        (callback, rx)
    }

    /// Fire the callback, consuming it.
    ///
    /// A panicking callback is logged and swallowed so the caller can carry on
    /// removing the animation.
    pub fn invoke(self, end: AnimationEnd) {
        let callback = self.0;
        if catch_unwind(AssertUnwindSafe(move || callback(end))).is_err() {
            tracing::error!(finished = end.finished, "animation end callback panicked");
        }
    }
}

impl Default for EndCallback {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Debug for EndCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EndCallback")
    }
}

/// Error from building or resetting a driver
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Config rejected
    #[error("Invalid animation config: {0}")]
    InvalidConfig(String),

    /// Config could not be parsed
    #[error("Failed to parse animation config: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_config_parsing() {
        let frames = DriverConfig::from_json(json!({
            "type": "frames",
            "frames": [0.0, 0.5, 1.0],
            "toValue": 10.0,
        }))
        .unwrap();
        assert_eq!(frames.kind(), "frames");

        let decay = DriverConfig::from_json(json!({
            "type": "decay",
            "velocity": 1.0,
            "deceleration": 0.998,
            "iterations": 2,
        }))
        .unwrap();
        assert_eq!(decay.kind(), "decay");

        assert!(DriverConfig::from_json(json!({ "type": "spring", "stiffness": 100 })).is_err());
    }

    #[test]
    fn test_invalid_frame_duration() {
        let config = DriverConfig::from_json(json!({
            "type": "frames",
            "frames": [0.0, 1.0],
            "toValue": 1.0,
        }))
        .unwrap();
        assert!(matches!(config.into_driver(0.0), Err(DriverError::InvalidConfig(_))));
    }

    #[test]
    fn test_end_callback_fires_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let callback = EndCallback::new(move |end| {
            assert!(end.finished);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        callback.invoke(AnimationEnd { finished: true });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_end_channel_resolves() {
        let (callback, mut rx) = EndCallback::channel();
        callback.invoke(AnimationEnd { finished: false });
        assert_eq!(rx.try_recv().unwrap(), AnimationEnd { finished: false });
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let callback = EndCallback::new(|_| panic!("callback failure"));
        callback.invoke(AnimationEnd { finished: true });
    }
}
