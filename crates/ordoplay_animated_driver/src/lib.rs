// SPDX-License-Identifier: MIT OR Apache-2.0
//! Animation drivers for the animated node graph.
//!
//! A driver owns the time dimension of one animation: once per tick it is
//! handed the frame time and the target value node's current value, and it
//! returns the value to write plus whether it is done.
//!
//! ## Drivers
//!
//! - [`FramesDriver`]: plays caller-sampled keyframes, one per display frame
//! - [`DecayDriver`]: exponential velocity decay
//!
//! Completion is reported through [`EndCallback`], either a closure or a
//! oneshot channel, fired exactly once with an [`AnimationEnd`] record.

pub mod driver;
pub mod frames;
pub mod decay;

pub use driver::{
    AnimationDriver, AnimationEnd, DriverConfig, DriverError, DriverId, EndCallback, Step,
    DEFAULT_FRAME_DURATION_MS,
};
pub use frames::{FramesConfig, FramesDriver};
pub use decay::{DecayConfig, DecayDriver};
