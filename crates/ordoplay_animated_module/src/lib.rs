// SPDX-License-Identifier: MIT OR Apache-2.0
//! Frame-synchronized animated module for `OrdoPlay`.
//!
//! This crate ties the animated graph and its drivers to the display frame:
//! - An ordered, coalescing per-frame callback scheduler
//! - A graph manager that advances drivers and propagates the graph
//! - A thread-safe bridge that queues off-thread calls and emits view writes
//!   ahead of or behind ordinary view mutations
//!
//! ## Architecture
//!
//! ```text
//! caller -> AnimatedModule -> FrameScheduler (NativeAnimatedModule category)
//!                 |                  |
//!                 |             frame tick
//!                 v                  v
//!       AnimatedNodesManager -> ViewMutationSink -> ViewLookup
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod module;
pub mod scheduler;
pub mod sink;

pub use config::{AnimatedConfig, ConfigError, ANIMATED_CONFIG_VERSION};
pub use error::{AnimatedError, Result};
pub use manager::{AnimatedNodesManager, PendingCallbacks, ValueListener};
pub use module::{AnimatedModule, BridgeState, Dispatch};
pub use scheduler::{CallbackCategory, FrameCallback, FrameScheduler, FrameSignalSource, ManualFrameSignal};
pub use sink::{
    view_updates_block, BatchedViewQueue, UiBlock, ViewError, ViewLookup, ViewMutationSink,
    ViewRegistry,
};

pub use ordoplay_animated_driver as driver;
pub use ordoplay_animated_graph as graph;
