// SPDX-License-Identifier: MIT OR Apache-2.0
//! Errors surfaced by the animated module entry points.

use ordoplay_animated_driver::{DriverError, DriverId};
use ordoplay_animated_graph::GraphError;
use thiserror::Error;

/// Animated module errors
#[derive(Debug, Error)]
pub enum AnimatedError {
    /// Graph mutation rejected
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Driver config rejected
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Animation id already running
    #[error("Animation [{0}] is already running")]
    DuplicateDriver(DriverId),

    /// Animation id not running
    #[error("Animation [{0}] does not exist")]
    UnknownDriver(DriverId),

    /// Node config could not be parsed
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type for animated module operations
pub type Result<T> = std::result::Result<T, AnimatedError>;
