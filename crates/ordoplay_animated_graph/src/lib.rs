// SPDX-License-Identifier: MIT OR Apache-2.0
//! Animated node graph for native-driven view animation.
//!
//! This crate holds the data side of the animation engine:
//! - Value, style, props and transform nodes plus interpolation and arithmetic nodes
//! - Parent-to-child edges kept acyclic at connect time
//! - Props-node attachments to views
//! - Topological propagation that yields per-view property writes
//!
//! ## Architecture
//!
//! Nodes are stored in generation-checked slots inside [`AnimatedGraph`] and
//! addressed by caller-chosen [`NodeTag`]s. A propagation pass recomputes the
//! nodes reachable from a set of dirtied roots, each one after all of its
//! parents, and returns the resulting [`ViewUpdate`]s for the caller to flush.

pub mod node;
pub mod value;
pub mod interpolation;
pub mod connection;
pub mod graph;
pub mod evaluation;

pub use node::{
    AnimatedNode, NodeConfig, NodeKey, NodeKind, NodeTag, NodeType, TransformEntry, ValueNode,
};
pub use value::{MappingEntry, PropMap, PropValue};
pub use interpolation::{Extrapolate, InterpolationConfig};
pub use connection::{ViewConnection, ViewTag, ViewUpdate};
pub use graph::{AnimatedGraph, GraphError};
pub use evaluation::Propagation;
