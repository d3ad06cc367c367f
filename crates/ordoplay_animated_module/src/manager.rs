// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph manager that owns the animated graph and its active drivers.
//!
//! Every method runs on the thread that created the manager (the thread that
//! owns the live view tree) and asserts it. Mutations take effect
//! immediately and surface caller errors as [`AnimatedError`].
//!
//! User callbacks (end callbacks, value listeners) are never called from
//! inside a manager method. They are collected and handed out by
//! [`AnimatedNodesManager::take_callbacks`] so the owner can run them once
//! it no longer holds the manager.

use crate::error::{AnimatedError, Result};
use indexmap::{IndexMap, IndexSet};
use ordoplay_animated_driver::{AnimationDriver, AnimationEnd, DriverConfig, DriverId, EndCallback};
use ordoplay_animated_graph::{AnimatedGraph, GraphError, NodeConfig, NodeTag, ViewTag, ViewUpdate};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Listener called with a value node's output after each recomputation
pub type ValueListener = Box<dyn FnMut(f64) + Send>;

type SharedListener = Arc<Mutex<ValueListener>>;

type DeferredCall = Box<dyn FnOnce() + Send>;

/// User callbacks produced by manager calls, in the order they were produced
#[derive(Default)]
pub struct PendingCallbacks {
    calls: Vec<(&'static str, DeferredCall)>,
}

impl PendingCallbacks {
    /// Queue a call
    pub fn push(&mut self, name: &'static str, call: impl FnOnce() + Send + 'static) {
        self.calls.push((name, Box::new(call)));
    }

    /// Number of queued calls
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Run every call in order. A panicking call is logged and the rest still run.
    pub fn run(self) {
        for (name, call) in self.calls {
            if catch_unwind(AssertUnwindSafe(call)).is_err() {
                tracing::error!(callback = name, "animated callback panicked");
            }
        }
    }
}

impl fmt::Debug for PendingCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.calls.iter().map(|(name, _)| name)).finish()
    }
}

#[derive(Debug, Clone, Copy)]
struct ThreadGuard(ThreadId);

impl ThreadGuard {
    fn current() -> Self {
        Self(thread::current().id())
    }

    fn check(self, operation: &str) {
        assert_eq!(
            thread::current().id(),
            self.0,
            "{operation} must run on the thread that owns the animated graph"
        );
    }
}

struct ActiveAnimation {
    node: NodeTag,
    driver: Box<dyn AnimationDriver>,
    end: EndCallback,
}

/// Owner of the animated graph and the set of running drivers
pub struct AnimatedNodesManager {
    graph: AnimatedGraph,
    animations: IndexMap<DriverId, ActiveAnimation>,
    updated_nodes: IndexSet<NodeTag>,
    listeners: HashMap<NodeTag, SharedListener>,
    callbacks: PendingCallbacks,
    frame_duration_ms: f64,
    owner: ThreadGuard,
}

impl AnimatedNodesManager {
    /// Create a manager owned by the calling thread
    pub fn new(frame_duration_ms: f64) -> Self {
        Self {
            graph: AnimatedGraph::new(),
            animations: IndexMap::new(),
            updated_nodes: IndexSet::new(),
            listeners: HashMap::new(),
            callbacks: PendingCallbacks::default(),
            frame_duration_ms,
            owner: ThreadGuard::current(),
        }
    }

    /// Read access to the graph
    pub fn graph(&self) -> &AnimatedGraph {
        &self.graph
    }

    /// Whether the next tick has anything to do
    pub fn has_active_animations(&self) -> bool {
        !self.animations.is_empty() || !self.updated_nodes.is_empty()
    }

    /// Whether an animation with this id is running
    pub fn is_animating(&self, id: DriverId) -> bool {
        self.animations.contains_key(&id)
    }

    /// Number of running animations
    pub fn animation_count(&self) -> usize {
        self.animations.len()
    }

    /// Hand out the callbacks produced since the last call, to be run by the
    /// owner after it releases the manager
    pub fn take_callbacks(&mut self) -> PendingCallbacks {
        std::mem::take(&mut self.callbacks)
    }

    /// Queue a user call behind the ones already produced
    pub fn defer(&mut self, name: &'static str, call: impl FnOnce() + Send + 'static) {
        self.callbacks.push(name, call);
    }

    /// Create a node and mark it for the next propagation
    pub fn create_animated_node(&mut self, tag: NodeTag, config: NodeConfig) -> Result<()> {
        self.owner.check("createAnimatedNode");
        self.graph.create_node(tag, config)?;
        self.updated_nodes.insert(tag);
        Ok(())
    }

    /// Replace an interpolation node's config; drivers targeting it stop unfinished
    pub fn update_animated_node_config(&mut self, tag: NodeTag, config: NodeConfig) -> Result<()> {
        self.owner.check("updateAnimatedNodeConfig");
        self.graph.update_node_config(tag, config)?;
        self.stop_animations_for_node(tag);
        self.updated_nodes.insert(tag);
        Ok(())
    }

    /// Drop a node that has no edges, view or driver
    pub fn drop_animated_node(&mut self, tag: NodeTag) -> Result<()> {
        self.owner.check("dropAnimatedNode");
        if self.animations.values().any(|a| a.node == tag) {
            return Err(GraphError::NodeInUse(tag).into());
        }
        self.graph.drop_node(tag)?;
        self.updated_nodes.shift_remove(&tag);
        self.listeners.remove(&tag);
        Ok(())
    }

    /// Feed `parent` into `child`
    pub fn connect_animated_nodes(&mut self, parent: NodeTag, child: NodeTag) -> Result<()> {
        self.owner.check("connectAnimatedNodes");
        self.graph.connect(parent, child)?;
        self.updated_nodes.insert(child);
        Ok(())
    }

    /// Remove the edge from `parent` to `child`
    pub fn disconnect_animated_nodes(&mut self, parent: NodeTag, child: NodeTag) -> Result<()> {
        self.owner.check("disconnectAnimatedNodes");
        self.graph.disconnect(parent, child)?;
        self.updated_nodes.insert(child);
        Ok(())
    }

    /// Attach a props node to a view
    pub fn connect_animated_node_to_view(&mut self, tag: NodeTag, view: ViewTag) -> Result<()> {
        self.owner.check("connectAnimatedNodeToView");
        self.graph.connect_to_view(tag, view)?;
        self.updated_nodes.insert(tag);
        Ok(())
    }

    /// Detach a props node, returning the write that restores the view
    pub fn disconnect_animated_node_from_view(
        &mut self,
        tag: NodeTag,
        view: ViewTag,
    ) -> Result<ViewUpdate> {
        self.owner.check("disconnectAnimatedNodeFromView");
        Ok(self.graph.disconnect_from_view(tag, view)?)
    }

    /// Write resetting every property the props node controls, if attached
    pub fn restore_default_values(&mut self, tag: NodeTag) -> Result<Option<ViewUpdate>> {
        self.owner.check("restoreDefaultValues");
        Ok(self.graph.restore_defaults(tag)?)
    }

    /// Set a value node; drivers targeting it stop unfinished
    pub fn set_animated_node_value(&mut self, tag: NodeTag, value: f64) -> Result<()> {
        self.owner.check("setAnimatedNodeValue");
        self.graph.value_node(tag)?;
        self.stop_animations_for_node(tag);
        self.graph.value_node_mut(tag)?.value = value;
        self.updated_nodes.insert(tag);
        Ok(())
    }

    /// Set a value node's offset
    pub fn set_animated_node_offset(&mut self, tag: NodeTag, offset: f64) -> Result<()> {
        self.owner.check("setAnimatedNodeOffset");
        self.graph.value_node_mut(tag)?.offset = offset;
        self.updated_nodes.insert(tag);
        Ok(())
    }

    /// Merge a value node's offset into its value
    pub fn flatten_animated_node_offset(&mut self, tag: NodeTag) -> Result<()> {
        self.owner.check("flattenAnimatedNodeOffset");
        self.graph.value_node_mut(tag)?.flatten_offset();
        Ok(())
    }

    /// Move a value node's value into its offset
    pub fn extract_animated_node_offset(&mut self, tag: NodeTag) -> Result<()> {
        self.owner.check("extractAnimatedNodeOffset");
        self.graph.value_node_mut(tag)?.extract_offset();
        Ok(())
    }

    /// Output of a value node
    pub fn get_value(&self, tag: NodeTag) -> Result<f64> {
        self.owner.check("getValue");
        Ok(self.graph.value_node(tag)?.output())
    }

    /// Observe a value node's output
    pub fn start_listening_to_animated_node_value(
        &mut self,
        tag: NodeTag,
        listener: ValueListener,
    ) -> Result<()> {
        self.owner.check("startListeningToAnimatedNodeValue");
        self.graph.value_node(tag)?;
        self.listeners.insert(tag, Arc::new(Mutex::new(listener)));
        Ok(())
    }

    /// Stop observing a value node
    pub fn stop_listening_to_animated_node_value(&mut self, tag: NodeTag) -> Result<()> {
        self.owner.check("stopListeningToAnimatedNodeValue");
        self.graph.value_node(tag)?;
        self.listeners.remove(&tag);
        Ok(())
    }

    /// Start a driver writing the value node `tag`
    pub fn start_animating_node(
        &mut self,
        id: DriverId,
        tag: NodeTag,
        config: DriverConfig,
        end: EndCallback,
    ) -> Result<()> {
        self.owner.check("startAnimatingNode");
        if self.animations.contains_key(&id) {
            return Err(AnimatedError::DuplicateDriver(id));
        }
        self.graph.value_node(tag)?;
        let kind = config.kind();
        let driver = config.into_driver(self.frame_duration_ms)?;
        self.animations.insert(id, ActiveAnimation { node: tag, driver, end });
        tracing::debug!(%id, node = %tag, kind, "started animation");
        Ok(())
    }

    /// Restart a running driver with a new config
    pub fn update_animation_config(&mut self, id: DriverId, config: DriverConfig) -> Result<()> {
        self.owner.check("updateAnimationConfig");
        let animation = self.animations.get_mut(&id).ok_or(AnimatedError::UnknownDriver(id))?;
        animation.driver.reset(config)?;
        Ok(())
    }

    /// Stop a driver early; unknown or finished ids are ignored
    pub fn stop_animation(&mut self, id: DriverId) {
        self.owner.check("stopAnimation");
        if let Some(animation) = self.animations.shift_remove(&id) {
            tracing::debug!(%id, node = %animation.node, "stopped animation");
            let end = animation.end;
            self.callbacks.push("endCallback", move || end.invoke(AnimationEnd { finished: false }));
        }
    }

    fn stop_animations_for_node(&mut self, tag: NodeTag) {
        let ids: Vec<DriverId> = self
            .animations
            .iter()
            .filter(|(_, a)| a.node == tag)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            self.stop_animation(id);
        }
    }

    /// Advance every driver and propagate the graph for one tick.
    ///
    /// Returns the writes for attached props nodes, in propagation order.
    /// Listener and end callbacks are queued for [`Self::take_callbacks`].
    pub fn run_updates(&mut self, frame_time_nanos: u64) -> Vec<ViewUpdate> {
        self.owner.check("runUpdates");

        let mut roots = std::mem::take(&mut self.updated_nodes);
        let mut finished = Vec::new();
        for (id, animation) in &mut self.animations {
            let Ok(target) = self.graph.value_node_mut(animation.node) else {
                panic!("animation {id} targets missing value node {}", animation.node);
            };
            let step = animation.driver.advance(frame_time_nanos, target.value);
            if let Some(value) = step.value {
                target.value = value;
                roots.insert(animation.node);
            }
            if step.finished {
                finished.push(*id);
            }
        }

        let roots: Vec<NodeTag> = roots.into_iter().collect();
        let propagation = self.graph.propagate(&roots);

        for &(tag, value) in &propagation.value_updates {
            if let Some(listener) = self.listeners.get(&tag) {
                let listener = listener.clone();
                self.callbacks.push("valueListener", move || {
                    let mut listener = listener.lock();
                    (*listener)(value);
                });
            }
        }

        for id in finished {
            if let Some(animation) = self.animations.shift_remove(&id) {
                tracing::debug!(%id, node = %animation.node, "animation finished");
                let end = animation.end;
                self.callbacks.push("endCallback", move || end.invoke(AnimationEnd { finished: true }));
            }
        }

        propagation.view_updates
    }
}
