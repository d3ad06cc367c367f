// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scheduling bridge between callers, the frame scheduler and the view sink.
//!
//! Entry points may be called from any thread. On the owning thread, outside
//! a tick, they run immediately and return caller errors. Anywhere else they
//! are queued and applied, in arrival order, at the start of the next tick
//! before its propagation pass.
//!
//! Each tick emits at most two units of work: restore writes from detached
//! views go ahead of the sink's queue, everything else goes behind it.
//!
//! User callbacks run after the manager lock is released. Calls they make
//! back into the module are queued for the next tick.

use crate::config::AnimatedConfig;
use crate::error::{AnimatedError, Result};
use crate::manager::{AnimatedNodesManager, ValueListener};
use crate::scheduler::{CallbackCategory, FrameCallback, FrameScheduler};
use crate::sink::{view_updates_block, ViewMutationSink};
use ordoplay_animated_driver::{DriverConfig, DriverId, EndCallback};
use ordoplay_animated_graph::{NodeConfig, NodeTag, ViewTag, ViewUpdate};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// How an entry point was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Applied before returning
    Applied,
    /// Deferred to the next tick; errors are logged when applied
    Queued,
}

/// Scheduling state of the module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgeState {
    /// No work and no frame callback registered
    #[default]
    Idle,
    /// Frame callback registered for the next tick
    Registered,
    /// Inside a tick
    Running,
}

/// Which side of the sink's queue an operation's writes go to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Emission {
    Pre,
    Post,
}

type Operation = Box<dyn FnOnce(&mut AnimatedNodesManager) -> Result<Option<ViewUpdate>> + Send>;

struct QueuedOperation {
    name: &'static str,
    emission: Emission,
    op: Operation,
}

#[derive(Default)]
struct BridgeQueues {
    state: BridgeState,
    paused: bool,
    applying: bool,
    /// Manager had running drivers or dirtied nodes when last released
    active: bool,
    operations: Vec<QueuedOperation>,
}

/// Clears `applying` when a synchronous call ends, including by unwinding
struct ApplyGuard<'a>(&'a ModuleInner);

impl Drop for ApplyGuard<'_> {
    fn drop(&mut self) {
        self.0.queues.lock().applying = false;
    }
}

/// Leaves `Running` if a tick unwinds, so later calls can schedule again
struct TickGuard<'a>(&'a ModuleInner);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        if !thread::panicking() {
            return;
        }
        let work = {
            let mut queues = self.0.queues.lock();
            if queues.state != BridgeState::Running {
                return;
            }
            queues.state = BridgeState::Idle;
            queues.active || !queues.operations.is_empty()
        };
        tracing::error!(work, "animated frame unwound; module reset to idle");
        if work {
            self.0.ensure_registered();
        }
    }
}

struct ModuleInner {
    manager: Mutex<AnimatedNodesManager>,
    queues: Mutex<BridgeQueues>,
    scheduler: FrameScheduler,
    sink: Arc<dyn ViewMutationSink>,
    config: AnimatedConfig,
    owner: ThreadId,
    frame_callback: FrameCallback,
}

/// Animated module handle, shareable across threads
#[derive(Clone)]
pub struct AnimatedModule {
    inner: Arc<ModuleInner>,
}

impl AnimatedModule {
    /// Create a module owned by the calling thread
    pub fn new(
        config: AnimatedConfig,
        scheduler: FrameScheduler,
        sink: Arc<dyn ViewMutationSink>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &std::sync::Weak<ModuleInner>| {
            let weak = weak.clone();
            let frame_callback: FrameCallback = Arc::new(move |frame_time: u64| {
                if let Some(inner) = weak.upgrade() {
                    inner.do_frame(frame_time);
                }
            });
            ModuleInner {
                manager: Mutex::new(AnimatedNodesManager::new(config.frame_duration_ms)),
                queues: Mutex::new(BridgeQueues::default()),
                scheduler,
                sink,
                config,
                owner: thread::current().id(),
                frame_callback,
            }
        });
        Self { inner }
    }

    /// Current scheduling state
    pub fn state(&self) -> BridgeState {
        self.inner.queues.lock().state
    }

    /// Number of operations waiting for the next tick
    pub fn pending_operations(&self) -> usize {
        self.inner.queues.lock().operations.len()
    }

    /// Settings the module was created with
    pub fn config(&self) -> &AnimatedConfig {
        &self.inner.config
    }

    /// Inspect the manager from the owning thread outside a tick
    pub fn with_manager<R>(&self, f: impl FnOnce(&AnimatedNodesManager) -> R) -> Option<R> {
        if !self.inner.can_apply_now() {
            return None;
        }
        Some(f(&*self.inner.manager.lock()))
    }

    /// Create a node from a dynamic config
    pub fn create_animated_node(&self, tag: NodeTag, config: serde_json::Value) -> Result<Dispatch> {
        let config = parse_node_config(config)?;
        self.post("createAnimatedNode", move |m| m.create_animated_node(tag, config))
    }

    /// Replace an interpolation node's config
    pub fn update_animated_node_config(
        &self,
        tag: NodeTag,
        config: serde_json::Value,
    ) -> Result<Dispatch> {
        let config = parse_node_config(config)?;
        self.post("updateAnimatedNodeConfig", move |m| m.update_animated_node_config(tag, config))
    }

    /// Drop a detached node
    pub fn drop_animated_node(&self, tag: NodeTag) -> Result<Dispatch> {
        self.post("dropAnimatedNode", move |m| m.drop_animated_node(tag))
    }

    /// Feed `parent` into `child`
    pub fn connect_animated_nodes(&self, parent: NodeTag, child: NodeTag) -> Result<Dispatch> {
        self.post("connectAnimatedNodes", move |m| m.connect_animated_nodes(parent, child))
    }

    /// Remove the edge from `parent` to `child`
    pub fn disconnect_animated_nodes(&self, parent: NodeTag, child: NodeTag) -> Result<Dispatch> {
        self.post("disconnectAnimatedNodes", move |m| m.disconnect_animated_nodes(parent, child))
    }

    /// Attach a props node to a view; its writes follow ordinary updates
    pub fn connect_animated_node_to_view(&self, tag: NodeTag, view: ViewTag) -> Result<Dispatch> {
        self.post("connectAnimatedNodeToView", move |m| m.connect_animated_node_to_view(tag, view))
    }

    /// Detach a props node; the restore write precedes ordinary updates
    pub fn disconnect_animated_node_from_view(
        &self,
        tag: NodeTag,
        view: ViewTag,
    ) -> Result<Dispatch> {
        self.dispatch(
            "disconnectAnimatedNodeFromView",
            Emission::Pre,
            Box::new(move |m: &mut AnimatedNodesManager| {
                m.disconnect_animated_node_from_view(tag, view).map(Some)
            }),
        )
    }

    /// Reset the view of a props node to its authored values, ahead of
    /// ordinary updates. Used when the view is being torn down.
    pub fn restore_default_values(&self, tag: NodeTag) -> Result<Dispatch> {
        self.dispatch(
            "restoreDefaultValues",
            Emission::Pre,
            Box::new(move |m: &mut AnimatedNodesManager| m.restore_default_values(tag)),
        )
    }

    /// Set a value node, stopping its drivers
    pub fn set_animated_node_value(&self, tag: NodeTag, value: f64) -> Result<Dispatch> {
        self.post("setAnimatedNodeValue", move |m| m.set_animated_node_value(tag, value))
    }

    /// Set a value node's offset
    pub fn set_animated_node_offset(&self, tag: NodeTag, offset: f64) -> Result<Dispatch> {
        self.post("setAnimatedNodeOffset", move |m| m.set_animated_node_offset(tag, offset))
    }

    /// Merge a value node's offset into its value
    pub fn flatten_animated_node_offset(&self, tag: NodeTag) -> Result<Dispatch> {
        self.post("flattenAnimatedNodeOffset", move |m| m.flatten_animated_node_offset(tag))
    }

    /// Move a value node's value into its offset
    pub fn extract_animated_node_offset(&self, tag: NodeTag) -> Result<Dispatch> {
        self.post("extractAnimatedNodeOffset", move |m| m.extract_animated_node_offset(tag))
    }

    /// Read a value node's output, delivered to `callback`
    pub fn get_value(
        &self,
        tag: NodeTag,
        callback: impl FnOnce(f64) + Send + 'static,
    ) -> Result<Dispatch> {
        self.post("getValue", move |m| {
            let value = m.get_value(tag)?;
            m.defer("getValue", move || callback(value));
            Ok(())
        })
    }

    /// Observe a value node's output after each recomputation
    pub fn start_listening_to_animated_node_value(
        &self,
        tag: NodeTag,
        listener: impl FnMut(f64) + Send + 'static,
    ) -> Result<Dispatch> {
        let listener: ValueListener = Box::new(listener);
        self.post("startListeningToAnimatedNodeValue", move |m| {
            m.start_listening_to_animated_node_value(tag, listener)
        })
    }

    /// Stop observing a value node
    pub fn stop_listening_to_animated_node_value(&self, tag: NodeTag) -> Result<Dispatch> {
        self.post("stopListeningToAnimatedNodeValue", move |m| {
            m.stop_listening_to_animated_node_value(tag)
        })
    }

    /// Start a driver on a value node
    pub fn start_animating_node(
        &self,
        id: DriverId,
        tag: NodeTag,
        config: serde_json::Value,
        end: EndCallback,
    ) -> Result<Dispatch> {
        let config = DriverConfig::from_json(config)?;
        self.post("startAnimatingNode", move |m| m.start_animating_node(id, tag, config, end))
    }

    /// Restart a running driver with a new config
    pub fn update_animation_config(&self, id: DriverId, config: serde_json::Value) -> Result<Dispatch> {
        let config = DriverConfig::from_json(config)?;
        self.post("updateAnimationConfig", move |m| m.update_animation_config(id, config))
    }

    /// Stop a driver; unknown or finished ids are ignored
    pub fn stop_animation(&self, id: DriverId) -> Result<Dispatch> {
        self.post("stopAnimation", move |m| {
            m.stop_animation(id);
            Ok(())
        })
    }

    /// Host went to the background; stop receiving frames
    pub fn on_host_pause(&self) {
        let mut queues = self.inner.queues.lock();
        queues.paused = true;
        if queues.state == BridgeState::Registered {
            queues.state = BridgeState::Idle;
            drop(queues);
            self.inner.scheduler.unregister(self.inner.category(), &self.inner.frame_callback);
            tracing::debug!("animated module paused");
        }
    }

    /// Host came back; resume frames if work is pending
    pub fn on_host_resume(&self) {
        let work = {
            let mut queues = self.inner.queues.lock();
            queues.paused = false;
            queues.active || !queues.operations.is_empty()
        };
        if work {
            self.inner.ensure_registered();
        }
    }

    fn post(
        &self,
        name: &'static str,
        op: impl FnOnce(&mut AnimatedNodesManager) -> Result<()> + Send + 'static,
    ) -> Result<Dispatch> {
        self.dispatch(
            name,
            Emission::Post,
            Box::new(move |m: &mut AnimatedNodesManager| op(m).map(|()| None)),
        )
    }

    fn dispatch(&self, name: &'static str, emission: Emission, op: Operation) -> Result<Dispatch> {
        let inner: &ModuleInner = &self.inner;
        if !inner.begin_apply() {
            if inner.config.log_operations {
                tracing::debug!(operation = name, ?emission, "queue operation");
            }
            inner.queues.lock().operations.push(QueuedOperation { name, emission, op });
            inner.ensure_registered();
            return Ok(Dispatch::Queued);
        }

        let guard = ApplyGuard(inner);

        // Anything queued earlier from another thread goes first
        inner.apply_queued();

        if inner.config.log_operations {
            tracing::debug!(operation = name, ?emission, "execute operation");
        }
        let (result, callbacks) = {
            let mut manager = inner.manager.lock();
            let result = op(&mut *manager);
            inner.queues.lock().active = manager.has_active_animations();
            (result, manager.take_callbacks())
        };

        let outcome = result.map(|update| {
            if let Some(update) = update {
                inner.emit(emission, vec![update]);
            }
            Dispatch::Applied
        });
        callbacks.run();
        drop(guard);

        if inner.queues.lock().active {
            inner.ensure_registered();
        }
        outcome
    }
}

impl ModuleInner {
    fn category(&self) -> CallbackCategory {
        self.config.callback_category
    }

    fn can_apply_now(&self) -> bool {
        let queues = self.queues.lock();
        thread::current().id() == self.owner
            && queues.state != BridgeState::Running
            && !queues.applying
    }

    /// Claim the manager for a synchronous call.
    ///
    /// Fails off the owning thread, inside a tick, and for calls made from
    /// callbacks of another synchronous call.
    fn begin_apply(&self) -> bool {
        let mut queues = self.queues.lock();
        if thread::current().id() != self.owner
            || queues.state == BridgeState::Running
            || queues.applying
        {
            return false;
        }
        queues.applying = true;
        true
    }

    fn ensure_registered(&self) {
        let mut queues = self.queues.lock();
        if queues.paused || queues.state != BridgeState::Idle {
            return;
        }
        queues.state = BridgeState::Registered;
        drop(queues);
        self.scheduler.register(self.category(), self.frame_callback.clone());
    }

    fn emit(&self, emission: Emission, updates: Vec<ViewUpdate>) {
        if updates.is_empty() {
            return;
        }
        tracing::debug!(?emission, count = updates.len(), "emitting animated view writes");
        let block = view_updates_block(updates);
        match emission {
            Emission::Pre => self.sink.enqueue_first(block),
            Emission::Post => self.sink.enqueue(block),
        }
    }

    fn take_queued(&self) -> Vec<QueuedOperation> {
        std::mem::take(&mut self.queues.lock().operations)
    }

    /// Apply queued operations in arrival order, returning their (pre, post) writes
    fn run_queued(
        &self,
        manager: &mut AnimatedNodesManager,
        operations: Vec<QueuedOperation>,
    ) -> (Vec<ViewUpdate>, Vec<ViewUpdate>) {
        let mut pre_updates = Vec::new();
        let mut post_updates = Vec::new();
        for QueuedOperation { name, emission, op } in operations {
            if self.config.log_operations {
                tracing::debug!(operation = name, ?emission, "execute queued operation");
            }
            match op(&mut *manager) {
                Ok(Some(update)) => match emission {
                    Emission::Pre => pre_updates.push(update),
                    Emission::Post => post_updates.push(update),
                },
                Ok(None) => {}
                Err(err) => tracing::warn!(operation = name, %err, "queued animated operation failed"),
            }
        }
        (pre_updates, post_updates)
    }

    fn apply_queued(&self) {
        let operations = self.take_queued();
        if operations.is_empty() {
            return;
        }
        let (pre_updates, post_updates, callbacks) = {
            let mut manager = self.manager.lock();
            let (pre_updates, post_updates) = self.run_queued(&mut manager, operations);
            self.queues.lock().active = manager.has_active_animations();
            (pre_updates, post_updates, manager.take_callbacks())
        };
        self.emit(Emission::Pre, pre_updates);
        self.emit(Emission::Post, post_updates);
        callbacks.run();
    }

    fn do_frame(&self, frame_time: u64) {
        {
            let mut queues = self.queues.lock();
            if queues.paused {
                queues.state = BridgeState::Idle;
                return;
            }
            queues.state = BridgeState::Running;
        }

        let _guard = TickGuard(self);

        let operations = self.take_queued();
        let (pre_updates, mut post_updates, active, callbacks) = {
            let mut manager = self.manager.lock();
            let (pre_updates, mut post_updates) = self.run_queued(&mut manager, operations);
            if manager.has_active_animations() {
                post_updates.extend(manager.run_updates(frame_time));
            }
            let active = manager.has_active_animations();
            (pre_updates, post_updates, active, manager.take_callbacks())
        };
        post_updates.retain(|update| !update.props.is_empty());
        self.emit(Emission::Pre, pre_updates);
        self.emit(Emission::Post, post_updates);
        callbacks.run();

        let register = {
            let mut queues = self.queues.lock();
            queues.active = active;
            let work = active || !queues.operations.is_empty();
            queues.state = if work && !queues.paused {
                BridgeState::Registered
            } else {
                BridgeState::Idle
            };
            queues.state == BridgeState::Registered
        };
        if register {
            self.scheduler.register(self.category(), self.frame_callback.clone());
        }
    }
}

fn parse_node_config(config: serde_json::Value) -> Result<NodeConfig> {
    serde_json::from_value(config).map_err(|e| AnimatedError::InvalidConfig(e.to_string()))
}

impl fmt::Debug for AnimatedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimatedModule")
            .field("state", &self.state())
            .field("pending_operations", &self.pending_operations())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualFrameSignal;
    use crate::sink::{BatchedViewQueue, ViewRegistry};
    use ordoplay_animated_graph::{GraphError, PropMap, PropValue};
    use serde_json::json;

    const FRAME_NANOS: u64 = 16_666_667;
    const VIEW: ViewTag = ViewTag(1000);

    struct Harness {
        signal: Arc<ManualFrameSignal>,
        queue: Arc<BatchedViewQueue>,
        views: ViewRegistry,
        module: AnimatedModule,
        time: u64,
    }

    impl Harness {
        /// Value(1) -> Style(2) -> Props(3), views start fully opaque
        fn new() -> Self {
            let signal = ManualFrameSignal::new();
            let queue = Arc::new(BatchedViewQueue::new());
            let scheduler = FrameScheduler::new(signal.clone());
            let module = AnimatedModule::new(AnimatedConfig::default(), scheduler, queue.clone());

            let mut views = ViewRegistry::new();
            views.create_view(VIEW, opacity_props(1.0));

            module
                .create_animated_node(NodeTag(1), json!({ "type": "value", "value": 0.0 }))
                .unwrap();
            module
                .create_animated_node(NodeTag(2), json!({ "type": "style", "style": { "opacity": 1 } }))
                .unwrap();
            module
                .create_animated_node(NodeTag(3), json!({ "type": "props", "props": { "style": 2 } }))
                .unwrap();
            module.connect_animated_nodes(NodeTag(1), NodeTag(2)).unwrap();
            module.connect_animated_nodes(NodeTag(2), NodeTag(3)).unwrap();

            Self { signal, queue, views, module, time: 1_000_000_000 }
        }

        fn connected() -> Self {
            let mut harness = Self::new();
            harness.module.connect_animated_node_to_view(NodeTag(3), VIEW).unwrap();
            harness.frame();
            harness
        }

        fn tick(&mut self) -> bool {
            let fired = self.signal.fire(self.time);
            self.time += FRAME_NANOS;
            fired
        }

        fn flush(&mut self) {
            self.queue.flush(&mut self.views);
        }

        fn frame(&mut self) {
            self.tick();
            self.flush();
        }

        fn opacity(&self) -> Option<f64> {
            self.views.prop(VIEW, "opacity")?.as_number()
        }
    }

    fn opacity_props(value: f64) -> PropMap {
        let mut props = PropMap::new();
        props.insert("opacity".to_string(), PropValue::Number(value));
        props
    }

    fn frames(values: &[f64], to_value: f64) -> serde_json::Value {
        json!({ "type": "frames", "frames": values, "toValue": to_value })
    }

    #[test]
    fn test_frames_animation_through_module() {
        let mut h = Harness::connected();
        assert_eq!(h.opacity(), Some(0.0));
        assert_eq!(h.module.state(), BridgeState::Idle);
        assert!(!h.signal.is_subscribed());

        let (end, mut rx) = EndCallback::channel();
        let samples = [0.0, 0.2, 0.4, 0.6, 0.8, 1.0];
        let dispatch = h
            .module
            .start_animating_node(DriverId(1), NodeTag(1), frames(&samples, 1.0), end)
            .unwrap();
        assert_eq!(dispatch, Dispatch::Applied);
        assert_eq!(h.module.state(), BridgeState::Registered);

        for expected in samples {
            h.frame();
            assert!((h.opacity().unwrap() - expected).abs() < 1e-12);
            assert!(rx.try_recv().is_err());
        }

        let writes = h.views.write_count();
        h.frame();
        assert!(rx.try_recv().unwrap().finished);
        assert_eq!(h.views.write_count(), writes);
        assert_eq!(h.module.state(), BridgeState::Idle);
        assert!(!h.tick());
    }

    #[test]
    fn test_post_path_follows_ordinary_writes() {
        let mut h = Harness::connected();

        h.queue.update_properties(VIEW, opacity_props(0.3));
        h.module.set_animated_node_value(NodeTag(1), 0.6).unwrap();
        h.frame();
        assert_eq!(h.opacity(), Some(0.6));
    }

    #[test]
    fn test_pre_path_precedes_ordinary_writes() {
        let mut h = Harness::connected();

        h.queue.update_properties(VIEW, opacity_props(0.3));
        let dispatch = h.module.disconnect_animated_node_from_view(NodeTag(3), VIEW).unwrap();
        assert_eq!(dispatch, Dispatch::Applied);
        h.flush();
        assert_eq!(h.opacity(), Some(0.3));
    }

    #[test]
    fn test_connect_disconnect_round_trip() {
        let mut h = Harness::new();
        let before = h.views.props(VIEW);

        h.module.connect_animated_node_to_view(NodeTag(3), VIEW).unwrap();
        h.module.set_animated_node_value(NodeTag(1), 0.4).unwrap();
        h.frame();
        assert_eq!(h.opacity(), Some(0.4));

        h.module.disconnect_animated_node_from_view(NodeTag(3), VIEW).unwrap();
        h.flush();
        assert_eq!(h.views.props(VIEW), before);

        // No further writes once detached
        h.module.set_animated_node_value(NodeTag(1), 0.9).unwrap();
        h.frame();
        assert_eq!(h.views.props(VIEW), before);
    }

    #[test]
    fn test_restore_default_values() {
        let mut h = Harness::connected();
        h.module.restore_default_values(NodeTag(3)).unwrap();
        h.flush();
        assert_eq!(h.opacity(), Some(1.0));

        // Missing node is a no-op
        assert_eq!(h.module.restore_default_values(NodeTag(77)).unwrap(), Dispatch::Applied);
        assert!(h.queue.is_empty());
    }

    #[test]
    fn test_synchronous_errors() {
        let h = Harness::new();
        assert!(matches!(
            h.module.create_animated_node(NodeTag(1), json!({ "type": "value", "value": 5 })),
            Err(AnimatedError::Graph(GraphError::DuplicateId(NodeTag(1))))
        ));
        assert!(matches!(
            h.module.connect_animated_nodes(NodeTag(3), NodeTag(1)),
            Err(AnimatedError::Graph(GraphError::CycleDetected { .. }))
        ));
        assert!(matches!(
            h.module.create_animated_node(NodeTag(9), json!({ "type": "tracking" })),
            Err(AnimatedError::InvalidConfig(_))
        ));
        assert!(matches!(
            h.module.start_animating_node(
                DriverId(1),
                NodeTag(1),
                json!({ "type": "spring" }),
                EndCallback::none()
            ),
            Err(AnimatedError::Driver(_))
        ));
        assert_eq!(h.module.stop_animation(DriverId(42)).unwrap(), Dispatch::Applied);
    }

    #[test]
    fn test_off_thread_calls_are_queued() {
        let mut h = Harness::connected();

        let remote = h.module.clone();
        let results = std::thread::spawn(move || {
            (
                remote.set_animated_node_value(NodeTag(1), 0.8).unwrap(),
                remote.drop_animated_node(NodeTag(99)).unwrap(),
            )
        })
        .join()
        .unwrap();
        assert_eq!(results, (Dispatch::Queued, Dispatch::Queued));
        assert_eq!(h.module.pending_operations(), 2);
        assert_eq!(h.module.state(), BridgeState::Registered);
        assert_eq!(h.opacity(), Some(0.0));

        // The failing drop is logged, the write still lands
        h.frame();
        assert_eq!(h.module.pending_operations(), 0);
        assert_eq!(h.opacity(), Some(0.8));
    }

    #[test]
    fn test_mutation_during_tick_waits_for_next_tick() {
        let mut h = Harness::connected();
        let dispatched = Arc::new(Mutex::new(None));

        let module = h.module.clone();
        let record = dispatched.clone();
        let end = EndCallback::new(move |_| {
            *record.lock() = module.set_animated_node_value(NodeTag(1), 0.5).ok();
        });
        h.module
            .start_animating_node(DriverId(1), NodeTag(1), frames(&[1.0], 1.0), end)
            .unwrap();

        h.frame();
        assert_eq!(h.opacity(), Some(1.0));
        h.frame();
        assert_eq!(*dispatched.lock(), Some(Dispatch::Queued));
        assert_eq!(h.opacity(), Some(1.0));
        assert_eq!(h.module.state(), BridgeState::Registered);

        h.frame();
        assert_eq!(h.opacity(), Some(0.5));
    }

    #[test]
    fn test_call_from_synchronous_callback_is_queued() {
        let h = Harness::connected();
        let dispatched = Arc::new(Mutex::new(None));

        let module = h.module.clone();
        let record = dispatched.clone();
        let end = EndCallback::new(move |end| {
            assert!(!end.finished);
            *record.lock() = module
                .start_animating_node(
                    DriverId(2),
                    NodeTag(1),
                    json!({ "type": "frames", "frames": [0.0, 1.0], "toValue": 1.0 }),
                    EndCallback::none(),
                )
                .ok();
        });
        h.module
            .start_animating_node(DriverId(1), NodeTag(1), frames(&[0.0, 1.0], 1.0), end)
            .unwrap();
        h.module.stop_animation(DriverId(1)).unwrap();

        assert_eq!(*dispatched.lock(), Some(Dispatch::Queued));
        assert_eq!(h.module.pending_operations(), 1);
    }

    #[test]
    fn test_host_pause_and_resume() {
        let mut h = Harness::connected();
        h.module
            .start_animating_node(
                DriverId(1),
                NodeTag(1),
                frames(&[0.0, 0.5, 1.0], 1.0),
                EndCallback::none(),
            )
            .unwrap();
        assert!(h.signal.is_subscribed());

        h.module.on_host_pause();
        assert_eq!(h.module.state(), BridgeState::Idle);
        assert!(!h.signal.is_subscribed());
        h.module.set_animated_node_offset(NodeTag(1), 0.1).unwrap();
        assert!(!h.tick());

        h.module.on_host_resume();
        assert_eq!(h.module.state(), BridgeState::Registered);
        h.frame();
        assert_eq!(h.opacity(), Some(0.1));
    }

    #[test]
    fn test_panicking_callback_in_tick_keeps_module_scheduling() {
        let mut h = Harness::connected();

        let remote = h.module.clone();
        let dispatch = std::thread::spawn(move || {
            remote.get_value(NodeTag(1), |_| panic!("reader failure")).unwrap()
        })
        .join()
        .unwrap();
        assert_eq!(dispatch, Dispatch::Queued);

        h.frame();
        assert_eq!(h.module.state(), BridgeState::Idle);

        let dispatch = h.module.set_animated_node_value(NodeTag(1), 0.5).unwrap();
        assert_eq!(dispatch, Dispatch::Applied);
        assert!(h.tick());
        h.flush();
        assert_eq!(h.opacity(), Some(0.5));
    }

    #[test]
    fn test_panicking_callback_keeps_errors_synchronous() {
        let h = Harness::connected();
        let dispatch = h.module.get_value(NodeTag(1), |_| panic!("reader failure")).unwrap();
        assert_eq!(dispatch, Dispatch::Applied);

        assert!(matches!(
            h.module.create_animated_node(NodeTag(1), json!({ "type": "value", "value": 5 })),
            Err(AnimatedError::Graph(GraphError::DuplicateId(NodeTag(1))))
        ));
        assert_eq!(h.module.pending_operations(), 0);
    }

    #[test]
    fn test_callbacks_run_with_manager_released() {
        let mut h = Harness::connected();
        let free = Arc::new(Mutex::new(Vec::new()));

        let callback = |h: &Harness, free: &Arc<Mutex<Vec<bool>>>| {
            let module = h.module.clone();
            let record = free.clone();
            EndCallback::new(move |_| {
                record.lock().push(module.inner.manager.try_lock().is_some());
            })
        };

        // Stopped synchronously
        let end = callback(&h, &free);
        h.module.start_animating_node(DriverId(1), NodeTag(1), frames(&[0.0, 1.0], 1.0), end).unwrap();
        h.module.stop_animation(DriverId(1)).unwrap();

        // Finished inside a tick
        let end = callback(&h, &free);
        h.module.start_animating_node(DriverId(2), NodeTag(1), frames(&[1.0], 1.0), end).unwrap();
        h.frame();
        h.frame();

        assert_eq!(*free.lock(), vec![true, true]);
    }

    #[test]
    fn test_resume_from_another_thread_restarts_drivers() {
        let mut h = Harness::connected();
        h.module
            .start_animating_node(
                DriverId(1),
                NodeTag(1),
                frames(&[0.0, 0.5, 1.0], 1.0),
                EndCallback::none(),
            )
            .unwrap();
        h.frame();
        h.module.on_host_pause();
        assert!(!h.signal.is_subscribed());

        let remote = h.module.clone();
        std::thread::spawn(move || remote.on_host_resume()).join().unwrap();
        assert_eq!(h.module.state(), BridgeState::Registered);

        h.frame();
        assert_eq!(h.opacity(), Some(0.5));
    }

    #[test]
    fn test_get_value_and_listeners() {
        let mut h = Harness::connected();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        h.module
            .start_listening_to_animated_node_value(NodeTag(1), move |v| sink.lock().push(v))
            .unwrap();
        h.module.set_animated_node_value(NodeTag(1), 0.25).unwrap();
        h.frame();
        assert_eq!(*seen.lock(), vec![0.25]);

        let value = Arc::new(Mutex::new(None));
        let out = value.clone();
        h.module.get_value(NodeTag(1), move |v| *out.lock() = Some(v)).unwrap();
        assert_eq!(*value.lock(), Some(0.25));
        assert_eq!(h.module.with_manager(|m| m.get_value(NodeTag(1)).ok()), Some(Some(0.25)));
    }
}
