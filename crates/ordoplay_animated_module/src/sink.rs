// SPDX-License-Identifier: MIT OR Apache-2.0
//! View-mutation sink and view-lookup collaborators.

use ordoplay_animated_graph::{PropMap, PropValue, ViewTag, ViewUpdate};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Unit of work executed by the sink during its flush
pub type UiBlock = Box<dyn FnOnce(&mut dyn ViewLookup) + Send>;

/// Error from applying properties to a view
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    /// The view is gone
    #[error("View [{0}] does not exist")]
    UnknownView(ViewTag),
}

/// Access to live views, only available inside a [`UiBlock`]
pub trait ViewLookup {
    /// Apply a property map to a view
    fn apply_properties(&mut self, view: ViewTag, props: &PropMap) -> Result<(), ViewError>;
}

/// Batched queue of view mutations
pub trait ViewMutationSink: Send + Sync {
    /// Append a unit of work after everything already queued
    fn enqueue(&self, block: UiBlock);

    /// Insert a unit of work ahead of everything already queued
    fn enqueue_first(&self, block: UiBlock);
}

/// Build a unit of work that applies `updates` in order.
///
/// Writes to views that no longer exist are logged and skipped.
pub fn view_updates_block(updates: Vec<ViewUpdate>) -> UiBlock {
    Box::new(move |views: &mut dyn ViewLookup| {
        for update in &updates {
            if let Err(err) = views.apply_properties(update.view, &update.props) {
                tracing::warn!(node = %update.node, view = %update.view, %err, "dropping animated view write");
            }
        }
    })
}

/// In-memory sink flushed explicitly by its owner
#[derive(Default)]
pub struct BatchedViewQueue {
    blocks: Mutex<VecDeque<UiBlock>>,
}

impl BatchedViewQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an ordinary property write
    pub fn update_properties(&self, view: ViewTag, props: PropMap) {
        self.enqueue(Box::new(move |views: &mut dyn ViewLookup| {
            if let Err(err) = views.apply_properties(view, &props) {
                tracing::warn!(%view, %err, "dropping view write");
            }
        }));
    }

    /// Number of queued blocks
    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.blocks.lock().is_empty()
    }

    /// Run every queued block in order, returning how many ran
    pub fn flush(&self, views: &mut dyn ViewLookup) -> usize {
        let blocks = std::mem::take(&mut *self.blocks.lock());
        let count = blocks.len();
        for block in blocks {
            block(views);
        }
        if count > 0 {
            tracing::debug!(count, "flushed view mutations");
        }
        count
    }
}

impl ViewMutationSink for BatchedViewQueue {
    fn enqueue(&self, block: UiBlock) {
        self.blocks.lock().push_back(block);
    }

    fn enqueue_first(&self, block: UiBlock) {
        self.blocks.lock().push_front(block);
    }
}

#[derive(Debug, Clone, Default)]
struct ViewState {
    authored: PropMap,
    applied: PropMap,
}

/// Views keyed by tag, each with authored props and applied overrides.
///
/// A [`PropValue::Null`] write drops the override so the authored value
/// shows through again.
#[derive(Debug, Clone, Default)]
pub struct ViewRegistry {
    views: HashMap<ViewTag, ViewState>,
    writes: usize,
}

impl ViewRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a view with its authored props
    pub fn create_view(&mut self, view: ViewTag, authored: PropMap) {
        self.views.insert(view, ViewState { authored, applied: PropMap::new() });
    }

    /// Remove a view
    pub fn drop_view(&mut self, view: ViewTag) -> bool {
        self.views.remove(&view).is_some()
    }

    /// Current value of a property
    pub fn prop(&self, view: ViewTag, name: &str) -> Option<&PropValue> {
        let state = self.views.get(&view)?;
        state.applied.get(name).or_else(|| state.authored.get(name))
    }

    /// Every current property of a view
    pub fn props(&self, view: ViewTag) -> Option<PropMap> {
        let state = self.views.get(&view)?;
        let mut props = state.authored.clone();
        props.extend(state.applied.iter().map(|(k, v)| (k.clone(), v.clone())));
        Some(props)
    }

    /// Number of successful `apply_properties` calls
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl ViewLookup for ViewRegistry {
    fn apply_properties(&mut self, view: ViewTag, props: &PropMap) -> Result<(), ViewError> {
        let state = self.views.get_mut(&view).ok_or(ViewError::UnknownView(view))?;
        for (name, value) in props {
            if value.is_null() {
                state.applied.shift_remove(name);
            } else {
                state.applied.insert(name.clone(), value.clone());
            }
        }
        self.writes += 1;
        Ok(())
    }
}
