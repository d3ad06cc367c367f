// SPDX-License-Identifier: MIT OR Apache-2.0
//! Arena-backed graph of animated nodes and their edges.

use crate::connection::{ViewConnection, ViewTag, ViewUpdate};
use crate::node::{AnimatedNode, NodeConfig, NodeKey, NodeKind, NodeTag, NodeType, ValueNode};
use crate::value::null_props;
use std::collections::HashMap;

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<AnimatedNode>,
}

/// A directed acyclic graph of animated nodes.
///
/// Nodes live in generation-checked slots; freed slots are reused through a
/// free list. `connect(parent, child)` feeds the parent's output into the
/// child, so a child is recomputed only after all of its parents.
#[derive(Debug, Clone, Default)]
pub struct AnimatedGraph {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    tags: HashMap<NodeTag, NodeKey>,
    views: HashMap<ViewTag, NodeTag>,
    pub(crate) bfs_color: u32,
}

impl AnimatedGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node under a caller-chosen tag
    pub fn create_node(&mut self, tag: NodeTag, config: NodeConfig) -> Result<NodeKey> {
        if self.tags.contains_key(&tag) {
            return Err(GraphError::DuplicateId(tag));
        }
        let kind = NodeKind::from_config(config).map_err(GraphError::InvalidConfig)?;
        let node = AnimatedNode::new(tag, kind);

        let key = if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.node = Some(node);
            NodeKey { index, generation: slot.generation }
        } else {
            let index = u32::try_from(self.slots.len())
                .map_err(|_| GraphError::InvalidConfig("node arena is full".to_string()))?;
            self.slots.push(Slot { generation: 0, node: Some(node) });
            NodeKey { index, generation: 0 }
        };

        self.tags.insert(tag, key);
        tracing::debug!(%tag, ?key, "created animated node");
        Ok(key)
    }

    /// Replace the data of a node whose type supports reconfiguration
    pub fn update_node_config(&mut self, tag: NodeTag, config: NodeConfig) -> Result<()> {
        let node = self.node_by_tag_mut(tag)?;
        let current = node.node_type();
        if current != NodeType::Interpolation {
            return Err(GraphError::WrongNodeType { tag, expected: NodeType::Interpolation });
        }
        if config.node_type() != current {
            return Err(GraphError::InvalidConfig(format!(
                "cannot change node {tag} from {current} to {}",
                config.node_type()
            )));
        }
        node.kind = NodeKind::from_config(config).map_err(GraphError::InvalidConfig)?;
        Ok(())
    }

    /// Drop a detached node
    pub fn drop_node(&mut self, tag: NodeTag) -> Result<AnimatedNode> {
        let key = self.key(tag)?;
        let node = self.node(key);
        if node.has_edges() || node.view().is_some() {
            return Err(GraphError::NodeInUse(tag));
        }

        self.tags.remove(&tag);
        let slot = &mut self.slots[key.index as usize];
        self.free_list.push(key.index);
        tracing::debug!(%tag, "dropped animated node");
        slot.node.take().ok_or(GraphError::UnknownNode(tag))
    }

    /// Feed `parent`'s output into `child`
    pub fn connect(&mut self, parent: NodeTag, child: NodeTag) -> Result<()> {
        let parent_key = self.key(parent)?;
        let child_key = self.key(child)?;

        if parent_key == child_key || self.reaches(child_key, parent_key) {
            return Err(GraphError::CycleDetected { parent, child });
        }
        if self.node(parent_key).children.contains(&child_key) {
            return Ok(());
        }

        self.node_mut(parent_key).children.push(child_key);
        self.node_mut(child_key).parents.push(parent_key);
        tracing::debug!(%parent, %child, "connected animated nodes");
        Ok(())
    }

    /// Remove the edge from `parent` to `child`, if present
    pub fn disconnect(&mut self, parent: NodeTag, child: NodeTag) -> Result<()> {
        let parent_key = self.key(parent)?;
        let child_key = self.key(child)?;

        self.node_mut(parent_key).children.retain(|&k| k != child_key);
        self.node_mut(child_key).parents.retain(|&k| k != parent_key);
        tracing::debug!(%parent, %child, "disconnected animated nodes");
        Ok(())
    }

    /// Attach a props node to a view
    pub fn connect_to_view(&mut self, tag: NodeTag, view: ViewTag) -> Result<()> {
        if let Some(&owner) = self.views.get(&view) {
            if owner == tag {
                return Ok(());
            }
            return Err(GraphError::ViewAlreadyConnected { view, node: owner });
        }

        let node = self.node_by_tag_mut(tag)?;
        let NodeKind::Props(props) = &mut node.kind else {
            return Err(GraphError::WrongNodeType { tag, expected: NodeType::Props });
        };
        if let Some(existing) = props.view {
            return Err(GraphError::AlreadyConnectedToView { node: tag, view: existing });
        }
        props.view = Some(view);
        self.views.insert(view, tag);
        tracing::debug!(%tag, %view, "connected props node to view");
        Ok(())
    }

    /// Detach a props node from its view, returning the write that restores
    /// the view's authored values
    pub fn disconnect_from_view(&mut self, tag: NodeTag, view: ViewTag) -> Result<ViewUpdate> {
        let node = self.node_by_tag_mut(tag)?;
        let NodeKind::Props(props) = &mut node.kind else {
            return Err(GraphError::WrongNodeType { tag, expected: NodeType::Props });
        };
        if props.view != Some(view) {
            return Err(GraphError::NotConnectedToView { node: tag, view });
        }

        props.view = None;
        let restore = null_props(&props.map.computed);
        props.map.computed.clear();
        self.views.remove(&view);
        tracing::debug!(%tag, %view, "disconnected props node from view");
        Ok(ViewUpdate::new(ViewConnection { node: tag, view }, restore))
    }

    /// Write that resets every property a props node controls.
    ///
    /// Returns `None` if the node is gone or not attached; it never reached a
    /// view in that case.
    pub fn restore_defaults(&self, tag: NodeTag) -> Result<Option<ViewUpdate>> {
        let Ok(key) = self.key(tag) else {
            return Ok(None);
        };
        let NodeKind::Props(props) = &self.node(key).kind else {
            return Err(GraphError::WrongNodeType { tag, expected: NodeType::Props });
        };
        Ok(props.view.map(|view| {
            ViewUpdate::new(ViewConnection { node: tag, view }, null_props(&props.map.computed))
        }))
    }

    /// Whether a node with this tag is live
    pub fn contains(&self, tag: NodeTag) -> bool {
        self.tags.contains_key(&tag)
    }

    /// Get a node by tag
    pub fn get(&self, tag: NodeTag) -> Option<&AnimatedNode> {
        self.tags.get(&tag).map(|&key| self.node(key))
    }

    /// Resolve a tag to its slot handle
    pub fn key(&self, tag: NodeTag) -> Result<NodeKey> {
        self.tags.get(&tag).copied().ok_or(GraphError::UnknownNode(tag))
    }

    /// Get a value node for writing
    pub fn value_node_mut(&mut self, tag: NodeTag) -> Result<&mut ValueNode> {
        match &mut self.node_by_tag_mut(tag)?.kind {
            NodeKind::Value(value) => Ok(value),
            _ => Err(GraphError::WrongNodeType { tag, expected: NodeType::Value }),
        }
    }

    /// Get a value node for reading
    pub fn value_node(&self, tag: NodeTag) -> Result<&ValueNode> {
        let node = self.get(tag).ok_or(GraphError::UnknownNode(tag))?;
        match &node.kind {
            NodeKind::Value(value) => Ok(value),
            _ => Err(GraphError::WrongNodeType { tag, expected: NodeType::Value }),
        }
    }

    /// Props node attached to a view
    pub fn view_owner(&self, view: ViewTag) -> Option<NodeTag> {
        self.views.get(&view).copied()
    }

    /// Get the number of live nodes
    pub fn node_count(&self) -> usize {
        self.tags.len()
    }

    /// Tags of the nodes fed by `tag`
    pub fn children_of(&self, tag: NodeTag) -> Result<Vec<NodeTag>> {
        let key = self.key(tag)?;
        Ok(self.node(key).children.iter().map(|&k| self.node(k).tag).collect())
    }

    /// Tags of the nodes feeding `tag`
    pub fn parents_of(&self, tag: NodeTag) -> Result<Vec<NodeTag>> {
        let key = self.key(tag)?;
        Ok(self.node(key).parents.iter().map(|&k| self.node(k).tag).collect())
    }

    /// Whether `target` is reachable from `start` along child edges.
    ///
    /// Visits each live node at most once.
    fn reaches(&self, start: NodeKey, target: NodeKey) -> bool {
        let mut visited = vec![false; self.slots.len()];
        let mut stack = vec![start];
        while let Some(key) = stack.pop() {
            if key == target {
                return true;
            }
            let seen = &mut visited[key.index as usize];
            if *seen {
                continue;
            }
            *seen = true;
            stack.extend(self.node(key).children.iter().copied());
        }
        false
    }

    fn node_by_tag_mut(&mut self, tag: NodeTag) -> Result<&mut AnimatedNode> {
        let key = self.key(tag)?;
        Ok(self.node_mut(key))
    }

    /// Get a node by handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale; edges never outlive their nodes.
    pub fn node(&self, key: NodeKey) -> &AnimatedNode {
        match self.slots.get(key.index as usize) {
            Some(Slot { generation, node: Some(node) }) if *generation == key.generation => node,
            _ => panic!("animated graph holds a stale node handle {key:?}"),
        }
    }

    pub(crate) fn node_mut(&mut self, key: NodeKey) -> &mut AnimatedNode {
        match self.slots.get_mut(key.index as usize) {
            Some(Slot { generation, node: Some(node) }) if *generation == key.generation => node,
            _ => panic!("animated graph holds a stale node handle {key:?}"),
        }
    }
}

/// Error from a graph mutation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// Tag already in use
    #[error("Animated node [{0}] already exists")]
    DuplicateId(NodeTag),

    /// Tag not live
    #[error("Animated node [{0}] does not exist")]
    UnknownNode(NodeTag),

    /// Edge would close a cycle
    #[error("Connecting [{parent}] -> [{child}] would create a cycle")]
    CycleDetected {
        /// Requested parent
        parent: NodeTag,
        /// Requested child
        child: NodeTag,
    },

    /// Node still has edges, a view, or a driver
    #[error("Animated node [{0}] is still connected or animated")]
    NodeInUse(NodeTag),

    /// Operation requires a different node type
    #[error("Animated node [{tag}] should be of type {expected}")]
    WrongNodeType {
        /// Offending node
        tag: NodeTag,
        /// Required type
        expected: NodeType,
    },

    /// Config rejected
    #[error("Invalid node config: {0}")]
    InvalidConfig(String),

    /// Another props node already drives this view
    #[error("View [{view}] is already driven by animated node [{node}]")]
    ViewAlreadyConnected {
        /// Contested view
        view: ViewTag,
        /// Current owner
        node: NodeTag,
    },

    /// Props node already drives a different view
    #[error("Animated node [{node}] is already connected to view [{view}]")]
    AlreadyConnectedToView {
        /// Props node
        node: NodeTag,
        /// View it drives
        view: ViewTag,
    },

    /// Props node does not drive this view
    #[error("Animated node [{node}] is not connected to view [{view}]")]
    NotConnectedToView {
        /// Props node
        node: NodeTag,
        /// Requested view
        view: ViewTag,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::MappingEntry;
    use indexmap::IndexMap;

    fn style(entries: &[(&str, u32)]) -> NodeConfig {
        NodeConfig::Style {
            style: entries
                .iter()
                .map(|(k, v)| (k.to_string(), MappingEntry::Node(NodeTag(*v))))
                .collect(),
        }
    }

    fn props(style_tag: u32) -> NodeConfig {
        let mut props = IndexMap::new();
        props.insert("style".to_string(), MappingEntry::Node(NodeTag(style_tag)));
        NodeConfig::Props { props }
    }

    #[test]
    fn test_duplicate_and_unknown() {
        let mut graph = AnimatedGraph::new();
        graph.create_node(NodeTag(1), NodeConfig::value(0.0)).unwrap();
        assert_eq!(
            graph.create_node(NodeTag(1), NodeConfig::value(1.0)),
            Err(GraphError::DuplicateId(NodeTag(1)))
        );
        assert_eq!(graph.value_node(NodeTag(1)).unwrap().value, 0.0);
        assert_eq!(
            graph.connect(NodeTag(1), NodeTag(9)),
            Err(GraphError::UnknownNode(NodeTag(9)))
        );
        assert_eq!(
            graph.disconnect(NodeTag(9), NodeTag(1)),
            Err(GraphError::UnknownNode(NodeTag(9)))
        );
    }

    #[test]
    fn test_cycles_rejected() {
        let mut graph = AnimatedGraph::new();
        for tag in 1..=3 {
            graph.create_node(NodeTag(tag), NodeConfig::value(0.0)).unwrap();
        }
        graph.connect(NodeTag(1), NodeTag(2)).unwrap();
        graph.connect(NodeTag(2), NodeTag(3)).unwrap();

        assert_eq!(
            graph.connect(NodeTag(3), NodeTag(1)),
            Err(GraphError::CycleDetected { parent: NodeTag(3), child: NodeTag(1) })
        );
        assert_eq!(
            graph.connect(NodeTag(2), NodeTag(2)),
            Err(GraphError::CycleDetected { parent: NodeTag(2), child: NodeTag(2) })
        );
        assert_eq!(graph.children_of(NodeTag(3)).unwrap(), Vec::<NodeTag>::new());
        assert_eq!(graph.parents_of(NodeTag(1)).unwrap(), Vec::<NodeTag>::new());

        // A diamond is fine
        graph.connect(NodeTag(1), NodeTag(3)).unwrap();
        assert_eq!(graph.parents_of(NodeTag(3)).unwrap(), vec![NodeTag(2), NodeTag(1)]);
    }

    #[test]
    fn test_drop_requires_detached_node() {
        let mut graph = AnimatedGraph::new();
        graph.create_node(NodeTag(1), NodeConfig::value(0.0)).unwrap();
        graph.create_node(NodeTag(2), style(&[("opacity", 1)])).unwrap();
        graph.connect(NodeTag(1), NodeTag(2)).unwrap();

        assert_eq!(graph.drop_node(NodeTag(1)).err(), Some(GraphError::NodeInUse(NodeTag(1))));
        assert_eq!(graph.drop_node(NodeTag(2)).err(), Some(GraphError::NodeInUse(NodeTag(2))));

        graph.disconnect(NodeTag(1), NodeTag(2)).unwrap();
        let dropped = graph.drop_node(NodeTag(1)).unwrap();
        assert_eq!(dropped.tag, NodeTag(1));
        assert!(!graph.contains(NodeTag(1)));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut graph = AnimatedGraph::new();
        let first = graph.create_node(NodeTag(1), NodeConfig::value(0.0)).unwrap();
        graph.drop_node(NodeTag(1)).unwrap();
        let second = graph.create_node(NodeTag(2), NodeConfig::value(0.0)).unwrap();

        assert_eq!(first.index(), second.index());
        assert_ne!(first.generation(), second.generation());
        assert_eq!(graph.node(second).tag, NodeTag(2));
    }

    #[test]
    #[should_panic(expected = "stale node handle")]
    fn test_stale_handle_panics() {
        let mut graph = AnimatedGraph::new();
        let first = graph.create_node(NodeTag(1), NodeConfig::value(0.0)).unwrap();
        graph.drop_node(NodeTag(1)).unwrap();
        graph.create_node(NodeTag(2), NodeConfig::value(0.0)).unwrap();
        let _ = graph.node(first);
    }

    #[test]
    fn test_view_connections() {
        let mut graph = AnimatedGraph::new();
        graph.create_node(NodeTag(1), NodeConfig::value(0.0)).unwrap();
        graph.create_node(NodeTag(2), style(&[("opacity", 1)])).unwrap();
        graph.create_node(NodeTag(3), props(2)).unwrap();
        graph.create_node(NodeTag(4), props(2)).unwrap();

        assert_eq!(
            graph.connect_to_view(NodeTag(1), ViewTag(100)),
            Err(GraphError::WrongNodeType { tag: NodeTag(1), expected: NodeType::Props })
        );

        graph.connect_to_view(NodeTag(3), ViewTag(100)).unwrap();
        graph.connect_to_view(NodeTag(3), ViewTag(100)).unwrap();
        assert_eq!(graph.view_owner(ViewTag(100)), Some(NodeTag(3)));
        assert_eq!(
            graph.connect_to_view(NodeTag(4), ViewTag(100)),
            Err(GraphError::ViewAlreadyConnected { view: ViewTag(100), node: NodeTag(3) })
        );
        assert_eq!(
            graph.connect_to_view(NodeTag(3), ViewTag(101)),
            Err(GraphError::AlreadyConnectedToView { node: NodeTag(3), view: ViewTag(100) })
        );
        assert_eq!(graph.drop_node(NodeTag(3)).err(), Some(GraphError::NodeInUse(NodeTag(3))));

        assert_eq!(
            graph.disconnect_from_view(NodeTag(3), ViewTag(101)),
            Err(GraphError::NotConnectedToView { node: NodeTag(3), view: ViewTag(101) })
        );
        let restore = graph.disconnect_from_view(NodeTag(3), ViewTag(100)).unwrap();
        assert_eq!(restore.view, ViewTag(100));
        assert_eq!(graph.view_owner(ViewTag(100)), None);
        graph.connect_to_view(NodeTag(4), ViewTag(100)).unwrap();
    }

    #[test]
    fn test_restore_defaults_of_missing_node() {
        let graph = AnimatedGraph::new();
        assert_eq!(graph.restore_defaults(NodeTag(7)), Ok(None));
    }

    #[test]
    fn test_interpolation_reconfigure() {
        let mut graph = AnimatedGraph::new();
        graph.create_node(NodeTag(1), NodeConfig::value(0.0)).unwrap();
        graph
            .create_node(
                NodeTag(2),
                NodeConfig::Interpolation(crate::InterpolationConfig::new(
                    vec![0.0, 1.0],
                    vec![0.0, 1.0],
                )),
            )
            .unwrap();

        let updated = crate::InterpolationConfig::new(vec![0.0, 1.0], vec![5.0, 6.0]);
        graph
            .update_node_config(NodeTag(2), NodeConfig::Interpolation(updated.clone()))
            .unwrap();
        match &graph.get(NodeTag(2)).unwrap().kind {
            NodeKind::Interpolation { config, .. } => assert_eq!(config, &updated),
            other => panic!("unexpected kind {other:?}"),
        }

        assert_eq!(
            graph.update_node_config(NodeTag(1), NodeConfig::value(3.0)),
            Err(GraphError::WrongNodeType { tag: NodeTag(1), expected: NodeType::Interpolation })
        );
        assert!(matches!(
            graph.update_node_config(NodeTag(2), NodeConfig::value(3.0)),
            Err(GraphError::InvalidConfig(_))
        ));
    }
}
