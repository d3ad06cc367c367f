// SPDX-License-Identifier: MIT OR Apache-2.0
//! Topological propagation of dirtied nodes.
//!
//! A pass runs two breadth-first walks over the graph. The first starts at the
//! dirtied nodes and counts, for every reachable node, how many of its parents
//! are part of this pass. The second walks the same sub-graph in topological
//! order: a node is queued only once all of its active parents have been
//! recomputed. Each walk marks visited nodes with a fresh color so no
//! "visited" state has to be cleared between passes.

use crate::connection::{ViewConnection, ViewUpdate};
use crate::graph::AnimatedGraph;
use crate::node::{
    MappingNode, MathOp, NodeKey, NodeKind, NodeTag, TransformEntry, INITIAL_BFS_COLOR,
};
use crate::value::{MappingEntry, PropMap, PropValue};
use std::collections::VecDeque;

/// Result of one propagation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Propagation {
    /// Nodes in the order they were recomputed
    pub order: Vec<NodeTag>,
    /// Value nodes reached by the pass, with their output
    pub value_updates: Vec<(NodeTag, f64)>,
    /// Writes for props nodes attached to views
    pub view_updates: Vec<ViewUpdate>,
}

impl Propagation {
    /// Whether the pass recomputed nothing
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// New state computed for a node
#[derive(Debug, Clone)]
enum NodeOutput {
    Scalar(f64),
    DiffClamp { last_input: f64, value: f64 },
    Map(PropMap),
    Unchanged,
}

impl AnimatedGraph {
    /// Recompute every node reachable from `roots`, in topological order
    pub fn propagate(&mut self, roots: &[NodeTag]) -> Propagation {
        let roots: Vec<NodeKey> = roots
            .iter()
            .filter_map(|tag| match self.key(*tag) {
                Ok(key) => Some(key),
                Err(_) => {
                    tracing::warn!(%tag, "skipping dirtied node that no longer exists");
                    None
                }
            })
            .collect();

        let mut pass = Propagation::default();
        if roots.is_empty() {
            return pass;
        }

        // Step 1: count active parents for every node reachable from the roots
        let color = self.next_color();
        let mut active_nodes = 0usize;
        let mut queue = VecDeque::new();
        for &key in &roots {
            let node = self.node_mut(key);
            if node.bfs_color != color {
                node.bfs_color = color;
                active_nodes += 1;
                queue.push_back(key);
            }
        }
        while let Some(key) = queue.pop_front() {
            let children = self.node(key).children.clone();
            for child_key in children {
                let child = self.node_mut(child_key);
                child.active_incoming += 1;
                if child.bfs_color != color {
                    child.bfs_color = color;
                    active_nodes += 1;
                    queue.push_back(child_key);
                }
            }
        }

        // Step 2: recompute in topological order, starting from roots with no active parent
        let color = self.next_color();
        for &key in &roots {
            let node = self.node_mut(key);
            if node.active_incoming == 0 && node.bfs_color != color {
                node.bfs_color = color;
                queue.push_back(key);
            }
        }

        let mut cycles = 0usize;
        while let Some(key) = queue.pop_front() {
            self.recompute(key, &mut pass);

            let children = self.node(key).children.clone();
            for child_key in children {
                let child = self.node_mut(child_key);
                child.active_incoming -= 1;
                if child.bfs_color != color && child.active_incoming == 0 {
                    child.bfs_color = color;
                    queue.push_back(child_key);
                } else if child.bfs_color == color {
                    cycles += 1;
                }
            }
        }

        if active_nodes != pass.order.len() {
            for &key in &roots {
                let node = self.node(key);
                tracing::error!(tag = %node.tag, children = node.child_count(), "propagation root");
            }
            panic!(
                "animated graph is inconsistent: {active_nodes} active nodes but topological \
                 walk visited {} ({cycles} back edges)",
                pass.order.len()
            );
        }

        pass
    }

    fn next_color(&mut self) -> u32 {
        self.bfs_color = self.bfs_color.wrapping_add(1);
        if self.bfs_color == INITIAL_BFS_COLOR {
            self.bfs_color = self.bfs_color.wrapping_add(1);
        }
        self.bfs_color
    }

    fn recompute(&mut self, key: NodeKey, pass: &mut Propagation) {
        let output = self.evaluate(key);
        let node = self.node_mut(key);
        let tag = node.tag;
        pass.order.push(tag);

        match (&mut node.kind, output) {
            (NodeKind::Value(value), _) => pass.value_updates.push((tag, value.output())),
            (
                NodeKind::Interpolation { value, .. }
                | NodeKind::Math { value, .. }
                | NodeKind::Modulus { value, .. },
                NodeOutput::Scalar(next),
            ) => *value = next,
            (
                NodeKind::DiffClamp { last_input, value, .. },
                NodeOutput::DiffClamp { last_input: input, value: next },
            ) => {
                *last_input = input;
                *value = next;
            }
            (NodeKind::Style(style), NodeOutput::Map(props)) => style.computed = props,
            (NodeKind::Transform(transform), NodeOutput::Map(props)) => transform.computed = props,
            (NodeKind::Props(node), NodeOutput::Map(props)) => {
                node.map.computed = props;
                if let Some(view) = node.view {
                    pass.view_updates.push(ViewUpdate::new(
                        ViewConnection { node: tag, view },
                        node.map.computed.clone(),
                    ));
                }
            }
            _ => {}
        }
    }

    /// Compute a node's next state from its parents and referenced nodes
    fn evaluate(&self, key: NodeKey) -> NodeOutput {
        let node = self.node(key);
        match &node.kind {
            NodeKind::Value(_) => NodeOutput::Unchanged,
            NodeKind::Interpolation { config, .. } => {
                let input = node
                    .parents
                    .first()
                    .and_then(|&parent| self.node(parent).kind.scalar());
                match input {
                    Some(x) => NodeOutput::Scalar(config.interpolate(x)),
                    None => {
                        tracing::warn!(tag = %node.tag, "interpolation node has no scalar parent");
                        NodeOutput::Unchanged
                    }
                }
            }
            NodeKind::Math { op, input, .. } => {
                let mut values = input.iter().filter_map(|&tag| self.scalar_of(node.tag, tag));
                let Some(first) = values.next() else {
                    return NodeOutput::Unchanged;
                };
                let result = values.fold(first, |acc, v| match op {
                    MathOp::Add => acc + v,
                    MathOp::Subtract => acc - v,
                    MathOp::Multiply => acc * v,
                    MathOp::Divide => {
                        if v == 0.0 {
                            tracing::warn!(tag = %node.tag, "division by zero skipped");
                            acc
                        } else {
                            acc / v
                        }
                    }
                });
                NodeOutput::Scalar(result)
            }
            NodeKind::Modulus { input, modulus, .. } => match self.scalar_of(node.tag, *input) {
                Some(a) => NodeOutput::Scalar(((a % modulus) + modulus) % modulus),
                None => NodeOutput::Unchanged,
            },
            NodeKind::DiffClamp { input, min, max, last_input, value } => {
                match self.scalar_of(node.tag, *input) {
                    Some(current) => NodeOutput::DiffClamp {
                        last_input: current,
                        value: (value + (current - last_input)).clamp(*min, *max),
                    },
                    None => NodeOutput::Unchanged,
                }
            }
            NodeKind::Transform(transform) => {
                NodeOutput::Map(self.collect_transforms(node.tag, &transform.transforms))
            }
            NodeKind::Style(style) => NodeOutput::Map(self.collect_mapping(node.tag, style, false)),
            NodeKind::Props(props) => {
                NodeOutput::Map(self.collect_mapping(node.tag, &props.map, true))
            }
        }
    }

    fn collect_mapping(&self, owner: NodeTag, mapping: &MappingNode, flatten_maps: bool) -> PropMap {
        let mut out = PropMap::new();
        for (name, entry) in &mapping.mapping {
            match entry {
                MappingEntry::Literal { value } => {
                    out.insert(name.clone(), value.clone());
                }
                MappingEntry::Node(tag) => {
                    let Some(referenced) = self.get(*tag) else {
                        tracing::warn!(%owner, %tag, property = %name, "mapping references a missing node");
                        continue;
                    };
                    if let Some(value) = referenced.kind.scalar() {
                        out.insert(name.clone(), PropValue::Number(value));
                    } else if let NodeKind::Transform(transform) = &referenced.kind {
                        out.extend(transform.computed.iter().map(|(k, v)| (k.clone(), v.clone())));
                    } else if let (true, Some(map)) = (flatten_maps, referenced.kind.props()) {
                        out.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
                    } else {
                        tracing::warn!(%owner, %tag, property = %name, "mapping references a node without a usable value");
                    }
                }
            }
        }
        out
    }

    /// `{ "transform": [{ property: value }, ...] }` in config order
    fn collect_transforms(&self, owner: NodeTag, transforms: &[TransformEntry]) -> PropMap {
        let mut list = Vec::with_capacity(transforms.len());
        for entry in transforms {
            let value = match entry {
                TransformEntry::Static { value, .. } => *value,
                TransformEntry::Animated { node_tag, .. } => {
                    let Some(value) = self.scalar_of(owner, *node_tag) else {
                        continue;
                    };
                    value
                }
            };
            let mut op = PropMap::new();
            op.insert(entry.property().to_string(), PropValue::Number(value));
            list.push(op);
        }
        let mut out = PropMap::new();
        out.insert("transform".to_string(), PropValue::List(list));
        out
    }

    fn scalar_of(&self, owner: NodeTag, tag: NodeTag) -> Option<f64> {
        let value = self.get(tag).and_then(|node| node.kind.scalar());
        if value.is_none() {
            tracing::warn!(%owner, %tag, "input is missing or not a scalar node");
        }
        value
    }
}
