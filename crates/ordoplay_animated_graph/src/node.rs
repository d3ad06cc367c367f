// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the animated graph.

use crate::interpolation::InterpolationConfig;
use crate::value::{MappingEntry, PropMap};
use crate::connection::ViewTag;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-chosen identifier for a node
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeTag(pub u32);

impl fmt::Debug for NodeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeTag({})", self.0)
    }
}

impl fmt::Display for NodeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a node slot in an [`AnimatedGraph`](crate::AnimatedGraph).
///
/// Carries the slot generation so a handle that outlived its node is caught
/// instead of silently reading whatever reuses the slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeKey {
    /// Returns the raw slot index (for diagnostics only).
    pub fn index(self) -> u32 {
        self.index
    }

    /// Returns the generation counter.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeKey({}@gen{})", self.index, self.generation)
    }
}

/// Node type category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Scalar written by drivers or callers
    Value,
    /// Style aggregator
    Style,
    /// Props aggregator, attachable to a view
    Props,
    /// Ordered transform list, spread into a style
    Transform,
    /// Breakpoint interpolation
    Interpolation,
    /// Sum of inputs
    Addition,
    /// Left-folded difference of inputs
    Subtraction,
    /// Product of inputs
    Multiplication,
    /// Left-folded quotient of inputs
    Division,
    /// Non-negative remainder
    Modulus,
    /// Clamped accumulation of input deltas
    DiffClamp,
}

impl NodeType {
    /// Get the name used in configs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Style => "style",
            Self::Props => "props",
            Self::Transform => "transform",
            Self::Interpolation => "interpolation",
            Self::Addition => "addition",
            Self::Subtraction => "subtraction",
            Self::Multiplication => "multiplication",
            Self::Division => "division",
            Self::Modulus => "modulus",
            Self::DiffClamp => "diffclamp",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration used to create a node, tagged by `"type"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeConfig {
    /// Scalar value node
    Value {
        /// Initial value
        #[serde(default)]
        value: f64,
        /// Initial offset
        #[serde(default)]
        offset: f64,
    },
    /// Style node mapping property names to nodes or literals
    Style {
        /// Property mapping
        style: IndexMap<String, MappingEntry>,
    },
    /// Props node mapping property names to style nodes, value nodes or literals
    Props {
        /// Property mapping
        props: IndexMap<String, MappingEntry>,
    },
    /// Ordered transform operations read from nodes or literals
    Transform {
        /// Operations in application order
        transforms: Vec<TransformEntry>,
    },
    /// Interpolation of its single parent
    Interpolation(InterpolationConfig),
    /// Sum of the listed nodes
    Addition {
        /// Input node tags
        input: Vec<NodeTag>,
    },
    /// First listed node minus the rest
    Subtraction {
        /// Input node tags
        input: Vec<NodeTag>,
    },
    /// Product of the listed nodes
    Multiplication {
        /// Input node tags
        input: Vec<NodeTag>,
    },
    /// First listed node divided by the rest
    Division {
        /// Input node tags
        input: Vec<NodeTag>,
    },
    /// `input` modulo `modulus`, always non-negative
    Modulus {
        /// Input node tag
        input: NodeTag,
        /// Divisor
        modulus: f64,
    },
    /// Input deltas accumulated and clamped to `[min, max]`
    #[serde(rename = "diffclamp")]
    DiffClamp {
        /// Input node tag
        input: NodeTag,
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
    },
}

impl NodeConfig {
    /// Create a value node config
    pub fn value(value: f64) -> Self {
        Self::Value { value, offset: 0.0 }
    }

    /// The node type this config creates
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Value { .. } => NodeType::Value,
            Self::Style { .. } => NodeType::Style,
            Self::Props { .. } => NodeType::Props,
            Self::Transform { .. } => NodeType::Transform,
            Self::Interpolation(_) => NodeType::Interpolation,
            Self::Addition { .. } => NodeType::Addition,
            Self::Subtraction { .. } => NodeType::Subtraction,
            Self::Multiplication { .. } => NodeType::Multiplication,
            Self::Division { .. } => NodeType::Division,
            Self::Modulus { .. } => NodeType::Modulus,
            Self::DiffClamp { .. } => NodeType::DiffClamp,
        }
    }
}

/// One operation of a transform node, e.g. `translateX` or `scale`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransformEntry {
    /// Value read from a scalar node
    Animated {
        /// Transform property name
        property: String,
        /// Node providing the value
        #[serde(rename = "nodeTag")]
        node_tag: NodeTag,
    },
    /// Fixed value
    Static {
        /// Transform property name
        property: String,
        /// The value
        value: f64,
    },
}

impl TransformEntry {
    /// Transform property name
    pub fn property(&self) -> &str {
        match self {
            Self::Animated { property, .. } | Self::Static { property, .. } => property,
        }
    }
}

/// Transform node state
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransformNode {
    /// Operations from the config
    pub transforms: Vec<TransformEntry>,
    /// Last computed `{ "transform": [...] }` map
    pub computed: PropMap,
}

/// Scalar node written by drivers
#[derive(Debug, Clone, PartialEq)]
pub struct ValueNode {
    /// Raw value
    pub value: f64,
    /// Offset added on output
    pub offset: f64,
}

impl ValueNode {
    /// Output seen by dependents
    pub fn output(&self) -> f64 {
        self.value + self.offset
    }

    /// Merge the offset into the value
    pub fn flatten_offset(&mut self) {
        self.value += self.offset;
        self.offset = 0.0;
    }

    /// Move the value into the offset
    pub fn extract_offset(&mut self) {
        self.offset += self.value;
        self.value = 0.0;
    }
}

/// Arithmetic fold over a list of inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    /// `a + b + ...`
    Add,
    /// `a - b - ...`
    Subtract,
    /// `a * b * ...`
    Multiply,
    /// `a / b / ...`
    Divide,
}

impl MathOp {
    fn node_type(self) -> NodeType {
        match self {
            Self::Add => NodeType::Addition,
            Self::Subtract => NodeType::Subtraction,
            Self::Multiply => NodeType::Multiplication,
            Self::Divide => NodeType::Division,
        }
    }
}

/// Aggregating node state shared by style and props nodes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MappingNode {
    /// Property mapping from the config
    pub mapping: IndexMap<String, MappingEntry>,
    /// Last computed property map
    pub computed: PropMap,
}

/// Props node state
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropsNode {
    /// Mapping and last output
    pub map: MappingNode,
    /// Attached view, if any
    pub view: Option<ViewTag>,
}

/// Tag-specific node data
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Scalar value
    Value(ValueNode),
    /// Style aggregator
    Style(MappingNode),
    /// Props aggregator
    Props(PropsNode),
    /// Transform list
    Transform(TransformNode),
    /// Interpolation with its last output
    Interpolation {
        /// Breakpoints and policies
        config: InterpolationConfig,
        /// Last output
        value: f64,
    },
    /// Arithmetic fold
    Math {
        /// Fold operation
        op: MathOp,
        /// Input node tags
        input: Vec<NodeTag>,
        /// Last output
        value: f64,
    },
    /// Non-negative remainder
    Modulus {
        /// Input node tag
        input: NodeTag,
        /// Divisor
        modulus: f64,
        /// Last output
        value: f64,
    },
    /// Clamped accumulation
    DiffClamp {
        /// Input node tag
        input: NodeTag,
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
        /// Input observed on the previous pass
        last_input: f64,
        /// Last output
        value: f64,
    },
}

impl NodeKind {
    /// Build node data from a config, validating it
    pub fn from_config(config: NodeConfig) -> Result<Self, String> {
        let kind = match config {
            NodeConfig::Value { value, offset } => Self::Value(ValueNode { value, offset }),
            NodeConfig::Style { style } => Self::Style(MappingNode {
                mapping: style,
                computed: PropMap::new(),
            }),
            NodeConfig::Props { props } => Self::Props(PropsNode {
                map: MappingNode {
                    mapping: props,
                    computed: PropMap::new(),
                },
                view: None,
            }),
            NodeConfig::Transform { transforms } => Self::Transform(TransformNode {
                transforms,
                computed: PropMap::new(),
            }),
            NodeConfig::Interpolation(config) => {
                config.validate()?;
                let value = config.output_range[0];
                Self::Interpolation { config, value }
            }
            NodeConfig::Addition { input } => Self::math(MathOp::Add, input)?,
            NodeConfig::Subtraction { input } => Self::math(MathOp::Subtract, input)?,
            NodeConfig::Multiplication { input } => Self::math(MathOp::Multiply, input)?,
            NodeConfig::Division { input } => Self::math(MathOp::Divide, input)?,
            NodeConfig::Modulus { input, modulus } => {
                if modulus == 0.0 {
                    return Err("modulus must be non-zero".to_string());
                }
                Self::Modulus { input, modulus, value: 0.0 }
            }
            NodeConfig::DiffClamp { input, min, max } => {
                if min > max {
                    return Err(format!("diffclamp min {min} is greater than max {max}"));
                }
                Self::DiffClamp {
                    input,
                    min,
                    max,
                    last_input: 0.0,
                    value: 0.0,
                }
            }
        };
        Ok(kind)
    }

    fn math(op: MathOp, input: Vec<NodeTag>) -> Result<Self, String> {
        if input.is_empty() {
            return Err(format!("{} node needs at least one input", op.node_type()));
        }
        Ok(Self::Math { op, input, value: 0.0 })
    }

    /// The node's type
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Value(_) => NodeType::Value,
            Self::Style(_) => NodeType::Style,
            Self::Props(_) => NodeType::Props,
            Self::Transform(_) => NodeType::Transform,
            Self::Interpolation { .. } => NodeType::Interpolation,
            Self::Math { op, .. } => op.node_type(),
            Self::Modulus { .. } => NodeType::Modulus,
            Self::DiffClamp { .. } => NodeType::DiffClamp,
        }
    }

    /// Scalar output, for node types that produce one
    pub fn scalar(&self) -> Option<f64> {
        match self {
            Self::Value(node) => Some(node.output()),
            Self::Interpolation { value, .. }
            | Self::Math { value, .. }
            | Self::Modulus { value, .. }
            | Self::DiffClamp { value, .. } => Some(*value),
            Self::Style(_) | Self::Props(_) | Self::Transform(_) => None,
        }
    }

    /// Property map output, for style, props and transform nodes
    pub fn props(&self) -> Option<&PropMap> {
        match self {
            Self::Style(node) => Some(&node.computed),
            Self::Props(node) => Some(&node.map.computed),
            Self::Transform(node) => Some(&node.computed),
            _ => None,
        }
    }
}

/// A node instance in the graph
#[derive(Debug, Clone)]
pub struct AnimatedNode {
    /// Caller-chosen tag
    pub tag: NodeTag,
    /// Tag-specific data
    pub kind: NodeKind,
    /// Nodes feeding this one
    pub(crate) parents: Vec<NodeKey>,
    /// Nodes fed by this one
    pub(crate) children: Vec<NodeKey>,
    /// Parents still to be recomputed in the current pass
    pub(crate) active_incoming: u32,
    /// Traversal mark, compared against the graph's current color
    pub(crate) bfs_color: u32,
}

impl AnimatedNode {
    /// Create a detached node
    pub fn new(tag: NodeTag, kind: NodeKind) -> Self {
        Self {
            tag,
            kind,
            parents: Vec::new(),
            children: Vec::new(),
            active_incoming: 0,
            bfs_color: INITIAL_BFS_COLOR,
        }
    }

    /// The node's type
    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    /// Number of nodes feeding this one
    pub fn parent_count(&self) -> usize {
        self.parents.len()
    }

    /// Number of nodes fed by this one
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Whether the node has any edge
    pub fn has_edges(&self) -> bool {
        !self.parents.is_empty() || !self.children.is_empty()
    }

    /// Attached view, for props nodes
    pub fn view(&self) -> Option<ViewTag> {
        match &self.kind {
            NodeKind::Props(props) => props.view,
            _ => None,
        }
    }
}

/// Color a fresh node starts with; never used for a traversal
pub(crate) const INITIAL_BFS_COLOR: u32 = 0;
