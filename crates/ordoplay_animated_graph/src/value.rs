// SPDX-License-Identifier: MIT OR Apache-2.0
//! Values that flow out of style and props nodes.

use crate::node::NodeTag;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Computed property mapping, in insertion order
pub type PropMap = IndexMap<String, PropValue>;

/// A single property value written to a view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    /// Numeric value
    Number(f64),
    /// String value (colors, units, enum-like props)
    String(String),
    /// Ordered list of single-property maps, as produced by transform nodes
    List(Vec<PropMap>),
    /// Absence of an animated value; the view falls back to its authored value
    Null,
}

impl PropValue {
    /// Get as a number if possible
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Whether this value clears the animated override
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// One entry in a style or props mapping.
///
/// A bare integer names another node; `{ "value": ... }` is a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MappingEntry {
    /// Current value of a referenced node
    Node(NodeTag),
    /// Literal value written as-is
    Literal {
        /// The literal
        value: PropValue,
    },
}

impl MappingEntry {
    /// Referenced node tag, if this entry is not a literal
    pub fn node(&self) -> Option<NodeTag> {
        match self {
            Self::Node(tag) => Some(*tag),
            Self::Literal { .. } => None,
        }
    }
}

/// Build a mapping where every key of `props` is reset to [`PropValue::Null`]
pub fn null_props(props: &PropMap) -> PropMap {
    props.keys().map(|key| (key.clone(), PropValue::Null)).collect()
}
