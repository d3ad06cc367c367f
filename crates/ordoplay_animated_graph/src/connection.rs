// SPDX-License-Identifier: MIT OR Apache-2.0
//! Attachments between props nodes and views.

use crate::node::NodeTag;
use crate::value::PropMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a live view
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewTag(pub u32);

impl fmt::Debug for ViewTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ViewTag({})", self.0)
    }
}

impl fmt::Display for ViewTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A props node attached to a view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewConnection {
    /// Props node
    pub node: NodeTag,
    /// Target view
    pub view: ViewTag,
}

/// A pending write of computed properties to a view
#[derive(Debug, Clone, PartialEq)]
pub struct ViewUpdate {
    /// Props node that produced the write
    pub node: NodeTag,
    /// Target view
    pub view: ViewTag,
    /// Properties to apply
    pub props: PropMap,
}

impl ViewUpdate {
    /// Create a new view update
    pub fn new(connection: ViewConnection, props: PropMap) -> Self {
        Self {
            node: connection.node,
            view: connection.view,
            props,
        }
    }
}
