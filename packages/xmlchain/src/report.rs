//! Serializable summary of a resolved tree.

use serde::Serialize;

use crate::error::{ResolveError, Result};
use crate::mapping::Structural;
use crate::response::{ChainNode, RootItem};
use crate::types::{ReferenceKind, ResolutionId, ResolutionState};

/// One root and the chains below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionReport {
    pub resolution_id: ResolutionId,
    pub depth: usize,
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub state: ResolutionState,
    pub child_nodes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_error: Option<ServerErrorReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub chains: Vec<ChainReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerErrorReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One chain node of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    pub kind: ReferenceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<Box<ResolutionReport>>,
}

impl ResolutionReport {
    #[must_use]
    pub fn from_tree(root: &RootItem) -> Self {
        Self {
            resolution_id: root.id(),
            depth: root.depth(),
            tag: root.tag().to_string(),
            version: root.version().map(str::to_string),
            source: root.source_url().map(ToString::to_string),
            state: root.state(),
            child_nodes: root.child_nodes().len(),
            server_error: root.server_error().map(|error| ServerErrorReport {
                code: error.code().map(str::to_string),
                message: error.message().map(str::to_string),
            }),
            error: root.terminal_error().map(ToString::to_string),
            chains: root.chain_nodes().into_iter().map(ChainReport::from_node).collect(),
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ResolveError::Serialization(e.to_string()))
    }
}

impl ChainReport {
    fn from_node(node: &ChainNode) -> Self {
        Self {
            kind: node.kind(),
            reference: node.reference_url().map(ToString::to_string),
            failure: node.failure().map(ToString::to_string),
            resolved: node
                .wrapped_tree()
                .map(|tree| Box::new(ResolutionReport::from_tree(tree))),
        }
    }
}
