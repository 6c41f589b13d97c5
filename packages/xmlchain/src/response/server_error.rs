use std::any::Any;

use crate::mapping::config::{CODE_ATTRIBUTE, LEAF_MAPPING};
use crate::mapping::{BoxedItem, BuildContext, Mapped, MappingTable, NodeData, Slot, Structural};
use crate::types::Attributes;

/// Error reported by the server inside a response document.
#[derive(Debug)]
pub struct ServerError {
    node: NodeData,
}

impl ServerError {
    #[must_use]
    pub fn new(tag: &str, attributes: Attributes) -> Self {
        Self {
            node: NodeData::new(tag, attributes),
        }
    }

    pub fn create(tag: &str, attributes: Attributes, _context: &BuildContext) -> BoxedItem {
        Box::new(Self::new(tag, attributes))
    }

    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.node.attribute(CODE_ATTRIBUTE)
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.node.text()
    }
}

impl Structural for ServerError {
    fn node(&self) -> &NodeData {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeData {
        &mut self.node
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Mapped for ServerError {
    fn mapping(&self) -> &'static MappingTable {
        &LEAF_MAPPING
    }

    fn slot(&mut self, _field: &str) -> Option<Slot<'_>> {
        None
    }

    fn field(&self, _field: &str) -> Vec<&BoxedItem> {
        Vec::new()
    }

    fn children_mut(&mut self) -> Vec<&mut BoxedItem> {
        Vec::new()
    }
}
