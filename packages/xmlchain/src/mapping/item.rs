//! Item traits and the structural default item.
//!
//! Every node of a mapped tree is a [`Mapped`] item. The [`Structural`]
//! half is what any XML element has (tag, attributes, text, children); the
//! [`Mapped`] half adds the item type's mapping table and the named fields
//! that finished children are bound into.

use std::any::Any;
use std::fmt;

use super::config::{CHILDREN, ELEMENT_MAPPING};
use super::table::{BuildContext, MappingTable};
use crate::error::Result;
use crate::response::ChainNode;
use crate::types::Attributes;

/// Owned, type-erased item.
pub type BoxedItem = Box<dyn Mapped>;

/// Tag, attributes and accumulated character data of one element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeData {
    tag: String,
    attributes: Attributes,
    text: String,
}

impl NodeData {
    #[must_use]
    pub fn new(tag: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            tag: tag.into(),
            attributes,
            text: String::new(),
        }
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Text content with surrounding whitespace removed, `None` when blank.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        let trimmed = self.text.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// Text content exactly as delivered by the parser.
    #[must_use]
    pub fn raw_text(&self) -> &str {
        &self.text
    }

    /// Append a character data chunk; an element may receive several.
    pub fn push_text(&mut self, chunk: &str) {
        self.text.push_str(chunk);
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Become the element a document was opened with, dropping earlier content.
    pub(crate) fn adopt(&mut self, tag: &str, attributes: Attributes) {
        self.tag = tag.to_string();
        self.attributes = attributes;
        self.text.clear();
    }
}

/// A named field of an item that children can be bound into.
pub enum Slot<'a> {
    /// Ordered collection for [`BindAction::Append`](super::BindAction::Append).
    Collection(&'a mut Vec<BoxedItem>),
    /// Single value for [`BindAction::Assign`](super::BindAction::Assign).
    Scalar(&'a mut Option<BoxedItem>),
}

/// What every element-backed item exposes.
pub trait Structural: Any + Send + fmt::Debug {
    fn node(&self) -> &NodeData;

    fn node_mut(&mut self) -> &mut NodeData;

    fn as_any(&self) -> &dyn Any;

    /// This item as a chain node, when it is one.
    fn as_chain(&self) -> Option<&ChainNode> {
        None
    }

    fn as_chain_mut(&mut self) -> Option<&mut ChainNode> {
        None
    }

    fn tag(&self) -> &str {
        self.node().tag()
    }

    fn text(&self) -> Option<&str> {
        self.node().text()
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.node().attribute(name)
    }
}

/// An item type with its own mapping table and bindable fields.
pub trait Mapped: Structural {
    /// Static table consulted for this item's child tags.
    fn mapping(&self) -> &'static MappingTable;

    /// Mutable access to the field named `field`.
    fn slot(&mut self, field: &str) -> Option<Slot<'_>>;

    /// Current values of the field named `field`.
    fn field(&self, field: &str) -> Vec<&BoxedItem>;

    /// Every bound child, field by field in mapping order.
    fn children(&self) -> Vec<&BoxedItem> {
        self.mapping()
            .field_order
            .iter()
            .flat_map(|field| self.field(field))
            .collect()
    }

    /// Every bound child, mutably. The order is stable between calls.
    fn children_mut(&mut self) -> Vec<&mut BoxedItem>;

    /// Validate the item after its closing tag.
    ///
    /// An error means the item is discarded instead of bound to its parent.
    fn finish(&mut self, _context: &BuildContext) -> Result<()> {
        Ok(())
    }
}

impl dyn Mapped {
    /// Concrete type of a type-erased item.
    #[must_use]
    pub fn downcast_ref<T: Mapped>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Collect every chain node below `item` in document order, descending into
/// non-chain children only. Wrapped trees are not entered.
pub fn collect_chains<'a>(item: &'a dyn Mapped, out: &mut Vec<&'a ChainNode>) {
    for child in item.children() {
        match child.as_chain() {
            Some(chain) => out.push(chain),
            None => collect_chains(&**child, out),
        }
    }
}

/// Mutable counterpart of [`collect_chains`].
pub fn visit_chains_mut(children: Vec<&mut BoxedItem>, visit: &mut dyn FnMut(&mut ChainNode)) {
    for child in children {
        if let Some(chain) = child.as_chain_mut() {
            visit(chain);
        } else {
            visit_chains_mut(child.children_mut(), visit);
        }
    }
}

/// Structural default for tags without a registered type.
///
/// Keeps every child element it sees, so unknown markup survives a round
/// trip through the tree.
#[derive(Debug)]
pub struct Element {
    node: NodeData,
    children: Vec<BoxedItem>,
}

impl Element {
    #[must_use]
    pub fn new(tag: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            node: NodeData::new(tag, attributes),
            children: Vec::new(),
        }
    }

    /// [`ItemFactory`](super::ItemFactory) for `Element`.
    pub fn create(tag: &str, attributes: Attributes, _context: &BuildContext) -> BoxedItem {
        Box::new(Self::new(tag, attributes))
    }

    #[must_use]
    pub fn child_items(&self) -> &[BoxedItem] {
        &self.children
    }
}

impl Structural for Element {
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

impl Mapped for Element {
    fn mapping(&self) -> &'static MappingTable {
        &ELEMENT_MAPPING
    }

    fn slot(&mut self, field: &str) -> Option<Slot<'_>> {
        (field == CHILDREN).then(|| Slot::Collection(&mut self.children))
    }

    fn field(&self, field: &str) -> Vec<&BoxedItem> {
        if field == CHILDREN {
            self.children.iter().collect()
        } else {
            Vec::new()
        }
    }

    fn children_mut(&mut self) -> Vec<&mut BoxedItem> {
        self.children.iter_mut().collect()
    }
}
