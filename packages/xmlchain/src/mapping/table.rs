//! Declarative mapping tables.
//!
//! A table belongs to a concrete item type and answers three questions for a
//! child tag seen inside an instance of that type:
//!
//! - *tag → type*: which item type to instantiate for the child,
//! - *tag → field*: which field of the parent receives the finished child,
//! - *field → action*: whether the field collects ([`BindAction::Append`])
//!   or holds one value ([`BindAction::Assign`]).
//!
//! Tables are `phf` maps built at compile time and never change at runtime.

use std::fmt;

use super::item::{BoxedItem, Element};
use crate::types::{Attributes, ResolutionId};

/// Field key that matches every tag without an exact entry.
pub const WILDCARD: &str = "*";

/// Constructor of a concrete item type.
pub type ItemFactory = fn(tag: &str, attributes: Attributes, context: &BuildContext) -> BoxedItem;

/// How a finished child is bound to its parent field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindAction {
    /// Push onto an ordered collection; every sibling is kept in document order.
    Append,
    /// Set a single value; the first writer wins, later ones are dropped.
    Assign,
}

/// Non-owning link from an item under construction to its root.
///
/// Items never hold their root; they only learn which resolution they
/// belong to and how deep in the chain it sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildContext {
    pub root: ResolutionId,
    pub depth: usize,
}

impl BuildContext {
    #[must_use]
    pub fn new(root: ResolutionId, depth: usize) -> Self {
        Self { root, depth }
    }
}

/// The three lookup tables of one item type.
pub struct MappingTable {
    /// Name used in logs.
    pub name: &'static str,
    pub types: phf::Map<&'static str, ItemFactory>,
    pub fields: phf::Map<&'static str, &'static str>,
    pub actions: phf::Map<&'static str, BindAction>,
    /// Order in which fields are visited when walking or writing an item.
    pub field_order: &'static [&'static str],
}

impl MappingTable {
    /// Item type registered for `tag`, if any.
    #[must_use]
    pub fn type_for(&self, tag: &str) -> Option<ItemFactory> {
        self.types.get(tag).copied()
    }

    /// Item type for `tag`, falling back to a structural [`Element`].
    #[must_use]
    pub fn factory_for(&self, tag: &str) -> ItemFactory {
        self.type_for(tag).unwrap_or(Element::create)
    }

    /// Field receiving children with `tag`, honouring the wildcard entry.
    #[must_use]
    pub fn field_for(&self, tag: &str) -> Option<&'static str> {
        self.fields
            .get(tag)
            .or_else(|| self.fields.get(WILDCARD))
            .copied()
    }

    #[must_use]
    pub fn action_for(&self, field: &str) -> Option<BindAction> {
        self.actions.get(field).copied()
    }

    /// Whether children with `tag` are retained at all.
    #[must_use]
    pub fn retains(&self, tag: &str) -> bool {
        self.field_for(tag).is_some()
    }
}

impl fmt::Debug for MappingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingTable")
            .field("name", &self.name)
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .field("fields", &self.fields)
            .field("actions", &self.actions)
            .finish()
    }
}
