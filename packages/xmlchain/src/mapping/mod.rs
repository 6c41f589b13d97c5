//! Declarative mapping from parse events to typed items.
//!
//! Each item type owns a static [`MappingTable`]. A [`TreeBuilder`] listens
//! to a parse pass and uses the tables of the items currently open to decide
//! what to instantiate and where to bind it.

pub mod builder;
pub mod config;
pub mod item;
pub mod table;

pub use builder::TreeBuilder;
pub use item::{collect_chains, visit_chains_mut, BoxedItem, Element, Mapped, NodeData, Slot, Structural};
pub use table::{BindAction, BuildContext, ItemFactory, MappingTable, WILDCARD};
