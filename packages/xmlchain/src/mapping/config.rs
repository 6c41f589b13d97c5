//! Mapping tables of the response vocabulary.
//!
//! A response document looks like
//!
//! ```xml
//! <Response version="1">
//!   <Error code="303">No content</Error>
//!   <ChildNode type="chained">https://ads.example.com/next.xml</ChildNode>
//!   <ChildNode>inline payload</ChildNode>
//! </Response>
//! ```
//!
//! Root items bind `ChildNode` elements into an ordered `childNodes`
//! collection and a single `Error` into `error`. Everything else under the
//! root is parsed and discarded. Elements of unregistered tags keep all of
//! their children.

use phf::phf_map;

use super::table::{BindAction, ItemFactory, MappingTable};
use crate::response::{ChainNode, ServerError};

/// Field of a root item holding its chain nodes.
pub const CHILD_NODES: &str = "childNodes";

/// Field of a root item holding the server-reported error.
pub const ERROR: &str = "error";

/// Field of a structural element holding every child.
pub const CHILDREN: &str = "children";

/// Tag of chain nodes.
pub const CHILD_NODE_TAG: &str = "ChildNode";

/// Tag of server-reported errors.
pub const ERROR_TAG: &str = "Error";

/// Attribute selecting the reference kind of a chain node.
pub const TYPE_ATTRIBUTE: &str = "type";

/// Attribute carrying the server error code.
pub const CODE_ATTRIBUTE: &str = "code";

/// Table of a response root.
pub static RESPONSE_MAPPING: MappingTable = MappingTable {
    name: "Response",
    types: phf_map! {
        "ChildNode" => ChainNode::create as ItemFactory,
        "Error" => ServerError::create as ItemFactory,
    },
    fields: phf_map! {
        "ChildNode" => "childNodes",
        "Error" => "error",
    },
    actions: phf_map! {
        "childNodes" => BindAction::Append,
        "error" => BindAction::Assign,
    },
    field_order: &[ERROR, CHILD_NODES],
};

/// Table of a structural element: every child is kept.
pub static ELEMENT_MAPPING: MappingTable = MappingTable {
    name: "Element",
    types: phf_map! {},
    fields: phf_map! {
        "*" => "children",
    },
    actions: phf_map! {
        "children" => BindAction::Append,
    },
    field_order: &[CHILDREN],
};

/// Table of items whose children carry no meaning. Nested markup is parsed
/// and dropped.
pub static LEAF_MAPPING: MappingTable = MappingTable {
    name: "Leaf",
    types: phf_map! {},
    fields: phf_map! {},
    actions: phf_map! {},
    field_order: &[],
};

/// Table of a structural root: the document is retained as-is.
pub static DOCUMENT_MAPPING: MappingTable = MappingTable {
    name: "Document",
    types: phf_map! {},
    fields: phf_map! {
        "*" => "childNodes",
    },
    actions: phf_map! {
        "childNodes" => BindAction::Append,
    },
    field_order: &[CHILD_NODES],
};
