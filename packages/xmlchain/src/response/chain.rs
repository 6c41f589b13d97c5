//! Chain nodes: children of a root that may point at another document.

use std::any::Any;

use url::Url;

use super::root::RootItem;
use crate::config::parse_reference;
use crate::error::{ResolveError, Result};
use crate::mapping::config::{LEAF_MAPPING, TYPE_ATTRIBUTE};
use crate::mapping::{BoxedItem, BuildContext, Mapped, MappingTable, NodeData, Slot, Structural};
use crate::types::{Attributes, ReferenceKind, ResolutionId};

/// A child of a root that is either an inline payload ([`ReferenceKind::Direct`])
/// or a reference to another document ([`ReferenceKind::Chained`]).
///
/// A chained node owns the tree of the document it wraps. That tree starts
/// out holding only the reference URL and is filled in by the resolver.
#[derive(Debug)]
pub struct ChainNode {
    node: NodeData,
    owner: ResolutionId,
    kind: ReferenceKind,
    reference: Option<Url>,
    wrapped: Option<Box<RootItem>>,
    in_flight: bool,
    failure: Option<ResolveError>,
}

impl ChainNode {
    #[must_use]
    pub fn new(tag: &str, attributes: Attributes, context: &BuildContext) -> Self {
        let kind = attributes
            .get(TYPE_ATTRIBUTE)
            .map(|value| ReferenceKind::from_type_attr(value))
            .unwrap_or_default();
        Self {
            node: NodeData::new(tag, attributes),
            owner: context.root,
            kind,
            reference: None,
            wrapped: None,
            in_flight: false,
            failure: None,
        }
    }

    /// [`ItemFactory`](crate::mapping::ItemFactory) for `ChainNode`.
    pub fn create(tag: &str, attributes: Attributes, context: &BuildContext) -> BoxedItem {
        Box::new(Self::new(tag, attributes, context))
    }

    #[must_use]
    pub fn kind(&self) -> ReferenceKind {
        self.kind
    }

    /// Resolution this node was parsed in.
    #[must_use]
    pub fn owner(&self) -> ResolutionId {
        self.owner
    }

    /// URL found in the node's text, if the text is one.
    #[must_use]
    pub fn reference_url(&self) -> Option<&Url> {
        self.reference.as_ref()
    }

    /// Tree of the wrapped document; only chained nodes have one.
    #[must_use]
    pub fn wrapped_tree(&self) -> Option<&RootItem> {
        self.wrapped.as_deref()
    }

    /// Why the wrapped document could not be resolved at all.
    ///
    /// Failures inside the wrapped document are recorded on that tree.
    #[must_use]
    pub fn failure(&self) -> Option<&ResolveError> {
        self.failure.as_ref()
    }

    /// Chained node whose wrapped tree still has to be resolved.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.kind == ReferenceKind::Chained
            && !self.in_flight
            && self
                .wrapped
                .as_ref()
                .is_some_and(|tree| !tree.state().is_terminal())
    }

    /// Hand the wrapped tree to a resolver. The node remembers that it waits
    /// for the tree to come back.
    pub(crate) fn take_wrapped(&mut self) -> Option<RootItem> {
        if !self.is_pending() {
            return None;
        }
        let tree = self.wrapped.take()?;
        self.in_flight = true;
        Some(*tree)
    }

    /// Put back what the resolver produced for the tree taken by [`take_wrapped`](Self::take_wrapped).
    pub(crate) fn settle(&mut self, outcome: std::result::Result<RootItem, ResolveError>) {
        self.in_flight = false;
        match outcome {
            Ok(tree) => self.wrapped = Some(Box::new(tree)),
            Err(error) => self.failure = Some(error),
        }
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

impl Structural for ChainNode {
    fn node(&self) -> &NodeData {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeData {
        &mut self.node
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_chain(&self) -> Option<&ChainNode> {
        Some(self)
    }

    fn as_chain_mut(&mut self) -> Option<&mut ChainNode> {
        Some(self)
    }
}

impl Mapped for ChainNode {
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

    /// A chained node needs a URL; it gets its wrapped tree one level deeper
    /// than the root it was parsed in.
    fn finish(&mut self, context: &BuildContext) -> Result<()> {
        self.reference = self.node.text().and_then(parse_reference);

        if self.kind == ReferenceKind::Chained {
            let Some(url) = self.reference.clone() else {
                return Err(ResolveError::MissingIdentifier {
                    tag: self.node.tag().to_string(),
                    key: "reference URL",
                });
            };
            self.wrapped = Some(Box::new(RootItem::wrapping(url).at_depth(context.depth + 1)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResolutionState;

    fn context() -> BuildContext {
        BuildContext::new(ResolutionId::from_raw(11), 2)
    }

    fn chain(type_attr: Option<&str>, text: &str) -> ChainNode {
        let mut attributes = Attributes::new();
        if let Some(value) = type_attr {
            attributes.insert("type".to_string(), value.to_string());
        }
        let mut node = ChainNode::new("ChildNode", attributes, &context());
        node.node_mut().push_text(text);
        node
    }

    #[test]
    fn test_direct_node() {
        let mut node = chain(None, "https://example.com/inline-looking.xml");
        node.finish(&context()).unwrap();
        assert_eq!(node.kind(), ReferenceKind::Direct);
        assert_eq!(node.owner(), ResolutionId::from_raw(11));
        assert!(node.reference_url().is_some());
        assert!(node.wrapped_tree().is_none());
        assert!(!node.is_pending());
    }

    #[test]
    fn test_chained_node_wraps_reference() {
        let mut node = chain(Some("chained"), "\n  https://example.com/next.xml\n");
        node.finish(&context()).unwrap();

        let tree = node.wrapped_tree().unwrap();
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.state(), ResolutionState::Idle);
        assert_eq!(
            tree.reference_url().unwrap().as_str(),
            "https://example.com/next.xml"
        );
        assert!(node.is_pending());
    }

    #[test]
    fn test_chained_node_requires_url() {
        let mut node = chain(Some("wrapper"), "not a url");
        assert_eq!(
            node.finish(&context()),
            Err(ResolveError::MissingIdentifier {
                tag: "ChildNode".to_string(),
                key: "reference URL",
            })
        );
    }

    #[test]
    fn test_take_and_settle() {
        let mut node = chain(Some("chained"), "https://example.com/next.xml");
        node.finish(&context()).unwrap();

        let tree = node.take_wrapped().unwrap();
        assert!(node.is_in_flight());
        assert!(node.wrapped_tree().is_none());
        assert!(node.take_wrapped().is_none());

        node.settle(Ok(tree));
        assert!(!node.is_in_flight());
        assert!(node.wrapped_tree().is_some());

        let _ = node.take_wrapped().unwrap();
        node.settle(Err(ResolveError::ChainTaskFailed("cancelled".into())));
        assert!(node.failure().is_some());
        assert!(node.wrapped_tree().is_none());
    }
}
