//! Builds a mapped tree from parse events.
//!
//! The builder keeps a stack of open items. When an element opens, the
//! parent's table picks the item type; when it closes, the item is
//! finished and bound into the parent field its tag maps to.

use tracing::{debug, trace, warn};

use super::item::{BoxedItem, Mapped, Slot, Structural};
use super::table::{BindAction, BuildContext};
use crate::error::ResolveError;
use crate::response::{Root, RootItem};
use crate::types::Attributes;
use crate::xml::ParseListener;

struct Frame {
    item: BoxedItem,
    /// Parent field receiving this item, `None` if it is discarded on close.
    field: Option<&'static str>,
}

/// Parse listener that populates a [`RootItem`].
pub struct TreeBuilder {
    root: RootItem,
    context: BuildContext,
    stack: Vec<Frame>,
    root_open: bool,
    pass: Option<u64>,
    error: Option<ResolveError>,
}

impl TreeBuilder {
    #[must_use]
    pub fn new(root: RootItem) -> Self {
        let context = root.build_context();
        Self {
            root,
            context,
            stack: Vec::new(),
            root_open: false,
            pass: None,
            error: None,
        }
    }

    /// Pass number assigned by the engine, once the pass started.
    #[must_use]
    pub fn pass(&self) -> Option<u64> {
        self.pass
    }

    /// First error reported during the pass.
    #[must_use]
    pub fn error(&self) -> Option<&ResolveError> {
        self.error.as_ref()
    }

    /// Give back the root. Items still open when the pass stopped are dropped.
    #[must_use]
    pub fn into_root(self) -> RootItem {
        if !self.stack.is_empty() {
            debug!(
                open = self.stack.len(),
                "dropping elements left open by an incomplete pass"
            );
        }
        self.root
    }

    fn parent(&mut self) -> &mut (dyn Mapped + 'static) {
        match self.stack.last_mut() {
            Some(frame) => &mut *frame.item,
            None => &mut self.root,
        }
    }

    fn bind(&mut self, field: &'static str, item: BoxedItem) {
        let parent = self.parent();
        let table = parent.mapping().name;
        let action = parent.mapping().action_for(field);

        match (action, parent.slot(field)) {
            (Some(BindAction::Append), Some(Slot::Collection(items))) => items.push(item),
            (Some(BindAction::Assign), Some(Slot::Scalar(value))) => {
                if value.is_none() {
                    *value = Some(item);
                } else {
                    trace!(table, field, tag = item.tag(), "field already assigned, dropping");
                }
            }
            (None, _) => {
                warn!(table, field, tag = item.tag(), "field has no bind action, dropping");
            }
            (Some(_), None) => {
                warn!(table, field, tag = item.tag(), "item has no such field, dropping");
            }
            (Some(action), Some(_)) => {
                warn!(table, field, ?action, "bind action does not match field kind, dropping");
            }
        }
    }

    fn record(&mut self, error: &ResolveError) {
        if self.error.is_none() {
            self.error = Some(error.clone());
        }
    }
}

impl ParseListener for TreeBuilder {
    fn on_start(&mut self, pass: u64) {
        trace!(pass, resolution_id = %self.context.root, "building tree");
        self.pass = Some(pass);
    }

    fn on_element_open(&mut self, tag: &str, attributes: Attributes) {
        if !self.root_open {
            self.root.node_mut().adopt(tag, attributes);
            self.root_open = true;
            return;
        }

        let parent = self.parent();
        let table = parent.mapping();
        let field = table.field_for(tag);
        if field.is_none() {
            trace!(table = table.name, tag, "unmapped tag, parsing and discarding");
        }
        let item = table.factory_for(tag)(tag, attributes, &self.context);
        self.stack.push(Frame { item, field });
    }

    fn on_text(&mut self, chunk: &str) {
        match self.stack.last_mut() {
            Some(frame) => frame.item.node_mut().push_text(chunk),
            None => self.root.node_mut().push_text(chunk),
        }
    }

    fn on_element_close(&mut self, tag: &str) {
        let Some(Frame { mut item, field }) = self.stack.pop() else {
            // The root itself closed.
            return;
        };

        if let Err(error) = item.finish(&self.context) {
            debug!(tag, %error, "discarding invalid element");
            return;
        }
        if let Some(field) = field {
            self.bind(field, item);
        }
    }

    fn on_parse_error(&mut self, error: &ResolveError) {
        self.record(error);
    }

    fn on_validation_error(&mut self, error: &ResolveError) {
        self.record(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::config::DOCUMENT_MAPPING;
    use crate::mapping::item::Element;
    use crate::types::ReferenceKind;
    use crate::xml::StreamingParseEngine;
    use pretty_assertions::assert_eq;

    fn build(xml: &str) -> (RootItem, Option<ResolveError>) {
        let pass = StreamingParseEngine::new(xml.as_bytes().to_vec())
            .begin(TreeBuilder::new(RootItem::new(Vec::new())))
            .unwrap();
        let error = pass.outcome.error();
        (pass.listener.into_root(), error)
    }

    #[test]
    fn test_root_takes_over_document_element() {
        let (root, error) = build(r#"<Response version="2"> </Response>"#);
        assert!(error.is_none());
        assert_eq!(root.tag(), "Response");
        assert_eq!(root.attribute("version"), Some("2"));
        assert!(root.child_nodes().is_empty());
    }

    #[test]
    fn test_append_keeps_document_order() {
        let (root, _) = build(
            "<Response>\
               <ChildNode>one</ChildNode>\
               <Other>ignored</Other>\
               <ChildNode>two</ChildNode>\
               <ChildNode>three</ChildNode>\
             </Response>",
        );
        let texts: Vec<_> = root.child_nodes().iter().filter_map(|c| c.text()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_assign_first_writer_wins() {
        let (root, _) = build(
            r#"<Response><Error code="1">first</Error><Error code="2">second</Error></Response>"#,
        );
        let error = root.server_error().unwrap();
        assert_eq!(error.code(), Some("1"));
        assert_eq!(error.message(), Some("first"));
    }

    #[test]
    fn test_chained_node_without_url_is_discarded() {
        let (root, error) = build(
            r#"<Response><ChildNode type="chained">   </ChildNode><ChildNode>kept</ChildNode></Response>"#,
        );
        assert!(error.is_none());
        assert_eq!(root.child_nodes().len(), 1);
        assert_eq!(root.child_nodes()[0].text(), Some("kept"));
    }

    #[test]
    fn test_chained_node_gets_wrapped_tree() {
        let (root, _) = build(
            r#"<Response><ChildNode type="Wrapper">https://ads.example.com/next.xml</ChildNode></Response>"#,
        );
        let chains = root.chain_nodes();
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].kind(), ReferenceKind::Chained);
        let wrapped = chains[0].wrapped_tree().unwrap();
        assert_eq!(wrapped.depth(), 1);
        assert_eq!(
            wrapped.reference_url().map(|u| u.to_string()),
            Some("https://ads.example.com/next.xml".to_string())
        );
    }

    #[test]
    fn test_unmapped_children_are_discarded() {
        let (root, _) = build(
            "<Response><ChildNode><Media><File>a.mp4</File></Media></ChildNode><Extensions/></Response>",
        );
        assert_eq!(root.child_nodes().len(), 1);
        assert_eq!(root.child_nodes()[0].text(), None);
    }

    #[test]
    fn test_structural_elements_keep_every_child() {
        let document = RootItem::new(Vec::new()).with_mapping(&DOCUMENT_MAPPING);
        let pass = StreamingParseEngine::new(
            b"<Feed><Entry><Title>x</Title></Entry><Entry/></Feed>".to_vec(),
        )
        .begin(TreeBuilder::new(document))
        .unwrap();
        let root = pass.listener.into_root();

        let entries = root.child_nodes();
        assert_eq!(entries.len(), 2);
        let first = entries[0].downcast_ref::<Element>().unwrap();
        assert_eq!(first.child_items()[0].tag(), "Title");
        assert_eq!(first.child_items()[0].text(), Some("x"));
    }

    #[test]
    fn test_malformed_document_records_error() {
        let (root, error) = build("<Response><ChildNode>one</ChildNode><ChildNode>");
        assert!(matches!(error, Some(ResolveError::MalformedXml { .. })));
        // Items finished before the failure stay bound.
        assert_eq!(root.child_nodes().len(), 1);
    }

    #[test]
    fn test_pass_number_is_recorded() {
        let builder = TreeBuilder::new(RootItem::new(Vec::new()));
        assert_eq!(builder.pass(), None);
        let pass = StreamingParseEngine::new(b"<a/>".to_vec())
            .begin(builder)
            .unwrap();
        assert!(pass.listener.pass().is_some());
        assert!(pass.listener.error().is_none());
    }
}
