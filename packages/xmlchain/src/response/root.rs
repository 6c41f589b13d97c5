//! Root items: one document, its parse pass and its place in a chain.

use std::any::Any;
use std::fmt;

use tracing::{debug, trace};
use url::Url;

use super::chain::ChainNode;
use super::server_error::ServerError;
use crate::config::parse_reference;
use crate::error::ResolveError;
use crate::mapping::config::{CHILD_NODES, ERROR, RESPONSE_MAPPING};
use crate::mapping::{
    collect_chains, visit_chains_mut, BoxedItem, BuildContext, Mapped, MappingTable, NodeData,
    Slot, Structural,
};
use crate::types::{ReferenceKind, ResolutionId, ResolutionState};
use crate::xml::{AbortHandle, StreamingParseEngine};

/// A resolved (or resolving) root is the tree handed to callers.
pub type ResponseTree = RootItem;

/// Receives the resolved tree and the first error found in it.
pub type CompletionCallback = Box<dyn FnOnce(ResponseTree, Option<ResolveError>) + Send + 'static>;

/// Head of a document taking part in chain resolution.
pub trait Root: Mapped {
    fn resolution_id(&self) -> ResolutionId;

    fn chain_depth(&self) -> usize;

    fn resolution_state(&self) -> ResolutionState;

    /// Context handed to every item built under this root.
    fn build_context(&self) -> BuildContext {
        BuildContext::new(self.resolution_id(), self.chain_depth())
    }
}

/// Top of one document's tree.
///
/// A root is created either from bytes ([`RootItem::new`]) or from the
/// reference URL of a chain node ([`RootItem::wrapping`]). It owns the
/// engine for its own parse pass and the items that pass produces.
pub struct RootItem {
    node: NodeData,
    id: ResolutionId,
    depth: usize,
    mapping: &'static MappingTable,
    engine: Option<StreamingParseEngine>,
    abort: AbortHandle,
    source: Option<Url>,
    child_nodes: Vec<BoxedItem>,
    error: Option<BoxedItem>,
    state: ResolutionState,
    terminal_error: Option<ResolveError>,
    completion: Option<CompletionCallback>,
}

impl RootItem {
    /// Root over an in-memory document.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        let abort = AbortHandle::new();
        let engine = StreamingParseEngine::new(bytes).with_abort_handle(abort.clone());
        Self {
            node: NodeData::default(),
            id: ResolutionId::next(),
            depth: 0,
            mapping: &RESPONSE_MAPPING,
            engine: Some(engine),
            abort,
            source: None,
            child_nodes: Vec::new(),
            error: None,
            state: ResolutionState::Idle,
            terminal_error: None,
            completion: None,
        }
    }

    /// Root whose document is still to be fetched from `url`.
    #[must_use]
    pub fn wrapping(url: Url) -> Self {
        let mut root = Self::new(Vec::new());
        root.engine = None;
        root.node.set_text(url.as_str());
        root
    }

    #[must_use]
    pub fn with_id(mut self, id: ResolutionId) -> Self {
        self.id = id;
        self
    }

    /// Use another table for the document element's children.
    #[must_use]
    pub fn with_mapping(mut self, mapping: &'static MappingTable) -> Self {
        self.mapping = mapping;
        self
    }

    #[must_use]
    pub fn at_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Register the callback fired once the whole chain below this root settled.
    #[must_use]
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(ResponseTree, Option<ResolveError>) + Send + 'static,
    {
        self.set_completion(callback);
        self
    }

    pub fn set_completion<F>(&mut self, callback: F)
    where
        F: FnOnce(ResponseTree, Option<ResolveError>) + Send + 'static,
    {
        self.completion = Some(Box::new(callback));
    }

    pub(crate) fn take_completion(&mut self) -> Option<CompletionCallback> {
        self.completion.take()
    }

    #[must_use]
    pub fn id(&self) -> ResolutionId {
        self.id
    }

    /// Number of wrapped documents between this root and the top-level one.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub fn state(&self) -> ResolutionState {
        self.state
    }

    /// Error that ended this root's own resolution.
    #[must_use]
    pub fn terminal_error(&self) -> Option<&ResolveError> {
        self.terminal_error.as_ref()
    }

    /// URL the document was fetched from.
    #[must_use]
    pub fn source_url(&self) -> Option<&Url> {
        self.source.as_ref()
    }

    /// URL in the root's text. A root with one is resolved by fetching it.
    #[must_use]
    pub fn reference_url(&self) -> Option<Url> {
        self.node.text().and_then(parse_reference)
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.node.attribute("version")
    }

    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Cancel this root's parse pass if it has not finished yet.
    pub fn abort(&self) {
        self.abort.abort();
    }

    #[must_use]
    pub fn child_nodes(&self) -> &[BoxedItem] {
        &self.child_nodes
    }

    /// Chain nodes of this document, in document order.
    #[must_use]
    pub fn chain_nodes(&self) -> Vec<&ChainNode> {
        let mut chains = Vec::new();
        collect_chains(self, &mut chains);
        chains
    }

    #[must_use]
    pub fn server_error(&self) -> Option<&ServerError> {
        self.error
            .as_deref()
            .and_then(|item| item.downcast_ref::<ServerError>())
    }

    /// Trees at the end of every chain below this root, in document order.
    ///
    /// A tree is terminal when it has no chained nodes; a root without any
    /// returns itself. Chains that failed before producing a tree contribute
    /// nothing.
    #[must_use]
    pub fn terminal_trees(&self) -> Vec<&RootItem> {
        let chained: Vec<&ChainNode> = self
            .chain_nodes()
            .into_iter()
            .filter(|chain| chain.kind() == ReferenceKind::Chained)
            .collect();
        if chained.is_empty() {
            return vec![self];
        }
        chained
            .into_iter()
            .filter_map(ChainNode::wrapped_tree)
            .flat_map(RootItem::terminal_trees)
            .collect()
    }

    /// First error in this tree, in document order.
    ///
    /// The root's own terminal error comes first, then each chain node's
    /// failure or the first error of its wrapped tree.
    #[must_use]
    pub fn first_error(&self) -> Option<&ResolveError> {
        if let Some(error) = &self.terminal_error {
            return Some(error);
        }
        self.chain_nodes().into_iter().find_map(|chain| {
            chain
                .failure()
                .or_else(|| chain.wrapped_tree().and_then(RootItem::first_error))
        })
    }

    /// Number of wrapped documents in the whole tree.
    #[must_use]
    pub fn chained_document_count(&self) -> usize {
        self.chain_nodes()
            .into_iter()
            .filter_map(ChainNode::wrapped_tree)
            .map(|tree| 1 + tree.chained_document_count())
            .sum()
    }

    /// Move to `next` if the state machine allows it.
    pub(crate) fn transition(&mut self, next: ResolutionState) -> bool {
        if !self.state.can_transition_to(next) {
            trace!(resolution_id = %self.id, from = %self.state, to = %next, "ignoring state change");
            return false;
        }
        debug!(resolution_id = %self.id, from = %self.state, to = %next, "state change");
        self.state = next;
        true
    }

    /// Record `error` as this root's outcome and settle it.
    pub(crate) fn fail(&mut self, error: ResolveError) {
        if self.transition(ResolutionState::Failed) && self.terminal_error.is_none() {
            self.terminal_error = Some(error);
        }
        self.transition(ResolutionState::Resolved);
    }

    /// Replace the document with bytes fetched from `url`.
    pub(crate) fn load(&mut self, url: Url, bytes: Vec<u8>) {
        self.engine = Some(StreamingParseEngine::new(bytes).with_abort_handle(self.abort.clone()));
        self.source = Some(url);
    }

    pub(crate) fn take_engine(&mut self) -> Option<StreamingParseEngine> {
        self.engine.take()
    }

    /// Empty root with this root's identity, used when a pass lost the original.
    pub(crate) fn detached(&self) -> RootItem {
        Self {
            node: self.node.clone(),
            id: self.id,
            depth: self.depth,
            mapping: self.mapping,
            engine: None,
            abort: self.abort.clone(),
            source: self.source.clone(),
            child_nodes: Vec::new(),
            error: None,
            state: self.state,
            terminal_error: None,
            completion: None,
        }
    }

    /// Take every wrapped tree that still has to be resolved.
    pub(crate) fn take_pending_chains(&mut self) -> Vec<RootItem> {
        let mut pending = Vec::new();
        visit_chains_mut(self.children_mut(), &mut |chain| {
            if let Some(tree) = chain.take_wrapped() {
                pending.push(tree);
            }
        });
        pending
    }

    /// Return the outcomes for [`take_pending_chains`](Self::take_pending_chains), in the same order.
    pub(crate) fn settle_chains(&mut self, outcomes: Vec<Result<RootItem, ResolveError>>) {
        let mut outcomes = outcomes.into_iter();
        visit_chains_mut(self.children_mut(), &mut |chain| {
            if chain.is_in_flight() {
                let outcome = outcomes.next().unwrap_or_else(|| {
                    Err(ResolveError::ChainTaskFailed("no result for chain".to_string()))
                });
                chain.settle(outcome);
            }
        });
    }
}

impl Structural for RootItem {
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

impl Mapped for RootItem {
    fn mapping(&self) -> &'static MappingTable {
        self.mapping
    }

    fn slot(&mut self, field: &str) -> Option<Slot<'_>> {
        match field {
            CHILD_NODES => Some(Slot::Collection(&mut self.child_nodes)),
            ERROR => Some(Slot::Scalar(&mut self.error)),
            _ => None,
        }
    }

    fn field(&self, field: &str) -> Vec<&BoxedItem> {
        match field {
            CHILD_NODES => self.child_nodes.iter().collect(),
            ERROR => self.error.iter().collect(),
            _ => Vec::new(),
        }
    }

    fn children_mut(&mut self) -> Vec<&mut BoxedItem> {
        self.error.iter_mut().chain(self.child_nodes.iter_mut()).collect()
    }
}

impl Root for RootItem {
    fn resolution_id(&self) -> ResolutionId {
        self.id
    }

    fn chain_depth(&self) -> usize {
        self.depth
    }

    fn resolution_state(&self) -> ResolutionState {
        self.state
    }
}

impl fmt::Debug for RootItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootItem")
            .field("id", &self.id)
            .field("depth", &self.depth)
            .field("state", &self.state)
            .field("node", &self.node)
            .field("source", &self.source.as_ref().map(Url::as_str))
            .field("child_nodes", &self.child_nodes)
            .field("error", &self.error)
            .field("terminal_error", &self.terminal_error)
            .field("has_completion", &self.completion.is_some())
            .finish_non_exhaustive()
    }
}
