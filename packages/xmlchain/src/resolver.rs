//! Chain resolution.
//!
//! Resolving a root walks its state machine:
//!
//! ```text
//! Idle ─► FetchingReference ─► Parsing ─► HasChains ─► Resolved
//!   │             │               ├────► NoChains ──► Resolved
//!   └─────────────┴───────────────┴────► Failed ────► Resolved
//! ```
//!
//! A root whose text is a reference URL is fetched first. After its parse
//! pass every chained node below it gets its wrapped tree resolved in a task
//! of its own; the root is resolved once all of those settled. The
//! completion callback of a top-level root fires exactly once, after the
//! whole chain below it settled, with the first error in document order.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use url::Url;

use crate::config::ResolverConfig;
use crate::error::ResolveError;
use crate::http::Fetch;
use crate::mapping::TreeBuilder;
use crate::response::{ResponseTree, RootItem};
use crate::types::ResolutionState;
use crate::xml::ParseOutcome;

type ResolveFuture = Pin<Box<dyn Future<Output = RootItem> + Send + 'static>>;

/// Resolves roots and every chain below them.
#[derive(Clone)]
pub struct Resolver {
    fetcher: Arc<dyn Fetch>,
    config: ResolverConfig,
}

impl Resolver {
    /// Create a resolver with the default configuration.
    pub fn new(fetcher: impl Fetch + 'static) -> Self {
        Self::with_shared_fetcher(Arc::new(fetcher))
    }

    /// Create a resolver around a fetcher the caller keeps a handle to.
    pub fn with_shared_fetcher(fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            fetcher,
            config: ResolverConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve `root` and return the settled tree.
    ///
    /// Failures never escape as `Err`: they are recorded on the root they
    /// happened in (see [`RootItem::first_error`]). A completion callback
    /// registered on `root` is left in place and not fired.
    pub async fn resolve(&self, root: RootItem) -> ResponseTree {
        self.resolve_in_chain(root, Vec::new()).await
    }

    /// Resolve `root` in the background and fire its completion callback.
    ///
    /// The callback, if any, runs exactly once on the runtime once the
    /// whole chain settled.
    pub fn spawn(&self, mut root: RootItem) -> JoinHandle<()> {
        let resolver = self.clone();
        let completion = root.take_completion();
        tokio::spawn(async move {
            let tree = resolver.resolve(root).await;
            let error = tree.first_error().cloned();
            match completion {
                Some(callback) => callback(tree, error),
                None => debug!(resolution_id = %tree.id(), "resolved without completion callback"),
            }
        })
    }

    /// Register `callback` on `root` and [`spawn`](Self::spawn) its resolution.
    pub fn resolve_with<F>(&self, mut root: RootItem, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(ResponseTree, Option<ResolveError>) + Send + 'static,
    {
        root.set_completion(callback);
        self.spawn(root)
    }

    /// Boxed so that wrapped trees can be resolved in tasks of their own.
    fn resolve_in_chain(&self, root: RootItem, ancestry: Vec<Url>) -> ResolveFuture {
        let resolver = self.clone();
        let span = info_span!("resolve", resolution_id = %root.id(), depth = root.depth());
        Box::pin(async move { resolver.run(root, ancestry).await }.instrument(span))
    }

    async fn run(&self, mut root: RootItem, mut ancestry: Vec<Url>) -> RootItem {
        if root.state() != ResolutionState::Idle {
            debug!(state = %root.state(), "root is not idle, leaving it as is");
            return root;
        }
        if let Err(error) = self.config.check_depth(root.depth()) {
            return failed(root, error);
        }

        if let Some(url) = root.reference_url() {
            if self.config.detect_cycles && ancestry.contains(&url) {
                return failed(root, ResolveError::ChainCycle(url.to_string()));
            }
            root.transition(ResolutionState::FetchingReference);
            match self.fetch(&url).await {
                Ok(bytes) => root.load(url.clone(), bytes),
                Err(error) => return failed(root, error),
            }
            ancestry.push(url);
        }

        root.transition(ResolutionState::Parsing);
        let engine = match root.take_engine() {
            Some(engine) if engine.buffer_len() > 0 => engine,
            _ => return failed(root, ResolveError::EmptyInput),
        };

        let fallback = root.detached();
        let pass = match engine.begin_async(TreeBuilder::new(root)).await {
            Ok(pass) => pass,
            Err(error) => return failed(fallback, error),
        };
        let mut root = pass.listener.into_root();
        match pass.outcome {
            ParseOutcome::Completed => {}
            ParseOutcome::Failed(error) => return failed(root, error),
            ParseOutcome::Aborted => return failed(root, ResolveError::Aborted),
        }

        let pending = root.take_pending_chains();
        if pending.is_empty() {
            root.transition(ResolutionState::NoChains);
            root.transition(ResolutionState::Resolved);
            info!(children = root.child_nodes().len(), "resolved without chains");
            return root;
        }

        root.transition(ResolutionState::HasChains);
        info!(chains = pending.len(), "following chains");
        let handles: Vec<_> = pending
            .into_iter()
            .map(|tree| tokio::spawn(self.resolve_in_chain(tree, ancestry.clone())))
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(
                handle
                    .await
                    .map_err(|e| ResolveError::ChainTaskFailed(e.to_string())),
            );
        }
        root.settle_chains(outcomes);
        root.transition(ResolutionState::Resolved);
        info!("resolved with chains");
        root
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ResolveError> {
        debug!(%url, "fetching referenced document");
        let bytes = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|e| e.into_resolve_error(url))?;

        if bytes.len() as u64 > self.config.max_response_size {
            return Err(ResolveError::FetchFailure {
                url: url.to_string(),
                reason: format!(
                    "response of {} bytes exceeds the limit of {} bytes",
                    bytes.len(),
                    self.config.max_response_size
                ),
            });
        }
        if bytes.is_empty() {
            return Err(ResolveError::FetchFailure {
                url: url.to_string(),
                reason: "empty response body".to_string(),
            });
        }
        Ok(bytes)
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn failed(mut root: RootItem, error: ResolveError) -> RootItem {
    if error.is_parse_error() {
        warn!(error = %error, "document could not be parsed");
    } else {
        warn!(error = %error, "resolution failed");
    }
    root.fail(error);
    root
}
