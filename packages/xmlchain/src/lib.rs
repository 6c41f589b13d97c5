//! xmlchain - Declarative XML-to-object mapping with chained response resolution.
//!
//! Response documents are parsed by a streaming engine into typed item
//! trees. Which item type a tag becomes, which field it lands in and how it
//! is bound there is declared in static mapping tables. Some items are
//! references to further documents; the resolver fetches and parses those
//! recursively and reports the settled tree once.
//!
//! # Example
//!
//! ```
//! use xmlchain::{MemoryFetcher, Resolver, RootItem};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let fetcher = MemoryFetcher::new().with_document(
//!     "https://ads.example.com/inner.xml",
//!     "<Response><ChildNode>creative</ChildNode></Response>",
//! );
//! let root = RootItem::new(
//!     br#"<Response>
//!           <ChildNode type="chained">https://ads.example.com/inner.xml</ChildNode>
//!         </Response>"#
//!         .to_vec(),
//! );
//!
//! let tree = Resolver::new(fetcher).resolve(root).await;
//! assert!(tree.first_error().is_none());
//! assert_eq!(tree.terminal_trees().len(), 1);
//! # });
//! ```
//!
//! # Architecture
//!
//! - [`xml`]: Streaming parse engine, the process-wide parse queue and the XML writer
//! - [`mapping`]: Mapping tables, item traits and the tree builder
//! - [`response`]: Root items, chain nodes and server errors
//! - [`resolver`]: The chain resolution state machine
//! - [`http`]: Fetching referenced documents
//! - [`config`]: Constants, URL recognition and resolver settings
//! - [`types`]: Identifiers, reference kinds and resolution states
//! - [`error`]: Error types and Result alias
//! - [`report`]: Serializable resolution reports
//! - [`cli`]: Command-line interface

pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod mapping;
pub mod report;
pub mod resolver;
pub mod response;
pub mod types;
pub mod xml;

// Re-export commonly used items
pub use config::ResolverConfig;
pub use error::{FetchError, ResolveError, Result};
pub use http::{Fetch, HttpFetcher, MemoryFetcher};
pub use mapping::{Mapped, Structural, TreeBuilder};
pub use report::ResolutionReport;
pub use resolver::Resolver;
pub use response::{ChainNode, ResponseTree, RootItem, ServerError};
pub use types::{ReferenceKind, ResolutionId, ResolutionState};
pub use xml::{AbortHandle, ParseListener, StreamingParseEngine};
