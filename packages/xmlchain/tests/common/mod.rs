//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use xmlchain::{MemoryFetcher, ResolveError, Resolver, ResponseTree, RootItem};

pub const INLINE_URL: &str = "https://ads.example.com/inline.xml";
pub const SECOND_URL: &str = "https://ads.example.com/second.xml";
pub const WRAPPER_URL: &str = "https://ads.example.com/wrapper.xml";

/// Load fixture file content.
pub fn load_fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to load {}: {}", path.display(), e))
}

/// Root over a fixture document.
pub fn fixture_root(name: &str) -> RootItem {
    RootItem::new(load_fixture(name).into_bytes())
}

/// Fetcher serving the fixture documents under their well-known URLs.
pub fn fixture_fetcher() -> MemoryFetcher {
    MemoryFetcher::new()
        .with_document(INLINE_URL, load_fixture("inline.xml"))
        .with_document(SECOND_URL, load_fixture("second.xml"))
        .with_document(WRAPPER_URL, load_fixture("wrapper.xml"))
}

/// Resolve `root` through its completion callback and return every call made.
pub async fn resolve_collecting(
    fetcher: Arc<MemoryFetcher>,
    root: RootItem,
) -> Vec<(ResponseTree, Option<ResolveError>)> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = Resolver::with_shared_fetcher(fetcher).resolve_with(root, move |tree, error| {
        tx.send((tree, error)).unwrap();
    });
    handle.await.unwrap();

    let mut calls = Vec::new();
    while let Some(call) = rx.recv().await {
        calls.push(call);
    }
    calls
}
