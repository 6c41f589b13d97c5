//! End-to-end resolution tests: parse, follow chains, fire the completion callback.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use url::Url;

use common::{
    fixture_fetcher, fixture_root, resolve_collecting, INLINE_URL, SECOND_URL, WRAPPER_URL,
};
use xmlchain::{
    MemoryFetcher, ReferenceKind, ResolutionState, ResolveError, Resolver, ResolverConfig,
    RootItem, Structural,
};

fn texts(tree: &RootItem) -> Vec<String> {
    tree.child_nodes()
        .iter()
        .filter_map(|node| node.text().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_no_chains_fires_once_without_error() {
    let fetcher = Arc::new(fixture_fetcher());
    let calls = resolve_collecting(fetcher.clone(), fixture_root("inline.xml")).await;

    assert_eq!(calls.len(), 1);
    let (tree, error) = &calls[0];
    assert!(error.is_none());
    assert_eq!(tree.state(), ResolutionState::Resolved);
    assert_eq!(tree.tag(), "Response");
    assert_eq!(tree.version(), Some("2"));
    assert_eq!(
        texts(tree),
        vec![
            "First creative & friends".to_string(),
            "Second <creative>".to_string(),
            "Third creative".to_string(),
        ]
    );
    assert_eq!(tree.child_nodes()[1].attribute("id"), Some("c2"));
    assert!(fetcher.requests().is_empty());
}

#[tokio::test]
async fn test_empty_buffer_fires_once_with_empty_input() {
    let calls = resolve_collecting(Arc::new(MemoryFetcher::new()), RootItem::new(Vec::new())).await;

    assert_eq!(calls.len(), 1);
    let (tree, error) = &calls[0];
    assert_eq!(error, &Some(ResolveError::EmptyInput));
    assert_eq!(tree.tag(), "");
    assert!(tree.child_nodes().is_empty());
    assert!(tree.server_error().is_none());
}

#[tokio::test]
async fn test_single_chain_fires_once_with_second_document() {
    let fetcher = Arc::new(fixture_fetcher());
    let calls = resolve_collecting(fetcher.clone(), fixture_root("wrapper.xml")).await;

    assert_eq!(calls.len(), 1);
    let (tree, error) = &calls[0];
    assert!(error.is_none());

    let terminal = tree.terminal_trees();
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].depth(), 1);
    assert_eq!(terminal[0].source_url().map(Url::as_str), Some(INLINE_URL));
    assert_eq!(texts(terminal[0]).len(), 3);
    assert_eq!(texts(terminal[0])[0], "First creative & friends");

    assert_eq!(fetcher.requests(), vec![INLINE_URL.to_string()]);
}

#[tokio::test]
async fn test_top_level_reference_is_fetched() {
    let fetcher = Arc::new(fixture_fetcher());
    let root = RootItem::wrapping(Url::parse(WRAPPER_URL).unwrap());
    let calls = resolve_collecting(fetcher.clone(), root).await;

    assert_eq!(calls.len(), 1);
    let (tree, error) = &calls[0];
    assert!(error.is_none());
    assert_eq!(tree.source_url().map(Url::as_str), Some(WRAPPER_URL));
    assert_eq!(tree.chained_document_count(), 1);
    assert_eq!(
        fetcher.requests(),
        vec![WRAPPER_URL.to_string(), INLINE_URL.to_string()]
    );
}

#[tokio::test]
async fn test_assign_keeps_first_server_error() {
    let calls = resolve_collecting(Arc::new(MemoryFetcher::new()), fixture_root("no_fill.xml")).await;

    let (tree, error) = &calls[0];
    assert!(error.is_none());
    let server_error = tree.server_error().unwrap();
    assert_eq!(server_error.code(), Some("303"));
    assert_eq!(server_error.message(), Some("No ad available"));
}

#[tokio::test]
async fn test_sibling_chains_fire_once_in_document_order() {
    // The first chain answers last; the result order must not depend on it.
    let fetcher = Arc::new(
        fixture_fetcher()
            .with_delay(INLINE_URL, Duration::from_millis(60))
            .with_delay(SECOND_URL, Duration::from_millis(5)),
    );
    let calls = resolve_collecting(fetcher.clone(), fixture_root("two_wrappers.xml")).await;

    assert_eq!(calls.len(), 1);
    let (tree, error) = &calls[0];
    assert!(error.is_none());

    let chains = tree.chain_nodes();
    let kinds: Vec<_> = chains.iter().map(|c| c.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            ReferenceKind::Chained,
            ReferenceKind::Direct,
            ReferenceKind::Chained
        ]
    );

    let sources: Vec<_> = tree
        .terminal_trees()
        .iter()
        .map(|t| t.source_url().map(ToString::to_string))
        .collect();
    assert_eq!(
        sources,
        vec![Some(INLINE_URL.to_string()), Some(SECOND_URL.to_string())]
    );

    let mut requested = fetcher.requests();
    requested.sort();
    assert_eq!(requested, vec![INLINE_URL.to_string(), SECOND_URL.to_string()]);
}

#[tokio::test]
async fn test_first_error_follows_document_order() {
    // inline.xml is missing: the first chain fails, the second resolves.
    let fetcher = Arc::new(
        MemoryFetcher::new()
            .with_document(SECOND_URL, common::load_fixture("second.xml"))
            .with_delay(SECOND_URL, Duration::from_millis(20)),
    );
    let calls = resolve_collecting(fetcher, fixture_root("two_wrappers.xml")).await;

    assert_eq!(calls.len(), 1);
    let (tree, error) = &calls[0];
    assert!(matches!(
        error,
        Some(ResolveError::FetchFailure { url, .. }) if url == INLINE_URL
    ));

    // The healthy sibling is still resolved.
    let terminal = tree.terminal_trees();
    assert_eq!(terminal.len(), 2);
    assert_eq!(terminal[0].state(), ResolutionState::Resolved);
    assert!(terminal[0].terminal_error().is_some());
    assert!(terminal[1].terminal_error().is_none());
    assert_eq!(texts(terminal[1]), vec!["Second source".to_string()]);
}

#[tokio::test]
async fn test_nested_chains() {
    let fetcher = Arc::new(fixture_fetcher().with_document(
        "https://ads.example.com/outer.xml",
        format!(
            r#"<Response><ChildNode type="chained">{WRAPPER_URL}</ChildNode></Response>"#
        ),
    ));
    let root = RootItem::wrapping(Url::parse("https://ads.example.com/outer.xml").unwrap());
    let calls = resolve_collecting(fetcher, root).await;

    assert_eq!(calls.len(), 1);
    let (tree, error) = &calls[0];
    assert!(error.is_none());
    assert_eq!(tree.chained_document_count(), 2);

    let terminal = tree.terminal_trees();
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].depth(), 2);
    assert_eq!(terminal[0].source_url().map(Url::as_str), Some(INLINE_URL));
}

#[tokio::test]
async fn test_cycle_is_reported() {
    let loop_url = "https://ads.example.com/loop.xml";
    let fetcher = Arc::new(MemoryFetcher::new().with_document(
        loop_url,
        format!(r#"<Response><ChildNode type="chained">{loop_url}</ChildNode></Response>"#),
    ));
    let root = RootItem::wrapping(Url::parse(loop_url).unwrap());
    let calls = resolve_collecting(fetcher.clone(), root).await;

    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].1,
        Some(ResolveError::ChainCycle(loop_url.to_string()))
    );
    assert_eq!(fetcher.requests(), vec![loop_url.to_string()]);
}

#[tokio::test]
async fn test_depth_limit() {
    let fetcher = Arc::new(fixture_fetcher());
    let root = RootItem::wrapping(Url::parse(WRAPPER_URL).unwrap());
    let resolver = Resolver::with_shared_fetcher(fetcher.clone())
        .with_config(ResolverConfig::default().with_max_chain_depth(Some(0)));

    let tree = resolver.resolve(root).await;

    assert_eq!(
        tree.first_error(),
        Some(&ResolveError::ChainTooDeep { depth: 1, limit: 0 })
    );
    assert_eq!(fetcher.requests(), vec![WRAPPER_URL.to_string()]);
}

#[tokio::test]
async fn test_malformed_wrapped_document() {
    let fetcher = Arc::new(
        MemoryFetcher::new().with_document(INLINE_URL, "<Response><ChildNode>broken</Response>"),
    );
    let calls = resolve_collecting(fetcher, fixture_root("wrapper.xml")).await;

    assert_eq!(calls.len(), 1);
    let (tree, error) = &calls[0];
    assert!(matches!(error, Some(ResolveError::MalformedXml { .. })));
    assert_eq!(tree.state(), ResolutionState::Resolved);
    assert!(tree.terminal_error().is_none());
}

#[tokio::test]
async fn test_chained_node_without_reference_is_dropped() {
    let fetcher = Arc::new(MemoryFetcher::new());
    let root = RootItem::new(
        br#"<Response><ChildNode type="chained"></ChildNode><ChildNode>kept</ChildNode></Response>"#
            .to_vec(),
    );
    let calls = resolve_collecting(fetcher.clone(), root).await;

    let (tree, error) = &calls[0];
    assert!(error.is_none());
    assert_eq!(texts(tree), vec!["kept".to_string()]);
    assert!(fetcher.requests().is_empty());
}

#[tokio::test]
async fn test_aborted_root() {
    let root = fixture_root("inline.xml");
    root.abort();
    let calls = resolve_collecting(Arc::new(MemoryFetcher::new()), root).await;

    assert_eq!(calls.len(), 1);
    let (tree, error) = &calls[0];
    assert_eq!(error, &Some(ResolveError::Aborted));
    assert!(tree.child_nodes().is_empty());
}

#[tokio::test]
async fn test_abort_after_chains_spawned_keeps_them_running() {
    let fetcher = Arc::new(fixture_fetcher().with_delay(INLINE_URL, Duration::from_millis(50)));
    let root = fixture_root("wrapper.xml");
    let abort = root.abort_handle();

    let resolver = Resolver::with_shared_fetcher(fetcher.clone());
    let handle = tokio::spawn(async move { resolver.resolve(root).await });

    // The chained fetch has started once it shows up in the request log.
    while fetcher.requests().is_empty() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    abort.abort();

    let tree = handle.await.unwrap();
    assert!(tree.first_error().is_none());
    assert_eq!(tree.state(), ResolutionState::Resolved);

    let terminal = tree.terminal_trees();
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].source_url().map(Url::as_str), Some(INLINE_URL));
    assert_eq!(terminal[0].state(), ResolutionState::Resolved);
    assert_eq!(texts(terminal[0]).len(), 3);
}

#[tokio::test]
async fn test_many_resolutions_in_parallel() {
    let fetcher = Arc::new(fixture_fetcher());
    let resolver = Resolver::with_shared_fetcher(fetcher);

    let handles: Vec<_> = (0..24)
        .map(|i| {
            let resolver = resolver.clone();
            let name = if i % 2 == 0 { "wrapper.xml" } else { "two_wrappers.xml" };
            let root = fixture_root(name);
            tokio::spawn(async move { resolver.resolve(root).await })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let tree = handle.await.unwrap();
        assert!(tree.first_error().is_none());
        let expected = if i % 2 == 0 { 1 } else { 2 };
        assert_eq!(tree.terminal_trees().len(), expected);
    }
}
