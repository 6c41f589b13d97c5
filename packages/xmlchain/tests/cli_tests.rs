use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use url::Url;

fn xmlchain() -> Command {
    Command::cargo_bin("xmlchain").unwrap()
}

fn fixture_path(name: &str) -> String {
    format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
}

/// Write a document chaining to `target` into `dir`.
fn write_wrapper(dir: &Path, target: &Path) -> String {
    let target_url = Url::from_file_path(target).unwrap();
    let wrapper = dir.join("wrapper.xml");
    fs::write(
        &wrapper,
        format!(r#"<Response><ChildNode type="chained">{target_url}</ChildNode></Response>"#),
    )
    .unwrap();
    wrapper.to_string_lossy().into_owned()
}

#[test]
fn test_help() {
    xmlchain()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("resolve"));
}

#[test]
fn test_resolve_local_file_without_chains() {
    xmlchain()
        .args(["resolve", &fixture_path("inline.xml")])
        .assert()
        .success()
        .stdout(predicate::str::contains("Chained documents: 0"))
        .stdout(predicate::str::contains("Terminal documents: 1"));
}

#[test]
fn test_resolve_chain_to_file_prints_inner_document() {
    let dir = TempDir::new().unwrap();
    let inner = dir.path().join("inline.xml");
    fs::copy(fixture_path("inline.xml"), &inner).unwrap();
    let wrapper = write_wrapper(dir.path(), &inner);

    xmlchain()
        .args(["resolve", &wrapper, "--format", "xml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Third creative"))
        .stdout(predicate::str::contains("First creative &amp; friends"));
}

#[test]
fn test_resolve_json_report() {
    let dir = TempDir::new().unwrap();
    let inner = dir.path().join("second.xml");
    fs::copy(fixture_path("second.xml"), &inner).unwrap();
    let wrapper = write_wrapper(dir.path(), &inner);

    xmlchain()
        .args(["resolve", &wrapper, "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"chains\""))
        .stdout(predicate::str::contains("\"kind\": \"chained\""))
        .stdout(predicate::str::contains("\"resolved\": {"));
}

#[test]
fn test_missing_source_fails() {
    xmlchain()
        .args(["resolve", "/definitely/not/here.xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_broken_chain_fails() {
    let dir = TempDir::new().unwrap();
    let wrapper = write_wrapper(dir.path(), &dir.path().join("missing.xml"));

    xmlchain()
        .args(["resolve", &wrapper])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to fetch"));
}

#[test]
fn test_depth_limit_option() {
    let dir = TempDir::new().unwrap();
    let inner = dir.path().join("inline.xml");
    fs::copy(fixture_path("inline.xml"), &inner).unwrap();
    let wrapper = write_wrapper(dir.path(), &inner);

    xmlchain()
        .args(["resolve", &wrapper, "--max-depth", "0"])
        .assert()
        .success();

    // A local source sits at depth 0, so depth 1 is the first fetched level.
    xmlchain()
        .args(["resolve", &wrapper, "--max-depth", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Chained documents: 1"))
        .stdout(predicate::str::contains("- chained file://"));
}
