//! cargo test --test integration -- --nocapture

mod utils;

use std::path::Path;

use repo_util::App;
use repo_util::cli::build_command;
use repo_util::cli::parse_invocation;
use repo_util::clients::snapshot::SnapshotProvider;
use repo_util::descriptor::descriptors;
use serde_json::Value;
use serde_json::json;

#[ctor::ctor]
fn init() {
    // Disable colors for all integration tests to get clean output
    colored::control::set_override(false);
    utils::setup_logging().unwrap();
}

fn document() -> Value {
    json!({
        "repositories": [
            { "fullName": "a/r", "description": "Tools", "defaultBranchName": "trunk", "topics": ["x", "y"] },
            { "fullName": "a/s", "isArchived": true },
            { "fullName": "b/t", "description": "Other" },
        ],
        "branches": [
            { "fullName": "a/r#trunk", "isProtected": true },
            { "fullName": "a/r#feature" },
        ],
        "pullRequests": [
            { "fullName": "a/r#1", "title": "First", "state": "open", "source": "feature", "destination": "trunk" },
        ],
        "hooks": [
            { "fullName": "a/r#4", "id": 4, "url": "https://ci/old", "events": ["push"], "active": true },
        ],
    })
}

/// Parse `args` as a command line and run it against the snapshot at `path`.
async fn run(path: &Path, args: &[&str]) -> anyhow::Result<(String, String)> {
    let descriptors = descriptors();
    let matches = build_command(&descriptors)
        .try_get_matches_from(std::iter::once("repo-util").chain(args.iter().copied()))?;
    let (invocation, options) = parse_invocation(&descriptors, &matches)?;
    let app = App::new(SnapshotProvider::open(path).await?, descriptors);
    Ok(run_and_capture!(|out, err| app.run(invocation, &options, out, err)))
}

fn entry<'a>(document: &'a Value, collection: &str, full_name: &str) -> Option<&'a Value> {
    document[collection]
        .as_array()?
        .iter()
        .find(|e| e["fullName"] == full_name)
}

#[tokio::test]
async fn test_list_selected_attributes() -> anyhow::Result<()> {
    let dir = utils::TestDir::new()?;
    let path = dir.write_snapshot(&document())?;

    let (out, _) = run(&path, &["repository", "-a", "description,topics", "--no-undefined", "a/*"]).await?;
    assert_eq!(
        out,
        "a/r:\n  description: Tools\n       topics: x y\na/s:\n"
    );

    let (out, _) = run(&path, &["repository", "--no-identifier", "-a", "description", "*"]).await?;
    insta::assert_snapshot!(out, @r"
    Tools

    Other
    ");
    Ok(())
}

#[tokio::test]
async fn test_list_json() -> anyhow::Result<()> {
    let dir = utils::TestDir::new()?;
    let path = dir.write_snapshot(&document())?;

    let (out, _) = run(&path, &["repository", "--json", "-a", "description,isArchived"]).await?;
    insta::assert_snapshot!(out, @r#"[{"fullName":"a/r","description":"Tools"},{"fullName":"a/s","isArchived":true},{"fullName":"b/t","description":"Other"}]"#);

    let (out, _) = run(&path, &["branch", "--json", "-a", "isProtected", "a/r#t*"]).await?;
    insta::assert_snapshot!(out, @r#"[{"fullName":"a/r#trunk","isProtected":true}]"#);
    Ok(())
}

#[tokio::test]
async fn test_listing_leaves_snapshot_unchanged() -> anyhow::Result<()> {
    let dir = utils::TestDir::new()?;
    let path = dir.write_snapshot(&document())?;
    let before = std::fs::read_to_string(&path)?;

    let (first, _) = run(&path, &["pull-request"]).await?;
    let (second, _) = run(&path, &["pull-request"]).await?;
    assert_eq!(first, second);
    assert_eq!(std::fs::read_to_string(&path)?, before);
    Ok(())
}

#[tokio::test]
async fn test_define_updates_every_match() -> anyhow::Result<()> {
    let dir = utils::TestDir::new()?;
    let path = dir.write_snapshot(&document())?;

    let (out, _) = run(&path, &["repository", "-D", "description=Shared", "-D", "topics=infra", "a/*"]).await?;
    assert_eq!(out, "");

    let stored = utils::read_snapshot(&path)?;
    assert_eq!(entry(&stored, "repositories", "a/r").unwrap()["description"], "Shared");
    assert_eq!(entry(&stored, "repositories", "a/s").unwrap()["topics"], json!(["infra"]));
    assert_eq!(entry(&stored, "repositories", "b/t").unwrap()["description"], "Other");
    Ok(())
}

#[tokio::test]
async fn test_merge_pull_request() -> anyhow::Result<()> {
    let dir = utils::TestDir::new()?;
    let path = dir.write_snapshot(&document())?;

    run(&path, &["pull-request", "--merge", "a/r#1"]).await?;

    let stored = utils::read_snapshot(&path)?;
    let pull_request = entry(&stored, "pullRequests", "a/r#1").unwrap();
    assert_eq!(pull_request["state"], "closed");
    assert_eq!(pull_request["merged"], true);

    // Already closed
    assert!(run(&path, &["pull-request", "--decline", "a/r#1"]).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_conflicting_actions_are_rejected() -> anyhow::Result<()> {
    let dir = utils::TestDir::new()?;
    let path = dir.write_snapshot(&document())?;

    assert!(run(&path, &["pull-request", "--merge", "--decline"]).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_add_hook_and_delete() -> anyhow::Result<()> {
    let dir = utils::TestDir::new()?;
    let path = dir.write_snapshot(&document())?;

    run(&path, &["repository", "--add-hook", "--url", "https://ci/new", "-D", "events=push,issues", "a/r"]).await?;
    let stored = utils::read_snapshot(&path)?;
    let hook = entry(&stored, "hooks", "a/r#5").unwrap();
    assert_eq!(hook["url"], "https://ci/new");
    assert_eq!(hook["events"], json!(["push", "issues"]));

    run(&path, &["hook", "--delete", "a/r#4"]).await?;
    let (out, _) = run(&path, &["hook", "--json", "-a", "url"]).await?;
    insta::assert_snapshot!(out, @r#"[{"fullName":"a/r#5","url":"https://ci/new"}]"#);
    Ok(())
}

#[tokio::test]
async fn test_delete_with_definitions_keeps_hook() -> anyhow::Result<()> {
    let dir = utils::TestDir::new()?;
    let path = dir.write_snapshot(&document())?;

    assert!(run(&path, &["hook", "--delete", "-D", "active=false", "a/r#4"]).await.is_err());
    let stored = utils::read_snapshot(&path)?;
    assert!(entry(&stored, "hooks", "a/r#4").is_some());
    Ok(())
}

#[tokio::test]
async fn test_add_hook_requires_url() -> anyhow::Result<()> {
    let dir = utils::TestDir::new()?;
    let path = dir.write_snapshot(&document())?;

    let error = run(&path, &["repository", "--add-hook", "a/r"]).await.unwrap_err();
    assert!(error.to_string().contains("--url"));
    Ok(())
}

#[tokio::test]
async fn test_collection_actions() -> anyhow::Result<()> {
    let dir = utils::TestDir::new()?;
    let path = dir.write_snapshot(&document())?;

    let (out, _) = run(&path, &["provider-create-repository", "c/one", "c/two"]).await?;
    insta::assert_snapshot!(out, @r"
    Created repository: c/one
    Created repository: c/two
    ");

    let (out, _) = run(&path, &["branch-create-pull-request", "-D", "title=Feature", "a/r#feature"]).await?;
    assert_eq!(out, "Created pull request from: a/r#feature\n");

    let (out, _) = run(&path, &["pull-request", "--json", "-a", "title,destination", "a/r#2"]).await?;
    insta::assert_snapshot!(out, @r#"[{"fullName":"a/r#2","title":"Feature","destination":"trunk"}]"#);
    Ok(())
}
