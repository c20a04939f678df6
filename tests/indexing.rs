mod common;

use std::sync::Arc;
use std::time::Duration;

use codescope::index::{Codemap, IndexEvent, IndexRequest, MerkleTree, CODEMAP_FILE_NAME};
use codescope::Codescope;
use codescope_core::{CodescopeConfig, CodescopeError, EncryptionConfig};

use common::CountingEmbedder;

const KEY_HEX: &str = "0707070707070707070707070707070707070707070707070707070707070707";

fn sealed_config() -> CodescopeConfig {
    CodescopeConfig {
        encryption: EncryptionConfig {
            enabled: true,
            key: Some(KEY_HEX.into()),
        },
        ..CodescopeConfig::default()
    }
}

#[tokio::test]
async fn index_reports_and_writes_projections() {
    let dir = common::project_dir();
    let project = Codescope::open(dir.path()).unwrap();

    let report = project.index_project(None, None).await.unwrap();
    assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
    assert_eq!(report.processed_chunks, 2);
    assert_eq!(report.total_chunks, 2);
    assert!(dir.path().join(CODEMAP_FILE_NAME).exists());
    assert_eq!(MerkleTree::load(project.data_dir()).unwrap().len(), 2);

    let again = project.index_project(None, None).await.unwrap();
    assert_eq!(again.processed_chunks, 0);
    assert_eq!(again.total_chunks, 2);
    assert_eq!(again.root_hash, report.root_hash);
}

#[tokio::test]
async fn one_changed_file_among_three_reembeds_only_it() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a", "b", "c"] {
        common::write(
            dir.path(),
            &format!("src/{name}.rs"),
            &format!("pub fn step_{name}(n: u32) -> u32 {{\n    n + 1\n}}\n"),
        );
    }
    let embedder = Arc::new(CountingEmbedder::default());
    let project = Codescope::open(dir.path())
        .unwrap()
        .with_embedder(embedder.clone());
    project.index_project(None, None).await.unwrap();
    assert_eq!(embedder.documents(), 3);
    let ids_of = |file: &str| -> Vec<String> {
        let mut ids: Vec<String> = project
            .store()
            .all_chunks()
            .unwrap()
            .into_iter()
            .filter(|c| c.file == file)
            .map(|c| c.id)
            .collect();
        ids.sort();
        ids
    };
    let (a_before, b_before, c_before) = (ids_of("src/a.rs"), ids_of("src/b.rs"), ids_of("src/c.rs"));

    common::write(dir.path(), "src/b.rs", "pub fn step_b(n: u32) -> u32 {\n    n + 2\n}\n");
    let report = project.index_project(None, None).await.unwrap();

    assert_eq!(report.files_skipped, 2);
    assert_eq!(report.processed_chunks, 1);
    assert_eq!(report.deleted_chunks, 1);
    assert_eq!(embedder.documents(), 4);
    assert_eq!(ids_of("src/a.rs"), a_before);
    assert_eq!(ids_of("src/c.rs"), c_before);
    assert_ne!(ids_of("src/b.rs"), b_before);
    assert_eq!(MerkleTree::load(project.data_dir()).unwrap().len(), 3);
}

#[tokio::test]
async fn explicit_paths_touch_only_those_files() {
    let dir = common::project_dir();
    let project = Codescope::open(dir.path()).unwrap();
    project.index_project(None, None).await.unwrap();

    common::write(
        dir.path(),
        "src/billing.py",
        "def charge_card(amount):\n    return amount >= 0\n",
    );
    let report = project
        .index_project(Some(vec!["src/billing.py".into()]), None)
        .await
        .unwrap();
    assert_eq!(report.processed_chunks, 1);
    assert_eq!(report.deleted_chunks, 1);

    std::fs::remove_file(dir.path().join("src/auth.rs")).unwrap();
    let report = project
        .index_project(None, Some(vec![dir.path().join("src/auth.rs")]))
        .await
        .unwrap();
    assert_eq!(report.files_deleted, 1);
    assert_eq!(report.total_chunks, 1);
}

#[tokio::test]
async fn event_stream_brackets_the_pass() {
    let dir = common::project_dir();
    let project = Codescope::open(dir.path()).unwrap();

    let (task, mut events) = project.index_project_with_events(IndexRequest::full()).unwrap();
    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        seen.push(event);
    }
    let report = task.await.unwrap().unwrap();

    assert!(matches!(seen.first(), Some(IndexEvent::Started { files: 2, .. })));
    assert!(matches!(seen.last(), Some(IndexEvent::Finished(r)) if *r == report));
    let indexed = seen
        .iter()
        .filter(|e| matches!(e, IndexEvent::FileIndexed { .. }))
        .count();
    assert_eq!(indexed, 2);
}

#[tokio::test]
async fn rebuilt_codemap_equals_written_codemap() {
    let dir = common::project_dir();
    let project = Codescope::open(dir.path()).unwrap();
    project.index_project(None, None).await.unwrap();

    let written = Codemap::load(dir.path()).unwrap();
    std::fs::remove_file(dir.path().join(CODEMAP_FILE_NAME)).unwrap();
    let rebuilt = project.rebuild_codemap().unwrap();

    assert_eq!(written.len(), 2);
    assert_eq!(rebuilt, written);
    assert_eq!(Codemap::load(dir.path()).unwrap(), written);
}

#[test]
fn legacy_codemap_loads_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(CODEMAP_FILE_NAME),
        r#"{
  "src/a.rs:alpha:0123abcd": {
    "file": "src/a.rs",
    "symbol": "alpha",
    "sha": "0123abcd",
    "lang": "rust",
    "chunkType": "function"
  }
}"#,
    )
    .unwrap();

    let codemap = Codemap::load(dir.path()).unwrap();
    let entry = codemap.get("src/a.rs:alpha:0123abcd").unwrap();
    assert_eq!(entry.path_weight, 1.0);
    assert_eq!(entry.success_rate, 0.0);
    assert!(entry.synonyms.is_empty());
    assert!(!entry.encrypted);
    assert!(entry.last_used_at.is_none());
}

#[tokio::test]
async fn sealed_bodies_round_trip() {
    let dir = common::project_dir();
    let project = Codescope::with_config(dir.path(), sealed_config()).unwrap();
    project.index_project(None, None).await.unwrap();

    let chunks = project.store().all_chunks().unwrap();
    assert_eq!(chunks.len(), 2);
    for chunk in &chunks {
        assert!(chunk.encrypted);
        let bodies = project.data_dir().join("chunks");
        assert!(bodies.join(format!("{}.enc", chunk.content_hash)).exists());
        assert!(!bodies.join(&chunk.content_hash).exists());
    }

    let auth = chunks.iter().find(|c| c.symbol == "validate_token").unwrap();
    let body = project.get_chunk(&auth.content_hash).unwrap();
    assert!(body.contains("!token.is_empty()"));

    let raw = std::fs::read(
        project
            .data_dir()
            .join("chunks")
            .join(format!("{}.enc", auth.content_hash)),
    )
    .unwrap();
    assert!(!String::from_utf8_lossy(&raw).contains("is_empty"));
}

#[tokio::test]
async fn sealed_body_without_key_is_key_missing() {
    let dir = common::project_dir();
    let sealed = Codescope::with_config(dir.path(), sealed_config()).unwrap();
    sealed.index_project(None, None).await.unwrap();
    let sha = sealed.store().all_chunks().unwrap()[0].content_hash.clone();
    drop(sealed);

    let keyless = Codescope::with_config(dir.path(), CodescopeConfig::default()).unwrap();
    let err = keyless.get_chunk(&sha).unwrap_err();
    assert!(matches!(err, CodescopeError::ChunkKeyMissing(_)));
}

#[tokio::test]
async fn tampered_body_fails_authentication() {
    let dir = common::project_dir();
    let project = Codescope::with_config(dir.path(), sealed_config()).unwrap();
    project.index_project(None, None).await.unwrap();
    let sha = project.store().all_chunks().unwrap()[0].content_hash.clone();

    let path = project.data_dir().join("chunks").join(format!("{sha}.enc"));
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&path, bytes).unwrap();

    let err = project.get_chunk(&sha).unwrap_err();
    assert!(matches!(err, CodescopeError::ChunkAuthFailed(_)));
}

#[test]
fn encryption_without_key_is_a_config_error() {
    if std::env::var_os("CODESCOPE_ENCRYPTION_KEY").is_some() {
        return;
    }
    let dir = common::project_dir();
    let config = CodescopeConfig {
        encryption: EncryptionConfig {
            enabled: true,
            key: None,
        },
        ..CodescopeConfig::default()
    };
    let err = Codescope::with_config(dir.path(), config).err().unwrap();
    assert!(matches!(err, CodescopeError::Config(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watcher_indexes_saved_files() {
    let dir = common::project_dir();
    let project = Codescope::open(dir.path()).unwrap();
    project.index_project(None, None).await.unwrap();

    let handle = project.watch(Some(Duration::from_millis(100))).unwrap();
    for i in 0..5 {
        common::write(
            dir.path(),
            &format!("src/handler_{i}.rs"),
            &format!("pub fn handler_{i}() -> u32 {{\n    {i}\n}}\n"),
        );
    }
    tokio::time::sleep(Duration::from_millis(1500)).await;
    handle.stop().await.unwrap();

    let files = project.store().indexed_files().unwrap();
    assert_eq!(files.len(), 7, "indexed: {files:?}");
    assert!(files.contains(&"src/handler_4.rs".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watcher_indexes_a_directory_moved_in() {
    let dir = common::project_dir();
    let project = Codescope::open(dir.path()).unwrap();
    project.index_project(None, None).await.unwrap();

    let staging = tempfile::tempdir().unwrap();
    common::write(staging.path(), "moved/sub/a.rs", "pub fn moved_a() -> u8 {\n    1\n}\n");
    common::write(staging.path(), "moved/b.rs", "pub fn moved_b() -> u8 {\n    2\n}\n");

    let handle = project.watch(Some(Duration::from_millis(100))).unwrap();
    std::fs::rename(staging.path().join("moved"), dir.path().join("moved")).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    handle.stop().await.unwrap();

    let files = project.store().indexed_files().unwrap();
    assert!(files.contains(&"moved/sub/a.rs".to_string()), "indexed: {files:?}");
    assert!(files.contains(&"moved/b.rs".to_string()), "indexed: {files:?}");
}
