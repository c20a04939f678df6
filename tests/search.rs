mod common;

use std::sync::Arc;

use codescope::Codescope;
use codescope_core::{
    CodescopeError, ContextPack, ErrorKind, RerankMode, ScopeOverrides, Toggle,
};

use common::ConstantEmbedder;

async fn indexed() -> (tempfile::TempDir, Codescope) {
    let dir = common::project_dir();
    let project = Codescope::open(dir.path())
        .unwrap()
        .with_embedder(Arc::new(ConstantEmbedder));
    let report = project.index_project(None, None).await.unwrap();
    assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
    (dir, project)
}

#[tokio::test]
async fn named_function_is_found_and_readable() {
    let (_dir, project) = indexed().await;

    let response = project
        .search_code("validate_token", Some(5), None)
        .await
        .unwrap();
    let top = &response.results[0];
    assert_eq!(top.symbol, "validate_token");
    assert_eq!(top.file, "src/auth.rs");
    assert_eq!(top.score, 1.0);
    assert!(response.hybrid_meta.unwrap().enabled);
    assert_eq!(response.rerank_meta.unwrap().mode, RerankMode::Off);

    let body = project.get_chunk(&top.sha).unwrap();
    assert!(body.contains("fn validate_token"));
}

#[tokio::test]
async fn searching_before_indexing_suggests_indexing() {
    let dir = common::project_dir();
    let project = Codescope::open(dir.path()).unwrap();

    let err = project.search_code("anything", None, None).await.unwrap_err();
    let failure = err.to_failure();
    assert_eq!(failure.kind, ErrorKind::StoreNotFound);
    assert!(failure.suggestion.is_some());
}

#[tokio::test]
async fn context_pack_restricts_scope() {
    let (_dir, project) = indexed().await;
    let pack = ContextPack {
        name: "python".into(),
        description: "Python sources only".into(),
        languages: vec!["python".into()],
        hybrid_mode: Toggle::Off,
        ..ContextPack::default()
    };
    project.save_context_pack(&pack).unwrap();
    assert_eq!(project.load_context_pack("python").unwrap(), pack);
    assert_eq!(project.list_context_packs().unwrap().len(), 1);

    let scope = ScopeOverrides {
        context_pack: Some("python".into()),
        ..ScopeOverrides::default()
    };
    let response = project
        .search_code("validate_token", Some(5), Some(scope))
        .await
        .unwrap();
    assert!(!response.results.is_empty());
    assert!(response.results.iter().all(|r| r.language == "python"));
    assert!(!response.hybrid_meta.unwrap().enabled);
}

#[tokio::test]
async fn query_overrides_win_over_the_pack() {
    let (_dir, project) = indexed().await;
    project
        .save_context_pack(&ContextPack {
            name: "python".into(),
            languages: vec!["python".into()],
            ..ContextPack::default()
        })
        .unwrap();

    let scope = ScopeOverrides {
        context_pack: Some("python".into()),
        languages: Some(vec!["rust".into()]),
        ..ScopeOverrides::default()
    };
    let filter = project.resolve_scope(&scope).unwrap();
    assert_eq!(filter.languages, vec!["rust"]);
}

#[tokio::test]
async fn unknown_context_pack_is_an_error() {
    let (_dir, project) = indexed().await;
    let scope = ScopeOverrides {
        context_pack: Some("missing".into()),
        ..ScopeOverrides::default()
    };
    let err = project
        .search_code("validate_token", None, Some(scope))
        .await
        .unwrap_err();
    assert!(matches!(err, CodescopeError::FileNotFound(_)));
}

#[tokio::test]
async fn feedback_moves_success_rate() {
    let (_dir, project) = indexed().await;
    let id = project.store().all_chunks().unwrap()[0].id.clone();

    let rate = project.record_feedback(&id, true).unwrap();
    assert!((rate - 0.3).abs() < 1e-9);
    let rate = project.record_feedback(&id, false).unwrap();
    assert!((rate - 0.21).abs() < 1e-9);

    let record = project.store().get_chunk(&id).unwrap().unwrap();
    assert!(record.last_used_at.is_some());

    let err = project.record_feedback("nope", true).unwrap_err();
    assert!(matches!(err, CodescopeError::ChunkNotFound(_)));
}

#[tokio::test]
async fn query_patterns_are_counted() {
    let (_dir, project) = indexed().await;
    project.search_code("where is validate_token", None, None).await.unwrap();
    project.search_code("where is charge_card", None, None).await.unwrap();

    let patterns = project.top_query_patterns(5).unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].pattern, "where is {entity}");
    assert_eq!(patterns[0].frequency, 2);
}

#[tokio::test]
async fn other_provider_index_is_a_dimension_mismatch() {
    let (dir, project) = indexed().await;
    drop(project);

    let local = Codescope::open(dir.path()).unwrap();
    let err = local
        .search_code("validate_token", None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmbeddingDimensionMismatch);
    assert!(err.is_empty_result());
}
