/// Semantic search scenarios: vector-indexed discovery, k handling, document
/// round-tripping and idempotent indexing against a persistent store.
mod support;

use mcpblade_core::vector::{Collection, Config as VectorConfig, Document, LocalVectorStore, VectorStore};
use mcpblade_core::{Config, Error, McpServerConfig, Service};
use std::path::PathBuf;
use std::sync::Arc;
use support::{tool, MockBackend};

fn vector_config(path: Option<PathBuf>) -> VectorConfig {
    VectorConfig {
        enabled: true,
        persistent: path.is_some(),
        path: path.unwrap_or_default(),
        collection: "tools".to_string(),
    }
}

fn time_backend() -> MockBackend {
    MockBackend::with_tools(vec![tool(
        "get_current_time",
        Some("Get the current time in a specific timezone"),
    )])
}

async fn indexed_service(store: Arc<LocalVectorStore>) -> Arc<Service> {
    Service::builder(Config::default())
        .vector_store(store)
        .backend("time", McpServerConfig::default(), Box::new(time_backend()))
        .backend("time2", McpServerConfig::default(), Box::new(time_backend()))
        .start()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_search_finds_time_tools() {
    let store = Arc::new(LocalVectorStore::new(&vector_config(None)).unwrap());
    let svc = indexed_service(store).await;

    let tools = svc.search_tools("what's the time?", None).await.unwrap();

    assert!(!tools.is_empty());
    assert!(tools[0].name.contains("get_current_time"));

    // results decode back to the annotated cache entries
    for t in &tools {
        assert!(t.description.as_deref().unwrap().contains("provided by"));
    }
}

#[tokio::test]
async fn test_search_respects_k() {
    let store = Arc::new(LocalVectorStore::new(&vector_config(None)).unwrap());
    let svc = indexed_service(store).await;

    let tools = svc.search_tools("current time", Some(1)).await.unwrap();
    assert_eq!(tools.len(), 1);

    // non-positive k falls back to the default
    let tools = svc.search_tools("current time", Some(0)).await.unwrap();
    assert_eq!(tools.len(), 2);
}

#[tokio::test]
async fn test_search_empty_index() {
    let store = Arc::new(LocalVectorStore::new(&vector_config(None)).unwrap());

    let svc = Service::builder(Config::default())
        .vector_store(store)
        .start()
        .await
        .unwrap();

    let err = svc.search_tools("anything", None).await.unwrap_err();
    assert!(matches!(err, Error::NoToolsFound));
}

#[tokio::test]
async fn test_search_rejects_document_without_tool_json() {
    let store = Arc::new(LocalVectorStore::new(&vector_config(None)).unwrap());

    let collection = store.collection("tools").await.unwrap();
    collection
        .add_document(Document {
            id: "tool_deadbeef".to_string(),
            content: "orphaned document".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let svc = Service::builder(Config::default())
        .vector_store(Arc::clone(&store) as Arc<dyn VectorStore>)
        .start()
        .await
        .unwrap();

    let err = svc.search_tools("orphaned document", None).await.unwrap_err();
    assert!(matches!(err, Error::InvalidToolDocument));
}

#[tokio::test]
async fn test_reindexing_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = vector_config(Some(dir.path().to_path_buf()));

    for _ in 0..2 {
        let store = Arc::new(LocalVectorStore::new(&config).unwrap());
        let svc = indexed_service(Arc::clone(&store)).await;
        svc.close().await;
    }

    // same tool set discovered twice leaves the document count unchanged
    let store = LocalVectorStore::new(&config).unwrap();
    let collection = store.collection("tools").await.unwrap();
    let all = collection.query("get_current_time", 100).await.unwrap();
    assert_eq!(all.len(), 2);
}
