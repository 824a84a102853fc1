/// Vector store abstraction
///
/// The engine only speaks to the store through `VectorStore`/`Collection`;
/// the embedder and index behind them are pluggable.
pub mod embedding;
pub mod store;

pub use embedding::{Embedder, HashingEmbedder};
pub use store::LocalVectorStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Vector store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub enabled: bool,
    pub persistent: bool,
    pub path: PathBuf,
    pub collection: String,
}

/// A stored document: stable id, searchable content, opaque metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Get or create the named collection.
    async fn collection(&self, name: &str) -> Result<Arc<dyn Collection>, VectorError>;
}

#[async_trait]
pub trait Collection: Send + Sync {
    async fn add_document(&self, doc: Document) -> Result<(), VectorError>;

    async fn find_document(&self, id: &str) -> Result<Document, VectorError>;

    /// Top-k semantic query. `k` is clipped to the collection size; an
    /// over-request never errors.
    async fn query(&self, query: &str, k: usize) -> Result<Vec<Document>, VectorError>;
}
