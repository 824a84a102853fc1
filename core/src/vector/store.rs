/// Local vector store
///
/// In-process collections with cosine ranking and optional persistence as
/// one JSON file per document under `<path>/<collection>/`.
use super::embedding::{cosine_similarity, Embedder, HashingEmbedder};
use super::{Collection, Config, Document, VectorError, VectorStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub struct LocalVectorStore {
    collections: RwLock<HashMap<String, Arc<LocalCollection>>>,
    embedder: Arc<dyn Embedder>,
    root: Option<PathBuf>,
}

impl LocalVectorStore {
    pub fn new(config: &Config) -> Result<Self, VectorError> {
        Self::with_embedder(config, Arc::new(HashingEmbedder::default()))
    }

    pub fn with_embedder(
        config: &Config,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, VectorError> {
        let root = config.persistent.then(|| config.path.clone());
        if let Some(root) = &root {
            fs::create_dir_all(root)?;
        }

        Ok(Self {
            collections: RwLock::new(HashMap::new()),
            embedder,
            root,
        })
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn collection(&self, name: &str) -> Result<Arc<dyn Collection>, VectorError> {
        {
            let collections = self.collections.read().await;
            if let Some(collection) = collections.get(name) {
                return Ok(Arc::clone(collection) as Arc<dyn Collection>);
            }
        }

        let mut collections = self.collections.write().await;
        if let Some(collection) = collections.get(name) {
            return Ok(Arc::clone(collection) as Arc<dyn Collection>);
        }

        let dir = self.root.as_ref().map(|root| root.join(name));
        let collection = Arc::new(LocalCollection::open(
            name,
            dir,
            Arc::clone(&self.embedder),
        )?);
        collections.insert(name.to_string(), Arc::clone(&collection));

        Ok(collection as Arc<dyn Collection>)
    }
}

pub struct LocalCollection {
    name: String,
    dir: Option<PathBuf>,
    embedder: Arc<dyn Embedder>,
    documents: RwLock<HashMap<String, Document>>,
}

impl LocalCollection {
    fn open(
        name: &str,
        dir: Option<PathBuf>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, VectorError> {
        let mut documents = HashMap::new();

        if let Some(dir) = &dir {
            fs::create_dir_all(dir)?;

            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                if path.extension().map_or(true, |ext| ext != "json") {
                    continue;
                }

                match fs::read_to_string(&path)
                    .map_err(VectorError::from)
                    .and_then(|raw| serde_json::from_str::<Document>(&raw).map_err(VectorError::from))
                {
                    Ok(doc) => {
                        documents.insert(doc.id.clone(), doc);
                    }
                    Err(err) => {
                        warn!(
                            target: "vector_store",
                            collection = name,
                            path = %path.display(),
                            error = %err,
                            "skipping unreadable document"
                        );
                    }
                }
            }

            debug!(
                target: "vector_store",
                collection = name,
                count = documents.len(),
                "loaded persisted documents"
            );
        }

        Ok(Self {
            name: name.to_string(),
            dir,
            embedder,
            documents: RwLock::new(documents),
        })
    }

    fn persist(&self, doc: &Document) -> Result<(), VectorError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        let path = dir.join(format!("{}.json", doc.id));
        fs::write(path, serde_json::to_vec(doc)?)?;

        Ok(())
    }
}

#[async_trait]
impl Collection for LocalCollection {
    async fn add_document(&self, mut doc: Document) -> Result<(), VectorError> {
        if doc.id.is_empty() {
            return Err(VectorError::Embedding("document id is empty".to_string()));
        }

        if doc.embedding.is_empty() {
            doc.embedding = self.embedder.embed(&doc.content);
        }

        self.persist(&doc)?;

        debug!(
            target: "vector_store",
            collection = %self.name,
            id = %doc.id,
            "document added"
        );

        self.documents.write().await.insert(doc.id.clone(), doc);

        Ok(())
    }

    async fn find_document(&self, id: &str) -> Result<Document, VectorError> {
        self.documents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| VectorError::NotFound(id.to_string()))
    }

    async fn query(&self, query: &str, k: usize) -> Result<Vec<Document>, VectorError> {
        let documents = self.documents.read().await;

        let k = k.min(documents.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let needle = self.embedder.embed(query);

        let mut scored: Vec<(f32, &Document)> = documents
            .values()
            .map(|doc| (cosine_similarity(&needle, &doc.embedding), doc))
            .collect();

        // Ties broken by id so results are stable across runs.
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });

        Ok(scored.into_iter().take(k).map(|(_, doc)| doc.clone()).collect())
    }
}
