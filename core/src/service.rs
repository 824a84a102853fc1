/// MCPBlade aggregation engine
///
/// Owns the two backend pools, the one-shot tool discovery that builds the
/// routing table, the health supervisor and the request dispatcher.
///
/// Concurrency model: the persistent pool is frozen once `start()` returns
/// and read lock-free; the temporary pool sits behind a single RwLock whose
/// write side is held for the whole build+insert window of a registration;
/// the routing table and tool cache are published once by discovery and
/// never mutated, so readers snapshot by cloning.
use crate::config::{Config, McpServerConfig};
use crate::document::tool_to_document;
use crate::instance::McpServerInstance;
use crate::mcp::{self, BackendClient, CallToolRequest, CallToolResult, Tool};
use crate::vector::{Collection, VectorStore};
use crate::{Error, RequestContext, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Results returned by `search_tools` when the caller does not pick a k
const DEFAULT_SEARCH_RESULTS: usize = 5;

/// A discovery page that keeps failing is retried this many times before the
/// walk gives up on the server, so a sticky cursor can never loop forever.
const MAX_PAGE_RETRIES: u32 = 2;

pub struct Service {
    /// Frozen after construction; sorted iteration fixes the discovery order
    persistent: BTreeMap<String, Arc<McpServerInstance>>,

    /// Session-scoped backends, mutated at any time
    temporary: RwLock<HashMap<String, Arc<McpServerInstance>>>,

    /// effective tool name -> owning server id, published once by discovery
    routes: HashMap<String, String>,
    tools: Vec<Tool>,

    collection: Option<Arc<dyn Collection>>,

    cache_refresh_ttl: Duration,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl Service {
    pub fn builder(config: Config) -> ServiceBuilder {
        ServiceBuilder {
            config,
            vector_store: None,
            backends: Vec::new(),
        }
    }

    /// Register a temporary backend for session-scoped routing.
    ///
    /// The temporary write lock is held across the client build so the
    /// instance's whole lifetime is governed by one lock.
    pub async fn register_mcp_server(&self, id: &str, config: McpServerConfig) -> Result<()> {
        if id.is_empty() {
            return Err(Error::InvalidServerId);
        }

        let mut temporary = self.temporary.write().await;
        if self.persistent.contains_key(id) || temporary.contains_key(id) {
            return Err(Error::ServerAlreadyExists);
        }

        let client = mcp::connect(&config).await?;

        let instance = Arc::new(McpServerInstance::new(id.to_string(), config, client));
        instance.beat();
        temporary.insert(id.to_string(), instance);

        info!(target: "mcpblade", server_id = id, "registered temporary MCP server");
        Ok(())
    }

    /// Register a temporary backend with an already-connected client.
    /// Extension point for embedders bringing their own transport.
    pub async fn register_backend(
        &self,
        id: &str,
        config: McpServerConfig,
        client: Box<dyn BackendClient>,
    ) -> Result<()> {
        if id.is_empty() {
            return Err(Error::InvalidServerId);
        }

        let mut temporary = self.temporary.write().await;
        if self.persistent.contains_key(id) || temporary.contains_key(id) {
            return Err(Error::ServerAlreadyExists);
        }

        let instance = Arc::new(McpServerInstance::new(id.to_string(), config, client));
        instance.beat();
        temporary.insert(id.to_string(), instance);

        Ok(())
    }

    /// Remove a temporary backend and close its client.
    /// Persistent backends cannot be removed.
    pub async fn unregister_mcp_server(&self, id: &str, persistent: bool) -> Result<()> {
        if persistent {
            return Err(Error::UnsupportedPersistentServerRemoval);
        }

        if id.is_empty() {
            return Err(Error::InvalidServerId);
        }

        let instance = {
            let mut temporary = self.temporary.write().await;
            temporary.remove(id).ok_or(Error::ServerNotFound)?
        };

        info!(target: "mcpblade", server_id = id, "unregistered temporary MCP server");
        instance.client.close().await.map_err(Error::from)
    }

    /// List tools: the aggregated cache, or, with a session id, the live
    /// listing of that temporary backend (no cache, no rewriting).
    pub async fn list_tools(&self, ctx: &RequestContext) -> Result<Vec<Tool>> {
        let Some(server_id) = ctx.server_id.as_deref() else {
            if self.tools.is_empty() {
                return Err(Error::NoToolsFound);
            }

            return Ok(self.tools.clone());
        };

        let temporary = self.temporary.read().await;
        let instance = temporary.get(server_id).ok_or(Error::ServerNotFound)?;

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = instance.client.list_tools(cursor).await?;
            instance.beat();

            tools.extend(page.tools);

            cursor = page.next_cursor.filter(|next| !next.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        if tools.is_empty() {
            return Err(Error::NoToolsFound);
        }

        Ok(tools)
    }

    /// Semantic search over the indexed tool metadata.
    pub async fn search_tools(&self, query: &str, k: Option<usize>) -> Result<Vec<Tool>> {
        let collection = self.collection.as_ref().ok_or(Error::VectorDbNotSet)?;

        let k = k.filter(|k| *k > 0).unwrap_or(DEFAULT_SEARCH_RESULTS);

        let docs = collection.query(query, k).await?;
        if docs.is_empty() {
            return Err(Error::NoToolsFound);
        }

        docs.iter()
            .map(|doc| {
                let tool_json = doc
                    .metadata
                    .get("tool_json")
                    .ok_or(Error::InvalidToolDocument)?;

                serde_json::from_str(tool_json).map_err(|_| Error::InvalidToolDocument)
            })
            .collect()
    }

    /// Route a tool call to the owning backend.
    ///
    /// Without a session id the routing table decides, and a qualified name
    /// is stripped back to the backend-local one. With a session id the call
    /// goes verbatim to that temporary backend.
    pub async fn forward(&self, ctx: &RequestContext, mut req: CallToolRequest) -> Result<CallToolResult> {
        if let Some(server_id) = ctx.server_id.as_deref() {
            let temporary = self.temporary.read().await;
            let instance = temporary.get(server_id).ok_or(Error::ToolNotFound)?;

            let result = instance.client.call_tool(req.params).await?;
            instance.beat();

            return Ok(result);
        }

        let tool_name = req.params.name.clone();

        let server_id = self.routes.get(&tool_name).ok_or(Error::ToolNotFound)?;
        let instance = self.persistent.get(server_id).ok_or(Error::ToolNotFound)?;

        if let Some(bare) = tool_name.strip_prefix(&format!("{server_id}:")) {
            req.params.name = bare.to_string();
        }

        let result = instance.client.call_tool(req.params).await?;
        instance.beat();

        Ok(result)
    }

    /// Shut down the supervisor and close every backend client. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shutdown.cancel();

        for (id, instance) in &self.persistent {
            if let Err(err) = instance.client.close().await {
                error!(target: "mcpblade", server_id = %id, pool = "persistent", error = %err, "close failed");
                continue;
            }

            info!(target: "mcpblade", server_id = %id, pool = "persistent", "closed MCP client");
        }

        let mut temporary = self.temporary.write().await;
        for (id, instance) in temporary.drain() {
            if let Err(err) = instance.client.close().await {
                error!(target: "mcpblade", server_id = %id, pool = "temporary", error = %err, "close failed");
                continue;
            }

            info!(target: "mcpblade", server_id = %id, pool = "temporary", "closed MCP client");
        }
    }

    /// One-shot discovery: walk every persistent backend, merge paginated
    /// tool pages, resolve name collisions, annotate descriptions, index
    /// into the vector collection, then publish routes + cache atomically.
    async fn cache_tools(&mut self) {
        let mut routes = HashMap::new();
        let mut tools: Vec<Tool> = Vec::new();

        for (id, instance) in &self.persistent {
            let mut cursor: Option<String> = None;
            let mut retries = 0u32;

            loop {
                let page = match instance.client.list_tools(cursor.clone()).await {
                    Ok(page) => {
                        retries = 0;
                        page
                    }
                    Err(err) => {
                        error!(target: "mcpblade", server_id = %id, error = %err, "failed to list tools page");

                        if retries < MAX_PAGE_RETRIES {
                            retries += 1;
                            continue;
                        }

                        warn!(target: "mcpblade", server_id = %id, "giving up on tool discovery for server");
                        break;
                    }
                };

                instance.beat();

                for mut tool in page.tools {
                    tool.description = Some(match tool.description.take() {
                        Some(description) if !description.is_empty() => {
                            format!("{description} (provided by {id})")
                        }
                        _ => format!("Provided by {id}"),
                    });

                    if routes.contains_key(&tool.name) {
                        warn!(target: "mcpblade", server_id = %id, tool = %tool.name, "duplicate tool name found");
                        tool.name = format!("{id}:{}", tool.name);
                    }

                    routes.insert(tool.name.clone(), id.clone());

                    if let Some(collection) = &self.collection {
                        let doc = tool_to_document(&tool, id);

                        let known = matches!(
                            collection.find_document(&doc.id).await,
                            Ok(existing) if existing.id == doc.id
                        );

                        if !known {
                            match collection.add_document(doc).await {
                                Ok(()) => {
                                    debug!(target: "mcpblade", server_id = %id, tool = %tool.name, "indexed tool document");
                                }
                                Err(err) => {
                                    error!(target: "mcpblade", server_id = %id, tool = %tool.name, error = %err, "failed to index tool document");
                                }
                            }
                        }
                    }

                    tools.push(tool);
                }

                cursor = page.next_cursor.filter(|next| !next.is_empty());
                if cursor.is_none() {
                    break;
                }
            }
        }

        if tools.is_empty() {
            error!(target: "mcpblade", "no tools found");
        }

        info!(target: "mcpblade", count = tools.len(), "tools cached");

        self.routes = routes;
        self.tools = tools;
    }

    fn spawn_health_monitor(self: &Arc<Self>) {
        let interval = self.cache_refresh_ttl;
        if interval.is_zero() {
            warn!(target: "mcpblade", "cacheRefreshTTL is zero, health monitor disabled");
            return;
        }

        let svc = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick of `interval` completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = svc.shutdown.cancelled() => {
                        info!(target: "mcpblade", "health monitor stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        svc.check_health().await;
                    }
                }
            }
        });
    }

    async fn check_health(&self) {
        debug!(target: "mcpblade", "checking MCP server health");

        for (id, instance) in &self.persistent {
            match instance.client.ping().await {
                Ok(()) => {
                    instance.beat();
                    debug!(target: "mcpblade", server_id = %id, pool = "persistent", "server is alive");
                }
                Err(err) => {
                    error!(target: "mcpblade", server_id = %id, pool = "persistent", error = %err, "ping failed");
                }
            }
        }

        let temporary = self.temporary.read().await;
        for (id, instance) in temporary.iter() {
            match instance.client.ping().await {
                Ok(()) => {
                    instance.beat();
                    debug!(target: "mcpblade", server_id = %id, pool = "temporary", "server is alive");
                }
                Err(err) => {
                    error!(target: "mcpblade", server_id = %id, pool = "temporary", error = %err, "ping failed");
                }
            }
        }
    }
}

pub struct ServiceBuilder {
    config: Config,
    vector_store: Option<Arc<dyn VectorStore>>,
    backends: Vec<(String, McpServerConfig, Box<dyn BackendClient>)>,
}

impl ServiceBuilder {
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Pre-seed a persistent backend with an already-connected client.
    /// Takes precedence over a config entry with the same id.
    pub fn backend(
        mut self,
        id: impl Into<String>,
        config: McpServerConfig,
        client: Box<dyn BackendClient>,
    ) -> Self {
        self.backends.push((id.into(), config, client));
        self
    }

    /// Register the persistent pool, run discovery once, start the
    /// supervisor. Backends that fail to come up are logged and skipped;
    /// the service starts with whatever initialized successfully.
    pub async fn start(self) -> Result<Arc<Service>> {
        let collection = match &self.vector_store {
            Some(store) => Some(store.collection(&self.config.vector.collection).await?),
            None => None,
        };

        let mut persistent: BTreeMap<String, Arc<McpServerInstance>> = BTreeMap::new();

        for (id, config, client) in self.backends {
            if id.is_empty() {
                error!(target: "mcpblade", "skipping pre-seeded backend with empty id");
                continue;
            }

            if persistent.contains_key(&id) {
                error!(target: "mcpblade", server_id = %id, "skipping duplicate pre-seeded backend");
                continue;
            }

            let instance = Arc::new(McpServerInstance::new(id.clone(), config, client));
            instance.beat();
            persistent.insert(id.clone(), instance);

            info!(target: "mcpblade", server_id = %id, "registered persistent MCP server");
        }

        for (id, config) in &self.config.mcp_servers {
            if id.is_empty() {
                error!(target: "mcpblade", error = %Error::InvalidServerId, "skipping configured backend");
                continue;
            }

            if persistent.contains_key(id) {
                error!(target: "mcpblade", server_id = %id, error = %Error::ServerAlreadyExists, "skipping configured backend");
                continue;
            }

            match mcp::connect(config).await {
                Ok(client) => {
                    let instance =
                        Arc::new(McpServerInstance::new(id.clone(), config.clone(), client));
                    instance.beat();
                    persistent.insert(id.clone(), instance);

                    info!(target: "mcpblade", server_id = %id, "registered persistent MCP server");
                }
                Err(err) => {
                    error!(target: "mcpblade", server_id = %id, error = %err, "failed to register persistent MCP server");
                    continue;
                }
            }
        }

        let mut svc = Service {
            persistent,
            temporary: RwLock::new(HashMap::new()),
            routes: HashMap::new(),
            tools: Vec::new(),
            collection,
            cache_refresh_ttl: self.config.cache_refresh_ttl,
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        };

        // No reader exists yet; discovery publishes into the frozen fields.
        svc.cache_tools().await;

        let svc = Arc::new(svc);
        svc.spawn_health_monitor();

        Ok(svc)
    }
}
