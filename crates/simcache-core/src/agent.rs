//! Agent lifecycle and event dispatch.
//!
//! [`AgentContext`] holds everything one activation of the agent owns: the
//! config, the blob stores, the ledger handle and, once loaded, the manifest.
//! It is created explicitly and passed to every operation, so tests can run
//! isolated instances side by side.
//!
//! Startup moves the context through `Uninitialized → ManifestLoaded → Ready`,
//! or to `Failed` when no manifest can be obtained. [`Agent`] owns the event
//! loop: intercepted requests are always served, messages that arrive before
//! startup settles are queued and released once it does.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, oneshot, watch, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::broker::{ClientHandle, ClientId, MessageBroker};
use crate::cache::{CacheStorage, CacheStore};
use crate::config::AgentConfig;
use crate::error::{AgentError, AgentResult};
use crate::interceptor::{Intercepted, NetworkInterceptor, RouteCanonicalizer};
use crate::ledger::LocationLedger;
use crate::manifest::ManifestFetcher;
use crate::models::{AgentReply, ClientMessage, Manifest};
use crate::network::{Network, NetworkError};
use crate::prefetch::{ImagePrefetcher, PrefetchReport};
use crate::utils::resolve_all;

/// Buffer size for the agent's inbound event channel.
const EVENT_CHANNEL_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    ManifestLoaded,
    Ready,
    /// Startup failed; requests are still served from whatever is cached.
    Failed,
}

impl Phase {
    /// Startup has finished, one way or the other.
    pub fn is_settled(self) -> bool {
        matches!(self, Phase::Ready | Phase::Failed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    pub generation_id: String,
    /// The active generation's store already existed before this startup.
    pub generation_existed: bool,
    pub deleted_stores: Vec<String>,
    pub baseline_added: usize,
    /// Result of re-caching the saved selection, if there was one.
    pub rehydrated: Option<PrefetchReport>,
    /// Population steps that failed. They leave the agent usable.
    pub failures: Vec<String>,
}

pub struct AgentContext {
    config: AgentConfig,
    origin: Url,
    manifest_url: Url,
    storage: CacheStorage,
    network: Arc<dyn Network>,
    ledger: Option<LocationLedger>,
    manifest: RwLock<Option<Arc<Manifest>>>,
    phase: watch::Sender<Phase>,
    interceptor: NetworkInterceptor,
    reinit: Notify,
}

impl AgentContext {
    /// Build the context for one activation and open the ledger.
    ///
    /// A ledger that fails to open is logged and left unavailable: the agent
    /// still serves requests, but selection requests will fail.
    pub async fn activate(config: AgentConfig, network: Arc<dyn Network>) -> AgentResult<Arc<Self>> {
        let origin = config.origin_url()?;
        let manifest_url = config.manifest_url()?;
        let stores_dir = config
            .stores_dir()
            .map_err(|e| AgentError::Config(e.to_string()))?;
        let canonicalizer = RouteCanonicalizer::new(&config.canonical_route)
            .map_err(|e| AgentError::Config(e.to_string()))?;

        let ledger = match config.ledger_path() {
            Ok(path) => match LocationLedger::open(path, config.ledger_mode).await {
                Ok(ledger) => Some(ledger),
                Err(e) => {
                    error!(error = %e, "Failed to open location ledger");
                    None
                }
            },
            Err(e) => {
                error!(error = %e, "No location for the ledger");
                None
            }
        };

        let (phase, _) = watch::channel(Phase::Uninitialized);
        info!(origin = %origin, "Agent activated");

        Ok(Arc::new(Self {
            storage: CacheStorage::new(stores_dir, network.clone()),
            config,
            origin,
            manifest_url,
            network,
            ledger,
            manifest: RwLock::new(None),
            phase,
            interceptor: NetworkInterceptor::new(canonicalizer),
            reinit: Notify::new(),
        }))
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    pub fn ledger(&self) -> AgentResult<&LocationLedger> {
        self.ledger.as_ref().ok_or_else(|| {
            AgentError::LedgerUnavailable(
                "the selection store was not opened during activation".to_string(),
            )
        })
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Wait until startup has either completed or failed.
    pub async fn wait_until_settled(&self) -> Phase {
        let mut phases = self.phase.subscribe();
        let settled = match phases.wait_for(|phase| phase.is_settled()).await {
            Ok(phase) => *phase,
            Err(_) => self.phase(),
        };
        settled
    }

    pub async fn manifest(&self) -> Option<Arc<Manifest>> {
        self.manifest.read().await.clone()
    }

    /// The store for the loaded manifest's generation.
    pub async fn active_store(&self) -> AgentResult<CacheStore> {
        let manifest = self
            .manifest()
            .await
            .ok_or_else(|| AgentError::NotReady("manifest not loaded".to_string()))?;
        Ok(self.storage.open(&manifest.generation_id).await?)
    }

    /// Ask the event loop for another startup attempt.
    pub fn request_reinit(&self) {
        self.reinit.notify_one();
    }

    /// Run startup: load the manifest, drop stale generations, then re-cache
    /// the saved selection and the baseline files concurrently.
    pub async fn initialize(&self) -> AgentResult<StartupReport> {
        self.phase.send_replace(Phase::Uninitialized);
        match self.run_startup().await {
            Ok(report) => {
                self.phase.send_replace(Phase::Ready);
                info!(
                    generation = %report.generation_id,
                    baseline_added = report.baseline_added,
                    failures = report.failures.len(),
                    "Agent ready"
                );
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Agent initialization failed");
                self.phase.send_replace(Phase::Failed);
                Err(e)
            }
        }
    }

    async fn run_startup(&self) -> AgentResult<StartupReport> {
        let fetcher = ManifestFetcher::new(
            self.network.clone(),
            self.storage.clone(),
            self.manifest_url.clone(),
            self.config.manifest_store_name.as_str(),
        );
        let manifest = Arc::new(fetcher.load().await?);
        let generation = manifest.generation_id.clone();

        let generation_existed = self.storage.has(&generation).await?;
        let keep = [generation.as_str(), self.config.manifest_store_name.as_str()];
        let deleted_stores = self.storage.delete_stores_except(&keep).await?;

        *self.manifest.write().await = Some(manifest.clone());
        self.phase.send_replace(Phase::ManifestLoaded);

        let store = self.storage.open(&generation).await?;
        let selection = match &self.ledger {
            Some(ledger) => ledger.load().await.unwrap_or_else(|e| {
                warn!(error = %e, "Could not read saved location selection");
                None
            }),
            None => {
                warn!("Location ledger unavailable, skipping saved selection");
                None
            }
        };

        let rehydrate = async {
            match &selection {
                Some(codes) => {
                    info!(locations = ?codes, "Re-caching saved locations");
                    ImagePrefetcher::new(&manifest, &store, &self.origin)
                        .prefetch(codes)
                        .await
                        .map(Some)
                }
                None => Ok(None),
            }
        };
        let baseline = self.populate_baseline(&manifest, &store, generation_existed);
        let (rehydrated, baseline) = tokio::join!(rehydrate, baseline);

        let mut report = StartupReport {
            generation_id: generation,
            generation_existed,
            deleted_stores,
            ..StartupReport::default()
        };
        match rehydrated {
            Ok(rehydrated) => report.rehydrated = rehydrated,
            Err(e) => {
                error!(error = %e, "Failed to re-cache saved locations");
                report.failures.push(e.to_string());
            }
        }
        match baseline {
            Ok(added) => report.baseline_added = added,
            Err(e) => {
                error!(error = %e, "Failed to cache baseline files");
                report.failures.push(e.to_string());
            }
        }
        Ok(report)
    }

    /// A new generation downloads every baseline file in one all-or-nothing
    /// batch. An existing one only fetches the files it is missing.
    async fn populate_baseline(
        &self,
        manifest: &Manifest,
        store: &CacheStore,
        generation_existed: bool,
    ) -> AgentResult<usize> {
        let urls = resolve_all(&self.origin, &manifest.baseline_files)?;
        if !generation_existed {
            info!(files = urls.len(), "Downloading baseline files");
            return Ok(store.add_all(&urls).await?);
        }

        let checks = urls.iter().map(|url| async move {
            if store.contains(url).await? {
                return Ok(0);
            }
            debug!(url = %url, "Baseline file missing, adding");
            store.add(url).await?;
            Ok::<usize, AgentError>(1)
        });

        let mut added = 0;
        let mut first_error = None;
        for result in join_all(checks).await {
            match result {
                Ok(n) => added += n,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(added),
        }
    }

    /// Serve one intercepted request.
    pub async fn handle_fetch(&self, url: &Url) -> Result<Intercepted, NetworkError> {
        self.interceptor.handle(self, url).await
    }

    /// Persist a selection, then cache its image sets.
    pub async fn cache_locations(&self, codes: &[String]) -> AgentResult<PrefetchReport> {
        let key = self.ledger()?.save(codes).await?;
        debug!(key, "Persisted location selection");

        let manifest = self
            .manifest()
            .await
            .ok_or_else(|| AgentError::NotReady("manifest not loaded".to_string()))?;
        let store = self.storage.open(&manifest.generation_id).await?;
        ImagePrefetcher::new(&manifest, &store, &self.origin)
            .prefetch(codes)
            .await
    }
}

pub enum AgentEvent {
    Fetch {
        url: Url,
        respond_to: oneshot::Sender<Result<Intercepted, NetworkError>>,
    },
    Message {
        client: ClientId,
        message: ClientMessage,
    },
}

/// The agent's event loop.
pub struct Agent {
    ctx: Arc<AgentContext>,
    broker: Arc<MessageBroker>,
    events: mpsc::Receiver<AgentEvent>,
    pending: Vec<(ClientId, ClientMessage)>,
}

/// Cheap, cloneable access to a running agent.
#[derive(Clone)]
pub struct AgentHandle {
    ctx: Arc<AgentContext>,
    broker: Arc<MessageBroker>,
    events: mpsc::Sender<AgentEvent>,
}

impl Agent {
    /// Start the event loop and kick off startup. The loop runs until every
    /// handle and client has been dropped.
    pub fn spawn(ctx: Arc<AgentContext>) -> (AgentHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let broker = Arc::new(MessageBroker::new());
        let agent = Agent {
            ctx: ctx.clone(),
            broker: broker.clone(),
            events: rx,
            pending: Vec::new(),
        };
        let handle = AgentHandle {
            ctx,
            broker,
            events: tx,
        };
        (handle, tokio::spawn(agent.run()))
    }

    async fn run(mut self) {
        let (startup_tx, mut startup_rx) = mpsc::channel(1);
        self.start(startup_tx.clone());

        loop {
            tokio::select! {
                Some(result) = startup_rx.recv() => self.on_startup_finished(result),
                _ = self.ctx.reinit.notified() => {
                    if self.ctx.phase() == Phase::Failed {
                        info!("Retrying agent initialization");
                        // Leave Failed now so further cold fetches don't start another attempt.
                        self.ctx.phase.send_replace(Phase::Uninitialized);
                        self.start(startup_tx.clone());
                    }
                }
                event = self.events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
            }
        }
        debug!("Agent event loop stopped");
    }

    fn start(&self, done: mpsc::Sender<AgentResult<StartupReport>>) {
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let result = ctx.initialize().await;
            let _ = done.send(result).await;
        });
    }

    fn on_startup_finished(&mut self, result: AgentResult<StartupReport>) {
        let pending = std::mem::take(&mut self.pending);
        match result {
            Ok(_) => {
                if !pending.is_empty() {
                    debug!(count = pending.len(), "Releasing queued messages");
                }
                for (client, message) in pending {
                    self.spawn_message(client, message);
                }
            }
            Err(e) => {
                let reason = e.to_string();
                for (client, _) in pending {
                    self.spawn_reply(client, AgentReply::CacheError {
                        error: reason.clone(),
                    });
                }
            }
        }
    }

    fn dispatch(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::Fetch { url, respond_to } => {
                let ctx = self.ctx.clone();
                tokio::spawn(async move {
                    let result = ctx.handle_fetch(&url).await;
                    let _ = respond_to.send(result);
                });
            }
            AgentEvent::Message { client, message } => match self.ctx.phase() {
                Phase::Ready => self.spawn_message(client, message),
                Phase::Failed => self.spawn_reply(
                    client,
                    AgentReply::CacheError {
                        error: "the offline cache failed to initialize".to_string(),
                    },
                ),
                Phase::Uninitialized | Phase::ManifestLoaded => {
                    debug!(client, "Queueing message until startup completes");
                    self.pending.push((client, message));
                }
            },
        }
    }

    fn spawn_message(&self, client: ClientId, message: ClientMessage) {
        let ctx = self.ctx.clone();
        let broker = self.broker.clone();
        tokio::spawn(async move {
            broker.handle_message(&ctx, client, message).await;
        });
    }

    fn spawn_reply(&self, client: ClientId, reply: AgentReply) {
        let broker = self.broker.clone();
        tokio::spawn(async move {
            broker.post(client, reply).await;
        });
    }
}

impl AgentHandle {
    pub fn context(&self) -> &Arc<AgentContext> {
        &self.ctx
    }

    pub async fn wait_until_settled(&self) -> Phase {
        self.ctx.wait_until_settled().await
    }

    /// Route a request through the agent.
    pub async fn fetch(&self, url: Url) -> AgentResult<Intercepted> {
        let (respond_to, response) = oneshot::channel();
        self.events
            .send(AgentEvent::Fetch { url, respond_to })
            .await
            .map_err(|_| AgentError::Stopped)?;
        let result = response.await.map_err(|_| AgentError::Stopped)?;
        Ok(result?)
    }

    /// Connect a new foreground client.
    pub async fn connect(&self) -> ClientHandle {
        self.broker.register(self.events.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::InterceptOutcome;
    use crate::ledger::LedgerMode;
    use crate::models::HttpResponse;
    use crate::test_utils::{test_config, url, FakeNetwork, SCENARIO_MANIFEST};

    fn scenario_network() -> Arc<FakeNetwork> {
        Arc::new(
            FakeNetwork::new()
                .with_body("/cache.json", SCENARIO_MANIFEST)
                .with_body("a.html", "home")
                .with_body("e1.png", "image"),
        )
    }

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn test_scenario_a_first_start_caches_baseline_only() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AgentContext::activate(test_config(dir.path()), scenario_network())
            .await
            .unwrap();

        let report = ctx.initialize().await.unwrap();

        assert_eq!(ctx.phase(), Phase::Ready);
        assert!(!report.generation_existed);
        assert_eq!(report.baseline_added, 1);
        assert_eq!(report.rehydrated, None);
        let store = ctx.active_store().await.unwrap();
        assert_eq!(store.keys().await.unwrap(), vec![url("a.html").to_string()]);
    }

    #[tokio::test]
    async fn test_scenario_b_cache_locations() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AgentContext::activate(test_config(dir.path()), scenario_network())
            .await
            .unwrap();
        ctx.initialize().await.unwrap();

        let report = ctx.cache_locations(&codes(&["EJ.1"])).await.unwrap();

        assert_eq!(report.cached_locations, codes(&["EJ.1"]));
        assert_eq!(ctx.ledger().unwrap().load().await.unwrap(), Some(codes(&["EJ.1"])));
        let store = ctx.active_store().await.unwrap();
        assert!(store.contains(&url("e1.png")).await.unwrap());
    }

    #[tokio::test]
    async fn test_scenario_c_no_manifest_still_serves_cached_content() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(FakeNetwork::new());
        network.set_offline(true);
        let ctx = AgentContext::activate(test_config(dir.path()), network.clone())
            .await
            .unwrap();
        let old = ctx.storage().open("g0").await.unwrap();
        let key = url("a.html");
        old.put(&key, &HttpResponse::new(key.as_str(), 200, "old home"))
            .await
            .unwrap();

        let result = ctx.initialize().await;

        assert!(matches!(result, Err(AgentError::ManifestUnavailable(_))));
        assert_eq!(ctx.phase(), Phase::Failed);
        let served = ctx.handle_fetch(&key).await.unwrap();
        assert_eq!(served.outcome, InterceptOutcome::ServedFromCache);
        assert_eq!(&served.response.body[..], b"old home");
        assert!(matches!(
            ctx.cache_locations(&codes(&["EJ.1"])).await,
            Err(AgentError::NotReady(_))
        ));
    }

    #[tokio::test]
    async fn test_scenario_d_stale_generation_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AgentContext::activate(test_config(dir.path()), scenario_network())
            .await
            .unwrap();
        ctx.storage().open("g0").await.unwrap();

        let report = ctx.initialize().await.unwrap();

        assert_eq!(report.deleted_stores, vec!["g0"]);
        assert_eq!(
            ctx.storage().keys().await.unwrap(),
            vec!["g1", "simulador-cache"]
        );
    }

    #[tokio::test]
    async fn test_scenario_e_failed_file_reports_prefetch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let network = scenario_network();
        network.set_status("e1.png", 500);
        let ctx = AgentContext::activate(test_config(dir.path()), network)
            .await
            .unwrap();
        ctx.initialize().await.unwrap();

        let result = ctx.cache_locations(&codes(&["EJ.1"])).await;
        assert!(matches!(result, Err(AgentError::PrefetchFailure { .. })));
        // The selection is persisted before downloading starts.
        assert_eq!(ctx.ledger().unwrap().load().await.unwrap(), Some(codes(&["EJ.1"])));
    }

    #[tokio::test]
    async fn test_restart_rehydrates_saved_selection() {
        let dir = tempfile::tempdir().unwrap();
        let network = scenario_network();
        {
            let ctx = AgentContext::activate(test_config(dir.path()), network.clone())
                .await
                .unwrap();
            ctx.initialize().await.unwrap();
            ctx.cache_locations(&codes(&["EJ.1"])).await.unwrap();
        }

        // New generation: everything is downloaded again into g2.
        network.set_body(
            "/cache.json",
            r#"{"cache": "g2", "archivos": ["a.html"], "imagenes": [{"codigo": "EJ.1", "archivos": ["e1.png"]}]}"#,
        );
        let ctx = AgentContext::activate(test_config(dir.path()), network)
            .await
            .unwrap();
        let report = ctx.initialize().await.unwrap();

        assert_eq!(report.deleted_stores, vec!["g1"]);
        let rehydrated = report.rehydrated.expect("saved selection is re-cached");
        assert_eq!(rehydrated.cached_locations, codes(&["EJ.1"]));
        let store = ctx.active_store().await.unwrap();
        assert_eq!(store.name(), "g2");
        assert_eq!(store.keys().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_existing_generation_only_fetches_missing_baseline_files() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(
            FakeNetwork::new()
                .with_body(
                    "/cache.json",
                    r#"{"cache": "g1", "archivos": ["a.html", "b.html"], "imagenes": []}"#,
                )
                .with_body("a.html", "a")
                .with_body("b.html", "b"),
        );
        let ctx = AgentContext::activate(test_config(dir.path()), network.clone())
            .await
            .unwrap();
        ctx.initialize().await.unwrap();
        ctx.active_store().await.unwrap().delete(&url("b.html")).await.unwrap();

        let report = ctx.initialize().await.unwrap();

        assert!(report.generation_existed);
        assert_eq!(report.baseline_added, 1);
        assert_eq!(network.request_count("a.html"), 1);
        assert_eq!(network.request_count("b.html"), 2);
    }

    #[tokio::test]
    async fn test_baseline_failure_leaves_agent_ready() {
        let dir = tempfile::tempdir().unwrap();
        let network = scenario_network();
        network.set_failure("a.html", "connection refused");
        let ctx = AgentContext::activate(test_config(dir.path()), network)
            .await
            .unwrap();

        let report = ctx.initialize().await.unwrap();

        assert_eq!(ctx.phase(), Phase::Ready);
        assert_eq!(report.failures.len(), 1);
        assert!(ctx.storage().has("g1").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_ledger_fails_selection_requests() {
        let dir = tempfile::tempdir().unwrap();
        let ledger_path = dir.path().join("simulador-ubicaciones.json");
        std::fs::write(&ledger_path, r#"{"schema_version": 42}"#).unwrap();
        let ctx = AgentContext::activate(test_config(dir.path()), scenario_network())
            .await
            .unwrap();
        ctx.initialize().await.unwrap();

        let result = ctx.cache_locations(&codes(&["EJ.1"])).await;
        assert!(matches!(result, Err(AgentError::LedgerUnavailable(_))));
    }

    #[tokio::test]
    async fn test_upsert_mode_rehydrates_latest_selection() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.ledger_mode = LedgerMode::Upsert;
        let ctx = AgentContext::activate(config, scenario_network()).await.unwrap();
        ctx.initialize().await.unwrap();

        ctx.cache_locations(&codes(&["XX.1"])).await.unwrap();
        ctx.cache_locations(&codes(&["EJ.1"])).await.unwrap();

        assert_eq!(ctx.ledger().unwrap().load().await.unwrap(), Some(codes(&["EJ.1"])));
    }

    #[tokio::test]
    async fn test_event_loop_serves_fetches_and_settles() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AgentContext::activate(test_config(dir.path()), scenario_network())
            .await
            .unwrap();
        let (handle, _task) = Agent::spawn(ctx);

        assert_eq!(handle.wait_until_settled().await, Phase::Ready);
        let result = handle.fetch(url("a.html")).await.unwrap();
        assert_eq!(result.outcome, InterceptOutcome::ServedFromCache);
    }

    #[tokio::test]
    async fn test_cold_fetch_retries_failed_startup() {
        let dir = tempfile::tempdir().unwrap();
        let network = scenario_network();
        network.set_offline(true);
        let mut config = test_config(dir.path());
        config.reinit_on_cold_fetch = true;
        let ctx = AgentContext::activate(config, network.clone()).await.unwrap();
        let (handle, _task) = Agent::spawn(ctx.clone());
        assert_eq!(handle.wait_until_settled().await, Phase::Failed);

        network.set_offline(false);
        let result = handle.fetch(url("e1.png")).await.unwrap();
        assert_eq!(result.outcome, InterceptOutcome::CacheWriteSkipped);

        let mut phases = ctx.subscribe_phase();
        let phase = *phases.wait_for(|p| *p == Phase::Ready).await.unwrap();
        assert_eq!(phase, Phase::Ready);
    }

    #[tokio::test]
    async fn test_concurrent_cold_fetches_start_one_retry() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(
            FakeNetwork::new()
                .with_body("a.html", "home")
                .with_body("e1.png", "image"),
        );
        network.set_status("/cache.json", 503);
        let mut config = test_config(dir.path());
        config.reinit_on_cold_fetch = true;
        let ctx = AgentContext::activate(config, network.clone()).await.unwrap();
        let (handle, _task) = Agent::spawn(ctx.clone());
        assert_eq!(handle.wait_until_settled().await, Phase::Failed);

        network.set_body("/cache.json", SCENARIO_MANIFEST);
        let (first, second) = tokio::join!(
            handle.fetch(url("e1.png")),
            handle.fetch(url("a.html"))
        );
        first.unwrap();
        second.unwrap();

        let mut phases = ctx.subscribe_phase();
        phases.wait_for(|p| *p == Phase::Ready).await.unwrap();
        assert_eq!(network.request_count("/cache.json"), 2);
    }
}
