//! Offline cache manager implementation

use futures::future::{join_all, try_join_all};
use http::StatusCode;
use minuteur_proxy::{FetchRequest, Fetcher};
use minuteur_storage::{CacheKey, CacheStore, StorageError, StoredResponse};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use url::Url;

use super::entry::{to_response, to_stored};
use super::policy;
use crate::config::OfflineConfig;
use crate::error::CoreError;
use crate::events::{
    ActivationReport, Effect, EventOutcome, FetchOutcome, InstallReport, RefreshReport,
    ResponseSource, ServiceEvent, SyncOutcome,
};
use crate::lifecycle::{Lifecycle, WorkerState};
use crate::message::{ClientMessage, ReplyPort, VersionReply};
use crate::notification::{NotificationClick, build_notification, route_click};

/// Counters of intercepted traffic
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hit_count: u64,
    pub miss_count: u64,
    pub network_failures: u64,
    pub fallbacks_served: u64,
    pub dynamic_writes: u64,
    pub dynamic_write_failures: u64,
}

/// Offline cache manager
///
/// Owns the three current partitions and answers every event raised by the
/// host: install, activate, fetch interception, sync, periodic sync, push,
/// notification clicks and client messages.
pub struct OfflineCacheManager {
    config: Arc<OfflineConfig>,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    lifecycle: Lifecycle,
    pending: TaskTracker,
    /// Serializes [`OfflineCacheManager::settle`] callers
    settling: Mutex<()>,
    stats: Arc<RwLock<CacheStats>>,
}

/// What a partition held for a batch of keys before the batch was written
struct PartitionSnapshot {
    partition: String,
    existed: bool,
    previous: Vec<(CacheKey, Option<StoredResponse>)>,
}

impl OfflineCacheManager {
    /// Create a new manager over a store and a fetcher
    pub fn new(
        config: OfflineConfig,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        info!(
            "Initializing offline cache manager (version: {}, scope: {}, partitions: {:?})",
            config.version,
            config.scope,
            config.partition_names()
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            fetcher,
            lifecycle: Lifecycle::new(),
            pending: TaskTracker::new(),
            settling: Mutex::new(()),
            stats: Arc::new(RwLock::new(CacheStats::default())),
        })
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.state()
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }

    /// Handle any event
    pub async fn dispatch(&self, event: ServiceEvent) -> Result<EventOutcome, CoreError> {
        debug!("Dispatching {} event", event.kind());

        match event {
            ServiceEvent::Install => self.install().await.map(EventOutcome::Installed),
            ServiceEvent::Activate => self.activate().await.map(EventOutcome::Activated),
            ServiceEvent::Fetch(request) => self.handle_fetch(request).await.map(EventOutcome::Fetch),
            ServiceEvent::Sync { tag } => self.handle_sync(&tag).await.map(EventOutcome::Synced),
            ServiceEvent::PeriodicSync { tag } => self
                .handle_periodic_sync(&tag)
                .await
                .map(EventOutcome::Refreshed),
            ServiceEvent::Push { payload } => {
                Ok(EventOutcome::Effects(self.handle_push(payload.as_deref())))
            }
            ServiceEvent::NotificationClick(click) => Ok(EventOutcome::Effects(
                self.handle_notification_click(&click),
            )),
            ServiceEvent::Message { message, reply } => {
                Ok(EventOutcome::Effects(self.handle_message(message, reply)))
            }
        }
    }

    /// Load the static assets into the primary and static partitions
    ///
    /// Every asset must answer with a success status and both partitions
    /// must accept the batch; otherwise both partitions are put back the way
    /// they were and the worker becomes redundant.
    pub async fn install(&self) -> Result<InstallReport, CoreError> {
        self.lifecycle.transition(WorkerState::Installing);

        match self.load_static_assets().await {
            Ok(assets) => {
                self.lifecycle.transition(WorkerState::Installed);
                self.lifecycle.request_skip_waiting();
                info!("Installed {} static assets", assets);

                Ok(InstallReport {
                    assets,
                    partitions: vec![
                        self.config.primary_cache_name.clone(),
                        self.config.static_cache_name.clone(),
                    ],
                    effects: vec![Effect::SkipWaiting],
                })
            }
            Err(e) => {
                error!("Install failed: {}", e);
                self.lifecycle.transition(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    async fn load_static_assets(&self) -> Result<usize, CoreError> {
        let urls = self.config.static_asset_urls()?;
        info!("Fetching {} static assets", urls.len());

        let entries = try_join_all(urls.iter().map(|url| self.fetch_asset(url))).await?;
        let count = entries.len();

        let primary = &self.config.primary_cache_name;
        let statics = &self.config.static_cache_name;
        let existing = self.store.partitions().await?;

        let mut written = Vec::with_capacity(2);
        for partition in [statics, primary] {
            let result: Result<(), StorageError> = async {
                let snapshot = self
                    .snapshot(partition, existing.contains(partition), &entries)
                    .await?;
                written.push(snapshot);
                self.store.open(partition).await?;
                self.store.put_all(partition, entries.clone()).await
            }
            .await;

            if let Err(e) = result {
                warn!(
                    "Storing static assets in {} failed, rolling back {} partitions: {}",
                    partition,
                    written.len(),
                    e
                );
                for snapshot in written.into_iter().rev() {
                    self.restore(snapshot).await;
                }
                return Err(e.into());
            }
        }

        Ok(count)
    }

    async fn snapshot(
        &self,
        partition: &str,
        existed: bool,
        entries: &[(CacheKey, StoredResponse)],
    ) -> Result<PartitionSnapshot, StorageError> {
        let mut previous = Vec::with_capacity(entries.len());
        for (key, _) in entries {
            let stored = if existed {
                self.store.get(partition, key).await?
            } else {
                None
            };
            previous.push((key.clone(), stored));
        }
        Ok(PartitionSnapshot {
            partition: partition.to_string(),
            existed,
            previous,
        })
    }

    /// Put a partition back the way a snapshot found it
    async fn restore(&self, snapshot: PartitionSnapshot) {
        let partition = snapshot.partition;

        if !snapshot.existed {
            if let Err(e) = self.store.delete_partition(&partition).await {
                warn!("Failed to remove partition {}: {}", partition, e);
            }
            return;
        }

        let mut previous = Vec::new();
        for (key, stored) in snapshot.previous {
            match stored {
                Some(stored) => previous.push((key, stored)),
                None => {
                    if let Err(e) = self.store.delete(&partition, &key).await {
                        warn!("Failed to remove {} from {}: {}", key, partition, e);
                    }
                }
            }
        }

        if !previous.is_empty()
            && let Err(e) = self.store.put_all(&partition, previous).await
        {
            warn!("Failed to restore {}: {}", partition, e);
        }
    }

    async fn fetch_asset(&self, url: &Url) -> Result<(CacheKey, StoredResponse), CoreError> {
        let response = self.fetcher.fetch(&FetchRequest::get(url.clone())).await?;
        if !response.status.is_success() {
            return Err(CoreError::AssetUnavailable {
                url: url.to_string(),
                status: response.status.as_u16(),
            });
        }
        Ok((CacheKey::get(url), to_stored(&response)))
    }

    /// Delete every partition left over from other versions and claim the
    /// open clients
    pub async fn activate(&self) -> Result<ActivationReport, CoreError> {
        self.lifecycle.transition(WorkerState::Activating);

        let stale: Vec<String> = match self.store.partitions().await {
            Ok(names) => names
                .into_iter()
                .filter(|name| !self.config.is_current_partition(name))
                .collect(),
            Err(e) => {
                self.lifecycle.transition(WorkerState::Installed);
                return Err(e.into());
            }
        };

        let deletions = stale.iter().map(|name| async move {
            info!("Deleting stale cache partition {}", name);
            self.store
                .delete_partition(name)
                .await
                .map(|existed| existed.then(|| name.clone()))
        });

        let deleted: Vec<String> = match try_join_all(deletions).await {
            Ok(results) => results.into_iter().flatten().collect(),
            Err(e) => {
                self.lifecycle.transition(WorkerState::Installed);
                return Err(e.into());
            }
        };

        self.lifecycle.transition(WorkerState::Activated);
        info!(
            "Activated version {} ({} stale partitions removed)",
            self.config.version,
            deleted.len()
        );

        Ok(ActivationReport {
            deleted,
            effects: vec![Effect::ClaimClients],
        })
    }

    /// Answer an intercepted request: cache first, then network, then the
    /// offline fallbacks
    pub async fn handle_fetch(&self, request: FetchRequest) -> Result<FetchOutcome, CoreError> {
        if !request.is_network_scheme() {
            debug!("Bypassing non-network request {}", request.url);
            return Ok(FetchOutcome::Bypass(request));
        }

        let key = CacheKey::new(request.method.as_str(), &request.url);

        match self.lookup(&key).await {
            Ok(Some((partition, stored))) => {
                debug!("Cache hit for {} in {}", key, partition);
                self.record_hit().await;
                return Ok(FetchOutcome::Respond {
                    response: to_response(stored),
                    source: ResponseSource::Cache { partition },
                });
            }
            Ok(None) => debug!("Cache miss for {}", key),
            Err(e) => warn!("Cache lookup failed for {}: {}", key, e),
        }
        self.record_miss().await;

        match self.fetcher.fetch(&request).await {
            Ok(response) => {
                if policy::should_cache_dynamic(&self.config, &request, &response) {
                    self.spawn_dynamic_write(key, to_stored(&response));
                }
                Ok(FetchOutcome::Respond {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(e) => {
                self.record_network_failure().await;

                if let Some(asset) = policy::fallback_asset(&self.config, &request) {
                    let fallback_key = CacheKey::get(&self.config.resolve(asset)?);
                    match self.lookup(&fallback_key).await {
                        Ok(Some((_, stored))) => {
                            warn!("Network failed for {} ({}), serving {}", request.url, e, asset);
                            self.record_fallback().await;
                            return Ok(FetchOutcome::Respond {
                                response: to_response(stored),
                                source: ResponseSource::Fallback {
                                    asset: asset.to_string(),
                                },
                            });
                        }
                        Ok(None) => debug!("Fallback {} is not cached", asset),
                        Err(lookup_err) => {
                            warn!("Fallback lookup failed for {}: {}", asset, lookup_err)
                        }
                    }
                }

                Err(e.into())
            }
        }
    }

    /// Search the current partitions in order: primary, static, dynamic
    async fn lookup(&self, key: &CacheKey) -> Result<Option<(String, StoredResponse)>, CoreError> {
        for partition in self.config.partition_names() {
            if let Some(stored) = self.store.get(partition, key).await? {
                return Ok(Some((partition.to_string(), stored)));
            }
        }
        Ok(None)
    }

    fn spawn_dynamic_write(&self, key: CacheKey, stored: StoredResponse) {
        let store = Arc::clone(&self.store);
        let stats = Arc::clone(&self.stats);
        let partition = self.config.dynamic_cache_name.clone();

        self.pending.spawn(async move {
            let result: Result<(), StorageError> = async {
                store.open(&partition).await?;
                store.put(&partition, key.clone(), stored).await
            }
            .await;

            match result {
                Ok(()) => {
                    debug!("Cached {} in {}", key, partition);
                    stats.write().await.dynamic_writes += 1;
                }
                Err(e) => {
                    warn!("Failed to cache {} in {}: {}", key, partition, e);
                    stats.write().await.dynamic_write_failures += 1;
                }
            }
        });
    }

    /// Wait for the background cache writes started so far
    ///
    /// Concurrent callers take turns; each one waits for the writes pending
    /// when its turn comes.
    pub async fn settle(&self) {
        let _guard = self.settling.lock().await;
        self.pending.close();
        self.pending.wait().await;
        self.pending.reopen();
    }

    /// Handle a background sync registration
    pub async fn handle_sync(&self, tag: &str) -> Result<SyncOutcome, CoreError> {
        if tag != self.config.sync_tag {
            debug!("Ignoring sync tag {}", tag);
            return Ok(SyncOutcome::Ignored);
        }

        info!("Background sync triggered");
        self.sync_pending_data()
            .await
            .inspect_err(|e| error!("Background sync failed: {}", e))?;

        Ok(SyncOutcome::Completed)
    }

    /// Reconcile data recorded while offline. The timer keeps no server
    /// side state yet, so there is nothing to send.
    async fn sync_pending_data(&self) -> Result<(), CoreError> {
        debug!("No pending data to reconcile");
        Ok(())
    }

    /// Handle a periodic sync. Returns `None` for unknown tags.
    pub async fn handle_periodic_sync(&self, tag: &str) -> Result<Option<RefreshReport>, CoreError> {
        if tag != self.config.periodic_sync_tag {
            debug!("Ignoring periodic sync tag {}", tag);
            return Ok(None);
        }

        Ok(Some(self.refresh_critical().await))
    }

    /// Re-fetch the critical assets into the primary partition
    ///
    /// Each asset is handled on its own: a failure is logged and reported
    /// without stopping the others.
    pub async fn refresh_critical(&self) -> RefreshReport {
        info!(
            "Refreshing {} critical assets",
            self.config.critical_assets.len()
        );

        let results = join_all(
            self.config
                .critical_assets
                .iter()
                .map(|asset| async move { (asset, self.refresh_asset(asset).await) }),
        )
        .await;

        let mut report = RefreshReport::default();
        for (asset, result) in results {
            match result {
                Ok(true) => report.refreshed.push(asset.clone()),
                Ok(false) => report.skipped.push(asset.clone()),
                Err(e) => {
                    warn!("Failed to refresh {}: {}", asset, e);
                    report.failed.push(asset.clone());
                }
            }
        }

        info!(
            "Refresh complete: {} refreshed, {} skipped, {} failed",
            report.refreshed.len(),
            report.skipped.len(),
            report.failed.len()
        );
        report
    }

    async fn refresh_asset(&self, asset: &str) -> Result<bool, CoreError> {
        let url = self.config.resolve(asset)?;
        let response = self.fetcher.fetch(&FetchRequest::get(url.clone())).await?;

        if response.status != StatusCode::OK {
            debug!("Not refreshing {}: origin answered {}", asset, response.status);
            return Ok(false);
        }

        self.store
            .put(
                &self.config.primary_cache_name,
                CacheKey::get(&url),
                to_stored(&response),
            )
            .await?;
        Ok(true)
    }

    /// Build the notification for a push message
    pub fn handle_push(&self, payload: Option<&[u8]>) -> Vec<Effect> {
        debug!("Push received ({} bytes)", payload.map_or(0, <[u8]>::len));
        vec![Effect::ShowNotification(build_notification(
            &self.config,
            payload,
        ))]
    }

    pub fn handle_notification_click(&self, click: &NotificationClick) -> Vec<Effect> {
        route_click(&self.config, click)
    }

    /// Handle a message posted by a client
    pub fn handle_message(&self, message: ClientMessage, reply: Option<ReplyPort>) -> Vec<Effect> {
        match message {
            ClientMessage::SkipWaiting => {
                info!("Client requested skip waiting");
                self.lifecycle.request_skip_waiting();
                vec![Effect::SkipWaiting]
            }
            ClientMessage::GetVersion => {
                match reply {
                    Some(port) => {
                        let version = VersionReply {
                            version: self.config.version.clone(),
                        };
                        if port.send(version).is_err() {
                            debug!("Client closed its reply port before the version was sent");
                        }
                    }
                    None => warn!("Version requested without a reply port"),
                }
                Vec::new()
            }
            ClientMessage::Unknown => {
                debug!("Ignoring unknown client message");
                Vec::new()
            }
        }
    }

    async fn record_hit(&self) {
        self.stats.write().await.hit_count += 1;
    }

    async fn record_miss(&self) {
        self.stats.write().await.miss_count += 1;
    }

    async fn record_network_failure(&self) {
        self.stats.write().await.network_failures += 1;
    }

    async fn record_fallback(&self) {
        self.stats.write().await.fallbacks_served += 1;
    }
}

/// Spawn a background task that refreshes the critical assets periodically
pub fn spawn_refresh_task(
    manager: Arc<OfflineCacheManager>,
    interval_hours: u64,
) -> tokio::task::JoinHandle<()> {
    use tokio::time::{Duration, interval};

    info!(
        "Starting periodic refresh task (interval: {} hours)",
        interval_hours
    );

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(interval_hours.max(1) * 3600));

        // Skip the first tick (which fires immediately)
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let tag = manager.config().periodic_sync_tag.clone();
            if let Err(e) = manager.dispatch(ServiceEvent::PeriodicSync { tag }).await {
                warn!("Error during periodic refresh: {}", e);
            }
        }
    })
}
