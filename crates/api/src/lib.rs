//! slurmrest facade client.
//!
//! One handle per cluster: the version adapter chosen at build time, an
//! optional response cache in front of the read operations and the watch
//! entry points. Frontends (the CLI) depend only on this crate.

#![forbid(unsafe_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::histogram;
use serde::de::DeserializeOwned;
use serde::Serialize;
use slurmrest_core::prelude::*;
use slurmrest_wire::{AdapterRegistry, OpenApiProbe, VersionAdapter, VersionProbe, WireAccessor};
use tracing::{debug, info, warn};

pub mod config;
mod watch;

pub use config::ClientConfig;
pub use slurmrest_cache::{CacheConfig, CacheProfile, CacheStats, ItemStats, Operation, ResponseCache};
pub use slurmrest_watch::{EventKind, WatchEvent, WatchHandle, WatchOptions, WatchPhase, Watchable};
pub use slurmrest_wire::ApiVersion;
pub use watch::{WatchJobsOptions, WatchNodesOptions, WatchPartitionsOptions, WatchReservationsOptions};

enum CacheChoice {
    Build(CacheConfig),
    Shared(ResponseCache),
    Disabled,
}

pub struct SlurmClientBuilder {
    accessor: Arc<dyn WireAccessor>,
    cache: CacheChoice,
    probe: Option<Arc<dyn VersionProbe>>,
    version: String,
    timeout: Option<Duration>,
    watch: WatchOptions,
}

impl SlurmClientBuilder {
    pub fn new(accessor: Arc<dyn WireAccessor>) -> Self {
        Self {
            accessor,
            cache: CacheChoice::Build(CacheConfig::default()),
            probe: None,
            version: String::new(),
            timeout: None,
            watch: WatchOptions::default(),
        }
    }

    /// Share an existing cache (and its sweep) with this client.
    pub fn cache(mut self, cache: ResponseCache) -> Self {
        self.cache = CacheChoice::Shared(cache);
        self
    }

    pub fn cache_config(mut self, cfg: CacheConfig) -> Self {
        self.cache = CacheChoice::Build(cfg);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = CacheChoice::Disabled;
        self
    }

    /// Used when no version hint is set. Defaults to the server's OpenAPI document.
    pub fn probe(mut self, probe: Arc<dyn VersionProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Exact version (`v0.0.42`) or alias (`latest`, `stable`). Empty detects.
    pub fn version(mut self, hint: impl Into<String>) -> Self {
        self.version = hint.into();
        self
    }

    /// Deadline for calls whose context carries none.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn watch_defaults(mut self, opts: WatchOptions) -> Self {
        self.watch = opts;
        self
    }

    pub async fn build(self) -> SlurmResult<SlurmClient> {
        let t0 = Instant::now();
        let registry = AdapterRegistry::new(Arc::clone(&self.accessor));
        let probe = match self.probe {
            Some(p) => p,
            None => Arc::new(OpenApiProbe::new(Arc::clone(&self.accessor))),
        };
        let ctx = CallContext::new().or_timeout(self.timeout);
        let adapter = ctx.run(registry.resolve(&self.version, Some(probe.as_ref()))).await?;
        let cache = match self.cache {
            CacheChoice::Build(cfg) => {
                let cache = ResponseCache::new(cfg);
                cache.start_sweeper();
                Some(cache)
            }
            CacheChoice::Shared(cache) => Some(cache),
            CacheChoice::Disabled => None,
        };
        info!(version = %adapter.version(), cache = cache.is_some(), took_ms = %t0.elapsed().as_millis(), "api: client ready");
        Ok(SlurmClient { inner: Arc::new(Inner { adapter, cache, timeout: self.timeout, watch: self.watch }) })
    }
}

struct Inner {
    adapter: Arc<dyn VersionAdapter>,
    cache: Option<ResponseCache>,
    timeout: Option<Duration>,
    watch: WatchOptions,
}

/// Cheap to clone; clones share the adapter and the cache.
#[derive(Clone)]
pub struct SlurmClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SlurmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlurmClient")
            .field("version", &self.inner.adapter.version())
            .field("cache", &self.inner.cache.is_some())
            .finish()
    }
}

impl SlurmClient {
    pub fn builder(accessor: Arc<dyn WireAccessor>) -> SlurmClientBuilder { SlurmClientBuilder::new(accessor) }

    /// Client from `SLURM_*` / `SLURMREST_*` environment variables.
    pub async fn from_env() -> SlurmResult<Self> { ClientConfig::from_env().builder()?.build().await }

    /// Wire version of the active adapter.
    pub fn version(&self) -> ApiVersion { self.inner.adapter.version() }

    pub fn cache(&self) -> Option<&ResponseCache> { self.inner.cache.as_ref() }

    pub fn cache_stats(&self) -> Option<CacheStats> { self.inner.cache.as_ref().map(|c| c.stats()) }

    /// Drop cached responses whose key matches `pattern` (`jobs.*`, a prefix or a full key).
    pub fn invalidate_cache(&self, pattern: &str) -> usize {
        match &self.inner.cache {
            Some(c) => {
                let n = c.invalidate_pattern(pattern);
                info!(pattern = %pattern, removed = n, "api: cache invalidated");
                n
            }
            None => 0,
        }
    }

    /// Stop the cache sweep. Other calls keep working.
    pub fn close(&self) {
        if let Some(c) = &self.inner.cache {
            c.close();
        }
    }

    pub(crate) fn watch_defaults(&self) -> &WatchOptions { &self.inner.watch }

    fn adapter(&self) -> &dyn VersionAdapter { self.inner.adapter.as_ref() }

    fn observe<T>(&self, op: &'static str, t0: Instant, res: &SlurmResult<T>) {
        histogram!("api_call_ms", t0.elapsed().as_secs_f64() * 1000.0, "op" => op);
        match res {
            Ok(_) => info!(op, took_ms = %t0.elapsed().as_millis(), "api: call ok"),
            Err(e) => warn!(op, error = %e, took_ms = %t0.elapsed().as_millis(), "api: call failed"),
        }
    }

    async fn cached<P, T, F, Fut>(
        &self,
        ctx: CallContext,
        op: Operation,
        params: &P,
        use_cache: bool,
        fetch: F,
    ) -> SlurmResult<T>
    where
        P: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = SlurmResult<T>>,
    {
        let t0 = Instant::now();
        let cache = self.inner.cache.as_ref().filter(|_| use_cache);
        if let Some(hit) = cache.and_then(|c| c.get_json::<P, T>(op, params)) {
            debug!(op = %op, "api: served from cache");
            return Ok(hit);
        }
        let res = ctx.or_timeout(self.inner.timeout).run(fetch()).await;
        self.observe(op.as_str(), t0, &res);
        let value = res?;
        if let Some(c) = cache {
            c.set_json(op, params, &value);
        }
        Ok(value)
    }

    async fn write<T, Fut>(&self, ctx: CallContext, op: &'static str, invalidate: &str, fut: Fut) -> SlurmResult<T>
    where
        Fut: Future<Output = SlurmResult<T>>,
    {
        let t0 = Instant::now();
        let res = ctx.or_timeout(self.inner.timeout).run(fut).await;
        self.observe(op, t0, &res);
        let value = res?;
        if let Some(c) = &self.inner.cache {
            let n = c.invalidate_pattern(invalidate);
            debug!(op, pattern = %invalidate, removed = n, "api: cache invalidated after write");
        }
        Ok(value)
    }

    // ---------------- Cluster ----------------

    /// Controller liveness. Cached briefly.
    pub async fn ping(&self, ctx: CallContext) -> SlurmResult<ClusterInfo> {
        self.cached(ctx, Operation::InfoPing, &(), true, || self.adapter().ping()).await
    }

    /// Cluster identity and release.
    pub async fn info(&self, ctx: CallContext) -> SlurmResult<ClusterInfo> {
        self.cached(ctx, Operation::InfoGet, &(), true, || self.adapter().ping()).await
    }

    /// Node and job totals, built from fresh node and job lists.
    pub async fn stats(&self, ctx: CallContext) -> SlurmResult<ClusterStats> {
        self.cached(ctx, Operation::InfoStats, &(), true, || async {
            let nodes = self.adapter().list_nodes(&NodeListOptions::default()).await?;
            let jobs = self.adapter().list_jobs(&JobListOptions::default()).await?;
            Ok::<_, SlurmError>(ClusterStats::tally(&nodes, &jobs))
        })
        .await
    }

    // ---------------- Jobs ----------------

    pub async fn list_jobs(&self, ctx: CallContext, opts: &JobListOptions) -> SlurmResult<Vec<Job>> {
        self.fetch_jobs(ctx, opts, true).await
    }

    pub(crate) async fn fetch_jobs(&self, ctx: CallContext, opts: &JobListOptions, use_cache: bool) -> SlurmResult<Vec<Job>> {
        self.cached(ctx, Operation::JobsList, opts, use_cache, || self.adapter().list_jobs(opts)).await
    }

    pub async fn get_job(&self, ctx: CallContext, job_id: u32) -> SlurmResult<Job> {
        self.cached(ctx, Operation::JobsGet, &job_id, true, || self.adapter().get_job(job_id)).await
    }

    pub async fn submit_job(&self, ctx: CallContext, req: &JobSubmit) -> SlurmResult<JobSubmitted> {
        self.write(ctx, "jobs.submit", "jobs.*", self.adapter().submit_job(req)).await
    }

    pub async fn update_job(&self, ctx: CallContext, job_id: u32, update: &JobUpdate) -> SlurmResult<()> {
        self.write(ctx, "jobs.update", "jobs.*", self.adapter().update_job(job_id, update)).await
    }

    pub async fn cancel_job(&self, ctx: CallContext, job_id: u32) -> SlurmResult<()> {
        self.write(ctx, "jobs.cancel", "jobs.*", self.adapter().cancel_job(job_id)).await
    }

    // ---------------- Nodes ----------------

    pub async fn list_nodes(&self, ctx: CallContext, opts: &NodeListOptions) -> SlurmResult<Vec<Node>> {
        self.fetch_nodes(ctx, opts, true).await
    }

    pub(crate) async fn fetch_nodes(&self, ctx: CallContext, opts: &NodeListOptions, use_cache: bool) -> SlurmResult<Vec<Node>> {
        self.cached(ctx, Operation::NodesList, opts, use_cache, || self.adapter().list_nodes(opts)).await
    }

    pub async fn get_node(&self, ctx: CallContext, name: &str) -> SlurmResult<Node> {
        self.cached(ctx, Operation::NodesGet, name, true, || self.adapter().get_node(name)).await
    }

    pub async fn update_node(&self, ctx: CallContext, name: &str, update: &NodeUpdate) -> SlurmResult<()> {
        self.write(ctx, "nodes.update", "nodes.*", self.adapter().update_node(name, update)).await
    }

    pub async fn delete_node(&self, ctx: CallContext, name: &str) -> SlurmResult<()> {
        self.write(ctx, "nodes.delete", "nodes.*", self.adapter().delete_node(name)).await
    }

    // ---------------- Partitions ----------------

    pub async fn list_partitions(&self, ctx: CallContext, opts: &PartitionListOptions) -> SlurmResult<Vec<Partition>> {
        self.fetch_partitions(ctx, opts, true).await
    }

    pub(crate) async fn fetch_partitions(
        &self,
        ctx: CallContext,
        opts: &PartitionListOptions,
        use_cache: bool,
    ) -> SlurmResult<Vec<Partition>> {
        self.cached(ctx, Operation::PartitionsList, opts, use_cache, || self.adapter().list_partitions(opts)).await
    }

    pub async fn get_partition(&self, ctx: CallContext, name: &str) -> SlurmResult<Partition> {
        self.cached(ctx, Operation::PartitionsGet, name, true, || self.adapter().get_partition(name)).await
    }

    // ---------------- Accounts ----------------

    pub async fn list_accounts(&self, ctx: CallContext, opts: &AccountListOptions) -> SlurmResult<Vec<Account>> {
        self.cached(ctx, Operation::AccountsList, opts, true, || self.adapter().list_accounts(opts)).await
    }

    pub async fn get_account(&self, ctx: CallContext, name: &str) -> SlurmResult<Account> {
        self.cached(ctx, Operation::AccountsGet, name, true, || self.adapter().get_account(name)).await
    }

    pub async fn create_account(&self, ctx: CallContext, req: &AccountCreate) -> SlurmResult<()> {
        self.write(ctx, "accounts.create", "accounts.*", self.adapter().create_account(req)).await
    }

    pub async fn delete_account(&self, ctx: CallContext, name: &str) -> SlurmResult<()> {
        self.write(ctx, "accounts.delete", "accounts.*", self.adapter().delete_account(name)).await
    }

    // ---------------- Reservations ----------------

    pub async fn list_reservations(&self, ctx: CallContext, opts: &ReservationListOptions) -> SlurmResult<Vec<Reservation>> {
        self.fetch_reservations(ctx, opts, true).await
    }

    pub(crate) async fn fetch_reservations(
        &self,
        ctx: CallContext,
        opts: &ReservationListOptions,
        use_cache: bool,
    ) -> SlurmResult<Vec<Reservation>> {
        self.cached(ctx, Operation::ReservationsList, opts, use_cache, || self.adapter().list_reservations(opts)).await
    }

    pub async fn get_reservation(&self, ctx: CallContext, name: &str) -> SlurmResult<Reservation> {
        self.cached(ctx, Operation::ReservationsGet, name, true, || self.adapter().get_reservation(name)).await
    }

    pub async fn create_reservation(&self, ctx: CallContext, req: &ReservationCreate) -> SlurmResult<()> {
        self.write(ctx, "reservations.create", "reservations.*", self.adapter().create_reservation(req)).await
    }

    pub async fn update_reservation(&self, ctx: CallContext, name: &str, update: &ReservationUpdate) -> SlurmResult<()> {
        self.write(ctx, "reservations.update", "reservations.*", self.adapter().update_reservation(name, update)).await
    }

    pub async fn delete_reservation(&self, ctx: CallContext, name: &str) -> SlurmResult<()> {
        self.write(ctx, "reservations.delete", "reservations.*", self.adapter().delete_reservation(name)).await
    }
}
