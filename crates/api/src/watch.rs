//! Watch entry points. Each watch polls through the client, bypassing the
//! response cache unless asked otherwise so diffs see fresh state.

use std::sync::Arc;

use slurmrest_core::prelude::*;
use slurmrest_watch::{spawn_watch, ListSource, WatchHandle, WatchOptions};
use tracing::info;

use crate::SlurmClient;

#[derive(Debug, Clone, Default)]
pub struct WatchJobsOptions {
    pub job_ids: Vec<u32>,
    pub states: Vec<JobState>,
    pub use_cache: bool,
    /// `None` uses the client's watch defaults.
    pub watch: Option<WatchOptions>,
}

#[derive(Debug, Clone, Default)]
pub struct WatchNodesOptions {
    pub names: Vec<String>,
    pub states: Vec<NodeState>,
    pub partition: Option<String>,
    pub use_cache: bool,
    pub watch: Option<WatchOptions>,
}

#[derive(Debug, Clone, Default)]
pub struct WatchPartitionsOptions {
    pub names: Vec<String>,
    pub states: Vec<PartitionState>,
    pub use_cache: bool,
    pub watch: Option<WatchOptions>,
}

#[derive(Debug, Clone, Default)]
pub struct WatchReservationsOptions {
    pub names: Vec<String>,
    pub use_cache: bool,
    pub watch: Option<WatchOptions>,
}

struct Lister<O> {
    client: SlurmClient,
    opts: O,
    use_cache: bool,
}

#[async_trait::async_trait]
impl ListSource<Job> for Lister<JobListOptions> {
    async fn list(&self) -> SlurmResult<Vec<Job>> {
        self.client.fetch_jobs(CallContext::new(), &self.opts, self.use_cache).await
    }
}

#[async_trait::async_trait]
impl ListSource<Node> for Lister<NodeListOptions> {
    async fn list(&self) -> SlurmResult<Vec<Node>> {
        self.client.fetch_nodes(CallContext::new(), &self.opts, self.use_cache).await
    }
}

#[async_trait::async_trait]
impl ListSource<Partition> for Lister<PartitionListOptions> {
    async fn list(&self) -> SlurmResult<Vec<Partition>> {
        self.client.fetch_partitions(CallContext::new(), &self.opts, self.use_cache).await
    }
}

#[async_trait::async_trait]
impl ListSource<Reservation> for Lister<ReservationListOptions> {
    async fn list(&self) -> SlurmResult<Vec<Reservation>> {
        self.client.fetch_reservations(CallContext::new(), &self.opts, self.use_cache).await
    }
}

impl SlurmClient {
    fn spawn<R, O>(&self, ctx: &CallContext, opts: O, use_cache: bool, watch: Option<WatchOptions>) -> WatchHandle<R>
    where
        R: slurmrest_watch::Watchable,
        O: Send + Sync + 'static,
        Lister<O>: ListSource<R>,
    {
        let watch = watch.unwrap_or_else(|| self.watch_defaults().clone());
        info!(kind = %R::KIND, interval_ms = watch.interval.as_millis() as u64, use_cache, "api: watch start");
        let source: Arc<dyn ListSource<R>> = Arc::new(Lister { client: self.clone(), opts, use_cache });
        spawn_watch(source, watch, None, ctx.cancel_token().child_token())
    }

    /// Cancelling `ctx` (or the handle) stops the watch.
    pub fn watch_jobs(&self, ctx: &CallContext, opts: WatchJobsOptions) -> WatchHandle<Job> {
        let list = JobListOptions { job_ids: opts.job_ids, states: opts.states, ..Default::default() };
        self.spawn(ctx, list, opts.use_cache, opts.watch)
    }

    pub fn watch_nodes(&self, ctx: &CallContext, opts: WatchNodesOptions) -> WatchHandle<Node> {
        let list = NodeListOptions { names: opts.names, states: opts.states, partition: opts.partition };
        self.spawn(ctx, list, opts.use_cache, opts.watch)
    }

    pub fn watch_partitions(&self, ctx: &CallContext, opts: WatchPartitionsOptions) -> WatchHandle<Partition> {
        let list = PartitionListOptions { names: opts.names, states: opts.states };
        self.spawn(ctx, list, opts.use_cache, opts.watch)
    }

    pub fn watch_reservations(&self, ctx: &CallContext, opts: WatchReservationsOptions) -> WatchHandle<Reservation> {
        let list = ReservationListOptions { names: opts.names };
        self.spawn(ctx, list, opts.use_cache, opts.watch)
    }
}
