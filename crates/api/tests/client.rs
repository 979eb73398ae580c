#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use slurmrest_api::{ApiVersion, ClientConfig, EventKind, SlurmClient, WatchJobsOptions, WatchOptions, WatchPhase, WatchReservationsOptions};
use slurmrest_core::prelude::*;
use slurmrest_wire::mock::{MockAccessor, MockReply};
use slurmrest_wire::{Method, WireAccessor, WireRequest, WireResponse};

const JOBS: &str = "/slurm/v0.0.42/jobs";

fn jobs_body(jobs: &[(u32, &str)]) -> Value {
    let jobs: Vec<Value> = jobs
        .iter()
        .map(|(id, state)| json!({"job_id": id, "name": format!("j{id}"), "user_name": "ana", "job_state": [state]}))
        .collect();
    json!({ "jobs": jobs, "errors": [] })
}

async fn client(mock: &Arc<MockAccessor>) -> SlurmClient {
    SlurmClient::builder(mock.clone()).version("v0.0.42").build().await.unwrap()
}

#[tokio::test]
async fn explicit_version_needs_no_probe() {
    let mock = Arc::new(MockAccessor::new());
    let c = client(&mock).await;
    assert_eq!(c.version(), ApiVersion::V0_0_42);
    assert!(mock.calls().is_empty());

    let c = SlurmClient::builder(mock.clone()).version("latest").build().await.unwrap();
    assert_eq!(c.version(), ApiVersion::V0_0_43);

    let err = SlurmClient::builder(mock.clone()).version("v0.0.39").build().await.unwrap_err();
    assert!(matches!(err, SlurmError::UnsupportedVersion { .. }));
}

#[tokio::test]
async fn detects_version_from_openapi() {
    let mock = Arc::new(MockAccessor::new());
    mock.on(Method::Get, "/openapi/v3", MockReply::ok(json!({"info": {"version": "Slurm-24.05.4"}})));
    let c = SlurmClient::builder(mock.clone()).build().await.unwrap();
    assert_eq!(c.version(), ApiVersion::V0_0_40);
}

#[tokio::test]
async fn reads_are_cached_until_a_write() {
    let mock = Arc::new(MockAccessor::new());
    mock.on(Method::Get, JOBS, MockReply::ok(jobs_body(&[(10, "RUNNING"), (11, "PENDING")])));
    mock.on(Method::Delete, "/slurm/v0.0.42/job/10", MockReply::ok(json!({"errors": []})));
    let c = client(&mock).await;
    let opts = JobListOptions::default();

    let first = c.list_jobs(CallContext::new(), &opts).await.unwrap();
    let second = c.list_jobs(CallContext::new(), &opts).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(mock.call_count(Method::Get, JOBS), 1);
    let stats = c.cache_stats().unwrap();
    assert_eq!((stats.hits, stats.misses, stats.current_items), (1, 1, 1));

    // different filter, different key
    let mine = JobListOptions { states: vec![JobState::Pending], ..Default::default() };
    let pending = c.list_jobs(CallContext::new(), &mine).await.unwrap();
    assert_eq!(pending.iter().map(|j| j.job_id).collect::<Vec<_>>(), vec![11]);
    assert_eq!(mock.call_count(Method::Get, JOBS), 2);

    c.cancel_job(CallContext::new(), 10).await.unwrap();
    assert_eq!(c.cache_stats().unwrap().current_items, 0);
    c.list_jobs(CallContext::new(), &opts).await.unwrap();
    assert_eq!(mock.call_count(Method::Get, JOBS), 3);
}

#[tokio::test]
async fn writes_only_invalidate_their_kind() {
    let mock = Arc::new(MockAccessor::new());
    mock.on(Method::Get, JOBS, MockReply::ok(jobs_body(&[(10, "RUNNING")])));
    mock.on(
        Method::Get,
        "/slurm/v0.0.42/partitions",
        MockReply::ok(json!({"partitions": [{"name": "gpu", "partition": {"state": ["UP"]}}], "errors": []})),
    );
    mock.on(Method::Post, "/slurm/v0.0.42/node/cpu01", MockReply::ok(json!({"errors": []})));
    let c = client(&mock).await;

    c.list_jobs(CallContext::new(), &JobListOptions::default()).await.unwrap();
    c.list_partitions(CallContext::new(), &PartitionListOptions::default()).await.unwrap();
    assert_eq!(c.cache_stats().unwrap().current_items, 2);

    let drain = NodeUpdate { state: Some(slurmrest_core::NodeAdminState::Drain), reason: Some("disk".into()), ..Default::default() };
    c.update_node(CallContext::new(), "cpu01", &drain).await.unwrap();
    assert_eq!(c.cache_stats().unwrap().current_items, 2);

    assert_eq!(c.invalidate_cache("jobs.*"), 1);
    assert_eq!(c.invalidate_cache("partitions.list"), 1);
    assert_eq!(c.cache_stats().unwrap().current_items, 0);
}

#[tokio::test]
async fn errors_are_not_cached() {
    let mock = Arc::new(MockAccessor::new());
    mock.push(
        Method::Get,
        JOBS,
        MockReply::Json(
            500,
            json!({"errors": [{"error_number": 1, "error": "ESLURM_INTERNAL", "source": "ctl", "description": "boom"}]}),
        ),
    );
    mock.on(Method::Get, JOBS, MockReply::ok(jobs_body(&[(1, "RUNNING")])));
    let c = client(&mock).await;

    let err = c.list_jobs(CallContext::new(), &JobListOptions::default()).await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    let jobs = c.list_jobs(CallContext::new(), &JobListOptions::default()).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(mock.call_count(Method::Get, JOBS), 2);
}

#[tokio::test]
async fn cache_can_be_disabled() {
    let mock = Arc::new(MockAccessor::new());
    mock.on(Method::Get, JOBS, MockReply::ok(jobs_body(&[(1, "RUNNING")])));
    let c = SlurmClient::builder(mock.clone()).version("stable").without_cache().build().await.unwrap();
    c.list_jobs(CallContext::new(), &JobListOptions::default()).await.unwrap();
    c.list_jobs(CallContext::new(), &JobListOptions::default()).await.unwrap();
    assert_eq!(mock.call_count(Method::Get, JOBS), 2);
    assert!(c.cache_stats().is_none());
    assert_eq!(c.invalidate_cache("jobs.*"), 0);
}

#[tokio::test]
async fn get_job_not_found_and_ping() {
    let mock = Arc::new(MockAccessor::new());
    mock.on(Method::Get, "/slurm/v0.0.42/job/77", MockReply::ok(json!({"jobs": [], "errors": []})));
    mock.on(
        Method::Get,
        "/slurm/v0.0.42/ping",
        MockReply::ok(json!({"meta": {"slurm": {"release": "25.05.0", "cluster": "lab"}}, "pings": [], "errors": []})),
    );
    let c = client(&mock).await;

    let err = c.get_job(CallContext::new(), 77).await.unwrap_err();
    assert!(matches!(err, SlurmError::NotFound { .. }));

    let info = c.info(CallContext::new()).await.unwrap();
    assert_eq!(info.cluster_name, "lab");
    c.info(CallContext::new()).await.unwrap();
    c.ping(CallContext::new()).await.unwrap();
    // info and ping are cached under separate operations
    assert_eq!(mock.call_count(Method::Get, "/slurm/v0.0.42/ping"), 2);
}

#[tokio::test]
async fn max_ttl_from_env_caches_without_overflow() {
    let cfg = ClientConfig::from_lookup(|k| (k == "SLURMREST_CACHE_TTL_SECS").then(|| u64::MAX.to_string()));
    let cache = cfg.cache.clone().unwrap();
    assert_eq!(cache.default_ttl, Duration::from_secs(u64::MAX));

    let mock = Arc::new(MockAccessor::new());
    let path = "/slurmdb/v0.0.42/accounts";
    mock.on(Method::Get, path, MockReply::ok(json!({"accounts": [{"name": "physics"}], "errors": []})));
    let c = SlurmClient::builder(mock.clone()).version("v0.0.42").cache_config(cache).build().await.unwrap();
    for _ in 0..2 {
        let accounts = c.list_accounts(CallContext::new(), &AccountListOptions::default()).await.unwrap();
        assert_eq!(accounts[0].name, "physics");
    }
    assert_eq!(mock.call_count(Method::Get, path), 1);
    c.close();
}

#[tokio::test]
async fn stats_tally_nodes_and_jobs() {
    let mock = Arc::new(MockAccessor::new());
    mock.on(Method::Get, JOBS, MockReply::ok(jobs_body(&[(1, "RUNNING"), (2, "PENDING"), (3, "RUNNING")])));
    mock.on(
        Method::Get,
        "/slurm/v0.0.42/nodes",
        MockReply::ok(json!({
            "nodes": [
                {"name": "cpu01", "state": ["IDLE"], "cpus": 16, "alloc_cpus": 0},
                {"name": "cpu02", "state": ["MIXED"], "cpus": 16, "alloc_cpus": 6}
            ],
            "errors": []
        })),
    );
    let c = client(&mock).await;

    let s = c.stats(CallContext::new()).await.unwrap();
    assert_eq!((s.total_nodes, s.idle_nodes, s.allocated_nodes), (2, 1, 1));
    assert_eq!((s.total_cpus, s.idle_cpus, s.allocated_cpus), (32, 26, 6));
    assert_eq!((s.total_jobs, s.running_jobs, s.pending_jobs), (3, 2, 1));

    c.stats(CallContext::new()).await.unwrap();
    assert_eq!(mock.call_count(Method::Get, JOBS), 1);
    assert_eq!(c.invalidate_cache("info.stats"), 1);
}

/// Answers every call after a fixed delay.
struct SlowAccessor {
    delay: Duration,
    inner: MockAccessor,
}

#[async_trait::async_trait]
impl WireAccessor for SlowAccessor {
    async fn call(&self, req: WireRequest) -> SlurmResult<WireResponse> {
        tokio::time::sleep(self.delay).await;
        self.inner.call(req).await
    }
}

#[tokio::test(start_paused = true)]
async fn client_timeout_applies_when_context_has_none() {
    let inner = MockAccessor::new();
    inner.on(Method::Get, JOBS, MockReply::ok(jobs_body(&[])));
    let slow = Arc::new(SlowAccessor { delay: Duration::from_secs(10), inner });
    let c = SlurmClient::builder(slow).version("v0.0.42").timeout(Duration::from_secs(2)).build().await.unwrap();

    let err = c.list_jobs(CallContext::new(), &JobListOptions::default()).await.unwrap_err();
    assert_eq!(err, SlurmError::Timeout { after_ms: 2000 });

    let ctx = CallContext::new().timeout(Duration::from_secs(30));
    assert!(c.list_jobs(ctx, &JobListOptions::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_context_short_circuits() {
    let mock = Arc::new(MockAccessor::new());
    mock.on(Method::Get, JOBS, MockReply::ok(jobs_body(&[])));
    let c = client(&mock).await;
    let ctx = CallContext::new();
    ctx.cancel_token().cancel();
    assert_eq!(c.list_jobs(ctx, &JobListOptions::default()).await.unwrap_err(), SlurmError::Cancelled);
    assert_eq!(mock.call_count(Method::Get, JOBS), 0);
}

#[tokio::test(start_paused = true)]
async fn watch_jobs_bypasses_cache() {
    let mock = Arc::new(MockAccessor::new());
    mock.push(Method::Get, JOBS, MockReply::ok(jobs_body(&[(1, "RUNNING"), (2, "RUNNING")])));
    mock.on(Method::Get, JOBS, MockReply::ok(jobs_body(&[(1, "COMPLETED"), (2, "RUNNING"), (3, "PENDING")])));
    let c = client(&mock).await;

    let ctx = CallContext::new();
    let opts = WatchJobsOptions {
        job_ids: vec![1, 3],
        watch: Some(WatchOptions { interval: Duration::from_secs(1), ..Default::default() }),
        ..Default::default()
    };
    let mut h = c.watch_jobs(&ctx, opts);

    let e = h.recv().await.unwrap();
    assert_eq!((e.kind, e.id), (EventKind::New, Some(3)));
    let e = h.recv().await.unwrap();
    assert_eq!((e.kind, e.id), (EventKind::StateChanged, Some(1)));
    assert_eq!(e.new_state, Some(JobState::Completed));
    assert_eq!(c.cache_stats().unwrap().current_items, 0);

    // cancelling the caller's context ends the watch
    ctx.cancel_token().cancel();
    assert!(h.recv().await.is_none());
    assert_eq!(h.phase(), WatchPhase::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn reservation_watch_on_old_version_is_fatal() {
    let mock = Arc::new(MockAccessor::new());
    let c = client(&mock).await;
    let mut h = c.watch_reservations(&CallContext::new(), WatchReservationsOptions::default());

    let e = h.recv().await.unwrap();
    assert_eq!(e.kind, EventKind::Error);
    assert!(matches!(e.error, Some(SlurmError::UnsupportedOperation { .. })));
    assert!(h.recv().await.is_none());
    assert_eq!(h.phase(), WatchPhase::Fatal);
    assert!(mock.calls().is_empty());
}
