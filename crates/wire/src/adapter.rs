//! REST adapter shared plumbing, parameterized by a per-version [`WireSchema`].

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use slurmrest_core::prelude::*;
use tracing::debug;

use crate::common::{self, JobsEnvelope};
use crate::version::ApiVersion;
use crate::{
    AccountAdapter, JobAdapter, NodeAdapter, PartitionAdapter, ReservationAdapter, VersionAdapter,
    WireAccessor, WireRequest, WireResponse,
};

/// What differs between wire versions. Each supported version has one
/// zero-sized implementation.
pub trait WireSchema: Send + Sync + 'static {
    const VERSION: ApiVersion;
    /// `DELETE /slurm/{v}/node/{name}` exists.
    const NODE_DELETE: bool;
    /// Reservation endpoints exist.
    const RESERVATIONS: bool;

    type JobInfo: DeserializeOwned + Send;

    fn job_from_wire(info: Self::JobInfo) -> SlurmResult<Job>;

    fn job_submit_body(req: &JobSubmit) -> Value;
}

pub struct RestAdapter<S: WireSchema> {
    accessor: Arc<dyn WireAccessor>,
    version: String,
    _schema: PhantomData<S>,
}

impl<S: WireSchema> RestAdapter<S> {
    pub fn new(accessor: Arc<dyn WireAccessor>) -> Self {
        Self { accessor, version: S::VERSION.to_string(), _schema: PhantomData }
    }

    fn slurm(&self, tail: &str) -> String { format!("/slurm/{}/{}", self.version, tail) }

    fn slurmdb(&self, tail: &str) -> String { format!("/slurmdb/{}/{}", self.version, tail) }

    /// `/slurm/{v}/{kind}/{name}` with `name` percent-encoded.
    fn slurm_item(&self, kind: &str, name: &str) -> String { self.slurm(&format!("{kind}/{}", common::path_segment(name))) }

    fn slurmdb_item(&self, kind: &str, name: &str) -> String { self.slurmdb(&format!("{kind}/{}", common::path_segment(name))) }

    async fn send(&self, req: WireRequest) -> SlurmResult<WireResponse> {
        debug!(method = %req.method, path = %req.path, api = %self.version, "wire: call");
        let resp = self.accessor.call(req).await?;
        common::check_response(&resp, &self.version)?;
        Ok(resp)
    }

    async fn fetch<T: DeserializeOwned>(&self, kind: &str, req: WireRequest) -> SlurmResult<T> {
        let resp = self.send(req).await?;
        common::decode(kind, &resp)
    }

    fn unsupported(&self, op: &str) -> SlurmError { SlurmError::unsupported_operation(op, &self.version) }

    async fn jobs(&self, req: WireRequest) -> SlurmResult<Vec<Job>> {
        let env: JobsEnvelope<S::JobInfo> = self.fetch("job", req).await?;
        env.jobs.into_iter().map(S::job_from_wire).collect()
    }
}

#[async_trait::async_trait]
impl<S: WireSchema> JobAdapter for RestAdapter<S> {
    async fn list_jobs(&self, opts: &JobListOptions) -> SlurmResult<Vec<Job>> {
        let mut req = WireRequest::get(self.slurm("jobs"));
        if let Some(since) = opts.updated_since {
            req = req.query("update_time", since.timestamp());
        }
        Ok(opts.apply(self.jobs(req).await?))
    }

    async fn get_job(&self, job_id: u32) -> SlurmResult<Job> {
        let jobs = self.jobs(WireRequest::get(self.slurm(&format!("job/{job_id}")))).await?;
        common::single("job", &job_id.to_string(), jobs)
    }

    async fn submit_job(&self, req: &JobSubmit) -> SlurmResult<JobSubmitted> {
        req.validate()?;
        let body = S::job_submit_body(req);
        let resp: common::SubmitResponse = self.fetch("job submit response", WireRequest::post(self.slurm("job/submit"), body)).await?;
        resp.into_submitted()
    }

    async fn update_job(&self, job_id: u32, update: &JobUpdate) -> SlurmResult<()> {
        if update.is_empty() {
            return Err(SlurmError::Validation("job update has no fields".into()));
        }
        let body = common::job_update_body(update);
        self.send(WireRequest::post(self.slurm(&format!("job/{job_id}")), body)).await.map(|_| ())
    }

    async fn cancel_job(&self, job_id: u32) -> SlurmResult<()> {
        self.send(WireRequest::delete(self.slurm(&format!("job/{job_id}")))).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl<S: WireSchema> NodeAdapter for RestAdapter<S> {
    async fn list_nodes(&self, opts: &NodeListOptions) -> SlurmResult<Vec<Node>> {
        let env: common::NodesEnvelope = self.fetch("node", WireRequest::get(self.slurm("nodes"))).await?;
        let nodes = env.nodes.into_iter().map(common::node_from_wire).collect::<SlurmResult<Vec<_>>>()?;
        Ok(opts.apply(nodes))
    }

    async fn get_node(&self, name: &str) -> SlurmResult<Node> {
        let env: common::NodesEnvelope = self.fetch("node", WireRequest::get(self.slurm_item("node", name))).await?;
        let nodes = env.nodes.into_iter().map(common::node_from_wire).collect::<SlurmResult<Vec<_>>>()?;
        common::single("node", name, nodes)
    }

    async fn update_node(&self, name: &str, update: &NodeUpdate) -> SlurmResult<()> {
        update.validate()?;
        let body = common::node_update_body(update);
        self.send(WireRequest::post(self.slurm_item("node", name), body)).await.map(|_| ())
    }

    async fn delete_node(&self, name: &str) -> SlurmResult<()> {
        if !S::NODE_DELETE {
            return Err(self.unsupported("nodes.delete"));
        }
        self.send(WireRequest::delete(self.slurm_item("node", name))).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl<S: WireSchema> PartitionAdapter for RestAdapter<S> {
    async fn list_partitions(&self, opts: &PartitionListOptions) -> SlurmResult<Vec<Partition>> {
        let env: common::PartitionsEnvelope = self.fetch("partition", WireRequest::get(self.slurm("partitions"))).await?;
        let parts = env.partitions.into_iter().map(common::partition_from_wire).collect::<SlurmResult<Vec<_>>>()?;
        Ok(opts.apply(parts))
    }

    async fn get_partition(&self, name: &str) -> SlurmResult<Partition> {
        let env: common::PartitionsEnvelope = self.fetch("partition", WireRequest::get(self.slurm_item("partition", name))).await?;
        let parts = env.partitions.into_iter().map(common::partition_from_wire).collect::<SlurmResult<Vec<_>>>()?;
        common::single("partition", name, parts)
    }
}

#[async_trait::async_trait]
impl<S: WireSchema> AccountAdapter for RestAdapter<S> {
    async fn list_accounts(&self, opts: &AccountListOptions) -> SlurmResult<Vec<Account>> {
        let mut req = WireRequest::get(self.slurmdb("accounts"));
        if opts.include_deleted {
            req = req.query("with_deleted", "true");
        }
        let env: common::AccountsEnvelope = self.fetch("account", req).await?;
        let accounts = env.accounts.into_iter().map(common::account_from_wire).collect::<SlurmResult<Vec<_>>>()?;
        Ok(opts.apply(accounts))
    }

    async fn get_account(&self, name: &str) -> SlurmResult<Account> {
        let env: common::AccountsEnvelope = self.fetch("account", WireRequest::get(self.slurmdb_item("account", name))).await?;
        let accounts = env.accounts.into_iter().map(common::account_from_wire).collect::<SlurmResult<Vec<_>>>()?;
        common::single("account", name, accounts)
    }

    async fn create_account(&self, req: &AccountCreate) -> SlurmResult<()> {
        req.validate()?;
        self.send(WireRequest::post(self.slurmdb("accounts"), common::account_create_body(req))).await.map(|_| ())
    }

    async fn delete_account(&self, name: &str) -> SlurmResult<()> {
        self.send(WireRequest::delete(self.slurmdb_item("account", name))).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl<S: WireSchema> ReservationAdapter for RestAdapter<S> {
    async fn list_reservations(&self, opts: &ReservationListOptions) -> SlurmResult<Vec<Reservation>> {
        if !S::RESERVATIONS {
            return Err(self.unsupported("reservations.list"));
        }
        let env: common::ReservationsEnvelope =
            self.fetch("reservation", WireRequest::get(self.slurm("reservations"))).await?;
        let now = Utc::now();
        let resv = env
            .reservations
            .into_iter()
            .map(|r| common::reservation_from_wire(r, now))
            .collect::<SlurmResult<Vec<_>>>()?;
        Ok(opts.apply(resv))
    }

    async fn get_reservation(&self, name: &str) -> SlurmResult<Reservation> {
        if !S::RESERVATIONS {
            return Err(self.unsupported("reservations.get"));
        }
        let env: common::ReservationsEnvelope =
            self.fetch("reservation", WireRequest::get(self.slurm_item("reservation", name))).await?;
        let now = Utc::now();
        let resv = env
            .reservations
            .into_iter()
            .map(|r| common::reservation_from_wire(r, now))
            .collect::<SlurmResult<Vec<_>>>()?;
        common::single("reservation", name, resv)
    }

    async fn create_reservation(&self, req: &ReservationCreate) -> SlurmResult<()> {
        if !S::RESERVATIONS {
            return Err(self.unsupported("reservations.create"));
        }
        req.validate()?;
        let body = common::reservation_create_body(req);
        self.send(WireRequest::post(self.slurm("reservations"), body)).await.map(|_| ())
    }

    async fn update_reservation(&self, name: &str, update: &ReservationUpdate) -> SlurmResult<()> {
        if !S::RESERVATIONS {
            return Err(self.unsupported("reservations.update"));
        }
        let body = common::reservation_update_body(name, update);
        self.send(WireRequest::post(self.slurm("reservations"), body)).await.map(|_| ())
    }

    async fn delete_reservation(&self, name: &str) -> SlurmResult<()> {
        if !S::RESERVATIONS {
            return Err(self.unsupported("reservations.delete"));
        }
        self.send(WireRequest::delete(self.slurm_item("reservation", name))).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl<S: WireSchema> VersionAdapter for RestAdapter<S> {
    fn version(&self) -> ApiVersion { S::VERSION }

    async fn ping(&self) -> SlurmResult<ClusterInfo> {
        let env: common::PingEnvelope = self.fetch("ping", WireRequest::get(self.slurm("ping"))).await?;
        Ok(common::cluster_from_ping(env, &self.version))
    }
}
