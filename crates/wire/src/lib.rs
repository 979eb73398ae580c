//! slurmrest wire layer.
//!
//! One adapter per supported REST API version converts between that version's
//! payloads and the domain model in `slurmrest-core`. The transport itself is
//! behind [`WireAccessor`], so adapters can be driven by reqwest or by the
//! in-memory [`mock::MockAccessor`].

#![forbid(unsafe_code)]

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use slurmrest_core::prelude::*;

pub mod adapter;
pub mod common;
pub mod http;
pub mod mock;
pub mod registry;
pub mod v0_0_40;
pub mod v0_0_41;
pub mod v0_0_42;
pub mod v0_0_43;
pub mod version;

pub use adapter::{RestAdapter, WireSchema};
pub use registry::{AdapterRegistry, OpenApiProbe, VersionProbe};
pub use version::ApiVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        })
    }
}

/// A raw REST call, relative to the server base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl WireRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self { method: Method::Get, path: path.into(), query: Vec::new(), body: None }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self { method: Method::Post, path: path.into(), query: Vec::new(), body: Some(body) }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self { method: Method::Delete, path: path.into(), query: Vec::new(), body: None }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }
}

/// Status and raw body as returned by the server. Non-2xx statuses are not
/// errors at this level; the adapters interpret them.
#[derive(Debug, Clone, PartialEq)]
pub struct WireResponse {
    pub status: u16,
    pub body: Bytes,
}

impl WireResponse {
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self { status, body: Bytes::from(body.to_string()) }
    }

    pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }
}

/// Opaque transport boundary. Implementations own auth injection and retries;
/// a failure to get any response at all is a `SlurmError::Transport`.
#[async_trait::async_trait]
pub trait WireAccessor: Send + Sync {
    async fn call(&self, req: WireRequest) -> SlurmResult<WireResponse>;
}

#[async_trait::async_trait]
pub trait JobAdapter: Send + Sync {
    async fn list_jobs(&self, opts: &JobListOptions) -> SlurmResult<Vec<Job>>;
    async fn get_job(&self, job_id: u32) -> SlurmResult<Job>;
    async fn submit_job(&self, req: &JobSubmit) -> SlurmResult<JobSubmitted>;
    async fn update_job(&self, job_id: u32, update: &JobUpdate) -> SlurmResult<()>;
    async fn cancel_job(&self, job_id: u32) -> SlurmResult<()>;
}

#[async_trait::async_trait]
pub trait NodeAdapter: Send + Sync {
    async fn list_nodes(&self, opts: &NodeListOptions) -> SlurmResult<Vec<Node>>;
    async fn get_node(&self, name: &str) -> SlurmResult<Node>;
    async fn update_node(&self, name: &str, update: &NodeUpdate) -> SlurmResult<()>;
    async fn delete_node(&self, name: &str) -> SlurmResult<()>;
}

#[async_trait::async_trait]
pub trait PartitionAdapter: Send + Sync {
    async fn list_partitions(&self, opts: &PartitionListOptions) -> SlurmResult<Vec<Partition>>;
    async fn get_partition(&self, name: &str) -> SlurmResult<Partition>;
}

#[async_trait::async_trait]
pub trait AccountAdapter: Send + Sync {
    async fn list_accounts(&self, opts: &AccountListOptions) -> SlurmResult<Vec<Account>>;
    async fn get_account(&self, name: &str) -> SlurmResult<Account>;
    async fn create_account(&self, req: &AccountCreate) -> SlurmResult<()>;
    async fn delete_account(&self, name: &str) -> SlurmResult<()>;
}

#[async_trait::async_trait]
pub trait ReservationAdapter: Send + Sync {
    async fn list_reservations(&self, opts: &ReservationListOptions) -> SlurmResult<Vec<Reservation>>;
    async fn get_reservation(&self, name: &str) -> SlurmResult<Reservation>;
    async fn create_reservation(&self, req: &ReservationCreate) -> SlurmResult<()>;
    async fn update_reservation(&self, name: &str, update: &ReservationUpdate) -> SlurmResult<()>;
    async fn delete_reservation(&self, name: &str) -> SlurmResult<()>;
}

/// Full capability set of one wire version. Exactly one is active per client.
#[async_trait::async_trait]
pub trait VersionAdapter:
    JobAdapter + NodeAdapter + PartitionAdapter + AccountAdapter + ReservationAdapter
{
    fn version(&self) -> ApiVersion;

    async fn ping(&self) -> SlurmResult<ClusterInfo>;
}
