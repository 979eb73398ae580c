//! Cache operations and TTL policy.

use std::fmt;
use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Cacheable read operations. Names double as key prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    #[serde(rename = "info.version")]
    InfoVersion,
    #[serde(rename = "info.ping")]
    InfoPing,
    #[serde(rename = "info.get")]
    InfoGet,
    #[serde(rename = "info.stats")]
    InfoStats,
    #[serde(rename = "jobs.list")]
    JobsList,
    #[serde(rename = "jobs.get")]
    JobsGet,
    #[serde(rename = "nodes.list")]
    NodesList,
    #[serde(rename = "nodes.get")]
    NodesGet,
    #[serde(rename = "partitions.list")]
    PartitionsList,
    #[serde(rename = "partitions.get")]
    PartitionsGet,
    #[serde(rename = "accounts.list")]
    AccountsList,
    #[serde(rename = "accounts.get")]
    AccountsGet,
    #[serde(rename = "reservations.list")]
    ReservationsList,
    #[serde(rename = "reservations.get")]
    ReservationsGet,
}

impl Operation {
    pub const ALL: [Operation; 14] = [
        Operation::InfoVersion,
        Operation::InfoPing,
        Operation::InfoGet,
        Operation::InfoStats,
        Operation::JobsList,
        Operation::JobsGet,
        Operation::NodesList,
        Operation::NodesGet,
        Operation::PartitionsList,
        Operation::PartitionsGet,
        Operation::AccountsList,
        Operation::AccountsGet,
        Operation::ReservationsList,
        Operation::ReservationsGet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::InfoVersion => "info.version",
            Operation::InfoPing => "info.ping",
            Operation::InfoGet => "info.get",
            Operation::InfoStats => "info.stats",
            Operation::JobsList => "jobs.list",
            Operation::JobsGet => "jobs.get",
            Operation::NodesList => "nodes.list",
            Operation::NodesGet => "nodes.get",
            Operation::PartitionsList => "partitions.list",
            Operation::PartitionsGet => "partitions.get",
            Operation::AccountsList => "accounts.list",
            Operation::AccountsGet => "accounts.get",
            Operation::ReservationsList => "reservations.list",
            Operation::ReservationsGet => "reservations.get",
        }
    }

    pub fn parse(s: &str) -> Option<Self> { Self::ALL.into_iter().find(|op| op.as_str() == s) }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheProfile {
    Default,
    Aggressive,
    Conservative,
}

impl std::str::FromStr for CacheProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(CacheProfile::Default),
            "aggressive" => Ok(CacheProfile::Aggressive),
            "conservative" => Ok(CacheProfile::Conservative),
            other => Err(format!("unknown cache profile {other:?}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub default_ttl: Duration,
    pub max_size: usize,
    /// Zero disables the background sweep.
    pub cleanup_interval: Duration,
    pub ttl_by_operation: FxHashMap<Operation, Duration>,
}

fn ttls(p: CacheProfile) -> FxHashMap<Operation, Duration> {
    let secs = Duration::from_secs;
    let min = |m: u64| secs(m * 60);
    let mut t = FxHashMap::default();
    t.insert(Operation::InfoVersion, min(30));
    t.insert(Operation::InfoPing, secs(30));
    t.insert(Operation::InfoGet, min(10));
    t.insert(Operation::PartitionsList, min(10));
    t.insert(Operation::PartitionsGet, min(10));
    t.insert(Operation::NodesGet, min(2));
    let (stats, nodes, jobs, job) = match p {
        CacheProfile::Default => (secs(30), min(2), secs(30), min(1)),
        CacheProfile::Aggressive => (min(2), min(5), min(2), min(5)),
        CacheProfile::Conservative => (secs(10), secs(30), secs(10), secs(30)),
    };
    t.insert(Operation::InfoStats, stats);
    t.insert(Operation::NodesList, nodes);
    t.insert(Operation::JobsList, jobs);
    t.insert(Operation::JobsGet, job);
    t
}

impl Default for CacheConfig {
    fn default() -> Self { Self::profile(CacheProfile::Default) }
}

impl CacheConfig {
    pub fn profile(p: CacheProfile) -> Self {
        let (ttl, max_size) = match p {
            CacheProfile::Default => (300, 1000),
            CacheProfile::Aggressive => (600, 5000),
            CacheProfile::Conservative => (60, 100),
        };
        Self {
            default_ttl: Duration::from_secs(ttl),
            max_size,
            cleanup_interval: Duration::from_secs(60),
            ttl_by_operation: ttls(p),
        }
    }

    pub fn with_ttl(mut self, op: Operation, ttl: Duration) -> Self {
        self.ttl_by_operation.insert(op, ttl);
        self
    }

    /// Per-operation override first, then the global default.
    pub fn ttl_for(&self, op: Operation) -> Duration {
        self.ttl_by_operation.get(&op).copied().unwrap_or(self.default_ttl)
    }
}
