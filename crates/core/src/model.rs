//! Version-independent resource representations.
//!
//! Values here are built only by a wire adapter's conversion functions and are
//! fully owned by the caller once returned. Absent optional wire fields land on
//! the zero value of the field (empty string, `0`, `None`, empty list).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Resource kinds the client knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Job,
    Node,
    Partition,
    Account,
    Reservation,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Job => "job",
            ResourceKind::Node => "node",
            ResourceKind::Partition => "partition",
            ResourceKind::Account => "account",
            ResourceKind::Reservation => "reservation",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.pad(self.as_str()) }
}

/// State enum backed by the server's string vocabulary. Unrecognized values
/// become `Unknown(raw)` so newer servers never break conversion.
macro_rules! string_state {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
            Unknown(String),
        }

        impl $name {
            pub fn from_wire(raw: &str) -> Self {
                match raw.trim().to_ascii_uppercase().as_str() {
                    $($wire => $name::$variant,)+
                    _ => $name::Unknown(raw.to_string()),
                }
            }

            pub fn as_str(&self) -> &str {
                match self {
                    $($name::$variant => $wire,)+
                    $name::Unknown(raw) => raw.as_str(),
                }
            }

            pub fn is_unknown(&self) -> bool { matches!(self, $name::Unknown(_)) }
        }

        impl Default for $name {
            fn default() -> Self { $name::Unknown(String::new()) }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self { $name::from_wire(&raw) }
        }

        impl From<$name> for String {
            fn from(state: $name) -> Self { state.as_str().to_string() }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.pad(self.as_str()) }
        }
    };
}

string_state!(
    /// Job lifecycle state (base state; flags are dropped).
    JobState {
        Pending => "PENDING",
        Running => "RUNNING",
        Suspended => "SUSPENDED",
        Completed => "COMPLETED",
        Cancelled => "CANCELLED",
        Failed => "FAILED",
        Timeout => "TIMEOUT",
        NodeFail => "NODE_FAIL",
        Preempted => "PREEMPTED",
        BootFail => "BOOT_FAIL",
        Deadline => "DEADLINE",
        OutOfMemory => "OUT_OF_MEMORY",
        Completing => "COMPLETING",
        Configuring => "CONFIGURING",
        Requeued => "REQUEUED",
    }
);

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed
                | JobState::Cancelled
                | JobState::Failed
                | JobState::Timeout
                | JobState::NodeFail
                | JobState::Preempted
                | JobState::BootFail
                | JobState::Deadline
                | JobState::OutOfMemory
        )
    }
}

string_state!(
    /// Node state, with DRAIN folded in (IDLE+DRAIN is `Drained`, busy+DRAIN is `Draining`).
    NodeState {
        Idle => "IDLE",
        Allocated => "ALLOCATED",
        Mixed => "MIXED",
        Down => "DOWN",
        Drained => "DRAINED",
        Draining => "DRAINING",
        Future => "FUTURE",
        Reserved => "RESERVED",
        Cloud => "CLOUD",
        Error => "ERROR",
    }
);

impl NodeState {
    /// Combine a base state with its flag list the way `sinfo` reports it.
    pub fn from_wire_parts(base: &str, flags: &[String]) -> Self {
        let drain = flags.iter().any(|f| f.eq_ignore_ascii_case("DRAIN"));
        let state = NodeState::from_wire(base);
        match (state, drain) {
            (NodeState::Idle, true) | (NodeState::Down, true) => NodeState::Drained,
            (NodeState::Allocated, true) | (NodeState::Mixed, true) => NodeState::Draining,
            (NodeState::Unknown(raw), _) if raw.eq_ignore_ascii_case("UNKNOWN") => NodeState::Unknown(raw),
            (s, _) => s,
        }
    }
}

string_state!(
    PartitionState {
        Up => "UP",
        Down => "DOWN",
        Drain => "DRAIN",
        Inactive => "INACTIVE",
    }
);

string_state!(
    ReservationState {
        Active => "ACTIVE",
        Inactive => "INACTIVE",
    }
);

// ---------------- Jobs ----------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Job {
    pub job_id: u32,
    pub name: String,
    pub user_id: u32,
    pub user_name: String,
    pub group_id: u32,
    pub account: String,
    pub partition: String,
    pub qos: String,
    pub state: JobState,
    pub state_reason: String,
    /// Minutes; `None` when unlimited or unset.
    pub time_limit: Option<u32>,
    pub submit_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub priority: u32,
    pub cpus: u32,
    pub node_count: u32,
    pub node_list: String,
    pub command: String,
    pub working_directory: String,
    pub standard_output: String,
    pub standard_error: String,
    pub features: Vec<String>,
    pub required_switches: u32,
    /// Only reported by servers before v0.0.42.
    pub exclusive: Option<bool>,
    pub exit_code: Option<i32>,
    pub array_job_id: Option<u32>,
    pub array_task_id: Option<u32>,
    /// MiB.
    pub memory_per_node: Option<u64>,
    pub nice: i32,
    pub comment: String,
}

/// Batch submission request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobSubmit {
    pub name: String,
    pub script: String,
    pub working_directory: String,
    pub environment: BTreeMap<String, String>,
    pub account: Option<String>,
    pub partition: Option<String>,
    pub qos: Option<String>,
    pub time_limit: Option<u32>,
    pub cpus: Option<u32>,
    pub node_count: Option<u32>,
    pub memory_per_node: Option<u64>,
    pub standard_output: Option<String>,
    pub standard_error: Option<String>,
    pub features: Vec<String>,
    pub required_switches: Option<u32>,
    pub exclusive: Option<bool>,
    pub nice: Option<i32>,
    pub comment: Option<String>,
}

impl JobSubmit {
    pub fn validate(&self) -> Result<(), crate::SlurmError> {
        if self.script.trim().is_empty() {
            return Err(crate::SlurmError::Validation("job script is required".into()));
        }
        if self.working_directory.trim().is_empty() {
            return Err(crate::SlurmError::Validation("working directory is required".into()));
        }
        Ok(())
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() { None } else { Some(s.to_string()) }
}

fn non_zero(n: u32) -> Option<u32> {
    if n == 0 { None } else { Some(n) }
}

/// Writable projection of a job record; `script` comes from the recorded command.
impl From<&Job> for JobSubmit {
    fn from(job: &Job) -> Self {
        JobSubmit {
            name: job.name.clone(),
            script: job.command.clone(),
            working_directory: job.working_directory.clone(),
            environment: BTreeMap::new(),
            account: non_empty(&job.account),
            partition: non_empty(&job.partition),
            qos: non_empty(&job.qos),
            time_limit: job.time_limit,
            cpus: non_zero(job.cpus),
            node_count: non_zero(job.node_count),
            memory_per_node: job.memory_per_node,
            standard_output: non_empty(&job.standard_output),
            standard_error: non_empty(&job.standard_error),
            features: job.features.clone(),
            required_switches: non_zero(job.required_switches),
            exclusive: job.exclusive,
            nice: if job.nice == 0 { None } else { Some(job.nice) },
            comment: non_empty(&job.comment),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobSubmitted {
    pub job_id: u32,
    pub message: String,
}

/// Partial job update; `None` leaves the field untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobUpdate {
    pub name: Option<String>,
    pub time_limit: Option<u32>,
    pub priority: Option<u32>,
    pub nice: Option<i32>,
    pub partition: Option<String>,
    pub qos: Option<String>,
    pub comment: Option<String>,
}

impl JobUpdate {
    pub fn is_empty(&self) -> bool { self == &JobUpdate::default() }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobListOptions {
    pub user: Option<String>,
    pub account: Option<String>,
    pub partition: Option<String>,
    pub states: Vec<JobState>,
    pub job_ids: Vec<u32>,
    /// Passed to the server as `update_time`.
    pub updated_since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl JobListOptions {
    pub fn matches(&self, job: &Job) -> bool {
        if let Some(user) = &self.user {
            if &job.user_name != user { return false; }
        }
        if let Some(account) = &self.account {
            if &job.account != account { return false; }
        }
        if let Some(partition) = &self.partition {
            if &job.partition != partition { return false; }
        }
        if !self.states.is_empty() && !self.states.contains(&job.state) { return false; }
        if !self.job_ids.is_empty() && !self.job_ids.contains(&job.job_id) { return false; }
        true
    }

    pub fn apply(&self, jobs: Vec<Job>) -> Vec<Job> {
        let mut out: Vec<Job> = jobs.into_iter().filter(|j| self.matches(j)).collect();
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

// ---------------- Nodes ----------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub hostname: String,
    pub address: String,
    pub state: NodeState,
    pub state_flags: SmallVec<[String; 4]>,
    pub reason: String,
    pub cpus: u32,
    pub alloc_cpus: u32,
    pub sockets: u32,
    pub cores: u32,
    pub threads: u32,
    /// MiB.
    pub real_memory: u64,
    pub alloc_memory: u64,
    pub free_memory: Option<u64>,
    /// Load average (the wire reports hundredths).
    pub cpu_load: f64,
    pub partitions: SmallVec<[String; 4]>,
    pub features: Vec<String>,
    pub gres: String,
    pub architecture: String,
    pub operating_system: String,
    pub boot_time: Option<DateTime<Utc>>,
    pub last_busy: Option<DateTime<Utc>>,
    pub slurmd_version: String,
}

/// Administrative state change requested through a node update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeAdminState {
    Drain,
    Resume,
    Down,
    Undrain,
}

impl NodeAdminState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeAdminState::Drain => "DRAIN",
            NodeAdminState::Resume => "RESUME",
            NodeAdminState::Down => "DOWN",
            NodeAdminState::Undrain => "UNDRAIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub state: Option<NodeAdminState>,
    pub reason: Option<String>,
    pub comment: Option<String>,
    pub features: Option<Vec<String>>,
}

impl NodeUpdate {
    pub fn validate(&self) -> Result<(), crate::SlurmError> {
        if matches!(self.state, Some(NodeAdminState::Drain) | Some(NodeAdminState::Down))
            && self.reason.as_deref().map(str::trim).unwrap_or("").is_empty()
        {
            return Err(crate::SlurmError::Validation("a reason is required to drain or down a node".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeListOptions {
    pub names: Vec<String>,
    pub states: Vec<NodeState>,
    pub partition: Option<String>,
}

impl NodeListOptions {
    pub fn matches(&self, node: &Node) -> bool {
        if !self.names.is_empty() && !self.names.contains(&node.name) { return false; }
        if !self.states.is_empty() && !self.states.contains(&node.state) { return false; }
        if let Some(p) = &self.partition {
            if !node.partitions.iter().any(|x| x == p) { return false; }
        }
        true
    }

    pub fn apply(&self, nodes: Vec<Node>) -> Vec<Node> {
        nodes.into_iter().filter(|n| self.matches(n)).collect()
    }
}

// ---------------- Partitions ----------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Partition {
    pub name: String,
    pub state: PartitionState,
    pub nodes: String,
    pub total_nodes: u32,
    pub total_cpus: u32,
    /// Minutes; `None` when unlimited.
    pub max_time: Option<u32>,
    pub default_time: Option<u32>,
    pub max_nodes: Option<u32>,
    pub min_nodes: u32,
    pub priority_tier: u32,
    pub is_default: bool,
    pub hidden: bool,
    pub allowed_accounts: Vec<String>,
    pub qos: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PartitionListOptions {
    pub names: Vec<String>,
    pub states: Vec<PartitionState>,
}

impl PartitionListOptions {
    pub fn matches(&self, p: &Partition) -> bool {
        (self.names.is_empty() || self.names.contains(&p.name))
            && (self.states.is_empty() || self.states.contains(&p.state))
    }

    pub fn apply(&self, parts: Vec<Partition>) -> Vec<Partition> {
        parts.into_iter().filter(|p| self.matches(p)).collect()
    }
}

// ---------------- Accounts ----------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    pub description: String,
    pub organization: String,
    pub coordinators: Vec<String>,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountCreate {
    pub name: String,
    pub description: String,
    pub organization: String,
    pub coordinators: Vec<String>,
}

impl AccountCreate {
    pub fn validate(&self) -> Result<(), crate::SlurmError> {
        if self.name.trim().is_empty() {
            return Err(crate::SlurmError::Validation("account name is required".into()));
        }
        Ok(())
    }
}

impl From<&Account> for AccountCreate {
    fn from(a: &Account) -> Self {
        AccountCreate {
            name: a.name.clone(),
            description: a.description.clone(),
            organization: a.organization.clone(),
            coordinators: a.coordinators.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AccountListOptions {
    pub names: Vec<String>,
    pub include_deleted: bool,
}

impl AccountListOptions {
    pub fn matches(&self, a: &Account) -> bool {
        (self.names.is_empty() || self.names.contains(&a.name)) && (self.include_deleted || !a.deleted)
    }

    pub fn apply(&self, accounts: Vec<Account>) -> Vec<Account> {
        accounts.into_iter().filter(|a| self.matches(a)).collect()
    }
}

// ---------------- Reservations ----------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reservation {
    pub name: String,
    pub state: ReservationState,
    pub node_list: String,
    pub node_count: u32,
    pub core_count: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub users: Vec<String>,
    pub accounts: Vec<String>,
    pub partition: String,
    pub flags: Vec<String>,
    pub features: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReservationCreate {
    pub name: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Minutes; used when `end_time` is not given.
    pub duration: Option<u32>,
    pub node_count: Option<u32>,
    pub node_list: Option<String>,
    pub users: Vec<String>,
    pub accounts: Vec<String>,
    pub partition: Option<String>,
    pub flags: Vec<String>,
}

impl ReservationCreate {
    pub fn validate(&self) -> Result<(), crate::SlurmError> {
        if self.name.trim().is_empty() {
            return Err(crate::SlurmError::Validation("reservation name is required".into()));
        }
        if self.users.is_empty() && self.accounts.is_empty() {
            return Err(crate::SlurmError::Validation("reservation needs users or accounts".into()));
        }
        if self.end_time.is_none() && self.duration.is_none() {
            return Err(crate::SlurmError::Validation("reservation needs an end time or duration".into()));
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if end <= start {
                return Err(crate::SlurmError::Validation("reservation ends before it starts".into()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReservationUpdate {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<u32>,
    pub node_count: Option<u32>,
    pub node_list: Option<String>,
    pub users: Option<Vec<String>>,
    pub accounts: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReservationListOptions {
    pub names: Vec<String>,
}

impl ReservationListOptions {
    pub fn apply(&self, resv: Vec<Reservation>) -> Vec<Reservation> {
        resv.into_iter().filter(|r| self.names.is_empty() || self.names.contains(&r.name)).collect()
    }
}

// ---------------- Cluster ----------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ControllerPing {
    pub hostname: String,
    pub responding: bool,
    pub latency_us: u64,
    pub mode: String,
}

/// Result of the ping endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub cluster_name: String,
    /// Slurm release, e.g. `24.05.3`.
    pub release: String,
    /// Wire version of the adapter that produced this value.
    pub api_version: String,
    pub controllers: Vec<ControllerPing>,
}

/// Node and job totals across the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterStats {
    pub total_nodes: u32,
    pub idle_nodes: u32,
    pub allocated_nodes: u32,
    pub total_cpus: u64,
    pub idle_cpus: u64,
    pub allocated_cpus: u64,
    pub total_jobs: u32,
    pub running_jobs: u32,
    pub pending_jobs: u32,
    pub completed_jobs: u32,
}

impl ClusterStats {
    /// MIXED nodes count as allocated.
    pub fn tally(nodes: &[Node], jobs: &[Job]) -> Self {
        let mut s = ClusterStats::default();
        for n in nodes {
            s.total_nodes += 1;
            match n.state {
                NodeState::Idle => s.idle_nodes += 1,
                NodeState::Allocated | NodeState::Mixed => s.allocated_nodes += 1,
                _ => {}
            }
            s.total_cpus += u64::from(n.cpus);
            s.allocated_cpus += u64::from(n.alloc_cpus.min(n.cpus));
        }
        s.idle_cpus = s.total_cpus - s.allocated_cpus;
        for j in jobs {
            s.total_jobs += 1;
            match j.state {
                JobState::Running => s.running_jobs += 1,
                JobState::Pending => s.pending_jobs += 1,
                JobState::Completed => s.completed_jobs += 1,
                _ => {}
            }
        }
        s
    }
}
