//! Wire shapes and conversions shared by every supported version.
//!
//! Records whose layout did not change across v0.0.40 - v0.0.43 live here;
//! the job record differs per version and is finished by each version module.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use slurmrest_core::prelude::*;
use slurmrest_core::{ApiErrorDetail, ControllerPing};
use smallvec::SmallVec;

use crate::WireResponse;

/// The `{set, infinite, number}` envelope used for optional numbers. Older
/// servers sometimes send a bare number, which is accepted as `set`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "NoValRepr")]
pub struct NoVal {
    pub set: bool,
    pub infinite: bool,
    pub number: i64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NoValRepr {
    Plain(i64),
    Envelope {
        #[serde(default)]
        set: bool,
        #[serde(default)]
        infinite: bool,
        #[serde(default)]
        number: i64,
    },
}

impl From<NoValRepr> for NoVal {
    fn from(r: NoValRepr) -> Self {
        match r {
            NoValRepr::Plain(number) => NoVal { set: true, infinite: false, number },
            NoValRepr::Envelope { set, infinite, number } => NoVal { set, infinite, number },
        }
    }
}

impl NoVal {
    pub fn of(number: i64) -> Self { Self { set: true, infinite: false, number } }

    pub fn infinite() -> Self { Self { set: false, infinite: true, number: 0 } }

    pub fn get(&self) -> Option<i64> {
        if self.set && !self.infinite { Some(self.number) } else { None }
    }

    pub fn u32(&self) -> Option<u32> { self.get().and_then(|n| u32::try_from(n).ok()) }

    pub fn u32_or_zero(&self) -> u32 { self.u32().unwrap_or(0) }

    pub fn u64(&self) -> Option<u64> { self.get().and_then(|n| u64::try_from(n).ok()) }

    /// Epoch seconds; zero means "not happened yet".
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self.get() {
            Some(secs) if secs > 0 => Utc.timestamp_opt(secs, 0).single(),
            _ => None,
        }
    }

    pub fn to_json(opt: Option<i64>) -> Value {
        match opt {
            Some(n) => json!({ "set": true, "infinite": false, "number": n }),
            None => json!({ "set": false, "infinite": false, "number": 0 }),
        }
    }
}

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',').map(str::trim).filter(|p| !p.is_empty()).map(str::to_string).collect()
}

pub fn join_csv(parts: &[String]) -> String { parts.join(",") }

/// Percent-encode one URL path segment; only RFC 3986 unreserved bytes pass through.
pub fn path_segment(raw: &str) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => {
                let _ = write!(out, "%{b:02X}");
            }
        }
    }
    out
}

// ---------------- Errors ----------------

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    errors: Vec<WireError>,
}

#[derive(Debug, Default, Deserialize)]
struct WireError {
    #[serde(default)]
    error_number: i32,
    #[serde(default)]
    error: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    description: String,
}

impl From<WireError> for ApiErrorDetail {
    fn from(e: WireError) -> Self {
        ApiErrorDetail {
            error_number: e.error_number,
            error_code: e.error,
            source: e.source,
            description: e.description,
        }
    }
}

/// Turn a non-2xx status, or a 2xx body with a non-empty `errors` array, into
/// `SlurmError::Api`. A body that is not JSON yields one synthetic entry.
pub fn check_response(resp: &WireResponse, api_version: &str) -> SlurmResult<()> {
    let parsed: Option<ErrorEnvelope> = serde_json::from_slice(&resp.body).ok();
    match parsed {
        Some(env) if !env.errors.is_empty() => Err(SlurmError::Api {
            status: resp.status,
            api_version: api_version.to_string(),
            errors: env.errors.into_iter().map(Into::into).collect(),
        }),
        _ if resp.is_success() => Ok(()),
        _ => Err(SlurmError::Api {
            status: resp.status,
            api_version: api_version.to_string(),
            errors: vec![synthetic_error(resp)],
        }),
    }
}

fn synthetic_error(resp: &WireResponse) -> ApiErrorDetail {
    let text = String::from_utf8_lossy(&resp.body);
    let description = if text.trim().is_empty() { format!("HTTP status {}", resp.status) } else { text.trim().to_string() };
    ApiErrorDetail {
        error_number: i32::from(resp.status),
        error_code: format!("HTTP_{}", resp.status),
        source: "http".to_string(),
        description,
    }
}

/// Decode a checked response body.
pub fn decode<T: DeserializeOwned>(kind: &str, resp: &WireResponse) -> SlurmResult<T> {
    serde_json::from_slice(&resp.body).map_err(|e| SlurmError::conversion(kind, e.to_string()))
}

/// Single-record lookups come back as a list; empty means not found.
pub fn single<T>(kind: &str, id: &str, mut items: Vec<T>) -> SlurmResult<T> {
    if items.is_empty() {
        return Err(SlurmError::not_found(kind, id));
    }
    Ok(items.swap_remove(0))
}

// ---------------- Jobs (shared part) ----------------

#[derive(Debug, Default, Deserialize)]
#[serde(bound(deserialize = "J: DeserializeOwned"))]
pub struct JobsEnvelope<J> {
    #[serde(default = "Vec::new")]
    pub jobs: Vec<J>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExitCode {
    #[serde(default)]
    pub status: Vec<String>,
    #[serde(default)]
    pub return_code: NoVal,
}

/// Job fields that are laid out identically in every version.
#[derive(Debug, Default, Deserialize)]
pub struct JobBase {
    #[serde(default)]
    pub job_id: Option<u32>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub user_id: Option<u32>,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub group_id: Option<u32>,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub partition: String,
    #[serde(default)]
    pub qos: String,
    #[serde(default)]
    pub job_state: Vec<String>,
    #[serde(default)]
    pub state_reason: String,
    #[serde(default)]
    pub time_limit: NoVal,
    #[serde(default)]
    pub submit_time: NoVal,
    #[serde(default)]
    pub start_time: NoVal,
    #[serde(default)]
    pub end_time: NoVal,
    #[serde(default)]
    pub priority: NoVal,
    #[serde(default)]
    pub cpus: NoVal,
    #[serde(default)]
    pub node_count: NoVal,
    #[serde(default)]
    pub nodes: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub current_working_directory: String,
    #[serde(default)]
    pub standard_output: String,
    #[serde(default)]
    pub standard_error: String,
    #[serde(default)]
    pub exit_code: Option<ExitCode>,
    #[serde(default)]
    pub array_job_id: NoVal,
    #[serde(default)]
    pub array_task_id: NoVal,
    #[serde(default)]
    pub memory_per_node: NoVal,
    #[serde(default)]
    pub nice: Option<i32>,
    #[serde(default)]
    pub comment: String,
}

impl JobBase {
    /// Version-specific fields (`features`, switches, exclusivity) are left at
    /// their zero value for the caller to fill in.
    pub fn into_job(self) -> SlurmResult<Job> {
        let job_id = match self.job_id {
            Some(id) if id > 0 => id,
            _ => return Err(SlurmError::conversion("job", "record without job_id")),
        };
        let state = self.job_state.first().map(|s| JobState::from_wire(s)).unwrap_or_default();
        Ok(Job {
            job_id,
            name: self.name,
            user_id: self.user_id.unwrap_or(0),
            user_name: self.user_name,
            group_id: self.group_id.unwrap_or(0),
            account: self.account,
            partition: self.partition,
            qos: self.qos,
            state,
            state_reason: self.state_reason,
            time_limit: self.time_limit.u32(),
            submit_time: self.submit_time.timestamp(),
            start_time: self.start_time.timestamp(),
            end_time: self.end_time.timestamp(),
            priority: self.priority.u32_or_zero(),
            cpus: self.cpus.u32_or_zero(),
            node_count: self.node_count.u32_or_zero(),
            node_list: self.nodes,
            command: self.command,
            working_directory: self.current_working_directory,
            standard_output: self.standard_output,
            standard_error: self.standard_error,
            features: Vec::new(),
            required_switches: 0,
            exclusive: None,
            exit_code: self.exit_code.and_then(|e| e.return_code.get()).and_then(|n| i32::try_from(n).ok()),
            array_job_id: self.array_job_id.u32().filter(|n| *n > 0),
            array_task_id: self.array_task_id.u32(),
            memory_per_node: self.memory_per_node.u64(),
            nice: self.nice.unwrap_or(0),
            comment: self.comment,
        })
    }
}

/// Submission body fields shared by every version. Callers add switches and
/// exclusivity under the names their version uses.
pub fn job_desc(req: &JobSubmit) -> Map<String, Value> {
    let mut job = Map::new();
    job.insert("name".into(), json!(req.name));
    job.insert("current_working_directory".into(), json!(req.working_directory));
    let env: Vec<String> = req.environment.iter().map(|(k, v)| format!("{k}={v}")).collect();
    job.insert("environment".into(), json!(env));
    if let Some(v) = &req.account { job.insert("account".into(), json!(v)); }
    if let Some(v) = &req.partition { job.insert("partition".into(), json!(v)); }
    if let Some(v) = &req.qos { job.insert("qos".into(), json!(v)); }
    if let Some(v) = req.time_limit { job.insert("time_limit".into(), NoVal::to_json(Some(i64::from(v)))); }
    if let Some(v) = req.cpus { job.insert("minimum_cpus".into(), json!(v)); }
    if let Some(v) = req.node_count { job.insert("minimum_nodes".into(), json!(v)); }
    if let Some(v) = req.memory_per_node {
        job.insert("memory_per_node".into(), NoVal::to_json(i64::try_from(v).ok()));
    }
    if let Some(v) = &req.standard_output { job.insert("standard_output".into(), json!(v)); }
    if let Some(v) = &req.standard_error { job.insert("standard_error".into(), json!(v)); }
    if !req.features.is_empty() { job.insert("constraints".into(), json!(join_csv(&req.features))); }
    if let Some(v) = req.nice { job.insert("nice".into(), json!(v)); }
    if let Some(v) = &req.comment { job.insert("comment".into(), json!(v)); }
    job
}

pub fn submit_envelope(script: &str, job: Map<String, Value>) -> Value {
    json!({ "script": script, "job": Value::Object(job) })
}

pub fn job_update_body(update: &JobUpdate) -> Value {
    let mut job = Map::new();
    if let Some(v) = &update.name { job.insert("name".into(), json!(v)); }
    if let Some(v) = update.time_limit { job.insert("time_limit".into(), NoVal::to_json(Some(i64::from(v)))); }
    if let Some(v) = update.priority { job.insert("priority".into(), NoVal::to_json(Some(i64::from(v)))); }
    if let Some(v) = update.nice { job.insert("nice".into(), json!(v)); }
    if let Some(v) = &update.partition { job.insert("partition".into(), json!(v)); }
    if let Some(v) = &update.qos { job.insert("qos".into(), json!(v)); }
    if let Some(v) = &update.comment { job.insert("comment".into(), json!(v)); }
    Value::Object(job)
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub job_id: Option<u32>,
    #[serde(default)]
    pub job_submit_user_msg: String,
}

impl SubmitResponse {
    pub fn into_submitted(self) -> SlurmResult<JobSubmitted> {
        match self.job_id {
            Some(job_id) if job_id > 0 => Ok(JobSubmitted { job_id, message: self.job_submit_user_msg }),
            _ => Err(SlurmError::conversion("job submit response", "missing job_id")),
        }
    }
}

// ---------------- Nodes ----------------

#[derive(Debug, Default, Deserialize)]
pub struct NodesEnvelope {
    #[serde(default)]
    pub nodes: Vec<WireNode>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireNode {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub state: Vec<String>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub cpus: u32,
    #[serde(default)]
    pub alloc_cpus: u32,
    #[serde(default)]
    pub sockets: u32,
    #[serde(default)]
    pub cores: u32,
    #[serde(default)]
    pub threads: u32,
    #[serde(default)]
    pub real_memory: u64,
    #[serde(default)]
    pub alloc_memory: u64,
    #[serde(default)]
    pub free_mem: NoVal,
    #[serde(default)]
    pub cpu_load: i64,
    #[serde(default)]
    pub partitions: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub gres: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub operating_system: String,
    #[serde(default)]
    pub boot_time: NoVal,
    #[serde(default)]
    pub last_busy: NoVal,
    #[serde(default)]
    pub version: String,
}

pub fn node_from_wire(w: WireNode) -> SlurmResult<Node> {
    if w.name.is_empty() {
        return Err(SlurmError::conversion("node", "record without name"));
    }
    let (base, flags) = match w.state.split_first() {
        Some((base, flags)) => (base.as_str(), flags),
        None => ("", &[][..]),
    };
    Ok(Node {
        state: NodeState::from_wire_parts(base, flags),
        state_flags: flags.iter().cloned().collect::<SmallVec<[String; 4]>>(),
        name: w.name,
        hostname: w.hostname,
        address: w.address,
        reason: w.reason,
        cpus: w.cpus,
        alloc_cpus: w.alloc_cpus,
        sockets: w.sockets,
        cores: w.cores,
        threads: w.threads,
        real_memory: w.real_memory,
        alloc_memory: w.alloc_memory,
        free_memory: w.free_mem.u64(),
        cpu_load: w.cpu_load as f64 / 100.0,
        partitions: w.partitions.into_iter().collect(),
        features: w.features,
        gres: w.gres,
        architecture: w.architecture,
        operating_system: w.operating_system,
        boot_time: w.boot_time.timestamp(),
        last_busy: w.last_busy.timestamp(),
        slurmd_version: w.version,
    })
}

pub fn node_update_body(update: &NodeUpdate) -> Value {
    let mut body = Map::new();
    if let Some(state) = update.state { body.insert("state".into(), json!([state.as_str()])); }
    if let Some(v) = &update.reason { body.insert("reason".into(), json!(v)); }
    if let Some(v) = &update.comment { body.insert("comment".into(), json!(v)); }
    if let Some(v) = &update.features { body.insert("features".into(), json!(v)); }
    Value::Object(body)
}

// ---------------- Partitions ----------------

#[derive(Debug, Default, Deserialize)]
pub struct PartitionsEnvelope {
    #[serde(default)]
    pub partitions: Vec<WirePartition>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartitionNodes {
    #[serde(default)]
    pub configured: String,
    #[serde(default)]
    pub total: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartitionCpus {
    #[serde(default)]
    pub total: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartitionStatus {
    #[serde(default)]
    pub state: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartitionLimits {
    #[serde(default)]
    pub time: NoVal,
    #[serde(default)]
    pub nodes: NoVal,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartitionPriority {
    #[serde(default)]
    pub tier: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartitionAccounts {
    #[serde(default)]
    pub allowed: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartitionQos {
    #[serde(default)]
    pub assigned: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct WirePartition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: PartitionNodes,
    #[serde(default)]
    pub cpus: PartitionCpus,
    #[serde(default)]
    pub partition: PartitionStatus,
    #[serde(default)]
    pub maximums: PartitionLimits,
    #[serde(default)]
    pub minimums: PartitionLimits,
    #[serde(default)]
    pub defaults: PartitionLimits,
    #[serde(default)]
    pub priority: PartitionPriority,
    #[serde(default)]
    pub accounts: PartitionAccounts,
    #[serde(default)]
    pub qos: PartitionQos,
    #[serde(default)]
    pub flags: Vec<String>,
}

pub fn partition_from_wire(w: WirePartition) -> SlurmResult<Partition> {
    if w.name.is_empty() {
        return Err(SlurmError::conversion("partition", "record without name"));
    }
    let has_flag = |f: &str| w.flags.iter().any(|x| x.eq_ignore_ascii_case(f));
    Ok(Partition {
        is_default: has_flag("DEFAULT"),
        hidden: has_flag("HIDDEN"),
        state: w.partition.state.first().map(|s| PartitionState::from_wire(s)).unwrap_or_default(),
        nodes: w.nodes.configured,
        total_nodes: w.nodes.total,
        total_cpus: w.cpus.total,
        max_time: w.maximums.time.u32(),
        default_time: w.defaults.time.u32(),
        max_nodes: w.maximums.nodes.u32(),
        min_nodes: w.minimums.nodes.u32_or_zero(),
        priority_tier: w.priority.tier,
        allowed_accounts: split_csv(&w.accounts.allowed),
        qos: w.qos.assigned,
        name: w.name,
    })
}

// ---------------- Accounts ----------------

#[derive(Debug, Default, Deserialize)]
pub struct AccountsEnvelope {
    #[serde(default)]
    pub accounts: Vec<WireAccount>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireCoordinator {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireAccount {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub coordinators: Vec<WireCoordinator>,
    #[serde(default)]
    pub flags: Vec<String>,
}

pub fn account_from_wire(w: WireAccount) -> SlurmResult<Account> {
    if w.name.is_empty() {
        return Err(SlurmError::conversion("account", "record without name"));
    }
    Ok(Account {
        deleted: w.flags.iter().any(|f| f.eq_ignore_ascii_case("DELETED")),
        name: w.name,
        description: w.description,
        organization: w.organization,
        coordinators: w.coordinators.into_iter().map(|c| c.name).filter(|n| !n.is_empty()).collect(),
    })
}

pub fn account_create_body(req: &AccountCreate) -> Value {
    let coordinators: Vec<Value> = req.coordinators.iter().map(|c| json!({ "name": c })).collect();
    json!({
        "accounts": [{
            "name": req.name,
            "description": req.description,
            "organization": req.organization,
            "coordinators": coordinators,
        }]
    })
}

// ---------------- Reservations ----------------

#[derive(Debug, Default, Deserialize)]
pub struct ReservationsEnvelope {
    #[serde(default)]
    pub reservations: Vec<WireReservation>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireReservation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub node_list: String,
    #[serde(default)]
    pub node_count: u32,
    #[serde(default)]
    pub core_count: u32,
    #[serde(default)]
    pub start_time: NoVal,
    #[serde(default)]
    pub end_time: NoVal,
    #[serde(default)]
    pub users: String,
    #[serde(default)]
    pub accounts: String,
    #[serde(default)]
    pub partition: String,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub features: String,
}

/// Reservations carry no state on the wire; it is derived from the window.
pub fn reservation_from_wire(w: WireReservation, now: DateTime<Utc>) -> SlurmResult<Reservation> {
    if w.name.is_empty() {
        return Err(SlurmError::conversion("reservation", "record without name"));
    }
    let start_time = w.start_time.timestamp();
    let end_time = w.end_time.timestamp();
    let started = start_time.map(|s| s <= now).unwrap_or(false);
    let not_ended = end_time.map(|e| now < e).unwrap_or(true);
    let state = if started && not_ended { ReservationState::Active } else { ReservationState::Inactive };
    Ok(Reservation {
        name: w.name,
        state,
        node_list: w.node_list,
        node_count: w.node_count,
        core_count: w.core_count,
        start_time,
        end_time,
        users: split_csv(&w.users),
        accounts: split_csv(&w.accounts),
        partition: w.partition,
        flags: w.flags,
        features: w.features,
    })
}

pub fn reservation_create_body(req: &ReservationCreate) -> Value {
    let mut r = Map::new();
    r.insert("name".into(), json!(req.name));
    if let Some(t) = req.start_time { r.insert("start_time".into(), NoVal::to_json(Some(t.timestamp()))); }
    if let Some(t) = req.end_time { r.insert("end_time".into(), NoVal::to_json(Some(t.timestamp()))); }
    if let Some(d) = req.duration { r.insert("duration".into(), NoVal::to_json(Some(i64::from(d)))); }
    if let Some(n) = req.node_count { r.insert("node_count".into(), NoVal::to_json(Some(i64::from(n)))); }
    if let Some(v) = &req.node_list { r.insert("node_list".into(), json!(v)); }
    if !req.users.is_empty() { r.insert("users".into(), json!(join_csv(&req.users))); }
    if !req.accounts.is_empty() { r.insert("accounts".into(), json!(join_csv(&req.accounts))); }
    if let Some(v) = &req.partition { r.insert("partition".into(), json!(v)); }
    if !req.flags.is_empty() { r.insert("flags".into(), json!(req.flags)); }
    json!({ "reservations": [Value::Object(r)] })
}

pub fn reservation_update_body(name: &str, update: &ReservationUpdate) -> Value {
    let mut r = Map::new();
    r.insert("name".into(), json!(name));
    if let Some(t) = update.start_time { r.insert("start_time".into(), NoVal::to_json(Some(t.timestamp()))); }
    if let Some(t) = update.end_time { r.insert("end_time".into(), NoVal::to_json(Some(t.timestamp()))); }
    if let Some(d) = update.duration { r.insert("duration".into(), NoVal::to_json(Some(i64::from(d)))); }
    if let Some(n) = update.node_count { r.insert("node_count".into(), NoVal::to_json(Some(i64::from(n)))); }
    if let Some(v) = &update.node_list { r.insert("node_list".into(), json!(v)); }
    if let Some(v) = &update.users { r.insert("users".into(), json!(join_csv(v))); }
    if let Some(v) = &update.accounts { r.insert("accounts".into(), json!(join_csv(v))); }
    json!({ "reservations": [Value::Object(r)] })
}

// ---------------- Ping ----------------

#[derive(Debug, Default, Deserialize)]
pub struct PingEnvelope {
    #[serde(default)]
    pub pings: Vec<WirePing>,
    #[serde(default)]
    pub meta: WireMeta,
}

#[derive(Debug, Default, Deserialize)]
pub struct WirePing {
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub pinged: String,
    #[serde(default)]
    pub latency: u64,
    #[serde(default)]
    pub mode: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireMeta {
    #[serde(default)]
    pub slurm: WireSlurmMeta,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireSlurmMeta {
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub cluster: String,
}

pub fn cluster_from_ping(p: PingEnvelope, api_version: &str) -> ClusterInfo {
    ClusterInfo {
        cluster_name: p.meta.slurm.cluster,
        release: p.meta.slurm.release,
        api_version: api_version.to_string(),
        controllers: p
            .pings
            .into_iter()
            .map(|c| ControllerPing {
                responding: c.pinged.eq_ignore_ascii_case("UP"),
                hostname: c.hostname,
                latency_us: c.latency,
                mode: c.mode,
            })
            .collect(),
    }
}
