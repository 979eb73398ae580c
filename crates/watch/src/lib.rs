//! slurmrest watch engine.
//!
//! Polls a caller-supplied list operation, diffs each result against the last
//! good snapshot by resource identity and streams typed lifecycle events.

#![forbid(unsafe_code)]

use std::fmt::{Debug, Display};
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slurmrest_core::prelude::*;

mod diff;
mod engine;

pub use engine::{spawn_watch, CancelHandle, EventFilter, WatchHandle, WatchPhase};

/// A resource the engine can diff: stable identity plus a comparable state.
pub trait Watchable: Clone + Debug + Serialize + Send + Sync + 'static {
    type Id: Ord + Clone + Debug + Display + Serialize + Send + Sync + 'static;
    type State: PartialEq + Clone + Debug + Display + Serialize + Send + Sync + 'static;

    const KIND: ResourceKind;

    fn id(&self) -> Self::Id;
    fn state(&self) -> Self::State;

    /// Event emitted when the resource drops out of the list.
    fn vanished() -> EventKind { EventKind::Removed }
}

impl Watchable for Job {
    type Id = u32;
    type State = JobState;
    const KIND: ResourceKind = ResourceKind::Job;

    fn id(&self) -> u32 { self.job_id }
    fn state(&self) -> JobState { self.state.clone() }
    fn vanished() -> EventKind { EventKind::Completed }
}

impl Watchable for Node {
    type Id = String;
    type State = NodeState;
    const KIND: ResourceKind = ResourceKind::Node;

    fn id(&self) -> String { self.name.clone() }
    fn state(&self) -> NodeState { self.state.clone() }
}

impl Watchable for Partition {
    type Id = String;
    type State = PartitionState;
    const KIND: ResourceKind = ResourceKind::Partition;

    fn id(&self) -> String { self.name.clone() }
    fn state(&self) -> PartitionState { self.state.clone() }
}

/// Accounts have no lifecycle; the deleted flag stands in for one.
impl Watchable for Account {
    type Id = String;
    type State = bool;
    const KIND: ResourceKind = ResourceKind::Account;

    fn id(&self) -> String { self.name.clone() }
    fn state(&self) -> bool { self.deleted }
}

impl Watchable for Reservation {
    type Id = String;
    type State = ReservationState;
    const KIND: ResourceKind = ResourceKind::Reservation;

    fn id(&self) -> String { self.name.clone() }
    fn state(&self) -> ReservationState { self.state.clone() }
    fn vanished() -> EventKind { EventKind::Completed }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    New,
    StateChanged,
    Completed,
    Removed,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(bound(serialize = ""))]
pub struct WatchEvent<R: Watchable> {
    pub kind: EventKind,
    pub resource_kind: ResourceKind,
    pub id: Option<R::Id>,
    pub old_state: Option<R::State>,
    pub new_state: Option<R::State>,
    /// Full record for new and state-changed events.
    pub resource: Option<R>,
    pub at: DateTime<Utc>,
    pub error: Option<SlurmError>,
}

impl<R: Watchable> WatchEvent<R> {
    pub fn error(err: SlurmError, at: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Error,
            resource_kind: R::KIND,
            id: None,
            old_state: None,
            new_state: None,
            resource: None,
            at,
            error: Some(err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub interval: Duration,
    /// Deadline for one list call; `None` waits indefinitely.
    pub poll_timeout: Option<Duration>,
    pub buffer: usize,
    /// Report the first poll's contents as `New` events.
    pub emit_baseline: bool,
    pub exclude_new: bool,
    pub exclude_removed: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            poll_timeout: Some(Duration::from_secs(30)),
            buffer: 100,
            emit_baseline: false,
            exclude_new: false,
            exclude_removed: false,
        }
    }
}

/// The list operation being watched.
#[async_trait::async_trait]
pub trait ListSource<R>: Send + Sync {
    async fn list(&self) -> SlurmResult<Vec<R>>;
}

#[async_trait::async_trait]
impl<R, F, Fut> ListSource<R> for F
where
    R: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = SlurmResult<Vec<R>>> + Send,
{
    async fn list(&self) -> SlurmResult<Vec<R>> { (self)().await }
}
