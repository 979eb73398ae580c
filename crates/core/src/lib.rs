//! slurmrest core types: the version-independent domain model shared by every
//! wire adapter, plus the error taxonomy and the per-call context.

#![forbid(unsafe_code)]

pub mod clock;
pub mod context;
pub mod error;
pub mod model;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::CallContext;
pub use error::{ApiErrorDetail, SlurmError, SlurmResult};
pub use model::*;

pub mod prelude {
    pub use super::{
        Account, AccountCreate, AccountListOptions, CallContext, ClusterInfo, ClusterStats, Job, JobListOptions,
        JobState, JobSubmit, JobSubmitted, JobUpdate, Node, NodeListOptions, NodeState,
        NodeUpdate, Partition, PartitionListOptions, PartitionState, Reservation,
        ReservationCreate, ReservationListOptions, ReservationState, ReservationUpdate,
        ResourceKind, SlurmError, SlurmResult,
    };
}
