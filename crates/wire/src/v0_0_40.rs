//! v0.0.40 (Slurm 24.05 / 24.11 / 25.05).
//!
//! Switch count is still `minimum_switches`, `exclusive` is reported, and
//! features arrive as a comma-separated string.

use serde::Deserialize;
use serde_json::{json, Value};
use slurmrest_core::prelude::*;

use crate::adapter::{RestAdapter, WireSchema};
use crate::common::{self, JobBase, NoVal};
use crate::version::ApiVersion;

pub struct V0040;

pub type Adapter = RestAdapter<V0040>;

#[derive(Debug, Default, Deserialize)]
pub struct JobInfo {
    #[serde(flatten)]
    pub base: JobBase,
    #[serde(default)]
    pub minimum_switches: NoVal,
    #[serde(default)]
    pub exclusive: Option<Vec<String>>,
    #[serde(default)]
    pub features: String,
}

/// `exclusive` is a flag list; any entry other than `FALSE` means exclusive.
pub(crate) fn exclusive_from_flags(flags: Option<Vec<String>>) -> Option<bool> {
    flags.map(|f| f.iter().any(|x| !x.eq_ignore_ascii_case("FALSE")))
}

pub(crate) fn exclusive_to_flags(exclusive: Option<bool>) -> Option<Value> {
    exclusive.map(|e| if e { json!(["USER"]) } else { json!([]) })
}

impl WireSchema for V0040 {
    const VERSION: ApiVersion = ApiVersion::V0_0_40;
    const NODE_DELETE: bool = false;
    const RESERVATIONS: bool = false;

    type JobInfo = JobInfo;

    fn job_from_wire(info: JobInfo) -> SlurmResult<Job> {
        let mut job = info.base.into_job()?;
        job.required_switches = info.minimum_switches.u32_or_zero();
        job.exclusive = exclusive_from_flags(info.exclusive);
        job.features = common::split_csv(&info.features);
        Ok(job)
    }

    fn job_submit_body(req: &JobSubmit) -> Value {
        let mut job = common::job_desc(req);
        if let Some(n) = req.required_switches {
            job.insert("minimum_switches".into(), json!(n));
        }
        if let Some(flags) = exclusive_to_flags(req.exclusive) {
            job.insert("exclusive".into(), flags);
        }
        common::submit_envelope(&req.script, job)
    }
}
