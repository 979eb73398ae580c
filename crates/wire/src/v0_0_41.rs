//! v0.0.41 (Slurm 24.11 / 25.05 / 25.11). `minimum_switches` became
//! `required_switches`; everything else matches v0.0.40.

use serde::Deserialize;
use serde_json::{json, Value};
use slurmrest_core::prelude::*;

use crate::adapter::{RestAdapter, WireSchema};
use crate::common::{self, JobBase, NoVal};
use crate::v0_0_40::{exclusive_from_flags, exclusive_to_flags};
use crate::version::ApiVersion;

pub struct V0041;

pub type Adapter = RestAdapter<V0041>;

#[derive(Debug, Default, Deserialize)]
pub struct JobInfo {
    #[serde(flatten)]
    pub base: JobBase,
    #[serde(default)]
    pub required_switches: NoVal,
    #[serde(default)]
    pub exclusive: Option<Vec<String>>,
    #[serde(default)]
    pub features: String,
}

impl WireSchema for V0041 {
    const VERSION: ApiVersion = ApiVersion::V0_0_41;
    const NODE_DELETE: bool = true;
    const RESERVATIONS: bool = false;

    type JobInfo = JobInfo;

    fn job_from_wire(info: JobInfo) -> SlurmResult<Job> {
        let mut job = info.base.into_job()?;
        job.required_switches = info.required_switches.u32_or_zero();
        job.exclusive = exclusive_from_flags(info.exclusive);
        job.features = common::split_csv(&info.features);
        Ok(job)
    }

    fn job_submit_body(req: &JobSubmit) -> Value {
        let mut job = common::job_desc(req);
        if let Some(n) = req.required_switches {
            job.insert("required_switches".into(), json!(n));
        }
        if let Some(flags) = exclusive_to_flags(req.exclusive) {
            job.insert("exclusive".into(), flags);
        }
        common::submit_envelope(&req.script, job)
    }
}
