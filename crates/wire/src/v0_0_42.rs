//! v0.0.42 (Slurm 25.05 / 25.11). Job output no longer reports `exclusive` or
//! `oversubscribe`, so `Job::exclusive` is always `None` here.

use serde::Deserialize;
use serde_json::{json, Value};
use slurmrest_core::prelude::*;

use crate::adapter::{RestAdapter, WireSchema};
use crate::common::{self, JobBase, NoVal};
use crate::version::ApiVersion;

pub struct V0042;

pub type Adapter = RestAdapter<V0042>;

#[derive(Debug, Default, Deserialize)]
pub struct JobInfo {
    #[serde(flatten)]
    pub base: JobBase,
    #[serde(default)]
    pub required_switches: NoVal,
    #[serde(default)]
    pub features: String,
}

impl WireSchema for V0042 {
    const VERSION: ApiVersion = ApiVersion::V0_0_42;
    const NODE_DELETE: bool = true;
    const RESERVATIONS: bool = false;

    type JobInfo = JobInfo;

    fn job_from_wire(info: JobInfo) -> SlurmResult<Job> {
        let mut job = info.base.into_job()?;
        job.required_switches = info.required_switches.u32_or_zero();
        job.features = common::split_csv(&info.features);
        Ok(job)
    }

    fn job_submit_body(req: &JobSubmit) -> Value {
        let mut job = common::job_desc(req);
        if let Some(n) = req.required_switches {
            job.insert("required_switches".into(), json!(n));
        }
        common::submit_envelope(&req.script, job)
    }
}
