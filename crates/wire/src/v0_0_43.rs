//! v0.0.43 (Slurm 25.05 / 25.11). Job features are a list and the
//! reservation endpoints exist.

use serde::Deserialize;
use serde_json::{json, Value};
use slurmrest_core::prelude::*;

use crate::adapter::{RestAdapter, WireSchema};
use crate::common::{self, JobBase, NoVal};
use crate::version::ApiVersion;

pub struct V0043;

pub type Adapter = RestAdapter<V0043>;

#[derive(Debug, Default, Deserialize)]
pub struct JobInfo {
    #[serde(flatten)]
    pub base: JobBase,
    #[serde(default)]
    pub required_switches: NoVal,
    #[serde(default)]
    pub features: Vec<String>,
}

impl WireSchema for V0043 {
    const VERSION: ApiVersion = ApiVersion::V0_0_43;
    const NODE_DELETE: bool = true;
    const RESERVATIONS: bool = true;

    type JobInfo = JobInfo;

    fn job_from_wire(info: JobInfo) -> SlurmResult<Job> {
        let mut job = info.base.into_job()?;
        job.required_switches = info.required_switches.u32_or_zero();
        job.features = info.features.into_iter().filter(|f| !f.is_empty()).collect();
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
