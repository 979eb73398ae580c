//! Adapter selection: explicit hint, or probe the server and map its reported
//! version through the compatibility table.

use std::sync::Arc;

use serde_json::Value;
use slurmrest_core::{SlurmError, SlurmResult};
use tracing::{debug, info};

use crate::version::{self, ApiVersion, SUPPORTED};
use crate::{common, v0_0_40, v0_0_41, v0_0_42, v0_0_43, VersionAdapter, WireAccessor, WireRequest};

/// Reports what the server says it is: an API version (`v0.0.42`) or a Slurm
/// release (`Slurm-24.05.3`).
#[async_trait::async_trait]
pub trait VersionProbe: Send + Sync {
    async fn reported_version(&self) -> SlurmResult<String>;
}

/// Reads the server's OpenAPI document.
pub struct OpenApiProbe {
    accessor: Arc<dyn WireAccessor>,
}

impl OpenApiProbe {
    pub fn new(accessor: Arc<dyn WireAccessor>) -> Self { Self { accessor } }
}

#[async_trait::async_trait]
impl VersionProbe for OpenApiProbe {
    async fn reported_version(&self) -> SlurmResult<String> {
        let resp = self
            .accessor
            .call(WireRequest::get("/openapi/v3"))
            .await
            .map_err(|e| SlurmError::VersionDetection(e.to_string()))?;
        common::check_response(&resp, "openapi").map_err(|e| SlurmError::VersionDetection(e.to_string()))?;
        let doc: Value = serde_json::from_slice(&resp.body)
            .map_err(|e| SlurmError::VersionDetection(format!("openapi document is not JSON: {e}")))?;
        reported_from_openapi(&doc)
            .ok_or_else(|| SlurmError::VersionDetection("openapi document names no version".into()))
    }
}

/// `info.version`, else the first server URL with a `/vX.Y.Z/` segment, else
/// the highest supported version among the document's paths.
pub fn reported_from_openapi(doc: &Value) -> Option<String> {
    if let Some(v) = doc.pointer("/info/version").and_then(Value::as_str).filter(|s| !s.is_empty()) {
        return Some(v.to_string());
    }
    let from_servers = doc
        .get("servers")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|s| s.get("url").and_then(Value::as_str))
        .find_map(version::from_path);
    if let Some(v) = from_servers {
        return Some(v.to_string());
    }
    doc.get("paths")
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|paths| paths.keys())
        .filter_map(|p| version::from_path(p))
        .filter(ApiVersion::is_supported)
        .max()
        .map(|v| v.to_string())
}

/// Map a reported version string to a supported API version.
pub fn interpret_reported(raw: &str) -> SlurmResult<ApiVersion> {
    let unsupported = || unsupported_version(raw);
    if let Some(v) = ApiVersion::parse(raw) {
        return if v.is_supported() { Ok(v) } else { Err(unsupported()) };
    }
    if version::release_train(raw).is_some() {
        return version::best_for_release(raw).ok_or_else(unsupported);
    }
    Err(SlurmError::VersionDetection(format!("unrecognized server version {raw:?}")))
}

/// Rejection for `requested`, naming the closest supported version when there is one.
fn unsupported_version(requested: &str) -> SlurmError {
    let nearest = ApiVersion::parse(requested).and_then(version::nearest_supported).map(|v| v.to_string());
    SlurmError::UnsupportedVersion { requested: requested.to_string(), supported: version::supported_strings(), nearest }
}

/// Builds the adapter for a version. Holds only the accessor the adapters share.
#[derive(Clone)]
pub struct AdapterRegistry {
    accessor: Arc<dyn WireAccessor>,
}

impl AdapterRegistry {
    pub fn new(accessor: Arc<dyn WireAccessor>) -> Self { Self { accessor } }

    pub fn supported() -> &'static [ApiVersion] { &SUPPORTED }

    pub fn build(&self, v: ApiVersion) -> SlurmResult<Arc<dyn VersionAdapter>> {
        let acc = Arc::clone(&self.accessor);
        let adapter: Arc<dyn VersionAdapter> = match v {
            ApiVersion::V0_0_40 => Arc::new(v0_0_40::Adapter::new(acc)),
            ApiVersion::V0_0_41 => Arc::new(v0_0_41::Adapter::new(acc)),
            ApiVersion::V0_0_42 => Arc::new(v0_0_42::Adapter::new(acc)),
            ApiVersion::V0_0_43 => Arc::new(v0_0_43::Adapter::new(acc)),
            other => return Err(unsupported_version(&other.to_string())),
        };
        Ok(adapter)
    }

    /// Explicit hints must be an alias or name a supported version exactly.
    pub fn resolve_explicit(&self, hint: &str) -> SlurmResult<Arc<dyn VersionAdapter>> {
        match version::from_hint(hint) {
            Some(v) => self.build(v),
            None => Err(unsupported_version(hint.trim())),
        }
    }

    /// Empty hint means detect through `probe`.
    pub async fn resolve(&self, hint: &str, probe: Option<&dyn VersionProbe>) -> SlurmResult<Arc<dyn VersionAdapter>> {
        if !hint.trim().is_empty() {
            let adapter = self.resolve_explicit(hint)?;
            info!(hint = %hint, version = %adapter.version(), "registry: explicit version");
            return Ok(adapter);
        }
        let probe = probe.ok_or_else(|| SlurmError::VersionDetection("no version hint and no probe configured".into()))?;
        let reported = probe.reported_version().await?;
        debug!(reported = %reported, "registry: server reported version");
        let v = interpret_reported(&reported)?;
        info!(reported = %reported, version = %v, "registry: detected version");
        self.build(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn openapi_info_version_wins() {
        let doc = json!({"info": {"version": "Slurm-24.11.0"}, "servers": [{"url": "/slurm/v0.0.40/"}]});
        assert_eq!(reported_from_openapi(&doc).as_deref(), Some("Slurm-24.11.0"));
    }

    #[test]
    fn openapi_falls_back_to_servers_then_paths() {
        let doc = json!({"servers": [{"url": "http://ctl/"}, {"url": "http://ctl/slurm/v0.0.41/"}]});
        assert_eq!(reported_from_openapi(&doc).as_deref(), Some("v0.0.41"));
        let doc = json!({"paths": {"/slurm/v0.0.40/jobs": {}, "/slurm/v0.0.42/jobs": {}, "/slurm/v0.0.44/jobs": {}}});
        assert_eq!(reported_from_openapi(&doc).as_deref(), Some("v0.0.42"));
        assert_eq!(reported_from_openapi(&json!({})), None);
    }

    #[test]
    fn reported_strings() {
        assert_eq!(interpret_reported("v0.0.41").unwrap(), ApiVersion::V0_0_41);
        assert_eq!(interpret_reported("Slurm-24.05.3").unwrap(), ApiVersion::V0_0_40);
        assert!(matches!(interpret_reported("v0.0.39"), Err(SlurmError::UnsupportedVersion { .. })));
        assert!(matches!(interpret_reported("Slurm-23.02.1"), Err(SlurmError::UnsupportedVersion { .. })));
        assert!(matches!(interpret_reported("banana"), Err(SlurmError::VersionDetection(_))));
    }
}
