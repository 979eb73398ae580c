//! Client configuration from the process environment.

use std::sync::Arc;
use std::time::Duration;

use slurmrest_cache::{CacheConfig, CacheProfile};
use slurmrest_core::SlurmResult;
use slurmrest_wire::http::HttpAccessor;
use tracing::warn;

use crate::SlurmClientBuilder;

pub const DEFAULT_URL: &str = "http://localhost:6820";

#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Explicit version or alias; empty means detect from the server.
    pub api_version: String,
    pub user_name: Option<String>,
    pub token: Option<String>,
    pub timeout: Duration,
    /// `None` disables response caching.
    pub cache: Option<CacheConfig>,
    pub watch_interval: Duration,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("user_name", &self.user_name)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("cache", &self.cache.as_ref().map(|c| c.max_size))
            .field("watch_interval", &self.watch_interval)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_URL.to_string(),
            api_version: String::new(),
            user_name: None,
            token: None,
            timeout: Duration::from_secs(30),
            cache: Some(CacheConfig::default()),
            watch_interval: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self { Self::from_lookup(|k| std::env::var(k).ok()) }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let non_empty = |k: &str| get(k).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        let timeout = get("SLURM_TIMEOUT_SECS").and_then(|s| s.parse().ok()).map(Duration::from_secs).unwrap_or(d.timeout);
        let watch_interval = get("SLURMREST_WATCH_INTERVAL_SECS")
            .and_then(|s| s.parse().ok())
            .filter(|s: &u64| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(d.watch_interval);

        let cache = match non_empty("SLURMREST_CACHE").map(|s| s.to_ascii_lowercase()) {
            Some(s) if s == "off" || s == "none" || s == "false" => None,
            Some(s) => match s.parse::<CacheProfile>() {
                Ok(p) => Some(CacheConfig::profile(p)),
                Err(e) => {
                    warn!(error = %e, "SLURMREST_CACHE: falling back to the default profile");
                    Some(CacheConfig::default())
                }
            },
            None => Some(CacheConfig::default()),
        };
        let cache = cache.map(|mut cfg| {
            if let Some(n) = get("SLURMREST_CACHE_MAX_SIZE").and_then(|s| s.parse().ok()) {
                cfg.max_size = n;
            }
            if let Some(secs) = get("SLURMREST_CACHE_TTL_SECS").and_then(|s| s.parse().ok()) {
                cfg.default_ttl = Duration::from_secs(secs);
            }
            cfg
        });

        Self {
            base_url: non_empty("SLURM_REST_URL").unwrap_or(d.base_url),
            api_version: non_empty("SLURM_API_VERSION").unwrap_or_default(),
            user_name: non_empty("SLURM_USER_NAME"),
            token: non_empty("SLURM_JWT"),
            timeout,
            cache,
            watch_interval,
        }
    }

    /// Builder wired to an HTTP accessor for `base_url`.
    pub fn builder(&self) -> SlurmResult<SlurmClientBuilder> {
        let http = HttpAccessor::new(&self.base_url, Some(self.timeout))?.with_auth(self.user_name.clone(), self.token.clone());
        let mut b = SlurmClientBuilder::new(Arc::new(http)).version(self.api_version.clone()).timeout(self.timeout);
        b = match &self.cache {
            Some(cfg) => b.cache_config(cfg.clone()),
            None => b.without_cache(),
        };
        let watch = slurmrest_watch::WatchOptions { interval: self.watch_interval, ..Default::default() };
        Ok(b.watch_defaults(watch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg(vars: &[(&str, &str)]) -> ClientConfig {
        let m: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ClientConfig::from_lookup(|k| m.get(k).cloned())
    }

    #[test]
    fn defaults_without_env() {
        let c = cfg(&[]);
        assert_eq!(c.base_url, DEFAULT_URL);
        assert!(c.api_version.is_empty());
        assert_eq!(c.timeout, Duration::from_secs(30));
        assert_eq!(c.cache.as_ref().map(|c| c.max_size), Some(1000));
        assert_eq!(c.watch_interval, Duration::from_secs(5));
    }

    #[test]
    fn reads_connection_and_cache_vars() {
        let c = cfg(&[
            ("SLURM_REST_URL", "https://slurm.example:6820"),
            ("SLURM_API_VERSION", "stable"),
            ("SLURM_USER_NAME", "alice"),
            ("SLURM_JWT", "secret"),
            ("SLURM_TIMEOUT_SECS", "5"),
            ("SLURMREST_CACHE", "Conservative"),
            ("SLURMREST_CACHE_MAX_SIZE", "10"),
            ("SLURMREST_WATCH_INTERVAL_SECS", "2"),
        ]);
        assert_eq!(c.base_url, "https://slurm.example:6820");
        assert_eq!(c.api_version, "stable");
        assert_eq!(c.user_name.as_deref(), Some("alice"));
        assert_eq!(c.timeout, Duration::from_secs(5));
        let cache = c.cache.as_ref().unwrap();
        assert_eq!(cache.max_size, 10);
        assert_eq!(cache.default_ttl, Duration::from_secs(60));
        assert_eq!(c.watch_interval, Duration::from_secs(2));
        assert!(!format!("{c:?}").contains("secret"));
    }

    #[test]
    fn cache_off_and_bad_values() {
        assert!(cfg(&[("SLURMREST_CACHE", "off")]).cache.is_none());
        let c = cfg(&[("SLURMREST_CACHE", "huge"), ("SLURM_TIMEOUT_SECS", "soon"), ("SLURMREST_WATCH_INTERVAL_SECS", "0")]);
        assert_eq!(c.cache.as_ref().map(|c| c.max_size), Some(1000));
        assert_eq!(c.timeout, Duration::from_secs(30));
        assert_eq!(c.watch_interval, Duration::from_secs(5));
    }

    #[test]
    fn builder_rejects_bad_url() {
        let c = ClientConfig { base_url: "ftp://nowhere".into(), ..Default::default() };
        assert!(c.builder().is_err());
    }
}
