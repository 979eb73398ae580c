//! API version parsing and the Slurm release compatibility table.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApiVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl ApiVersion {
    pub const V0_0_40: ApiVersion = ApiVersion::new(0, 0, 40);
    pub const V0_0_41: ApiVersion = ApiVersion::new(0, 0, 41);
    pub const V0_0_42: ApiVersion = ApiVersion::new(0, 0, 42);
    pub const V0_0_43: ApiVersion = ApiVersion::new(0, 0, 43);

    pub const LATEST: ApiVersion = ApiVersion::V0_0_43;
    pub const STABLE: ApiVersion = ApiVersion::V0_0_42;

    pub const fn new(major: u16, minor: u16, patch: u16) -> Self { Self { major, minor, patch } }

    /// Parse `v0.0.42` or `0.0.42`. Does not check support.
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = EXACT_RE.captures(raw.trim())?;
        Some(Self::new(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?))
    }

    pub fn is_supported(&self) -> bool { SUPPORTED.contains(self) }

    /// Path segment used in endpoint URLs.
    pub fn path_segment(&self) -> String { self.to_string() }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Oldest first.
pub const SUPPORTED: [ApiVersion; 4] =
    [ApiVersion::V0_0_40, ApiVersion::V0_0_41, ApiVersion::V0_0_42, ApiVersion::V0_0_43];

pub fn supported_strings() -> Vec<String> { SUPPORTED.iter().map(|v| v.to_string()).collect() }

static EXACT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^v?(\d+)\.(\d+)\.(\d+)$").unwrap());
static PATH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/v(\d+)\.(\d+)\.(\d+)(?:/|$)").unwrap());
static RELEASE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?i:slurm[-_ ]?)?(\d{2})\.(\d{2})(?:\.\d+)?").unwrap());

/// Resolve an explicit hint: an alias or an exact supported version.
pub fn from_hint(hint: &str) -> Option<ApiVersion> {
    match hint.trim().to_ascii_lowercase().as_str() {
        "latest" => Some(ApiVersion::LATEST),
        "stable" => Some(ApiVersion::STABLE),
        other => ApiVersion::parse(other).filter(ApiVersion::is_supported),
    }
}

/// Supported version on the same `major.minor` line closest by patch; the newer one wins a tie.
pub fn nearest_supported(v: ApiVersion) -> Option<ApiVersion> {
    SUPPORTED
        .iter()
        .filter(|s| s.major == v.major && s.minor == v.minor)
        .min_by_key(|s| (s.patch.abs_diff(v.patch), std::cmp::Reverse(s.patch)))
        .copied()
}

/// First `/vX.Y.Z/` segment in a URL or path.
pub fn from_path(path: &str) -> Option<ApiVersion> {
    let caps = PATH_RE.captures(path)?;
    Some(ApiVersion::new(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?))
}

/// Server release (e.g. `Slurm-24.05.3`) to its `YY.MM` train, if it looks like one.
pub fn release_train(release: &str) -> Option<String> {
    let caps = RELEASE_RE.captures(release.trim())?;
    Some(format!("{}.{}", &caps[1], &caps[2]))
}

/// Which release trains each API version is served by.
pub const COMPATIBILITY: &[(ApiVersion, &[&str])] = &[
    (ApiVersion::V0_0_40, &["24.05", "24.11", "25.05"]),
    (ApiVersion::V0_0_41, &["24.11", "25.05", "25.11"]),
    (ApiVersion::V0_0_42, &["25.05", "25.11"]),
    (ApiVersion::V0_0_43, &["25.05", "25.11"]),
];

/// Highest API version served by the given Slurm release.
pub fn best_for_release(release: &str) -> Option<ApiVersion> {
    let train = release_train(release)?;
    COMPATIBILITY
        .iter()
        .filter(|(_, trains)| trains.contains(&train.as_str()))
        .map(|(v, _)| *v)
        .max()
}

pub fn releases_for(version: ApiVersion) -> &'static [&'static str] {
    COMPATIBILITY.iter().find(|(v, _)| *v == version).map(|(_, r)| *r).unwrap_or(&[])
}

/// Wire-visible changes between two adjacent versions.
pub fn breaking_changes(from: ApiVersion, to: ApiVersion) -> &'static [&'static str] {
    match (from, to) {
        (ApiVersion::V0_0_40, ApiVersion::V0_0_41) => &["job field minimum_switches renamed to required_switches"],
        (ApiVersion::V0_0_41, ApiVersion::V0_0_42) => &["exclusive and oversubscribe removed from job output"],
        (ApiVersion::V0_0_42, ApiVersion::V0_0_43) => &[
            "job features reported as a list",
            "reservation endpoints added",
        ],
        _ => &[],
    }
}
