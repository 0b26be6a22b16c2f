//! SDK version discovery and ordering.
//!
//! Versions are dot-separated and compared component by component. Within a
//! component the leading digits compare numerically and any remaining suffix
//! compares as text, with no suffix sorting first (so `6.0` < `6.0b2` <
//! `6.1`). A missing trailing component counts as `0` (so `6` equals `6.0`).
//!
//! [`VersionCatalog`] enumerates the SDKs installed under a toolchain's
//! `Platforms` directory and the versions this tool has support data for.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::types::ConfigError;

/// A dot-separated version string such as `6.0` or `4.3.1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(String);

impl Version {
    /// Parses a version, rejecting empty components and leading non-digits.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let text = text.trim();
        let starts_with_digit = text.chars().next().is_some_and(|c| c.is_ascii_digit());
        if !starts_with_digit || text.split('.').any(|c| c.is_empty()) || text.contains(char::is_whitespace) {
            return Err(ConfigError::invalid("version", format!("`{}' is not a version string", text)));
        }
        Ok(Version(text.to_string()))
    }

    /// Wraps a literal that is known to be a well-formed version.
    pub(crate) fn from_known(text: &str) -> Self {
        Version(text.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

/// Splits a component into its leading digits and the remaining suffix.
fn split_component(component: &str) -> (&str, &str) {
    let end = component
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(component.len());
    component.split_at(end)
}

fn compare_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_component(a: &str, b: &str) -> Ordering {
    let (a_digits, a_suffix) = split_component(a);
    let (b_digits, b_suffix) = split_component(b);
    compare_digits(a_digits, b_digits).then_with(|| a_suffix.cmp(b_suffix))
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let mut left = self.components();
        let mut right = other.components();
        loop {
            match (left.next(), right.next()) {
                (None, None) => return Ordering::Equal,
                (a, b) => {
                    let ordering = compare_component(a.unwrap_or("0"), b.unwrap_or("0"));
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
            }
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl FromStr for Version {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Version::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The resolved pair of deployment target and SDK version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionConstraint {
    pub deployment_target: Version,
    pub sdk_version: Version,
}

impl VersionConstraint {
    /// Pairs an SDK with an optional deployment target, defaulting the
    /// target to the SDK itself. Ordering is not checked here.
    pub fn new(sdk_version: Version, deployment_target: Option<Version>) -> Self {
        Self {
            deployment_target: deployment_target.unwrap_or_else(|| sdk_version.clone()),
            sdk_version,
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.deployment_target <= self.sdk_version
    }

    /// Whether `version` lies in `[deployment_target, sdk_version]`.
    pub fn contains(&self, version: &Version) -> bool {
        *version >= self.deployment_target && *version <= self.sdk_version
    }
}

/// Enumerates installed SDKs and supported versions.
#[derive(Debug, Clone)]
pub struct VersionCatalog {
    platforms_dir: PathBuf,
    data_dir: PathBuf,
}

impl VersionCatalog {
    /// Creates a catalog over a toolchain `Platforms` directory and a support
    /// data directory holding one subdirectory per supported version.
    pub fn new(platforms_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            platforms_dir: platforms_dir.into(),
            data_dir: data_dir.into(),
        }
    }

    pub fn platforms_dir(&self) -> &Path {
        &self.platforms_dir
    }

    fn sdks_dir(&self, platform: &str) -> PathBuf {
        self.platforms_dir
            .join(format!("{platform}.platform"))
            .join("Developer/SDKs")
    }

    /// Path at which the SDK for `platform` at `version` is expected.
    pub fn sdk_dir(&self, platform: &str, version: &Version) -> PathBuf {
        self.sdks_dir(platform).join(format!("{platform}{version}.sdk"))
    }

    /// Support data directory for `version`.
    pub fn support_dir(&self, version: &Version) -> PathBuf {
        self.data_dir.join(version.as_str())
    }

    /// SDK versions installed for `platform`, ascending.
    ///
    /// A missing SDKs directory yields an empty list.
    pub fn installed_sdk_versions(&self, platform: &str) -> Result<Vec<Version>, ConfigError> {
        let dir = self.sdks_dir(platform);
        let mut versions = Vec::new();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(versions),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(version) = name
                .strip_prefix(platform)
                .and_then(|rest| rest.strip_suffix(".sdk"))
                .and_then(|v| Version::parse(v).ok())
            {
                versions.push(version);
            }
        }
        versions.sort();
        tracing::debug!("Found {} SDK(s) for {} in {}", versions.len(), platform, dir.display());
        Ok(versions)
    }

    /// Versions with a support data directory, ascending.
    pub fn supported_versions(&self) -> Result<Vec<Version>, ConfigError> {
        let mut versions = Vec::new();
        let entries = match fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(versions),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(version) = entry.file_name().to_str().and_then(|n| Version::parse(n).ok()) {
                versions.push(version);
            }
        }
        versions.sort();
        Ok(versions)
    }

    /// Picks the SDK for `platform` using a caller-supplied support predicate.
    ///
    /// Installed versions are tried from newest to oldest; the first accepted
    /// by `supported` wins. The deployment target defaults to the SDK.
    pub fn resolve_sdk_version(
        &self,
        platform: &str,
        deployment_target: Option<Version>,
        supported: impl Fn(&Version) -> bool,
    ) -> Result<VersionConstraint, ConfigError> {
        let installed = self.installed_sdk_versions(platform)?;
        if installed.is_empty() {
            return Err(ConfigError::not_found_in(
                format!("an SDK for platform `{platform}'"),
                vec![self.sdks_dir(platform)],
            ));
        }
        let sdk = installed.iter().rev().find(|v| supported(v)).cloned().ok_or_else(|| {
            let listed: Vec<&str> = installed.iter().map(Version::as_str).collect();
            ConfigError::not_found_in(
                format!(
                    "a supported {platform} SDK (installed versions {} have no support data)",
                    listed.join(", ")
                ),
                vec![self.data_dir.clone()],
            )
        })?;
        tracing::debug!("Resolved {} SDK version {}", platform, sdk);
        Ok(VersionConstraint::new(sdk, deployment_target))
    }

    /// [`resolve_sdk_version`](Self::resolve_sdk_version) with the default
    /// predicate: a version is supported when its support directory exists.
    pub fn resolve(&self, platform: &str, deployment_target: Option<Version>) -> Result<VersionConstraint, ConfigError> {
        self.resolve_sdk_version(platform, deployment_target, |v| self.support_dir(v).is_dir())
    }
}
