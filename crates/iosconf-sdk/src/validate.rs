//! Consistency checks run before any artifact is written.

use std::fmt;

use crate::config::icon_files;
use crate::types::ConfigError;
use crate::version::{Version, VersionCatalog, VersionConstraint};

/// Resolved settings to cross-check.
///
/// Checks run in a fixed order and stop at the first failure:
///
/// 1. the toolchain is at least `min_xcode_version`,
/// 2. every platform has its SDK directory,
/// 3. the deployment target does not exceed the SDK version,
/// 4. support data exists for the SDK version,
/// 5. `icons` is an array of strings.
pub struct ConfigValidator<'a> {
    pub xcode_version: &'a Version,
    pub min_xcode_version: &'a Version,
    pub catalog: &'a VersionCatalog,
    pub platforms: &'a [&'a str],
    pub constraint: &'a VersionConstraint,
    pub icons: Option<&'a toml::Value>,
}

impl fmt::Debug for ConfigValidator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigValidator")
            .field("xcode_version", self.xcode_version)
            .field("platforms", &self.platforms)
            .field("constraint", self.constraint)
            .finish_non_exhaustive()
    }
}

impl ConfigValidator<'_> {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.xcode_version < self.min_xcode_version {
            return Err(ConfigError::UnsupportedVersion(format!(
                "Xcode {} or greater is expected, found {}. Install a newer Xcode or select one with \
                 `xcode-select -switch'.",
                self.min_xcode_version, self.xcode_version
            )));
        }

        let sdk_version = &self.constraint.sdk_version;
        for platform in self.platforms {
            let sdk_dir = self.catalog.sdk_dir(platform, sdk_version);
            if !sdk_dir.is_dir() {
                return Err(ConfigError::not_found_in(
                    format!("SDK for platform `{platform}' version {sdk_version}"),
                    vec![sdk_dir],
                ));
            }
        }

        if !self.constraint.is_ordered() {
            return Err(ConfigError::invalid(
                "deployment_target",
                format!(
                    "deployment target {} must be equal to or lesser than the SDK version {}",
                    self.constraint.deployment_target, sdk_version
                ),
            ));
        }

        let support_dir = self.catalog.support_dir(sdk_version);
        if !support_dir.is_dir() {
            return Err(ConfigError::UnsupportedVersion(format!(
                "iOS SDK {sdk_version} is not supported by this version of the tool \
                 (no support data at {})",
                support_dir.display()
            )));
        }

        icon_files(self.icons)?;
        tracing::debug!("Configuration is consistent");
        Ok(())
    }
}
