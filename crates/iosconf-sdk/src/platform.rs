//! Platform targets and the compiler flags derived from them.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::ConfigError;
use crate::version::Version;

/// Platform that builds run on locally (simulator).
pub const LOCAL_PLATFORM: &str = "iPhoneSimulator";
/// Platform that builds are deployed to (device).
pub const DEPLOY_PLATFORM: &str = "iPhoneOS";
/// Every platform a build produces artifacts for.
pub const PLATFORMS: [&str; 2] = [LOCAL_PLATFORM, DEPLOY_PLATFORM];

/// A resolved platform: its SDK root and the architectures built for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformTarget {
    pub name: String,
    pub sdk_root: PathBuf,
    pub archs: Vec<String>,
}

impl PlatformTarget {
    pub fn frameworks_dir(&self) -> PathBuf {
        self.sdk_root.join("System/Library/Frameworks")
    }

    /// Flags shared by the compiler and the linker.
    pub fn common_flags(&self, deployment_target: &Version) -> String {
        let arch_flags: Vec<String> = self.archs.iter().map(|arch| format!("-arch {arch}")).collect();
        format!(
            "{} -isysroot \"{}\" -F{} -miphoneos-version-min={}",
            arch_flags.join(" "),
            self.sdk_root.display(),
            self.frameworks_dir().display(),
            deployment_target
        )
    }

    pub fn cflags(&self, deployment_target: &Version, cplusplus: bool) -> String {
        let mut flags = format!("{} -fexceptions -fblocks", self.common_flags(deployment_target));
        if !cplusplus {
            flags.push_str(" -std=c99");
        }
        flags.push_str(" -fobjc-legacy-dispatch -fobjc-abi-version=2");
        flags
    }

    pub fn ldflags(&self, deployment_target: &Version) -> String {
        let mut flags = self.common_flags(deployment_target);
        // ARC runtime support has to be linked in explicitly before 5.0.
        let major = deployment_target.components().next().and_then(|m| m.parse::<u64>().ok());
        if major.is_some_and(|major| major < 5) {
            flags.push_str(" -fobjc-arc");
        }
        flags
    }
}

/// Architectures with a `kernel-<arch>.bc` file in `dir`, sorted.
///
/// A missing directory yields no architectures.
pub fn default_archs(dir: &Path) -> Result<Vec<String>, ConfigError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut archs = Vec::new();
    for entry in entries {
        let name = entry?.file_name();
        if let Some(arch) = name
            .to_str()
            .and_then(|n| n.strip_prefix("kernel-"))
            .and_then(|n| n.strip_suffix(".bc"))
            .filter(|arch| !arch.is_empty())
        {
            archs.push(arch.to_string());
        }
    }
    archs.sort();
    Ok(archs)
}
