//! Toolchain discovery.
//!
//! Finds the developer directory, the executables inside it, and the
//! toolchain version reported by `xcodebuild`.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::types::ConfigError;
use crate::version::Version;

/// Developer directory of an Xcode installed as an application bundle.
pub const XCODE_APP_DEVELOPER_DIR: &str = "/Applications/Xcode.app/Contents/Developer";

/// Candidate sources for the developer directory, in priority order.
#[derive(Debug, Clone)]
pub struct DeveloperDirSearch<'a> {
    /// Project setting; must exist when given.
    pub explicit: Option<&'a Path>,
    /// `DEVELOPER_DIR` from the environment.
    pub environment: Option<&'a Path>,
    /// Output of `xcode-select -print-path`.
    pub selected: Option<&'a Path>,
    /// Last resort, normally [`XCODE_APP_DEVELOPER_DIR`].
    pub fallback: &'a Path,
}

impl DeveloperDirSearch<'_> {
    pub fn locate(&self) -> Result<PathBuf, ConfigError> {
        if let Some(explicit) = self.explicit {
            if explicit.is_dir() {
                return Ok(explicit.to_path_buf());
            }
            return Err(ConfigError::not_found_in(
                "the configured Xcode developer directory",
                vec![explicit.to_path_buf()],
            ));
        }

        if let Some(env_dir) = self.environment
            && env_dir.is_dir()
        {
            return Ok(env_dir.to_path_buf());
        }

        if let Some(selected) = self.selected {
            if selected.starts_with("/Developer") && self.fallback.exists() {
                tracing::warn!(
                    "xcode-select points at {} while an Xcode is installed at {}. Run \
                     `sudo xcode-select -switch {}` to use it.",
                    selected.display(),
                    self.fallback.display(),
                    self.fallback.display()
                );
            }
            if selected.is_dir() {
                return Ok(selected.to_path_buf());
            }
        }

        if self.fallback.is_dir() {
            return Ok(self.fallback.to_path_buf());
        }

        let searched = self
            .environment
            .into_iter()
            .chain(self.selected)
            .chain(Some(self.fallback))
            .map(Path::to_path_buf)
            .collect();
        Err(ConfigError::not_found_in("any version of Xcode on the system", searched))
    }
}

/// Resolves paths inside a developer directory.
#[derive(Debug, Clone)]
pub struct ToolchainLocator {
    developer_dir: PathBuf,
}

impl ToolchainLocator {
    pub fn new(developer_dir: impl Into<PathBuf>) -> Self {
        Self {
            developer_dir: developer_dir.into(),
        }
    }

    pub fn developer_dir(&self) -> &Path {
        &self.developer_dir
    }

    pub fn platforms_dir(&self) -> PathBuf {
        self.developer_dir.join("Platforms")
    }

    pub fn platform_dir(&self, platform: &str) -> PathBuf {
        self.platforms_dir().join(format!("{platform}.platform"))
    }

    pub fn toolchain_bin_dir(&self) -> PathBuf {
        self.developer_dir.join("Toolchains/XcodeDefault.xctoolchain/usr/bin")
    }

    /// Finds the first existing executable among `candidates` for `platform`.
    ///
    /// The platform's developer bin directory is searched before the shared
    /// toolchain bin directory; within a directory, candidates are tried in
    /// the order given.
    pub fn locate(&self, platform: &str, candidates: &[&str]) -> Result<PathBuf, ConfigError> {
        let dirs = [
            self.platform_dir(platform).join("Developer/usr/bin"),
            self.toolchain_bin_dir(),
        ];
        let mut searched = Vec::new();
        for dir in &dirs {
            for name in candidates {
                let path = dir.join(name);
                if path.is_file() {
                    tracing::debug!("Located {} for {} at {}", name, platform, path.display());
                    return Ok(path);
                }
                searched.push(path);
            }
        }
        Err(ConfigError::not_found_in(
            format!("compilers for platform `{platform}'"),
            searched,
        ))
    }

    /// Finds a developer tool such as `xcodebuild` or `otool`.
    pub fn locate_binary(&self, name: &str) -> Result<PathBuf, ConfigError> {
        let dirs = [
            self.developer_dir.join("usr/bin"),
            self.toolchain_bin_dir(),
            PathBuf::from("/usr/bin"),
        ];
        let searched: Vec<PathBuf> = dirs.iter().map(|dir| dir.join(name)).collect();
        match searched.iter().find(|path| path.is_file()) {
            Some(path) => Ok(path.clone()),
            None => Err(ConfigError::not_found_in(format!("the `{name}' tool"), searched)),
        }
    }
}

/// Version and build identifier of the installed toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XcodeVersion {
    pub version: Version,
    pub build: String,
}

impl XcodeVersion {
    /// Zero-padded numeric form used by the `DTXcode` manifest key.
    ///
    /// `4.5` becomes `0450` and `4.5.1` becomes `0451`.
    pub fn dt_xcode(&self) -> String {
        let digits: String = self.version.as_str().chars().filter(|c| *c != '.').collect();
        if digits.len() == 2 {
            format!("0{digits}0")
        } else {
            format!("0{digits}")
        }
    }
}

/// Parses `xcodebuild -version` output.
///
/// ```
/// use iosconf_sdk::toolchain::parse_xcodebuild_version;
///
/// let parsed = parse_xcodebuild_version("Xcode 4.5\nBuild version 4G182\n")?;
/// assert_eq!(parsed.version.as_str(), "4.5");
/// assert_eq!(parsed.build, "4G182");
/// # Ok::<(), iosconf_sdk::ConfigError>(())
/// ```
pub fn parse_xcodebuild_version(text: &str) -> Result<XcodeVersion, ConfigError> {
    let field = |prefix: &str| {
        text.lines()
            .find_map(|line| line.trim().strip_prefix(prefix))
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };
    let version = field("Xcode ")
        .ok_or_else(|| ConfigError::parse("xcodebuild -version output", "missing `Xcode <version>' line"))?;
    let build = field("Build version ")
        .ok_or_else(|| ConfigError::parse("xcodebuild -version output", "missing `Build version <build>' line"))?;
    Ok(XcodeVersion {
        version: Version::parse(version)?,
        build: build.to_string(),
    })
}
