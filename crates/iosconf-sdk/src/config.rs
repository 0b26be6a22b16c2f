//! Project configuration file support.
//!
//! Projects declare their build settings in an `iosconf.toml` file. The file
//! is searched for in the start directory and then its parents, stopping at a
//! repository root (a directory containing `.git`) or the filesystem root.
//!
//! ## Example Configuration
//!
//! ```toml
//! [app]
//! name = "Hello"
//! icons = ["Icon.png", "Icon@2x.png"]
//!
//! [app.info_plist]
//! UIRequiresPersistentWiFi = true
//!
//! [ios]
//! deployment_target = "5.0"
//! frameworks = ["UIKit", "Foundation", "CoreGraphics", "GameKit"]
//! device_family = ["iphone", "ipad"]
//!
//! [signing]
//! mode = "distribution"
//!
//! [toolchain]
//! data_dir = "/Library/RubyMotion/data"
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use anyhow::{Context, Result};
use iosconf_plist::{Dictionary, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::manifest::{SdkBuild, SdkBuildTable};
use crate::profile::DEFAULT_PROFILE_NAME;
use crate::types::{BuildMode, ConfigError};
use crate::version::Version;

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "iosconf.toml";

/// Root configuration structure for `iosconf.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Application identity and resources.
    pub app: AppConfig,

    /// Platform settings: versions, frameworks, device capabilities.
    pub ios: IosConfig,

    /// Code signing and provisioning.
    pub signing: SigningConfig,

    /// Toolchain and support data locations.
    pub toolchain: ToolchainConfig,
}

/// Application identity and resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application name, used as the executable and display name.
    pub name: String,

    /// `CFBundleVersion`. Defaults to "1.0".
    pub version: String,

    /// `CFBundleShortVersionString`. Defaults to "1".
    pub short_version: String,

    /// Bundle identifier.
    ///
    /// Defaults to `com.yourcompany.<name>` with whitespace removed.
    pub identifier: Option<String>,

    /// Icon file names.
    ///
    /// Kept untyped here so a wrongly shaped value is reported by the
    /// validator with the offending value rather than as a parse failure.
    pub icons: Option<toml::Value>,

    /// Whether the icons already carry the gloss effect.
    pub prerendered_icon: bool,

    /// Directories scanned for bundled resources and fonts.
    pub resources_dirs: Vec<PathBuf>,

    /// Builds the embedded-test variant of the application.
    pub spec_mode: bool,

    /// Free-form manifest overrides. These win over every derived key.
    pub info_plist: toml::Table,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Untitled".to_string(),
            version: "1.0".to_string(),
            short_version: "1".to_string(),
            identifier: None,
            icons: None,
            prerendered_icon: false,
            resources_dirs: vec![PathBuf::from("resources")],
            spec_mode: false,
            info_plist: toml::Table::new(),
        }
    }
}

impl AppConfig {
    /// Name of the `.app` bundle; the embedded-test variant is suffixed.
    pub fn bundle_name(&self) -> String {
        if self.spec_mode {
            format!("{}_spec", self.name)
        } else {
            self.name.clone()
        }
    }

    pub fn identifier(&self) -> String {
        let base = self.identifier.clone().unwrap_or_else(|| {
            let compact: String = self.name.chars().filter(|c| !c.is_whitespace()).collect();
            format!("com.yourcompany.{compact}")
        });
        if self.spec_mode { format!("{base}_spec") } else { base }
    }
}

/// A setting accepting either one symbol or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value.clone()],
            OneOrMany::Many(values) => values.clone(),
        }
    }
}

/// Platform settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IosConfig {
    /// SDK to build against. Discovered from the toolchain when unset.
    pub sdk_version: Option<Version>,

    /// Minimum OS version. Defaults to the SDK version.
    pub deployment_target: Option<Version>,

    /// Frameworks to link; their dependencies are added automatically.
    ///
    /// Defaults to `UIKit`, `Foundation` and `CoreGraphics`.
    pub frameworks: Vec<String>,

    /// Weakly linked frameworks.
    pub weak_frameworks: Vec<String>,

    /// Additional framework search paths.
    ///
    /// When any are declared, linked frameworks are no longer restricted to
    /// those with bridging metadata.
    pub framework_search_paths: Vec<PathBuf>,

    /// `iphone`, `ipad`, or a list of both. Defaults to `iphone`.
    pub device_family: OneOrMany,

    /// Defaults to `portrait`, `landscape_left` and `landscape_right`.
    pub interface_orientations: Vec<String>,

    pub background_modes: Vec<String>,

    /// Defaults to `default`.
    pub status_bar_style: String,

    /// Architectures per platform, replacing the discovered defaults.
    pub archs: BTreeMap<String, Vec<String>>,

    /// Platform-specific manifest block, applied before `app.info_plist`.
    pub platform_overrides: toml::Table,
}

impl Default for IosConfig {
    fn default() -> Self {
        Self {
            sdk_version: None,
            deployment_target: None,
            frameworks: ["UIKit", "Foundation", "CoreGraphics"].map(String::from).to_vec(),
            weak_frameworks: Vec::new(),
            framework_search_paths: Vec::new(),
            device_family: OneOrMany::One("iphone".to_string()),
            interface_orientations: ["portrait", "landscape_left", "landscape_right"]
                .map(String::from)
                .to_vec(),
            background_modes: Vec::new(),
            status_bar_style: "default".to_string(),
            archs: BTreeMap::new(),
            platform_overrides: toml::Table::new(),
        }
    }
}

/// Code signing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    pub mode: BuildMode,

    /// Certificate display name. Looked up in the keychain when unset.
    pub codesign_certificate: Option<String>,

    /// Profile path. Searched for by `profile_name` when unset.
    pub provisioning_profile: Option<PathBuf>,

    /// Substring matched against the embedded profile name.
    pub profile_name: String,

    /// Defaults to `~/Library/MobileDevice/Provisioning Profiles`.
    pub profiles_dir: Option<PathBuf>,

    /// Application identifier prefix. Read from the profile when unset.
    pub seed_id: Option<String>,

    /// Free-form entitlements. These win over the mode defaults.
    pub entitlements: toml::Table,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            mode: BuildMode::Development,
            codesign_certificate: None,
            provisioning_profile: None,
            profile_name: DEFAULT_PROFILE_NAME.to_string(),
            profiles_dir: None,
            seed_id: None,
            entitlements: toml::Table::new(),
        }
    }
}

/// Toolchain and support data settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Developer directory. Discovered when unset.
    pub xcode_dir: Option<PathBuf>,

    /// Support data root, one subdirectory per supported SDK version.
    pub data_dir: PathBuf,

    /// Directory holding helper executables such as `ios/deploy`.
    pub bin_dir: PathBuf,

    /// Oldest accepted toolchain version. Defaults to "4.0".
    pub min_xcode_version: Version,

    /// SDK version to platform build identifier table.
    pub sdk_builds: Vec<SdkBuild>,

    /// Build identifier for SDK versions missing from `sdk_builds`.
    pub sdk_build_fallback: String,

    /// Bridging metadata module that is always loaded.
    pub core_bridge_module: String,

    /// Extra bridging metadata module of the embedded-test variant.
    pub spec_bridge_module: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        let table = SdkBuildTable::default();
        Self {
            xcode_dir: None,
            data_dir: PathBuf::from("data"),
            bin_dir: PathBuf::from("bin"),
            min_xcode_version: Version::from_known("4.0"),
            sdk_builds: table.entries,
            sdk_build_fallback: table.fallback,
            core_bridge_module: "RubyMotion".to_string(),
            spec_bridge_module: "UIAutomation".to_string(),
        }
    }
}

impl ToolchainConfig {
    pub fn sdk_build_table(&self) -> SdkBuildTable {
        SdkBuildTable {
            entries: self.sdk_builds.clone(),
            fallback: self.sdk_build_fallback.clone(),
        }
    }
}

impl ProjectConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// A configuration for an application named `name` with default settings.
    pub fn starter(name: &str) -> Self {
        let mut config = Self::default();
        config.app.name = name.to_string();
        config
    }

    /// Loads configuration from the specified file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: ProjectConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Finds and loads configuration from the current directory or a parent.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover() -> Result<Option<(Self, PathBuf)>> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&cwd)
    }

    /// Finds and loads configuration starting from `start_dir`.
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                tracing::debug!("Using configuration at {}", config_path.display());
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }
}

/// Converts a free-form TOML value to a property-list value.
///
/// Datetimes become `date` leaves in their TOML text form.
pub fn toml_to_plist(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s.clone()),
        toml::Value::Integer(i) => Value::Integer(*i),
        toml::Value::Float(f) => Value::Real(*f),
        toml::Value::Boolean(b) => Value::Boolean(*b),
        toml::Value::Datetime(dt) => Value::Date(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.iter().map(toml_to_plist).collect()),
        toml::Value::Table(table) => Value::Dictionary(table_to_dictionary(table)),
    }
}

/// Converts a TOML table to a dictionary, keeping key order.
pub fn table_to_dictionary(table: &toml::Table) -> Dictionary {
    table.iter().map(|(key, value)| (key.clone(), toml_to_plist(value))).collect()
}

/// Icon file names from the untyped `app.icons` setting.
///
/// An absent setting means no icons; anything but an array of strings is an
/// [`ConfigError::InvalidValue`].
pub fn icon_files(icons: Option<&toml::Value>) -> Result<Vec<String>, ConfigError> {
    let Some(value) = icons else {
        return Ok(Vec::new());
    };
    let shape_error = || ConfigError::invalid("icons", format!("expected an array of strings, got `{value}'"));
    let items = value.as_array().ok_or_else(shape_error)?;
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or_else(shape_error))
        .collect()
}
