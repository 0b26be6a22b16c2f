//! Manifest (`Info.plist`) and entitlements generation.
//!
//! The manifest is assembled from four partial dictionaries merged in a fixed
//! order, later blocks winning on key collisions:
//!
//! 1. the generic bundle identity block,
//! 2. fields derived from the resolved platform and toolchain,
//! 3. the project's platform-specific override block,
//! 4. the project's free-form user overrides.
//!
//! Symbolic settings (device family, orientations, background modes, status
//! bar style) parse into closed enums; anything outside the accepted set is a
//! [`ConfigError::UnknownValue`] naming the setting and the offending value.

use iosconf_plist::{Dictionary, Value};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::toolchain::XcodeVersion;
use crate::types::{BuildMode, ConfigError};
use crate::version::Version;

/// Entitlement key holding `<seed id>.<bundle identifier>`.
pub const APPLICATION_IDENTIFIER_KEY: &str = "application-identifier";
/// Entitlement key allowing a debugger to attach.
pub const GET_TASK_ALLOW_KEY: &str = "get-task-allow";
/// Four-character creator code written to `CFBundleSignature`.
pub const BUNDLE_SIGNATURE: &str = "????";

/// Target device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFamily {
    Iphone,
    Ipad,
}

impl DeviceFamily {
    /// Numeric code used by `UIDeviceFamily`.
    pub fn code(&self) -> u8 {
        match self {
            DeviceFamily::Iphone => 1,
            DeviceFamily::Ipad => 2,
        }
    }
}

impl FromStr for DeviceFamily {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "iphone" => Ok(DeviceFamily::Iphone),
            "ipad" => Ok(DeviceFamily::Ipad),
            _ => Err(unknown("device_family", s)),
        }
    }
}

/// Supported interface orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceOrientation {
    Portrait,
    LandscapeLeft,
    LandscapeRight,
    PortraitUpsideDown,
}

impl InterfaceOrientation {
    pub fn constant(&self) -> &'static str {
        match self {
            InterfaceOrientation::Portrait => "UIInterfaceOrientationPortrait",
            InterfaceOrientation::LandscapeLeft => "UIInterfaceOrientationLandscapeLeft",
            InterfaceOrientation::LandscapeRight => "UIInterfaceOrientationLandscapeRight",
            InterfaceOrientation::PortraitUpsideDown => "UIInterfaceOrientationPortraitUpsideDown",
        }
    }
}

impl FromStr for InterfaceOrientation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "portrait" => Ok(InterfaceOrientation::Portrait),
            "landscape_left" => Ok(InterfaceOrientation::LandscapeLeft),
            "landscape_right" => Ok(InterfaceOrientation::LandscapeRight),
            "portrait_upside_down" => Ok(InterfaceOrientation::PortraitUpsideDown),
            _ => Err(unknown("interface_orientation", s)),
        }
    }
}

/// Background execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundMode {
    Audio,
    Location,
    Voip,
    NewsstandContent,
    ExternalAccessory,
    BluetoothCentral,
}

impl BackgroundMode {
    pub fn constant(&self) -> &'static str {
        match self {
            BackgroundMode::Audio => "audio",
            BackgroundMode::Location => "location",
            BackgroundMode::Voip => "voip",
            BackgroundMode::NewsstandContent => "newsstand-content",
            BackgroundMode::ExternalAccessory => "external-accessory",
            BackgroundMode::BluetoothCentral => "bluetooth-central",
        }
    }
}

impl FromStr for BackgroundMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(BackgroundMode::Audio),
            "location" => Ok(BackgroundMode::Location),
            "voip" => Ok(BackgroundMode::Voip),
            "newsstand_content" => Ok(BackgroundMode::NewsstandContent),
            "external_accessory" => Ok(BackgroundMode::ExternalAccessory),
            "bluetooth_central" => Ok(BackgroundMode::BluetoothCentral),
            _ => Err(unknown("background_modes", s)),
        }
    }
}

/// Status bar appearance at launch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusBarStyle {
    #[default]
    Default,
    BlackTranslucent,
    BlackOpaque,
}

impl StatusBarStyle {
    pub fn constant(&self) -> &'static str {
        match self {
            StatusBarStyle::Default => "UIStatusBarStyleDefault",
            StatusBarStyle::BlackTranslucent => "UIStatusBarStyleBlackTranslucent",
            StatusBarStyle::BlackOpaque => "UIStatusBarStyleBlackOpaque",
        }
    }
}

impl FromStr for StatusBarStyle {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(StatusBarStyle::Default),
            "black_translucent" => Ok(StatusBarStyle::BlackTranslucent),
            "black_opaque" => Ok(StatusBarStyle::BlackOpaque),
            _ => Err(unknown("status_bar_style", s)),
        }
    }
}

fn unknown(field: &'static str, value: &str) -> ConfigError {
    ConfigError::UnknownValue {
        field,
        value: value.to_string(),
    }
}

/// Parses every symbol in `values`, failing on the first unknown one.
pub fn parse_symbols<T>(values: &[String]) -> Result<Vec<T>, ConfigError>
where
    T: FromStr<Err = ConfigError>,
{
    values.iter().map(|value| value.parse()).collect()
}

/// One row of the SDK build lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkBuild {
    pub sdk: Version,
    pub build: String,
}

/// Maps an SDK version to the platform build identifier recorded in the
/// manifest. Versions without an exact row use `fallback`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkBuildTable {
    pub entries: Vec<SdkBuild>,
    pub fallback: String,
}

impl Default for SdkBuildTable {
    fn default() -> Self {
        let row = |sdk: &str, build: &str| SdkBuild {
            sdk: Version::from_known(sdk),
            build: build.to_string(),
        };
        Self {
            entries: vec![row("4.3", "8F191m"), row("5.0", "9A334"), row("5.1", "9B176")],
            fallback: "10A403".to_string(),
        }
    }
}

impl SdkBuildTable {
    pub fn build_for(&self, sdk: &Version) -> &str {
        self.entries
            .iter()
            .find(|entry| entry.sdk == *sdk)
            .map_or(self.fallback.as_str(), |entry| entry.build.as_str())
    }
}

/// Identity fields shared by every platform.
#[derive(Debug, Clone)]
pub struct BundleIdentity {
    pub name: String,
    pub identifier: String,
    pub version: String,
    pub short_version: String,
}

impl BundleIdentity {
    pub fn generic_block(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.insert("CFBundleDevelopmentRegion", "en");
        dict.insert("CFBundleName", self.name.as_str());
        dict.insert("CFBundleDisplayName", self.name.as_str());
        dict.insert("CFBundleIdentifier", self.identifier.as_str());
        dict.insert("CFBundleExecutable", self.name.as_str());
        dict.insert("CFBundleInfoDictionaryVersion", "6.0");
        dict.insert("CFBundlePackageType", "APPL");
        dict.insert("CFBundleShortVersionString", self.short_version.as_str());
        dict.insert("CFBundleSignature", BUNDLE_SIGNATURE);
        dict.insert("CFBundleVersion", self.version.as_str());
        dict
    }
}

/// Resolved inputs of the platform-derived block.
#[derive(Debug, Clone)]
pub struct PlatformFields {
    pub deploy_platform: String,
    pub deployment_target: Version,
    pub sdk_version: Version,
    pub xcode: XcodeVersion,
    pub sdk_build: String,
    pub icons: Vec<String>,
    pub prerendered_icon: bool,
    pub fonts: Vec<String>,
    pub device_families: Vec<DeviceFamily>,
    pub interface_orientations: Vec<InterfaceOrientation>,
    pub status_bar_style: StatusBarStyle,
    pub background_modes: Vec<BackgroundMode>,
}

impl PlatformFields {
    pub fn platform_block(&self) -> Dictionary {
        let icons = || Value::from(self.icons.clone());

        let mut primary_icon = Dictionary::new();
        primary_icon.insert("CFBundleIconFiles", icons());
        primary_icon.insert("UIPrerenderedIcon", self.prerendered_icon);
        let mut bundle_icons = Dictionary::new();
        bundle_icons.insert("CFBundlePrimaryIcon", primary_icon);

        let families: Vec<String> = self.device_families.iter().map(|f| f.code().to_string()).collect();
        let orientations: Vec<&str> = self.interface_orientations.iter().map(|o| o.constant()).collect();
        let modes: Vec<&str> = self.background_modes.iter().map(|m| m.constant()).collect();

        let mut dict = Dictionary::new();
        dict.insert("MinimumOSVersion", self.deployment_target.as_str());
        dict.insert("CFBundleResourceSpecification", "ResourceRules.plist");
        dict.insert("CFBundleSupportedPlatforms", vec![self.deploy_platform.as_str()]);
        dict.insert("CFBundleIconFiles", icons());
        dict.insert("CFBundleIcons", bundle_icons);
        dict.insert("UIAppFonts", self.fonts.clone());
        dict.insert("UIDeviceFamily", families);
        dict.insert("UISupportedInterfaceOrientations", orientations);
        dict.insert("UIStatusBarStyle", self.status_bar_style.constant());
        dict.insert("UIBackgroundModes", modes);
        dict.insert("DTXcode", self.xcode.dt_xcode());
        dict.insert("DTXcodeBuild", self.xcode.build.as_str());
        dict.insert("DTSDKName", format!("iphoneos{}", self.sdk_version));
        dict.insert("DTSDKBuild", self.sdk_build.as_str());
        dict.insert("DTPlatformName", "iphoneos");
        dict.insert("DTCompiler", "com.apple.compilers.llvm.clang.1_0");
        dict.insert("DTPlatformVersion", self.sdk_version.as_str());
        dict.insert("DTPlatformBuild", self.sdk_build.as_str());
        dict
    }
}

/// Assembles the manifest from its blocks.
///
/// Blocks are merged in field order; a key set by a later block replaces
/// the value from an earlier one.
#[derive(Debug, Clone, Default)]
pub struct ManifestBuilder {
    pub generic: Dictionary,
    pub platform: Dictionary,
    pub platform_overrides: Dictionary,
    pub user_overrides: Dictionary,
}

impl ManifestBuilder {
    /// Starts from the identity and platform-derived blocks with no overrides.
    pub fn new(identity: &BundleIdentity, platform: &PlatformFields) -> Self {
        Self {
            generic: identity.generic_block(),
            platform: platform.platform_block(),
            ..Self::default()
        }
    }

    pub fn with_platform_overrides(mut self, overrides: Dictionary) -> Self {
        self.platform_overrides = overrides;
        self
    }

    pub fn with_user_overrides(mut self, overrides: Dictionary) -> Self {
        self.user_overrides = overrides;
        self
    }

    pub fn build(&self) -> Dictionary {
        let mut manifest = self.generic.clone();
        manifest.merge(self.platform.clone());
        manifest.merge(self.platform_overrides.clone());
        manifest.merge(self.user_overrides.clone());
        manifest
    }
}

/// Contents of the bundle's `PkgInfo` file: the package type followed by
/// the bundle signature, matching `CFBundlePackageType` and
/// `CFBundleSignature` in the manifest.
///
/// Older toolchains wrote `AAPL` here, which is not a package type any
/// loader recognizes; the correct `APPL` code is written instead.
pub fn pkginfo_data(signature: &str) -> String {
    format!("APPL{signature}")
}

/// Builds the entitlements dictionary.
///
/// User entitlements are kept as given. Distribution builds add
/// `application-identifier` when absent, which requires `seed_id`;
/// development builds add `get-task-allow = true` when absent.
pub fn build_entitlements(
    mode: BuildMode,
    seed_id: Option<&str>,
    identifier: &str,
    user: &Dictionary,
) -> Result<Dictionary, ConfigError> {
    let mut dict = user.clone();
    match mode {
        BuildMode::Distribution => {
            if !dict.contains_key(APPLICATION_IDENTIFIER_KEY) {
                let seed_id = seed_id.ok_or_else(|| {
                    ConfigError::invalid(
                        "entitlements",
                        "distribution builds need a seed id to derive `application-identifier'",
                    )
                })?;
                dict.insert(APPLICATION_IDENTIFIER_KEY, format!("{seed_id}.{identifier}"));
            }
        }
        BuildMode::Development => {
            if !dict.contains_key(GET_TASK_ALLOW_KEY) {
                dict.insert(GET_TASK_ALLOW_KEY, true);
            }
        }
    }
    Ok(dict)
}
