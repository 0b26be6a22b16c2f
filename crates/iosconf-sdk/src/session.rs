//! The build session: one resolution of a project's configuration.
//!
//! A [`BuildSession`] owns the declarative [`ProjectConfig`] and the external
//! collaborators, and derives everything else on demand. Each derived field
//! is computed at most once; the first fatal error is returned to the caller
//! and later calls retry from scratch, since nothing was cached.
//!
//! Resolution follows a strict dependency chain: toolchain, then versions,
//! then frameworks, then signing, then the manifest. [`BuildSession::emit`]
//! runs the validator before anything is written.

use anyhow::Context;
use iosconf_plist::{Dictionary, Value, to_xml_string};
use serde::Serialize;
use std::cell::{OnceCell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{ProjectConfig, icon_files, table_to_dictionary};
use crate::external::{
    BinaryDependencyInspector, CertificateEnumerator, DeveloperDirQuery, DeviceIdQuery, Otool,
    SystemDeviceQuery, SystemKeychain, SystemVersionQuery, ToolchainVersionQuery, XcodeSelect,
};
use crate::frameworks::{self, DependencyResolver, FrameworkSet};
use crate::manifest::{
    APPLICATION_IDENTIFIER_KEY, BUNDLE_SIGNATURE, BundleIdentity, ManifestBuilder, PlatformFields,
    build_entitlements, parse_symbols, pkginfo_data,
};
use crate::platform::{DEPLOY_PLATFORM, LOCAL_PLATFORM, PLATFORMS, PlatformTarget, default_archs};
use crate::profile::{self, ProvisioningProfile};
use crate::toolchain::{DeveloperDirSearch, ToolchainLocator, XCODE_APP_DEVELOPER_DIR, XcodeVersion};
use crate::types::{BuildMode, ConfigError, ConfigWarning, Selection};
use crate::validate::ConfigValidator;
use crate::version::{Version, VersionCatalog, VersionConstraint};

/// Returns the cached value, computing and storing it on first success.
fn memoize<T>(cell: &OnceCell<T>, init: impl FnOnce() -> Result<T, ConfigError>) -> Result<&T, ConfigError> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = init()?;
    Ok(cell.get_or_init(|| value))
}

/// Lazily resolved build configuration for one project.
///
/// # Example
///
/// ```no_run
/// use iosconf_sdk::BuildSession;
/// use std::path::Path;
///
/// let session = BuildSession::discover(Path::new("."))?;
/// let frameworks = session.frameworks()?;
/// println!("linking {:?}", frameworks.as_slice());
/// session.emit(Path::new("build/iPhoneOS-6.0-Development"))?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct BuildSession {
    config: ProjectConfig,
    project_dir: PathBuf,
    developer_dir_env: Option<PathBuf>,
    home_dir: Option<PathBuf>,

    version_query: Box<dyn ToolchainVersionQuery>,
    inspector: Option<Box<dyn BinaryDependencyInspector>>,
    certificates: Box<dyn CertificateEnumerator>,
    device_query: Box<dyn DeviceIdQuery>,
    developer_dir_query: Box<dyn DeveloperDirQuery>,

    warnings: RefCell<Vec<ConfigWarning>>,

    developer_dir: OnceCell<PathBuf>,
    xcode_version: OnceCell<XcodeVersion>,
    versions: OnceCell<VersionConstraint>,
    supported_versions: OnceCell<Vec<Version>>,
    platform_targets: OnceCell<Vec<PlatformTarget>>,
    frameworks: OnceCell<FrameworkSet>,
    linkable_frameworks: OnceCell<FrameworkSet>,
    bridge_metadata_files: OnceCell<Vec<PathBuf>>,
    profile: OnceCell<PathBuf>,
    seed_id: OnceCell<String>,
    codesign_certificate: OnceCell<String>,
    device_id: OnceCell<String>,
    fonts: OnceCell<Vec<String>>,
    manifest: OnceCell<Dictionary>,
    entitlements: OnceCell<Dictionary>,
}

impl BuildSession {
    /// Creates a session for `config`, resolving relative paths against
    /// `project_dir`. The system collaborators are used until replaced.
    pub fn new(config: ProjectConfig, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            project_dir: project_dir.into(),
            developer_dir_env: std::env::var_os("DEVELOPER_DIR").map(PathBuf::from),
            home_dir: std::env::var_os("HOME").map(PathBuf::from),
            version_query: Box::new(SystemVersionQuery),
            inspector: None,
            certificates: Box::new(SystemKeychain),
            device_query: Box::new(SystemDeviceQuery),
            developer_dir_query: Box::new(XcodeSelect),
            warnings: RefCell::new(Vec::new()),
            developer_dir: OnceCell::new(),
            xcode_version: OnceCell::new(),
            versions: OnceCell::new(),
            supported_versions: OnceCell::new(),
            platform_targets: OnceCell::new(),
            frameworks: OnceCell::new(),
            linkable_frameworks: OnceCell::new(),
            bridge_metadata_files: OnceCell::new(),
            profile: OnceCell::new(),
            seed_id: OnceCell::new(),
            codesign_certificate: OnceCell::new(),
            device_id: OnceCell::new(),
            fonts: OnceCell::new(),
            manifest: OnceCell::new(),
            entitlements: OnceCell::new(),
        }
    }

    /// Creates a session from the `iosconf.toml` found at or above `start_dir`.
    ///
    /// Without a configuration file the defaults are used and `start_dir`
    /// becomes the project directory.
    pub fn discover(start_dir: &Path) -> anyhow::Result<Self> {
        match ProjectConfig::discover_from(start_dir)? {
            Some((config, path)) => {
                let project_dir = path.parent().unwrap_or(start_dir).to_path_buf();
                Ok(Self::new(config, project_dir))
            }
            None => Ok(Self::new(ProjectConfig::default(), start_dir)),
        }
    }

    pub fn with_version_query(mut self, query: impl ToolchainVersionQuery + 'static) -> Self {
        self.version_query = Box::new(query);
        self
    }

    /// Replaces `otool`, which is otherwise located in the developer directory.
    pub fn with_inspector(mut self, inspector: impl BinaryDependencyInspector + 'static) -> Self {
        self.inspector = Some(Box::new(inspector));
        self
    }

    pub fn with_certificate_enumerator(mut self, enumerator: impl CertificateEnumerator + 'static) -> Self {
        self.certificates = Box::new(enumerator);
        self
    }

    pub fn with_device_query(mut self, query: impl DeviceIdQuery + 'static) -> Self {
        self.device_query = Box::new(query);
        self
    }

    pub fn with_developer_dir_query(mut self, query: impl DeveloperDirQuery + 'static) -> Self {
        self.developer_dir_query = Box::new(query);
        self
    }

    /// Overrides the `DEVELOPER_DIR` value read from the environment.
    pub fn with_developer_dir_env(mut self, dir: Option<PathBuf>) -> Self {
        self.developer_dir_env = dir;
        self
    }

    /// Overrides the home directory used to find provisioning profiles.
    pub fn with_home_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.home_dir = dir;
        self
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Ambiguity warnings raised so far, in the order they occurred.
    pub fn warnings(&self) -> Vec<ConfigWarning> {
        self.warnings.borrow().clone()
    }

    fn note<T>(&self, selection: Selection<T>) -> T {
        if let Some(warning) = selection.warning {
            self.warnings.borrow_mut().push(warning);
        }
        selection.value
    }

    fn project_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }

    fn data_dir(&self) -> PathBuf {
        self.project_path(&self.config.toolchain.data_dir)
    }

    // Toolchain

    pub fn developer_dir(&self) -> Result<&Path, ConfigError> {
        memoize(&self.developer_dir, || {
            let explicit = self.config.toolchain.xcode_dir.as_deref().map(|dir| self.project_path(dir));
            let selected = if explicit.is_some() {
                None
            } else {
                self.developer_dir_query.selected_developer_dir()
            };
            let dir = DeveloperDirSearch {
                explicit: explicit.as_deref(),
                environment: self.developer_dir_env.as_deref(),
                selected: selected.as_deref(),
                fallback: Path::new(XCODE_APP_DEVELOPER_DIR),
            }
            .locate()?;
            tracing::debug!("Using developer directory {}", dir.display());
            Ok(dir)
        })
        .map(PathBuf::as_path)
    }

    pub fn locator(&self) -> Result<ToolchainLocator, ConfigError> {
        Ok(ToolchainLocator::new(self.developer_dir()?))
    }

    pub fn catalog(&self) -> Result<VersionCatalog, ConfigError> {
        Ok(VersionCatalog::new(self.locator()?.platforms_dir(), self.data_dir()))
    }

    pub fn xcode_version(&self) -> Result<&XcodeVersion, ConfigError> {
        memoize(&self.xcode_version, || {
            let xcodebuild = self.locator()?.locate_binary("xcodebuild")?;
            let version = self.version_query.query(&xcodebuild)?;
            tracing::debug!("Xcode {} ({})", version.version, version.build);
            Ok(version)
        })
    }

    /// Compiler for `platform`, preferring clang.
    pub fn compiler(&self, platform: &str) -> Result<PathBuf, ConfigError> {
        self.locator()?.locate(platform, &["clang", "gcc"])
    }

    // Versions

    /// The SDK version and deployment target.
    ///
    /// A configured SDK version is taken as is; otherwise the newest installed
    /// device SDK with support data is used.
    pub fn versions(&self) -> Result<&VersionConstraint, ConfigError> {
        memoize(&self.versions, || {
            let ios = &self.config.ios;
            match &ios.sdk_version {
                Some(sdk) => Ok(VersionConstraint::new(sdk.clone(), ios.deployment_target.clone())),
                None => self.catalog()?.resolve(DEPLOY_PLATFORM, ios.deployment_target.clone()),
            }
        })
    }

    pub fn supported_versions(&self) -> Result<&[Version], ConfigError> {
        memoize(&self.supported_versions, || self.catalog()?.supported_versions()).map(Vec::as_slice)
    }

    /// Support data directory of the resolved SDK version.
    pub fn support_dir(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.catalog()?.support_dir(&self.versions()?.sdk_version))
    }

    pub fn platform_targets(&self) -> Result<&[PlatformTarget], ConfigError> {
        memoize(&self.platform_targets, || {
            let catalog = self.catalog()?;
            let sdk = &self.versions()?.sdk_version;
            let support_dir = catalog.support_dir(sdk);
            PLATFORMS
                .iter()
                .map(|name| -> Result<PlatformTarget, ConfigError> {
                    let archs = match self.config.ios.archs.get(*name) {
                        Some(archs) => archs.clone(),
                        None => default_archs(&support_dir.join(name))?,
                    };
                    Ok(PlatformTarget {
                        name: name.to_string(),
                        sdk_root: catalog.sdk_dir(name, sdk),
                        archs,
                    })
                })
                .collect()
        })
        .map(Vec::as_slice)
    }

    pub fn platform_target(&self, platform: &str) -> Result<&PlatformTarget, ConfigError> {
        self.platform_targets()?
            .iter()
            .find(|target| target.name == platform)
            .ok_or_else(|| ConfigError::UnknownValue {
                field: "platform",
                value: platform.to_string(),
            })
    }

    // Frameworks

    /// Declared frameworks and everything they transitively depend on.
    pub fn frameworks(&self) -> Result<&FrameworkSet, ConfigError> {
        memoize(&self.frameworks, || {
            let catalog = self.catalog()?;
            let sdk = &self.versions()?.sdk_version;
            let otool;
            let inspector: &dyn BinaryDependencyInspector = match &self.inspector {
                Some(inspector) => &**inspector,
                None => {
                    otool = Otool::new(self.locator()?.locate_binary("otool")?);
                    &otool
                }
            };
            let resolver = DependencyResolver {
                sdk_frameworks_dir: catalog.sdk_dir(LOCAL_PLATFORM, sdk).join("System/Library/Frameworks"),
                bridge_support_dir: catalog.support_dir(sdk).join("BridgeSupport"),
                search_paths_declared: !self.config.ios.framework_search_paths.is_empty(),
                inspector,
            };
            let closure = resolver.resolve_closure(&self.config.ios.frameworks)?;
            tracing::debug!("Resolved frameworks: {:?}", closure.as_slice());
            Ok(closure)
        })
    }

    /// Resolved frameworks followed by the weak frameworks.
    pub fn linkable_frameworks(&self) -> Result<&FrameworkSet, ConfigError> {
        memoize(&self.linkable_frameworks, || {
            Ok(self.frameworks()?.union(self.config.ios.weak_frameworks.iter().cloned()))
        })
    }

    /// Stub objects to link for `platform`.
    pub fn stub_objects(&self, platform: &str) -> Result<Vec<PathBuf>, ConfigError> {
        Ok(frameworks::stub_objects(
            &self.support_dir()?,
            platform,
            self.linkable_frameworks()?,
        ))
    }

    pub fn bridge_metadata_files(&self) -> Result<&[PathBuf], ConfigError> {
        memoize(&self.bridge_metadata_files, || {
            let toolchain = &self.config.toolchain;
            let extra = self.config.app.spec_mode.then_some(toolchain.spec_bridge_module.as_str());
            let modules = frameworks::bridge_modules(&toolchain.core_bridge_module, self.linkable_frameworks()?, extra);
            Ok(frameworks::bridge_metadata_files(
                &self.catalog()?,
                self.supported_versions()?,
                self.versions()?,
                &modules,
            ))
        })
        .map(Vec::as_slice)
    }

    // Signing

    pub fn provisioning_profile(&self) -> Result<&Path, ConfigError> {
        memoize(&self.profile, || {
            let signing = &self.config.signing;
            if let Some(path) = &signing.provisioning_profile {
                let path = self.project_path(path);
                if !path.is_file() {
                    return Err(ConfigError::not_found_in("the configured provisioning profile", vec![path]));
                }
                return Ok(path);
            }
            let dir = match &signing.profiles_dir {
                Some(dir) => self.project_path(dir),
                None => self
                    .home_dir
                    .as_ref()
                    .map(|home| home.join("Library/MobileDevice/Provisioning Profiles"))
                    .ok_or_else(|| ConfigError::not_found("the provisioning profiles directory (HOME is not set)"))?,
            };
            let selection = profile::resolve_profile(&dir, &signing.profile_name)?;
            Ok(self.note(selection))
        })
        .map(PathBuf::as_path)
    }

    /// The application identifier prefix.
    pub fn seed_id(&self) -> Result<&str, ConfigError> {
        memoize(&self.seed_id, || {
            if let Some(seed_id) = &self.config.signing.seed_id {
                return Ok(seed_id.clone());
            }
            let path = self.provisioning_profile()?;
            let prefixes = ProvisioningProfile::open(path)?.application_identifier_prefixes()?;
            Ok(self.note(profile::select_seed_id(prefixes, path)?))
        })
        .map(String::as_str)
    }

    pub fn provisioned_devices(&self) -> Result<Vec<String>, ConfigError> {
        ProvisioningProfile::open(self.provisioning_profile()?)?.provisioned_devices()
    }

    pub fn codesign_certificate(&self) -> Result<&str, ConfigError> {
        memoize(&self.codesign_certificate, || {
            if let Some(certificate) = &self.config.signing.codesign_certificate {
                return Ok(certificate.clone());
            }
            let distribution = self.config.signing.mode.is_distribution();
            let names = self.certificates.certificates(distribution)?;
            Ok(self.note(profile::select_certificate(names, distribution)?))
        })
        .map(String::as_str)
    }

    /// Identifier of the device connected on USB.
    pub fn device_id(&self) -> Result<&str, ConfigError> {
        memoize(&self.device_id, || {
            let helper = self.project_path(&self.config.toolchain.bin_dir).join("ios/deploy");
            let id = self.device_query.device_id(&helper)?;
            if id.is_empty() {
                return Err(ConfigError::not_found("an iOS device connected on USB"));
            }
            Ok(id)
        })
        .map(String::as_str)
    }

    // Manifest

    pub fn identifier(&self) -> String {
        self.config.app.identifier()
    }

    pub fn bundle_name(&self) -> String {
        self.config.app.bundle_name()
    }

    /// Font files bundled from the resource directories.
    pub fn fonts(&self) -> Result<&[String], ConfigError> {
        memoize(&self.fonts, || {
            let mut fonts = Vec::new();
            for dir in &self.config.app.resources_dirs {
                let dir = self.project_path(dir);
                if !dir.is_dir() {
                    continue;
                }
                let mut found = Vec::new();
                for entry in fs::read_dir(&dir)? {
                    let path = entry?.path();
                    let is_font = matches!(path.extension().and_then(|e| e.to_str()), Some("otf" | "ttf"));
                    if is_font && let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                        found.push(name.to_string());
                    }
                }
                found.sort();
                fonts.extend(found);
            }
            Ok(fonts)
        })
        .map(Vec::as_slice)
    }

    /// The merged `Info.plist` dictionary.
    pub fn manifest(&self) -> Result<&Dictionary, ConfigError> {
        memoize(&self.manifest, || {
            let app = &self.config.app;
            let ios = &self.config.ios;
            let versions = self.versions()?;
            let platform = PlatformFields {
                deploy_platform: DEPLOY_PLATFORM.to_string(),
                deployment_target: versions.deployment_target.clone(),
                sdk_version: versions.sdk_version.clone(),
                xcode: self.xcode_version()?.clone(),
                sdk_build: self
                    .config
                    .toolchain
                    .sdk_build_table()
                    .build_for(&versions.sdk_version)
                    .to_string(),
                icons: icon_files(app.icons.as_ref())?,
                prerendered_icon: app.prerendered_icon,
                fonts: self.fonts()?.to_vec(),
                device_families: parse_symbols(&ios.device_family.to_vec())?,
                interface_orientations: parse_symbols(&ios.interface_orientations)?,
                status_bar_style: ios.status_bar_style.parse()?,
                background_modes: parse_symbols(&ios.background_modes)?,
            };
            let identity = BundleIdentity {
                name: app.name.clone(),
                identifier: app.identifier(),
                version: app.version.clone(),
                short_version: app.short_version.clone(),
            };
            let builder = ManifestBuilder::new(&identity, &platform)
                .with_platform_overrides(table_to_dictionary(&ios.platform_overrides))
                .with_user_overrides(table_to_dictionary(&app.info_plist));
            Ok(builder.build())
        })
    }

    pub fn entitlements(&self) -> Result<&Dictionary, ConfigError> {
        memoize(&self.entitlements, || {
            let user = table_to_dictionary(&self.config.signing.entitlements);
            let mode = self.config.signing.mode;
            let seed_id = if mode.is_distribution() && !user.contains_key(APPLICATION_IDENTIFIER_KEY) {
                Some(self.seed_id()?)
            } else {
                None
            };
            build_entitlements(mode, seed_id, &self.identifier(), &user)
        })
    }

    // Validation and output

    pub fn validate(&self) -> Result<(), ConfigError> {
        let xcode = self.xcode_version()?;
        ConfigValidator {
            xcode_version: &xcode.version,
            min_xcode_version: &self.config.toolchain.min_xcode_version,
            catalog: &self.catalog()?,
            platforms: &PLATFORMS,
            constraint: self.versions()?,
            icons: self.config.app.icons.as_ref(),
        }
        .validate()
    }

    /// Validates, then writes `Info.plist`, `PkgInfo` and
    /// `Entitlements.plist` into `out_dir`.
    ///
    /// Every document is rendered before anything touches the disk, and the
    /// files are written through [`write_documents`], so a failure leaves no
    /// document behind in `out_dir`. Returns the written paths.
    pub fn emit(&self, out_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
        self.validate()?;
        let documents = [
            ("Info.plist", to_xml_string(&Value::Dictionary(self.manifest()?.clone()))),
            ("PkgInfo", pkginfo_data(BUNDLE_SIGNATURE)),
            ("Entitlements.plist", to_xml_string(&Value::Dictionary(self.entitlements()?.clone()))),
        ];
        write_documents(out_dir, &documents)
    }

    /// Snapshot of the resolved toolchain, versions and frameworks.
    pub fn summary(&self) -> Result<BuildSummary, ConfigError> {
        let mut stub_objects = BTreeMap::new();
        for platform in PLATFORMS {
            stub_objects.insert(platform.to_string(), self.stub_objects(platform)?);
        }
        Ok(BuildSummary {
            name: self.config.app.name.clone(),
            bundle_name: self.bundle_name(),
            identifier: self.identifier(),
            mode: self.config.signing.mode,
            developer_dir: self.developer_dir()?.to_path_buf(),
            xcode: self.xcode_version()?.clone(),
            versions: self.versions()?.clone(),
            platforms: self.platform_targets()?.to_vec(),
            frameworks: self.frameworks()?.clone(),
            linkable_frameworks: self.linkable_frameworks()?.clone(),
            bridge_metadata_files: self.bridge_metadata_files()?.to_vec(),
            stub_objects,
            warnings: self.warnings(),
        })
    }

    /// [`summary`](Self::summary) rendered as pretty-printed JSON.
    pub fn summary_json(&self) -> anyhow::Result<String> {
        let summary = self.summary()?;
        serde_json::to_string_pretty(&summary).context("Failed to serialize build summary")
    }
}

/// Writes `documents` into `out_dir` as a unit.
///
/// Each document is first staged as a hidden `.<name>.partial` file. Only
/// once every document is staged are they renamed into place; a staging
/// failure removes the staged files and leaves existing documents as they
/// were.
pub fn write_documents(out_dir: &Path, documents: &[(&str, String)]) -> Result<Vec<PathBuf>, ConfigError> {
    fs::create_dir_all(out_dir)?;

    let mut staged = Vec::with_capacity(documents.len());
    for (name, contents) in documents {
        let partial = out_dir.join(format!(".{name}.partial"));
        if let Err(e) = fs::write(&partial, contents) {
            for (path, _) in &staged {
                let _ = fs::remove_file(path);
            }
            return Err(e.into());
        }
        staged.push((partial, out_dir.join(name)));
    }

    let mut written = Vec::with_capacity(staged.len());
    for (partial, path) in staged {
        fs::rename(&partial, &path)?;
        tracing::debug!("Wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}

/// Serializable snapshot produced by [`BuildSession::summary`].
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub name: String,
    pub bundle_name: String,
    pub identifier: String,
    pub mode: BuildMode,
    pub developer_dir: PathBuf,
    pub xcode: XcodeVersion,
    pub versions: VersionConstraint,
    pub platforms: Vec<PlatformTarget>,
    pub frameworks: FrameworkSet,
    pub linkable_frameworks: FrameworkSet,
    pub bridge_metadata_files: Vec<PathBuf>,
    pub stub_objects: BTreeMap<String, Vec<PathBuf>>,
    pub warnings: Vec<ConfigWarning>,
}
