//! Framework dependency resolution.
//!
//! Starting from the frameworks a project declares, [`DependencyResolver`]
//! inspects each framework binary in the local SDK and follows its
//! dependencies on other public frameworks until no new framework appears.
//! The result then gates which auxiliary link artifacts (stub objects) and
//! bridging metadata files are picked up from the support data directory.

use serde::ser::{Serialize, Serializer};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::external::BinaryDependencyInspector;
use crate::types::ConfigError;
use crate::version::{Version, VersionCatalog, VersionConstraint};

const SYSTEM_FRAMEWORKS_PREFIX: &str = "/System/Library/Frameworks/";

/// Unique framework names in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameworkSet {
    names: Vec<String>,
    seen: HashSet<String>,
}

impl FrameworkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `name`, returning `false` if it was already present.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.seen.contains(&name) {
            return false;
        }
        self.seen.insert(name.clone());
        self.names.push(name);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        let seen = &mut self.seen;
        self.names.retain(|name| {
            let kept = keep(name);
            if !kept {
                seen.remove(name);
            }
            kept
        });
    }

    /// A new set holding `self` followed by the names of `other` not yet present.
    pub fn union<I, S>(&self, other: I) -> FrameworkSet
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut merged = self.clone();
        merged.extend(other);
        merged
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> Extend<S> for FrameworkSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for name in iter {
            self.insert(name);
        }
    }
}

impl<S: Into<String>> FromIterator<S> for FrameworkSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = FrameworkSet::new();
        set.extend(iter);
        set
    }
}

impl Serialize for FrameworkSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.names.serialize(serializer)
    }
}

/// Extracts the framework name from a dependency install name.
///
/// Only top-level public frameworks count:
/// `/System/Library/Frameworks/<Name>.framework/[Versions/X/]<Name>`.
/// Umbrella sub-frameworks, whose trailing binary name differs from the
/// framework directory name, yield `None`.
///
/// ```
/// use iosconf_sdk::frameworks::parse_framework_dependency;
///
/// assert_eq!(
///     parse_framework_dependency("/System/Library/Frameworks/CoreText.framework/CoreText"),
///     Some("CoreText")
/// );
/// assert_eq!(
///     parse_framework_dependency(
///         "/System/Library/Frameworks/ApplicationServices.framework/Versions/A/Frameworks/ATS.framework/Versions/A/ATS"
///     ),
///     None
/// );
/// assert_eq!(parse_framework_dependency("/usr/lib/libobjc.A.dylib"), None);
/// ```
pub fn parse_framework_dependency(install_name: &str) -> Option<&str> {
    let rest = install_name.strip_prefix(SYSTEM_FRAMEWORKS_PREFIX)?;
    let (name, binary_path) = rest.split_once(".framework/")?;
    if name.is_empty() || name.contains('/') {
        return None;
    }
    let binary = match binary_path.strip_prefix("Versions/") {
        Some(versioned) => {
            let mut chars = versioned.chars();
            chars.next()?;
            chars.as_str().strip_prefix('/')?
        }
        None => binary_path,
    };
    (binary == name).then_some(name)
}

/// Computes the transitive framework closure of a project.
pub struct DependencyResolver<'a> {
    /// `System/Library/Frameworks` of the local platform's SDK.
    pub sdk_frameworks_dir: PathBuf,
    /// `BridgeSupport` directory of the active support data.
    pub bridge_support_dir: PathBuf,
    /// Whether the project declared its own framework search paths.
    pub search_paths_declared: bool,
    pub inspector: &'a dyn BinaryDependencyInspector,
}

impl DependencyResolver<'_> {
    /// Resolves the closure of `declared` under the depends-on relation.
    ///
    /// Frameworks are processed from a FIFO worklist; each newly discovered
    /// name is appended to the result and queued in turn, so the output order
    /// is fully determined by the input order. Frameworks without a binary in
    /// the SDK are kept but not inspected.
    ///
    /// Unless framework search paths were declared, the result is finally
    /// restricted to frameworks that have bridging metadata.
    pub fn resolve_closure(&self, declared: &[String]) -> Result<FrameworkSet, ConfigError> {
        let mut result: FrameworkSet = declared.iter().cloned().collect();
        let mut pending: VecDeque<String> = result.iter().map(str::to_string).collect();

        while let Some(framework) = pending.pop_front() {
            let binary = self
                .sdk_frameworks_dir
                .join(format!("{framework}.framework"))
                .join(&framework);
            if !binary.is_file() {
                tracing::debug!("No binary for {} at {}", framework, binary.display());
                continue;
            }
            for install_name in self.inspector.dependencies(&binary)? {
                if let Some(name) = parse_framework_dependency(&install_name)
                    && result.insert(name)
                {
                    tracing::debug!("{} depends on {}", framework, name);
                    pending.push_back(name.to_string());
                }
            }
        }

        if !self.search_paths_declared {
            result.retain(|name| {
                let known = self.bridge_support_dir.join(format!("{name}.bridgesupport")).is_file();
                if !known {
                    tracing::debug!("Dropping {} (no bridging metadata)", name);
                }
                known
            });
        }
        Ok(result)
    }
}

/// Stub objects present for `frameworks` on `platform`.
///
/// Missing stub files are skipped.
pub fn stub_objects(support_dir: &Path, platform: &str, frameworks: &FrameworkSet) -> Vec<PathBuf> {
    frameworks
        .iter()
        .map(|framework| support_dir.join(platform).join(format!("{framework}_stubs.o")))
        .filter(|path| path.is_file())
        .collect()
}

/// Modules whose bridging metadata is loaded: the core module, every
/// linkable framework, and the extra module of the embedded-test variant.
pub fn bridge_modules(core_module: &str, frameworks: &FrameworkSet, extra_module: Option<&str>) -> Vec<String> {
    let mut modules = vec![core_module.to_string()];
    modules.extend(frameworks.iter().map(str::to_string));
    modules.extend(extra_module.map(str::to_string));
    modules
}

/// Existing bridging metadata files for `modules` across every supported
/// version inside `constraint`.
///
/// One module may contribute a file from several versions; all are listed,
/// module-major and in ascending version order. Missing files are skipped.
pub fn bridge_metadata_files(
    catalog: &VersionCatalog,
    supported_versions: &[Version],
    constraint: &VersionConstraint,
    modules: &[String],
) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for module in modules {
        for version in supported_versions.iter().filter(|v| constraint.contains(v)) {
            let path = catalog
                .support_dir(version)
                .join("BridgeSupport")
                .join(format!("{module}.bridgesupport"));
            if path.is_file() {
                files.push(path);
            }
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    struct FakeInspector {
        deps: HashMap<String, Vec<String>>,
    }

    impl FakeInspector {
        fn new(edges: &[(&str, &[&str])]) -> Self {
            let deps = edges
                .iter()
                .map(|(framework, install_names)| {
                    (framework.to_string(), install_names.iter().map(|s| s.to_string()).collect())
                })
                .collect();
            Self { deps }
        }
    }

    impl BinaryDependencyInspector for FakeInspector {
        fn dependencies(&self, binary: &Path) -> Result<Vec<String>, ConfigError> {
            let name = binary.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            Ok(self.deps.get(name).cloned().unwrap_or_default())
        }
    }

    fn system(name: &str) -> String {
        format!("/System/Library/Frameworks/{name}.framework/{name}")
    }

    struct Fixture {
        _tmp: TempDir,
        frameworks_dir: PathBuf,
        bridge_dir: PathBuf,
    }

    fn fixture(binaries: &[&str], metadata: &[&str]) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let frameworks_dir = tmp.path().join("sdk/System/Library/Frameworks");
        let bridge_dir = tmp.path().join("data/6.0/BridgeSupport");
        fs::create_dir_all(&bridge_dir).unwrap();
        for name in binaries {
            let dir = frameworks_dir.join(format!("{name}.framework"));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(name), b"").unwrap();
        }
        for name in metadata {
            fs::write(bridge_dir.join(format!("{name}.bridgesupport")), b"").unwrap();
        }
        Fixture {
            _tmp: tmp,
            frameworks_dir,
            bridge_dir,
        }
    }

    fn names(declared: &[&str]) -> Vec<String> {
        declared.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_versioned_framework() {
        assert_eq!(
            parse_framework_dependency("/System/Library/Frameworks/CoreServices.framework/Versions/A/CoreServices"),
            Some("CoreServices")
        );
        assert_eq!(
            parse_framework_dependency("/System/Library/Frameworks/CoreServices.framework/Versions/AB/CoreServices"),
            None
        );
        assert_eq!(parse_framework_dependency("/System/Library/Frameworks/UIKit.framework/Other"), None);
    }

    #[test]
    fn test_closure_is_transitive() {
        let fx = fixture(&["UIKit", "QuartzCore", "CoreGraphics"], &[]);
        let inspector = FakeInspector::new(&[
            ("UIKit", &[&system("QuartzCore"), "/usr/lib/libobjc.A.dylib"]),
            ("QuartzCore", &[&system("CoreGraphics")]),
            ("CoreGraphics", &[&system("CoreFoundation")]),
        ]);
        let resolver = DependencyResolver {
            sdk_frameworks_dir: fx.frameworks_dir.clone(),
            bridge_support_dir: fx.bridge_dir.clone(),
            search_paths_declared: true,
            inspector: &inspector,
        };

        let closure = resolver.resolve_closure(&names(&["UIKit", "UIKit"])).unwrap();
        assert_eq!(
            closure.as_slice(),
            &names(&["UIKit", "QuartzCore", "CoreGraphics", "CoreFoundation"])[..]
        );
    }

    #[test]
    fn test_closure_is_a_fixed_point() {
        let fx = fixture(&["UIKit", "QuartzCore"], &["UIKit", "Foundation", "QuartzCore"]);
        let inspector = FakeInspector::new(&[
            ("UIKit", &[&system("QuartzCore"), &system("Foundation")]),
            ("QuartzCore", &[&system("OpenGLES")]),
        ]);
        let resolver = DependencyResolver {
            sdk_frameworks_dir: fx.frameworks_dir.clone(),
            bridge_support_dir: fx.bridge_dir.clone(),
            search_paths_declared: false,
            inspector: &inspector,
        };

        let first = resolver.resolve_closure(&names(&["UIKit"])).unwrap();
        let second = resolver.resolve_closure(first.as_slice()).unwrap();
        assert_eq!(first, second);
        assert!(!first.contains("OpenGLES"));
    }

    #[test]
    fn test_umbrella_sub_frameworks_are_excluded() {
        let fx = fixture(&["MapKit"], &[]);
        let umbrella = "/System/Library/Frameworks/ApplicationServices.framework/Versions/A/Frameworks/ATS.framework/Versions/A/ATS";
        let mismatched = "/System/Library/Frameworks/Accelerate.framework/Frameworks/vImage";
        let inspector = FakeInspector::new(&[("MapKit", &[umbrella, mismatched])]);
        let resolver = DependencyResolver {
            sdk_frameworks_dir: fx.frameworks_dir.clone(),
            bridge_support_dir: fx.bridge_dir.clone(),
            search_paths_declared: true,
            inspector: &inspector,
        };

        let closure = resolver.resolve_closure(&names(&["MapKit"])).unwrap();
        assert_eq!(closure.as_slice(), &names(&["MapKit"])[..]);
        assert!(!closure.contains("ATS"));
        assert!(!closure.contains("vImage"));
        assert!(!closure.contains("Accelerate"));
    }

    #[test]
    fn test_metadata_filter_applies_without_search_paths() {
        let fx = fixture(&["Foundation"], &["Foundation"]);
        let inspector = FakeInspector::new(&[("Foundation", &[&system("CoreFoundation")])]);
        let resolver = DependencyResolver {
            sdk_frameworks_dir: fx.frameworks_dir.clone(),
            bridge_support_dir: fx.bridge_dir.clone(),
            search_paths_declared: false,
            inspector: &inspector,
        };

        let closure = resolver.resolve_closure(&names(&["Foundation"])).unwrap();
        assert_eq!(closure.as_slice(), &names(&["Foundation"])[..]);
    }

    #[test]
    fn test_inspector_failure_is_fatal() {
        struct Broken;
        impl BinaryDependencyInspector for Broken {
            fn dependencies(&self, _binary: &Path) -> Result<Vec<String>, ConfigError> {
                Err(ConfigError::Tool {
                    command: "otool -L".into(),
                    message: "boom".into(),
                })
            }
        }
        let fx = fixture(&["UIKit"], &["UIKit"]);
        let resolver = DependencyResolver {
            sdk_frameworks_dir: fx.frameworks_dir.clone(),
            bridge_support_dir: fx.bridge_dir.clone(),
            search_paths_declared: false,
            inspector: &Broken,
        };
        assert!(matches!(resolver.resolve_closure(&names(&["UIKit"])), Err(ConfigError::Tool { .. })));
    }

    #[test]
    fn test_union_keeps_order_and_uniqueness() {
        let closure: FrameworkSet = ["UIKit", "Foundation"].into_iter().collect();
        let linkable = closure.union(["GameKit", "UIKit"]);
        assert_eq!(linkable.as_slice(), &names(&["UIKit", "Foundation", "GameKit"])[..]);
    }

    #[test]
    fn test_stub_objects_skip_missing() {
        let tmp = TempDir::new().unwrap();
        let platform_dir = tmp.path().join("iPhoneOS");
        fs::create_dir_all(&platform_dir).unwrap();
        fs::write(platform_dir.join("UIKit_stubs.o"), b"").unwrap();
        fs::write(platform_dir.join("GameKit_stubs.o"), b"").unwrap();

        let frameworks: FrameworkSet = ["UIKit", "Foundation", "GameKit"].into_iter().collect();
        assert_eq!(
            stub_objects(tmp.path(), "iPhoneOS", &frameworks),
            vec![platform_dir.join("UIKit_stubs.o"), platform_dir.join("GameKit_stubs.o")]
        );
    }

    #[test]
    fn test_bridge_metadata_spans_version_range() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        for (version, module) in [
            ("4.3", "UIKit"),
            ("5.0", "UIKit"),
            ("5.0", "RubyMotion"),
            ("5.1", "UIKit"),
            ("6.0", "UIKit"),
            ("5.1", "UIAutomation"),
        ] {
            let dir = data.join(version).join("BridgeSupport");
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(format!("{module}.bridgesupport")), b"").unwrap();
        }
        let catalog = VersionCatalog::new(tmp.path().join("Platforms"), &data);
        let supported = catalog.supported_versions().unwrap();
        let constraint = VersionConstraint::new(
            Version::parse("5.1").unwrap(),
            Some(Version::parse("5.0").unwrap()),
        );
        let frameworks: FrameworkSet = ["UIKit", "Foundation"].into_iter().collect();

        let files = bridge_metadata_files(
            &catalog,
            &supported,
            &constraint,
            &bridge_modules("RubyMotion", &frameworks, Some("UIAutomation")),
        );
        assert_eq!(
            files,
            vec![
                data.join("5.0/BridgeSupport/RubyMotion.bridgesupport"),
                data.join("5.0/BridgeSupport/UIKit.bridgesupport"),
                data.join("5.1/BridgeSupport/UIKit.bridgesupport"),
                data.join("5.1/BridgeSupport/UIAutomation.bridgesupport"),
            ]
        );
    }
}
