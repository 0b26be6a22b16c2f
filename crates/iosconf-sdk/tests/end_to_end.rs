//! End-to-end resolution against a fake toolchain tree.

use iosconf_sdk::external::{BinaryDependencyInspector, DeveloperDirQuery, ToolchainVersionQuery};
use iosconf_sdk::iosconf_plist::{Value, from_xml_str};
use iosconf_sdk::toolchain::parse_xcodebuild_version;
use iosconf_sdk::{BuildSession, ConfigError, ConfigWarning, XcodeVersion};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct FakeXcode;

impl ToolchainVersionQuery for FakeXcode {
    fn query(&self, xcodebuild: &Path) -> Result<XcodeVersion, ConfigError> {
        assert!(xcodebuild.ends_with("usr/bin/xcodebuild"));
        parse_xcodebuild_version("Xcode 4.5\nBuild version 4G182\n")
    }
}

/// Foundation links against CoreFoundation; nothing else has dependencies.
struct FakeOtool;

impl BinaryDependencyInspector for FakeOtool {
    fn dependencies(&self, binary: &Path) -> Result<Vec<String>, ConfigError> {
        if binary.ends_with("Foundation.framework/Foundation") {
            Ok(vec![
                "/System/Library/Frameworks/CoreFoundation.framework/CoreFoundation".to_string(),
                "/usr/lib/libobjc.A.dylib".to_string(),
            ])
        } else {
            Ok(Vec::new())
        }
    }
}

struct NoXcodeSelect;

impl DeveloperDirQuery for NoXcodeSelect {
    fn selected_developer_dir(&self) -> Option<PathBuf> {
        None
    }
}

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"").unwrap();
}

fn write_profile(path: &Path, name: &str, prefixes: &[&str]) {
    let prefixes: String = prefixes.iter().map(|p| format!("<string>{p}</string>")).collect();
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<plist version=\"1.0\"><dict>\
         <key>ApplicationIdentifierPrefix</key><array>{prefixes}</array>\
         <key>Name</key><string>{name}</string>\
         <key>ProvisionedDevices</key><array><string>d1</string></array>\
         </dict></plist>"
    );
    let mut bytes = vec![0x30, 0x80, 0x06, 0x09];
    bytes.extend_from_slice(xml.as_bytes());
    bytes.extend_from_slice(&[0x00, 0x00]);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

/// A project with SDK 6.0 installed for both platforms and support data for
/// 5.1 and 6.0. Only `Foundation` and the core module have bridging metadata.
fn project(config: &str) -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    fs::create_dir(root.join(".git")).unwrap();
    fs::write(root.join("iosconf.toml"), config).unwrap();

    let platforms = root.join("Developer/Platforms");
    touch(&root.join("Developer/usr/bin/xcodebuild"));
    fs::create_dir_all(platforms.join("iPhoneOS.platform/Developer/SDKs/iPhoneOS6.0.sdk")).unwrap();
    let simulator_sdk = platforms.join("iPhoneSimulator.platform/Developer/SDKs/iPhoneSimulator6.0.sdk");
    touch(&simulator_sdk.join("System/Library/Frameworks/Foundation.framework/Foundation"));
    touch(&simulator_sdk.join("System/Library/Frameworks/CoreFoundation.framework/CoreFoundation"));

    let data = root.join("data");
    touch(&data.join("6.0/BridgeSupport/Foundation.bridgesupport"));
    touch(&data.join("6.0/BridgeSupport/RubyMotion.bridgesupport"));
    touch(&data.join("5.1/BridgeSupport/Foundation.bridgesupport"));
    touch(&data.join("6.0/iPhoneOS/kernel-armv7.bc"));
    touch(&data.join("6.0/iPhoneSimulator/kernel-i386.bc"));
    touch(&data.join("6.0/iPhoneOS/Foundation_stubs.o"));

    write_profile(
        &root.join("profiles/team.mobileprovision"),
        "iOS Team Provisioning Profile: *",
        &["AAAA", "BBBB"],
    );
    tmp
}

fn session(tmp: &TempDir) -> BuildSession {
    BuildSession::discover(tmp.path())
        .unwrap()
        .with_version_query(FakeXcode)
        .with_inspector(FakeOtool)
        .with_developer_dir_query(NoXcodeSelect)
        .with_developer_dir_env(None)
        .with_home_dir(None)
}

const BASE: &str = r#"
[app]
name = "Hello"

[ios]
frameworks = ["Foundation"]
deployment_target = "5.1"

[signing]
profiles_dir = "profiles"

[toolchain]
xcode_dir = "Developer"
data_dir = "data"
"#;

#[test]
fn closure_is_filtered_by_bridging_metadata() {
    let tmp = project(BASE);
    let session = session(&tmp);

    let frameworks = session.frameworks().unwrap();
    assert_eq!(frameworks.as_slice(), ["Foundation".to_string()]);
    assert!(!frameworks.contains("CoreFoundation"));

    assert_eq!(session.versions().unwrap().sdk_version.as_str(), "6.0");
    assert_eq!(
        session.bridge_metadata_files().unwrap(),
        [
            tmp.path().join("data/6.0/BridgeSupport/RubyMotion.bridgesupport"),
            tmp.path().join("data/5.1/BridgeSupport/Foundation.bridgesupport"),
            tmp.path().join("data/6.0/BridgeSupport/Foundation.bridgesupport"),
        ]
    );
    assert_eq!(
        session.stub_objects("iPhoneOS").unwrap(),
        vec![tmp.path().join("data/6.0/iPhoneOS/Foundation_stubs.o")]
    );
    assert!(session.stub_objects("iPhoneSimulator").unwrap().is_empty());
    assert_eq!(session.platform_target("iPhoneSimulator").unwrap().archs, vec!["i386"]);
}

#[test]
fn declared_search_paths_keep_the_full_closure() {
    let config = BASE.replace(
        "frameworks = [\"Foundation\"]",
        "frameworks = [\"Foundation\"]\nframework_search_paths = [\"vendor\"]",
    );
    let tmp = project(&config);
    let session = session(&tmp);
    assert_eq!(
        session.frameworks().unwrap().as_slice(),
        ["Foundation".to_string(), "CoreFoundation".to_string()]
    );
}

#[test]
fn seed_id_uses_last_prefix() {
    let tmp = project(BASE);
    let session = session(&tmp);

    assert_eq!(session.seed_id().unwrap(), "BBBB");
    assert_eq!(session.provisioned_devices().unwrap(), vec!["d1"]);
    assert!(matches!(
        session.warnings().as_slice(),
        [ConfigWarning::Ambiguous { count: 2, .. }]
    ));

    let summary: serde_json::Value = serde_json::from_str(&session.summary_json().unwrap()).unwrap();
    assert_eq!(summary["warnings"][0]["kind"], "ambiguous");
    assert_eq!(summary["warnings"][0]["setting"], "seed_id");
    assert_eq!(summary["warnings"][0]["chosen"], "BBBB");
}

#[test]
fn weak_frameworks_skip_the_metadata_filter() {
    let config = BASE.replace(
        "frameworks = [\"Foundation\"]",
        "frameworks = [\"Foundation\"]\nweak_frameworks = [\"GameKit\"]",
    );
    let tmp = project(&config);
    touch(&tmp.path().join("data/6.0/iPhoneOS/GameKit_stubs.o"));
    let session = session(&tmp);

    assert_eq!(session.frameworks().unwrap().as_slice(), ["Foundation".to_string()]);
    assert_eq!(
        session.linkable_frameworks().unwrap().as_slice(),
        ["Foundation".to_string(), "GameKit".to_string()]
    );
    assert_eq!(
        session.stub_objects("iPhoneOS").unwrap(),
        vec![
            tmp.path().join("data/6.0/iPhoneOS/Foundation_stubs.o"),
            tmp.path().join("data/6.0/iPhoneOS/GameKit_stubs.o"),
        ]
    );
    assert!(
        !session
            .bridge_metadata_files()
            .unwrap()
            .iter()
            .any(|path| path.ends_with("GameKit.bridgesupport"))
    );
}

#[test]
fn spec_mode_adds_test_module_and_suffix() {
    let config = BASE.replace("name = \"Hello\"", "name = \"Hello\"\nspec_mode = true");
    let tmp = project(&config);
    touch(&tmp.path().join("data/6.0/BridgeSupport/UIAutomation.bridgesupport"));
    let session = session(&tmp);

    assert_eq!(session.identifier(), "com.yourcompany.Hello_spec");
    assert_eq!(session.bundle_name(), "Hello_spec");
    assert_eq!(
        session.bridge_metadata_files().unwrap(),
        [
            tmp.path().join("data/6.0/BridgeSupport/RubyMotion.bridgesupport"),
            tmp.path().join("data/5.1/BridgeSupport/Foundation.bridgesupport"),
            tmp.path().join("data/6.0/BridgeSupport/Foundation.bridgesupport"),
            tmp.path().join("data/6.0/BridgeSupport/UIAutomation.bridgesupport"),
        ]
    );

    let manifest = session.manifest().unwrap();
    assert_eq!(manifest.get("CFBundleIdentifier"), Some(&Value::from("com.yourcompany.Hello_spec")));
    assert_eq!(manifest.get("CFBundleName"), Some(&Value::from("Hello")));
}

#[test]
fn distribution_entitlements_use_seed_id() {
    let config = format!("{BASE}\n");
    let config = config.replace("[signing]", "[signing]\nmode = \"distribution\"");
    let tmp = project(&config);
    let session = session(&tmp);

    let entitlements = session.entitlements().unwrap();
    assert_eq!(
        entitlements.get("application-identifier"),
        Some(&Value::from("BBBB.com.yourcompany.Hello"))
    );
    assert!(!entitlements.contains_key("get-task-allow"));
}

#[test]
fn user_overrides_win_over_derived_fields() {
    let config = format!(
        "{BASE}\n[ios.platform_overrides]\nMinimumOSVersion = \"5.0\"\nUIStatusBarHidden = true\n\
         \n[app.info_plist]\nUIStatusBarHidden = false\nCFBundleDisplayName = \"Hi\"\n"
    );
    let tmp = project(&config);
    let session = session(&tmp);

    let manifest = session.manifest().unwrap();
    assert_eq!(manifest.get("CFBundleName"), Some(&Value::from("Hello")));
    assert_eq!(manifest.get("CFBundleDisplayName"), Some(&Value::from("Hi")));
    assert_eq!(manifest.get("MinimumOSVersion"), Some(&Value::from("5.0")));
    assert_eq!(manifest.get("UIStatusBarHidden"), Some(&Value::Boolean(false)));
    assert_eq!(manifest.get("DTSDKName"), Some(&Value::from("iphoneos6.0")));
    assert_eq!(manifest.get("DTXcodeBuild"), Some(&Value::from("4G182")));
}

#[test]
fn unknown_orientation_fails_manifest() {
    let config = BASE.replace(
        "deployment_target = \"5.1\"",
        "deployment_target = \"5.1\"\ninterface_orientations = [\"portrait\", \"sideways\"]",
    );
    let tmp = project(&config);
    let session = session(&tmp);
    match session.manifest() {
        Err(ConfigError::UnknownValue { field, value }) => {
            assert_eq!(field, "interface_orientation");
            assert_eq!(value, "sideways");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn emit_writes_documents() {
    let tmp = project(BASE);
    let session = session(&tmp);
    let out = tmp.path().join("build/iPhoneOS-6.0-Development");

    let written = session.emit(&out).unwrap();
    assert_eq!(written.len(), 3);
    assert_eq!(fs::read_to_string(out.join("PkgInfo")).unwrap(), "APPL????");

    let info = from_xml_str(&fs::read_to_string(out.join("Info.plist")).unwrap()).unwrap();
    let info = info.as_dictionary().unwrap();
    assert_eq!(info.get("CFBundleIdentifier"), Some(&Value::from("com.yourcompany.Hello")));
    assert_eq!(info.get("MinimumOSVersion"), Some(&Value::from("5.1")));

    let entitlements = from_xml_str(&fs::read_to_string(out.join("Entitlements.plist")).unwrap()).unwrap();
    assert_eq!(
        entitlements.as_dictionary().unwrap().get("get-task-allow"),
        Some(&Value::Boolean(true))
    );

    let json = session.summary_json().unwrap();
    let summary: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(summary["frameworks"], serde_json::json!(["Foundation"]));
    assert_eq!(summary["versions"]["sdk_version"], "6.0");
    assert_eq!(summary["mode"], "development");
}

#[test]
fn deployment_target_above_sdk_blocks_emission() {
    let config = BASE.replace("deployment_target = \"5.1\"", "deployment_target = \"6.1\"");
    let tmp = project(&config);
    let session = session(&tmp);
    let out = tmp.path().join("build");

    assert!(matches!(
        session.emit(&out),
        Err(ConfigError::InvalidValue { ref field, .. }) if field == "deployment_target"
    ));
    assert!(!out.exists());
}
