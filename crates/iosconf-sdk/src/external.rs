//! External collaborators.
//!
//! Resolution consults a handful of opaque programs: `xcodebuild -version`,
//! `otool -L`, the keychain `security` tool, `xcode-select`, and the device
//! deploy helper. Each is hidden behind a trait so a [`BuildSession`] can run
//! against fakes in tests. The `System*` types are the real implementations.
//!
//! All invocations are synchronous and their output is parsed immediately.
//! There is no retry: a program that cannot be started or exits non-zero
//! produces [`ConfigError::Tool`].
//!
//! [`BuildSession`]: crate::BuildSession

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::toolchain::{XcodeVersion, parse_xcodebuild_version};
use crate::types::ConfigError;

/// Reports the toolchain version and build of an `xcodebuild` executable.
pub trait ToolchainVersionQuery {
    fn query(&self, xcodebuild: &Path) -> Result<XcodeVersion, ConfigError>;
}

/// Lists the load commands (dependency install names) of a compiled binary.
pub trait BinaryDependencyInspector {
    fn dependencies(&self, binary: &Path) -> Result<Vec<String>, ConfigError>;
}

/// Lists signing certificate display names from the keychain.
pub trait CertificateEnumerator {
    fn certificates(&self, distribution: bool) -> Result<Vec<String>, ConfigError>;
}

/// Asks the deploy helper for the identifier of the connected device.
pub trait DeviceIdQuery {
    fn device_id(&self, helper: &Path) -> Result<String, ConfigError>;
}

/// Reports the developer directory chosen with `xcode-select`, if any.
pub trait DeveloperDirQuery {
    fn selected_developer_dir(&self) -> Option<PathBuf>;
}

/// Runs `cmd` and returns its stdout, failing on spawn errors or non-zero exit.
pub(crate) fn capture_stdout(mut cmd: Command, description: &str) -> Result<String, ConfigError> {
    tracing::debug!("Running {:?}", cmd);
    let output = cmd.output().map_err(|e| ConfigError::Tool {
        command: description.to_string(),
        message: format!(
            "Failed to start: {}\n\nEnsure the tool is installed and the developer directory is correct.",
            e
        ),
    })?;

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ConfigError::Tool {
            command: description.to_string(),
            message: format!(
                "Exit status: {}\n\nStdout:\n{}\n\nStderr:\n{}",
                output.status, stdout, stderr
            ),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `xcodebuild -version`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemVersionQuery;

impl ToolchainVersionQuery for SystemVersionQuery {
    fn query(&self, xcodebuild: &Path) -> Result<XcodeVersion, ConfigError> {
        let mut cmd = Command::new(xcodebuild);
        cmd.arg("-version");
        let stdout = capture_stdout(cmd, "xcodebuild -version")?;
        parse_xcodebuild_version(&stdout)
    }
}

/// `otool -L <binary>`.
#[derive(Debug, Clone)]
pub struct Otool {
    path: PathBuf,
}

impl Otool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BinaryDependencyInspector for Otool {
    fn dependencies(&self, binary: &Path) -> Result<Vec<String>, ConfigError> {
        let mut cmd = Command::new(&self.path);
        cmd.arg("-L").arg(binary);
        let stdout = capture_stdout(cmd, "otool -L")?;
        Ok(parse_otool_output(&stdout))
    }
}

/// Extracts install names from `otool -L` output.
///
/// Dependency lines are tab-indented and carry a parenthesised version
/// suffix; the header line naming the inspected binary is skipped.
pub fn parse_otool_output(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.strip_prefix('\t'))
        .filter_map(|rest| {
            let (path, _) = rest.split_once(" (")?;
            let path = path.trim();
            (!path.is_empty() && !path.contains(char::is_whitespace)).then(|| path.to_string())
        })
        .collect()
}

/// Display-name prefix of the certificates usable in a signing mode.
pub fn certificate_prefix(distribution: bool) -> &'static str {
    if distribution {
        "iPhone Distribution: "
    } else {
        "iPhone Developer: "
    }
}

/// `/usr/bin/security -q find-certificate -a`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemKeychain;

impl CertificateEnumerator for SystemKeychain {
    fn certificates(&self, distribution: bool) -> Result<Vec<String>, ConfigError> {
        let mut cmd = Command::new("/usr/bin/security");
        cmd.args(["-q", "find-certificate", "-a"]);
        let stdout = capture_stdout(cmd, "security find-certificate")?;
        Ok(parse_certificate_names(&stdout, certificate_prefix(distribution)))
    }
}

/// Extracts every quoted string starting with `prefix` from keychain output.
pub fn parse_certificate_names(text: &str, prefix: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in text.lines() {
        let mut rest = line;
        while let Some(start) = rest.find('"') {
            let tail = &rest[start + 1..];
            let Some(end) = tail.find('"') else { break };
            let quoted = &tail[..end];
            if quoted.starts_with(prefix) {
                names.push(quoted.to_string());
            }
            rest = &tail[end + 1..];
        }
    }
    names
}

/// `<helper> -D`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDeviceQuery;

impl DeviceIdQuery for SystemDeviceQuery {
    fn device_id(&self, helper: &Path) -> Result<String, ConfigError> {
        let mut cmd = Command::new(helper);
        cmd.arg("-D");
        let stdout = capture_stdout(cmd, "deploy -D")?;
        Ok(stdout.trim().to_string())
    }
}

/// `/usr/bin/xcode-select -print-path`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XcodeSelect;

impl DeveloperDirQuery for XcodeSelect {
    fn selected_developer_dir(&self) -> Option<PathBuf> {
        let tool = Path::new("/usr/bin/xcode-select");
        if !tool.exists() {
            return None;
        }
        let mut cmd = Command::new(tool);
        cmd.arg("-print-path");
        match capture_stdout(cmd, "xcode-select -print-path") {
            Ok(stdout) => {
                let path = stdout.trim();
                (!path.is_empty()).then(|| PathBuf::from(path))
            }
            Err(e) => {
                tracing::debug!("Ignoring xcode-select failure: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_otool_output() {
        let text = "/SDK/System/Library/Frameworks/UIKit.framework/UIKit:\n\
                    \t/System/Library/Frameworks/Foundation.framework/Foundation (compatibility version 300.0.0, current version 890.1.0)\n\
                    \t/usr/lib/libobjc.A.dylib (compatibility version 1.0.0, current version 228.0.0)\n\
                    \tgarbage without version\n";
        assert_eq!(
            parse_otool_output(text),
            vec![
                "/System/Library/Frameworks/Foundation.framework/Foundation".to_string(),
                "/usr/lib/libobjc.A.dylib".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_certificate_names() {
        let text = "keychain: \"/Users/me/Library/Keychains/login.keychain\"\n\
                    \x20   \"labl\"<blob>=\"iPhone Developer: Jane Doe (ABCDE12345)\"\n\
                    \x20   \"labl\"<blob>=\"iPhone Distribution: Acme Inc\"\n\
                    \x20   \"labl\"<blob>=\"iPhone Developer: Jane Doe (ABCDE12345)\"\n";
        assert_eq!(
            parse_certificate_names(text, certificate_prefix(false)),
            vec![
                "iPhone Developer: Jane Doe (ABCDE12345)".to_string(),
                "iPhone Developer: Jane Doe (ABCDE12345)".to_string(),
            ]
        );
        assert_eq!(
            parse_certificate_names(text, certificate_prefix(true)),
            vec!["iPhone Distribution: Acme Inc".to_string()]
        );
    }

    #[test]
    fn test_capture_stdout_reports_missing_tool() {
        let cmd = Command::new("nonexistent-command-12345");
        let err = capture_stdout(cmd, "test command").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("test command failed"));
        assert!(msg.contains("Failed to start"));
    }
}
