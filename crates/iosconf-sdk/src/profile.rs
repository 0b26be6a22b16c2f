//! Provisioning profiles and signing identity.
//!
//! A `.mobileprovision` file is a signed CMS blob with an XML property list
//! embedded in it. [`ProvisioningProfile::open`] slices that property list
//! out of the raw bytes and decodes it; nothing in the signature is verified.

use iosconf_plist::{Dictionary, Value, from_embedded_bytes};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::external::certificate_prefix;
use crate::types::{ConfigError, Selection};

/// Name pattern used when the project does not set one.
pub const DEFAULT_PROFILE_NAME: &str = "iOS Team Provisioning Profile";

const PROFILE_EXTENSION: &str = "mobileprovision";

/// A decoded provisioning profile.
#[derive(Debug, Clone)]
pub struct ProvisioningProfile {
    path: PathBuf,
    root: Dictionary,
}

impl ProvisioningProfile {
    pub fn open(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path)?;
        let root = match from_embedded_bytes(&bytes)? {
            Value::Dictionary(root) => root,
            _ => {
                return Err(ConfigError::parse(
                    format!("provisioning profile {}", path.display()),
                    "top-level value is not a dictionary",
                ));
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            root,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The profile's display name, if it has one.
    pub fn name(&self) -> Option<&str> {
        self.root.get("Name").and_then(Value::as_str)
    }

    /// Trimmed string leaves of the array stored under `key`.
    pub fn read_array(&self, key: &str) -> Result<Vec<String>, ConfigError> {
        let what = || format!("provisioning profile {}", self.path.display());
        let value = self
            .root
            .get(key)
            .ok_or_else(|| ConfigError::parse(what(), format!("missing `{key}' array")))?;
        if value.as_array().is_none() {
            return Err(ConfigError::parse(what(), format!("`{key}' is not an array")));
        }
        Ok(value
            .string_leaves()
            .into_iter()
            .map(|leaf| leaf.trim().to_string())
            .collect())
    }

    pub fn application_identifier_prefixes(&self) -> Result<Vec<String>, ConfigError> {
        self.read_array("ApplicationIdentifierPrefix")
    }

    /// Device identifiers the profile allows installation on.
    pub fn provisioned_devices(&self) -> Result<Vec<String>, ConfigError> {
        self.read_array("ProvisionedDevices")
    }
}

/// Reads the array `key` from the profile at `path`.
pub fn read_array(path: &Path, key: &str) -> Result<Vec<String>, ConfigError> {
    ProvisioningProfile::open(path)?.read_array(key)
}

/// Finds the profile in `dir` whose name contains `pattern`.
///
/// Candidates are visited in path order. Files that cannot be decoded are
/// skipped with a logged warning and named in the error when nothing
/// matches. Several matches resolve to the first with a warning.
pub fn resolve_profile(dir: &Path, pattern: &str) -> Result<Selection<PathBuf>, ConfigError> {
    let resource = || format!("a provisioning profile named like `{pattern}'");
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::not_found_in(resource(), vec![dir.to_path_buf()]));
        }
        Err(e) => return Err(e.into()),
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some(PROFILE_EXTENSION) {
            candidates.push(path);
        }
    }
    candidates.sort();

    let mut matches = Vec::new();
    let mut undecodable = Vec::new();
    for path in candidates {
        match ProvisioningProfile::open(&path) {
            Ok(profile) if profile.name().is_some_and(|name| name.contains(pattern)) => matches.push(path),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Skipping undecodable provisioning profile {}: {}", path.display(), e);
                undecodable.push(format!("{} ({e})", path.display()));
            }
        }
    }

    let count = matches.len();
    let mut matches = matches.into_iter();
    match (matches.next(), count) {
        (None, _) if !undecodable.is_empty() => Err(ConfigError::not_found_in(
            format!("{}; these profiles could not be decoded: {}", resource(), undecodable.join(", ")),
            vec![dir.to_path_buf()],
        )),
        (None, _) => Err(ConfigError::not_found_in(resource(), vec![dir.to_path_buf()])),
        (Some(first), 1) => Ok(Selection::unique(first)),
        (Some(first), _) => {
            let chosen = first.display().to_string();
            Ok(Selection::ambiguous(first, "provisioning profile", count, "provisioning_profile", chosen))
        }
    }
}

/// Picks the application identifier prefix (seed id) from `prefixes`.
///
/// When a profile lists several prefixes the last one is used.
pub fn select_seed_id(prefixes: Vec<String>, profile: &Path) -> Result<Selection<String>, ConfigError> {
    let count = prefixes.len();
    match prefixes.into_iter().last() {
        None => Err(ConfigError::not_found_in(
            "an application identifier prefix in the provisioning profile",
            vec![profile.to_path_buf()],
        )),
        Some(last) if count == 1 => Ok(Selection::unique(last)),
        Some(last) => {
            let chosen = last.clone();
            Ok(Selection::ambiguous(last, "ApplicationIdentifierPrefix", count, "seed_id", chosen))
        }
    }
}

/// Picks a signing certificate for the given mode from keychain names.
///
/// Only names with the mode's prefix qualify. Duplicates collapse; several
/// distinct certificates resolve to the first with a warning.
pub fn select_certificate(names: Vec<String>, distribution: bool) -> Result<Selection<String>, ConfigError> {
    let prefix = certificate_prefix(distribution);
    let mut seen = HashSet::new();
    let mut candidates: Vec<String> = names
        .into_iter()
        .filter(|name| name.starts_with(prefix))
        .filter(|name| seen.insert(name.clone()))
        .collect();

    let count = candidates.len();
    if count == 0 {
        return Err(ConfigError::not_found(format!(
            "a `{}' certificate in the keychain",
            prefix.trim_end_matches([':', ' '])
        )));
    }
    let first = candidates.swap_remove(0);
    if count == 1 {
        Ok(Selection::unique(first))
    } else {
        let chosen = first.clone();
        Ok(Selection::ambiguous(first, "signing certificate", count, "codesign_certificate", chosen))
    }
}
