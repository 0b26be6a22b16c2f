//! Core types for iosconf-sdk.
//!
//! This module defines the types shared by every resolution step:
//!
//! - [`ConfigError`] - Fatal resolution failures
//! - [`ConfigWarning`] / [`Selection`] - Non-fatal ambiguity reports
//! - [`BuildMode`] - Development or distribution signing

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Error types for configuration resolution.
///
/// Every variant is fatal: resolution stops at the first one and no partial
/// configuration is returned. Ambiguous lookups are not errors; see
/// [`ConfigWarning`].
///
/// # Example
///
/// ```
/// use iosconf_sdk::ConfigError;
/// use iosconf_sdk::manifest::InterfaceOrientation;
///
/// match "sideways".parse::<InterfaceOrientation>() {
///     Err(ConfigError::UnknownValue { field, value }) => {
///         assert_eq!(field, "interface_orientation");
///         assert_eq!(value, "sideways");
///     }
///     other => panic!("unexpected result: {:?}", other),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required resource does not exist.
    ///
    /// Covers SDKs, toolchain executables, provisioning profiles, signing
    /// certificates, and connected devices. `searched` lists every location
    /// that was probed, when there is a meaningful list.
    #[error("Can't locate {resource}{}", searched_suffix(.searched))]
    NotFound {
        resource: String,
        searched: Vec<PathBuf>,
    },

    /// A symbolic setting is outside its closed set of accepted values.
    #[error("Unknown {field} value: `{value}'")]
    UnknownValue { field: &'static str, value: String },

    /// A declared or derived value has the wrong shape or ordering.
    #[error("Invalid {field}: {message}")]
    InvalidValue { field: String, message: String },

    /// The toolchain or data directory does not support the requested version.
    #[error("{0}")]
    UnsupportedVersion(String),

    /// A document or tool output could not be understood.
    #[error("Failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    /// An external program could not be run or reported failure.
    #[error("{command} failed.\n\n{message}")]
    Tool { command: String, message: String },

    /// An I/O error occurred while reading inputs or writing artifacts.
    #[error("I/O error: {0}. Check file paths and permissions")]
    Io(#[from] std::io::Error),

    /// A property-list document was malformed.
    #[error("Malformed property list: {0}")]
    Plist(#[from] iosconf_plist::PlistError),
}

impl ConfigError {
    pub(crate) fn not_found(resource: impl Into<String>) -> Self {
        ConfigError::NotFound {
            resource: resource.into(),
            searched: Vec::new(),
        }
    }

    pub(crate) fn not_found_in(resource: impl Into<String>, searched: Vec<PathBuf>) -> Self {
        ConfigError::NotFound {
            resource: resource.into(),
            searched,
        }
    }

    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn parse(what: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Parse {
            what: what.into(),
            message: message.into(),
        }
    }
}

fn searched_suffix(searched: &[PathBuf]) -> String {
    if searched.is_empty() {
        return String::new();
    }
    let mut out = String::from(".\n\nSearched:");
    for path in searched {
        out.push_str(&format!("\n  - {}", path.display()));
    }
    out
}

/// A non-fatal condition surfaced to the caller.
///
/// Serialized with a `kind` tag for the build summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigWarning {
    /// Several resources matched; the documented tie-break picked one.
    Ambiguous {
        /// Kind of resource, e.g. `provisioning profile`.
        resource: &'static str,
        /// Number of matches found.
        count: usize,
        /// The project setting that removes the ambiguity.
        setting: &'static str,
        /// The match that resolution proceeds with.
        chosen: String,
    },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::Ambiguous {
                resource,
                count,
                setting,
                chosen,
            } => write!(
                f,
                "Found {count} matching {resource} entries. Set the `{setting}' project setting. Will use `{chosen}'"
            ),
        }
    }
}

/// The outcome of a lookup that may have had several candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection<T> {
    pub value: T,
    pub warning: Option<ConfigWarning>,
}

impl<T> Selection<T> {
    pub fn unique(value: T) -> Self {
        Self {
            value,
            warning: None,
        }
    }

    pub(crate) fn ambiguous(
        value: T,
        resource: &'static str,
        count: usize,
        setting: &'static str,
        chosen: impl Into<String>,
    ) -> Self {
        let warning = ConfigWarning::Ambiguous {
            resource,
            count,
            setting,
            chosen: chosen.into(),
        };
        tracing::warn!("{}", warning);
        Self {
            value,
            warning: Some(warning),
        }
    }
}

/// Signing mode of a build.
///
/// Controls certificate selection and the default entitlements.
///
/// ```
/// use iosconf_sdk::BuildMode;
///
/// assert_eq!(BuildMode::Distribution.as_str(), "distribution");
/// assert!(BuildMode::Distribution.is_distribution());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Developer certificate, debugger attachment allowed.
    #[default]
    Development,
    /// Distribution certificate, application identifier entitlement required.
    Distribution,
}

impl BuildMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildMode::Development => "development",
            BuildMode::Distribution => "distribution",
        }
    }

    pub fn is_distribution(&self) -> bool {
        matches!(self, BuildMode::Distribution)
    }
}
