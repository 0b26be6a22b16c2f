//! Build configuration resolution for iOS application targets.
//!
//! `iosconf-sdk` works out everything a build needs before the compiler runs:
//! which SDK to build against, which frameworks to link (including their
//! transitive dependencies), which bridging metadata and stub objects apply,
//! which signing identity and provisioning profile to use, and the contents
//! of the `Info.plist` and entitlements documents.
//!
//! # Quick Start
//!
//! 1. Describe the project in `iosconf.toml`:
//! ```toml
//! [app]
//! name = "Hello"
//!
//! [ios]
//! deployment_target = "5.0"
//!
//! [toolchain]
//! data_dir = "/Library/RubyMotion/data"
//! ```
//!
//! 2. Resolve and emit:
//! ```no_run
//! use iosconf_sdk::BuildSession;
//! use std::path::Path;
//!
//! let session = BuildSession::discover(Path::new("."))?;
//! println!("{}", session.summary_json()?);
//! session.emit(Path::new("build"))?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! # Architecture
//!
//! - **Version catalog** ([`version`]): installed SDKs and supported versions
//! - **Toolchain** ([`toolchain`]): developer directory and executables
//! - **Frameworks** ([`frameworks`]): dependency closure, stubs, bridging metadata
//! - **Profiles** ([`profile`]): provisioning profiles and signing identity
//! - **Manifest** ([`manifest`]): `Info.plist` and entitlements
//! - **Validation** ([`validate`]): consistency checks gating emission
//! - **Session** ([`BuildSession`]): memoized resolution over all of the above
//!
//! External programs (`xcodebuild`, `otool`, `security`, the device helper)
//! are reached through the traits in [`external`] and can be replaced.

pub mod config;
pub mod external;
pub mod frameworks;
pub mod manifest;
pub mod platform;
pub mod profile;
pub mod session;
pub mod toolchain;
pub mod types;
pub mod validate;
pub mod version;

pub use config::{CONFIG_FILE_NAME, ProjectConfig};
pub use frameworks::{DependencyResolver, FrameworkSet};
pub use manifest::ManifestBuilder;
pub use platform::PlatformTarget;
pub use profile::ProvisioningProfile;
pub use session::{BuildSession, BuildSummary};
pub use toolchain::{ToolchainLocator, XcodeVersion};
pub use types::{BuildMode, ConfigError, ConfigWarning, Selection};
pub use validate::ConfigValidator;
pub use version::{Version, VersionCatalog, VersionConstraint};

// Re-export the property-list crate for callers building overrides
pub use iosconf_plist;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
