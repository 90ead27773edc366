//! Plugin package handling.
//!
//! Provides utilities for:
//! - Fetching package metadata from the npm registry
//! - Selecting versions with semver ranges
//! - Downloading and extracting tarballs into a scoped `node_modules`
//! - Reading the node file list from a package manifest

pub mod error;
pub mod install;
pub mod manifest;
pub mod registry;
pub mod tarball;
pub mod version;

pub use error::{codes as pkg_codes, PkgError};
pub use install::{install_packages, InstalledPackages};
pub use manifest::{read_manifest, PackageManifest};
pub use registry::{RegistryClient, DEFAULT_REGISTRY, REGISTRY_ENV};
pub use tarball::{download_tarball, extract_package, MAX_TARBALL_SIZE};
pub use version::resolve_version;
