//! Flashing-tool resolution
//!
//! Finds `esptool.py` inside the `tool-esptoolpy` package of a PlatformIO
//! installation. Lookup order for a package directory:
//! - Explicit per-package override from config
//! - `<core_dir>/packages/<name>`
//! - Highest `<core_dir>/packages/<name>@<version>` directory, comparing
//!   version components as numbers
//!
//! A package that resolves but lacks the entry script is treated the same as
//! a missing package.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

/// Package that ships the flashing utility.
pub const ESPTOOL_PACKAGE: &str = "tool-esptoolpy";

/// Entry script inside [`ESPTOOL_PACKAGE`].
pub const ESPTOOL_SCRIPT: &str = "esptool.py";

/// Lookup from a toolchain package name to its install directory.
pub trait PackageRegistry {
    /// Directory of `name`, or `None` if the package is not installed.
    fn package_dir(&self, name: &str) -> Option<PathBuf>;
}

/// Fixed name-to-directory map.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    packages: BTreeMap<String, PathBuf>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package(mut self, name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.packages.insert(name.into(), dir.into());
        self
    }
}

impl PackageRegistry for StaticRegistry {
    fn package_dir(&self, name: &str) -> Option<PathBuf> {
        self.packages.get(name).cloned()
    }
}

/// `[packages]` section of the effective config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSettings {
    /// PlatformIO core directory (`~/.platformio` when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_dir: Option<PathBuf>,

    /// Explicit package directories, keyed by package name.
    #[serde(flatten)]
    pub overrides: BTreeMap<String, PathBuf>,
}

/// Registry over a PlatformIO core directory.
#[derive(Debug, Clone)]
pub struct PlatformioRegistry {
    packages_dir: PathBuf,
    overrides: BTreeMap<String, PathBuf>,
}

impl PlatformioRegistry {
    pub fn new(core_dir: impl AsRef<Path>) -> Self {
        Self {
            packages_dir: core_dir.as_ref().join("packages"),
            overrides: BTreeMap::new(),
        }
    }

    /// Build from config. Without `core_dir`, falls back to `$HOME/.platformio`
    /// (`home` is passed in so callers decide where it comes from).
    pub fn from_settings(settings: &PackageSettings, home: Option<&Path>) -> Self {
        let core_dir = settings
            .core_dir
            .clone()
            .or_else(|| home.map(|h| h.join(".platformio")))
            .unwrap_or_else(|| PathBuf::from(".platformio"));

        let mut registry = Self::new(core_dir);
        registry.overrides = settings.overrides.clone();
        registry
    }

    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }

    /// Highest `<name>@<version>` directory by numeric version components.
    fn versioned_dir(&self, name: &str) -> Option<PathBuf> {
        let prefix = format!("{}@", name);

        WalkDir::new(&self.packages_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_dir())
            .filter_map(|entry| {
                let key = version_key(entry.file_name().to_str()?.strip_prefix(&prefix)?);
                Some((key, entry.into_path()))
            })
            .max()
            .map(|(_, path)| path)
    }
}

/// Dotted version as numbers, so `1.10.0` sorts above `1.9.0`. Each component
/// contributes its leading digits; a component without any counts as 0.
fn version_key(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|part| {
            let end = part.find(|c: char| !c.is_ascii_digit()).unwrap_or(part.len());
            part[..end].parse().unwrap_or(0)
        })
        .collect()
}

impl PackageRegistry for PlatformioRegistry {
    fn package_dir(&self, name: &str) -> Option<PathBuf> {
        if let Some(dir) = self.overrides.get(name) {
            debug!(package = name, dir = %dir.display(), "using configured package directory");
            return Some(dir.clone());
        }

        let plain = self.packages_dir.join(name);
        if plain.is_dir() {
            return Some(plain);
        }

        let versioned = self.versioned_dir(name);
        if versioned.is_none() {
            debug!(package = name, packages_dir = %self.packages_dir.display(), "package not installed");
        }
        versioned
    }
}

/// Tool location errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LocateError {
    /// Registry has no directory for the package
    #[error("Package '{package}' is not installed")]
    PackageMissing { package: String },

    /// Package directory resolved but the script is not a regular file
    #[error("'{}' does not exist or is not a file", path.display())]
    ScriptMissing { path: PathBuf },
}

/// Resolve the `esptool.py` entry script.
pub fn locate_esptool(registry: &dyn PackageRegistry) -> Result<PathBuf, LocateError> {
    locate_script(registry, ESPTOOL_PACKAGE, ESPTOOL_SCRIPT)
}

/// Resolve `script` inside `package`, requiring an existing regular file.
pub fn locate_script(
    registry: &dyn PackageRegistry,
    package: &str,
    script: &str,
) -> Result<PathBuf, LocateError> {
    let dir = registry
        .package_dir(package)
        .ok_or_else(|| LocateError::PackageMissing {
            package: package.to_string(),
        })?;

    let path = dir.join(script);
    if !path.is_file() {
        return Err(LocateError::ScriptMissing { path });
    }

    debug!(path = %path.display(), "located {}", script);
    Ok(path)
}
