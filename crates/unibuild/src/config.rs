//! Configuration file support for unibuild.
//!
//! This module provides support for `unibuild.toml` configuration files that
//! persist the work directory, architecture set and feature overrides so they
//! don't have to be repeated on every invocation.
//!
//! ## Configuration File Location
//!
//! The configuration file is searched for in the following order:
//! 1. Current working directory (`./unibuild.toml`)
//! 2. Parent directories (up to the repository root or filesystem root)
//!
//! ## Example Configuration
//!
//! ```toml
//! [project]
//! work_dir = "vendor"
//! parallel = true
//!
//! [source]
//! tag = "v9.7"
//!
//! [build]
//! architectures = ["i386", "x86_64"]
//! merge_tool = "lipo"
//!
//! [features]
//! network = "enable"
//! protocol = { enable = ["file", "pipe"] }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use unibuild_sdk::layout::BuildLayout;
use unibuild_sdk::{
    Architecture, FeatureOptions, FeatureValue, RepositorySpec, Switch, TaskOptions,
};

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "unibuild.toml";

/// Root configuration structure for `unibuild.toml`.
///
/// Every section is optional; missing values fall back to the recipe's and
/// the SDK's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnibuildConfig {
    /// Work directory and scheduling.
    pub project: ProjectConfig,

    /// Overrides of the recipe's upstream repository.
    pub source: SourceConfig,

    /// Architectures and merge tool.
    pub build: BuildSection,

    /// Feature option overrides, applied on top of the recipe's table.
    pub features: BTreeMap<String, FeatureSetting>,
}

/// Project-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Directory holding the checkout and build trees.
    ///
    /// Relative paths are resolved against the config file's directory.
    /// Defaults to the current directory.
    pub work_dir: Option<PathBuf>,

    /// Parallel make jobs. Defaults to the number of available cores.
    pub jobs: Option<usize>,

    /// Build architectures concurrently.
    pub parallel: bool,

    /// Build outside the source tree.
    ///
    /// Defaults to true.
    pub separated_build: bool,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            jobs: None,
            parallel: false,
            separated_build: true,
        }
    }
}

/// Upstream repository overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Clone URI (e.g. a local mirror).
    pub uri: Option<String>,

    /// Tag to build instead of the recipe's pinned tag.
    pub tag: Option<String>,
}

/// Build configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    /// Architectures to build.
    ///
    /// Defaults to ["i386", "x86_64"].
    pub architectures: Vec<String>,

    /// Universal-binary merge tool.
    ///
    /// Defaults to "lipo".
    pub merge_tool: String,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            architectures: Architecture::defaults()
                .iter()
                .map(|a| a.as_str().to_string())
                .collect(),
            merge_tool: unibuild_sdk::builders::DEFAULT_MERGE_TOOL.to_string(),
        }
    }
}

/// One `[features]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureSetting {
    /// `key = "enable"` or `key = "disable"`
    Toggle(ToggleSetting),
    /// `key = { enable = [...] }`
    Enable { enable: Vec<String> },
    /// `key = { disable = [...] }`
    Disable { disable: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleSetting {
    Enable,
    Disable,
}

impl From<&FeatureSetting> for FeatureValue {
    fn from(setting: &FeatureSetting) -> Self {
        match setting {
            FeatureSetting::Toggle(ToggleSetting::Enable) => FeatureValue::Toggle(Switch::Enable),
            FeatureSetting::Toggle(ToggleSetting::Disable) => FeatureValue::Toggle(Switch::Disable),
            FeatureSetting::Enable { enable } => FeatureValue::EnableList(enable.clone()),
            FeatureSetting::Disable { disable } => FeatureValue::DisableList(disable.clone()),
        }
    }
}

impl UnibuildConfig {
    /// Loads configuration from the specified file path.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Ok(UnibuildConfig)` - Successfully loaded configuration
    /// * `Err` - If the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: UnibuildConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Attempts to find and load configuration starting from the specified directory.
    ///
    /// The search walks up the directory tree and stops at the first
    /// directory containing `.git`, or at the filesystem root.
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Resolves the work directory.
    ///
    /// A relative `work_dir` is taken relative to `base` (the config file's
    /// directory); without one, `base` itself is the work directory.
    pub fn work_dir(&self, base: &Path) -> PathBuf {
        match &self.project.work_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => base.join(dir),
            None => base.to_path_buf(),
        }
    }

    /// Applies `[source]` overrides to the recipe's repository.
    pub fn repository(&self, recipe_default: RepositorySpec) -> RepositorySpec {
        RepositorySpec {
            uri: self.source.uri.clone().unwrap_or(recipe_default.uri),
            pinned_tag: self.source.tag.clone().unwrap_or(recipe_default.pinned_tag),
            ..recipe_default
        }
    }

    /// Parses `[build] architectures`, dropping duplicates.
    ///
    /// Fails on names that cannot have their own output directory, such as
    /// `universal`.
    pub fn architectures(&self) -> Result<Vec<Architecture>> {
        let mut architectures = Vec::with_capacity(self.build.architectures.len());
        for name in &self.build.architectures {
            let arch: Architecture = name.parse()?;
            BuildLayout::check_architecture(&arch).with_context(|| {
                format!("Invalid [build] architectures entry in {}", CONFIG_FILE_NAME)
            })?;
            architectures.push(arch);
        }
        architectures.sort();
        architectures.dedup();
        Ok(architectures)
    }

    /// Converts `[features]` into feature options.
    ///
    /// Fails on keys the configure script does not know.
    pub fn feature_overrides(&self) -> Result<FeatureOptions> {
        let mut options = FeatureOptions::new();
        for (key, setting) in &self.features {
            options
                .set(key, setting.into())
                .with_context(|| format!("Invalid [features] entry '{}' in {}", key, CONFIG_FILE_NAME))?;
        }
        Ok(options)
    }

    /// Session options derived from `[project]` and `[build]`.
    pub fn task_options(&self) -> Result<TaskOptions> {
        Ok(TaskOptions {
            architectures: self.architectures()?,
            separated_build: self.project.separated_build,
            parallel: self.project.parallel,
            jobs: self.project.jobs,
            merge_tool: self.build.merge_tool.clone(),
            ..TaskOptions::default()
        })
    }

    /// Generates a starter configuration file as a formatted TOML string.
    ///
    /// This includes helpful comments explaining each configuration option.
    pub fn generate_starter_toml() -> String {
        r#"# unibuild configuration file
# CLI flags override these settings when provided.

[project]
# Directory holding libav-src/ and libav-build/ (default: this directory)
# work_dir = "vendor"

# Parallel make jobs (default: number of CPU cores)
# jobs = 8

# Build architectures concurrently (default: false)
parallel = false

# Build outside the source tree (default: true)
separated_build = true

[source]
# Clone URI override, e.g. a local mirror
# uri = "https://git.libav.org/libav.git"

# Tag override (default: the recipe's pinned tag)
# tag = "v9.7"

[build]
# Architectures to build and merge
architectures = ["i386", "x86_64"]

# Universal-binary merge tool
merge_tool = "lipo"

[features]
# Overrides of the built-in feature table:
#   key = "enable" | "disable"
#   key = { enable = ["a", "b"] } | { disable = ["a", "b"] }
# network = "enable"
# protocol = { enable = ["file", "pipe"] }
"#
        .to_string()
    }
}
