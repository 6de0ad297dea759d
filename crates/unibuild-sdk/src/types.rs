//! Core types for unibuild-sdk.
//!
//! This module defines the fundamental types used throughout the SDK:
//!
//! - [`BuildError`] - Error taxonomy for checkout, build and merge stages
//! - [`Architecture`] - Target architecture identifiers
//! - [`BuildVariant`] - Debug or release builds
//! - [`BuildOutput`] - One per-architecture install tree
//! - [`BuildReport`] / [`ArchFailure`] - Result of a multi-architecture build
//! - [`UniversalArtifact`] - The merged multi-architecture artifact set

use std::convert::Infallible;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// Error types for unibuild-sdk operations.
///
/// Checkout errors (`SourceUnavailable`, `TagNotFound`, `DirtyWorkingTree`,
/// `CheckoutFailed`) are fatal to a whole session. Per-architecture errors
/// (`ConfigureFailed`, `CompileFailed`) are isolated and aggregated into a
/// [`BuildReport`]. Merge errors are fatal to one variant's deliverable only.
///
/// # Example
///
/// ```
/// use unibuild_sdk::{Architecture, BuildError};
///
/// let err = BuildError::CompileFailed {
///     arch: Architecture::I386,
///     output: "clang: error: unknown argument".to_string(),
/// };
/// assert_eq!(err.kind(), "CompileFailed");
/// assert_eq!(err.stage(), "build");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The remote repository could not be cloned or fetched.
    #[error("source repository {uri} is unavailable.\n\n{output}\n\nCheck network access and the repository URI.")]
    SourceUnavailable { uri: String, output: String },

    /// The pinned tag does not exist in the repository, even after a fetch.
    #[error("tag '{tag}' not found in {uri}. Check the pinned tag in the recipe or unibuild.toml")]
    TagNotFound { uri: String, tag: String },

    /// Moving to the pinned tag would discard local modifications.
    #[error(
        "working tree at {} has local modifications:\n{changes}\n\nCommit or stash them, or re-run with --force to discard them.",
        .path.display()
    )]
    DirtyWorkingTree { path: PathBuf, changes: String },

    /// git refused to move the working tree to the pinned revision.
    #[error("failed to check out '{tag}':\n{output}")]
    CheckoutFailed { tag: String, output: String },

    /// The configure step failed for one architecture.
    #[error("configure failed for {arch}:\n{output}")]
    ConfigureFailed { arch: Architecture, output: String },

    /// The compile or install step failed for one architecture.
    #[error("compile failed for {arch}:\n{output}")]
    CompileFailed { arch: Architecture, output: String },

    /// The universal-binary merge tool is not installed.
    #[error("merge tool '{tool}' not found on PATH. Install the Xcode command line tools or set build.merge_tool")]
    MergeToolMissing { tool: String },

    /// An expected artifact is absent from every build output.
    #[error("no architecture slice found for artifact '{artifact}'")]
    NoSlicesFound { artifact: String },

    /// The merge tool ran but failed on one artifact.
    #[error("merging '{artifact}' failed:\n{output}")]
    MergeFailed { artifact: String, output: String },

    /// A merge was requested without any successful build output.
    #[error("no build outputs to merge for the {variant} variant")]
    NoBuildOutputs { variant: BuildVariant },

    /// An architecture name that cannot be given its own output directory.
    #[error("invalid architecture name '{name}': {reason}")]
    InvalidArchitecture { name: String, reason: String },

    /// A feature option key outside the known configure option table.
    #[error("unknown feature option '{0}'")]
    UnknownFeatureOption(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}. Check file paths and permissions")]
    Io(#[from] std::io::Error),

    /// Build metadata could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BuildError {
    /// Returns the name of the error kind, as used in failure summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            BuildError::SourceUnavailable { .. } => "SourceUnavailable",
            BuildError::TagNotFound { .. } => "TagNotFound",
            BuildError::DirtyWorkingTree { .. } => "DirtyWorkingTree",
            BuildError::CheckoutFailed { .. } => "CheckoutFailed",
            BuildError::ConfigureFailed { .. } => "ConfigureFailed",
            BuildError::CompileFailed { .. } => "CompileFailed",
            BuildError::MergeToolMissing { .. } => "MergeToolMissing",
            BuildError::NoSlicesFound { .. } => "NoSlicesFound",
            BuildError::MergeFailed { .. } => "MergeFailed",
            BuildError::NoBuildOutputs { .. } => "NoBuildOutputs",
            BuildError::InvalidArchitecture { .. } => "InvalidArchitecture",
            BuildError::UnknownFeatureOption(_) => "UnknownFeatureOption",
            BuildError::Io(_) => "Io",
            BuildError::Serialization(_) => "Serialization",
        }
    }

    /// Returns the pipeline stage the error belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            BuildError::SourceUnavailable { .. }
            | BuildError::TagNotFound { .. }
            | BuildError::DirtyWorkingTree { .. }
            | BuildError::CheckoutFailed { .. } => "checkout",
            BuildError::ConfigureFailed { .. } | BuildError::CompileFailed { .. } => "build",
            BuildError::MergeToolMissing { .. }
            | BuildError::NoSlicesFound { .. }
            | BuildError::MergeFailed { .. }
            | BuildError::NoBuildOutputs { .. } => "merge",
            BuildError::InvalidArchitecture { .. } | BuildError::UnknownFeatureOption(_) => {
                "configuration"
            }
            BuildError::Io(_) | BuildError::Serialization(_) => "filesystem",
        }
    }
}

/// Target architecture identifier.
///
/// Architectures without a dedicated variant are kept as [`Architecture::Other`]
/// so that a recipe can still build them, just without extra toolchain flags.
///
/// # Example
///
/// ```
/// use unibuild_sdk::Architecture;
///
/// assert_eq!("x86_64".parse::<Architecture>().unwrap(), Architecture::X86_64);
/// assert_eq!("i686".parse::<Architecture>().unwrap(), Architecture::I386);
/// assert_eq!(Architecture::Other("arm64".into()).as_str(), "arm64");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Architecture {
    /// 32-bit x86.
    I386,
    /// 64-bit x86.
    X86_64,
    /// Any architecture not special-cased by the recipes.
    Other(String),
}

impl Architecture {
    /// The default architecture set for universal builds.
    pub fn defaults() -> Vec<Architecture> {
        vec![Architecture::I386, Architecture::X86_64]
    }

    /// Returns the architecture name as understood by configure and lipo.
    pub fn as_str(&self) -> &str {
        match self {
            Architecture::I386 => "i386",
            Architecture::X86_64 => "x86_64",
            Architecture::Other(name) => name,
        }
    }

    /// Whether this is the 64-bit x86 architecture.
    pub fn is_arch64(&self) -> bool {
        matches!(self, Architecture::X86_64)
    }
}

impl FromStr for Architecture {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "i386" | "i686" | "x86" => Architecture::I386,
            "x86_64" | "amd64" => Architecture::X86_64,
            other => Architecture::Other(other.to_string()),
        })
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Architecture {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Build variant controlling optimization and debug info.
///
/// # Example
///
/// ```
/// use unibuild_sdk::BuildVariant;
///
/// assert_eq!(BuildVariant::Debug.as_str(), "debug");
/// assert_eq!(BuildVariant::ALL.len(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildVariant {
    /// Debug symbols, no optimizations.
    Debug,
    /// Default optimized build.
    Release,
}

impl BuildVariant {
    /// Every variant, in a stable order.
    pub const ALL: [BuildVariant; 2] = [BuildVariant::Debug, BuildVariant::Release];

    /// Returns the string representation of the variant.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildVariant::Debug => "debug",
            BuildVariant::Release => "release",
        }
    }
}

impl fmt::Display for BuildVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The install tree produced for one (variant, architecture) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    /// Variant that was built.
    pub variant: BuildVariant,
    /// Architecture that was built.
    pub architecture: Architecture,
    /// Install prefix holding `lib/`, `include/` and `bin/`.
    pub directory: PathBuf,
}

impl BuildOutput {
    /// Path of an artifact relative to this output, e.g. `lib/libavcodec.a`.
    pub fn artifact(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    /// Public headers installed for this slice.
    pub fn include_dir(&self) -> PathBuf {
        self.directory.join("include")
    }

    /// Whether the output directory holds the given artifact.
    pub fn has_artifact(&self, name: &str) -> bool {
        self.artifact(name).is_file()
    }

    /// The output directory.
    pub fn path(&self) -> &Path {
        &self.directory
    }
}

/// One architecture that did not build.
#[derive(Debug)]
pub struct ArchFailure {
    /// The architecture that failed.
    pub architecture: Architecture,
    /// Why it failed (`ConfigureFailed` or `CompileFailed` in practice).
    pub error: BuildError,
}

/// Result of building every requested architecture for a variant.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Successful outputs, sorted by architecture.
    pub outputs: Vec<BuildOutput>,
    /// Failed architectures, sorted by architecture.
    pub failures: Vec<ArchFailure>,
}

impl BuildReport {
    /// True when every requested architecture built.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Architectures that built successfully.
    pub fn architectures(&self) -> Vec<Architecture> {
        self.outputs.iter().map(|o| o.architecture.clone()).collect()
    }

    /// Finds the failure record for an architecture.
    pub fn failure_for(&self, arch: &Architecture) -> Option<&ArchFailure> {
        self.failures.iter().find(|f| &f.architecture == arch)
    }
}

/// The merged multi-architecture artifact set for a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniversalArtifact {
    /// Variant the artifact set belongs to.
    pub variant: BuildVariant,
    /// Directory holding the merged `lib/`, `bin/` and `include/` trees.
    pub directory: PathBuf,
    /// Architectures whose slices were merged, in slice order.
    pub architectures: Vec<Architecture>,
    /// Relative names of the merged artifacts, sorted.
    pub artifacts: Vec<String>,
}

impl UniversalArtifact {
    /// Absolute path of a merged artifact.
    pub fn artifact(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }
}
