//! Common utilities shared by the configure builder and the universal merger.
//!
//! This module provides helper functions that are used by both
//! [`super::BuildRunner`] and [`super::UniversalMerger`] to ensure consistent
//! behavior and error handling.
//!
//! ## Error Messages
//!
//! Failures of external tools are reported with:
//! - The command line that failed
//! - Its exit status
//! - Captured stdout and stderr

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

use crate::runner::{CommandOutput, CommandRunner, ToolCommand};
use crate::source::SourceTree;
use crate::types::{Architecture, BuildError, BuildVariant};

/// File name of the metadata written next to merged artifacts.
pub const BUILD_META_FILE: &str = "build-meta.json";

/// Runs an external command, turning a spawn failure or non-zero exit into a
/// printable report.
///
/// # Arguments
/// * `runner` - Runner executing the command
/// * `cmd` - The command to execute
/// * `description` - Human-readable description of what the command does
///
/// # Returns
/// The captured output on success, or the failure report as `Err`. Callers
/// wrap the report in the error kind of their stage.
pub fn run_step(
    runner: &dyn CommandRunner,
    cmd: &ToolCommand,
    description: &str,
) -> Result<CommandOutput, String> {
    debug!(command = %cmd, "{}", description);
    let output = runner.run(cmd).map_err(|e| {
        format!(
            "Failed to start {}.\n\n\
             Command: {}\n\
             Error: {}\n\n\
             Ensure the tool is installed and available on PATH.",
            description, cmd, e
        )
    })?;

    if !output.success {
        return Err(format!(
            "{} failed.\n\nCommand: {}\n{}",
            description,
            cmd,
            output.combined()
        ));
    }
    Ok(output)
}

/// Quotes a value for inclusion in a `sh -c` script.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Checks that a source tree can be configured.
///
/// # Returns
/// `Ok(())` if the configure script exists, or the failure report.
pub fn validate_source_tree(tree: &SourceTree) -> Result<(), String> {
    if !tree.path.is_dir() {
        return Err(format!(
            "Source tree does not exist: {}\n\n\
             Run the checkout step first.",
            tree.path.display()
        ));
    }
    let configure = tree.configure_script();
    if !configure.is_file() {
        return Err(format!(
            "No configure script found at {}\n\n\
             The checkout at tag {} does not look like a configure/make project.",
            configure.display(),
            tree.tag
        ));
    }
    Ok(())
}

/// Recursively copies a directory
pub fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<(), BuildError> {
    fs::create_dir_all(dest)?;

    let mut entries = fs::read_dir(src)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let dest_path = dest.join(entry.file_name());

        if path.is_dir() {
            copy_dir_recursive(&path, &dest_path)?;
        } else {
            fs::copy(&path, &dest_path)?;
        }
    }

    Ok(())
}

/// Build metadata for artifact correlation and traceability.
///
/// Written as `build-meta.json` into every universal artifact directory.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BuildMeta {
    /// Library name from the recipe
    pub library: String,
    /// Pinned tag that was built
    pub tag: String,
    /// Commit the tag resolved to (if known)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    pub variant: BuildVariant,
    /// Architectures whose slices were merged
    pub architectures: Vec<Architecture>,
    /// Merged artifact names, relative to the artifact directory
    pub artifacts: Vec<String>,
    /// Merge tool, absent when the single 64-bit slice was copied as-is
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_tool: Option<String>,
    /// Build timestamp in RFC3339 format
    pub build_time: String,
    /// Build timestamp as Unix epoch seconds
    pub build_time_unix: i64,
    pub unibuild_version: String,
    /// Host OS (e.g., "macos", "linux")
    pub host_os: String,
}

impl BuildMeta {
    /// Creates metadata stamped with the current time and host.
    pub fn new(
        library: &str,
        tag: &str,
        variant: BuildVariant,
        architectures: Vec<Architecture>,
        artifacts: Vec<String>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        let build_time = now
            .format(&Rfc3339)
            .unwrap_or_else(|_| now.unix_timestamp().to_string());

        Self {
            library: library.to_string(),
            tag: tag.to_string(),
            commit: None,
            variant,
            architectures,
            artifacts,
            merge_tool: None,
            build_time,
            build_time_unix: now.unix_timestamp(),
            unibuild_version: env!("CARGO_PKG_VERSION").to_string(),
            host_os: env::consts::OS.to_string(),
        }
    }
}

/// Writes `build-meta.json` into `dir`.
pub fn write_build_meta(dir: &Path, meta: &BuildMeta) -> Result<PathBuf, BuildError> {
    let json = serde_json::to_string_pretty(meta)?;
    let path = dir.join(BUILD_META_FILE);
    fs::write(&path, json)?;
    Ok(path)
}
