//! Removal of generated build state

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::layout::BuildLayout;
use crate::types::{BuildError, BuildVariant};

/// Removes build outputs, merged artifacts and optionally the source tree
pub struct Cleaner<'a> {
    layout: &'a BuildLayout,
}

impl<'a> Cleaner<'a> {
    pub fn new(layout: &'a BuildLayout) -> Self {
        Self { layout }
    }

    /// Removes every per-architecture and universal directory of both
    /// variants, the build root if that leaves it empty, and the source tree
    /// when `remove_source` is set.
    ///
    /// Calling this on a clean work directory is a no-op.
    ///
    /// # Returns
    ///
    /// The removed paths, in removal order.
    pub fn clean(&self, remove_source: bool) -> Result<Vec<PathBuf>, BuildError> {
        let mut removed = Vec::new();
        let build_root = self.layout.build_root();

        if build_root.is_dir() {
            let mut entries = fs::read_dir(&build_root)?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<Result<Vec<_>, _>>()?;
            entries.sort();

            for path in entries {
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let owned = BuildVariant::ALL
                    .iter()
                    .any(|variant| BuildLayout::is_variant_entry(name, *variant));
                if owned && remove_path(&path)? {
                    removed.push(path);
                }
            }

            if fs::read_dir(&build_root)?.next().is_none() {
                fs::remove_dir(&build_root)?;
                removed.push(build_root);
            }
        }

        if remove_source {
            let source = self.layout.source_dir();
            if remove_path(&source)? {
                removed.push(source);
            }
        }

        for path in &removed {
            info!(path = %path.display(), "removed");
        }
        Ok(removed)
    }
}

/// Removes a file or directory tree; `Ok(false)` if it did not exist.
fn remove_path(path: &Path) -> Result<bool, BuildError> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
