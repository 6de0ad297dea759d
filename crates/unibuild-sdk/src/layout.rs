//! On-disk layout of a build session.
//!
//! ```text
//! <work>/
//! ├── libav-src/                    checked-out source tree
//! └── libav-build/                  build root
//!     ├── debug-i386/               BuildOutput (install prefix)
//!     │   ├── obj/                  object tree for separated builds
//!     │   ├── lib/  include/  bin/
//!     ├── debug-x86_64/
//!     ├── debug-universal/          UniversalArtifact
//!     └── release-…
//! ```
//!
//! Every (variant, architecture) pair maps to its own directory. Architecture
//! names are restricted by [`BuildLayout::check_architecture`] so that no
//! architecture directory can alias the merged or staging directory.

use std::path::{Path, PathBuf};

use crate::recipe::LibraryRecipe;
use crate::types::{Architecture, BuildError, BuildVariant};

const UNIVERSAL: &str = "universal";
const STAGING_SUFFIX: &str = ".partial";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayout {
    work_dir: PathBuf,
    source_dir_name: String,
    build_root_name: String,
}

impl BuildLayout {
    pub fn new(
        work_dir: impl Into<PathBuf>,
        source_dir_name: impl Into<String>,
        build_root_name: impl Into<String>,
    ) -> Self {
        Self {
            work_dir: work_dir.into(),
            source_dir_name: source_dir_name.into(),
            build_root_name: build_root_name.into(),
        }
    }

    /// Layout for a recipe: `<work>/<checkout dir>` and `<work>/<name>-build`.
    pub fn for_recipe(work_dir: impl Into<PathBuf>, recipe: &dyn LibraryRecipe) -> Self {
        Self::new(
            work_dir,
            recipe.repository().local_directory_name,
            format!("{}-build", recipe.name()),
        )
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn source_dir(&self) -> PathBuf {
        self.work_dir.join(&self.source_dir_name)
    }

    pub fn build_root(&self) -> PathBuf {
        self.work_dir.join(&self.build_root_name)
    }

    /// Install prefix of one architecture's build.
    pub fn output_dir(&self, variant: BuildVariant, arch: &Architecture) -> PathBuf {
        self.build_root().join(format!("{}-{}", variant, arch))
    }

    /// Object tree of a separated build.
    pub fn object_dir(&self, variant: BuildVariant, arch: &Architecture) -> PathBuf {
        self.output_dir(variant, arch).join("obj")
    }

    pub fn universal_dir(&self, variant: BuildVariant) -> PathBuf {
        self.build_root().join(format!("{}-{}", variant, UNIVERSAL))
    }

    /// Where a merge is assembled before it replaces [`Self::universal_dir`].
    pub fn staging_dir(&self, variant: BuildVariant) -> PathBuf {
        self.build_root()
            .join(format!("{}-{}{}", variant, UNIVERSAL, STAGING_SUFFIX))
    }

    /// Rejects architecture names whose output directory would collide with
    /// the merged or staging directory, or escape the build root.
    ///
    /// Names are limited to ASCII letters, digits and `_`, and must not be
    /// `universal`.
    pub fn check_architecture(arch: &Architecture) -> Result<(), BuildError> {
        let name = arch.as_str();
        let reason = if name.is_empty() {
            Some("the name is empty")
        } else if name == UNIVERSAL {
            Some("the name is reserved for merged artifacts")
        } else if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            Some("only ASCII letters, digits and '_' are allowed")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(BuildError::InvalidArchitecture {
                name: name.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Whether a build-root entry belongs to the given variant.
    pub fn is_variant_entry(name: &str, variant: BuildVariant) -> bool {
        name.strip_prefix(variant.as_str())
            .is_some_and(|rest| rest.starts_with('-'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::Libav;

    #[test]
    fn test_recipe_layout() {
        let layout = BuildLayout::for_recipe("/work", &Libav::new());
        assert_eq!(layout.source_dir(), PathBuf::from("/work/libav-src"));
        assert_eq!(layout.build_root(), PathBuf::from("/work/libav-build"));
        assert_eq!(
            layout.output_dir(BuildVariant::Debug, &Architecture::I386),
            PathBuf::from("/work/libav-build/debug-i386")
        );
        assert_eq!(
            layout.object_dir(BuildVariant::Release, &Architecture::X86_64),
            PathBuf::from("/work/libav-build/release-x86_64/obj")
        );
        assert_eq!(
            layout.universal_dir(BuildVariant::Release),
            PathBuf::from("/work/libav-build/release-universal")
        );
    }

    #[test]
    fn test_directories_are_distinct() {
        let layout = BuildLayout::new("/w", "src", "build");
        let mut dirs = Vec::new();
        for variant in BuildVariant::ALL {
            for arch in Architecture::defaults() {
                dirs.push(layout.output_dir(variant, &arch));
            }
            dirs.push(layout.universal_dir(variant));
            dirs.push(layout.staging_dir(variant));
        }
        let count = dirs.len();
        dirs.sort();
        dirs.dedup();
        assert_eq!(dirs.len(), count);
    }

    #[test]
    fn test_reserved_architecture_names_rejected() {
        let layout = BuildLayout::new("/w", "src", "build");
        for name in ["universal", "universal.partial", "", "../x", "arm 64"] {
            let arch = Architecture::Other(name.to_string());
            let err = BuildLayout::check_architecture(&arch).unwrap_err();
            assert_eq!(err.kind(), "InvalidArchitecture", "{}", name);
        }
        for arch in [
            Architecture::I386,
            Architecture::X86_64,
            Architecture::Other("arm64".into()),
        ] {
            BuildLayout::check_architecture(&arch).unwrap();
            for variant in BuildVariant::ALL {
                let dir = layout.output_dir(variant, &arch);
                assert_ne!(dir, layout.universal_dir(variant));
                assert_ne!(dir, layout.staging_dir(variant));
            }
        }
    }

    #[test]
    fn test_variant_entry_matching() {
        assert!(BuildLayout::is_variant_entry("debug-i386", BuildVariant::Debug));
        assert!(BuildLayout::is_variant_entry(
            "release-universal.partial",
            BuildVariant::Release
        ));
        assert!(!BuildLayout::is_variant_entry("debugger", BuildVariant::Debug));
        assert!(!BuildLayout::is_variant_entry("release-x86_64", BuildVariant::Debug));
    }
}
