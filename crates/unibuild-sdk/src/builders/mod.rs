//! Build automation for configure/make libraries.
//!
//! This module provides the stages that turn a pinned source tree into
//! universal static libraries.
//!
//! ## Overview
//!
//! 1. **Configure and compile** - One configure/make/install per architecture
//! 2. **Merge** - Combine the architecture slices into fat binaries
//! 3. **Clean** - Remove outputs and, optionally, the source tree
//!
//! ## Builders
//!
//! | Stage | Type | Output |
//! |-------|------|--------|
//! | Build | [`BuildRunner`] | One [`BuildOutput`](crate::BuildOutput) per architecture |
//! | Merge | [`UniversalMerger`] | A [`UniversalArtifact`](crate::UniversalArtifact) per variant |
//! | Clean | [`Cleaner`] | The list of removed paths |
//!
//! ## Common Utilities
//!
//! The `common` module provides shared functionality:
//!
//! - Consistent command execution with actionable error messages
//! - Source tree validation before configure
//! - `build-meta.json` generation for merged artifacts
//!
//! ## Example
//!
//! ```no_run
//! use unibuild_sdk::builders::{BuildRunner, UniversalMerger};
//! use unibuild_sdk::layout::BuildLayout;
//! use unibuild_sdk::recipe::Libav;
//! use unibuild_sdk::runner::SystemRunner;
//! use unibuild_sdk::source::RevisionSource;
//! use unibuild_sdk::{Architecture, BuildVariant, LibraryRecipe};
//!
//! let libav = Libav::new();
//! let source = RevisionSource::new(libav.repository(), "work");
//! let layout = BuildLayout::for_recipe("work", &libav);
//!
//! let report = BuildRunner::new(&libav, &source, &layout, &SystemRunner)
//!     .parallel(true)
//!     .build(BuildVariant::Release, &Architecture::defaults())?;
//!
//! UniversalMerger::new(&libav, &layout, &SystemRunner)
//!     .merge(BuildVariant::Release, &report.outputs, false)?;
//! # Ok::<(), unibuild_sdk::BuildError>(())
//! ```

pub mod clean;
pub mod common;
pub mod configure;
pub mod universal;

// Re-export builders
pub use clean::Cleaner;
pub use common::{BUILD_META_FILE, BuildMeta};
pub use configure::BuildRunner;
pub use universal::{DEFAULT_MERGE_TOOL, UniversalMerger};
