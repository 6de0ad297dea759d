//! Universal static library builds for configure/make projects
//!
//! `unibuild-sdk` checks out a third-party native library at a pinned tag,
//! configures and compiles it once per target architecture, and merges the
//! per-architecture static libraries and tools into universal (fat) binaries.
//!
//! # Quick Start
//!
//! ```no_run
//! use unibuild_sdk::task::{LibraryTask, TaskOptions};
//! use unibuild_sdk::{BuildVariant, recipe::Libav};
//!
//! fn main() -> Result<(), unibuild_sdk::BuildError> {
//!     let task = LibraryTask::new(Libav::new(), "vendor", TaskOptions::default());
//!
//!     let report = task.run_variant(BuildVariant::Release)?;
//!     for failure in &report.build.failures {
//!         eprintln!("{}: {}", failure.architecture, failure.error);
//!     }
//!     if let Some(artifact) = &report.artifact {
//!         println!("universal libraries in {}", artifact.directory.display());
//!     }
//!
//!     task.clean(false)?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The SDK consists of several components:
//!
//! - **Source**: Idempotent, single-flight checkout of the pinned tag
//! - **Recipe**: Per-library architecture flags, variant flags and feature table
//! - **Features**: Typed configure feature options and their rendering
//! - **Builders**: Per-architecture configure/make, universal merge, clean
//! - **Runner**: The seam through which every external tool is invoked
//! - **Task**: The composition a front end drives

// Public modules
pub mod builders;
pub mod features;
pub mod layout;
pub mod recipe;
pub mod runner;
pub mod source;
pub mod task;
pub mod types;

// Re-export key types for convenience
pub use features::{FeatureOptions, FeatureValue, Switch};
pub use recipe::LibraryRecipe;
pub use source::{CheckoutPolicy, RepositorySpec, RevisionSource, SourceTree};
pub use task::{LibraryTask, TaskOptions, TaskReport};
pub use types::{
    ArchFailure, Architecture, BuildError, BuildOutput, BuildReport, BuildVariant,
    UniversalArtifact,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
