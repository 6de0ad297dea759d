//! Checkout, build, merge and clean composed for one library
//!
//! [`LibraryTask`] is what a front end drives: one call per user-visible
//! operation, each returning enough detail to report which architectures or
//! stages failed.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::builders::{BuildRunner, Cleaner, DEFAULT_MERGE_TOOL, UniversalMerger};
use crate::layout::BuildLayout;
use crate::recipe::LibraryRecipe;
use crate::runner::{CommandRunner, SystemRunner};
use crate::source::{CheckoutPolicy, RevisionSource, SourceTree};
use crate::types::{Architecture, BuildError, BuildReport, BuildVariant, UniversalArtifact};

/// Session-wide build settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOptions {
    /// Architectures built for every variant.
    pub architectures: Vec<Architecture>,
    /// Build outside the source tree.
    pub separated_build: bool,
    /// Build architectures concurrently.
    pub parallel: bool,
    /// Parallel make jobs; `None` uses every available core.
    pub jobs: Option<usize>,
    /// Universal-binary merge tool.
    pub merge_tool: String,
    pub checkout: CheckoutPolicy,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            architectures: Architecture::defaults(),
            separated_build: true,
            parallel: false,
            jobs: None,
            merge_tool: DEFAULT_MERGE_TOOL.to_string(),
            checkout: CheckoutPolicy::default(),
        }
    }
}

/// Outcome of building and merging one variant.
#[derive(Debug)]
pub struct TaskReport {
    pub variant: BuildVariant,
    /// Per-architecture results.
    pub build: BuildReport,
    /// The merged artifact set, if the merge ran and succeeded.
    pub artifact: Option<UniversalArtifact>,
    /// Why no merged artifact set was produced.
    pub merge_error: Option<BuildError>,
}

impl TaskReport {
    /// True only when every architecture built and the merge succeeded.
    pub fn is_success(&self) -> bool {
        self.build.is_complete() && self.artifact.is_some()
    }
}

/// A library build session rooted in one work directory.
///
/// # Example
///
/// ```no_run
/// use unibuild_sdk::task::{LibraryTask, TaskOptions};
/// use unibuild_sdk::{BuildVariant, recipe::Libav};
///
/// let task = LibraryTask::new(Libav::new(), "work", TaskOptions::default());
/// let report = task.run_variant(BuildVariant::Release)?;
/// if !report.is_success() {
///     std::process::exit(1);
/// }
/// # Ok::<(), unibuild_sdk::BuildError>(())
/// ```
pub struct LibraryTask {
    recipe: Box<dyn LibraryRecipe>,
    runner: Arc<dyn CommandRunner>,
    source: RevisionSource,
    layout: BuildLayout,
    options: TaskOptions,
}

impl LibraryTask {
    /// Creates a task that runs the real tools
    pub fn new(
        recipe: impl LibraryRecipe + 'static,
        work_dir: impl Into<PathBuf>,
        options: TaskOptions,
    ) -> Self {
        let work_dir = work_dir.into();
        let source = RevisionSource::new(recipe.repository(), &work_dir).policy(options.checkout);
        let layout = BuildLayout::for_recipe(&work_dir, &recipe);
        Self {
            recipe: Box::new(recipe),
            runner: Arc::new(SystemRunner),
            source,
            layout,
            options,
        }
    }

    /// Replaces the command runner
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn recipe(&self) -> &dyn LibraryRecipe {
        self.recipe.as_ref()
    }

    pub fn layout(&self) -> &BuildLayout {
        &self.layout
    }

    pub fn options(&self) -> &TaskOptions {
        &self.options
    }

    /// Checks out the pinned tag (once per task).
    pub fn checkout(&self) -> Result<SourceTree, BuildError> {
        self.source.ensure(self.runner.as_ref())
    }

    /// Checks out, builds every architecture and merges what built.
    ///
    /// Checkout errors and invalid architecture names are returned as `Err`.
    /// Architecture and merge failures are recorded in the report so that
    /// completed outputs stay usable.
    pub fn run_variant(&self, variant: BuildVariant) -> Result<TaskReport, BuildError> {
        for arch in &self.options.architectures {
            BuildLayout::check_architecture(arch)?;
        }
        let tree = self.checkout()?;

        let mut builder = BuildRunner::new(
            self.recipe.as_ref(),
            &self.source,
            &self.layout,
            self.runner.as_ref(),
        )
        .separated_build(self.options.separated_build)
        .parallel(self.options.parallel);
        if let Some(jobs) = self.options.jobs {
            builder = builder.jobs(jobs);
        }
        let build = builder.build(variant, &self.options.architectures)?;

        let (artifact, merge_error) = if build.outputs.is_empty() {
            (None, Some(BuildError::NoBuildOutputs { variant }))
        } else {
            let merged = UniversalMerger::new(self.recipe.as_ref(), &self.layout, self.runner.as_ref())
                .tool(&self.options.merge_tool)
                .revision(&tree.commit)
                .merge(variant, &build.outputs, false);
            match merged {
                Ok(artifact) => (Some(artifact), None),
                Err(err) => (None, Some(err)),
            }
        };

        if let Some(err) = &merge_error {
            warn!(%variant, kind = err.kind(), "no universal artifacts");
        }
        info!(
            %variant,
            built = build.outputs.len(),
            failed = build.failures.len(),
            merged = artifact.is_some(),
            "variant finished"
        );

        Ok(TaskReport {
            variant,
            build,
            artifact,
            merge_error,
        })
    }

    /// Removes build outputs, and the source tree when `remove_source` is set.
    pub fn clean(&self, remove_source: bool) -> Result<Vec<PathBuf>, BuildError> {
        Cleaner::new(&self.layout).clean(remove_source)
    }
}
