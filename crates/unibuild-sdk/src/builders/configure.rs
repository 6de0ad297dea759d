//! Per-architecture configure/make builds
//!
//! This module runs the library's configure script and make for each
//! requested architecture, installing the static libraries, headers and tools
//! into one [`BuildOutput`] directory per (variant, architecture).

use std::fs;
use std::path::Path;
use std::thread;

use tracing::{info, warn};

use super::common::{run_step, shell_quote, validate_source_tree};
use crate::layout::BuildLayout;
use crate::recipe::LibraryRecipe;
use crate::runner::{CommandRunner, ToolCommand};
use crate::source::{RevisionSource, SourceTree};
use crate::types::{
    ArchFailure, Architecture, BuildError, BuildOutput, BuildReport, BuildVariant,
};

/// Configure/make builder that handles every architecture of a variant
pub struct BuildRunner<'a> {
    recipe: &'a dyn LibraryRecipe,
    source: &'a RevisionSource,
    layout: &'a BuildLayout,
    runner: &'a dyn CommandRunner,
    /// Build outside the source tree
    separated_build: bool,
    /// Parallel make jobs
    jobs: usize,
    /// Build architectures concurrently
    parallel: bool,
}

impl<'a> BuildRunner<'a> {
    /// Creates a new builder
    ///
    /// # Arguments
    ///
    /// * `recipe` - Library-specific flags and feature table
    /// * `source` - Single-flight checkout shared by all architectures
    /// * `layout` - Directory naming for the session
    /// * `runner` - Executes configure and make
    pub fn new(
        recipe: &'a dyn LibraryRecipe,
        source: &'a RevisionSource,
        layout: &'a BuildLayout,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self {
            recipe,
            source,
            layout,
            runner,
            separated_build: true,
            jobs: default_jobs(),
            parallel: false,
        }
    }

    /// Builds in `<output>/obj` instead of inside the source tree
    pub fn separated_build(mut self, separated_build: bool) -> Self {
        self.separated_build = separated_build;
        self
    }

    /// Sets the number of parallel make jobs
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Builds architectures concurrently. In-place builds share the source
    /// tree and always run one at a time.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Builds every architecture of a variant
    ///
    /// This performs the following steps:
    /// 1. Ensure the source tree is at the pinned tag (once per session)
    /// 2. For each architecture: configure, make, make install
    ///
    /// # Returns
    ///
    /// * `Ok(BuildReport)` with one output per architecture that built and one
    ///   failure record per architecture that did not
    /// * `Err(BuildError)` if an architecture name is invalid or the checkout
    ///   fails; no architecture is attempted
    pub fn build(
        &self,
        variant: BuildVariant,
        architectures: &[Architecture],
    ) -> Result<BuildReport, BuildError> {
        for arch in architectures {
            BuildLayout::check_architecture(arch)?;
        }
        let tree = self.source.ensure(self.runner)?;

        let mut architectures = architectures.to_vec();
        architectures.sort();
        architectures.dedup();

        info!(
            %variant,
            architectures = %join_archs(&architectures),
            separated = self.separated_build,
            "building"
        );

        let results: Vec<(Architecture, Result<BuildOutput, BuildError>)> =
            if self.parallel && self.separated_build && architectures.len() > 1 {
                thread::scope(|s| {
                    let handles: Vec<_> = architectures
                        .iter()
                        .map(|arch| {
                            let tree = &tree;
                            (arch, s.spawn(move || self.build_arch(tree, variant, arch)))
                        })
                        .collect();
                    handles
                        .into_iter()
                        .map(|(arch, handle)| {
                            let result = handle.join().unwrap_or_else(|_| {
                                Err(BuildError::CompileFailed {
                                    arch: arch.clone(),
                                    output: "build thread panicked".to_string(),
                                })
                            });
                            (arch.clone(), result)
                        })
                        .collect()
                })
            } else {
                architectures
                    .iter()
                    .map(|arch| (arch.clone(), self.build_arch(&tree, variant, arch)))
                    .collect()
            };

        let mut report = BuildReport::default();
        for (architecture, result) in results {
            match result {
                Ok(output) => {
                    info!(%variant, arch = %architecture, dir = %output.directory.display(), "build finished");
                    report.outputs.push(output);
                }
                Err(error) => {
                    warn!(%variant, arch = %architecture, kind = error.kind(), "build failed");
                    report.failures.push(ArchFailure { architecture, error });
                }
            }
        }
        Ok(report)
    }

    /// Configures, compiles and installs one architecture
    fn build_arch(
        &self,
        tree: &SourceTree,
        variant: BuildVariant,
        arch: &Architecture,
    ) -> Result<BuildOutput, BuildError> {
        validate_source_tree(tree).map_err(|output| BuildError::ConfigureFailed {
            arch: arch.clone(),
            output,
        })?;

        let output_dir = self.layout.output_dir(variant, arch);
        fs::create_dir_all(&output_dir)?;

        let build_dir = if self.separated_build {
            let dir = self.layout.object_dir(variant, arch);
            fs::create_dir_all(&dir)?;
            dir
        } else {
            self.reset_in_place_tree(tree);
            tree.path.clone()
        };

        self.configure(tree, &build_dir, &output_dir, variant, arch)?;

        let make = ToolCommand::new("make")
            .arg(format!("-j{}", self.jobs))
            .current_dir(&build_dir);
        run_step(self.runner, &make, &format!("make ({})", arch)).map_err(|output| {
            BuildError::CompileFailed {
                arch: arch.clone(),
                output,
            }
        })?;

        let install = ToolCommand::new("make")
            .arg("install")
            .current_dir(&build_dir);
        run_step(self.runner, &install, &format!("make install ({})", arch)).map_err(
            |output| BuildError::CompileFailed {
                arch: arch.clone(),
                output,
            },
        )?;

        Ok(BuildOutput {
            variant,
            architecture: arch.clone(),
            directory: output_dir,
        })
    }

    /// Runs the configure script through `sh`, since arch flags carry shell quoting
    fn configure(
        &self,
        tree: &SourceTree,
        build_dir: &Path,
        output_dir: &Path,
        variant: BuildVariant,
        arch: &Architecture,
    ) -> Result<(), BuildError> {
        let flags = self.recipe.configure_line(arch, variant);
        let script = format!(
            "{} --prefix={} {}",
            shell_quote(&tree.configure_script().display().to_string()),
            shell_quote(&output_dir.display().to_string()),
            flags
        );
        info!(%variant, %arch, flags = %flags, "configuring");

        let cmd = ToolCommand::new("sh")
            .arg("-c")
            .arg(script.trim_end())
            .current_dir(build_dir);
        run_step(self.runner, &cmd, &format!("configure ({})", arch)).map_err(|output| {
            BuildError::ConfigureFailed {
                arch: arch.clone(),
                output,
            }
        })?;
        Ok(())
    }

    /// Drops the previous architecture's configuration from an in-place tree.
    fn reset_in_place_tree(&self, tree: &SourceTree) {
        let cmd = ToolCommand::new("make")
            .arg("distclean")
            .current_dir(&tree.path);
        // A fresh tree has nothing to clean and make reports an error.
        let _ = run_step(self.runner, &cmd, "make distclean");
    }
}

fn default_jobs() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn join_archs(architectures: &[Architecture]) -> String {
    architectures
        .iter()
        .map(Architecture::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
