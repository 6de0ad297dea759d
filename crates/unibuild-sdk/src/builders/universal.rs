//! Universal (multi-architecture) artifact assembly
//!
//! This module combines the per-architecture [`BuildOutput`] trees of a
//! variant into one directory in which every static library and tool is a
//! fat binary holding one slice per architecture.
//!
//! The merged tree is assembled in a staging directory and renamed into
//! place only when every artifact merged, so a failed merge never leaves a
//! half-written universal directory behind.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::common::{BuildMeta, copy_dir_recursive, run_step, write_build_meta};
use crate::layout::BuildLayout;
use crate::recipe::LibraryRecipe;
use crate::runner::{CommandRunner, ToolCommand};
use crate::types::{Architecture, BuildError, BuildOutput, BuildVariant, UniversalArtifact};

/// Default universal-binary merge tool.
pub const DEFAULT_MERGE_TOOL: &str = "lipo";

/// Directories of an install prefix whose files are merged slice by slice.
const MERGED_DIRS: [&str; 2] = ["lib", "bin"];

/// Merges per-architecture outputs into a [`UniversalArtifact`]
pub struct UniversalMerger<'a> {
    recipe: &'a dyn LibraryRecipe,
    layout: &'a BuildLayout,
    runner: &'a dyn CommandRunner,
    /// Merge tool name or path
    tool: String,
    /// Commit recorded in the build metadata
    commit: Option<String>,
}

impl<'a> UniversalMerger<'a> {
    /// Creates a merger that uses `lipo`
    pub fn new(
        recipe: &'a dyn LibraryRecipe,
        layout: &'a BuildLayout,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self {
            recipe,
            layout,
            runner,
            tool: DEFAULT_MERGE_TOOL.to_string(),
            commit: None,
        }
    }

    /// Uses a different merge tool (e.g. `llvm-lipo`)
    pub fn tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Records the commit the outputs were built from
    pub fn revision(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    /// Merges the outputs of one variant
    ///
    /// Whatever outputs are given are merged, even if fewer than the full
    /// architecture set. With `unless_arch64_only`, a lone x86_64 output is
    /// copied as-is instead of going through the merge tool.
    ///
    /// # Returns
    ///
    /// * `Ok(UniversalArtifact)` describing the merged directory
    /// * `Err(BuildError)` if there is nothing to merge, an architecture name
    ///   is invalid, the merge tool is missing, an expected artifact has no slice, or the tool fails
    pub fn merge(
        &self,
        variant: BuildVariant,
        outputs: &[BuildOutput],
        unless_arch64_only: bool,
    ) -> Result<UniversalArtifact, BuildError> {
        let mut outputs = outputs.to_vec();
        outputs.sort_by(|a, b| a.architecture.cmp(&b.architecture));
        outputs.dedup_by(|a, b| a.architecture == b.architecture);
        if outputs.is_empty() {
            return Err(BuildError::NoBuildOutputs { variant });
        }
        for output in &outputs {
            BuildLayout::check_architecture(&output.architecture)?;
        }

        let copy_only =
            unless_arch64_only && outputs.len() == 1 && outputs[0].architecture.is_arch64();
        let tool = if copy_only {
            None
        } else {
            let path = self
                .runner
                .locate(&self.tool)
                .ok_or_else(|| BuildError::MergeToolMissing {
                    tool: self.tool.clone(),
                })?;
            Some(path)
        };

        let architectures: Vec<Architecture> =
            outputs.iter().map(|o| o.architecture.clone()).collect();
        let artifacts = self.artifact_names(&outputs)?;
        info!(
            %variant,
            slices = outputs.len(),
            artifacts = artifacts.len(),
            copy_only,
            "merging universal artifacts"
        );

        let staging = self.layout.staging_dir(variant);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        let assembled = self.assemble(
            &staging,
            variant,
            &outputs,
            &architectures,
            &artifacts,
            tool.as_deref(),
        );
        if let Err(err) = assembled {
            // Best effort; the merge error is what the caller needs.
            let _ = fs::remove_dir_all(&staging);
            return Err(err);
        }

        let directory = self.layout.universal_dir(variant);
        if directory.exists() {
            fs::remove_dir_all(&directory)?;
        }
        fs::rename(&staging, &directory)?;
        info!(%variant, dir = %directory.display(), "universal artifacts ready");

        Ok(UniversalArtifact {
            variant,
            directory,
            architectures,
            artifacts,
        })
    }

    /// Expected names plus every `lib/` and `bin/` file of any slice, sorted.
    fn artifact_names(&self, outputs: &[BuildOutput]) -> Result<Vec<String>, BuildError> {
        let mut names: BTreeSet<String> = self.recipe.expected_artifacts().into_iter().collect();
        for output in outputs {
            for dir in MERGED_DIRS {
                let path = output.directory.join(dir);
                if !path.is_dir() {
                    continue;
                }
                for entry in fs::read_dir(&path)? {
                    let entry = entry?;
                    if entry.file_type()?.is_file() {
                        names.insert(format!("{}/{}", dir, entry.file_name().to_string_lossy()));
                    }
                }
            }
        }
        Ok(names.into_iter().collect())
    }

    fn assemble(
        &self,
        staging: &Path,
        variant: BuildVariant,
        outputs: &[BuildOutput],
        architectures: &[Architecture],
        artifacts: &[String],
        tool: Option<&Path>,
    ) -> Result<(), BuildError> {
        for name in artifacts {
            let slices: Vec<PathBuf> = outputs
                .iter()
                .filter(|o| o.has_artifact(name))
                .map(|o| o.artifact(name))
                .collect();
            if slices.is_empty() {
                return Err(BuildError::NoSlicesFound {
                    artifact: name.clone(),
                });
            }

            let dest = staging.join(name);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }

            match tool {
                Some(tool) => self.merge_slices(tool, name, &slices, &dest)?,
                None => {
                    debug!(artifact = %name, "copying single slice");
                    fs::copy(&slices[0], &dest)?;
                }
            }
        }

        // Headers are architecture independent.
        let include = outputs[0].include_dir();
        if include.is_dir() {
            copy_dir_recursive(&include, &staging.join("include"))?;
        }

        let repository = self.recipe.repository();
        let mut meta = BuildMeta::new(
            self.recipe.name(),
            &repository.pinned_tag,
            variant,
            architectures.to_vec(),
            artifacts.to_vec(),
        );
        meta.commit = self.commit.clone();
        meta.merge_tool = tool.map(|_| self.tool.clone());
        write_build_meta(staging, &meta)?;
        Ok(())
    }

    fn merge_slices(
        &self,
        tool: &Path,
        name: &str,
        slices: &[PathBuf],
        dest: &Path,
    ) -> Result<(), BuildError> {
        let mut cmd = ToolCommand::new(tool.display().to_string()).arg("-create");
        for slice in slices {
            cmd = cmd.path_arg(slice);
        }
        let cmd = cmd.arg("-output").path_arg(dest);

        run_step(self.runner, &cmd, &format!("merge {}", name)).map_err(|output| {
            BuildError::MergeFailed {
                artifact: name.to_string(),
                output,
            }
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::common::BUILD_META_FILE;
    use crate::recipe::Libav;
    use crate::runner::fake::{FakeRunner, LIBS};
    use tempfile::TempDir;

    /// Writes a fake install tree for one architecture.
    fn install(layout: &BuildLayout, variant: BuildVariant, arch: Architecture) -> BuildOutput {
        let dir = layout.output_dir(variant, &arch);
        fs::create_dir_all(dir.join("lib")).unwrap();
        fs::create_dir_all(dir.join("bin")).unwrap();
        fs::create_dir_all(dir.join("include/libavutil")).unwrap();
        for lib in LIBS {
            fs::write(dir.join("lib").join(lib), format!("{}:{}", arch, lib)).unwrap();
        }
        fs::write(dir.join("bin/avconv"), format!("{}:avconv", arch)).unwrap();
        fs::write(dir.join("include/libavutil/avutil.h"), "// avutil\n").unwrap();
        BuildOutput {
            variant,
            architecture: arch,
            directory: dir,
        }
    }

    fn setup() -> (TempDir, Libav, BuildLayout, FakeRunner) {
        let temp = TempDir::new().unwrap();
        let recipe = Libav::new();
        let layout = BuildLayout::for_recipe(temp.path(), &recipe);
        (temp, recipe, layout, FakeRunner::default())
    }

    #[test]
    fn test_merges_every_artifact() {
        let (_temp, recipe, layout, runner) = setup();
        let outputs = vec![
            install(&layout, BuildVariant::Release, Architecture::X86_64),
            install(&layout, BuildVariant::Release, Architecture::I386),
        ];

        let artifact = UniversalMerger::new(&recipe, &layout, &runner)
            .revision("c0ffee")
            .merge(BuildVariant::Release, &outputs, false)
            .unwrap();

        assert_eq!(artifact.directory, layout.universal_dir(BuildVariant::Release));
        assert_eq!(
            artifact.architectures,
            vec![Architecture::I386, Architecture::X86_64]
        );
        assert_eq!(artifact.artifacts, recipe_names(&recipe));
        assert_eq!(
            fs::read_to_string(artifact.artifact("lib/libavcodec.a")).unwrap(),
            "i386:libavcodec.a|x86_64:libavcodec.a"
        );
        assert_eq!(
            fs::read_to_string(artifact.artifact("bin/avconv")).unwrap(),
            "i386:avconv|x86_64:avconv"
        );
        assert!(artifact.artifact("include/libavutil/avutil.h").is_file());
        assert!(!layout.staging_dir(BuildVariant::Release).exists());

        let meta = fs::read_to_string(artifact.artifact(BUILD_META_FILE)).unwrap();
        let meta: serde_json::Value = serde_json::from_str(&meta).unwrap();
        assert_eq!(meta["commit"], "c0ffee");
        assert_eq!(meta["tag"], "v9.7");
        assert_eq!(meta["merge_tool"], "lipo");
        assert_eq!(meta["architectures"][1], "x86_64");
    }

    fn recipe_names(recipe: &Libav) -> Vec<String> {
        let mut names = recipe.expected_artifacts();
        names.sort();
        names
    }

    #[test]
    fn test_merge_is_deterministic() {
        let (_temp, recipe, layout, runner) = setup();
        let outputs = vec![
            install(&layout, BuildVariant::Debug, Architecture::I386),
            install(&layout, BuildVariant::Debug, Architecture::X86_64),
        ];
        let merger = UniversalMerger::new(&recipe, &layout, &runner);

        let first = merger.merge(BuildVariant::Debug, &outputs, false).unwrap();
        let first_lib = fs::read(first.artifact("lib/libswscale.a")).unwrap();
        let reversed: Vec<_> = outputs.iter().rev().cloned().collect();
        let second = merger.merge(BuildVariant::Debug, &reversed, false).unwrap();

        assert_eq!(first, second);
        assert_eq!(fs::read(second.artifact("lib/libswscale.a")).unwrap(), first_lib);
    }

    #[test]
    fn test_partial_architecture_set_is_merged() {
        let (_temp, recipe, layout, runner) = setup();
        let outputs = vec![install(&layout, BuildVariant::Release, Architecture::X86_64)];

        let artifact = UniversalMerger::new(&recipe, &layout, &runner)
            .merge(BuildVariant::Release, &outputs, false)
            .unwrap();
        assert_eq!(artifact.architectures, vec![Architecture::X86_64]);
        assert_eq!(
            fs::read_to_string(artifact.artifact("lib/libavutil.a")).unwrap(),
            "x86_64:libavutil.a"
        );
        assert_eq!(runner.count_calls("/usr/bin/lipo -create"), 5);
    }

    #[test]
    fn test_arch64_only_is_copied() {
        let (_temp, recipe, layout, runner) = setup();
        runner.remove_tool("lipo");
        let outputs = vec![install(&layout, BuildVariant::Release, Architecture::X86_64)];

        let artifact = UniversalMerger::new(&recipe, &layout, &runner)
            .merge(BuildVariant::Release, &outputs, true)
            .unwrap();
        assert!(runner.calls().is_empty());
        assert_eq!(
            fs::read_to_string(artifact.artifact("bin/avconv")).unwrap(),
            "x86_64:avconv"
        );
        let meta = fs::read_to_string(artifact.artifact(BUILD_META_FILE)).unwrap();
        assert!(!meta.contains("merge_tool"));
    }

    #[test]
    fn test_missing_merge_tool() {
        let (_temp, recipe, layout, runner) = setup();
        runner.remove_tool("lipo");
        let outputs = vec![
            install(&layout, BuildVariant::Release, Architecture::I386),
            install(&layout, BuildVariant::Release, Architecture::X86_64),
        ];

        let err = UniversalMerger::new(&recipe, &layout, &runner)
            .merge(BuildVariant::Release, &outputs, true)
            .unwrap_err();
        assert!(matches!(err, BuildError::MergeToolMissing { ref tool } if tool == "lipo"));
        assert!(!layout.universal_dir(BuildVariant::Release).exists());
    }

    #[test]
    fn test_custom_tool_is_located() {
        let (_temp, recipe, layout, runner) = setup();
        let outputs = vec![install(&layout, BuildVariant::Debug, Architecture::I386)];
        let err = UniversalMerger::new(&recipe, &layout, &runner)
            .tool("llvm-lipo")
            .merge(BuildVariant::Debug, &outputs, false)
            .unwrap_err();
        // The fake only simulates `lipo`, so the located tool fails to start.
        assert_eq!(err.kind(), "MergeFailed");
        assert!(!layout.staging_dir(BuildVariant::Debug).exists());
    }

    #[test]
    fn test_no_slices_leaves_nothing_behind() {
        let (_temp, recipe, layout, runner) = setup();
        let output = install(&layout, BuildVariant::Debug, Architecture::I386);
        fs::remove_file(output.artifact("bin/avconv")).unwrap();

        let universal = layout.universal_dir(BuildVariant::Debug);
        fs::create_dir_all(&universal).unwrap();
        fs::write(universal.join("previous"), "kept").unwrap();

        let err = UniversalMerger::new(&recipe, &layout, &runner)
            .merge(BuildVariant::Debug, &[output], false)
            .unwrap_err();
        assert!(matches!(err, BuildError::NoSlicesFound { ref artifact } if artifact == "bin/avconv"));
        assert!(!layout.staging_dir(BuildVariant::Debug).exists());
        assert!(universal.join("previous").is_file());
    }

    #[test]
    fn test_reserved_architecture_output_is_not_replaced() {
        let (_temp, recipe, layout, runner) = setup();
        let reserved = install(
            &layout,
            BuildVariant::Release,
            Architecture::Other("universal".into()),
        );
        let outputs = vec![
            install(&layout, BuildVariant::Release, Architecture::X86_64),
            reserved.clone(),
        ];

        let err = UniversalMerger::new(&recipe, &layout, &runner)
            .merge(BuildVariant::Release, &outputs, false)
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidArchitecture");
        assert_eq!(
            fs::read_to_string(reserved.artifact("lib/libavcodec.a")).unwrap(),
            "universal:libavcodec.a"
        );
    }

    #[test]
    fn test_no_outputs() {
        let (_temp, recipe, layout, runner) = setup();
        let err = UniversalMerger::new(&recipe, &layout, &runner)
            .merge(BuildVariant::Release, &[], false)
            .unwrap_err();
        assert_eq!(err.kind(), "NoBuildOutputs");
    }

    #[test]
    fn test_extra_artifacts_are_merged() {
        let (_temp, recipe, layout, runner) = setup();
        let outputs = vec![
            install(&layout, BuildVariant::Release, Architecture::I386),
            install(&layout, BuildVariant::Release, Architecture::X86_64),
        ];
        for output in &outputs {
            fs::write(output.artifact("lib/libavresample.a"), output.architecture.as_str())
                .unwrap();
        }

        let artifact = UniversalMerger::new(&recipe, &layout, &runner)
            .merge(BuildVariant::Release, &outputs, false)
            .unwrap();
        assert!(artifact.artifacts.contains(&"lib/libavresample.a".to_string()));
        assert_eq!(
            fs::read_to_string(artifact.artifact("lib/libavresample.a")).unwrap(),
            "i386|x86_64"
        );
    }
}
