//! Library recipes
//!
//! A [`LibraryRecipe`] carries everything that is specific to one third-party
//! library: where its source lives, how each architecture selects a
//! toolchain, which flags a variant adds, and which optional components are
//! compiled in. The pipeline itself is library-agnostic.

use crate::features::{FeatureOptions, FeatureValue, Switch};
use crate::source::RepositorySpec;
use crate::types::{Architecture, BuildVariant};

/// Per-library build knowledge consumed by the pipeline.
pub trait LibraryRecipe: Send + Sync {
    /// Short library name, used for the build root directory.
    fn name(&self) -> &str;

    /// Upstream repository and pinned tag.
    fn repository(&self) -> RepositorySpec;

    /// Toolchain flags for an architecture.
    ///
    /// Architectures the recipe does not know get no extra flags.
    fn flags_for(&self, arch: &Architecture) -> String;

    /// Variant-specific configure fragment (debug symbols, optimization).
    fn configure_flags(&self, variant: BuildVariant) -> String;

    /// Optional components compiled in for a variant.
    fn feature_options(&self, variant: BuildVariant) -> FeatureOptions;

    /// Artifacts, relative to an install prefix, the merge must produce.
    fn expected_artifacts(&self) -> Vec<String>;

    /// Full configure argument string for one (architecture, variant) pair.
    ///
    /// Fragments are joined by single spaces; empty fragments are skipped.
    fn configure_line(&self, arch: &Architecture, variant: BuildVariant) -> String {
        let fragments = [
            self.flags_for(arch),
            self.configure_flags(variant),
            self.feature_options(variant).render(),
        ];
        fragments
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Recipe for libav, built as static libraries plus the `avconv` tool with a
/// small image/audio codec subset.
///
/// # Example
///
/// ```
/// use unibuild_sdk::{Architecture, BuildVariant, LibraryRecipe, recipe::Libav};
///
/// let libav = Libav::new();
/// assert_eq!(libav.repository().pinned_tag, "v9.7");
/// let line = libav.configure_line(&Architecture::X86_64, BuildVariant::Debug);
/// assert!(line.starts_with("--arch=x86_64 --cc=clang --enable-debug=3"));
/// ```
#[derive(Debug, Clone)]
pub struct Libav {
    repository: RepositorySpec,
    overrides: FeatureOptions,
}

impl Default for Libav {
    fn default() -> Self {
        Self {
            repository: RepositorySpec::new("git://git.libav.org/libav.git", "libav-src", "v9.7"),
            overrides: FeatureOptions::new(),
        }
    }
}

impl Libav {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the upstream location or pinned tag.
    pub fn with_repository(mut self, repository: RepositorySpec) -> Self {
        self.repository = repository;
        self
    }

    /// Feature options applied on top of the built-in table.
    pub fn with_feature_overrides(mut self, overrides: FeatureOptions) -> Self {
        self.overrides = overrides;
        self
    }

    fn base_options() -> FeatureOptions {
        use FeatureValue::Toggle;
        FeatureOptions::from_table([
            ("shared", Toggle(Switch::Disable)),
            ("static", Toggle(Switch::Enable)),
            ("avconv", Toggle(Switch::Enable)),
            ("avplay", Toggle(Switch::Disable)),
            ("avprobe", Toggle(Switch::Disable)),
            ("avserver", Toggle(Switch::Disable)),
            ("network", Toggle(Switch::Disable)),
            ("bzlib", Toggle(Switch::Disable)),
            ("zlib", Toggle(Switch::Enable)),
            ("libfreetype", Toggle(Switch::Disable)),
            ("libopenjpeg", Toggle(Switch::Disable)),
            ("everything", Toggle(Switch::Disable)),
            ("decoder", FeatureValue::enable(["bmp", "png", "pcm_s16le"])),
            (
                "encoder",
                FeatureValue::enable(["bmp", "png", "pcm_s16le", "utvideo"]),
            ),
            ("demuxer", FeatureValue::enable(["wav"])),
            ("muxer", FeatureValue::enable(["avi", "mov"])),
            ("protocol", FeatureValue::enable(["file"])),
        ])
    }
}

impl LibraryRecipe for Libav {
    fn name(&self) -> &str {
        "libav"
    }

    fn repository(&self) -> RepositorySpec {
        self.repository.clone()
    }

    fn flags_for(&self, arch: &Architecture) -> String {
        match arch {
            Architecture::I386 => "--arch=i386 --cc='clang -m32'".to_string(),
            Architecture::X86_64 => "--arch=x86_64 --cc=clang".to_string(),
            Architecture::Other(_) => String::new(),
        }
    }

    fn configure_flags(&self, variant: BuildVariant) -> String {
        match variant {
            BuildVariant::Debug => "--enable-debug=3 --disable-optimizations".to_string(),
            BuildVariant::Release => String::new(),
        }
    }

    // Same table for both variants.
    fn feature_options(&self, _variant: BuildVariant) -> FeatureOptions {
        let mut options = Self::base_options();
        options.merge(&self.overrides);
        options
    }

    fn expected_artifacts(&self) -> Vec<String> {
        [
            "lib/libavcodec.a",
            "lib/libavformat.a",
            "lib/libavutil.a",
            "lib/libswscale.a",
            "bin/avconv",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::KNOWN_OPTIONS;

    #[test]
    fn test_base_options_are_valid() {
        let options = Libav::base_options();
        assert_eq!(options.len(), 17);
        for (key, _) in options.iter() {
            assert!(KNOWN_OPTIONS.contains(&key), "{}", key);
        }
        assert_eq!(Libav::new().feature_options(BuildVariant::Release), options);
    }

    #[test]
    fn test_arch_flags() {
        let libav = Libav::new();
        assert_eq!(
            libav.flags_for(&Architecture::I386),
            "--arch=i386 --cc='clang -m32'"
        );
        assert_eq!(
            libav.flags_for(&Architecture::X86_64),
            "--arch=x86_64 --cc=clang"
        );
        assert_eq!(libav.flags_for(&Architecture::Other("ppc".into())), "");
    }

    #[test]
    fn test_feature_options_identical_across_variants() {
        let libav = Libav::new();
        assert_eq!(
            libav.feature_options(BuildVariant::Debug),
            libav.feature_options(BuildVariant::Release)
        );
    }

    #[test]
    fn test_release_line() {
        let line = Libav::new().configure_line(&Architecture::I386, BuildVariant::Release);
        assert_eq!(
            line,
            "--arch=i386 --cc='clang -m32' --disable-shared --enable-static --enable-avconv \
             --disable-avplay --disable-avprobe --disable-avserver --disable-network \
             --disable-bzlib --enable-zlib --disable-libfreetype --disable-libopenjpeg \
             --disable-everything --enable-decoder=bmp --enable-decoder=png \
             --enable-decoder=pcm_s16le --enable-encoder=bmp --enable-encoder=png \
             --enable-encoder=pcm_s16le --enable-encoder=utvideo --enable-demuxer=wav \
             --enable-muxer=avi --enable-muxer=mov --enable-protocol=file"
        );
    }

    #[test]
    fn test_configure_line_is_deterministic() {
        let libav = Libav::new();
        for arch in [
            Architecture::I386,
            Architecture::X86_64,
            Architecture::Other("arm64".into()),
        ] {
            for variant in BuildVariant::ALL {
                assert_eq!(
                    libav.configure_line(&arch, variant),
                    libav.configure_line(&arch, variant)
                );
            }
        }
    }

    #[test]
    fn test_unknown_arch_skips_empty_fragment() {
        let line = Libav::new()
            .configure_line(&Architecture::Other("arm64".into()), BuildVariant::Debug);
        assert!(line.starts_with("--enable-debug=3 --disable-optimizations --disable-shared"));
    }

    #[test]
    fn test_overrides_apply() {
        let overrides = FeatureOptions::new()
            .with("protocol", FeatureValue::enable(["file", "pipe"]))
            .unwrap();
        let libav = Libav::new().with_feature_overrides(overrides);
        let line = libav.configure_line(&Architecture::X86_64, BuildVariant::Release);
        assert!(line.ends_with("--enable-protocol=file --enable-protocol=pipe"));
    }
}
