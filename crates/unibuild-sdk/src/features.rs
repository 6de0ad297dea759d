//! Configure feature options.
//!
//! A [`FeatureOptions`] table selects which optional components of the
//! library are compiled in. Each entry is keyed by a configure option name
//! from a fixed table ([`KNOWN_OPTIONS`]) and carries a [`FeatureValue`]:
//!
//! | Value | Rendered as |
//! |-------|-------------|
//! | `Toggle(Enable)` | `--enable-<key>` |
//! | `Toggle(Disable)` | `--disable-<key>` |
//! | `EnableList([a, b])` | `--enable-<key>=a --enable-<key>=b` |
//! | `DisableList([a])` | `--disable-<key>=a` |
//!
//! Entries render in insertion order, so logged configure lines are
//! reproducible and `--disable-everything` stays ahead of the component
//! enables that follow it.

use crate::types::BuildError;

/// Configure option names a feature table may use.
pub const KNOWN_OPTIONS: &[&str] = &[
    "shared",
    "static",
    "avconv",
    "avplay",
    "avprobe",
    "avserver",
    "network",
    "bzlib",
    "zlib",
    "libfreetype",
    "libopenjpeg",
    "everything",
    "debug",
    "optimizations",
    "decoder",
    "encoder",
    "demuxer",
    "muxer",
    "parser",
    "protocol",
    "bsf",
    "filter",
    "indev",
    "outdev",
];

/// Direction of a boolean configure option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Switch {
    Enable,
    Disable,
}

impl Switch {
    fn verb(self) -> &'static str {
        match self {
            Switch::Enable => "enable",
            Switch::Disable => "disable",
        }
    }
}

/// Value of one feature option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureValue {
    /// A single `--enable-<key>` / `--disable-<key>` flag.
    Toggle(Switch),
    /// Components to enable, one flag each.
    EnableList(Vec<String>),
    /// Components to disable, one flag each.
    DisableList(Vec<String>),
}

impl FeatureValue {
    /// Convenience constructor for an enable list.
    pub fn enable<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FeatureValue::EnableList(names.into_iter().map(Into::into).collect())
    }

    /// Convenience constructor for a disable list.
    pub fn disable<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FeatureValue::DisableList(names.into_iter().map(Into::into).collect())
    }

    fn render_into(&self, key: &str, flags: &mut Vec<String>) {
        match self {
            FeatureValue::Toggle(switch) => flags.push(format!("--{}-{}", switch.verb(), key)),
            FeatureValue::EnableList(names) => {
                flags.extend(names.iter().map(|n| format!("--enable-{}={}", key, n)))
            }
            FeatureValue::DisableList(names) => {
                flags.extend(names.iter().map(|n| format!("--disable-{}={}", key, n)))
            }
        }
    }
}

/// Ordered table of feature options keyed by known configure option names.
///
/// # Example
///
/// ```
/// use unibuild_sdk::features::{FeatureOptions, FeatureValue, Switch};
///
/// let mut options = FeatureOptions::new();
/// options.set("everything", FeatureValue::Toggle(Switch::Disable))?;
/// options.set("decoder", FeatureValue::enable(["png", "bmp"]))?;
/// assert_eq!(
///     options.render(),
///     "--disable-everything --enable-decoder=png --enable-decoder=bmp"
/// );
///
/// assert!(options.set("teleport", FeatureValue::Toggle(Switch::Enable)).is_err());
/// # Ok::<(), unibuild_sdk::BuildError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureOptions {
    entries: Vec<(String, FeatureValue)>,
}

impl FeatureOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an option, replacing an existing value for the same key in place.
    ///
    /// Fails with [`BuildError::UnknownFeatureOption`] for keys outside
    /// [`KNOWN_OPTIONS`].
    pub fn set(&mut self, key: &str, value: FeatureValue) -> Result<(), BuildError> {
        if !KNOWN_OPTIONS.contains(&key) {
            return Err(BuildError::UnknownFeatureOption(key.to_string()));
        }
        self.merge_entry(key, value);
        Ok(())
    }

    /// Builds a table from a recipe's built-in entries, in order.
    ///
    /// Keys are not checked against [`KNOWN_OPTIONS`]; recipes test their
    /// own tables.
    pub(crate) fn from_table<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, FeatureValue)>,
    {
        let mut options = Self::new();
        for (key, value) in entries {
            options.merge_entry(key, value);
        }
        options
    }

    fn merge_entry(&mut self, key: &str, value: FeatureValue) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    /// Builder-style [`FeatureOptions::set`].
    pub fn with(mut self, key: &str, value: FeatureValue) -> Result<Self, BuildError> {
        self.set(key, value)?;
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&FeatureValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Applies `overrides` on top of this table.
    ///
    /// Keys already present keep their position; new keys are appended.
    pub fn merge(&mut self, overrides: &FeatureOptions) {
        for (key, value) in &overrides.entries {
            self.merge_entry(key, value.clone());
        }
    }

    /// Renders the table as individual configure arguments.
    pub fn to_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        for (key, value) in &self.entries {
            value.render_into(key, &mut flags);
        }
        flags
    }

    /// Renders the table as one space-separated configure fragment.
    pub fn render(&self) -> String {
        self.to_flags().join(" ")
    }
}
