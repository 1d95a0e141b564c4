// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! LOFAR-style parameter sets ("parsets").
//!
//! A parset is a flat list of `dotted.key = value` lines. Values are kept as
//! text and only typed when they are read, which is also how the LOFAR tools
//! consuming these files treat them. A [`Parset`] is never mutated in place;
//! [`Parset::subset`] and [`Parset::patch`] hand back new instances. Every
//! external tool that takes a parset gets a file written by
//! [`Parset::materialize`], which is deleted when it is dropped.

mod error;
#[cfg(test)]
mod tests;

pub use error::ParsetError;

use std::{
    fmt::Display,
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
};

use indexmap::IndexMap;
use log::trace;
use tempfile::TempPath;

/// A type that can be read out of a parset value.
pub trait ParsetValue: Sized {
    /// A human-readable name for error messages.
    fn type_name() -> &'static str;

    /// Parse the (trimmed) textual value. `None` means the text is not a valid
    /// value of this type.
    fn parse_value(s: &str) -> Option<Self>;
}

impl ParsetValue for String {
    fn type_name() -> &'static str {
        "string"
    }

    fn parse_value(s: &str) -> Option<Self> {
        Some(unquote(s).to_string())
    }
}

impl ParsetValue for PathBuf {
    fn type_name() -> &'static str {
        "path"
    }

    fn parse_value(s: &str) -> Option<Self> {
        let s = unquote(s);
        if s.is_empty() {
            None
        } else {
            Some(PathBuf::from(s))
        }
    }
}

impl ParsetValue for bool {
    fn type_name() -> &'static str {
        "bool"
    }

    fn parse_value(s: &str) -> Option<Self> {
        match unquote(s).to_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "0" => Some(false),
            _ => None,
        }
    }
}

macro_rules! impl_parset_value_from_str {
    ($t:ty, $name:expr) => {
        impl ParsetValue for $t {
            fn type_name() -> &'static str {
                $name
            }

            fn parse_value(s: &str) -> Option<Self> {
                <$t>::from_str(unquote(s)).ok()
            }
        }
    };
}

impl_parset_value_from_str!(i64, "integer");
impl_parset_value_from_str!(usize, "unsigned integer");
impl_parset_value_from_str!(f64, "float");

impl<T: ParsetValue> ParsetValue for Vec<T> {
    fn type_name() -> &'static str {
        "vector"
    }

    fn parse_value(s: &str) -> Option<Self> {
        let inner = s.trim().strip_prefix('[')?.strip_suffix(']')?.trim();
        if inner.is_empty() {
            return Some(vec![]);
        }
        inner.split(',').map(|e| T::parse_value(e.trim())).collect()
    }
}

/// Strip one level of matching single or double quotes.
fn unquote(s: &str) -> &str {
    let s = s.trim();
    for q in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(q).and_then(|s| s.strip_suffix(q)) {
            return inner;
        }
    }
    s
}

/// Remove a trailing `#` comment, ignoring any `#` inside quotes.
fn strip_comment(line: &str) -> &str {
    let mut in_quote = None;
    for (i, c) in line.char_indices() {
        match (c, in_quote) {
            ('"' | '\'', None) => in_quote = Some(c),
            (c, Some(q)) if c == q => in_quote = None,
            ('#', None) => return &line[..i],
            _ => (),
        }
    }
    line
}

/// Format a list of values the way LOFAR tools expect a vector.
pub fn format_vector<T: Display>(values: &[T]) -> String {
    let mut s = String::from("[");
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            s.push_str(", ");
        }
        s.push_str(&v.to_string());
    }
    s.push(']');
    s
}

/// An immutable, ordered collection of parset keys and values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parset {
    entries: IndexMap<String, String>,
}

impl Parset {
    /// Read a parset from a file.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Parset, ParsetError> {
        let path = path.as_ref();
        trace!("Reading parset {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, file: &Path) -> Result<Parset, ParsetError> {
        let mut entries = IndexMap::new();
        for (i_line, line) in text.lines().enumerate() {
            let text = strip_comment(line).trim();
            if text.is_empty() {
                continue;
            }
            match text.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    // Later definitions override earlier ones.
                    entries.insert(key.trim().to_string(), value.trim().to_string());
                }
                _ => {
                    return Err(ParsetError::Parse {
                        file: file.to_path_buf(),
                        line: i_line + 1,
                        text: text.to_string(),
                    })
                }
            }
        }
        Ok(Parset { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Get the raw text of a value.
    pub fn get_raw(&self, key: &str) -> Result<&str, ParsetError> {
        self.entries
            .get(key)
            .map(|v| v.as_str())
            .ok_or_else(|| ParsetError::MissingKey {
                key: key.to_string(),
            })
    }

    /// Get a typed value.
    pub fn get<T: ParsetValue>(&self, key: &str) -> Result<T, ParsetError> {
        let raw = self.get_raw(key)?;
        T::parse_value(raw).ok_or_else(|| ParsetError::Type {
            key: key.to_string(),
            value: raw.to_string(),
            expected: T::type_name(),
        })
    }

    /// Get a typed vector value. Shorthand for `get::<Vec<T>>`.
    pub fn get_vector<T: ParsetValue>(&self, key: &str) -> Result<Vec<T>, ParsetError> {
        self.get::<Vec<T>>(key)
    }

    /// Get a typed value, or `None` if it's absent. Malformed values are still
    /// an error.
    pub fn get_opt<T: ParsetValue>(&self, key: &str) -> Result<Option<T>, ParsetError> {
        match self.get(key) {
            Ok(v) => Ok(Some(v)),
            Err(ParsetError::MissingKey { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Get a typed value, falling back to `default` if it's absent.
    pub fn get_or<T: ParsetValue>(&self, key: &str, default: T) -> Result<T, ParsetError> {
        Ok(self.get_opt(key)?.unwrap_or(default))
    }

    /// Get a path. Any `{cwd}` in the value is replaced with the current
    /// working directory.
    pub fn get_path(&self, key: &str) -> Result<PathBuf, ParsetError> {
        let raw: String = self.get(key)?;
        if raw.contains("{cwd}") {
            let cwd = std::env::current_dir()?;
            Ok(PathBuf::from(raw.replace("{cwd}", &cwd.display().to_string())))
        } else {
            Ok(PathBuf::from(raw))
        }
    }

    /// All keys under `prefix.`, with the prefix stripped. A prefix matching
    /// nothing gives an empty parset.
    pub fn subset(&self, prefix: &str) -> Parset {
        let prefix = format!("{}.", prefix.trim_end_matches('.'));
        Parset {
            entries: self
                .entries
                .iter()
                .filter_map(|(k, v)| {
                    k.strip_prefix(&prefix)
                        .filter(|k| !k.is_empty())
                        .map(|k| (k.to_string(), v.clone()))
                })
                .collect(),
        }
    }

    /// A new parset with the given keys replaced (or added, if they weren't
    /// present).
    pub fn patch<I, K, V>(&self, overrides: I) -> Parset
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let mut entries = self.entries.clone();
        for (k, v) in overrides {
            entries.insert(k.into(), v.to_string());
        }
        Parset { entries }
    }

    /// Write this parset to a new uniquely-named file inside `dir`. The file is
    /// removed when the returned [`ParsetFile`] is dropped.
    pub fn materialize<P: AsRef<Path>>(&self, dir: P) -> Result<ParsetFile, ParsetError> {
        let mut file = tempfile::Builder::new()
            .prefix("parset.")
            .tempfile_in(dir)?;
        write!(file, "{self}")?;
        file.flush()?;
        let path = file.into_temp_path();
        trace!("Wrote parset {}", path.display());
        Ok(ParsetFile { path })
    }

    /// [`Parset::patch`] followed by [`Parset::materialize`].
    pub fn patched_file<P, I, K, V>(&self, dir: P, overrides: I) -> Result<ParsetFile, ParsetError>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.patch(overrides).materialize(dir)
    }
}

impl FromStr for Parset {
    type Err = ParsetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, Path::new("<string>"))
    }
}

impl Display for Parset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (k, v) in &self.entries {
            writeln!(f, "{k} = {v}")?;
        }
        Ok(())
    }
}

/// A parset written to disk for an external tool. The file is deleted on drop
/// unless [`ParsetFile::retain`] is called.
#[derive(Debug)]
pub struct ParsetFile {
    path: TempPath,
}

impl ParsetFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the file on disk and return its path.
    pub fn retain(self) -> Result<PathBuf, ParsetError> {
        Ok(self.path.keep()?)
    }
}

impl AsRef<Path> for ParsetFile {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}
