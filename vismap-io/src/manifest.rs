//! Join manifests and file naming conventions.
//!
//! A manifest is a JSON array of `{ "entry": <u64>, "filepath": <string> }`
//! objects. `//` line comments and `/* */` block comments are allowed
//! outside of strings.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Suffix inserted before the extension of a manifest path to name its shard.
pub const SHARD_SUFFIX: &str = "_vtree";

/// Suffix inserted before the extension of an event stream to name its store.
pub const OUTPUT_SUFFIX: &str = "_ntuple";

/// Output path of a join when none is given.
pub const DEFAULT_JOIN_OUTPUT: &str = "vis_map.vmap";

/// One record to copy into the joined output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub entry: u64,
    pub filepath: PathBuf,
}

impl ManifestEntry {
    #[must_use]
    pub fn new(filepath: impl Into<PathBuf>, entry: u64) -> Self {
        Self {
            entry,
            filepath: filepath.into(),
        }
    }

    /// Path of the shard that holds this entry.
    #[must_use]
    pub fn shard_path(&self) -> PathBuf {
        shard_path(&self.filepath)
    }
}

/// Ordered list of entries driving a join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Loads a manifest file.
    ///
    /// # Errors
    /// Returns [`Error::FatalInput`] if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::fatal(path, e))?;
        Self::from_json(&text).map_err(|e| Error::fatal(path, e))
    }

    /// Parses manifest text.
    ///
    /// # Errors
    /// Returns [`Error::Json`] if the text is not a valid manifest.
    pub fn from_json(text: &str) -> Result<Self> {
        let entries = serde_json::from_str(&strip_comments(text))?;
        Ok(Self { entries })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Removes `//` and `/* */` comments that sit outside string literals.
///
/// Comments are replaced by a single space (line comments keep their
/// newline) so token boundaries survive.
#[must_use]
pub fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        let next = chars.peek().copied();
        match (c, next) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

/// `<dir>/<stem>.<ext>` becomes `<dir>/<stem>_vtree.<ext>`.
#[must_use]
pub fn shard_path(path: &Path) -> PathBuf {
    with_suffix(path, SHARD_SUFFIX)
}

/// `<stem>.<ext>` becomes `<stem>_ntuple.<ext>`.
#[must_use]
pub fn default_output_path(input: &Path) -> PathBuf {
    with_suffix(input, OUTPUT_SUFFIX)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let Some(stem) = path.file_stem() else {
        let mut name = path.as_os_str().to_os_string();
        name.push(suffix);
        return PathBuf::from(name);
    };
    let mut name = OsString::from(stem);
    name.push(suffix);
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}
