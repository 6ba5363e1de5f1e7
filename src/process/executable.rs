/*!
 * Executable Descriptor
 * Immutable description of a program to run: binary, arguments, environment
 */

use crate::core::errors::ProcessResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Program to run in a child process
///
/// `arguments` excludes the binary itself. The child receives exactly
/// `environment`, nothing is inherited unless [`Executable::inherit_env`]
/// copied it in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Executable {
    pub binary: PathBuf,
    pub arguments: Vec<String>,
    pub environment: BTreeMap<String, String>,
}

impl Executable {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ..Self::default()
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.arguments.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set one environment variable (later values replace earlier ones)
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Copy the calling process's environment into this descriptor
    ///
    /// Variables already set on the descriptor win. Non-UTF-8 entries are
    /// skipped.
    pub fn inherit_env(mut self) -> Self {
        for (key, value) in std::env::vars_os() {
            if let (Ok(key), Ok(value)) = (key.into_string(), value.into_string()) {
                self.environment.entry(key).or_insert(value);
            }
        }
        self
    }

    /// True for the default (empty) descriptor
    pub fn is_empty(&self) -> bool {
        self.binary.as_os_str().is_empty()
            && self.arguments.is_empty()
            && self.environment.is_empty()
    }

    /// Find `name` among the direct entries of `directory`
    ///
    /// Returns an executable for the first entry whose file name equals
    /// `name` (no recursion, no arguments, empty environment), or the empty
    /// executable if nothing matches.
    pub fn find_in(name: &str, directory: impl AsRef<Path>) -> ProcessResult<Self> {
        for entry in std::fs::read_dir(directory.as_ref())? {
            let entry = entry?;
            if entry.file_name() == name {
                return Ok(Self::new(entry.path()));
            }
        }
        Ok(Self::default())
    }
}
