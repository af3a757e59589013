// SPDX-License-Identifier: GPL-3.0-or-later

//! Reading JSON compilation databases.
//!
//! The format is the LLVM JSON compilation database: an array of records
//! describing one compiler invocation each, with either a pre-split
//! `arguments` vector or a single `command` string. See the LLVM project
//! [documentation](https://clang.llvm.org/docs/JSONCompilationDatabase.html).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Represents an entry of the compilation database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// The main translation unit source processed by this step.
    pub file: PathBuf,
    /// The working directory of the compilation; `file` and relative
    /// paths in the command are interpreted against it.
    pub directory: PathBuf,
    /// The compile command argv. `arguments[0]` is the compiler.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub arguments: Vec<String>,
    /// The compile command as a single shell-escaped string. Either
    /// `arguments` or `command` is required.
    #[serde(skip_serializing_if = "String::is_empty")]
    #[serde(default)]
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl Entry {
    /// The argv of the invocation, splitting `command` when necessary.
    pub fn argv(&self) -> Result<Vec<String>, CompdbError> {
        if !self.arguments.is_empty() {
            return Ok(self.arguments.clone());
        }
        Ok(shell_words::split(&self.command)?)
    }

    /// The source file as an absolute path.
    pub fn resolved_file(&self) -> PathBuf {
        if self.file.is_absolute() {
            self.file.clone()
        } else {
            self.directory.join(&self.file)
        }
    }

    fn validate(&self) -> Result<(), CompdbError> {
        if self.arguments.is_empty() && self.command.is_empty() {
            return Err(CompdbError::MissingCommand(self.file.clone()));
        }
        if !self.directory.is_absolute() {
            return Err(CompdbError::RelativeDirectory(self.directory.clone()));
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn from_arguments_str(file: &str, arguments: Vec<&str>, directory: &str) -> Entry {
        Entry {
            file: PathBuf::from(file),
            directory: PathBuf::from(directory),
            arguments: arguments.into_iter().map(String::from).collect(),
            command: String::new(),
            output: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CompdbError {
    #[error("failed to access compilation database '{path}': {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse compilation database '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("entry for '{0}' has neither arguments nor command")]
    MissingCommand(PathBuf),
    #[error("entry directory '{0}' is not absolute")]
    RelativeDirectory(PathBuf),
    #[error("entry has an invalid command field: {0}")]
    InvalidCommand(#[from] shell_words::ParseError),
}

/// A compilation database: the entries of one platform.
#[derive(Debug, Clone, Default)]
pub struct CompilationDatabase {
    pub entries: Vec<Entry>,
}

impl CompilationDatabase {
    /// Load and validate a database, deduplicating entries with the same
    /// file (the last entry wins).
    pub fn from_file(path: &Path) -> Result<CompilationDatabase, CompdbError> {
        let metadata = fs::symlink_metadata(path).map_err(|source| CompdbError::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;
        if metadata.file_type().is_symlink() {
            return Err(CompdbError::FileAccess {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "refusing to follow symlink"),
            });
        }
        let content = fs::read_to_string(path).map_err(|source| CompdbError::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<Entry> =
            serde_json::from_str(&content).map_err(|source| CompdbError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        for entry in &entries {
            entry.validate()?;
        }
        Ok(CompilationDatabase {
            entries: deduplicate(entries),
        })
    }
}

fn deduplicate(entries: Vec<Entry>) -> Vec<Entry> {
    let mut last_index: HashMap<PathBuf, usize> = HashMap::new();
    for (index, entry) in entries.iter().enumerate() {
        last_index.insert(entry.resolved_file(), index);
    }
    entries
        .into_iter()
        .enumerate()
        .filter(|(index, entry)| last_index.get(&entry.resolved_file()) == Some(index))
        .map(|(_, entry)| entry)
        .collect()
}
