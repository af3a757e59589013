// SPDX-License-Identifier: GPL-3.0-or-later

//! This module defines the analysis configuration of the application.
//!
//! The analysis file is TOML. It names the platforms to analyse and,
//! for each, the compilation database that records how that platform
//! builds the code base:
//!
//! ```toml
//! [codebase]
//! exclude = ["third-party/", "*.inc"]
//!
//! [platform.cpu]
//! commands = "cpu/compile_commands.json"
//!
//! [platform.gpu]
//! commands = "gpu/compile_commands.json"
//! ```

// Re-Export the types and the loader module content.
pub use loader::{ConfigError, Loader};
pub use types::*;

mod types {
    use serde::Deserialize;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    /// Represents the analysis file contents.
    #[derive(Debug, Default, PartialEq, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct Analysis {
        #[serde(default)]
        pub codebase: Codebase,
        #[serde(default)]
        pub platform: BTreeMap<String, Platform>,
    }

    /// The `[codebase]` table: patterns excluded from attribution.
    #[derive(Debug, Default, PartialEq, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct Codebase {
        #[serde(default)]
        pub exclude: Vec<String>,
    }

    /// One `[platform.NAME]` table.
    #[derive(Debug, PartialEq, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct Platform {
        /// Path of the platform's JSON compilation database, relative
        /// to the analysis root unless absolute.
        pub commands: PathBuf,
    }
}

pub mod loader {
    use super::Analysis;
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};
    use thiserror::Error;

    pub struct Loader {}

    impl Loader {
        /// Loads the analysis file after checking its extension. The
        /// file must not be a symlink; analysis inputs are opened
        /// without following links.
        pub fn load(path: &Path) -> Result<Analysis, ConfigError> {
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                return Err(ConfigError::NotToml(path.to_path_buf()));
            }
            let metadata =
                fs::symlink_metadata(path).map_err(|source| ConfigError::FileAccess {
                    path: path.to_path_buf(),
                    source,
                })?;
            if metadata.file_type().is_symlink() {
                return Err(ConfigError::FileAccess {
                    path: path.to_path_buf(),
                    source: io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "refusing to follow symlink",
                    ),
                });
            }
            let content = fs::read_to_string(path).map_err(|source| ConfigError::FileAccess {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
        }

        /// Define the deserialization format of the analysis file.
        pub fn from_str(content: &str) -> Result<Analysis, toml::de::Error> {
            toml::from_str(content)
        }
    }

    /// Represents all possible configuration-related errors.
    #[derive(Debug, Error)]
    pub enum ConfigError {
        #[error("analysis file '{0}' must end in .toml")]
        NotToml(PathBuf),
        #[error("failed to access analysis file '{path}': {source}")]
        FileAccess {
            path: PathBuf,
            #[source]
            source: io::Error,
        },
        #[error("failed to parse analysis file '{path}': {source}")]
        Parse {
            path: PathBuf,
            #[source]
            source: toml::de::Error,
        },
        #[error("platform '{0}' requested on the command line does not exist in the analysis file")]
        UnknownPlatform(String),
        #[error("the analysis file defines no usable platforms")]
        NoPlatforms,
    }

}
