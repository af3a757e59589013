// SPDX-License-Identifier: GPL-3.0-or-later

//! The analysis orchestrator.
//!
//! Wires the pieces together: loads each platform's compilation
//! database, emulates the compiler commands into translation-unit
//! configurations, and drives one platform walk per (platform,
//! translation unit) pair. Trees are built once per file and shared
//! across all walks; macro state is private to each walk.

use crate::codebase::{canonical, CodeBase};
use crate::compdb::CompilationDatabase;
use crate::compilers::{
    emulate, CompilerConfigError, CompilerRegistry, FortranForm, TranslationUnit,
};
use crate::config::{self, ConfigError};
use crate::preprocessor::directive::macro_from_definition_string;
use crate::preprocessor::MacroTable;
use crate::source::Language;
use crate::tree::mapper::TreeCache;
use crate::tree::{PlatformWalker, SetMap};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    CompilerConfig(#[from] CompilerConfigError),
}

/// One platform of the analysis: a name and the translation units its
/// compilation database describes.
pub struct PlatformInstance {
    pub name: String,
    pub units: Vec<TranslationUnit>,
}

/// A fully configured analysis, ready to run.
pub struct Analysis {
    pub codebase: CodeBase,
    pub platforms: Vec<PlatformInstance>,
}

impl Analysis {
    /// Resolve the analysis configuration against the root directory:
    /// check the platform filter, load the compilation databases, and
    /// emulate every build command.
    ///
    /// A database that fails to load aborts only its own platform; the
    /// run fails when no platform remains.
    pub fn configure(
        root: &Path,
        analysis: &config::Analysis,
        selected: &[String],
        extra_excludes: &[String],
    ) -> Result<Analysis, AnalysisError> {
        for name in selected {
            if !analysis.platform.contains_key(name) {
                return Err(ConfigError::UnknownPlatform(name.clone()).into());
            }
        }

        let mut excludes = analysis.codebase.exclude.clone();
        excludes.extend(extra_excludes.iter().cloned());
        let codebase = CodeBase::new(root, &excludes);
        let registry = CompilerRegistry::with_user_config(codebase.root())?;

        let mut platforms = Vec::new();
        for (name, platform) in &analysis.platform {
            if !selected.is_empty() && !selected.contains(name) {
                continue;
            }
            let db_path = if platform.commands.is_absolute() {
                platform.commands.clone()
            } else {
                codebase.root().join(&platform.commands)
            };
            let database = match CompilationDatabase::from_file(&db_path) {
                Ok(database) => database,
                Err(error) => {
                    log::error!("skipping platform '{name}': {error}");
                    continue;
                }
            };
            let units = resolve_units(&registry, &database, name);
            platforms.push(PlatformInstance {
                name: name.clone(),
                units,
            });
        }

        if platforms.is_empty() {
            return Err(ConfigError::NoPlatforms.into());
        }
        Ok(Analysis {
            codebase,
            platforms,
        })
    }

    pub fn platform_names(&self) -> Vec<String> {
        self.platforms.iter().map(|p| p.name.clone()).collect()
    }

    /// Run every platform walk and collect the line attribution map.
    pub fn run(&self) -> SetMap {
        let mut cache = TreeCache::new();
        let mut setmap = SetMap::new();

        for platform in &self.platforms {
            log::info!(
                "mapping platform '{}' ({} translation units)",
                platform.name,
                platform.units.len()
            );
            for unit in &platform.units {
                self.walk_unit(platform, unit, &mut cache, &mut setmap);
            }
        }
        setmap
    }

    fn walk_unit(
        &self,
        platform: &PlatformInstance,
        unit: &TranslationUnit,
        cache: &mut TreeCache,
        setmap: &mut SetMap,
    ) {
        let mut language = Language::from_path(&unit.file);
        if language.is_fortran() {
            match unit.fortran_form {
                Some(FortranForm::Fixed) => language = Language::FortranFixed,
                Some(FortranForm::Free) => language = Language::FortranFree,
                None => {}
            }
        }
        let openmp = unit.modes.contains("openmp");

        let mut table = MacroTable::new();
        for definition in &unit.defines {
            match macro_from_definition_string(definition) {
                Ok(def) => table.define(def),
                Err(error) => log::warn!("bad definition '{definition}': {error}"),
            }
        }
        for name in &unit.undefines {
            table.undef(name);
        }

        let mut walker = PlatformWalker::new(
            &platform.name,
            table,
            cache,
            setmap,
            &self.codebase,
            unit.include_paths.clone(),
            language,
            openmp,
        );

        // Forced includes run before the translation unit itself; their
        // macro effects carry into the unit's walk.
        for include in &unit.include_files {
            if include.is_file() {
                walker.walk_file(include);
            } else {
                log::warn!(
                    "forced include '{}' not found for '{}'",
                    include.display(),
                    unit.file.display()
                );
            }
        }
        walker.walk_file(&unit.file);
    }
}

/// Resolve a database outside of a named platform context. Used by the
/// coverage tool, which treats the whole database as one platform.
pub fn units_from_database(
    registry: &CompilerRegistry,
    database: &CompilationDatabase,
) -> Vec<TranslationUnit> {
    resolve_units(registry, database, "cli")
}

/// Turn database entries into translation units: emulate the command,
/// key by the entry's file, and drop entries the analysis cannot use.
fn resolve_units(
    registry: &CompilerRegistry,
    database: &CompilationDatabase,
    platform: &str,
) -> Vec<TranslationUnit> {
    let mut units = Vec::new();
    for entry in &database.entries {
        let argv = match entry.argv() {
            Ok(argv) => argv,
            Err(error) => {
                log::warn!("skipping entry '{}': {error}", entry.file.display());
                continue;
            }
        };
        if argv.is_empty() {
            continue;
        }
        let mut unit = emulate(registry, &argv, &entry.directory);
        unit.file = canonical(&entry.resolved_file());

        if Language::from_path(&unit.file) == Language::Unknown {
            log::debug!(
                "entry '{}' is not a recognised source file; ignoring it",
                unit.file.display()
            );
            continue;
        }
        if !unit.file.is_file() {
            log::warn!(
                "couldn't find file '{}' for platform '{platform}'; ignoring it",
                unit.file.display()
            );
            continue;
        }
        units.push(unit);
    }
    units
}
