// SPDX-License-Identifier: GPL-3.0-or-later

//! The compiler-argument emulator.
//!
//! Given a build command for a translation unit, the emulator decides
//! which macros are predefined, which directories are searched for
//! includes, and which files are force-included. Per-compiler
//! specifications describe the recognised flags; unknown compilers and
//! unknown flags degrade gracefully so any command line can be
//! analysed.
//!
//! Specifications ship with the tool (see `defaults`) and can be
//! extended through `$ROOT/.cbi/config`:
//!
//! ```toml
//! [compiler.mycc]
//! alias_of = "gnu"
//!
//! [compiler.fancycc]
//! options = ["-fopenmp"]
//!
//! [[compiler.fancycc.parser]]
//! flags = ["--offload"]
//! action = "append_const"
//! dest = "modes"
//! const = "offload"
//!
//! [[compiler.fancycc.modes]]
//! name = "offload"
//! defines = ["__OFFLOAD__"]
//! ```

mod defaults;
pub mod rules;

pub use rules::{Action, Buckets, ParserRule};

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extra macros, paths and files contributed by an active mode.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModeSpec {
    pub name: String,
    #[serde(default)]
    pub defines: Vec<String>,
    #[serde(default)]
    pub include_paths: Vec<String>,
    #[serde(default)]
    pub include_files: Vec<String>,
}

/// Like a mode, but gated on a set of active modes. Used for implicit
/// device passes such as SYCL's spir64.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PassSpec {
    pub name: String,
    #[serde(default)]
    pub modes: Vec<String>,
    #[serde(default)]
    pub defines: Vec<String>,
    #[serde(default)]
    pub include_paths: Vec<String>,
    #[serde(default)]
    pub include_files: Vec<String>,
}

/// The specification for one compiler, or an alias to another.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompilerSpec {
    #[serde(default)]
    pub alias_of: Option<String>,
    /// Arguments injected in front of the real command line.
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub parser: Vec<ParserRule>,
    #[serde(default)]
    pub modes: Vec<ModeSpec>,
    #[serde(default)]
    pub passes: Vec<PassSpec>,
    /// Overrides extension-based Fortran form detection for sources
    /// compiled by this compiler: `"fixed"` or `"free"`.
    #[serde(default)]
    pub fortran_form: Option<FortranForm>,
}

/// Fortran source form forced by a compiler specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FortranForm {
    Fixed,
    Free,
}

impl CompilerSpec {
    pub fn alias(target: &str) -> CompilerSpec {
        CompilerSpec {
            alias_of: Some(target.to_string()),
            ..CompilerSpec::default()
        }
    }
}

/// On-disk shape of `.cbi/config`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct UserConfig {
    #[serde(default)]
    compiler: BTreeMap<String, CompilerSpec>,
}

#[derive(Debug, Error)]
pub enum CompilerConfigError {
    #[error("failed to read compiler configuration '{path}': {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse compiler configuration '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// The known compiler specifications, shipped defaults plus user
/// overrides.
#[derive(Debug)]
pub struct CompilerRegistry {
    specs: BTreeMap<String, CompilerSpec>,
}

impl Default for CompilerRegistry {
    fn default() -> Self {
        CompilerRegistry {
            specs: defaults::builtin_specs(),
        }
    }
}

impl CompilerRegistry {
    pub fn new() -> CompilerRegistry {
        CompilerRegistry::default()
    }

    /// Load the registry, overlaying `$ROOT/.cbi/config` when present.
    /// User tables are additive: parser rules, modes and passes extend
    /// the shipped specification of the same name.
    pub fn with_user_config(root: &Path) -> Result<CompilerRegistry, CompilerConfigError> {
        let mut registry = CompilerRegistry::new();
        let path = root.join(".cbi").join("config");
        if !path.is_file() {
            return Ok(registry);
        }
        let content = fs::read_to_string(&path).map_err(|source| {
            CompilerConfigError::FileAccess {
                path: path.clone(),
                source,
            }
        })?;
        let user: UserConfig =
            toml::from_str(&content).map_err(|source| CompilerConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        log::info!("loaded compiler configuration from {}", path.display());
        for (name, spec) in user.compiler {
            registry.merge(name, spec);
        }
        Ok(registry)
    }

    fn merge(&mut self, name: String, spec: CompilerSpec) {
        match self.specs.get_mut(&name) {
            Some(existing) if spec.alias_of.is_none() => {
                existing.options.extend(spec.options);
                existing.parser.extend(spec.parser);
                existing.modes.extend(spec.modes);
                existing.passes.extend(spec.passes);
                if spec.fortran_form.is_some() {
                    existing.fortran_form = spec.fortran_form;
                }
            }
            _ => {
                self.specs.insert(name, spec);
            }
        }
    }

    /// Resolve a compiler basename to its specification, following
    /// alias chains with cycle detection.
    pub fn resolve(&self, name: &str) -> Option<&CompilerSpec> {
        let mut seen = BTreeSet::new();
        let mut current = name;
        loop {
            if !seen.insert(current.to_string()) {
                log::warn!("alias cycle in compiler configuration at '{current}'");
                return None;
            }
            let spec = self.specs.get(current)?;
            match &spec.alias_of {
                Some(target) => current = target,
                None => return Some(spec),
            }
        }
    }
}

/// The emulator's output for one translation unit.
#[derive(Debug, Clone)]
pub struct TranslationUnit {
    pub file: PathBuf,
    /// Command-line and implicit definitions, in order.
    pub defines: Vec<String>,
    pub undefines: Vec<String>,
    pub include_paths: Vec<PathBuf>,
    pub include_files: Vec<PathBuf>,
    pub modes: BTreeSet<String>,
    pub fortran_form: Option<FortranForm>,
}

/// Emulate one compiler invocation.
///
/// `argv[0]` selects the specification by basename; the remaining
/// arguments are parsed with the common rules first, then the
/// specification's own rules. Unrecognised arguments are ignored so
/// that unknown compilers can still be analysed.
pub fn emulate(registry: &CompilerRegistry, argv: &[String], directory: &Path) -> TranslationUnit {
    let basename = argv
        .first()
        .map(|arg| {
            Path::new(arg)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| arg.clone())
        })
        .unwrap_or_default();
    let spec = registry.resolve(&basename);
    if spec.is_none() {
        log::debug!("no specification for compiler '{basename}'; common arguments only");
    }

    let mut args: Vec<String> = Vec::new();
    let mut source: Option<String> = None;
    if let Some(spec) = spec {
        args.extend(spec.options.iter().cloned());
    }
    args.extend(argv.iter().skip(1).cloned());

    let mut buckets = Buckets::default();
    let mut i = 0;
    while i < args.len() {
        if let Some(consumed) = rules::match_common(&args[i..], &mut buckets) {
            i += consumed;
            continue;
        }
        if let Some(spec) = spec {
            if let Some(consumed) = spec
                .parser
                .iter()
                .find_map(|rule| rule.try_match(&args[i..], &mut buckets))
            {
                i += consumed;
                continue;
            }
        }
        // A non-flag argument with a source extension is the input file.
        if !args[i].starts_with('-')
            && crate::source::Language::from_path(Path::new(&args[i]))
                != crate::source::Language::Unknown
        {
            source = Some(args[i].clone());
        }
        i += 1;
    }

    let mut defines: Vec<String> = buckets.list("defines").to_vec();
    let undefines: Vec<String> = buckets.list("undefines").to_vec();
    let mut include_paths: Vec<String> = buckets.list("include_paths").to_vec();
    let mut include_files: Vec<String> = buckets.list("include_files").to_vec();
    let modes: BTreeSet<String> = buckets.list("modes").iter().cloned().collect();

    if let Some(spec) = spec {
        for mode in &spec.modes {
            if modes.contains(&mode.name) {
                defines.extend(mode.defines.iter().cloned());
                include_paths.extend(mode.include_paths.iter().cloned());
                include_files.extend(mode.include_files.iter().cloned());
            }
        }
        for pass in &spec.passes {
            if pass.modes.iter().all(|m| modes.contains(m)) {
                defines.extend(pass.defines.iter().cloned());
                include_paths.extend(pass.include_paths.iter().cloned());
                include_files.extend(pass.include_files.iter().cloned());
            }
        }
    }

    let absolute = |path: &String| -> PathBuf {
        let path = PathBuf::from(path);
        if path.is_absolute() {
            path
        } else {
            directory.join(path)
        }
    };

    TranslationUnit {
        file: source.map(|s| absolute(&s)).unwrap_or_default(),
        defines,
        undefines,
        include_paths: include_paths.iter().map(&absolute).collect(),
        include_files: include_files.iter().map(&absolute).collect(),
        modes,
        fortran_form: spec.and_then(|s| s.fortran_form),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_common_arguments() {
        let registry = CompilerRegistry::new();
        let tu = emulate(
            &registry,
            &argv(&[
                "c++",
                "-I/path",
                "-I",
                "/path/after/space",
                "-isystem",
                "/system/path",
                "-include",
                "foo.inc",
                "-DMACRO",
                "-DFUNCTION_MACRO=1",
                "-D",
                "MACRO_AFTER_SPACE",
                "test.cpp",
            ]),
            Path::new("/project"),
        );
        assert_eq!(tu.defines, vec!["MACRO", "FUNCTION_MACRO=1", "MACRO_AFTER_SPACE"]);
        assert_eq!(
            tu.include_paths,
            vec![
                PathBuf::from("/path"),
                PathBuf::from("/path/after/space"),
                PathBuf::from("/system/path")
            ]
        );
        assert_eq!(tu.include_files, vec![PathBuf::from("/project/foo.inc")]);
        assert_eq!(tu.file, PathBuf::from("/project/test.cpp"));
    }

    #[test]
    fn test_openmp_mode() {
        let registry = CompilerRegistry::new();
        let tu = emulate(
            &registry,
            &argv(&["/usr/bin/c++", "-fopenmp", "-DFOO=3", "-I./inc", "-c", "f.cpp"]),
            Path::new("/project"),
        );
        assert!(tu.modes.contains("openmp"));
        assert!(tu.defines.contains(&"FOO=3".to_string()));
        assert!(tu.defines.contains(&"_OPENMP".to_string()));
        assert!(tu.include_paths.contains(&PathBuf::from("/project/./inc")));
    }

    #[test]
    fn test_clang_sycl_device() {
        let registry = CompilerRegistry::new();
        let tu = emulate(
            &registry,
            &argv(&["clang", "-fsycl-is-device", "test.cpp"]),
            Path::new("/p"),
        );
        assert!(tu.defines.contains(&"__SYCL_DEVICE_ONLY__".to_string()));
    }

    #[test]
    fn test_intel_sycl_pass() {
        let registry = CompilerRegistry::new();
        let tu = emulate(&registry, &argv(&["icpx", "-fsycl", "test.cpp"]), Path::new("/p"));
        assert!(tu.modes.contains("sycl"));
        for expected in ["__SYCL_DEVICE_ONLY__", "__SPIR__", "__SPIRV__"] {
            assert!(tu.defines.contains(&expected.to_string()), "{expected}");
        }
    }

    #[test]
    fn test_intel_sycl_targets() {
        let registry = CompilerRegistry::new();
        let tu = emulate(
            &registry,
            &argv(&["icpx", "-fsycl", "-fsycl-targets=spir64,x86_64", "-fopenmp", "test.cpp"]),
            Path::new("/p"),
        );
        assert!(tu.modes.contains("sycl"));
        assert!(tu.modes.contains("sycl-spir64"));
        assert!(tu.modes.contains("sycl-x86_64"));
        assert!(tu.defines.contains(&"_OPENMP".to_string()));
    }

    #[test]
    fn test_nvcc_implicit_cuda() {
        let registry = CompilerRegistry::new();
        let tu = emulate(&registry, &argv(&["nvcc", "-c", "kernel.cu"]), Path::new("/p"));
        assert!(tu.modes.contains("cuda"));
        assert!(tu.defines.contains(&"__CUDACC__".to_string()));
    }

    #[test]
    fn test_unknown_compiler_still_parses_common() {
        let registry = CompilerRegistry::new();
        let tu = emulate(
            &registry,
            &argv(&["weirdcc", "-DX=1", "-I/inc", "--strange-flag", "a.c"]),
            Path::new("/p"),
        );
        assert_eq!(tu.defines, vec!["X=1"]);
        assert_eq!(tu.include_paths, vec![PathBuf::from("/inc")]);
    }

    #[test]
    fn test_alias_resolution() {
        let registry = CompilerRegistry::new();
        let gcc = registry.resolve("gcc").unwrap();
        assert!(gcc.alias_of.is_none());
        assert!(!gcc.modes.is_empty());
    }

    #[test]
    fn test_alias_cycle_detection() {
        let mut registry = CompilerRegistry::new();
        registry.merge("a".to_string(), CompilerSpec::alias("b"));
        registry.merge("b".to_string(), CompilerSpec::alias("a"));
        assert!(registry.resolve("a").is_none());
    }

    #[test]
    fn test_user_config_overlay() {
        use std::fs;
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".cbi")).unwrap();
        fs::write(
            dir.path().join(".cbi").join("config"),
            r#"
            [compiler.mycc]
            alias_of = "gnu"

            [compiler.gnu]
            [[compiler.gnu.parser]]
            flags = ["--offload"]
            action = "append_const"
            dest = "modes"
            const = "offload"

            [[compiler.gnu.modes]]
            name = "offload"
            defines = ["__OFFLOAD__"]
            "#,
        )
        .unwrap();

        let registry = CompilerRegistry::with_user_config(dir.path()).unwrap();
        let tu = emulate(
            &registry,
            &argv(&["mycc", "--offload", "-fopenmp", "x.c"]),
            Path::new("/p"),
        );
        assert!(tu.defines.contains(&"__OFFLOAD__".to_string()));
        assert!(tu.defines.contains(&"_OPENMP".to_string()));
    }
}
