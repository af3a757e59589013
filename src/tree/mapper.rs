// SPDX-License-Identifier: GPL-3.0-or-later

//! Walking specialization trees under a platform configuration.
//!
//! The walker threads a mutable macro table through the tree in source
//! order, decides branch liveness, resolves `#include` targets, and
//! records every live code line into the setmap under the platform's
//! name. Trees are cached and shared across walks; all per-walk state
//! lives in the walker.

use super::{builder, Condition, DirectiveNode, FileTree, IncludeNode, Node};
use crate::codebase::{canonical, CodeBase};
use crate::preprocessor::directive::parse_include_path;
use crate::preprocessor::{evaluate, expand, Directive, IncludePath, MacroTable};
use crate::source::Language;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Per-line platform attribution for one file.
#[derive(Debug, Default, Clone)]
pub struct FileCoverage {
    /// Countable code lines, each with the set of platforms that reach
    /// it. Lines start with an empty set when the file is registered.
    pub lines: BTreeMap<u32, BTreeSet<String>>,
    pub total_lines: u32,
    pub total_sloc: u32,
}

impl FileCoverage {
    /// The number of code lines covered by the given platform.
    pub fn lines_for(&self, platform: &str) -> u64 {
        self.lines
            .values()
            .filter(|set| set.contains(platform))
            .count() as u64
    }
}

/// The analysis result: physical line identity mapped to the set of
/// platforms whose compilation reaches it.
#[derive(Debug, Default)]
pub struct SetMap {
    files: BTreeMap<PathBuf, FileCoverage>,
}

impl SetMap {
    pub fn new() -> SetMap {
        SetMap::default()
    }

    /// Register every code line of a file with an empty platform set.
    /// Lines never leave the map afterwards; recording only adds.
    pub fn register_file(&mut self, path: &Path, tree: &FileTree) {
        let entry = self.files.entry(path.to_path_buf()).or_default();
        entry.total_lines = tree.total_lines;
        entry.total_sloc = tree.total_sloc;
        for line in tree.code_lines() {
            entry.lines.entry(line).or_default();
        }
    }

    pub fn record(&mut self, path: &Path, line: u32, platform: &str) {
        self.files
            .entry(path.to_path_buf())
            .or_default()
            .lines
            .entry(line)
            .or_default()
            .insert(platform.to_string());
    }

    pub fn files(&self) -> impl Iterator<Item = (&PathBuf, &FileCoverage)> {
        self.files.iter()
    }

    pub fn file(&self, path: &Path) -> Option<&FileCoverage> {
        self.files.get(path)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Every platform name that appears anywhere in the map.
    pub fn platforms(&self) -> BTreeSet<String> {
        let mut platforms = BTreeSet::new();
        for coverage in self.files.values() {
            for set in coverage.lines.values() {
                platforms.extend(set.iter().cloned());
            }
        }
        platforms
    }

    /// Aggregate line counts per platform set, across all files. The
    /// empty set collects unused code.
    pub fn set_counts(&self) -> BTreeMap<Vec<String>, u64> {
        let mut counts: BTreeMap<Vec<String>, u64> = BTreeMap::new();
        for coverage in self.files.values() {
            for set in coverage.lines.values() {
                let key: Vec<String> = set.iter().cloned().collect();
                *counts.entry(key).or_default() += 1;
            }
        }
        counts
    }

    pub fn total_sloc(&self) -> u64 {
        self.files
            .values()
            .map(|c| c.lines.len() as u64)
            .sum()
    }
}

/// Cache of built trees, keyed by canonical path plus the lexing
/// configuration. The language matters because a compiler specification
/// can force the Fortran form per platform, selecting a different
/// logical-line split for the same file. A file that fails to read is
/// cached as absent so it warns only once.
#[derive(Default)]
pub struct TreeCache {
    trees: HashMap<(PathBuf, Language, bool), Option<Rc<FileTree>>>,
    registered: HashSet<PathBuf>,
}

impl TreeCache {
    pub fn new() -> TreeCache {
        TreeCache::default()
    }

    /// Fetch or build the tree for a file. On first build the file's
    /// code lines are registered into the setmap (unless `register` is
    /// false, used for files excluded from the code base).
    pub fn get_or_build(
        &mut self,
        path: &Path,
        language: Language,
        openmp: bool,
        setmap: &mut SetMap,
        register: bool,
    ) -> Option<Rc<FileTree>> {
        // The sentinel flag only changes lexing for Fortran.
        let key = (
            path.to_path_buf(),
            language,
            openmp && language.is_fortran(),
        );
        let tree = match self.trees.get(&key) {
            Some(cached) => cached.clone(),
            None => {
                let built = match builder::build_tree(path, language, openmp) {
                    Ok(tree) => Some(Rc::new(tree)),
                    Err(error) => {
                        log::warn!("couldn't read {}: {error}; skipping it", path.display());
                        None
                    }
                };
                self.trees.insert(key, built.clone());
                built
            }
        };
        if register {
            if let Some(tree) = &tree {
                if self.registered.insert(path.to_path_buf()) {
                    setmap.register_file(path, tree);
                }
            }
        }
        tree
    }
}

/// Walks trees for one platform, with a fresh macro table seeded from
/// the platform's predefines.
pub struct PlatformWalker<'a> {
    platform: String,
    table: MacroTable,
    cache: &'a mut TreeCache,
    setmap: &'a mut SetMap,
    codebase: &'a CodeBase,
    include_paths: Vec<PathBuf>,
    language: Language,
    openmp: bool,
    stack: Vec<PathBuf>,
    skip_once: HashSet<PathBuf>,
}

impl<'a> PlatformWalker<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        platform: &str,
        table: MacroTable,
        cache: &'a mut TreeCache,
        setmap: &'a mut SetMap,
        codebase: &'a CodeBase,
        include_paths: Vec<PathBuf>,
        language: Language,
        openmp: bool,
    ) -> Self {
        PlatformWalker {
            platform: platform.to_string(),
            table,
            cache,
            setmap,
            codebase,
            include_paths,
            language,
            openmp,
            stack: Vec::new(),
            skip_once: HashSet::new(),
        }
    }

    /// Walk one file (a translation unit or a forced include).
    pub fn walk_file(&mut self, path: &Path) {
        let path = canonical(path);
        let register = !self.codebase.is_excluded(&path);
        let Some(tree) =
            self.cache
                .get_or_build(&path, self.language, self.openmp, self.setmap, register)
        else {
            return;
        };
        self.walk_tree(&tree);
    }

    fn walk_tree(&mut self, tree: &FileTree) {
        let record = !self.codebase.is_excluded(&tree.path);
        self.stack.push(tree.path.clone());
        self.walk_nodes(&tree.root, record, &tree.path);
        self.stack.pop();
    }

    fn walk_nodes(&mut self, nodes: &[Node], record: bool, file: &Path) {
        for node in nodes {
            match node {
                Node::Code(range) => {
                    if record {
                        for &line in &range.lines {
                            self.setmap.record(file, line, &self.platform);
                        }
                    }
                }
                Node::Directive(directive) => self.directive(directive, file),
                Node::Include(include) => self.include(include, file),
                Node::If(group) => {
                    // First true condition wins; later conditions are
                    // not evaluated.
                    for branch in &group.branches {
                        let live = match &branch.condition {
                            Condition::Else => true,
                            Condition::Expr(tokens) => {
                                match evaluate(&self.table, tokens) {
                                    Ok(value) => value,
                                    Err(error) => {
                                        log::warn!(
                                            "{}:{}: {error}; branch taken as false",
                                            file.display(),
                                            branch.start_line
                                        );
                                        false
                                    }
                                }
                            }
                        };
                        if live {
                            self.walk_nodes(&branch.body, record, file);
                            break;
                        }
                    }
                }
            }
        }
    }

    fn directive(&mut self, node: &DirectiveNode, file: &Path) {
        match &node.directive {
            Directive::Define(def) => self.table.define(def.clone()),
            Directive::Undef(name) => self.table.undef(name),
            Directive::Pragma(tokens) => {
                if tokens.first().map(|t| t.is_identifier("once")).unwrap_or(false) {
                    self.skip_once.insert(file.to_path_buf());
                }
            }
            Directive::Error(message) => {
                log::warn!(
                    "{}:{}: #error {message} [{}]",
                    file.display(),
                    node.start_line,
                    self.platform
                );
            }
            Directive::Warning(message) => {
                log::warn!(
                    "{}:{}: #warning {message} [{}]",
                    file.display(),
                    node.start_line,
                    self.platform
                );
            }
            Directive::Line(_) | Directive::Unknown(_) => {}
            // Structure directives never reach this node type.
            _ => {}
        }
    }

    fn include(&mut self, node: &IncludeNode, file: &Path) {
        // Computed includes (`#include FOO`) need macro expansion first.
        let expanded = expand(&self.table, node.tokens.clone());
        let Some(spec) = parse_include_path(&expanded) else {
            log::warn!(
                "{}:{}: cannot parse include target '{}'",
                file.display(),
                node.start_line,
                crate::preprocessor::spell(&expanded)
            );
            return;
        };

        let Some(resolved) = self.find_include_file(&spec, file) else {
            let kind = if spec.system { "system include" } else { "user include" };
            log::warn!(
                "{}:{}: {kind} '{}' not found",
                file.display(),
                node.start_line,
                spec.path
            );
            return;
        };

        if self.skip_once.contains(&resolved) {
            return;
        }
        if self.stack.contains(&resolved) {
            log::warn!(
                "{}:{}: include cycle on '{}'; breaking recursion",
                file.display(),
                node.start_line,
                resolved.display()
            );
            return;
        }

        let register = !self.codebase.is_excluded(&resolved);
        let Some(subtree) =
            self.cache
                .get_or_build(&resolved, self.language, self.openmp, self.setmap, register)
        else {
            return;
        };

        // A guarded header whose guard is already defined would expand
        // to nothing; skip it without re-walking.
        if let Some(guard) = &subtree.guard {
            if self.table.is_defined(guard) {
                return;
            }
        }
        self.walk_tree(&subtree);
    }

    /// Quoted includes search the including file's directory first, then
    /// the `-I` paths in order; angle includes search only the `-I`
    /// paths. The first match wins.
    fn find_include_file(&self, spec: &IncludePath, including: &Path) -> Option<PathBuf> {
        let mut directories = Vec::new();
        if !spec.system {
            if let Some(parent) = including.parent() {
                directories.push(parent.to_path_buf());
            }
        }
        directories.extend(self.include_paths.iter().cloned());

        for directory in directories {
            let candidate = directory.join(&spec.path);
            if candidate.is_file() {
                return Some(canonical(&candidate));
            }
        }
        None
    }
}
