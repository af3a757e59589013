// SPDX-License-Identifier: GPL-3.0-or-later

//! Code-base membership: which files belong to the analysis.
//!
//! A code base is a root directory plus a set of exclude patterns.
//! Patterns are matched gitignore-style against paths relative to the
//! root; a pattern without a separator also matches by file name alone.

use crate::source::Language;
use glob::Pattern;
use std::path::{Path, PathBuf};

/// Canonicalize a path where possible; paths that do not (yet) exist
/// are returned unchanged.
pub fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[derive(Debug)]
pub struct CodeBase {
    root: PathBuf,
    patterns: Vec<Pattern>,
    raw_patterns: Vec<String>,
}

impl CodeBase {
    pub fn new(root: &Path, excludes: &[String]) -> CodeBase {
        let root = canonical(root);
        let mut patterns = Vec::new();
        for text in excludes {
            match Pattern::new(text) {
                Ok(pattern) => patterns.push(pattern),
                Err(error) => {
                    log::warn!("ignoring malformed exclude pattern '{text}': {error}");
                }
            }
        }
        CodeBase {
            root,
            patterns,
            raw_patterns: excludes.to_vec(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exclude_patterns(&self) -> &[String] {
        &self.raw_patterns
    }

    /// Whether a file's lines should be kept out of the analysis:
    /// outside the root directory, or matching an exclude pattern.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let path = canonical(path);
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return true;
        };
        self.matches_exclude(relative)
    }

    fn matches_exclude(&self, relative: &Path) -> bool {
        for pattern in &self.patterns {
            if pattern.matches_path(relative) {
                return true;
            }
            // A bare pattern such as `*.cu` or `third-party` applies at
            // any depth, like a .gitignore line without a slash.
            if !pattern.as_str().contains('/') {
                if let Some(name) = relative.file_name() {
                    if pattern.matches_path(Path::new(name)) {
                        return true;
                    }
                }
                if relative
                    .components()
                    .any(|c| pattern.matches_path(Path::new(c.as_os_str())))
                {
                    return true;
                }
            }
        }
        false
    }

    /// A recognised source file inside the code base.
    pub fn contains(&self, path: &Path) -> bool {
        let path = canonical(path);
        path.is_file()
            && Language::from_path(&path) != Language::Unknown
            && !self.is_excluded(&path)
    }

    /// All source files under the root, in sorted order.
    pub fn walk(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.file_type().is_file() && self.contains(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }
        files.sort();
        files
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_membership_and_exclusion() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("gpu")).unwrap();
        fs::write(root.join("main.cpp"), "int main() {}\n").unwrap();
        fs::write(root.join("notes.txt"), "hi\n").unwrap();
        fs::write(root.join("gpu").join("kernel.cu"), "k;\n").unwrap();

        let cb = CodeBase::new(root, &["*.cu".to_string()]);
        assert!(cb.contains(&root.join("main.cpp")));
        assert!(!cb.contains(&root.join("notes.txt")));
        assert!(!cb.contains(&root.join("gpu/kernel.cu")));
        assert!(cb.is_excluded(&root.join("gpu/kernel.cu")));

        let files = cb.walk();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("main.cpp"));
    }

    #[test]
    fn test_directory_pattern() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("third-party")).unwrap();
        fs::write(root.join("third-party").join("lib.c"), "x;\n").unwrap();
        fs::write(root.join("mine.c"), "y;\n").unwrap();

        let cb = CodeBase::new(root, &["third-party".to_string()]);
        assert!(cb.is_excluded(&root.join("third-party/lib.c")));
        assert!(!cb.is_excluded(&root.join("mine.c")));
    }

    #[test]
    fn test_rooted_pattern() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/gen")).unwrap();
        fs::write(root.join("src/gen/out.c"), "x;\n").unwrap();

        let cb = CodeBase::new(root, &["src/gen/*".to_string()]);
        assert!(cb.is_excluded(&root.join("src/gen/out.c")));
    }

    #[test]
    fn test_outside_root_is_excluded() {
        let dir = tempdir().unwrap();
        let other = tempdir().unwrap();
        fs::write(other.path().join("x.c"), "x;\n").unwrap();

        let cb = CodeBase::new(dir.path(), &[]);
        assert!(cb.is_excluded(&other.path().join("x.c")));
    }
}
