// SPDX-License-Identifier: GPL-3.0-or-later

//! Reading source files and assembling logical lines.
//!
//! The reader decodes bytes permissively and normalises line endings;
//! the per-language lexers fold continuations, strip comments while
//! preserving physical line numbers, and classify every logical line as
//! a directive, code, or blank.

pub mod c;
pub mod fortran;

use std::fs;
use std::io;
use std::path::Path;

/// Languages the lexer understands. Included files inherit the language
/// of the including translation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    C,
    Cpp,
    FortranFree,
    FortranFixed,
    Asm,
    Unknown,
}

impl Language {
    pub fn from_path(path: &Path) -> Language {
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            return Language::Unknown;
        };
        match extension {
            "f90" | "F90" => Language::FortranFree,
            "f" | "F" | "ftn" | "FTN" | "for" | "FOR" | "fpp" | "FPP" => Language::FortranFixed,
            "c" | "h" => Language::C,
            "S" | "asm" => Language::Asm,
            _ => match extension.to_ascii_lowercase().as_str() {
                "c++" | "cxx" | "cpp" | "cc" | "hpp" | "hxx" | "h++" | "hh" | "inc" | "inl"
                | "tcc" | "icc" | "ipp" | "cu" | "cuh" | "cl" => Language::Cpp,
                "s" => Language::Asm,
                _ => Language::Unknown,
            },
        }
    }

    pub fn is_fortran(self) -> bool {
        matches!(self, Language::FortranFree | Language::FortranFixed)
    }
}

/// Classification of a logical line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Directive,
    Code,
    Blank,
}

/// One logical line: possibly several physical lines joined by
/// continuations, with comments replaced by whitespace and runs of
/// whitespace collapsed.
#[derive(Debug, Clone)]
pub struct LogicalLine {
    /// The cleaned text of the line.
    pub text: String,
    /// First physical line, one-based.
    pub start_line: u32,
    /// Last physical line, inclusive.
    pub end_line: u32,
    /// The non-blank physical lines this logical line covers. These are
    /// the lines that attribution reports count.
    pub lines: Vec<u32>,
    pub kind: LineKind,
}

/// Totals for a lexed file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStats {
    pub total_lines: u32,
    pub total_sloc: u32,
}

/// A source file decoded into physical lines.
pub struct SourceFile {
    text: String,
}

impl SourceFile {
    /// Read a file, decoding as UTF-8 with replacement and normalising
    /// CRLF and lone CR to LF. Symlinks are not followed; source files
    /// are opened with the same caution as every other analysis input.
    pub fn read(path: &Path) -> io::Result<SourceFile> {
        let metadata = fs::symlink_metadata(path)?;
        if metadata.file_type().is_symlink() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "refusing to follow symlink",
            ));
        }
        let bytes = fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes)
            .replace("\r\n", "\n")
            .replace('\r', "\n");
        Ok(SourceFile { text })
    }

    pub fn from_text(text: &str) -> SourceFile {
        SourceFile {
            text: text.replace("\r\n", "\n").replace('\r', "\n"),
        }
    }

    /// Split into logical lines according to the language. The `openmp`
    /// flag controls whether Fortran `!$` sentinels are kept as code.
    pub fn logical_lines(&self, language: Language, openmp: bool) -> (Vec<LogicalLine>, FileStats) {
        match language {
            Language::FortranFree => fortran::free_form_lines(&self.text, openmp),
            Language::FortranFixed => fortran::fixed_form_lines(&self.text, openmp),
            _ => c::logical_lines(&self.text, false),
        }
    }
}

/// The physical lines of `text`, without a trailing empty line for a
/// final newline.
pub(crate) fn physical_lines(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = text.split('\n').collect();
    if text.ends_with('\n') {
        lines.pop();
    }
    lines
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_language_detection() {
        let cases = [
            ("main.c", Language::C),
            ("main.h", Language::C),
            ("main.cpp", Language::Cpp),
            ("main.cu", Language::Cpp),
            ("kernel.cl", Language::Cpp),
            ("mod.f90", Language::FortranFree),
            ("mod.F90", Language::FortranFree),
            ("legacy.f", Language::FortranFixed),
            ("legacy.FOR", Language::FortranFixed),
            ("boot.S", Language::Asm),
            ("README", Language::Unknown),
        ];
        for (name, expected) in cases {
            assert_eq!(Language::from_path(&PathBuf::from(name)), expected, "{name}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_source_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real.c");
        let link = dir.path().join("link.c");
        fs::write(&target, "int x;\n").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert!(SourceFile::read(&target).is_ok());
        assert!(SourceFile::read(&link).is_err());
    }

    #[test]
    fn test_newline_normalisation() {
        let file = SourceFile::from_text("a\r\nb\rc\n");
        let (lines, stats) = file.logical_lines(Language::C, false);
        assert_eq!(stats.total_lines, 3);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text, "a");
        assert_eq!(lines[1].text, "b");
        assert_eq!(lines[2].text, "c");
    }
}
