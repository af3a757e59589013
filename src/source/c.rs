// SPDX-License-Identifier: GPL-3.0-or-later

//! C/C++ logical-line assembly.
//!
//! A small state machine approximates the early stages of a C
//! preprocessor: backslash-newline splices, whitespace merging, and
//! replacement of comments with whitespace. State carries across
//! physical lines (block comments) and resets at each logical newline.

use super::{physical_lines, FileStats, LineKind, LogicalLine};

/// A line buffer that merges runs of whitespace into a single space.
#[derive(Default)]
pub(super) struct OneSpaceLine {
    parts: String,
    trailing_space: bool,
}

impl OneSpaceLine {
    pub(super) fn new() -> Self {
        OneSpaceLine::default()
    }

    pub(super) fn push_char(&mut self, c: char) {
        if c.is_whitespace() {
            self.push_space();
        } else {
            self.parts.push(c);
            self.trailing_space = false;
        }
    }

    pub(super) fn push_space(&mut self) {
        if !self.trailing_space {
            self.parts.push(' ');
            self.trailing_space = true;
        }
    }

    pub(super) fn push_verbatim(&mut self, c: char) {
        self.parts.push(c);
        self.trailing_space = false;
    }

    pub(super) fn join(&mut self, other: &OneSpaceLine) {
        if other.parts.is_empty() {
            return;
        }
        if other.parts.starts_with(' ') && self.trailing_space {
            self.parts.push_str(&other.parts[1..]);
        } else {
            self.parts.push_str(&other.parts);
        }
        self.trailing_space = other.trailing_space;
    }

    pub(super) fn kind(&self) -> LineKind {
        let trimmed = self.parts.trim_start();
        if trimmed.is_empty() {
            LineKind::Blank
        } else if trimmed.starts_with('#') {
            LineKind::Directive
        } else {
            LineKind::Code
        }
    }

    pub(super) fn is_blank(&self) -> bool {
        self.kind() == LineKind::Blank
    }

    pub(super) fn flush(&mut self) -> String {
        let text = std::mem::take(&mut self.parts);
        self.trailing_space = false;
        text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Toplevel,
    CppDirective,
    DoubleQuote,
    SingleQuote,
    FoundSlash,
    BlockComment,
    BlockCommentStar,
    Escaping,
    InlineComment,
}

/// Comment and string stripper for C. With `directives_only` set, only
/// directive detection and continuations are performed; everything else
/// passes through untouched (used as the Fortran prepass).
pub(super) struct Cleaner {
    state: Vec<State>,
    directives_only: bool,
}

impl Cleaner {
    pub(super) fn new(directives_only: bool) -> Self {
        Cleaner {
            state: vec![State::Toplevel],
            directives_only,
        }
    }

    fn top(&self) -> State {
        *self.state.last().unwrap_or(&State::Toplevel)
    }

    pub(super) fn in_block_comment(&self) -> bool {
        matches!(self.top(), State::BlockComment | State::BlockCommentStar)
    }

    /// Reset per-logical-line state when a newline without continuation
    /// is seen. Block comments survive across logical lines.
    pub(super) fn logical_newline(&mut self, out: &mut OneSpaceLine) {
        match self.top() {
            State::InlineComment => {
                self.state = vec![State::Toplevel];
                out.push_space();
            }
            State::FoundSlash => {
                self.state = vec![State::Toplevel];
                out.push_verbatim('/');
            }
            // An unterminated literal at end of line is tolerated.
            State::SingleQuote | State::DoubleQuote => {
                self.state = vec![State::Toplevel];
            }
            State::BlockCommentStar => {
                self.state.pop();
            }
            State::CppDirective => {
                self.state = vec![State::Toplevel];
            }
            _ => {}
        }
    }

    /// Feed one physical line (without its newline or trailing
    /// continuation backslash) into `out`.
    pub(super) fn process(&mut self, line: &str, out: &mut OneSpaceLine) {
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let mut consumed = true;
            match self.top() {
                State::Toplevel => {
                    if c == '\\' {
                        self.state.push(State::Escaping);
                        out.push_verbatim(c);
                    } else if !self.directives_only && c == '/' {
                        self.state.push(State::FoundSlash);
                    } else if c == '"' {
                        if self.directives_only {
                            out.push_verbatim(c);
                        } else {
                            self.state.push(State::DoubleQuote);
                            out.push_verbatim(c);
                        }
                    } else if c == '\'' && !self.directives_only {
                        self.state.push(State::SingleQuote);
                        out.push_verbatim(c);
                    } else if c == '#' && out.is_blank() {
                        self.state.push(State::CppDirective);
                        out.push_verbatim(c);
                    } else {
                        out.push_char(c);
                    }
                }
                State::CppDirective => {
                    if c == '\\' {
                        self.state.push(State::Escaping);
                        out.push_verbatim(c);
                    } else if c == '/' {
                        self.state.push(State::FoundSlash);
                    } else if c == '"' {
                        self.state.push(State::DoubleQuote);
                        out.push_verbatim(c);
                    } else if c == '\'' {
                        self.state.push(State::SingleQuote);
                        out.push_verbatim(c);
                    } else {
                        out.push_char(c);
                    }
                }
                State::DoubleQuote => {
                    if c == '\\' {
                        self.state.push(State::Escaping);
                        out.push_verbatim(c);
                    } else {
                        if c == '"' {
                            self.state.pop();
                        }
                        out.push_verbatim(c);
                    }
                }
                State::SingleQuote => {
                    if c == '\\' {
                        self.state.push(State::Escaping);
                        out.push_verbatim(c);
                    } else {
                        if c == '\'' {
                            self.state.pop();
                        }
                        out.push_verbatim(c);
                    }
                }
                State::FoundSlash => {
                    self.state.pop();
                    if c == '/' {
                        self.state.push(State::InlineComment);
                    } else if c == '*' {
                        self.state.push(State::BlockComment);
                    } else {
                        out.push_verbatim('/');
                        consumed = false;
                    }
                }
                State::BlockComment => {
                    if c == '*' {
                        self.state.push(State::BlockCommentStar);
                    }
                }
                State::BlockCommentStar => {
                    self.state.pop();
                    if c == '/' {
                        self.state.pop();
                        out.push_space();
                    } else if c == '*' {
                        self.state.push(State::BlockCommentStar);
                    }
                }
                State::Escaping => {
                    out.push_verbatim(c);
                    self.state.pop();
                }
                // A line comment runs to the end of the physical line.
                State::InlineComment => return,
            }
            if consumed {
                i += 1;
            }
        }
    }
}

/// Assemble the logical lines of a C/C++ source text. Blank logical
/// lines are dropped; the tree builder reconstructs extents from the
/// surviving lines.
pub fn logical_lines(text: &str, directives_only: bool) -> (Vec<LogicalLine>, FileStats) {
    let raw_lines = physical_lines(text);
    let mut cleaner = Cleaner::new(directives_only);
    let mut out = Vec::new();

    let mut logical = OneSpaceLine::new();
    let mut start_line = 1u32;
    let mut covered = Vec::new();
    let mut total_sloc = 0u32;
    let mut in_logical = false;

    for (index, raw) in raw_lines.iter().enumerate() {
        let line_number = index as u32 + 1;
        if !in_logical {
            start_line = line_number;
            in_logical = true;
        }

        let continued = raw.ends_with('\\') && !cleaner.in_block_comment();
        let body = if continued {
            &raw[..raw.len() - 1]
        } else {
            raw
        };

        let mut physical = OneSpaceLine::new();
        cleaner.process(body, &mut physical);
        if !continued {
            cleaner.logical_newline(&mut physical);
        }

        if !physical.is_blank() {
            covered.push(line_number);
        }
        logical.join(&physical);

        if !continued {
            let kind = logical.kind();
            if kind != LineKind::Blank {
                total_sloc += covered.len() as u32;
                out.push(LogicalLine {
                    text: logical.flush(),
                    start_line,
                    end_line: line_number,
                    lines: std::mem::take(&mut covered),
                    kind,
                });
            } else {
                logical.flush();
                covered.clear();
            }
            in_logical = false;
        }
    }

    if in_logical {
        log::warn!("file ends inside a continued line");
        let kind = logical.kind();
        if kind != LineKind::Blank {
            total_sloc += covered.len() as u32;
            out.push(LogicalLine {
                text: logical.flush(),
                start_line,
                end_line: raw_lines.len() as u32,
                lines: covered,
                kind,
            });
        }
    }

    let stats = FileStats {
        total_lines: raw_lines.len() as u32,
        total_sloc,
    };
    (out, stats)
}

#[cfg(test)]
mod test {
    use super::*;

    fn lex(text: &str) -> Vec<LogicalLine> {
        logical_lines(text, false).0
    }

    #[test]
    fn test_classification() {
        let lines = lex("#define FOO 1\nint x;\n\n// comment\n/* block */\ny;\n");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].kind, LineKind::Directive);
        assert_eq!(lines[1].kind, LineKind::Code);
        assert_eq!(lines[2].kind, LineKind::Code);
        assert_eq!(lines[2].start_line, 6);
    }

    #[test]
    fn test_continuation_folds_directive() {
        let lines = lex("#define FOO \\\n  1\nx;\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].kind, LineKind::Directive);
        assert_eq!(lines[0].text, "#define FOO 1");
        assert_eq!(lines[0].start_line, 1);
        assert_eq!(lines[0].end_line, 2);
        assert_eq!(lines[0].lines, vec![1, 2]);
    }

    #[test]
    fn test_block_comment_spans_lines() {
        // The middle line is comment-only and therefore dropped as blank.
        let lines = lex("a /* one\ntwo\nthree */ b\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].kind, LineKind::Code);
        assert_eq!(lines[0].text.trim(), "a");
        assert_eq!(lines[1].text.trim(), "b");
        assert_eq!(lines[1].start_line, 3);
    }

    #[test]
    fn test_comment_only_lines_are_blank() {
        let lines = lex("// only a comment\n/* and another */\n");
        assert!(lines.is_empty());
    }

    #[test]
    fn test_directive_in_string_is_code() {
        let lines = lex("const char *s = \"#include <evil.h>\";\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].kind, LineKind::Code);
    }

    #[test]
    fn test_indented_directive() {
        let lines = lex("   #ifdef FOO\n");
        assert_eq!(lines[0].kind, LineKind::Directive);
    }

    #[test]
    fn test_comment_stripped_from_directive() {
        let lines = lex("#define FOO 1 /* why */\n");
        assert_eq!(lines[0].text.trim_end(), "#define FOO 1");
    }

    #[test]
    fn test_line_comment_swallows_continuation() {
        // A spliced line comment stays a comment; only the code after it
        // survives.
        let lines = lex("// comment \\\nstill comment\nx;\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "x;");
        assert_eq!(lines[0].start_line, 3);
    }

    #[test]
    fn test_sloc_counting() {
        let (_, stats) = logical_lines("a;\n\nb;\n// c\n", false);
        assert_eq!(stats.total_lines, 4);
        assert_eq!(stats.total_sloc, 2);
    }

    #[test]
    fn test_divide_not_a_comment() {
        let lines = lex("int x = a / b;\n");
        assert_eq!(lines[0].text, "int x = a / b;");
    }
}
