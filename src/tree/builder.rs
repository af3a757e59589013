// SPDX-License-Identifier: GPL-3.0-or-later

//! Building a specialization tree from a stream of logical lines.
//!
//! Code lines accumulate into the open `CodeRange`; any directive
//! flushes it. `#if`/`#elif`/`#else`/`#endif` maintain a stack of open
//! groups. Malformed structure never aborts: unmatched directives warn
//! and degrade, unterminated groups close at end of file.

use super::{Branch, CodeRange, Condition, DirectiveNode, FileTree, IfGroup, IncludeNode, Node};
use crate::preprocessor::{Directive, DirectiveParser, Lexer};
use crate::source::{Language, LineKind, LogicalLine, SourceFile};
use std::io;
use std::path::Path;

/// Read and parse one source file into its specialization tree.
pub fn build_tree(path: &Path, language: Language, openmp: bool) -> io::Result<FileTree> {
    let file = SourceFile::read(path)?;
    let (lines, stats) = file.logical_lines(language, openmp);
    let mut builder = Builder::new(path);
    for line in &lines {
        builder.push(line);
    }
    Ok(builder.finish(stats.total_lines, stats.total_sloc))
}

/// Build a tree from in-memory text. Used by tests and by callers that
/// already hold the file contents.
pub fn build_tree_from_text(
    path: &Path,
    text: &str,
    language: Language,
    openmp: bool,
) -> FileTree {
    let file = SourceFile::from_text(text);
    let (lines, stats) = file.logical_lines(language, openmp);
    let mut builder = Builder::new(path);
    for line in &lines {
        builder.push(line);
    }
    builder.finish(stats.total_lines, stats.total_sloc)
}

/// An `#if` group under construction: finished branches, plus the body
/// of the branch currently being filled.
struct Frame {
    start_line: u32,
    condition: Condition,
    condition_line: u32,
    done: Vec<Branch>,
    body: Vec<Node>,
    seen_else: bool,
}

struct Builder<'p> {
    path: &'p Path,
    root: Vec<Node>,
    frames: Vec<Frame>,
    pending: Option<CodeRange>,
}

impl<'p> Builder<'p> {
    fn new(path: &'p Path) -> Self {
        Builder {
            path,
            root: Vec::new(),
            frames: Vec::new(),
            pending: None,
        }
    }

    fn body(&mut self) -> &mut Vec<Node> {
        match self.frames.last_mut() {
            Some(frame) => &mut frame.body,
            None => &mut self.root,
        }
    }

    fn flush_code(&mut self) {
        if let Some(range) = self.pending.take() {
            self.body().push(Node::Code(range));
        }
    }

    fn push(&mut self, line: &LogicalLine) {
        match line.kind {
            LineKind::Blank => {}
            LineKind::Code => match self.pending.as_mut() {
                Some(range) => {
                    range.end_line = line.end_line;
                    range.lines.extend(line.lines.iter().copied());
                }
                None => {
                    self.pending = Some(CodeRange {
                        start_line: line.start_line,
                        end_line: line.end_line,
                        lines: line.lines.clone(),
                    });
                }
            },
            LineKind::Directive => {
                self.flush_code();
                let tokens = Lexer::new(&line.text, line.start_line).tokenize();
                let directive = match DirectiveParser::new(tokens).parse() {
                    Ok(directive) => directive,
                    Err(error) => {
                        log::warn!(
                            "{}:{}: {error}: {}",
                            self.path.display(),
                            line.start_line,
                            line.text.trim()
                        );
                        return;
                    }
                };
                self.directive(directive, line);
            }
        }
    }

    fn directive(&mut self, directive: Directive, line: &LogicalLine) {
        match directive {
            Directive::If(expr) => {
                self.frames.push(Frame {
                    start_line: line.start_line,
                    condition: Condition::Expr(expr),
                    condition_line: line.start_line,
                    done: Vec::new(),
                    body: Vec::new(),
                    seen_else: false,
                });
            }
            Directive::Elif(expr) => {
                if !self.close_branch(Condition::Expr(expr), line, false) {
                    log::warn!(
                        "{}:{}: #elif without matching #if",
                        self.path.display(),
                        line.start_line
                    );
                }
            }
            Directive::Else => {
                if !self.close_branch(Condition::Else, line, true) {
                    log::warn!(
                        "{}:{}: #else without matching #if",
                        self.path.display(),
                        line.start_line
                    );
                }
            }
            Directive::Endif => match self.frames.pop() {
                Some(frame) => {
                    let group = close_group(frame, line.end_line);
                    self.body().push(Node::If(group));
                }
                None => {
                    log::warn!(
                        "{}:{}: #endif without matching #if",
                        self.path.display(),
                        line.start_line
                    );
                }
            },
            Directive::Include(tokens) => {
                self.body().push(Node::Include(IncludeNode {
                    tokens,
                    start_line: line.start_line,
                    end_line: line.end_line,
                }));
            }
            Directive::Unknown(ref name) => {
                if !name.is_empty() {
                    log::warn!(
                        "{}:{}: unrecognized directive #{name}",
                        self.path.display(),
                        line.start_line
                    );
                }
                self.body().push(Node::Directive(DirectiveNode {
                    directive,
                    start_line: line.start_line,
                    end_line: line.end_line,
                }));
            }
            _ => {
                self.body().push(Node::Directive(DirectiveNode {
                    directive,
                    start_line: line.start_line,
                    end_line: line.end_line,
                }));
            }
        }
    }

    /// Close the current branch of the innermost group and open a new
    /// one. Returns false when no group is open.
    fn close_branch(&mut self, condition: Condition, line: &LogicalLine, is_else: bool) -> bool {
        self.flush_code();
        let Some(frame) = self.frames.last_mut() else {
            return false;
        };
        if frame.seen_else {
            log::warn!(
                "{}:{}: branch after #else",
                self.path.display(),
                line.start_line
            );
        }
        let finished = Branch {
            condition: std::mem::replace(&mut frame.condition, condition),
            start_line: frame.condition_line,
            body: std::mem::take(&mut frame.body),
        };
        frame.done.push(finished);
        frame.condition_line = line.start_line;
        frame.seen_else = frame.seen_else || is_else;
        true
    }

    fn finish(mut self, total_lines: u32, total_sloc: u32) -> FileTree {
        self.flush_code();
        while let Some(frame) = self.frames.pop() {
            log::warn!(
                "{}:{}: unterminated #if",
                self.path.display(),
                frame.start_line
            );
            let group = close_group(frame, total_lines);
            self.body().push(Node::If(group));
        }
        let guard = detect_guard(&self.root);
        FileTree {
            path: self.path.to_path_buf(),
            root: self.root,
            guard,
            total_lines,
            total_sloc,
        }
    }
}

fn close_group(mut frame: Frame, end_line: u32) -> IfGroup {
    let last = Branch {
        condition: frame.condition,
        start_line: frame.condition_line,
        body: frame.body,
    };
    frame.done.push(last);
    IfGroup {
        branches: frame.done,
        start_line: frame.start_line,
        end_line,
    }
}

/// Detect the classic external include guard: the file's only root node
/// is a single-branch `#ifndef G` group whose body begins with
/// `#define G`.
fn detect_guard(root: &[Node]) -> Option<String> {
    let [Node::If(group)] = root else {
        return None;
    };
    if group.branches.len() != 1 {
        return None;
    }
    let branch = &group.branches[0];
    let guard = ifndef_macro(&branch.condition)?;
    match branch.body.first() {
        Some(Node::Directive(DirectiveNode {
            directive: Directive::Define(def),
            ..
        })) if def.name == guard => Some(guard),
        _ => None,
    }
}

/// Match the token pattern `! defined ( X )` produced for `#ifndef X`.
fn ifndef_macro(condition: &Condition) -> Option<String> {
    let Condition::Expr(tokens) = condition else {
        return None;
    };
    match tokens.as_slice() {
        [not, defined, open, name, close]
            if not.is_operator("!")
                && defined.is_identifier("defined")
                && open.is_punctuator("(")
                && close.is_punctuator(")") =>
        {
            Some(name.spelling.clone())
        }
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::PathBuf;

    fn build(text: &str) -> FileTree {
        build_tree_from_text(&PathBuf::from("test.cpp"), text, Language::Cpp, false)
    }

    #[test]
    fn test_flat_code() {
        let tree = build("int a;\nint b;\n\nint c;\n");
        assert_eq!(tree.root.len(), 1);
        match &tree.root[0] {
            Node::Code(range) => {
                assert_eq!(range.lines, vec![1, 2, 4]);
                assert_eq!(range.start_line, 1);
                assert_eq!(range.end_line, 4);
            }
            other => panic!("expected code range, got {other:?}"),
        }
    }

    #[test]
    fn test_directive_flushes_range() {
        let tree = build("int a;\n#define FOO 1\nint b;\n");
        assert_eq!(tree.root.len(), 3);
        assert!(matches!(&tree.root[0], Node::Code(r) if r.lines == vec![1]));
        assert!(matches!(&tree.root[1], Node::Directive(_)));
        assert!(matches!(&tree.root[2], Node::Code(r) if r.lines == vec![3]));
    }

    #[test]
    fn test_if_else_structure() {
        let tree = build("#if FOO\na;\n#elif BAR\nb;\n#else\nc;\n#endif\n");
        assert_eq!(tree.root.len(), 1);
        let Node::If(group) = &tree.root[0] else {
            panic!("expected if group");
        };
        assert_eq!(group.branches.len(), 3);
        assert!(matches!(group.branches[0].condition, Condition::Expr(_)));
        assert!(matches!(group.branches[1].condition, Condition::Expr(_)));
        assert!(matches!(group.branches[2].condition, Condition::Else));
        assert_eq!(group.start_line, 1);
        assert_eq!(group.end_line, 7);
        for branch in &group.branches {
            assert_eq!(branch.body.len(), 1);
        }
    }

    #[test]
    fn test_nested_groups() {
        let tree = build("#if A\n#if B\nx;\n#endif\n#endif\n");
        let Node::If(outer) = &tree.root[0] else {
            panic!("expected if group");
        };
        let Node::If(inner) = &outer.branches[0].body[0] else {
            panic!("expected nested if group");
        };
        assert!(matches!(&inner.branches[0].body[0], Node::Code(_)));
    }

    #[test]
    fn test_every_code_line_in_exactly_one_range() {
        let text = "a;\n#if X\nb;\nc;\n#else\nd;\n#endif\ne;\n";
        let tree = build(text);
        let mut lines = tree.code_lines();
        lines.sort_unstable();
        assert_eq!(lines, vec![1, 3, 4, 6, 8]);
    }

    #[test]
    fn test_unmatched_endif_is_tolerated() {
        let tree = build("a;\n#endif\nb;\n");
        let mut lines = tree.code_lines();
        lines.sort_unstable();
        assert_eq!(lines, vec![1, 3]);
    }

    #[test]
    fn test_unterminated_if_closes_at_eof() {
        let tree = build("#if X\na;\n");
        assert_eq!(tree.root.len(), 1);
        let Node::If(group) = &tree.root[0] else {
            panic!("expected if group");
        };
        assert_eq!(group.branches.len(), 1);
        assert_eq!(tree.code_lines(), vec![2]);
    }

    #[test]
    fn test_include_node() {
        let tree = build("#include \"foo.h\"\n#include <bar.h>\n");
        assert_eq!(tree.root.len(), 2);
        assert!(matches!(&tree.root[0], Node::Include(_)));
        assert!(matches!(&tree.root[1], Node::Include(_)));
    }

    #[test]
    fn test_guard_detection() {
        let tree = build("#ifndef GUARD_H\n#define GUARD_H\nint x;\n#endif\n");
        assert_eq!(tree.guard.as_deref(), Some("GUARD_H"));
    }

    #[test]
    fn test_guard_detection_with_comments() {
        let tree = build("// header\n#ifndef GUARD_H\n#define GUARD_H\nint x;\n#endif\n// tail\n");
        assert_eq!(tree.guard.as_deref(), Some("GUARD_H"));
    }

    #[test]
    fn test_no_guard_with_trailing_code() {
        let tree = build("#ifndef G\n#define G\nx;\n#endif\ny;\n");
        assert_eq!(tree.guard, None);
    }

    #[test]
    fn test_no_guard_with_else() {
        let tree = build("#ifndef G\n#define G\nx;\n#else\ny;\n#endif\n");
        assert_eq!(tree.guard, None);
    }

    #[test]
    fn test_no_guard_when_define_differs() {
        let tree = build("#ifndef G\n#define OTHER\nx;\n#endif\n");
        assert_eq!(tree.guard, None);
    }

    #[test]
    fn test_total_sloc() {
        let tree = build("a;\n\n// comment\nb;\n#if X\nc;\n#endif\n");
        assert_eq!(tree.total_sloc, 5);
        assert_eq!(tree.total_lines, 7);
    }
}
