// SPDX-License-Identifier: GPL-3.0-or-later

//! Fortran logical-line assembly, free and fixed form.
//!
//! Preprocessor directives are handled exactly as in C (a directive-only
//! C prepass runs first), then Fortran rules apply to the remaining
//! lines: `!` comments outside strings, `''`/`""` escaped quotes, `&`
//! continuations in free form, column-6 continuations in fixed form.
//! `!$` sentinel comments are preserved as code when the `openmp` mode
//! is active.

use super::c::{self, OneSpaceLine};
use super::{physical_lines, FileStats, LineKind, LogicalLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Toplevel,
    ContinuingFromSol,
    DoubleQuote,
    SingleQuote,
    Escaping,
    VerifyContinue,
}

/// Strips comments and resolves `&` continuations for free-form code.
struct Cleaner {
    state: Vec<State>,
    verify_continue: Vec<char>,
    openmp: bool,
}

impl Cleaner {
    fn new(openmp: bool) -> Self {
        Cleaner {
            state: vec![State::Toplevel],
            verify_continue: Vec::new(),
            openmp,
        }
    }

    fn top(&self) -> State {
        *self.state.last().unwrap_or(&State::Toplevel)
    }

    fn continuing(&self) -> bool {
        self.top() == State::ContinuingFromSol
    }

    /// A `!` was seen: either an OpenMP-style sentinel to preserve, or a
    /// comment that consumes the rest of the line. Returns the number of
    /// characters consumed beyond the `!`.
    fn sentinel_check(&mut self, rest: &[char], out: &mut OneSpaceLine) -> usize {
        let mut found = vec!['!'];
        for (i, &c) in rest.iter().enumerate() {
            if c == '$' {
                if self.openmp {
                    found.push('$');
                    for f in found {
                        out.push_verbatim(f);
                    }
                    for &c in &rest[i + 1..] {
                        out.push_verbatim(c);
                    }
                }
                return rest.len();
            } else if c.is_alphabetic() {
                found.push(c);
            } else {
                return rest.len();
            }
        }
        rest.len()
    }

    fn process(&mut self, line: &str, out: &mut OneSpaceLine) {
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
                    } else if c == '!' {
                        i += 1 + self.sentinel_check(&chars[i + 1..], out);
                        self.state = vec![State::Toplevel];
                        break;
                    } else if c == '&' {
                        self.verify_continue.push(c);
                        self.state.push(State::VerifyContinue);
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
                State::ContinuingFromSol => {
                    if c.is_whitespace() {
                        out.push_space();
                    } else if c == '&' {
                        self.state.pop();
                    } else if c == '!' {
                        i += 1 + self.sentinel_check(&chars[i + 1..], out);
                        break;
                    } else {
                        self.state.pop();
                        consumed = false;
                    }
                }
                State::DoubleQuote => {
                    if c == '\\' {
                        self.state.push(State::Escaping);
                        out.push_verbatim(c);
                    } else if c == '"' {
                        self.state.pop();
                        out.push_verbatim(c);
                    } else if c == '&' {
                        self.verify_continue.push(c);
                        self.state.push(State::VerifyContinue);
                    } else {
                        out.push_verbatim(c);
                    }
                }
                State::SingleQuote => {
                    if c == '\\' {
                        self.state.push(State::Escaping);
                        out.push_verbatim(c);
                    } else if c == '\'' {
                        self.state.pop();
                        out.push_verbatim(c);
                    } else if c == '&' {
                        self.verify_continue.push(c);
                        self.state.push(State::VerifyContinue);
                    } else {
                        out.push_verbatim(c);
                    }
                }
                State::Escaping => {
                    out.push_verbatim(c);
                    self.state.pop();
                }
                State::VerifyContinue => {
                    if c == '!' && self.state[self.state.len() - 2] == State::Toplevel {
                        i += 1 + self.sentinel_check(&chars[i + 1..], out);
                        break;
                    } else if c.is_whitespace() {
                        self.verify_continue.push(c);
                    } else {
                        // Not a continuation after all; the buffered
                        // characters are real content.
                        for v in std::mem::take(&mut self.verify_continue) {
                            out.push_verbatim(v);
                        }
                        self.state.pop();
                        consumed = false;
                    }
                }
            }
            if consumed {
                i += 1;
            }
        }

        // A trailing `&` (possibly followed by blanks) continues the
        // logical line on the next physical line.
        if self.top() == State::VerifyContinue {
            self.verify_continue.clear();
            *self.state.last_mut().unwrap() = State::ContinuingFromSol;
        }
    }
}

/// Close the pending free-form logical line, dropping it when blank.
fn flush_logical(
    logical: &mut OneSpaceLine,
    start: &mut Option<u32>,
    end: u32,
    covered: &mut Vec<u32>,
    out: &mut Vec<LogicalLine>,
    total_sloc: &mut u32,
) {
    let kind = logical.kind();
    let text = logical.flush();
    if kind != LineKind::Blank {
        *total_sloc += covered.len() as u32;
        out.push(LogicalLine {
            text,
            start_line: start.unwrap_or(end),
            end_line: end,
            lines: std::mem::take(covered),
            kind,
        });
    } else {
        covered.clear();
    }
    *start = None;
}

/// Assemble the logical lines of a free-form Fortran source text.
pub fn free_form_lines(text: &str, openmp: bool) -> (Vec<LogicalLine>, FileStats) {
    let (c_lines, c_stats) = c::logical_lines(text, true);
    let mut cleaner = Cleaner::new(openmp);
    let mut out = Vec::new();
    let mut total_sloc = 0u32;

    let mut logical = OneSpaceLine::new();
    let mut start_line: Option<u32> = None;
    let mut end_line = 0u32;
    let mut covered: Vec<u32> = Vec::new();

    for c_line in c_lines {
        if c_line.kind == LineKind::Directive {
            flush_logical(&mut logical, &mut start_line, end_line, &mut covered, &mut out, &mut total_sloc);
            total_sloc += c_line.lines.len() as u32;
            out.push(c_line);
            continue;
        }

        if start_line.is_none() {
            start_line = Some(c_line.start_line);
        }
        end_line = c_line.end_line;

        let mut physical = OneSpaceLine::new();
        cleaner.process(&c_line.text, &mut physical);
        if !physical.is_blank() {
            covered.extend(c_line.lines.iter().copied());
        }
        logical.join(&physical);

        if !cleaner.continuing() {
            flush_logical(&mut logical, &mut start_line, end_line, &mut covered, &mut out, &mut total_sloc);
        }
    }
    flush_logical(&mut logical, &mut start_line, end_line, &mut covered, &mut out, &mut total_sloc);

    let stats = FileStats {
        total_lines: c_stats.total_lines,
        total_sloc,
    };
    (out, stats)
}

/// Close the pending fixed-form statement group.
fn flush_statement(
    pending: &mut Option<LogicalLine>,
    out: &mut Vec<LogicalLine>,
    total_sloc: &mut u32,
) {
    if let Some(line) = pending.take() {
        *total_sloc += line.lines.len() as u32;
        out.push(line);
    }
}

/// Assemble the logical lines of fixed-form Fortran. Column rules:
/// `c`, `C`, `*` or `!` in column 1 is a comment line; a non-blank,
/// non-zero character in column 6 continues the previous statement.
pub fn fixed_form_lines(text: &str, openmp: bool) -> (Vec<LogicalLine>, FileStats) {
    let raw_lines = physical_lines(text);
    let mut out = Vec::new();
    let mut total_sloc = 0u32;

    let mut pending: Option<LogicalLine> = None;
    let mut directive: Option<(String, u32, Vec<u32>)> = None;

    for (index, raw) in raw_lines.iter().enumerate() {
        let line_number = index as u32 + 1;

        // Continued directive text accumulates until a line without a
        // trailing backslash.
        if let Some((mut text, start, mut lines)) = directive.take() {
            let continued = raw.ends_with('\\');
            let body = if continued { &raw[..raw.len() - 1] } else { raw };
            text.push(' ');
            text.push_str(body.trim());
            if !body.trim().is_empty() {
                lines.push(line_number);
            }
            if continued {
                directive = Some((text, start, lines));
            } else {
                total_sloc += lines.len() as u32;
                out.push(LogicalLine {
                    text,
                    start_line: start,
                    end_line: line_number,
                    lines,
                    kind: LineKind::Directive,
                });
            }
            continue;
        }

        let trimmed = raw.trim_start();
        if trimmed.starts_with('#') {
            flush_statement(&mut pending, &mut out, &mut total_sloc);
            let continued = raw.ends_with('\\');
            let body = if continued { &raw[..raw.len() - 1] } else { raw };
            let mut buffer = OneSpaceLine::new();
            let mut comments = c::Cleaner::new(false);
            comments.process(body, &mut buffer);
            if !continued {
                comments.logical_newline(&mut buffer);
            }
            let text = buffer.flush();
            if continued {
                directive = Some((text, line_number, vec![line_number]));
            } else {
                total_sloc += 1;
                out.push(LogicalLine {
                    text,
                    start_line: line_number,
                    end_line: line_number,
                    lines: vec![line_number],
                    kind: LineKind::Directive,
                });
            }
            continue;
        }

        let chars: Vec<char> = raw.chars().collect();
        let first = chars.first().copied().unwrap_or(' ');
        let sentinel = openmp
            && chars.len() > 1
            && matches!(first, 'c' | 'C' | '*' | '!')
            && chars[1] == '$';
        if matches!(first, 'c' | 'C' | '*' | '!') && !sentinel {
            continue;
        }

        // Blank the comment sentinel so the payload reads as code.
        let mut statement: Vec<char> = chars.clone();
        if sentinel {
            statement[0] = ' ';
            statement[1] = ' ';
        }

        let continuation = statement.len() > 5 && statement[5] != ' ' && statement[5] != '0';
        let body: String = if continuation {
            statement[6..].iter().collect()
        } else {
            statement.iter().collect()
        };
        let cleaned = strip_inline_comment(&body);

        if !continuation {
            flush_statement(&mut pending, &mut out, &mut total_sloc);
        }
        if cleaned.trim().is_empty() && !continuation {
            continue;
        }

        match pending.as_mut() {
            Some(line) if continuation => {
                line.end_line = line_number;
                if !cleaned.trim().is_empty() {
                    line.lines.push(line_number);
                }
                line.text.push(' ');
                line.text.push_str(cleaned.trim());
            }
            _ => {
                pending = Some(LogicalLine {
                    text: cleaned.trim().to_string(),
                    start_line: line_number,
                    end_line: line_number,
                    lines: vec![line_number],
                    kind: LineKind::Code,
                });
            }
        }
    }
    flush_statement(&mut pending, &mut out, &mut total_sloc);
    if let Some((text, start, lines)) = directive.take() {
        log::warn!("file ends inside a continued directive");
        total_sloc += lines.len() as u32;
        out.push(LogicalLine {
            text,
            start_line: start,
            end_line: raw_lines.len() as u32,
            lines,
            kind: LineKind::Directive,
        });
    }

    let stats = FileStats {
        total_lines: raw_lines.len() as u32,
        total_sloc,
    };
    (out, stats)
}

/// Remove a trailing `!` comment, honouring quoted strings with doubled
/// quote escapes.
fn strip_inline_comment(text: &str) -> String {
    let mut out = String::new();
    let mut quote: Option<char> = None;
    for c in text.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None => {
                if c == '!' {
                    break;
                }
                if c == '\'' || c == '"' {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}
