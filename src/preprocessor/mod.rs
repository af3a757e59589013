// SPDX-License-Identifier: GPL-3.0-or-later

//! The directive-level C preprocessor.
//!
//! This module lexes preprocessor directive text into tokens, parses
//! directives, maintains macro state and evaluates controlling
//! expressions. It implements just enough of the ISO preprocessor to
//! decide which source lines are live under a given build configuration;
//! it does not lex code bodies and does not execute pragmas.

pub mod directive;
pub mod expr;
pub mod macros;

pub use directive::{Directive, DirectiveParser, IncludePath, ParseError};
pub use expr::{evaluate, ExpressionError};
pub use macros::{expand, MacroDefinition, MacroTable};

use std::collections::BTreeSet;

/// The set of macro names a token must not expand to again.
///
/// A name enters a token's hide set when the token is produced by the
/// expansion of that macro, and never leaves. This is what guarantees
/// that macro re-scanning terminates.
pub type HideSet = BTreeSet<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    /// A preprocessing number. Not necessarily a valid integer constant.
    Number,
    /// A string literal; the spelling holds the text between the quotes.
    StringLiteral,
    /// A character constant; the spelling holds the text between the quotes.
    CharConstant,
    Operator,
    Punctuator,
    /// Stands in for an empty macro argument during `##` concatenation.
    Placemarker,
    Unknown,
}

/// A preprocessing token.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub spelling: String,
    /// Physical line the token originates from, when known.
    pub line: u32,
    /// Whether whitespace preceded this token in the source. Needed to
    /// reproduce the original spelling under the `#` operator.
    pub prev_space: bool,
    pub hide: HideSet,
}

impl Token {
    pub fn new(kind: TokenKind, spelling: impl Into<String>, line: u32, prev_space: bool) -> Self {
        Token {
            kind,
            spelling: spelling.into(),
            line,
            prev_space,
            hide: HideSet::new(),
        }
    }

    pub fn is_identifier(&self, name: &str) -> bool {
        self.kind == TokenKind::Identifier && self.spelling == name
    }

    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.spelling == op
    }

    pub fn is_punctuator(&self, p: &str) -> bool {
        self.kind == TokenKind::Punctuator && self.spelling == p
    }

    /// The spelling as it would appear in source, with string and
    /// character literals re-quoted.
    pub fn display(&self) -> String {
        match self.kind {
            TokenKind::StringLiteral => format!("\"{}\"", self.spelling),
            TokenKind::CharConstant => format!("'{}'", self.spelling),
            _ => self.spelling.clone(),
        }
    }
}

/// Two token sequences are the same replacement when kinds and spellings
/// agree; origin and hide sets are irrelevant for redefinition checks.
pub fn same_spelling(a: &[Token], b: &[Token]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| x.kind == y.kind && x.spelling == y.spelling)
}

/// Render a token sequence roughly as it appeared in the source.
pub fn spell(tokens: &[Token]) -> String {
    let mut out = String::new();
    for (i, t) in tokens.iter().enumerate() {
        if t.prev_space && i > 0 {
            out.push(' ');
        }
        out.push_str(&t.display());
    }
    out
}

/// A lexer for the C preprocessor grammar.
///
/// Operates on a single logical line of directive text. Code bodies are
/// never tokenized; only `#if`/`#elif` expressions, macro definitions and
/// include arguments pass through here.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    prev_space: bool,
}

const MULTI_CHAR_OPERATORS: [&str; 9] = ["||", "&&", ">>", "<<", "!=", ">=", "<=", "==", "##"];
const SINGLE_CHAR_OPERATORS: [char; 16] = [
    '-', '+', '!', '*', '/', '|', '&', '^', '<', '>', '?', ':', '~', '#', '=', '%',
];
const PUNCTUATORS: [char; 12] = ['(', ')', '{', '}', '[', ']', ',', '.', ';', '\'', '"', '\\'];

impl Lexer {
    pub fn new(text: &str, line: u32) -> Self {
        Lexer {
            chars: text.chars().collect(),
            pos: 0,
            line,
            prev_space: false,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<(char, char)> {
        match (self.chars.get(self.pos), self.chars.get(self.pos + 1)) {
            (Some(&a), Some(&b)) => Some((a, b)),
            _ => None,
        }
    }

    fn eos(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
            self.prev_space = true;
        }
    }

    fn take(&mut self, kind: TokenKind, spelling: String) -> Token {
        let token = Token::new(kind, spelling, self.line, self.prev_space);
        self.prev_space = false;
        token
    }

    /// `<number> := .?<digit>[<alpha>|<digit>|'_'|'.'|<exponent>]*`
    fn number(&mut self) -> Option<Token> {
        let start = self.pos;
        let mut spelling = String::new();

        if self.peek() == Some('.') {
            spelling.push('.');
            self.pos += 1;
        }
        match self.peek() {
            Some(c) if c.is_ascii_digit() => {
                spelling.push(c);
                self.pos += 1;
            }
            _ => {
                self.pos = start;
                return None;
            }
        }
        loop {
            if let Some((a, b)) = self.peek2() {
                if matches!(a, 'e' | 'E' | 'p' | 'P') && matches!(b, '+' | '-') {
                    spelling.push(a);
                    spelling.push(b);
                    self.pos += 2;
                    continue;
                }
            }
            match self.peek() {
                Some(c) if c.is_alphanumeric() || c == '_' || c == '.' => {
                    spelling.push(c);
                    self.pos += 1;
                }
                _ => break,
            }
        }
        Some(self.take(TokenKind::Number, spelling))
    }

    fn character_constant(&mut self) -> Option<Token> {
        let start = self.pos;
        if self.peek() != Some('\'') {
            return None;
        }
        self.pos += 1;
        let mut spelling = String::new();
        match self.peek() {
            Some('\\') => {
                let escaped = self.chars.get(self.pos + 1).copied();
                match escaped {
                    Some(c) => {
                        spelling.push('\\');
                        spelling.push(c);
                        self.pos += 2;
                    }
                    None => {
                        self.pos = start;
                        return None;
                    }
                }
            }
            Some(c) if c != '\'' => {
                spelling.push(c);
                self.pos += 1;
            }
            _ => {
                self.pos = start;
                return None;
            }
        }
        if self.peek() != Some('\'') {
            self.pos = start;
            return None;
        }
        self.pos += 1;
        Some(self.take(TokenKind::CharConstant, spelling))
    }

    fn string_constant(&mut self) -> Option<Token> {
        let start = self.pos;
        if self.peek() != Some('"') {
            return None;
        }
        self.pos += 1;
        let mut spelling = String::new();
        while let Some(c) = self.peek() {
            if c == '"' {
                self.pos += 1;
                return Some(self.take(TokenKind::StringLiteral, spelling));
            }
            if c == '\\' && self.chars.get(self.pos + 1) == Some(&'"') {
                spelling.push_str("\\\"");
                self.pos += 2;
            } else {
                spelling.push(c);
                self.pos += 1;
            }
        }
        // Unterminated string; back out and let the caller see the quote.
        self.pos = start;
        None
    }

    /// `<identifier> := [<alpha>|'_'][<alpha>|<digit>|'_']*`
    fn identifier(&mut self) -> Option<Token> {
        match self.peek() {
            Some(c) if c.is_alphabetic() || c == '_' => {}
            _ => return None,
        }
        let mut spelling = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                spelling.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        Some(self.take(TokenKind::Identifier, spelling))
    }

    fn operator(&mut self) -> Option<Token> {
        if let Some((a, b)) = self.peek2() {
            let pair: String = [a, b].iter().collect();
            if MULTI_CHAR_OPERATORS.contains(&pair.as_str()) {
                self.pos += 2;
                return Some(self.take(TokenKind::Operator, pair));
            }
        }
        match self.peek() {
            Some(c) if SINGLE_CHAR_OPERATORS.contains(&c) => {
                self.pos += 1;
                Some(self.take(TokenKind::Operator, c.to_string()))
            }
            _ => None,
        }
    }

    fn punctuator(&mut self) -> Option<Token> {
        match self.peek() {
            Some(c) if PUNCTUATORS.contains(&c) => {
                self.pos += 1;
                Some(self.take(TokenKind::Punctuator, c.to_string()))
            }
            _ => None,
        }
    }

    /// Consume and return the next token, or `None` when nothing matches.
    pub fn tokenize_one(&mut self) -> Option<Token> {
        self.number()
            .or_else(|| self.character_constant())
            .or_else(|| self.string_constant())
            .or_else(|| self.identifier())
            .or_else(|| self.operator())
            .or_else(|| self.punctuator())
    }

    /// Return all tokens in the input. Unmatched characters become
    /// `Unknown` tokens rather than failures.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        self.whitespace();
        while !self.eos() {
            let token = match self.tokenize_one() {
                Some(token) => token,
                None => {
                    let c = self.chars[self.pos].to_string();
                    let token = Token::new(TokenKind::Unknown, c, self.line, self.prev_space);
                    self.prev_space = false;
                    self.pos += 1;
                    token
                }
            };
            tokens.push(token);
            self.whitespace();
        }
        tokens
    }
}
