// SPDX-License-Identifier: GPL-3.0-or-later

//! Parsing of preprocessor directive lines.
//!
//! A directive line has already been assembled into a single logical line
//! by the lexer (continuations folded, comments stripped). This module
//! turns its token list into a structured [`Directive`].

use super::macros::MacroDefinition;
use super::{Lexer, Token, TokenKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("not a preprocessor directive")]
    NotADirective,
    #[error("invalid {0} directive")]
    InvalidDirective(&'static str),
    #[error("invalid macro definition '{0}'")]
    InvalidDefinition(String),
}

/// An `#include` argument that could be resolved at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludePath {
    pub path: String,
    /// True for `<...>` includes, false for `"..."` includes.
    pub system: bool,
}

/// A parsed preprocessor directive.
#[derive(Debug, Clone)]
pub enum Directive {
    Define(MacroDefinition),
    Undef(String),
    /// The raw argument tokens; path extraction happens at walk time
    /// because computed includes (`#include FOO`) need macro state.
    Include(Vec<Token>),
    If(Vec<Token>),
    Elif(Vec<Token>),
    Else,
    Endif,
    Pragma(Vec<Token>),
    Error(String),
    Warning(String),
    /// `#line`; recognised but deliberately not emulated.
    Line(Vec<Token>),
    /// A directive whose name is not recognised. Inert.
    Unknown(String),
}

/// A specialized token parser for recognizing directives.
pub struct DirectiveParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl DirectiveParser {
    pub fn new(tokens: Vec<Token>) -> Self {
        DirectiveParser { tokens, pos: 0 }
    }

    fn eol(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn match_identifier(&mut self) -> Option<Token> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Identifier => self.advance(),
            _ => None,
        }
    }

    fn match_punctuator(&mut self, p: &str) -> Option<Token> {
        match self.peek() {
            Some(t) if t.is_punctuator(p) => self.advance(),
            _ => None,
        }
    }

    fn rest(&mut self) -> Vec<Token> {
        let rest = self.tokens[self.pos..].to_vec();
        self.pos = self.tokens.len();
        rest
    }

    /// Parse a preprocessor directive. The token list must start with `#`.
    pub fn parse(mut self) -> Result<Directive, ParseError> {
        match self.peek() {
            Some(t) if t.is_operator("#") => {
                self.pos += 1;
            }
            _ => return Err(ParseError::NotADirective),
        }
        // A lone `#` is a valid null directive.
        let name = match self.match_identifier() {
            Some(t) => t.spelling,
            None if self.eol() => return Ok(Directive::Unknown(String::new())),
            None => return Ok(Directive::Unknown(super::spell(&self.rest()))),
        };

        let directive = match name.as_str() {
            "define" => self.define()?,
            "undef" => self.undef()?,
            "include" => Directive::Include(self.rest()),
            "if" => Directive::If(self.rest()),
            "ifdef" => self.ifdef(false)?,
            "ifndef" => self.ifdef(true)?,
            "elif" => Directive::Elif(self.rest()),
            "else" => Directive::Else,
            "endif" => Directive::Endif,
            "pragma" => Directive::Pragma(self.rest()),
            "error" => Directive::Error(super::spell(&self.rest())),
            // #warn is a GCC-inherited synonym.
            "warning" | "warn" => Directive::Warning(super::spell(&self.rest())),
            "line" => Directive::Line(self.rest()),
            _ => {
                self.rest();
                Directive::Unknown(name)
            }
        };

        if !self.eol() {
            log::warn!(
                "additional tokens at end of directive: {}",
                super::spell(&self.tokens)
            );
        }
        Ok(directive)
    }

    /// `<define> := 'define'<identifier>['('<arg-list>')']?<token-list>?`
    fn define(&mut self) -> Result<Directive, ParseError> {
        let (name, params, variadic) = self
            .macro_definition()
            .ok_or(ParseError::InvalidDirective("define"))?;
        let replacement = self.rest();
        Ok(Directive::Define(MacroDefinition::new(
            name,
            params,
            variadic,
            replacement,
        )))
    }

    fn undef(&mut self) -> Result<Directive, ParseError> {
        let identifier = self
            .match_identifier()
            .ok_or(ParseError::InvalidDirective("undef"))?;
        Ok(Directive::Undef(identifier.spelling))
    }

    /// `#ifdef X` and `#ifndef X` become `defined(X)` / `!defined(X)`
    /// expressions so the evaluator needs only one path.
    fn ifdef(&mut self, negate: bool) -> Result<Directive, ParseError> {
        let identifier = self
            .match_identifier()
            .ok_or(ParseError::InvalidDirective("ifdef"))?;
        let line = identifier.line;
        let mut expr = Vec::new();
        if negate {
            expr.push(Token::new(TokenKind::Operator, "!", line, true));
        }
        expr.push(Token::new(TokenKind::Identifier, "defined", line, !negate));
        expr.push(Token::new(TokenKind::Punctuator, "(", line, false));
        expr.push(identifier);
        expr.push(Token::new(TokenKind::Punctuator, ")", line, false));
        Ok(Directive::If(expr))
    }

    /// Match a macro definition header: an identifier, optionally followed
    /// by a parameter list whose opening paren is not preceded by
    /// whitespace. Returns `(name, params, variadic)`.
    pub fn macro_definition(&mut self) -> Option<(String, Option<Vec<String>>, bool)> {
        let identifier = self.match_identifier()?;

        match self.peek() {
            Some(t) if t.is_punctuator("(") && !t.prev_space => {
                self.pos += 1;
            }
            _ => return Some((identifier.spelling, None, false)),
        }

        let mut params = Vec::new();
        let mut variadic = false;
        loop {
            if self.match_punctuator(")").is_some() {
                break;
            }
            if let Some(arg) = self.match_identifier() {
                // A named variadic parameter: `args...`
                if self.ellipsis() {
                    params.push(arg.spelling);
                    variadic = true;
                    self.match_punctuator(")")?;
                    break;
                }
                params.push(arg.spelling);
            } else if self.ellipsis() {
                params.push(String::from("__VA_ARGS__"));
                variadic = true;
                self.match_punctuator(")")?;
                break;
            } else {
                return None;
            }
            if self.match_punctuator(",").is_none() {
                self.match_punctuator(")")?;
                break;
            }
        }
        Some((identifier.spelling, Some(params), variadic))
    }

    fn ellipsis(&mut self) -> bool {
        let start = self.pos;
        for _ in 0..3 {
            if self.match_punctuator(".").is_none() {
                self.pos = start;
                return false;
            }
        }
        true
    }
}

/// Try to extract an include path from (already expanded) argument
/// tokens: either `<path>` or a string literal.
pub fn parse_include_path(tokens: &[Token]) -> Option<IncludePath> {
    let mut tokens = tokens.iter().peekable();
    let first = tokens.next()?;

    if first.kind == TokenKind::StringLiteral {
        return Some(IncludePath {
            path: first.spelling.clone(),
            system: false,
        });
    }

    if first.is_operator("<") {
        let mut path = String::new();
        for token in tokens {
            if token.is_operator(">") {
                return Some(IncludePath { path, system: true });
            }
            path.push_str(&token.display());
        }
    }
    None
}

/// Construct a macro from a command-line definition of the form
/// `MACRO`, `MACRO=value` or `MACRO(args)=value`. A bare name defines
/// it to `1`, matching compiler `-D` behavior.
pub fn macro_from_definition_string(string: &str) -> Result<MacroDefinition, ParseError> {
    let tokens = Lexer::new(string, 0).tokenize();
    let mut parser = DirectiveParser::new(tokens);

    let (name, params, variadic) = parser
        .macro_definition()
        .ok_or_else(|| ParseError::InvalidDefinition(string.to_string()))?;

    let replacement = if parser.eol() {
        vec![Token::new(TokenKind::Number, "1", 0, false)]
    } else {
        match parser.peek() {
            Some(t) if t.is_operator("=") => {
                parser.pos += 1;
                parser.rest()
            }
            _ => return Err(ParseError::InvalidDefinition(string.to_string())),
        }
    };

    Ok(MacroDefinition::new(name, params, variadic, replacement))
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(text: &str) -> Result<Directive, ParseError> {
        let tokens = Lexer::new(text, 1).tokenize();
        DirectiveParser::new(tokens).parse()
    }

    #[test]
    fn test_object_define() {
        match parse("#define FOO 1").unwrap() {
            Directive::Define(def) => {
                assert_eq!(def.name, "FOO");
                assert!(def.params.is_none());
                assert_eq!(def.replacement.len(), 1);
                assert_eq!(def.replacement[0].spelling, "1");
            }
            other => panic!("expected define, got {other:?}"),
        }
    }

    #[test]
    fn test_function_define() {
        match parse("#define MAX(a,b) (a)>=(b)?(a):(b)").unwrap() {
            Directive::Define(def) => {
                assert_eq!(def.name, "MAX");
                assert_eq!(def.params.as_deref(), Some(&["a".to_string(), "b".to_string()][..]));
                assert!(!def.variadic);
            }
            other => panic!("expected define, got {other:?}"),
        }
    }

    #[test]
    fn test_define_with_space_before_paren_is_object_like() {
        match parse("#define FOO (a)").unwrap() {
            Directive::Define(def) => {
                assert!(def.params.is_none());
                assert_eq!(def.replacement[0].spelling, "(");
            }
            other => panic!("expected define, got {other:?}"),
        }
    }

    #[test]
    fn test_variadic_define() {
        match parse("#define LOG(fmt, ...) printf(fmt, __VA_ARGS__)").unwrap() {
            Directive::Define(def) => {
                assert!(def.variadic);
                assert_eq!(
                    def.params.as_deref(),
                    Some(&["fmt".to_string(), "__VA_ARGS__".to_string()][..])
                );
            }
            other => panic!("expected define, got {other:?}"),
        }
    }

    #[test]
    fn test_named_variadic_define() {
        match parse("#define LOG(args...) printf(args)").unwrap() {
            Directive::Define(def) => {
                assert!(def.variadic);
                assert_eq!(def.params.as_deref(), Some(&["args".to_string()][..]));
            }
            other => panic!("expected define, got {other:?}"),
        }
    }

    #[test]
    fn test_ifdef_wraps_defined() {
        match parse("#ifdef FOO").unwrap() {
            Directive::If(expr) => {
                let text: Vec<&str> = expr.iter().map(|t| t.spelling.as_str()).collect();
                assert_eq!(text, vec!["defined", "(", "FOO", ")"]);
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn test_ifndef_wraps_not_defined() {
        match parse("#ifndef FOO").unwrap() {
            Directive::If(expr) => {
                let text: Vec<&str> = expr.iter().map(|t| t.spelling.as_str()).collect();
                assert_eq!(text, vec!["!", "defined", "(", "FOO", ")"]);
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_directive() {
        match parse("#frobnicate all the things").unwrap() {
            Directive::Unknown(name) => assert_eq!(name, "frobnicate"),
            other => panic!("expected unknown, got {other:?}"),
        }
    }

    #[test]
    fn test_not_a_directive() {
        assert!(matches!(parse("int x = 0;"), Err(ParseError::NotADirective)));
    }

    #[test]
    fn test_include_path_quoted() {
        let tokens = Lexer::new("\"foo/bar.h\"", 1).tokenize();
        let path = parse_include_path(&tokens).unwrap();
        assert_eq!(path.path, "foo/bar.h");
        assert!(!path.system);
    }

    #[test]
    fn test_include_path_angle() {
        let tokens = Lexer::new("<sys/types.h>", 1).tokenize();
        let path = parse_include_path(&tokens).unwrap();
        assert_eq!(path.path, "sys/types.h");
        assert!(path.system);
    }

    #[test]
    fn test_macro_from_definition_string() {
        let def = macro_from_definition_string("FOO=3").unwrap();
        assert_eq!(def.name, "FOO");
        assert_eq!(def.replacement[0].spelling, "3");

        let def = macro_from_definition_string("FOO").unwrap();
        assert_eq!(def.replacement[0].spelling, "1");

        let def = macro_from_definition_string("MAX(a,b)=(a)").unwrap();
        assert!(def.params.is_some());
    }
}
