// SPDX-License-Identifier: GPL-3.0-or-later

//! Macro definitions, the macro table, and re-scanning expansion.
//!
//! Expansion follows the standard hide-set discipline: every token
//! produced by expanding a macro carries that macro's name in its hide
//! set, and an identifier whose own name is in its hide set is never
//! expanded again. Self-referential and mutually-referential macros
//! therefore terminate, leaving the blocked identifier in place.

use super::{same_spelling, spell, Lexer, Token, TokenKind};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

/// Backstop for the hide-set invariant. Never reached by well-formed
/// input; exceeding it leaves the remaining tokens unexpanded.
const EXPANSION_STEP_LIMIT: usize = 4096;

/// A macro definition: object-like when `params` is `None`,
/// function-like otherwise.
#[derive(Debug, Clone)]
pub struct MacroDefinition {
    pub name: String,
    pub params: Option<Vec<String>>,
    pub variadic: bool,
    pub replacement: Vec<Token>,
}

impl MacroDefinition {
    pub fn new(
        name: String,
        params: Option<Vec<String>>,
        variadic: bool,
        replacement: Vec<Token>,
    ) -> Self {
        MacroDefinition {
            name,
            params,
            variadic,
            replacement,
        }
    }

    fn same_as(&self, other: &MacroDefinition) -> bool {
        self.params == other.params
            && self.variadic == other.variadic
            && same_spelling(&self.replacement, &other.replacement)
    }

    fn param_index(&self, name: &str) -> Option<usize> {
        self.params
            .as_ref()
            .and_then(|params| params.iter().position(|p| p == name))
    }
}

/// The preprocessor's single flat macro namespace.
///
/// Definitions are reference counted so a platform walk can start from a
/// cloned baseline without copying replacement lists.
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    map: HashMap<String, Rc<MacroDefinition>>,
}

impl MacroTable {
    pub fn new() -> Self {
        MacroTable::default()
    }

    /// Insert a definition. An identical redefinition is silently
    /// accepted; a differing one warns and replaces.
    pub fn define(&mut self, def: MacroDefinition) {
        if let Some(existing) = self.map.get(&def.name) {
            if existing.same_as(&def) {
                return;
            }
            log::warn!(
                "macro '{}' redefined: was '{}', now '{}'",
                def.name,
                spell(&existing.replacement),
                spell(&def.replacement)
            );
        }
        self.map.insert(def.name.clone(), Rc::new(def));
    }

    /// Remove a definition. Undefining an absent name is legal and silent.
    pub fn undef(&mut self, name: &str) {
        self.map.remove(name);
    }

    pub fn lookup(&self, name: &str) -> Option<Rc<MacroDefinition>> {
        self.map.get(name).cloned()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }
}

/// One collected macro argument: its raw tokens (for `#` and `##`) and
/// its fully expanded form (for ordinary substitution).
struct Argument {
    raw: Vec<Token>,
    expanded: Vec<Token>,
}

/// Expand a token sequence against the given macro table.
pub fn expand(table: &MacroTable, tokens: Vec<Token>) -> Vec<Token> {
    let mut input: VecDeque<Token> = tokens.into();
    let mut out = Vec::new();
    let mut steps = 0usize;

    while let Some(token) = input.pop_front() {
        if token.kind != TokenKind::Identifier || token.hide.contains(&token.spelling) {
            out.push(token);
            continue;
        }
        let Some(def) = table.lookup(&token.spelling) else {
            out.push(token);
            continue;
        };

        steps += 1;
        if steps > EXPANSION_STEP_LIMIT {
            log::warn!("macro expansion overflow at '{}'", token.spelling);
            out.push(token);
            out.extend(input);
            break;
        }

        let replacement = match &def.params {
            None => substitute(&def, &[]),
            Some(params) => match collect_arguments(&mut input) {
                // Not followed by `(`: a function-like macro name alone
                // is not an invocation.
                None => {
                    out.push(token);
                    continue;
                }
                Some(raw) => {
                    let args = bind_arguments(table, params, def.variadic, raw, &token);
                    substitute(&def, &args)
                }
            },
        };

        let mut replacement = replacement;
        for t in replacement.iter_mut() {
            t.hide.extend(token.hide.iter().cloned());
            t.hide.insert(def.name.clone());
        }
        if let Some(first) = replacement.first_mut() {
            first.prev_space = token.prev_space;
        }
        for t in replacement.into_iter().rev() {
            input.push_front(t);
        }
    }
    out
}

/// Collect `( ... )` arguments from the stream, splitting on commas at
/// parenthesis depth one. Returns `None` if the stream does not start
/// with an opening parenthesis.
fn collect_arguments(input: &mut VecDeque<Token>) -> Option<Vec<Vec<Token>>> {
    match input.front() {
        Some(t) if t.is_punctuator("(") => {
            input.pop_front();
        }
        _ => return None,
    }

    let mut args = Vec::new();
    let mut current = Vec::new();
    let mut depth = 1u32;
    loop {
        let Some(token) = input.pop_front() else {
            log::warn!("unterminated macro invocation");
            args.push(current);
            return Some(args);
        };
        if token.is_punctuator("(") {
            depth += 1;
        } else if token.is_punctuator(")") {
            depth -= 1;
            if depth == 0 {
                args.push(current);
                return Some(args);
            }
        } else if token.is_punctuator(",") && depth == 1 {
            args.push(current);
            current = Vec::new();
            continue;
        }
        current.push(token);
    }
}

/// Match collected arguments to parameters, combining the variadic tail
/// into one comma-separated argument. Missing arguments are empty.
fn bind_arguments(
    table: &MacroTable,
    params: &[String],
    variadic: bool,
    mut raw: Vec<Vec<Token>>,
    site: &Token,
) -> Vec<Argument> {
    if variadic && !params.is_empty() {
        let tail_start = params.len() - 1;
        if raw.len() > params.len() {
            let tail = raw.split_off(tail_start);
            let mut joined = Vec::new();
            for (i, mut arg) in tail.into_iter().enumerate() {
                if i > 0 {
                    joined.push(Token::new(TokenKind::Punctuator, ",", site.line, false));
                }
                joined.append(&mut arg);
            }
            raw.push(joined);
        }
    } else if raw.len() > params.len() && !(params.is_empty() && raw.len() == 1 && raw[0].is_empty())
    {
        log::warn!(
            "macro '{}' invoked with {} arguments but takes {}",
            site.spelling,
            raw.len(),
            params.len()
        );
        raw.truncate(params.len());
    }
    while raw.len() < params.len() {
        raw.push(Vec::new());
    }

    raw.into_iter()
        .map(|tokens| Argument {
            expanded: expand(table, tokens.clone()),
            raw: tokens,
        })
        .collect()
}

/// Perform parameter substitution on a replacement list, honouring the
/// `#` and `##` operators. Placemarkers stand in for empty arguments
/// around `##` and are stripped from the result.
fn substitute(def: &MacroDefinition, args: &[Argument]) -> Vec<Token> {
    let rep = &def.replacement;
    let function_like = def.params.is_some();
    let mut out: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < rep.len() {
        let token = &rep[i];

        // `#param`: stringize the argument's source spelling.
        if function_like && token.is_operator("#") {
            if let Some(next) = rep.get(i + 1) {
                if let Some(idx) = def.param_index(&next.spelling) {
                    out.push(stringize(&args[idx].raw, token));
                    i += 2;
                    continue;
                }
            }
            log::warn!("'#' is not followed by a macro parameter in '{}'", def.name);
            out.push(token.clone());
            i += 1;
            continue;
        }

        // An operand followed by `##` starts a concatenation chain.
        if rep.get(i + 1).map(|t| t.is_operator("##")).unwrap_or(false) {
            push_raw_operand(&mut out, token, def, args);
            i += 1;
            while rep.get(i).map(|t| t.is_operator("##")).unwrap_or(false) {
                let Some(rhs) = rep.get(i + 1) else {
                    log::warn!("'##' at end of replacement for '{}'", def.name);
                    break;
                };
                let mut rhs_tokens = Vec::new();
                push_raw_operand(&mut rhs_tokens, rhs, def, args);
                paste(&mut out, rhs_tokens, &def.name);
                i += 2;
            }
            continue;
        }

        if let Some(idx) = def.param_index(&token.spelling) {
            let expansion = &args[idx].expanded;
            if let Some(first) = expansion.first() {
                let mut first = first.clone();
                first.prev_space = token.prev_space;
                out.push(first);
                out.extend(expansion.iter().skip(1).cloned());
            }
            i += 1;
            continue;
        }

        out.push(token.clone());
        i += 1;
    }

    out.retain(|t| t.kind != TokenKind::Placemarker);
    out
}

/// Push a `##` operand: a parameter becomes its raw argument (or a
/// placemarker when empty), anything else is taken literally.
fn push_raw_operand(out: &mut Vec<Token>, token: &Token, def: &MacroDefinition, args: &[Argument]) {
    match def.param_index(&token.spelling) {
        Some(idx) if args[idx].raw.is_empty() => {
            out.push(Token::new(
                TokenKind::Placemarker,
                "",
                token.line,
                token.prev_space,
            ));
        }
        Some(idx) => {
            let raw = &args[idx].raw;
            let mut first = raw[0].clone();
            first.prev_space = token.prev_space;
            out.push(first);
            out.extend(raw.iter().skip(1).cloned());
        }
        None => out.push(token.clone()),
    }
}

/// Concatenate the last token of `out` with the first of `rhs` by
/// re-lexing the joined spelling. A paste that does not form a single
/// preprocessing token warns and emits both operands.
fn paste(out: &mut Vec<Token>, rhs: Vec<Token>, macro_name: &str) {
    let Some(lhs) = out.pop() else {
        out.extend(rhs);
        return;
    };
    let mut rhs = rhs.into_iter();
    let Some(first) = rhs.next() else {
        out.push(lhs);
        return;
    };

    if lhs.kind == TokenKind::Placemarker {
        out.push(first);
    } else if first.kind == TokenKind::Placemarker {
        out.push(lhs);
    } else {
        let joined = format!("{}{}", lhs.display(), first.display());
        let mut lexer = Lexer::new(&joined, lhs.line);
        let tokens = lexer.tokenize();
        if tokens.len() == 1 {
            let mut token = tokens.into_iter().next().unwrap();
            token.prev_space = lhs.prev_space;
            out.push(token);
        } else {
            log::warn!(
                "concatenation of '{}' and '{}' in '{}' does not form a valid token",
                lhs.display(),
                first.display(),
                macro_name
            );
            out.push(lhs);
            out.push(first);
        }
    }
    out.extend(rhs);
}

/// Build the string literal produced by the `#` operator. The argument's
/// source spelling is used, not its expansion; embedded quotes and
/// backslashes are escaped.
fn stringize(raw: &[Token], site: &Token) -> Token {
    let mut content = String::new();
    for (i, token) in raw.iter().enumerate() {
        if token.prev_space && i > 0 {
            content.push(' ');
        }
        match token.kind {
            TokenKind::StringLiteral => {
                content.push_str("\\\"");
                let mut chars = token.spelling.chars().peekable();
                while let Some(c) = chars.next() {
                    if c == '\\' {
                        if chars.peek() == Some(&'"') {
                            content.push_str("\\\\\\\"");
                            chars.next();
                        } else {
                            content.push_str("\\\\");
                        }
                    } else {
                        content.push(c);
                    }
                }
                content.push_str("\\\"");
            }
            TokenKind::CharConstant => {
                content.push('\'');
                content.push_str(&token.spelling);
                content.push('\'');
            }
            _ => content.push_str(&token.spelling),
        }
    }
    Token::new(TokenKind::StringLiteral, content, site.line, site.prev_space)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::preprocessor::directive::macro_from_definition_string;

    fn table_of(defs: &[&str]) -> MacroTable {
        let mut table = MacroTable::new();
        for def in defs {
            table.define(macro_from_definition_string(def).unwrap());
        }
        table
    }

    fn expand_text(table: &MacroTable, text: &str) -> String {
        let tokens = Lexer::new(text, 1).tokenize();
        spell(&expand(table, tokens))
    }

    #[test]
    fn test_object_macro() {
        let table = table_of(&["FOO=42"]);
        assert_eq!(expand_text(&table, "FOO"), "42");
    }

    #[test]
    fn test_function_macro() {
        let table = table_of(&["MAX(a,b)=(a)>=(b)?(a):(b)"]);
        assert_eq!(expand_text(&table, "MAX(1, 2)"), "(1)>=(2)?(1):(2)");
    }

    #[test]
    fn test_function_macro_without_parens_is_literal() {
        let table = table_of(&["F(x)=x"]);
        assert_eq!(expand_text(&table, "F + 1"), "F + 1");
    }

    #[test]
    fn test_nested_arguments() {
        let table = table_of(&["ADD(a,b)=a+b"]);
        assert_eq!(expand_text(&table, "ADD(ADD(1,2),3)"), "1+2+3");
    }

    #[test]
    fn test_self_reference_terminates() {
        let table = table_of(&["FOO=(4 + FOO)"]);
        assert_eq!(expand_text(&table, "FOO"), "(4 + FOO)");
    }

    #[test]
    fn test_direct_self_reference_terminates() {
        let table = table_of(&["FOO=FOO"]);
        assert_eq!(expand_text(&table, "FOO"), "FOO");
    }

    #[test]
    fn test_indirect_self_reference_terminates() {
        let table = table_of(&["x=(4 + y)", "y=(2 * x)"]);
        assert_eq!(expand_text(&table, "x"), "(4 + (2 * x))");
        assert_eq!(expand_text(&table, "y"), "(2 * (4 + y))");
    }

    #[test]
    fn test_mutual_reference_after_undef() {
        // #define BAR 1 / #define FOO BAR / #undef BAR / #define BAR FOO:
        // the inner FOO is blue-painted and survives as an identifier.
        let mut table = MacroTable::new();
        table.define(macro_from_definition_string("BAR=1").unwrap());
        table.define(macro_from_definition_string("FOO=BAR").unwrap());
        table.undef("BAR");
        table.define(macro_from_definition_string("BAR=FOO").unwrap());
        assert_eq!(expand_text(&table, "FOO"), "FOO");
    }

    #[test]
    fn test_variadic_macro() {
        let table = table_of(&["eprintf(...)=fprintf(stderr, __VA_ARGS__)"]);
        assert_eq!(
            expand_text(&table, "eprintf(\"%d\", a, b)"),
            "fprintf(stderr, \"%d\", a, b)"
        );
    }

    #[test]
    fn test_named_variadic_macro() {
        let table = table_of(&["eprintf(args...)=fprintf(stderr, args)"]);
        assert_eq!(
            expand_text(&table, "eprintf(\"%d\", a, b)"),
            "fprintf(stderr, \"%d\", a, b)"
        );
    }

    #[test]
    fn test_stringize() {
        let table = table_of(&["STR(x)=#x"]);
        assert_eq!(expand_text(&table, "STR(a + b)"), "\"a + b\"");
    }

    #[test]
    fn test_stringize_uses_raw_argument() {
        let table = table_of(&["ONE=1", "STR(x)=#x"]);
        assert_eq!(expand_text(&table, "STR(ONE)"), "\"ONE\"");
    }

    #[test]
    fn test_stringize_escapes_strings() {
        let table = table_of(&["STR(x)=#x"]);
        assert_eq!(expand_text(&table, "STR(\"hi\")"), "\"\\\"hi\\\"\"");
    }

    #[test]
    fn test_concatenation() {
        let table = table_of(&["CAT(a,b)=a##b"]);
        assert_eq!(expand_text(&table, "CAT(foo, bar)"), "foobar");
    }

    #[test]
    fn test_concatenation_result_expands() {
        let table = table_of(&["CAT(a,b)=a##b", "foobar=99"]);
        assert_eq!(expand_text(&table, "CAT(foo, bar)"), "99");
    }

    #[test]
    fn test_concatenation_with_empty_argument() {
        let table = table_of(&["CAT(a,b)=a##b"]);
        assert_eq!(expand_text(&table, "CAT(foo,)"), "foo");
        assert_eq!(expand_text(&table, "CAT(,bar)"), "bar");
    }

    #[test]
    fn test_concatenation_chain() {
        let table = table_of(&["CAT3(a,b,c)=a##b##c"]);
        assert_eq!(expand_text(&table, "CAT3(x,y,z)"), "xyz");
    }

    #[test]
    fn test_invalid_paste_emits_both() {
        let table = table_of(&["BAD(a,b)=a##b"]);
        // `foo` and `+` do not form a single token.
        assert_eq!(expand_text(&table, "BAD(foo, +)"), "foo+");
    }

    #[test]
    fn test_argument_not_expanded_for_paste() {
        let table = table_of(&["X=1", "CAT(a,b)=a##b"]);
        assert_eq!(expand_text(&table, "CAT(X, 2)"), "X2");
    }

    #[test]
    fn test_redefinition_identical_is_silent() {
        let mut table = table_of(&["FOO=1"]);
        table.define(macro_from_definition_string("FOO=1").unwrap());
        assert_eq!(expand_text(&table, "FOO"), "1");
    }

    #[test]
    fn test_redefinition_differs_replaces() {
        let mut table = table_of(&["FOO=1"]);
        table.define(macro_from_definition_string("FOO=2").unwrap());
        assert_eq!(expand_text(&table, "FOO"), "2");
    }

    #[test]
    fn test_undef_absent_is_silent() {
        let mut table = MacroTable::new();
        table.undef("NEVER_DEFINED");
    }

    #[test]
    fn test_clone_isolates_state() {
        let mut base = table_of(&["FOO=1"]);
        let clone = base.clone();
        base.undef("FOO");
        assert!(!base.is_defined("FOO"));
        assert!(clone.is_defined("FOO"));
    }
}
