// SPDX-License-Identifier: GPL-3.0-or-later

//! Evaluation of `#if` and `#elif` controlling expressions.
//!
//! `defined` is resolved before macro expansion (its operand must not be
//! expanded), then the token list is expanded and evaluated by precedence
//! climbing. Any identifier that survives expansion evaluates to 0, as
//! does any call-shaped leftover. `&&`, `||` and `?:` are lazy: the
//! unevaluated side may even be malformed, which matters because macros
//! guarded by `defined` are often undefined on the dead side.

use super::macros::{expand, MacroTable};
use super::{Token, TokenKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("division by zero in controlling expression")]
    DivisionByZero,
    #[error("invalid controlling expression: {0}")]
    Syntax(String),
}

/// Evaluate a controlling expression. Returns the truth of the
/// expression; 0 is false.
pub fn evaluate(table: &MacroTable, tokens: &[Token]) -> Result<bool, ExpressionError> {
    let resolved = resolve_defined(table, tokens)?;
    let expanded = expand(table, resolved);
    let mut evaluator = Evaluator::new(&expanded);
    let value = evaluator.expression(0, true)?;
    if !evaluator.eol() {
        return Err(ExpressionError::Syntax(format!(
            "unexpected token '{}'",
            evaluator.tokens[evaluator.pos].spelling
        )));
    }
    Ok(!value.is_zero())
}

/// Replace `defined(X)` and `defined X` with `1` or `0` before any
/// macro expansion takes place.
fn resolve_defined(table: &MacroTable, tokens: &[Token]) -> Result<Vec<Token>, ExpressionError> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if !token.is_identifier("defined") {
            out.push(token.clone());
            i += 1;
            continue;
        }
        i += 1;
        let parenthesized = matches!(tokens.get(i), Some(t) if t.is_punctuator("("));
        if parenthesized {
            i += 1;
        }
        let operand = match tokens.get(i) {
            Some(t) if t.kind == TokenKind::Identifier => t,
            _ => {
                return Err(ExpressionError::Syntax(
                    "expected identifier after 'defined'".to_string(),
                ))
            }
        };
        let value = if table.is_defined(&operand.spelling) {
            "1"
        } else {
            "0"
        };
        out.push(Token::new(
            TokenKind::Number,
            value,
            operand.line,
            token.prev_space,
        ));
        i += 1;
        if parenthesized {
            match tokens.get(i) {
                Some(t) if t.is_punctuator(")") => i += 1,
                _ => {
                    return Err(ExpressionError::Syntax(
                        "expected ')' after 'defined' identifier".to_string(),
                    ))
                }
            }
        }
    }
    Ok(out)
}

/// The preprocessor always computes in 64 bits; a `u` suffix or an
/// unsigned operand promotes the operation to unsigned.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Signed(i64),
    Unsigned(u64),
}

impl Value {
    fn is_zero(self) -> bool {
        match self {
            Value::Signed(v) => v == 0,
            Value::Unsigned(v) => v == 0,
        }
    }

    fn truth(b: bool) -> Value {
        Value::Signed(b as i64)
    }

    fn as_u64(self) -> u64 {
        match self {
            Value::Signed(v) => v as u64,
            Value::Unsigned(v) => v,
        }
    }

    fn as_i64(self) -> i64 {
        match self {
            Value::Signed(v) => v,
            Value::Unsigned(v) => v as i64,
        }
    }
}

struct OpInfo {
    prec: u8,
    right_assoc: bool,
}

fn binary_op(spelling: &str) -> Option<OpInfo> {
    let (prec, right_assoc) = match spelling {
        "," => (0, false),
        "?" => (1, true),
        "||" => (2, false),
        "&&" => (3, false),
        "|" => (4, false),
        "^" => (5, false),
        "&" => (6, false),
        "==" | "!=" => (7, false),
        "<" | "<=" | ">" | ">=" => (8, false),
        "<<" | ">>" => (9, false),
        "+" | "-" => (10, false),
        "*" | "/" | "%" => (11, false),
        _ => return None,
    };
    Some(OpInfo { prec, right_assoc })
}

const UNARY_PRECEDENCE: u8 = 12;

struct Evaluator<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Evaluator<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Evaluator { tokens, pos: 0 }
    }

    fn eol(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn syntax<T>(&self, message: &str) -> Result<T, ExpressionError> {
        Err(ExpressionError::Syntax(message.to_string()))
    }

    /// Precedence-climbing expression parser and evaluator. When `live`
    /// is false the tokens are consumed but nothing is computed and
    /// value errors are suppressed.
    fn expression(&mut self, min_prec: u8, live: bool) -> Result<Value, ExpressionError> {
        let mut lhs = self.primary(live)?;

        while let Some(info) = self.peek().and_then(|t| {
            if t.kind == TokenKind::Operator || t.is_punctuator(",") {
                binary_op(&t.spelling)
            } else {
                None
            }
        }) {
            if info.prec < min_prec {
                break;
            }
            let op = self.tokens[self.pos].spelling.clone();
            self.pos += 1;

            if op == "?" {
                let condition = !lhs.is_zero();
                let true_arm = self.dead_tolerant(0, live && condition)?;
                match self.peek() {
                    Some(t) if t.is_operator(":") => self.pos += 1,
                    _ => return self.syntax("expected ':' in conditional expression"),
                }
                let false_arm = self.dead_tolerant(info.prec, live && !condition)?;
                lhs = if condition { true_arm } else { false_arm };
                continue;
            }

            // Short-circuit: the dead side is parsed but never evaluated.
            let rhs_live = match op.as_str() {
                "&&" => live && !lhs.is_zero(),
                "||" => live && lhs.is_zero(),
                _ => live,
            };
            let next_prec = if info.right_assoc {
                info.prec
            } else {
                info.prec + 1
            };
            let rhs = self.dead_tolerant(next_prec, rhs_live)?;

            lhs = if live {
                self.apply(&op, lhs, rhs)?
            } else {
                Value::Signed(0)
            };
        }
        Ok(lhs)
    }

    /// Parse a sub-expression that may be dead. Errors inside a dead
    /// operand are swallowed; the cursor skips to the end of the operand.
    fn dead_tolerant(&mut self, min_prec: u8, live: bool) -> Result<Value, ExpressionError> {
        if live {
            return self.expression(min_prec, true);
        }
        let start = self.pos;
        match self.expression(min_prec, false) {
            Ok(_) => Ok(Value::Signed(0)),
            Err(_) => {
                self.pos = start;
                self.skip_operand();
                Ok(Value::Signed(0))
            }
        }
    }

    /// Error recovery for a dead operand: consume tokens up to the next
    /// structural boundary at the current nesting level.
    fn skip_operand(&mut self) {
        let mut depth = 0u32;
        while let Some(token) = self.peek() {
            if token.is_punctuator("(") {
                depth += 1;
            } else if token.is_punctuator(")") {
                if depth == 0 {
                    return;
                }
                depth -= 1;
            } else if depth == 0
                && (token.is_operator(":")
                    || token.is_punctuator(",")
                    || token.is_operator("&&")
                    || token.is_operator("||"))
            {
                return;
            }
            self.pos += 1;
        }
    }

    /// `<primary> := <unary-op><expression> | '('<expression>')' | <term>`
    fn primary(&mut self, live: bool) -> Result<Value, ExpressionError> {
        let Some(token) = self.peek() else {
            return self.syntax("unexpected end of expression");
        };

        if token.kind == TokenKind::Operator {
            let op = token.spelling.clone();
            if matches!(op.as_str(), "-" | "+" | "!" | "~") {
                self.pos += 1;
                let operand = self.expression(UNARY_PRECEDENCE, live)?;
                if !live {
                    return Ok(Value::Signed(0));
                }
                return Ok(match op.as_str() {
                    "-" => match operand {
                        Value::Signed(v) => Value::Signed(v.wrapping_neg()),
                        Value::Unsigned(v) => Value::Unsigned(v.wrapping_neg()),
                    },
                    "+" => operand,
                    "!" => Value::truth(operand.is_zero()),
                    _ => match operand {
                        Value::Signed(v) => Value::Signed(!v),
                        Value::Unsigned(v) => Value::Unsigned(!v),
                    },
                });
            }
            return self.syntax(&format!("unexpected operator '{op}'"));
        }

        if token.is_punctuator("(") {
            self.pos += 1;
            let value = self.expression(0, live)?;
            match self.peek() {
                Some(t) if t.is_punctuator(")") => self.pos += 1,
                _ => return self.syntax("expected ')'"),
            }
            return Ok(value);
        }

        self.term(live)
    }

    fn term(&mut self, live: bool) -> Result<Value, ExpressionError> {
        let Some(token) = self.peek() else {
            return self.syntax("unexpected end of expression");
        };
        match token.kind {
            TokenKind::Number => {
                let spelling = token.spelling.clone();
                self.pos += 1;
                match parse_integer(&spelling) {
                    Some(value) => Ok(value),
                    None if live => {
                        self.syntax(&format!("'{spelling}' is not an integer constant"))
                    }
                    None => Ok(Value::Signed(0)),
                }
            }
            TokenKind::CharConstant => {
                let value = character_value(&token.spelling);
                self.pos += 1;
                Ok(Value::Signed(value))
            }
            TokenKind::Identifier => {
                self.pos += 1;
                // A call-shaped leftover consumes its argument list; both
                // it and a bare identifier evaluate to false.
                if matches!(self.peek(), Some(t) if t.is_punctuator("(")) {
                    self.pos += 1;
                    if !matches!(self.peek(), Some(t) if t.is_punctuator(")")) {
                        loop {
                            self.dead_tolerant(1, false)?;
                            match self.peek() {
                                Some(t) if t.is_punctuator(",") => self.pos += 1,
                                _ => break,
                            }
                        }
                    }
                    match self.peek() {
                        Some(t) if t.is_punctuator(")") => self.pos += 1,
                        _ => return self.syntax("expected ')' after call arguments"),
                    }
                }
                Ok(Value::Signed(0))
            }
            _ => self.syntax(&format!("unexpected token '{}'", token.spelling)),
        }
    }

    fn apply(&self, op: &str, lhs: Value, rhs: Value) -> Result<Value, ExpressionError> {
        use Value::{Signed, Unsigned};

        // Usual arithmetic conversions, 64-bit only: unsigned wins.
        let unsigned = matches!(lhs, Unsigned(_)) || matches!(rhs, Unsigned(_));

        if matches!(op, "/" | "%") && rhs.is_zero() {
            return Err(ExpressionError::DivisionByZero);
        }

        let value = match op {
            "," => rhs,
            "||" => Value::truth(!lhs.is_zero() || !rhs.is_zero()),
            "&&" => Value::truth(!lhs.is_zero() && !rhs.is_zero()),
            "==" => Value::truth(lhs.as_u64() == rhs.as_u64()),
            "!=" => Value::truth(lhs.as_u64() != rhs.as_u64()),
            "<" | "<=" | ">" | ">=" => {
                let result = if unsigned {
                    let (a, b) = (lhs.as_u64(), rhs.as_u64());
                    match op {
                        "<" => a < b,
                        "<=" => a <= b,
                        ">" => a > b,
                        _ => a >= b,
                    }
                } else {
                    let (a, b) = (lhs.as_i64(), rhs.as_i64());
                    match op {
                        "<" => a < b,
                        "<=" => a <= b,
                        ">" => a > b,
                        _ => a >= b,
                    }
                };
                Value::truth(result)
            }
            "|" | "^" | "&" => {
                let (a, b) = (lhs.as_u64(), rhs.as_u64());
                let bits = match op {
                    "|" => a | b,
                    "^" => a ^ b,
                    _ => a & b,
                };
                if unsigned {
                    Unsigned(bits)
                } else {
                    Signed(bits as i64)
                }
            }
            "<<" | ">>" => {
                let shift = (rhs.as_u64() & 63) as u32;
                if unsigned {
                    let a = lhs.as_u64();
                    Unsigned(if op == "<<" { a.wrapping_shl(shift) } else { a.wrapping_shr(shift) })
                } else {
                    let a = lhs.as_i64();
                    Signed(if op == "<<" { a.wrapping_shl(shift) } else { a.wrapping_shr(shift) })
                }
            }
            "+" | "-" | "*" | "/" | "%" => {
                if unsigned {
                    let (a, b) = (lhs.as_u64(), rhs.as_u64());
                    Unsigned(match op {
                        "+" => a.wrapping_add(b),
                        "-" => a.wrapping_sub(b),
                        "*" => a.wrapping_mul(b),
                        "/" => a / b,
                        _ => a % b,
                    })
                } else {
                    let (a, b) = (lhs.as_i64(), rhs.as_i64());
                    Signed(match op {
                        "+" => a.wrapping_add(b),
                        "-" => a.wrapping_sub(b),
                        "*" => a.wrapping_mul(b),
                        "/" => a.wrapping_div(b),
                        _ => a.wrapping_rem(b),
                    })
                }
            }
            _ => return self.syntax(&format!("'{op}' is not a binary operator")),
        };
        Ok(value)
    }
}

/// Parse a C integer literal: decimal, hex, octal or binary, with the
/// standard `u`/`l` suffix combinations.
fn parse_integer(spelling: &str) -> Option<Value> {
    let mut text = spelling;
    let mut unsigned = false;
    loop {
        let lower = text.to_ascii_lowercase();
        if lower.ends_with("ll") {
            text = &text[..text.len() - 2];
        } else if lower.ends_with('l') {
            text = &text[..text.len() - 1];
        } else if lower.ends_with('u') {
            unsigned = true;
            text = &text[..text.len() - 1];
        } else {
            break;
        }
    }
    if text.is_empty() {
        return None;
    }

    let (base, digits) = if text.len() > 2 && (text.starts_with("0x") || text.starts_with("0X")) {
        (16, &text[2..])
    } else if text.len() > 2 && (text.starts_with("0b") || text.starts_with("0B")) {
        (2, &text[2..])
    } else if text.len() > 1 && text.starts_with('0') {
        (8, &text[1..])
    } else {
        (10, text)
    };

    // Parse wide and truncate: the preprocessor wraps at 64 bits.
    let wide = u128::from_str_radix(digits, base).ok()?;
    let value = wide as u64;
    Some(if unsigned {
        Value::Unsigned(value)
    } else {
        Value::Signed(value as i64)
    })
}

/// The value of a character constant is the code point of its first
/// character, after decoding a simple escape.
fn character_value(spelling: &str) -> i64 {
    let mut chars = spelling.chars();
    match chars.next() {
        Some('\\') => match chars.next() {
            Some('n') => 10,
            Some('t') => 9,
            Some('r') => 13,
            Some('0') => 0,
            Some('a') => 7,
            Some('b') => 8,
            Some('f') => 12,
            Some('v') => 11,
            Some(c) => c as i64,
            None => 0,
        },
        Some(c) => c as i64,
        None => 0,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::preprocessor::directive::macro_from_definition_string;
    use crate::preprocessor::Lexer;

    fn eval(table: &MacroTable, text: &str) -> Result<bool, ExpressionError> {
        let tokens = Lexer::new(text, 1).tokenize();
        evaluate(table, &tokens)
    }

    fn eval_empty(text: &str) -> Result<bool, ExpressionError> {
        eval(&MacroTable::new(), text)
    }

    fn table_of(defs: &[&str]) -> MacroTable {
        let mut table = MacroTable::new();
        for def in defs {
            table.define(macro_from_definition_string(def).unwrap());
        }
        table
    }

    #[test]
    fn test_arithmetic() {
        assert!(eval_empty("1 + 1 == 2").unwrap());
        assert!(eval_empty("2 * 3 + 1 == 7").unwrap());
        assert!(eval_empty("7 / 2 == 3").unwrap());
        assert!(eval_empty("7 % 2 == 1").unwrap());
        assert!(eval_empty("1 - 2 < 0").unwrap());
    }

    #[test]
    fn test_precedence() {
        assert!(eval_empty("1 + 2 * 3 == 7").unwrap());
        assert!(eval_empty("(1 + 2) * 3 == 9").unwrap());
        assert!(eval_empty("1 << 2 + 1 == 8").unwrap());
    }

    #[test]
    fn test_bases_and_suffixes() {
        assert!(eval_empty("0x10 == 16").unwrap());
        assert!(eval_empty("0b101 == 5").unwrap());
        assert!(eval_empty("010 == 8").unwrap());
        assert!(eval_empty("10ull == 10").unwrap());
        assert!(eval_empty("1L + 1U == 2").unwrap());
    }

    #[test]
    fn test_character_constants() {
        assert!(eval_empty("'a' == 97").unwrap());
        assert!(eval_empty("'\\n' == 10").unwrap());
    }

    #[test]
    fn test_unary_operators() {
        assert!(eval_empty("!0").unwrap());
        assert!(!eval_empty("!1").unwrap());
        assert!(eval_empty("-1 < 0").unwrap());
        assert!(eval_empty("~0 == -1").unwrap());
    }

    #[test]
    fn test_ternary() {
        assert!(eval_empty("1 ? 1 : 0").unwrap());
        assert!(!eval_empty("0 ? 1 : 0").unwrap());
        assert!(eval_empty("0 ? 0 : 1").unwrap());
    }

    #[test]
    fn test_undefined_identifier_is_zero() {
        assert!(!eval_empty("UNDEFINED_MACRO").unwrap());
        assert!(eval_empty("UNDEFINED_MACRO == 0").unwrap());
    }

    #[test]
    fn test_leftover_call_is_zero() {
        assert!(!eval_empty("SOME_FUNCTION(1, 2)").unwrap());
    }

    #[test]
    fn test_defined() {
        let table = table_of(&["FOO=1"]);
        assert!(eval(&table, "defined(FOO)").unwrap());
        assert!(eval(&table, "defined FOO").unwrap());
        assert!(!eval(&table, "defined(BAR)").unwrap());
        assert!(eval(&table, "!defined(BAR)").unwrap());
    }

    #[test]
    fn test_defined_operand_not_expanded() {
        // FOO expands to BAR, but defined(FOO) must test FOO itself.
        let table = table_of(&["FOO=BAR"]);
        assert!(eval(&table, "defined(FOO)").unwrap());
        assert!(!eval(&table, "defined(BAR)").unwrap());
    }

    #[test]
    fn test_short_circuit_guard() {
        // The right operand is unreachable; X is undefined.
        assert!(!eval_empty("defined(X) && X > 0").unwrap());
        assert!(eval_empty("!defined(X) || X > 0").unwrap());
    }

    #[test]
    fn test_short_circuit_skips_division_by_zero() {
        assert!(!eval_empty("0 && 1 / 0").unwrap());
        assert!(eval_empty("1 || 1 / 0").unwrap());
    }

    #[test]
    fn test_short_circuit_tolerates_malformed_operand() {
        assert!(!eval_empty("0 && (%)").unwrap());
        assert!(eval_empty("1 || (%)").unwrap());
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        assert!(matches!(
            eval_empty("1 / 0"),
            Err(ExpressionError::DivisionByZero)
        ));
        assert!(matches!(
            eval_empty("1 % 0"),
            Err(ExpressionError::DivisionByZero)
        ));
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(eval_empty("1 +"), Err(ExpressionError::Syntax(_))));
        assert!(matches!(eval_empty("(1"), Err(ExpressionError::Syntax(_))));
    }

    #[test]
    fn test_macro_expansion_in_expression() {
        let table = table_of(&["A=1", "B=2", "MAX(a,b)=(a)>=(b)?(a):(b)"]);
        assert!(!eval(&table, "MAX(A,B) == 0").unwrap());
        assert!(eval(&table, "MAX(A,B) == 2").unwrap());
    }

    #[test]
    fn test_unsigned_promotion() {
        // -1 compared against an unsigned operand wraps to u64::MAX.
        assert!(eval_empty("-1 > 0u").unwrap());
        assert!(eval_empty("-1 < 0").unwrap());
    }

    #[test]
    fn test_wrapping() {
        assert!(eval_empty("0x7fffffffffffffff + 1 < 0").unwrap());
    }

    #[test]
    fn test_comma_operator() {
        assert!(eval_empty("(1, 0, 2) == 2").unwrap());
    }
}
