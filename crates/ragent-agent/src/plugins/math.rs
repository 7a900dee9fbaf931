//! `math:` arithmetic over `+ - * / ( )` and decimal literals.

use async_trait::async_trait;

use super::Plugin;

pub const INVALID: &str = "Invalid math expression.";

/// Deepest parenthesis nesting accepted.
const MAX_DEPTH: usize = 64;

pub struct MathPlugin;

#[async_trait]
impl Plugin for MathPlugin {
    fn name(&self) -> &str {
        "MathPlugin"
    }

    fn description(&self) -> &str {
        "Evaluates math expressions like \"2 + 2 * 5\" if query starts with \"math:\""
    }

    fn can_handle(&self, query: &str) -> bool {
        strip_prefix(query).is_some()
    }

    async fn handle(&self, query: &str) -> String {
        match strip_prefix(query).and_then(evaluate) {
            Some(value) => format!("Result: {value}"),
            None => INVALID.to_string(),
        }
    }
}

fn strip_prefix(query: &str) -> Option<&str> {
    let q = query.trim_start();
    let head = q.get(..5)?;
    head.eq_ignore_ascii_case("math:").then(|| &q[5..])
}

/// `None` on any character outside the grammar, a syntax error, division by
/// zero or a non-finite result.
pub fn evaluate(expr: &str) -> Option<f64> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser { tokens: &tokens, pos: 0, depth: 0 };
    let value = parser.expr()?;
    (parser.pos == tokens.len() && value.is_finite()).then_some(value)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Op(char),
    Open,
    Close,
}

fn tokenize(expr: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();
    while let Some(&(i, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' | '-' | '*' | '/' => {
                tokens.push(Token::Op(c));
                chars.next();
            }
            '(' => {
                tokens.push(Token::Open);
                chars.next();
            }
            ')' => {
                tokens.push(Token::Close);
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut end = i;
                while let Some(&(j, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = j + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Num(expr[i..end].parse().ok()?));
            }
            _ => return None,
        }
    }
    Some(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn expr(&mut self) -> Option<f64> {
        let mut acc = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            acc = if op == '+' { acc + rhs } else { acc - rhs };
        }
        Some(acc)
    }

    fn term(&mut self) -> Option<f64> {
        let mut acc = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            if op == '*' {
                acc *= rhs;
            } else {
                if rhs == 0.0 {
                    return None;
                }
                acc /= rhs;
            }
        }
        Some(acc)
    }

    fn unary(&mut self) -> Option<f64> {
        let mut negate = false;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.pos += 1;
            negate ^= op == '-';
        }
        let v = self.atom()?;
        Some(if negate { -v } else { v })
    }

    fn atom(&mut self) -> Option<f64> {
        match self.peek()? {
            Token::Num(n) => {
                self.pos += 1;
                Some(n)
            }
            Token::Open => {
                if self.depth == MAX_DEPTH {
                    return None;
                }
                self.pos += 1;
                self.depth += 1;
                let v = self.expr()?;
                if self.peek()? != Token::Close {
                    return None;
                }
                self.pos += 1;
                self.depth -= 1;
                Some(v)
            }
            _ => None,
        }
    }
}
