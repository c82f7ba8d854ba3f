//! Expression grammar for `[@…]` tags. Works on the raw source slice of
//! the tag body, since arithmetic has a denser token alphabet than the
//! pattern lexer provides.

use crate::rst::{ArithExpr, ArithOp, RstKind};
use crate::token::Span;

use super::{ParseResult, SyntaxError, SyntaxErrorKind};

#[derive(Debug, Clone, PartialEq)]
enum ExprToken {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    Assign,
}

/// Parse a whole `[@…]` body: `x` reads a variable, `x = expr` assigns,
/// anything else is an expression to evaluate and print.
pub(crate) fn parse_expression_tag(source: &str, span: Span) -> ParseResult<RstKind> {
    let tokens = tokenize(source, span)?;

    if tokens.is_empty() {
        return Err(invalid("empty expression", span));
    }

    if tokens.len() == 1 {
        if let ExprToken::Ident(name) = &tokens[0] {
            return Ok(RstKind::GetVar { name: name.clone() });
        }
    }

    if tokens.len() >= 2 && tokens[1] == ExprToken::Assign {
        let ExprToken::Ident(name) = &tokens[0] else {
            return Err(invalid("only a variable can be assigned to", span));
        };
        let expr = parse_all(&tokens[2..], span)?;
        return Ok(RstKind::SetVar {
            name: name.clone(),
            expr,
        });
    }

    Ok(RstKind::Arith(parse_all(&tokens, span)?))
}

fn parse_all(tokens: &[ExprToken], span: Span) -> ParseResult<ArithExpr> {
    let mut parser = ExprParser { tokens, pos: 0, span };
    let expr = parser.comparison()?;
    if parser.pos != tokens.len() {
        return Err(invalid("trailing input after expression", span));
    }
    Ok(expr)
}

fn invalid(message: &str, span: Span) -> SyntaxError {
    SyntaxError::new(
        SyntaxErrorKind::InvalidExpression {
            message: message.to_string(),
        },
        span,
    )
}

fn tokenize(source: &str, span: Span) -> ParseResult<Vec<ExprToken>> {
    let mut tokens = Vec::new();
    let bytes = source.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            b'+' => {
                tokens.push(ExprToken::Plus);
                i += 1;
            }
            b'-' => {
                tokens.push(ExprToken::Minus);
                i += 1;
            }
            b'*' => {
                tokens.push(ExprToken::Star);
                i += 1;
            }
            b'/' => {
                tokens.push(ExprToken::Slash);
                i += 1;
            }
            b'%' => {
                tokens.push(ExprToken::Percent);
                i += 1;
            }
            b'(' => {
                tokens.push(ExprToken::LParen);
                i += 1;
            }
            b')' => {
                tokens.push(ExprToken::RParen);
                i += 1;
            }
            b'<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(ExprToken::Le);
                    i += 2;
                } else {
                    tokens.push(ExprToken::Lt);
                    i += 1;
                }
            }
            b'>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(ExprToken::Ge);
                    i += 2;
                } else {
                    tokens.push(ExprToken::Gt);
                    i += 1;
                }
            }
            b'=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(ExprToken::EqEq);
                    i += 2;
                } else {
                    tokens.push(ExprToken::Assign);
                    i += 1;
                }
            }
            b'!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(ExprToken::Ne);
                    i += 2;
                } else {
                    return Err(invalid("stray '!'", span));
                }
            }
            b'0'..=b'9' | b'.' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let text = &source[start..i];
                let value: f64 = text
                    .parse()
                    .map_err(|_| invalid(&format!("bad number '{}'", text), span))?;
                tokens.push(ExprToken::Num(value));
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                tokens.push(ExprToken::Ident(source[start..i].to_string()));
            }
            other => {
                return Err(invalid(
                    &format!("unexpected character '{}'", other as char),
                    span,
                ));
            }
        }
    }

    Ok(tokens)
}

struct ExprParser<'t> {
    tokens: &'t [ExprToken],
    pos: usize,
    span: Span,
}

impl<'t> ExprParser<'t> {
    fn peek(&self) -> Option<&ExprToken> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&ExprToken> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn comparison(&mut self) -> ParseResult<ArithExpr> {
        let mut lhs = self.additive()?;
        while let Some(op) = match self.peek() {
            Some(ExprToken::Lt) => Some(ArithOp::Lt),
            Some(ExprToken::Le) => Some(ArithOp::Le),
            Some(ExprToken::Gt) => Some(ArithOp::Gt),
            Some(ExprToken::Ge) => Some(ArithOp::Ge),
            Some(ExprToken::EqEq) => Some(ArithOp::Eq),
            Some(ExprToken::Ne) => Some(ArithOp::Ne),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.additive()?;
            lhs = ArithExpr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> ParseResult<ArithExpr> {
        let mut lhs = self.multiplicative()?;
        while let Some(op) = match self.peek() {
            Some(ExprToken::Plus) => Some(ArithOp::Add),
            Some(ExprToken::Minus) => Some(ArithOp::Sub),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = ArithExpr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> ParseResult<ArithExpr> {
        let mut lhs = self.unary()?;
        while let Some(op) = match self.peek() {
            Some(ExprToken::Star) => Some(ArithOp::Mul),
            Some(ExprToken::Slash) => Some(ArithOp::Div),
            Some(ExprToken::Percent) => Some(ArithOp::Rem),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = ArithExpr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> ParseResult<ArithExpr> {
        if self.peek() == Some(&ExprToken::Minus) {
            self.pos += 1;
            let operand = self.unary()?;
            return Ok(ArithExpr::Neg(Box::new(operand)));
        }
        self.primary()
    }

    fn primary(&mut self) -> ParseResult<ArithExpr> {
        let span = self.span;
        match self.next() {
            Some(ExprToken::Num(value)) => Ok(ArithExpr::Number(*value)),
            Some(ExprToken::Ident(name)) => Ok(ArithExpr::Var(name.clone())),
            Some(ExprToken::LParen) => {
                let inner = self.comparison()?;
                match self.next() {
                    Some(ExprToken::RParen) => Ok(inner),
                    _ => Err(invalid("missing ')'", span)),
                }
            }
            _ => Err(invalid("expected a number, variable, or '('", span)),
        }
    }
}
