//! Hand-written recursive descent parser.
//!
//! Precedence, lowest first: ternary `?:` (right-associative), `||`, `&&`,
//! equality, relational, additive, multiplicative, unary, postfix access,
//! primary. Binary levels are parsed with loops into flat `Chain` nodes.

use super::ast::{BinaryOp, Expr, LogicalOp, Root, Segment, UnaryOp};
use super::lexer::{Spanned, Token, tokenize};
use crate::error::ParseError;
use crate::model::Value;

/// Deepest nesting of parentheses, calls, indices and unary operators
pub const MAX_NESTING_DEPTH: usize = 128;

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    src_len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.src_len, |s| s.start)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|s| s.token.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), ParseError> {
        if self.eat(expected) {
            Ok(())
        } else if self.peek().is_some() {
            Err(ParseError::new(format!("expected {what}"), self.offset()))
        } else {
            Err(ParseError::new(
                format!("expected {what} but input ended"),
                self.src_len,
            ))
        }
    }

    fn descend(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::new("expression nested too deeply", self.offset()));
        }
        Ok(())
    }

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.descend()?;
        let expr = self.parse_ternary();
        self.depth -= 1;
        expr
    }

    fn parse_ternary(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_or()?;
        if !self.eat(&Token::Question) {
            return Ok(cond);
        }
        let then = self.parse_expression()?;
        self.expect(&Token::Colon, "':' in conditional expression")?;
        let otherwise = self.parse_expression()?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_logical(
        &mut self,
        op: LogicalOp,
        token: &Token,
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let first = next(self)?;
        if self.peek() != Some(token) {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat(token) {
            operands.push(next(self)?);
        }
        Ok(Expr::Logical { op, operands })
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        self.parse_logical(LogicalOp::Or, &Token::OrOr, Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        self.parse_logical(LogicalOp::And, &Token::AndAnd, Self::parse_equality)
    }

    /// Parse one left-associative precedence level
    fn parse_chain(
        &mut self,
        op_for: fn(&Token) -> Option<BinaryOp>,
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let first = next(self)?;
        let mut rest = Vec::new();
        while let Some(op) = self.peek().and_then(op_for) {
            self.pos += 1;
            rest.push((op, next(self)?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Chain {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        self.parse_chain(
            |t| match t {
                Token::EqEq => Some(BinaryOp::Eq),
                Token::NotEq => Some(BinaryOp::Ne),
                _ => None,
            },
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        self.parse_chain(
            |t| match t {
                Token::Lt => Some(BinaryOp::Lt),
                Token::Le => Some(BinaryOp::Le),
                Token::Gt => Some(BinaryOp::Gt),
                Token::Ge => Some(BinaryOp::Ge),
                _ => None,
            },
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        self.parse_chain(
            |t| match t {
                Token::Plus => Some(BinaryOp::Add),
                Token::Minus => Some(BinaryOp::Sub),
                _ => None,
            },
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.parse_chain(
            |t| match t {
                Token::Star => Some(BinaryOp::Mul),
                Token::Slash => Some(BinaryOp::Div),
                Token::Percent => Some(BinaryOp::Mod),
                _ => None,
            },
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Plus,
            Some(Token::Bang) => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        self.pos += 1;
        self.descend()?;
        let operand = self.parse_unary();
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(operand?)))
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_primary()?;
        let mut path = Vec::new();
        loop {
            if self.eat(&Token::Dot) {
                match self.advance() {
                    Some(Token::Ident(name)) => path.push(Segment::Field(name)),
                    _ => {
                        return Err(ParseError::new(
                            "expected field name after '.'",
                            self.tokens
                                .get(self.pos.saturating_sub(1))
                                .map_or(self.src_len, |s| s.start),
                        ));
                    }
                }
            } else if self.eat(&Token::LBracket) {
                let index = self.parse_expression()?;
                self.expect(&Token::RBracket, "']'")?;
                path.push(Segment::Index(index));
            } else {
                break;
            }
        }
        if path.is_empty() {
            Ok(base)
        } else {
            Ok(Expr::Access {
                base: Box::new(base),
                path,
            })
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        let Some(token) = self.advance() else {
            return Err(ParseError::new("unexpected end of expression", self.src_len));
        };
        match token {
            Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Var(name) => Root::from_name(&name)
                .map(Expr::Root)
                .ok_or_else(|| ParseError::new(format!("unknown variable ${name}"), offset)),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ if self.peek() == Some(&Token::LParen) => {
                    self.pos += 1;
                    let args = self.parse_arguments()?;
                    Ok(Expr::Call { name, args })
                }
                _ => Ok(Expr::Ident(name)),
            },
            Token::LParen => {
                let inner = self.parse_expression()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.parse_expression()?);
                        if self.eat(&Token::RBracket) {
                            break;
                        }
                        self.expect(&Token::Comma, "',' or ']'")?;
                    }
                }
                Ok(Expr::Call {
                    name: "array".to_string(),
                    args: items,
                })
            }
            other => Err(ParseError::new(
                format!("unexpected token {other:?}"),
                offset,
            )),
        }
    }

    /// Arguments after an opening parenthesis, through the closing one
    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            self.expect(&Token::Comma, "',' or ')'")?;
        }
    }
}

/// Parse a complete expression. Trailing tokens are an error.
pub fn parse(src: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(ParseError::new("empty expression", 0));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        src_len: src.len(),
    };
    let expr = parser.parse_expression()?;
    if parser.pos < parser.tokens.len() {
        return Err(ParseError::new("unexpected trailing input", parser.offset()));
    }
    Ok(expr)
}
