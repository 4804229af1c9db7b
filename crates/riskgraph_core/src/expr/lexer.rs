//! Tokenizer for the expression language

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    /// `$name`, without the sigil
    Var(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Question,
    Colon,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
}

/// A token with its byte span in the source
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

struct Lexer<'a> {
    src: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn offset(&mut self) -> usize {
        self.chars.peek().map_or(self.src.len(), |(i, _)| *i)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> usize {
        while let Some(c) = self.peek_char() {
            if !pred(c) {
                break;
            }
            self.chars.next();
        }
        self.offset()
    }

    /// Consume `expected` if it is next
    fn eat(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn number(&mut self, start: usize) -> Result<Token, ParseError> {
        let mut end = self.take_while(|c| c.is_ascii_digit());
        if self.eat('.') {
            end = self.take_while(|c| c.is_ascii_digit());
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            self.chars.next();
            if matches!(self.peek_char(), Some('+' | '-')) {
                self.chars.next();
            }
            let digits_start = self.offset();
            end = self.take_while(|c| c.is_ascii_digit());
            if end == digits_start {
                return Err(ParseError::new("malformed exponent", end));
            }
        }
        let text = &self.src[start..end];
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| ParseError::new(format!("invalid number '{text}'"), start))
    }

    fn string(&mut self, quote: char, start: usize) -> Result<Token, ParseError> {
        let mut out = String::new();
        loop {
            let Some((_, c)) = self.chars.next() else {
                return Err(ParseError::new("unterminated string literal", start));
            };
            match c {
                c if c == quote => return Ok(Token::Str(out)),
                '\\' => {
                    let Some((at, escaped)) = self.chars.next() else {
                        return Err(ParseError::new("unterminated string literal", start));
                    };
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '\\' | '\'' | '"' => escaped,
                        other => {
                            return Err(ParseError::new(
                                format!("unknown escape '\\{other}'"),
                                at,
                            ));
                        }
                    });
                }
                c => out.push(c),
            }
        }
    }

    fn next_token(&mut self) -> Option<Result<Spanned, ParseError>> {
        self.take_while(char::is_whitespace);
        let (start, c) = self.chars.next()?;

        let token = match c {
            '0'..='9' => self.number(start),
            '.' if self.peek_char().is_some_and(|n| n.is_ascii_digit()) => self.number(start),
            '\'' | '"' => self.string(c, start),
            '$' => {
                let name_start = self.offset();
                let end = self.take_while(is_ident_char);
                if end == name_start || !self.src[name_start..end].starts_with(is_ident_start) {
                    Err(ParseError::new("expected variable name after '$'", start))
                } else {
                    Ok(Token::Var(self.src[name_start..end].to_string()))
                }
            }
            c if is_ident_start(c) => {
                let end = self.take_while(is_ident_char);
                Ok(Token::Ident(self.src[start..end].to_string()))
            }
            '(' => Ok(Token::LParen),
            ')' => Ok(Token::RParen),
            '[' => Ok(Token::LBracket),
            ']' => Ok(Token::RBracket),
            ',' => Ok(Token::Comma),
            '.' => Ok(Token::Dot),
            '?' => Ok(Token::Question),
            ':' => Ok(Token::Colon),
            '+' => Ok(Token::Plus),
            '-' => Ok(Token::Minus),
            '*' => Ok(Token::Star),
            '/' => Ok(Token::Slash),
            '%' => Ok(Token::Percent),
            '!' if self.eat('=') => Ok(Token::NotEq),
            '!' => Ok(Token::Bang),
            '<' if self.eat('=') => Ok(Token::Le),
            '<' => Ok(Token::Lt),
            '>' if self.eat('=') => Ok(Token::Ge),
            '>' => Ok(Token::Gt),
            '=' if self.eat('=') => Ok(Token::EqEq),
            '&' if self.eat('&') => Ok(Token::AndAnd),
            '|' if self.eat('|') => Ok(Token::OrOr),
            '=' => Err(ParseError::new("unexpected '=' (use '==' to compare)", start)),
            other => Err(ParseError::new(
                format!("unexpected character '{other}'"),
                start,
            )),
        };

        let end = self.offset();
        Some(token.map(|token| Spanned { token, start, end }))
    }
}

/// Split `src` into tokens, failing on the first unknown character.
pub(crate) fn tokenize(src: &str) -> Result<Vec<Spanned>, ParseError> {
    let mut lexer = Lexer::new(src);
    let mut tokens = Vec::new();
    while let Some(tok) = lexer.next_token() {
        tokens.push(tok?);
    }
    Ok(tokens)
}
