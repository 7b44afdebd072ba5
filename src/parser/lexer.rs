//! Hand-written lexer. Grounded on
//! `examples/ajokela-kz80_microperl/src/lexer.rs`'s character-at-a-time
//! scanning with a line/column cursor.

use crate::error::{ParseError, Span};

use super::token::{Token, TokenKind};

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src: src.as_bytes(), pos: 0, line: 1, column: 1 }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn span(&self) -> Span {
        Span::new(self.line, self.column)
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'/') if self.peek2() == Some(b'/') => {
                    while self.peek().is_some() && self.peek() != Some(b'\n') {
                        self.bump();
                    }
                }
                Some(b'/') if self.peek2() == Some(b'*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            None => {
                                return Err(ParseError {
                                    message: "unterminated block comment".into(),
                                    line: self.line,
                                    column: self.column,
                                })
                            }
                            Some(b'*') if self.peek2() == Some(b'/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            _ => {
                                self.bump();
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_trivia()?;
        let span = self.span();
        let Some(c) = self.peek() else {
            return Ok(Token { kind: TokenKind::Eof, span });
        };

        if c.is_ascii_digit() {
            return self.lex_number(span);
        }
        if c == b'"' {
            return self.lex_string(span);
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            return self.lex_ident(span);
        }

        macro_rules! two {
            ($second:expr, $two_kind:expr, $one_kind:expr) => {{
                self.bump();
                if self.peek() == Some($second) {
                    self.bump();
                    Ok(Token { kind: $two_kind, span })
                } else {
                    Ok(Token { kind: $one_kind, span })
                }
            }};
        }

        match c {
            b'+' => {
                self.bump();
                match self.peek() {
                    Some(b'+') => {
                        self.bump();
                        Ok(Token { kind: TokenKind::PlusPlus, span })
                    }
                    Some(b'=') => {
                        self.bump();
                        Ok(Token { kind: TokenKind::PlusEq, span })
                    }
                    _ => Ok(Token { kind: TokenKind::Plus, span }),
                }
            }
            b'-' => {
                self.bump();
                match self.peek() {
                    Some(b'-') => {
                        self.bump();
                        Ok(Token { kind: TokenKind::MinusMinus, span })
                    }
                    Some(b'=') => {
                        self.bump();
                        Ok(Token { kind: TokenKind::MinusEq, span })
                    }
                    _ => Ok(Token { kind: TokenKind::Minus, span }),
                }
            }
            b'*' => two!(b'=', TokenKind::StarEq, TokenKind::Star),
            b'/' => two!(b'=', TokenKind::SlashEq, TokenKind::Slash),
            b'%' => two!(b'=', TokenKind::PercentEq, TokenKind::Percent),
            b'=' => two!(b'=', TokenKind::EqEq, TokenKind::Assign),
            b'!' => two!(b'=', TokenKind::NotEq, TokenKind::Bang),
            b'<' => {
                self.bump();
                match self.peek() {
                    Some(b'=') => {
                        self.bump();
                        Ok(Token { kind: TokenKind::Le, span })
                    }
                    Some(b'<') => {
                        self.bump();
                        Ok(Token { kind: TokenKind::Shl, span })
                    }
                    _ => Ok(Token { kind: TokenKind::Lt, span }),
                }
            }
            b'>' => {
                self.bump();
                match self.peek() {
                    Some(b'=') => {
                        self.bump();
                        Ok(Token { kind: TokenKind::Ge, span })
                    }
                    Some(b'>') => {
                        self.bump();
                        Ok(Token { kind: TokenKind::Shr, span })
                    }
                    _ => Ok(Token { kind: TokenKind::Gt, span }),
                }
            }
            b'&' => two!(b'&', TokenKind::AndAnd, TokenKind::Amp),
            b'|' => two!(b'|', TokenKind::OrOr, TokenKind::Pipe),
            b'^' => {
                self.bump();
                Ok(Token { kind: TokenKind::Caret, span })
            }
            b'~' => {
                self.bump();
                Ok(Token { kind: TokenKind::Tilde, span })
            }
            b'.' => {
                self.bump();
                if self.peek() == Some(b'.') {
                    self.bump();
                    if self.peek() == Some(b'=') {
                        self.bump();
                        Ok(Token { kind: TokenKind::DotDotEq, span })
                    } else {
                        Ok(Token { kind: TokenKind::DotDot, span })
                    }
                } else {
                    Ok(Token { kind: TokenKind::Dot, span })
                }
            }
            b',' => {
                self.bump();
                Ok(Token { kind: TokenKind::Comma, span })
            }
            b';' => {
                self.bump();
                Ok(Token { kind: TokenKind::Semi, span })
            }
            b'(' => {
                self.bump();
                Ok(Token { kind: TokenKind::LParen, span })
            }
            b')' => {
                self.bump();
                Ok(Token { kind: TokenKind::RParen, span })
            }
            b'{' => {
                self.bump();
                Ok(Token { kind: TokenKind::LBrace, span })
            }
            b'}' => {
                self.bump();
                Ok(Token { kind: TokenKind::RBrace, span })
            }
            b'[' => {
                self.bump();
                Ok(Token { kind: TokenKind::LBracket, span })
            }
            b']' => {
                self.bump();
                Ok(Token { kind: TokenKind::RBracket, span })
            }
            other => Err(ParseError {
                message: format!("unexpected character '{}'", other as char),
                line: span.line,
                column: span.column,
            }),
        }
    }

    fn lex_number(&mut self, span: Span) -> Result<Token, ParseError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek2().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            is_float = true;
            self.bump();
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.bump();
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        if is_float {
            let value: f64 = text.parse().map_err(|_| ParseError {
                message: format!("invalid float literal '{text}'"),
                line: span.line,
                column: span.column,
            })?;
            Ok(Token { kind: TokenKind::Float(value), span })
        } else {
            let value: i64 = text.parse().map_err(|_| ParseError {
                message: format!("invalid integer literal '{text}'"),
                line: span.line,
                column: span.column,
            })?;
            Ok(Token { kind: TokenKind::Int(value), span })
        }
    }

    fn lex_string(&mut self, span: Span) -> Result<Token, ParseError> {
        self.bump(); // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                None => {
                    return Err(ParseError {
                        message: "unterminated string literal".into(),
                        line: span.line,
                        column: span.column,
                    })
                }
                Some(b'"') => break,
                Some(b'\\') => {
                    let escaped = self.bump().ok_or_else(|| ParseError {
                        message: "unterminated escape sequence".into(),
                        line: span.line,
                        column: span.column,
                    })?;
                    bytes.push(match escaped {
                        b'n' => b'\n',
                        b't' => b'\t',
                        b'r' => b'\r',
                        b'0' => 0,
                        b'\\' => b'\\',
                        b'"' => b'"',
                        other => other,
                    });
                }
                Some(c) => bytes.push(c),
            }
        }
        Ok(Token { kind: TokenKind::Str(bytes), span })
    }

    fn lex_ident(&mut self, span: Span) -> Result<Token, ParseError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_') {
            self.bump();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        let kind = match text {
            "var" => TokenKind::Var,
            "const" => TokenKind::Const,
            "function" => TokenKind::Function,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "do" => TokenKind::Do,
            "for" => TokenKind::For,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "nil" => TokenKind::Nil,
            "sizeof" => TokenKind::SizeOf,
            "typeof" => TokenKind::TypeOf,
            _ => TokenKind::Ident(text.to_string()),
        };
        Ok(Token { kind, span })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_tokens(src: &str) -> Vec<TokenKind> {
        let mut lex = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let t = lex.next_token().unwrap();
            let eof = matches!(t.kind, TokenKind::Eof);
            out.push(t.kind);
            if eof {
                break;
            }
        }
        out
    }

    #[test]
    fn lexes_concat_operator() {
        let toks = all_tokens(r#"s .. "bar""#);
        assert_eq!(toks[1], TokenKind::DotDot);
    }

    #[test]
    fn lexes_keywords_and_identifiers() {
        let toks = all_tokens("var x = 1;");
        assert_eq!(toks[0], TokenKind::Var);
        assert_eq!(toks[1], TokenKind::Ident("x".into()));
    }
}
