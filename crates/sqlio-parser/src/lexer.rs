//! SQL lexer
//!
//! Converts source text into [`Token`]s, tracking byte offset, line and
//! column. `--` and `/* */` comments are skipped.

use crate::error::{ParseError, Result};
use crate::token::{Token, TokenKind};

/// Cursor over SQL source
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    /// Lexer positioned at the start of `src`
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Tokenize all of `src`; the last token is always [`TokenKind::Eof`]
    pub fn tokenize(src: &'a str) -> Result<Vec<Token>> {
        let mut lexer = Self::new(src);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token()?;
            let eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if eof {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.as_bytes().get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else if b & 0xC0 != 0x80 {
            // continuation bytes belong to the previous character
            self.col += 1;
        }
        Some(b)
    }

    fn bump_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.pos, self.line, self.col)
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(b), _) if b.is_ascii_whitespace() => {
                    self.bump();
                }
                (Some(b'-'), Some(b'-')) => {
                    self.bump_while(|b| b != b'\n');
                }
                (Some(b'/'), Some(b'*')) => {
                    let err = self.error("unterminated comment");
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some(b'*') if self.peek() == Some(b'/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                            None => return Err(err),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Next token
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_trivia()?;
        let (position, line, col) = (self.pos, self.line, self.col);
        let kind = match self.peek() {
            None => TokenKind::Eof,
            Some(b) => self.lex(b)?,
        };
        Ok(Token {
            kind,
            position,
            line,
            col,
        })
    }

    fn lex(&mut self, b: u8) -> Result<TokenKind> {
        let single = |lexer: &mut Self, kind: TokenKind| -> Result<TokenKind> {
            lexer.bump();
            Ok(kind)
        };
        match b {
            b'\'' => self.string(),
            b'`' | b'"' => self.quoted(b, b),
            b'[' => self.quoted(b'[', b']'),
            b'0'..=b'9' => self.number(),
            b'.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.number(),
            b if is_word_start(b) => Ok(TokenKind::Word(self.bump_while(is_word_char).to_string())),
            b'?' => {
                let start = self.pos;
                self.bump();
                self.bump_while(|c| c.is_ascii_digit());
                Ok(TokenKind::Placeholder(self.src[start..self.pos].to_string()))
            }
            b'$' | b':' | b'@' => {
                let start = self.pos;
                self.bump();
                let name = self.bump_while(is_word_char);
                if name.is_empty() {
                    return Err(self.error(format!("expected parameter name after '{}'", b as char)));
                }
                Ok(TokenKind::Placeholder(self.src[start..self.pos].to_string()))
            }
            b',' => single(self, TokenKind::Comma),
            b'.' => single(self, TokenKind::Dot),
            b'(' => single(self, TokenKind::LParen),
            b')' => single(self, TokenKind::RParen),
            b'*' => single(self, TokenKind::Star),
            b'+' => single(self, TokenKind::Plus),
            b'-' => single(self, TokenKind::Minus),
            b'/' => single(self, TokenKind::Slash),
            b';' => single(self, TokenKind::Semicolon),
            b'=' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                }
                Ok(TokenKind::Eq)
            }
            b'!' if self.peek_at(1) == Some(b'=') => {
                self.bump();
                self.bump();
                Ok(TokenKind::Ne)
            }
            b'<' => {
                self.bump();
                match self.peek() {
                    Some(b'=') => single(self, TokenKind::Le),
                    Some(b'>') => single(self, TokenKind::Ne),
                    _ => Ok(TokenKind::Lt),
                }
            }
            b'>' => {
                self.bump();
                match self.peek() {
                    Some(b'=') => single(self, TokenKind::Ge),
                    _ => Ok(TokenKind::Gt),
                }
            }
            _ => {
                let ch = self.src[self.pos..].chars().next().unwrap_or('?');
                Err(self.error(format!("unexpected character '{ch}'")))
            }
        }
    }

    fn string(&mut self) -> Result<TokenKind> {
        let err = self.error("unterminated string literal");
        self.bump();
        let mut out = String::new();
        let mut start = self.pos;
        loop {
            match self.peek() {
                None => return Err(err),
                Some(b'\'') if self.peek_at(1) == Some(b'\'') => {
                    out.push_str(&self.src[start..=self.pos]);
                    self.bump();
                    self.bump();
                    start = self.pos;
                }
                Some(b'\'') => {
                    out.push_str(&self.src[start..self.pos]);
                    self.bump();
                    return Ok(TokenKind::String(out));
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    fn quoted(&mut self, open: u8, close: u8) -> Result<TokenKind> {
        let err = self.error("unterminated quoted identifier");
        self.bump();
        let name = self.bump_while(|b| b != close);
        if self.bump().is_none() {
            return Err(err);
        }
        if name.is_empty() {
            return Err(self.error("empty quoted identifier"));
        }
        Ok(TokenKind::Quoted(name.to_string(), open as char))
    }

    fn number(&mut self) -> Result<TokenKind> {
        let start = self.pos;
        self.bump_while(|b| b.is_ascii_digit());
        let mut integral = true;
        if self.peek() == Some(b'.') {
            integral = false;
            self.bump();
            self.bump_while(|b| b.is_ascii_digit());
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some(b'+' | b'-')));
            if self.peek_at(1 + sign).is_some_and(|b| b.is_ascii_digit()) {
                integral = false;
                for _ in 0..=sign {
                    self.bump();
                }
                self.bump_while(|b| b.is_ascii_digit());
            }
        }
        if self.peek().is_some_and(is_word_start) {
            return Err(self.error("invalid numeric literal"));
        }
        let text = &self.src[start..self.pos];
        Ok(match (integral, text.parse::<i64>()) {
            (true, Ok(n)) => TokenKind::Integer(n),
            _ => TokenKind::Numeric(text.to_string()),
        })
    }
}

fn is_word_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_word_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        Lexer::tokenize(sql)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a<>b != c <= >= == ="),
            vec![
                TokenKind::Word("a".into()),
                TokenKind::Ne,
                TokenKind::Word("b".into()),
                TokenKind::Ne,
                TokenKind::Word("c".into()),
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::Eq,
                TokenKind::Eq,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_literals_and_placeholders() {
        assert_eq!(
            kinds("42 3.5 1e3 'it''s' ? ?2 $1 :name @p1"),
            vec![
                TokenKind::Integer(42),
                TokenKind::Numeric("3.5".into()),
                TokenKind::Numeric("1e3".into()),
                TokenKind::String("it's".into()),
                TokenKind::Placeholder("?".into()),
                TokenKind::Placeholder("?2".into()),
                TokenKind::Placeholder("$1".into()),
                TokenKind::Placeholder(":name".into()),
                TokenKind::Placeholder("@p1".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_quoted_identifiers_and_comments() {
        assert_eq!(
            kinds("`a b` -- trailing\n\"c\" /* block */ [d]"),
            vec![
                TokenKind::Quoted("a b".into(), '`'),
                TokenKind::Quoted("c".into(), '"'),
                TokenKind::Quoted("d".into(), '['),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_positions() {
        let tokens = Lexer::tokenize("SELECT\n  café, x").unwrap();
        assert_eq!((tokens[1].line, tokens[1].col), (2, 3));
        assert_eq!((tokens[3].line, tokens[3].col), (2, 9));
        assert_eq!(tokens[3].position, 16);
    }

    #[test]
    fn test_errors() {
        let err = Lexer::tokenize("SELECT 'abc").unwrap_err();
        assert_eq!(err.message, "unterminated string literal");
        assert_eq!((err.line, err.col, err.position), (1, 8, 7));

        let err = Lexer::tokenize("SELECT #").unwrap_err();
        assert!(err.message.contains("unexpected character"));
        assert!(Lexer::tokenize("SELECT 12abc").is_err());
    }
}
