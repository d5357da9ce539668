//! Lexer (C2) — turns a UTF-8 source buffer into a finite token sequence.
//!
//! Skips ASCII whitespace and comments, recognizes keywords, identifiers,
//! integer/string/character literals, and operators/punctuation. On any
//! unrecognizable byte it emits a single `ERROR` token carrying a
//! diagnostic and resumes from the next byte — the lexer itself never
//! stops early; it is the driver's job to treat an `ERROR` token as fatal.

use crate::span::Span;
use crate::token::{keyword_kind, Token, TokenKind};

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

    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let (start, line, column) = (self.pos, self.line, self.column);
            if self.pos >= self.src.len() {
                tokens.push(Token::new(TokenKind::Eof, Span::eof(start, line, column)));
                break;
            }
            let tok = self.next_token(start, line, column);
            tokens.push(tok);
        }
        tokens
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b) if b == b' ' || b == b'\t' || b == b'\r' => self.advance(),
                Some(b'\n') => self.advance(),
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' { break; }
                        self.advance();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    self.advance();
                    self.advance();
                    loop {
                        match self.peek() {
                            None => break,
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            Some(_) => self.advance(),
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self, start: usize, line: u32, column: u32) -> Token {
        let b = self.peek().expect("caller checked bounds");
        let mk = |kind: TokenKind, len: usize| {
            Token::new(kind, Span::new(start, line, column, len))
        };

        if b.is_ascii_digit() {
            return self.lex_number(start, line, column);
        }
        if b == b'_' || b.is_ascii_alphabetic() {
            return self.lex_ident(start, line, column);
        }
        if b == b'"' {
            return self.lex_string(start, line, column);
        }
        if b == b'\'' {
            return self.lex_char(start, line, column);
        }

        // Two-character operators first, then one-character.
        let two = (b, self.peek_at(1));
        let (kind, len): (TokenKind, usize) = match two {
            (b'=', Some(b'=')) => (TokenKind::EqEq, 2),
            (b'!', Some(b'=')) => (TokenKind::NotEq, 2),
            (b'<', Some(b'=')) => (TokenKind::LtEq, 2),
            (b'>', Some(b'=')) => (TokenKind::GtEq, 2),
            (b'&', Some(b'&')) => (TokenKind::AndAnd, 2),
            (b'|', Some(b'|')) => (TokenKind::OrOr, 2),
            (b'<', Some(b'<')) => (TokenKind::Shl, 2),
            (b'>', Some(b'>')) => (TokenKind::Shr, 2),
            (b'+', Some(b'=')) => (TokenKind::PlusEq, 2),
            (b'-', Some(b'=')) => (TokenKind::MinusEq, 2),
            _ => match b {
                b'+' => (TokenKind::Plus, 1),
                b'-' => (TokenKind::Minus, 1),
                b'*' => (TokenKind::Star, 1),
                b'/' => (TokenKind::Slash, 1),
                b'%' => (TokenKind::Percent, 1),
                b'<' => (TokenKind::Lt, 1),
                b'>' => (TokenKind::Gt, 1),
                b'=' => (TokenKind::Eq, 1),
                b'!' => (TokenKind::Bang, 1),
                b'&' => (TokenKind::Amp, 1),
                b'|' => (TokenKind::Pipe, 1),
                b'^' => (TokenKind::Caret, 1),
                b'~' => (TokenKind::Tilde, 1),
                b'(' => (TokenKind::LParen, 1),
                b')' => (TokenKind::RParen, 1),
                b'{' => (TokenKind::LBrace, 1),
                b'}' => (TokenKind::RBrace, 1),
                b'[' => (TokenKind::LBracket, 1),
                b']' => (TokenKind::RBracket, 1),
                b',' => (TokenKind::Comma, 1),
                b';' => (TokenKind::Semi, 1),
                b':' => (TokenKind::Colon, 1),
                other => {
                    self.advance();
                    return mk(
                        TokenKind::Error(format!("unrecognized character {:?}", other as char)),
                        1,
                    );
                }
            },
        };
        for _ in 0..len {
            self.advance();
        }
        mk(kind, len)
    }

    fn lex_ident(&mut self, start: usize, line: u32, column: u32) -> Token {
        while matches!(self.peek(), Some(b) if b == b'_' || b.is_ascii_alphanumeric()) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        let kind = keyword_kind(text).unwrap_or_else(|| TokenKind::Ident(text.to_string()));
        Token::new(kind, Span::new(start, line, column, self.pos - start))
    }

    fn lex_number(&mut self, start: usize, line: u32, column: u32) -> Token {
        let radix;
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            self.advance();
            self.advance();
            radix = 16;
            while matches!(self.peek(), Some(b) if b.is_ascii_hexdigit() || b == b'_') {
                self.advance();
            }
        } else if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'b') | Some(b'B')) {
            self.advance();
            self.advance();
            radix = 2;
            while matches!(self.peek(), Some(b) if b == b'0' || b == b'1' || b == b'_') {
                self.advance();
            }
        } else {
            radix = 10;
            while matches!(self.peek(), Some(b) if b.is_ascii_digit() || b == b'_') {
                self.advance();
            }
        }
        let len = self.pos - start;
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        let digits: &str = match radix {
            16 => &text[2..],
            2 => &text[2..],
            _ => text,
        };
        let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
        let span = Span::new(start, line, column, len);
        match u32::from_str_radix(&cleaned, radix) {
            Ok(v) if v <= 0xFFFF => Token::new(TokenKind::Int(v as u16), span),
            Ok(_) => Token::new(
                TokenKind::Error(format!("integer literal {text} exceeds 16 bits")),
                span,
            ),
            Err(_) => Token::new(TokenKind::Error(format!("malformed integer literal {text}")), span),
        }
    }

    fn lex_string(&mut self, start: usize, line: u32, column: u32) -> Token {
        self.advance(); // opening quote
        let mut s = String::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    let len = self.pos - start;
                    return Token::new(
                        TokenKind::Error("unterminated string literal".into()),
                        Span::new(start, line, column, len),
                    );
                }
                Some(b'"') => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    match self.lex_escape() {
                        Ok(byte) => s.push(byte as char),
                        Err(msg) => {
                            let len = self.pos - start;
                            return Token::new(
                                TokenKind::Error(msg),
                                Span::new(start, line, column, len),
                            );
                        }
                    }
                }
                Some(b) => {
                    s.push(b as char);
                    self.advance();
                }
            }
        }
        let len = self.pos - start;
        Token::new(TokenKind::Str(s), Span::new(start, line, column, len))
    }

    fn lex_char(&mut self, start: usize, line: u32, column: u32) -> Token {
        self.advance(); // opening quote
        let value = match self.peek() {
            Some(b'\\') => {
                self.advance();
                match self.lex_escape() {
                    Ok(b) => b,
                    Err(msg) => {
                        let len = self.pos - start;
                        return Token::new(TokenKind::Error(msg), Span::new(start, line, column, len));
                    }
                }
            }
            Some(b) if b != b'\'' => {
                self.advance();
                b
            }
            _ => {
                let len = self.pos - start;
                return Token::new(
                    TokenKind::Error("empty character literal".into()),
                    Span::new(start, line, column, len),
                );
            }
        };
        if self.peek() != Some(b'\'') {
            let len = self.pos - start;
            return Token::new(
                TokenKind::Error("unterminated character literal".into()),
                Span::new(start, line, column, len),
            );
        }
        self.advance();
        let len = self.pos - start;
        Token::new(TokenKind::Char(value), Span::new(start, line, column, len))
    }

    /// Consumes the character(s) after a `\` and returns the decoded byte.
    fn lex_escape(&mut self) -> Result<u8, String> {
        let b = self.peek().ok_or_else(|| "unterminated escape sequence".to_string())?;
        self.advance();
        Ok(match b {
            b'n' => b'\n',
            b't' => b'\t',
            b'\\' => b'\\',
            b'"' => b'"',
            b'0' => 0,
            b'x' => {
                let hi = self.peek().ok_or_else(|| "truncated \\x escape".to_string())?;
                self.advance();
                let lo = self.peek().ok_or_else(|| "truncated \\x escape".to_string())?;
                self.advance();
                let hex = [hi, lo];
                let hex = std::str::from_utf8(&hex).map_err(|_| "invalid \\x escape".to_string())?;
                u8::from_str_radix(hex, 16).map_err(|_| format!("invalid \\x escape \\x{hex}"))?
            }
            other => return Err(format!("unknown escape sequence \\{}", other as char)),
        })
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(b) = self.peek() {
            self.pos += 1;
            if b == b'\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

pub fn lex(src: &str) -> Vec<Token> {
    Lexer::new(src).tokenize()
}

/// Every `ERROR` token in a lexed stream, converted to the shared
/// diagnostic type. The lexer never stops at the first bad byte — it
/// keeps scanning — so a single source file can surface more than one of
/// these before the driver treats the lex phase as failed.
pub fn lex_errors(tokens: &[Token]) -> Vec<crate::error::CompileError> {
    tokens
        .iter()
        .filter_map(|t| match &t.kind {
            TokenKind::Error(message) => Some(crate::error::CompileError::lex(t.span, message.clone())),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn skips_whitespace_and_comments() {
        let toks = kinds("  // hi\n/* block */ fn");
        assert_eq!(toks, vec![TokenKind::Fn, TokenKind::Eof]);
    }

    #[test]
    fn decimal_hex_binary_literals() {
        let toks = kinds("123 0x1A 0b1010");
        assert_eq!(
            toks,
            vec![TokenKind::Int(123), TokenKind::Int(0x1A), TokenKind::Int(0b1010), TokenKind::Eof]
        );
    }

    #[test]
    fn out_of_range_literal_is_error() {
        let toks = kinds("0x10000");
        assert!(matches!(toks[0], TokenKind::Error(_)));
    }

    #[test]
    fn max_u16_literal_lexes_ok() {
        let toks = kinds("0xFFFF");
        assert_eq!(toks[0], TokenKind::Int(0xFFFF));
    }

    #[test]
    fn string_with_escapes() {
        let toks = kinds("\"a\\nb\\x41\"");
        match &toks[0] {
            TokenKind::Str(s) => assert_eq!(s, "a\nbA"),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_string_is_error() {
        let toks = kinds("\"abc");
        assert!(matches!(toks[0], TokenKind::Error(_)));
    }

    #[test]
    fn char_literal() {
        let toks = kinds("'a'");
        assert_eq!(toks[0], TokenKind::Char(b'a'));
    }

    #[test]
    fn keywords_and_identifiers() {
        let toks = kinds("fn __Boot x1");
        assert_eq!(
            toks,
            vec![
                TokenKind::Fn,
                TokenKind::Ident("__Boot".into()),
                TokenKind::Ident("x1".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn operators_two_then_one_char() {
        let toks = kinds("<= < == = && &");
        assert_eq!(
            toks,
            vec![
                TokenKind::LtEq,
                TokenKind::Lt,
                TokenKind::EqEq,
                TokenKind::Eq,
                TokenKind::AndAnd,
                TokenKind::Amp,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn unrecognized_byte_is_single_error_token_and_continues() {
        let toks = kinds("a @ b");
        assert!(matches!(toks[1], TokenKind::Error(_)));
        assert_eq!(toks[2], TokenKind::Ident("b".into()));
    }

    #[test]
    fn spans_cover_every_non_trivial_byte() {
        let src = "fn Start";
        let toks = lex(src);
        assert_eq!(toks[0].span.start, 0);
        assert_eq!(toks[0].span.len, 2);
        assert_eq!(toks[1].span.start, 3);
        assert_eq!(toks[1].span.len, 5);
    }
}
