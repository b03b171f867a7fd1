use crate::token::{lookup_ident, Token, TokenKind};

/// Byte-oriented scanner producing a stream of [`Token`]s.
///
/// Tracks 1-based line numbers so downstream error messages can point at
/// the offending source line.
pub struct Lexer<'a> {
    input: &'a [u8],
    /// Index of the character under examination.
    position: usize,
    /// Index one past `position`.
    read_position: usize,
    ch: u8,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut l = Lexer {
            input: input.as_bytes(),
            position: 0,
            read_position: 0,
            ch: 0,
            line: 1,
        };
        l.read_char();
        l
    }

    fn read_char(&mut self) {
        self.ch = self.input.get(self.read_position).copied().unwrap_or(0);
        self.position = self.read_position;
        self.read_position += 1;
    }

    fn peek_char(&self) -> u8 {
        self.input.get(self.read_position).copied().unwrap_or(0)
    }

    fn skip_whitespace(&mut self) {
        while self.ch.is_ascii_whitespace() {
            if self.ch == b'\n' {
                self.line += 1;
            }
            self.read_char();
        }
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        let line = self.line;

        let tok = match self.ch {
            b'=' => {
                if self.peek_char() == b'=' {
                    self.read_char();
                    Token::new(TokenKind::Eq, "==", line)
                } else {
                    Token::new(TokenKind::Assign, "=", line)
                }
            }
            b'!' => {
                if self.peek_char() == b'=' {
                    self.read_char();
                    Token::new(TokenKind::NotEq, "!=", line)
                } else {
                    Token::new(TokenKind::Bang, "!", line)
                }
            }
            b'<' => {
                if self.peek_char() == b'=' {
                    self.read_char();
                    Token::new(TokenKind::LtEq, "<=", line)
                } else {
                    Token::new(TokenKind::Lt, "<", line)
                }
            }
            b'>' => {
                if self.peek_char() == b'=' {
                    self.read_char();
                    Token::new(TokenKind::GtEq, ">=", line)
                } else {
                    Token::new(TokenKind::Gt, ">", line)
                }
            }
            b'+' => Token::new(TokenKind::Plus, "+", line),
            b'-' => Token::new(TokenKind::Minus, "-", line),
            b'*' => Token::new(TokenKind::Star, "*", line),
            b'/' => Token::new(TokenKind::Slash, "/", line),
            b',' => Token::new(TokenKind::Comma, ",", line),
            b';' => Token::new(TokenKind::Semicolon, ";", line),
            b':' => Token::new(TokenKind::Colon, ":", line),
            b'(' => Token::new(TokenKind::LParen, "(", line),
            b')' => Token::new(TokenKind::RParen, ")", line),
            b'{' => Token::new(TokenKind::LBrace, "{", line),
            b'}' => Token::new(TokenKind::RBrace, "}", line),
            b'[' => Token::new(TokenKind::LBracket, "[", line),
            b']' => Token::new(TokenKind::RBracket, "]", line),
            b'"' => Token::new(TokenKind::Str, self.read_string(), line),
            0 => Token::new(TokenKind::Eof, "", line),
            c if is_letter(c) => {
                // read_identifier advances past the last letter already.
                let literal = self.read_identifier();
                return Token::new(lookup_ident(&literal), literal, line);
            }
            c if c.is_ascii_digit() => {
                return Token::new(TokenKind::Number, self.read_number(), line);
            }
            c => Token::new(TokenKind::Illegal, (c as char).to_string(), line),
        };

        self.read_char();
        tok
    }

    fn read_identifier(&mut self) -> String {
        let start = self.position;
        while is_letter(self.ch) || self.ch.is_ascii_digit() {
            self.read_char();
        }
        String::from_utf8_lossy(&self.input[start..self.position]).into_owned()
    }

    fn read_number(&mut self) -> String {
        let start = self.position;
        while self.ch.is_ascii_digit() {
            self.read_char();
        }
        if self.ch == b'.' && self.peek_char().is_ascii_digit() {
            self.read_char();
            while self.ch.is_ascii_digit() {
                self.read_char();
            }
        }
        String::from_utf8_lossy(&self.input[start..self.position]).into_owned()
    }

    /// Reads a double-quoted string. The opening quote is the current char;
    /// the returned literal excludes both quotes. An unterminated string
    /// ends at EOF.
    fn read_string(&mut self) -> String {
        let start = self.position + 1;
        loop {
            self.read_char();
            if self.ch == b'"' || self.ch == 0 {
                break;
            }
            if self.ch == b'\n' {
                self.line += 1;
            }
        }
        String::from_utf8_lossy(&self.input[start..self.position]).into_owned()
    }
}

fn is_letter(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}
