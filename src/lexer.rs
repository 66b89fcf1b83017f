use crate::token::{SourcePosition, Token, TokenKind};

/// Suffixes the lexer folds into a number lexeme. `i64` and `f64` are the
/// default widths and are never written as suffixes.
const NUMBER_SUFFIXES: [&[u8]; 4] = [b"i32", b"u32", b"u64", b"f32"];

/// Pull-based scanner over a read-only source buffer.
///
/// The lexer never fails: bytes it cannot classify come back as
/// `TokenKind::Invalid` tokens and surface as parse errors later. Once the
/// cursor reaches the end of input, every further call returns `End`.
pub struct Lexer<'a> {
    source: &'a str,
    offset: usize,
    line: u32,
    line_start: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
            line: 1,
            line_start: 0,
        }
    }

    pub fn next_token(&mut self) -> Token {
        self.eat_whitespace();

        let position = self.position();

        let Some(byte) = self.peek_byte() else {
            return Token::new(TokenKind::End, "", position);
        };

        match byte {
            b'+' => self.punctuator(TokenKind::Plus, position),
            b'-' => {
                if self.peek_next_is(b'>') {
                    self.two_byte(TokenKind::Arrow, position)
                } else {
                    self.punctuator(TokenKind::Minus, position)
                }
            }
            b'*' => self.punctuator(TokenKind::Star, position),
            b'/' => self.punctuator(TokenKind::Slash, position),
            b'=' => {
                if self.peek_next_is(b'=') {
                    self.two_byte(TokenKind::Equal, position)
                } else {
                    self.punctuator(TokenKind::Assign, position)
                }
            }
            b'<' => {
                if self.peek_next_is(b'=') {
                    self.two_byte(TokenKind::LessEqual, position)
                } else {
                    self.punctuator(TokenKind::Less, position)
                }
            }
            b'>' => {
                if self.peek_next_is(b'=') {
                    self.two_byte(TokenKind::GreaterEqual, position)
                } else {
                    self.punctuator(TokenKind::Greater, position)
                }
            }
            b'!' => {
                if self.peek_next_is(b'=') {
                    self.two_byte(TokenKind::NotEqual, position)
                } else {
                    self.punctuator(TokenKind::Negate, position)
                }
            }
            b'(' => self.punctuator(TokenKind::LParen, position),
            b')' => self.punctuator(TokenKind::RParen, position),
            b'{' => self.punctuator(TokenKind::LBrace, position),
            b'}' => self.punctuator(TokenKind::RBrace, position),
            b'[' => self.punctuator(TokenKind::LBracket, position),
            b']' => self.punctuator(TokenKind::RBracket, position),
            b',' => self.punctuator(TokenKind::Comma, position),
            b':' => self.punctuator(TokenKind::Colon, position),
            b'"' => self.read_string(position),
            b if b.is_ascii_alphabetic() || b == b'_' => self.read_word(position),
            b if b.is_ascii_digit() => self.read_number(position),
            _ => self.punctuator(TokenKind::Invalid, position),
        }
    }

    fn eat_whitespace(&mut self) {
        while let Some(byte) = self.peek_byte() {
            if !byte.is_ascii_whitespace() {
                break;
            }
            if byte == b'\n' {
                self.line += 1;
                self.line_start = self.offset + 1;
            }
            self.offset += 1;
        }
    }

    fn read_word(&mut self, position: SourcePosition) -> Token {
        let length = self.count_while(|b| b.is_ascii_alphanumeric() || b == b'_');
        let lexeme = self.take_lexeme(length);

        let kind = match lexeme.as_str() {
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "func" => TokenKind::Func,
            "return" => TokenKind::Return,
            "var" => TokenKind::Var,
            _ => TokenKind::Identifier,
        };
        Token::new(kind, lexeme, position)
    }

    fn read_number(&mut self, position: SourcePosition) -> Token {
        let mut length = self.count_while(|b| b.is_ascii_digit() || b == b'.');

        // Fold a trailing width suffix into the lexeme; the parser assigns
        // the type later.
        if let Some(slice) = self.source.as_bytes().get(self.offset + length..) {
            if slice.len() >= 3 && NUMBER_SUFFIXES.contains(&&slice[..3]) {
                length += 3;
            }
        }

        Token::new(TokenKind::Number, self.take_lexeme(length), position)
    }

    fn read_string(&mut self, position: SourcePosition) -> Token {
        // Scan past the opening quote to the next unescaped closing quote.
        // Escape sequences are not decoded here; the lexeme keeps both
        // quotes and the raw body.
        let bytes = self.source.as_bytes();
        let mut index = self.offset + 1;
        while index < bytes.len() && bytes[index] != b'"' {
            if bytes[index] == b'\\' {
                index += 2;
            } else {
                index += 1;
            }
        }

        if index >= bytes.len() {
            // No closing quote before end of input. The lexer has no error
            // channel, so the remainder becomes one Invalid token.
            let length = bytes.len() - self.offset;
            return Token::new(TokenKind::Invalid, self.take_lexeme(length), position);
        }

        let length = index + 1 - self.offset;
        Token::new(TokenKind::String, self.take_lexeme(length), position)
    }

    fn punctuator(&mut self, kind: TokenKind, position: SourcePosition) -> Token {
        Token::new(kind, self.take_lexeme(1), position)
    }

    fn two_byte(&mut self, kind: TokenKind, position: SourcePosition) -> Token {
        Token::new(kind, self.take_lexeme(2), position)
    }

    /// Extracts the verbatim lexeme of `length` bytes at the cursor and
    /// advances past it.
    fn take_lexeme(&mut self, length: usize) -> String {
        let end = (self.offset + length).min(self.source.len());
        let lexeme = String::from_utf8_lossy(&self.source.as_bytes()[self.offset..end]);
        self.offset = end;
        lexeme.into_owned()
    }

    fn count_while(&self, keep: impl Fn(u8) -> bool) -> usize {
        self.source.as_bytes()[self.offset..]
            .iter()
            .take_while(|&&b| keep(b))
            .count()
    }

    fn peek_byte(&self) -> Option<u8> {
        self.source.as_bytes().get(self.offset).copied()
    }

    fn peek_next_is(&self, byte: u8) -> bool {
        self.source.as_bytes().get(self.offset + 1) == Some(&byte)
    }

    fn position(&self) -> SourcePosition {
        SourcePosition::new(
            self.line,
            (self.offset - self.line_start + 1) as u32,
            self.offset,
        )
    }
}

/// Collects every token through the first `End`, inclusive.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let is_end = token.kind == TokenKind::End;
        tokens.push(token);
        if is_end {
            break;
        }
    }
    tokens
}
