use crate::error::Diagnostic;
use crate::token::{Span, Token, TokenKind};

/// Escape classes that expand to one random character per unit and accept a
/// repetition count prefix (`\8,x`).
pub const RANDOM_ESCAPE_CLASSES: &[char] = &['d', 'N', 'x', 'X', 'c', 'C', 'w'];

/// Named single-character escapes. Everything non-alphanumeric escapes to
/// itself; `a` is the indefinite article placeholder.
pub const NAMED_ESCAPES: &[char] = &['n', 'r', 't', 's', 'a'];

/// Single-pass lexer over pattern source. Produces the full token stream,
/// terminated by an end-of-stream token. Invalid escapes and unterminated
/// string literals are fatal; everything else tokenizes.
pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();

        while self.pos < self.bytes.len() {
            let token = self.next_token()?;
            tokens.push(token);
        }

        let end = Span::new(self.source.len(), self.source.len());
        tokens.push(Token::new(TokenKind::EndOfStream, "", end, self.line, self.col));
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, Diagnostic> {
        let start = self.pos;
        let line = self.line;
        let col = self.col;

        let kind = match self.bytes[self.pos] {
            b'\\' => return self.escape(start, line, col),
            b'/' => return Ok(self.regex_or_slash(start, line, col)),
            b'`' => return self.constant_literal(start, line, col),
            b'{' => TokenKind::LeftBrace,
            b'}' => TokenKind::RightBrace,
            b'[' => TokenKind::LeftBracket,
            b']' => TokenKind::RightBracket,
            b'<' => TokenKind::LeftAngle,
            b'>' => TokenKind::RightAngle,
            b'(' => TokenKind::LeftParen,
            b')' => TokenKind::RightParen,
            b'|' => TokenKind::Pipe,
            b':' => TokenKind::Colon,
            b';' => TokenKind::Semicolon,
            b',' => TokenKind::Comma,
            b'$' => TokenKind::Dollar,
            b'?' => TokenKind::Question,
            b'!' => TokenKind::Exclamation,
            b'-' => TokenKind::Hyphen,
            b'~' => TokenKind::Tilde,
            b'%' => TokenKind::Percent,
            b'@' => TokenKind::At,
            b'0'..=b'9' => return Ok(self.run(start, line, col, TokenKind::Digits, is_digit)),
            b' ' | b'\t' | b'\r' | b'\n' => {
                return Ok(self.run(start, line, col, TokenKind::Whitespace, is_whitespace))
            }
            _ => return Ok(self.run(start, line, col, TokenKind::Text, is_text)),
        };

        self.advance(1);
        let span = Span::new(start, self.pos);
        Ok(Token::new(kind, &self.source[start..self.pos], span, line, col))
    }

    /// Longest run of bytes accepted by `pred`.
    fn run(
        &mut self,
        start: usize,
        line: usize,
        col: usize,
        kind: TokenKind,
        pred: fn(u8) -> bool,
    ) -> Token {
        while self.pos < self.bytes.len() && pred(self.bytes[self.pos]) {
            self.advance(1);
        }
        let span = Span::new(start, self.pos);
        Token::new(kind, &self.source[start..self.pos], span, line, col)
    }

    /// `\x` single escapes and `\8,x` counted random-class escapes.
    fn escape(&mut self, start: usize, line: usize, col: usize) -> Result<Token, Diagnostic> {
        self.advance(1);

        let Some(first) = self.current_char() else {
            return Err(Diagnostic::fatal(
                Span::new(start, self.pos),
                "incomplete-escape",
                "pattern ends in the middle of an escape sequence",
            ));
        };

        if first.is_ascii_digit() {
            // Repetition count, then a comma, then a random class.
            let digits_start = self.pos;
            while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
                self.advance(1);
            }
            let count_text = &self.source[digits_start..self.pos];
            if count_text.parse::<u32>().is_err() {
                return Err(Diagnostic::fatal(
                    Span::new(start, self.pos),
                    "escape-count",
                    format!("escape repetition count '{}' is out of range", count_text),
                ));
            }
            if self.pos >= self.bytes.len() || self.bytes[self.pos] != b',' {
                return Err(Diagnostic::fatal(
                    Span::new(start, self.pos),
                    "invalid-escape",
                    "expected ',' after escape repetition count",
                ));
            }
            self.advance(1);
            match self.current_char() {
                Some(c) if RANDOM_ESCAPE_CLASSES.contains(&c) => {
                    self.advance(1);
                }
                _ => {
                    return Err(Diagnostic::fatal(
                        Span::new(start, self.pos),
                        "invalid-escape",
                        "a repetition count must be followed by a random character class",
                    ));
                }
            }
        } else if first.is_ascii_alphanumeric() {
            if !RANDOM_ESCAPE_CLASSES.contains(&first) && !NAMED_ESCAPES.contains(&first) {
                return Err(Diagnostic::fatal(
                    Span::new(start, self.pos + first.len_utf8()),
                    "invalid-escape",
                    format!("unrecognized escape sequence '\\{}'", first),
                ));
            }
            self.advance(1);
        } else {
            // Any punctuation or non-ASCII character escapes to itself.
            self.advance(first.len_utf8());
        }

        let span = Span::new(start, self.pos);
        Ok(Token::new(TokenKind::Escape, &self.source[start..self.pos], span, line, col))
    }

    /// A `/` begins a regex literal when a closing `/` exists on the same
    /// line; otherwise it is a plain slash. The literal keeps its raw form
    /// here and is compiled by the parser.
    fn regex_or_slash(&mut self, start: usize, line: usize, col: usize) -> Token {
        let mut j = self.pos + 1;
        let mut close = None;
        while j < self.bytes.len() {
            match self.bytes[j] {
                b'\n' => break,
                b'/' => {
                    close = Some(j);
                    break;
                }
                b'\\' => {
                    if j + 1 < self.bytes.len() && self.bytes[j + 1] == b'\n' {
                        break;
                    }
                    j += 2;
                }
                _ => j += 1,
            }
        }

        match close {
            Some(close) => {
                let mut end = close + 1;
                while end < self.bytes.len() && self.bytes[end].is_ascii_alphabetic() {
                    end += 1;
                }
                let n = end - self.pos;
                self.advance(n);
                let span = Span::new(start, self.pos);
                Token::new(TokenKind::Regex, &self.source[start..self.pos], span, line, col)
            }
            None => {
                self.advance(1);
                let span = Span::new(start, self.pos);
                Token::new(TokenKind::Slash, "/", span, line, col)
            }
        }
    }

    /// `` `…` `` verbatim text: markup between the backticks is inert.
    fn constant_literal(&mut self, start: usize, line: usize, col: usize) -> Result<Token, Diagnostic> {
        self.advance(1);
        let mut value = String::new();

        loop {
            let Some(c) = self.current_char() else {
                return Err(Diagnostic::fatal(
                    Span::new(start, self.pos),
                    "unterminated-string",
                    "verbatim literal is never closed",
                ));
            };
            if c == '`' {
                self.advance(1);
                break;
            }
            value.push(c);
            self.advance(c.len_utf8());
        }

        let span = Span::new(start, self.pos);
        Ok(Token::new(TokenKind::ConstantLiteral, value, span, line, col))
    }

    fn current_char(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn advance(&mut self, n: usize) {
        for _ in 0..n {
            if self.pos >= self.bytes.len() {
                break;
            }
            if self.bytes[self.pos] == b'\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
            self.pos += 1;
        }
    }
}

fn is_digit(b: u8) -> bool {
    b.is_ascii_digit()
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

fn is_text(b: u8) -> bool {
    !is_digit(b)
        && !is_whitespace(b)
        && !matches!(
            b,
            b'\\' | b'/'
                | b'`'
                | b'{'
                | b'}'
                | b'['
                | b']'
                | b'<'
                | b'>'
                | b'('
                | b')'
                | b'|'
                | b':'
                | b';'
                | b','
                | b'$'
                | b'?'
                | b'!'
                | b'-'
                | b'~'
                | b'%'
                | b'@'
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn plain_text_is_one_token() {
        assert_eq!(kinds("hello"), vec![TokenKind::Text, TokenKind::EndOfStream]);
    }

    #[test]
    fn block_delimiters() {
        assert_eq!(
            kinds("{a|b}"),
            vec![
                TokenKind::LeftBrace,
                TokenKind::Text,
                TokenKind::Pipe,
                TokenKind::Text,
                TokenKind::RightBrace,
                TokenKind::EndOfStream,
            ]
        );
    }

    #[test]
    fn digits_split_from_text() {
        assert_eq!(
            kinds("ab12cd"),
            vec![TokenKind::Text, TokenKind::Digits, TokenKind::Text, TokenKind::EndOfStream]
        );
    }

    #[test]
    fn whitespace_is_its_own_token() {
        assert_eq!(
            kinds("a b"),
            vec![TokenKind::Text, TokenKind::Whitespace, TokenKind::Text, TokenKind::EndOfStream]
        );
    }

    #[test]
    fn counted_escape_is_single_token() {
        let tokens = Lexer::new(r"\8,x").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Escape);
        assert_eq!(tokens[0].text, r"\8,x");
    }

    #[test]
    fn escaped_brace_is_escape_token() {
        let tokens = Lexer::new(r"\{").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Escape);
    }

    #[test]
    fn invalid_escape_is_fatal() {
        let err = Lexer::new(r"\q").tokenize().unwrap_err();
        assert_eq!(err.code, "invalid-escape");
    }

    #[test]
    fn trailing_backslash_is_fatal() {
        let err = Lexer::new("text\\").tokenize().unwrap_err();
        assert_eq!(err.code, "incomplete-escape");
    }

    #[test]
    fn regex_literal_with_flags() {
        let tokens = Lexer::new("/^ab+$/i").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Regex);
        assert_eq!(tokens[0].text, "/^ab+$/i");
        assert_eq!(tokens[1].kind, TokenKind::EndOfStream);
    }

    #[test]
    fn lone_slash_is_plain() {
        assert_eq!(kinds("a/b"), vec![
            TokenKind::Text,
            TokenKind::Slash,
            TokenKind::Text,
            TokenKind::EndOfStream
        ]);
    }

    #[test]
    fn constant_literal_hides_markup() {
        let tokens = Lexer::new("`{not|a|block}`").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::ConstantLiteral);
        assert_eq!(tokens[0].text, "{not|a|block}");
    }

    #[test]
    fn double_quotes_are_plain_text() {
        let tokens = Lexer::new("say \"hi\"").tokenize().unwrap();
        let joined: String = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(joined, "say \"hi\"");
        assert!(tokens.iter().all(|t| t.kind != TokenKind::ConstantLiteral));
    }

    #[test]
    fn unterminated_literal_is_fatal() {
        let err = Lexer::new("`oops").tokenize().unwrap_err();
        assert_eq!(err.code, "unterminated-string");
    }

    #[test]
    fn spans_and_positions_track_lines() {
        let tokens = Lexer::new("ab\ncd").tokenize().unwrap();
        assert_eq!(tokens[0].span, Span::new(0, 2));
        assert_eq!(tokens[1].kind, TokenKind::Whitespace);
        assert_eq!(tokens[2].line, 2);
        assert_eq!(tokens[2].col, 1);
    }
}
