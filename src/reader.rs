use crate::parser::{SyntaxError, SyntaxErrorKind};
use crate::token::{Span, Token, TokenKind};

/// Tokens that production parsers resynchronize on after a recoverable
/// syntax error.
const RECOVERY_KINDS: &[TokenKind] = &[
    TokenKind::Pipe,
    TokenKind::RightBrace,
    TokenKind::RightBracket,
    TokenKind::RightAngle,
];

/// Forward-only reader over the lexed token stream. The loose variants skip
/// whitespace tokens; `expect` fails without consuming so the caller can
/// report the offending token in place.
pub struct TokenReader {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenReader {
    pub fn new(tokens: Vec<Token>) -> Self {
        debug_assert!(matches!(
            tokens.last().map(|t| t.kind),
            Some(TokenKind::EndOfStream)
        ));
        Self { tokens, pos: 0 }
    }

    pub fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    /// Peek past any whitespace without consuming it.
    pub fn peek_loose(&self) -> &Token {
        let mut i = self.pos;
        while i < self.tokens.len() - 1 && self.tokens[i].kind.is_whitespace() {
            i += 1;
        }
        &self.tokens[i.min(self.tokens.len() - 1)]
    }

    pub fn read(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    /// Skip whitespace, then consume one token.
    pub fn read_loose(&mut self) -> Token {
        while self.peek_kind().is_whitespace() {
            self.pos += 1;
        }
        self.read()
    }

    /// Consume a token of `expected` kind, or fail in place with a
    /// diagnostic naming the expectation.
    pub fn expect(&mut self, expected: TokenKind, label: &str) -> Result<Token, SyntaxError> {
        let found = self.peek();
        if found.kind == expected {
            Ok(self.read())
        } else {
            Err(SyntaxError::new(
                SyntaxErrorKind::Expected {
                    expected,
                    found: found.kind,
                    label: label.to_string(),
                },
                found.span,
            ))
        }
    }

    /// Like `expect`, skipping leading whitespace first.
    pub fn expect_loose(&mut self, expected: TokenKind, label: &str) -> Result<Token, SyntaxError> {
        while self.peek_kind().is_whitespace() {
            self.pos += 1;
        }
        self.expect(expected, label)
    }

    pub fn end(&self) -> bool {
        self.peek_kind() == TokenKind::EndOfStream
    }

    /// Current position, for bounded intra-production lookahead.
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.tokens.len() - 1);
    }

    /// Span at the current read head.
    pub fn here(&self) -> Span {
        self.peek().span
    }

    /// Advance to the next recovery delimiter (or end of stream). Used after
    /// a recoverable syntax error; the delimiter itself is left unconsumed.
    pub fn skip_to_recovery(&mut self) {
        while !self.end() && !RECOVERY_KINDS.contains(&self.peek_kind()) {
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn reader(source: &str) -> TokenReader {
        TokenReader::new(Lexer::new(source).tokenize().unwrap())
    }

    #[test]
    fn read_advances_and_eos_sticks() {
        let mut r = reader("a");
        assert_eq!(r.read().kind, TokenKind::Text);
        assert_eq!(r.read().kind, TokenKind::EndOfStream);
        assert_eq!(r.read().kind, TokenKind::EndOfStream);
        assert!(r.end());
    }

    #[test]
    fn loose_reads_skip_whitespace() {
        let mut r = reader("  [");
        assert_eq!(r.peek_loose().kind, TokenKind::LeftBracket);
        assert_eq!(r.read_loose().kind, TokenKind::LeftBracket);
    }

    #[test]
    fn expect_failure_does_not_consume() {
        let mut r = reader("a");
        let before = r.pos();
        assert!(r.expect(TokenKind::Colon, "argument list").is_err());
        assert_eq!(r.pos(), before);
    }

    #[test]
    fn skip_to_recovery_stops_at_delimiter() {
        let mut r = reader("abc def}rest");
        r.skip_to_recovery();
        assert_eq!(r.peek_kind(), TokenKind::RightBrace);
    }
}
