#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both inputs.
    pub fn merge(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Runs
    Text,
    Whitespace,
    Digits,

    // Compound literals
    Escape,
    Regex,
    ConstantLiteral,

    // Delimiters
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    LeftAngle,
    RightAngle,
    LeftParen,
    RightParen,
    Pipe,
    Colon,
    Semicolon,
    Comma,
    Slash,
    Dollar,
    Question,
    Exclamation,
    Hyphen,
    Tilde,
    Percent,
    At,

    EndOfStream,
}

impl TokenKind {
    pub fn is_whitespace(self) -> bool {
        self == TokenKind::Whitespace
    }

    /// Human-readable name used in diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Text => "text",
            TokenKind::Whitespace => "whitespace",
            TokenKind::Digits => "number",
            TokenKind::Escape => "escape sequence",
            TokenKind::Regex => "regex",
            TokenKind::ConstantLiteral => "string literal",
            TokenKind::LeftBrace => "'{'",
            TokenKind::RightBrace => "'}'",
            TokenKind::LeftBracket => "'['",
            TokenKind::RightBracket => "']'",
            TokenKind::LeftAngle => "'<'",
            TokenKind::RightAngle => "'>'",
            TokenKind::LeftParen => "'('",
            TokenKind::RightParen => "')'",
            TokenKind::Pipe => "'|'",
            TokenKind::Colon => "':'",
            TokenKind::Semicolon => "';'",
            TokenKind::Comma => "','",
            TokenKind::Slash => "'/'",
            TokenKind::Dollar => "'$'",
            TokenKind::Question => "'?'",
            TokenKind::Exclamation => "'!'",
            TokenKind::Hyphen => "'-'",
            TokenKind::Tilde => "'~'",
            TokenKind::Percent => "'%'",
            TokenKind::At => "'@'",
            TokenKind::EndOfStream => "end of pattern",
        }
    }
}

/// A single lexed token. `text` holds the source slice for runs and
/// delimiters, the raw sequence for escapes and regexes, and the unescaped
/// value for constant literals.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
    pub line: usize,
    pub col: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span, line: usize, col: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
            line,
            col,
        }
    }
}
