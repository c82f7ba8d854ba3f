//! The sequence production: free text plus dispatch into every other
//! construct. Parameterized by its terminator so the same parser reads
//! top-level patterns, block branches, tag arguments, subroutine bodies,
//! list items, and replacer segments.

use std::rc::Rc;

use crate::error::Diagnostic;
use crate::rst::{CharClass, Rst, RstKind};
use crate::token::{Span, Token, TokenKind};

use super::block::BlockParser;
use super::query::QueryParser;
use super::tag::{ListParser, ReplaceParser, SubDefParser, TagParser};
use super::{Compiler, ParseResult, Step, SyntaxError, SyntaxErrorKind, SyntaxParser};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SeqMode {
    /// Whole pattern; ends at end of stream.
    Main,
    /// Block branch; ends at `|` or `}`.
    BlockBranch,
    /// Tag argument; ends at `;` or `]`.
    TagArg,
    /// Subroutine body; ends at `}`.
    SubBody,
    /// List item; ends at `;` or `)`.
    ListItem,
    /// Replacer subject; ends at `;`.
    ReplaceSubject,
    /// Replacer replacement; ends at `%`.
    ReplaceReplacement,
}

impl SeqMode {
    fn terminators(self) -> &'static [TokenKind] {
        match self {
            SeqMode::Main => &[],
            SeqMode::BlockBranch => &[TokenKind::Pipe, TokenKind::RightBrace],
            SeqMode::TagArg => &[TokenKind::Semicolon, TokenKind::RightBracket],
            SeqMode::SubBody => &[TokenKind::RightBrace],
            SeqMode::ListItem => &[TokenKind::Semicolon, TokenKind::RightParen],
            SeqMode::ReplaceSubject => &[TokenKind::Semicolon],
            SeqMode::ReplaceReplacement => &[TokenKind::Percent],
        }
    }

    fn context(self) -> &'static str {
        match self {
            SeqMode::Main => "the pattern",
            SeqMode::BlockBranch => "a block",
            SeqMode::TagArg => "a tag",
            SeqMode::SubBody => "a subroutine body",
            SeqMode::ListItem => "a list",
            SeqMode::ReplaceSubject | SeqMode::ReplaceReplacement => "a replacer",
        }
    }
}

pub(crate) struct SeqParser {
    mode: SeqMode,
    literal: String,
    literal_span: Span,
}

impl SeqParser {
    pub(crate) fn new(mode: SeqMode) -> Self {
        Self {
            mode,
            literal: String::new(),
            literal_span: Span::default(),
        }
    }

    fn push_literal(&mut self, text: &str, span: Span) {
        if self.literal.is_empty() {
            self.literal_span = span;
        } else {
            self.literal_span = self.literal_span.merge(span);
        }
        self.literal.push_str(text);
    }

    fn flush(&mut self, c: &mut Compiler<'_>) {
        if !self.literal.is_empty() {
            let text = std::mem::take(&mut self.literal);
            c.emit(Rst::new(self.literal_span, RstKind::Text(text)));
        }
    }
}

impl SyntaxParser for SeqParser {
    fn step(&mut self, c: &mut Compiler<'_>) -> ParseResult<Step> {
        loop {
            let token = c.reader.peek().clone();

            if self.mode.terminators().contains(&token.kind) {
                self.flush(c);
                return Ok(Step::Done);
            }

            match token.kind {
                TokenKind::EndOfStream => {
                    if self.mode == SeqMode::Main {
                        self.flush(c);
                        return Ok(Step::Done);
                    }
                    return Err(SyntaxError::new(
                        SyntaxErrorKind::UnexpectedEnd {
                            context: self.mode.context(),
                        },
                        token.span,
                    ));
                }
                TokenKind::LeftBrace => {
                    self.flush(c);
                    c.reader.read();
                    return Ok(Step::Child(Box::new(BlockParser::new(token.span))));
                }
                TokenKind::LeftBracket => {
                    self.flush(c);
                    c.reader.read();
                    return Ok(Step::Child(Box::new(TagParser::new(token.span))));
                }
                TokenKind::LeftAngle => {
                    self.flush(c);
                    c.reader.read();
                    return Ok(Step::Child(Box::new(QueryParser::new(token.span))));
                }
                TokenKind::Dollar => {
                    c.reader.read();
                    if c.reader.peek_kind() == TokenKind::LeftBracket {
                        self.flush(c);
                        c.reader.read();
                        return Ok(Step::Child(Box::new(SubDefParser::new(token.span))));
                    }
                    self.push_literal("$", token.span);
                }
                TokenKind::At => {
                    c.reader.read();
                    if c.reader.peek_kind() == TokenKind::LeftParen {
                        self.flush(c);
                        c.reader.read();
                        return Ok(Step::Child(Box::new(ListParser::new(token.span))));
                    }
                    self.push_literal("@", token.span);
                }
                TokenKind::Percent => {
                    c.reader.read();
                    if c.reader.peek_kind() == TokenKind::Regex {
                        self.flush(c);
                        return Ok(Step::Child(Box::new(ReplaceParser::new(token.span))));
                    }
                    self.push_literal("%", token.span);
                }
                TokenKind::Escape => {
                    c.reader.read();
                    match translate_escape(&token) {
                        EscapeValue::Literal(text) => self.push_literal(&text, token.span),
                        EscapeValue::Random(class, count) => {
                            self.flush(c);
                            c.emit(Rst::new(token.span, RstKind::Chars { class, count }));
                        }
                        EscapeValue::Article => {
                            self.flush(c);
                            c.emit(Rst::new(token.span, RstKind::Article));
                        }
                    }
                }
                TokenKind::ConstantLiteral => {
                    c.reader.read();
                    self.push_literal(&token.text, token.span);
                }
                TokenKind::RightBrace | TokenKind::RightBracket | TokenKind::RightAngle => {
                    // Stray closer: report and drop it.
                    c.reader.read();
                    c.report(
                        SyntaxError::new(
                            SyntaxErrorKind::UnmatchedDelimiter { found: token.kind },
                            token.span,
                        )
                        .into_diagnostic(),
                    );
                }
                TokenKind::Pipe if self.mode == SeqMode::SubBody => {
                    c.reader.read();
                    c.report(Diagnostic::error(
                        token.span,
                        "branch-in-subroutine",
                        "a subroutine body has no branches; '|' is not allowed here",
                    ));
                }
                _ => {
                    c.reader.read();
                    self.push_literal(&token.text, token.span);
                }
            }
        }
    }
}

pub(crate) enum EscapeValue {
    Literal(String),
    Random(CharClass, u32),
    Article,
}

/// Decode a lexed escape token. The lexer has already validated it.
pub(crate) fn translate_escape(token: &Token) -> EscapeValue {
    let body = &token.text[1..];
    let first = body.chars().next().unwrap_or('\\');

    if first.is_ascii_digit() {
        // `\8,x` form: count, comma, class.
        let comma = body.find(',').unwrap_or(body.len() - 1);
        let count: u32 = body[..comma].parse().unwrap_or(1);
        let class_char = body[comma + 1..].chars().next().unwrap_or('d');
        let class = CharClass::from_escape(class_char).unwrap_or(CharClass::Digit);
        return EscapeValue::Random(class, count);
    }

    if let Some(class) = CharClass::from_escape(first) {
        return EscapeValue::Random(class, 1);
    }

    match first {
        'n' => EscapeValue::Literal("\n".to_string()),
        'r' => EscapeValue::Literal("\r".to_string()),
        't' => EscapeValue::Literal("\t".to_string()),
        's' => EscapeValue::Literal(" ".to_string()),
        'a' => EscapeValue::Article,
        other => EscapeValue::Literal(other.to_string()),
    }
}

/// Build a sequence node from the top output buffer, spanning from `start`
/// to the reader's current position.
pub(crate) fn finish_sequence(c: &mut Compiler<'_>, start: usize) -> Rc<Rst> {
    let nodes = c.pop_output();
    let end = c.reader.here().start.max(start);
    Rc::new(Rst::sequence(Span::new(start, end), nodes))
}
