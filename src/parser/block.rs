//! Block production: `{a|b|c}` with optional `(n)` weight prefixes.

use crate::rst::{BlockNode, Branch, Rst, RstKind};
use crate::token::{Span, TokenKind};

use super::sequence::finish_sequence;
use super::{Compiler, ParseResult, SeqMode, SeqParser, Step, SyntaxError, SyntaxErrorKind, SyntaxParser};

enum Stage {
    Start,
    AfterBranch,
}

pub(crate) struct BlockParser {
    open_span: Span,
    stage: Stage,
    branches: Vec<Branch>,
    pending_weight: Option<f64>,
    branch_start: usize,
}

impl BlockParser {
    pub(crate) fn new(open_span: Span) -> Self {
        Self {
            open_span,
            stage: Stage::Start,
            branches: Vec::new(),
            pending_weight: None,
            branch_start: open_span.end,
        }
    }

    fn begin_branch(&mut self, c: &mut Compiler<'_>) -> Step {
        self.pending_weight = read_weight(c);
        self.branch_start = c.reader.here().start;
        c.push_output();
        Step::Child(Box::new(SeqParser::new(SeqMode::BlockBranch)))
    }
}

impl SyntaxParser for BlockParser {
    fn step(&mut self, c: &mut Compiler<'_>) -> ParseResult<Step> {
        match self.stage {
            Stage::Start => {
                self.stage = Stage::AfterBranch;
                Ok(self.begin_branch(c))
            }
            Stage::AfterBranch => {
                let body = finish_sequence(c, self.branch_start);
                self.branches.push(Branch {
                    body,
                    weight: self.pending_weight.take(),
                });

                let token = c.reader.read();
                match token.kind {
                    TokenKind::Pipe => Ok(self.begin_branch(c)),
                    TokenKind::RightBrace => {
                        let span = self.open_span.merge(token.span);
                        let branches = std::mem::take(&mut self.branches);
                        c.emit(Rst::new(span, RstKind::Block(BlockNode { branches })));
                        Ok(Step::Done)
                    }
                    TokenKind::EndOfStream => Err(SyntaxError::new(
                        SyntaxErrorKind::UnexpectedEnd { context: "a block" },
                        token.span,
                    )),
                    found => Err(SyntaxError::new(
                        SyntaxErrorKind::Expected {
                            expected: TokenKind::RightBrace,
                            found,
                            label: "end of block".to_string(),
                        },
                        token.span,
                    )),
                }
            }
        }
    }
}

/// Parse an optional `(n)` or `(n.m)` weight prefix. Anything that does not
/// match the exact shape is branch text; the reader rewinds.
fn read_weight(c: &mut Compiler<'_>) -> Option<f64> {
    if c.reader.peek_kind() != TokenKind::LeftParen {
        return None;
    }
    let checkpoint = c.reader.pos();
    c.reader.read();

    let mut text = String::new();
    if let Ok(digits) = c.reader.expect(TokenKind::Digits, "weight") {
        text.push_str(&digits.text);
    } else {
        c.reader.seek(checkpoint);
        return None;
    }
    if c.reader.peek_kind() == TokenKind::Text && c.reader.peek().text == "." {
        c.reader.read();
        match c.reader.expect(TokenKind::Digits, "weight fraction") {
            Ok(digits) => {
                text.push('.');
                text.push_str(&digits.text);
            }
            Err(_) => {
                c.reader.seek(checkpoint);
                return None;
            }
        }
    }
    if c.reader.expect(TokenKind::RightParen, "weight").is_err() {
        c.reader.seek(checkpoint);
        return None;
    }

    match text.parse::<f64>() {
        Ok(weight) if weight.is_finite() && weight >= 0.0 => Some(weight),
        _ => {
            c.reader.seek(checkpoint);
            None
        }
    }
}
