//! Parser framework: a work-stack of production parsers.
//!
//! Each production implements `SyntaxParser::step`, which is called when the
//! frame is entered and again after every child it yields completes. Nesting
//! therefore costs one heap frame instead of host stack, and a recoverable
//! error at any depth unwinds exactly one production.

mod arith;
mod block;
mod query;
mod sequence;
mod tag;


use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{CompileError, Diagnostic, Severity};
use crate::lexer::Lexer;
use crate::reader::TokenReader;
use crate::registry::FunctionRegistry;
use crate::rst::{RantRegex, Rst};
use crate::token::{Span, Token, TokenKind};

pub(crate) use sequence::{SeqMode, SeqParser};

#[derive(Debug, Clone, PartialEq)]
pub enum SyntaxErrorKind {
    Expected {
        expected: TokenKind,
        found: TokenKind,
        label: String,
    },
    Unexpected {
        found: TokenKind,
        context: &'static str,
    },
    UnexpectedEnd {
        context: &'static str,
    },
    UnknownFunction {
        name: String,
    },
    WrongArity {
        name: String,
        arity: usize,
        accepted: Vec<usize>,
    },
    InvalidRegex {
        message: String,
    },
    InvalidNumber {
        text: String,
    },
    InvalidExpression {
        message: String,
    },
    MultipleSubtypes,
    SubtypeAfterExclusive,
    EmptyRange,
    EmptyCarrier,
    UnmatchedDelimiter {
        found: TokenKind,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub span: Span,
}

impl SyntaxError {
    pub fn new(kind: SyntaxErrorKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Unterminated constructs abort compilation; everything else recovers
    /// at the next synchronizing delimiter.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, SyntaxErrorKind::UnexpectedEnd { .. })
    }

    pub fn code(&self) -> &'static str {
        match self.kind {
            SyntaxErrorKind::Expected { .. } => "expected-token",
            SyntaxErrorKind::Unexpected { .. } => "unexpected-token",
            SyntaxErrorKind::UnexpectedEnd { .. } => "unexpected-end",
            SyntaxErrorKind::UnknownFunction { .. } => "unknown-function",
            SyntaxErrorKind::WrongArity { .. } => "wrong-arity",
            SyntaxErrorKind::InvalidRegex { .. } => "invalid-regex",
            SyntaxErrorKind::InvalidNumber { .. } => "invalid-number",
            SyntaxErrorKind::InvalidExpression { .. } => "invalid-expression",
            SyntaxErrorKind::MultipleSubtypes => "multiple-subtypes",
            SyntaxErrorKind::SubtypeAfterExclusive => "subtype-after-exclusive",
            SyntaxErrorKind::EmptyRange => "empty-range",
            SyntaxErrorKind::EmptyCarrier => "empty-carrier",
            SyntaxErrorKind::UnmatchedDelimiter { .. } => "unmatched-delimiter",
        }
    }

    pub fn into_diagnostic(self) -> Diagnostic {
        let severity = if self.is_fatal() {
            Severity::Fatal
        } else {
            Severity::Error
        };
        Diagnostic {
            severity,
            span: self.span,
            code: self.code(),
            message: self.to_string(),
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SyntaxErrorKind::Expected {
                expected,
                found,
                label,
            } => write!(
                f,
                "expected {} for {}, found {}",
                expected.describe(),
                label,
                found.describe()
            ),
            SyntaxErrorKind::Unexpected { found, context } => {
                write!(f, "unexpected {} in {}", found.describe(), context)
            }
            SyntaxErrorKind::UnexpectedEnd { context } => {
                write!(f, "pattern ended inside {}", context)
            }
            SyntaxErrorKind::UnknownFunction { name } => {
                write!(f, "unknown function '{}'", name)
            }
            SyntaxErrorKind::WrongArity {
                name,
                arity,
                accepted,
            } => write!(
                f,
                "function '{}' does not take {} arguments (accepts {:?})",
                name, arity, accepted
            ),
            SyntaxErrorKind::InvalidRegex { message } => {
                write!(f, "invalid regex: {}", message)
            }
            SyntaxErrorKind::InvalidNumber { text } => {
                write!(f, "'{}' is not a valid number", text)
            }
            SyntaxErrorKind::InvalidExpression { message } => {
                write!(f, "invalid expression: {}", message)
            }
            SyntaxErrorKind::MultipleSubtypes => {
                write!(f, "a query may name at most one subtype")
            }
            SyntaxErrorKind::SubtypeAfterExclusive => {
                write!(f, "the subtype must appear before the exclusivity sigil")
            }
            SyntaxErrorKind::EmptyRange => write!(f, "a syllable range may not be empty"),
            SyntaxErrorKind::EmptyCarrier => write!(f, "a carrier needs a name"),
            SyntaxErrorKind::UnmatchedDelimiter { found } => {
                write!(f, "unmatched {}", found.describe())
            }
        }
    }
}

pub(crate) type ParseResult<T> = Result<T, SyntaxError>;

/// What a production tells the driver after one step.
pub(crate) enum Step {
    /// Run this child to completion, then step the production again.
    Child(Box<dyn SyntaxParser>),
    /// The production emitted its nodes and is finished.
    Done,
}

pub(crate) trait SyntaxParser {
    fn step(&mut self, c: &mut Compiler<'_>) -> ParseResult<Step>;
}

/// Shared compilation state: the reader, the emit-buffer stack, accumulated
/// diagnostics, and the module table.
pub(crate) struct Compiler<'s> {
    pub(crate) source: &'s str,
    pub(crate) reader: TokenReader,
    pub(crate) registry: &'s FunctionRegistry,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) modules: BTreeMap<String, Rc<Rst>>,
    outputs: Vec<Vec<Rst>>,
}

impl<'s> Compiler<'s> {
    fn new(source: &'s str, reader: TokenReader, registry: &'s FunctionRegistry) -> Self {
        Self {
            source,
            reader,
            registry,
            diagnostics: Vec::new(),
            modules: BTreeMap::new(),
            outputs: vec![Vec::new()],
        }
    }

    pub(crate) fn emit(&mut self, rst: Rst) {
        self.outputs.last_mut().unwrap().push(rst);
    }

    pub(crate) fn push_output(&mut self) {
        self.outputs.push(Vec::new());
    }

    pub(crate) fn pop_output(&mut self) -> Vec<Rst> {
        if self.outputs.len() > 1 {
            self.outputs.pop().unwrap()
        } else {
            std::mem::take(self.outputs.last_mut().unwrap())
        }
    }

    pub(crate) fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Compile a regex token into a matcher, reporting unknown flags.
    pub(crate) fn compile_regex(&mut self, token: &Token) -> ParseResult<RantRegex> {
        let Some((body, flags)) = RantRegex::split_token(&token.text) else {
            return Err(SyntaxError::new(
                SyntaxErrorKind::InvalidRegex {
                    message: "malformed regex literal".to_string(),
                },
                token.span,
            ));
        };
        for flag in flags.chars() {
            if flag != 'i' {
                self.report(Diagnostic::warning(
                    token.span,
                    "unknown-regex-flag",
                    format!("unknown regex flag '{}'", flag),
                ));
            }
        }
        RantRegex::new(body, flags).map_err(|e| {
            SyntaxError::new(
                SyntaxErrorKind::InvalidRegex {
                    message: e.to_string(),
                },
                token.span,
            )
        })
    }
}

/// Everything compilation produces besides the diagnostics that failed it.
#[derive(Debug)]
pub(crate) struct ParseOutcome {
    pub root: Rc<Rst>,
    pub modules: BTreeMap<String, Rc<Rst>>,
    pub warnings: Vec<Diagnostic>,
}

/// Tokenize and parse a pattern into its runtime tree, driving the
/// production stack until the input is exhausted or a fatal error stops it.
pub(crate) fn compile_pattern(
    source: &str,
    registry: &FunctionRegistry,
) -> Result<ParseOutcome, CompileError> {
    let tokens = Lexer::new(source).tokenize().map_err(|diagnostic| CompileError {
        diagnostics: vec![diagnostic],
    })?;

    let mut c = Compiler::new(source, TokenReader::new(tokens), registry);
    let mut stack: Vec<(Box<dyn SyntaxParser>, usize)> = Vec::new();
    stack.push((Box::new(SeqParser::new(SeqMode::Main)), 1));

    loop {
        let Some((parser, output_depth)) = stack.last_mut() else {
            break;
        };
        let entry_depth = *output_depth;
        let step = parser.step(&mut c);

        match step {
            Ok(Step::Child(child)) => {
                let depth = c.outputs.len();
                stack.push((child, depth));
            }
            Ok(Step::Done) => {
                stack.pop();
            }
            Err(error) => {
                let fatal = error.is_fatal();
                c.report(error.into_diagnostic());
                if fatal {
                    break;
                }
                // Recover: drop the failing production, fold whatever it
                // already emitted into its parent, and resynchronize.
                stack.pop();
                while c.outputs.len() > entry_depth {
                    let orphaned = c.pop_output();
                    c.outputs.last_mut().unwrap().extend(orphaned);
                }
                c.reader.skip_to_recovery();
            }
        }
    }

    if c.diagnostics.iter().any(|d| d.is_error()) {
        return Err(CompileError {
            diagnostics: c.diagnostics,
        });
    }

    let mut nodes = c.pop_output();
    while c.outputs.len() > 1 {
        let mut outer = c.pop_output();
        outer.extend(nodes);
        nodes = outer;
    }
    let root = Rst::sequence(Span::new(0, source.len()), nodes);

    Ok(ParseOutcome {
        root: Rc::new(root),
        modules: c.modules,
        warnings: c.diagnostics,
    })
}
