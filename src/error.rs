use std::fmt;

use crate::token::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

/// A single compile-time finding. Non-fatal diagnostics accumulate;
/// a fatal one aborts compilation at the point it is raised.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub span: Span,
    pub code: &'static str,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(span: Span, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            span,
            code,
            message: message.into(),
        }
    }

    pub fn error(span: Span, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            span,
            code,
            message: message.into(),
        }
    }

    pub fn fatal(span: Span, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fatal,
            span,
            code,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity >= Severity::Error
    }

    /// Render the diagnostic with the offending source line underlined.
    pub fn display_with_source(&self, source: &str) -> String {
        let (line_num, line_start, line_content) = find_context(source, self.span);
        let col = self.span.start.saturating_sub(line_start);
        let len = (self.span.end.saturating_sub(self.span.start)).max(1).min(line_content.len().saturating_sub(col).max(1));
        let underline = format!("{}{}", " ".repeat(col), "^".repeat(len));

        format!(
            "{} [{}]: {}\n{:4} | {}\n     | {}",
            self.severity, self.code, self.message, line_num, line_content, underline
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] at {}..{}: {}",
            self.severity, self.code, self.span.start, self.span.end, self.message
        )
    }
}

fn find_context(source: &str, span: Span) -> (usize, usize, &str) {
    let mut line_num = 1;
    let mut line_start = 0;

    for (i, c) in source.char_indices() {
        if i >= span.start {
            break;
        }
        if c == '\n' {
            line_num += 1;
            line_start = i + 1;
        }
    }

    let line_end = source[line_start..]
        .find('\n')
        .map(|off| line_start + off)
        .unwrap_or(source.len());

    (line_num, line_start, &source[line_start..line_end])
}

/// Compilation failure: every diagnostic gathered before the parser gave up,
/// errors and warnings alike.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileError {
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let errors = self.errors().count();
        match self.errors().next() {
            Some(first) if errors == 1 => write!(f, "{}", first),
            Some(first) => write!(f, "{} (and {} more errors)", first, errors - 1),
            None => write!(f, "compilation failed"),
        }
    }
}

impl std::error::Error for CompileError {}

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeErrorKind {
    UnknownFunction { name: String },
    WrongArity { name: String, arity: usize },
    UnknownSubroutine { name: String },
    UnknownTarget { name: String },
    UnknownMark { name: String },
    UnknownVariable { name: String },
    DivisionByZero,
    InvalidArgument { function: String, message: String },
    StepBudget { limit: u64 },
    OutputBudget { limit: usize },
    DepthBudget { limit: usize },
    StackUnderflow,
}

/// A runtime failure. Carries the span of the RST node that raised it so
/// hosts can point back into the pattern source.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub span: Span,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RuntimeErrorKind::UnknownFunction { name } => {
                write!(f, "unknown function '{}'", name)
            }
            RuntimeErrorKind::WrongArity { name, arity } => {
                write!(f, "function '{}' has no overload taking {} arguments", name, arity)
            }
            RuntimeErrorKind::UnknownSubroutine { name } => {
                write!(f, "call to undefined subroutine '{}'", name)
            }
            RuntimeErrorKind::UnknownTarget { name } => {
                write!(f, "send to undeclared target '{}'", name)
            }
            RuntimeErrorKind::UnknownMark { name } => {
                write!(f, "reference to unset mark '{}'", name)
            }
            RuntimeErrorKind::UnknownVariable { name } => {
                write!(f, "undefined variable '{}'", name)
            }
            RuntimeErrorKind::DivisionByZero => write!(f, "division by zero"),
            RuntimeErrorKind::InvalidArgument { function, message } => {
                write!(f, "invalid argument to '{}': {}", function, message)
            }
            RuntimeErrorKind::StepBudget { limit } => {
                write!(f, "execution exceeded the step budget of {}", limit)
            }
            RuntimeErrorKind::OutputBudget { limit } => {
                write!(f, "output exceeded the length budget of {}", limit)
            }
            RuntimeErrorKind::DepthBudget { limit } => {
                write!(f, "execution exceeded the nesting budget of {}", limit)
            }
            RuntimeErrorKind::StackUnderflow => write!(f, "internal stack underflow"),
        }?;
        write!(f, " (at {}..{})", self.span.start, self.span.end)
    }
}

impl std::error::Error for RuntimeError {}

/// Failure to decode a `.rpgm` program file.
#[derive(Debug)]
pub enum LoadError {
    BadMagic,
    UnknownTypeId(u64),
    UnexpectedEof,
    InvalidUtf8,
    InvalidRegex(String),
    Io(std::io::Error),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::BadMagic => write!(f, "bad magic: not a compiled rant program"),
            LoadError::UnknownTypeId(id) => write!(f, "unknown node type id {}", id),
            LoadError::UnexpectedEof => write!(f, "unexpected end of program data"),
            LoadError::InvalidUtf8 => write!(f, "program data contains invalid UTF-8"),
            LoadError::InvalidRegex(s) => write!(f, "program data contains invalid regex: {}", s),
            LoadError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e)
    }
}

/// Rejection of a program name by the canonicalization rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameError {
    Empty,
    ForbiddenChar(char),
    EmptySegment,
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameError::Empty => write!(f, "program name is empty"),
            NameError::ForbiddenChar(c) => write!(f, "program name contains forbidden character '{}'", c),
            NameError::EmptySegment => write!(f, "program name contains an empty segment"),
        }
    }
}

impl std::error::Error for NameError {}
