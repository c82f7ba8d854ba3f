//! Rant: a small language for procedurally generating natural-language
//! text.
//!
//! A pattern is plain text interleaved with markup: blocks of alternatives
//! (`{a|b|c}`), function tags (`[rep:3]`), dictionary queries
//! (`<noun-animal.plural>`), subroutines, arithmetic, and replacers.
//! Compiling a pattern yields a [`Program`]; running it against a seed and
//! an optional [`Dictionary`] produces text on one or more named channels.
//!
//! ```
//! use rant::{Program, RunOptions};
//!
//! let program = Program::compile("[rep:3][sep:,\\s]{a}").unwrap();
//! let result = program.run(&RunOptions::seeded(0)).unwrap();
//! assert_eq!(result.main(), "a, a, a");
//! ```

pub mod channel;
pub mod codec;
pub mod dictionary;
pub mod error;
pub mod format;
pub mod funcs;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod program;
pub mod query;
pub mod reader;
pub mod registry;
pub mod rst;
pub mod selector;
pub mod token;

pub use dictionary::{Dictionary, Entry, Table};
pub use error::{
    CompileError, Diagnostic, LoadError, NameError, RuntimeError, RuntimeErrorKind, Severity,
};
pub use format::{Capitalization, NumberFormat};
pub use interpreter::{Interpreter, Limits, RantValue};
pub use lexer::Lexer;
pub use program::{
    canonicalize, ArgsSchema, Program, ProgramArgs, ProgramOrigin, RunOptions, RunResult,
};
pub use query::{Carrier, CarrierKind, ClassFilterRule, Query, RegexFilter, SyllableRange};
pub use registry::{ArgValue, FunctionRegistry, Overload, Param, ParamMode};
pub use rst::{ChannelVisibility, Rst, RstKind};
pub use selector::{Selector, SelectorStrategy, Synchronizer};
pub use token::{Span, Token, TokenKind};

/// Compile a pattern under the default name and registry.
pub fn compile(source: &str) -> Result<Program, CompileError> {
    Program::compile(source)
}

/// Compile a pattern under an explicit program name.
pub fn compile_named(source: &str, name: &str) -> Result<Program, CompileError> {
    Program::compile_named(source, name)
}

/// Compile and run a pattern in one step with a fixed seed. Convenience
/// for tests and examples.
pub fn run_pattern(source: &str, seed: u64) -> Result<String, Box<dyn std::error::Error>> {
    let program = Program::compile(source)?;
    let result = program.run(&RunOptions::seeded(seed))?;
    Ok(result.main().to_string())
}
