//! Compiled programs and the public run surface.

use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use rand::Rng;

use crate::codec;
use crate::dictionary::Dictionary;
use crate::error::{CompileError, Diagnostic, LoadError, NameError, RuntimeError};
use crate::interpreter::{Interpreter, Limits, RantValue};
use crate::parser;
use crate::registry::FunctionRegistry;
use crate::rst::Rst;
use crate::token::Span;

/// Characters a program name may not contain.
pub const FORBIDDEN_NAME_CHARS: &[char] = &[
    '$', '@', ':', '~', '%', '?', '>', '<', '[', ']', '|', '{', '}',
];

/// Canonical slash-form of a program name: segments trimmed and re-joined.
/// Idempotent for every accepted input.
pub fn canonicalize(name: &str) -> Result<String, NameError> {
    if name.trim().is_empty() {
        return Err(NameError::Empty);
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_NAME_CHARS.contains(c)) {
        return Err(NameError::ForbiddenChar(c));
    }

    let mut segments = Vec::new();
    for segment in name.split('/') {
        let trimmed = segment.trim();
        if trimmed.is_empty() {
            return Err(NameError::EmptySegment);
        }
        segments.push(trimmed);
    }
    Ok(segments.join("/"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramOrigin {
    String,
    File,
    Stream,
}

/// A compiled pattern. Immutable; safe to run any number of times, each run
/// with its own interpreter state.
#[derive(Debug, Clone)]
pub struct Program {
    pub name: String,
    pub origin: ProgramOrigin,
    pub source: Option<String>,
    pub root: Rc<Rst>,
    /// Names bound by top-level subroutine definitions, kept for lookup.
    pub modules: Option<BTreeMap<String, Rc<Rst>>>,
}

impl Program {
    pub fn compile(source: &str) -> Result<Program, CompileError> {
        Self::compile_named(source, "pattern")
    }

    pub fn compile_named(source: &str, name: &str) -> Result<Program, CompileError> {
        let registry = FunctionRegistry::with_builtins();
        Self::compile_with(source, name, &registry)
    }

    /// Compile against a caller-supplied registry, so custom function sets
    /// see the same compile-time name and arity checks as the builtins.
    pub fn compile_with(
        source: &str,
        name: &str,
        registry: &FunctionRegistry,
    ) -> Result<Program, CompileError> {
        let name = canonicalize(name).map_err(|e| CompileError {
            diagnostics: vec![Diagnostic::fatal(
                Span::default(),
                "invalid-name",
                e.to_string(),
            )],
        })?;

        let outcome = parser::compile_pattern(source, registry)?;
        Ok(Program {
            name,
            origin: ProgramOrigin::String,
            source: Some(source.to_string()),
            root: outcome.root,
            modules: if outcome.modules.is_empty() {
                None
            } else {
                Some(outcome.modules)
            },
        })
    }

    pub fn save(&self) -> Vec<u8> {
        codec::serialize_program(&self.root)
    }

    pub fn load(bytes: &[u8]) -> Result<Program, LoadError> {
        let root = codec::deserialize_program(bytes)?;
        Ok(Program {
            name: "stream".to_string(),
            origin: ProgramOrigin::Stream,
            source: None,
            root: Rc::new(root),
            modules: None,
        })
    }

    pub fn save_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::write(path, self.save())
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Program, LoadError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let mut program = Self::load(&bytes)?;
        program.origin = ProgramOrigin::File;
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if let Ok(name) = canonicalize(stem) {
                program.name = name;
            }
        }
        Ok(program)
    }

    pub fn run(&self, options: &RunOptions<'_>) -> Result<RunResult, RuntimeError> {
        let fallback_registry;
        let registry = match options.registry {
            Some(registry) => registry,
            None => {
                fallback_registry = FunctionRegistry::with_builtins();
                &fallback_registry
            }
        };
        let seed = options.seed.unwrap_or_else(|| rand::thread_rng().gen());

        let mut interpreter = Interpreter::new(seed, registry, options.dictionary, options.limits);
        if let Some(args) = options.args {
            for (key, value) in args.iter() {
                interpreter.define_var(key, RantValue::Text(value.to_string()));
            }
        }

        let channels = interpreter.run_root(&self.root)?;
        Ok(RunResult { channels })
    }
}

/// Options for one execution. A missing seed is drawn from OS entropy.
#[derive(Default)]
pub struct RunOptions<'a> {
    pub seed: Option<u64>,
    pub args: Option<&'a ProgramArgs>,
    pub dictionary: Option<&'a Dictionary>,
    pub registry: Option<&'a FunctionRegistry>,
    pub limits: Limits,
}

impl<'a> RunOptions<'a> {
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Default::default()
        }
    }
}

/// Output of one run: the main channel plus every recorded public channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    channels: Vec<(String, String)>,
}

impl RunResult {
    pub fn main(&self) -> &str {
        &self.channels[0].1
    }

    pub fn channel(&self, name: &str) -> Option<&str> {
        self.channels
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, text)| text.as_str())
    }

    pub fn channels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.channels
            .iter()
            .map(|(name, text)| (name.as_str(), text.as_str()))
    }
}

/// Named string arguments passed to a run, readable in patterns as
/// variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramArgs {
    map: BTreeMap<String, String>,
}

impl ProgramArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.map.insert(key.into(), value.into());
        self
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut args = Self::new();
        for (key, value) in pairs {
            args.set(key, value);
        }
        args
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// A declared argument layout. Fields are positional; a field may expose
/// itself to patterns under an alias instead of its declared name.
#[derive(Debug, Clone, Default)]
pub struct ArgsSchema {
    fields: Vec<SchemaField>,
}

#[derive(Debug, Clone)]
struct SchemaField {
    name: String,
    alias: Option<String>,
}

impl ArgsSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(SchemaField {
            name: name.into(),
            alias: None,
        });
        self
    }

    pub fn aliased_field(mut self, name: impl Into<String>, alias: impl Into<String>) -> Self {
        self.fields.push(SchemaField {
            name: name.into(),
            alias: Some(alias.into()),
        });
        self
    }

    /// Bind positional values to the declared fields. Missing values leave
    /// their fields unset; extra values are ignored.
    pub fn build(&self, values: &[&str]) -> ProgramArgs {
        let mut args = ProgramArgs::new();
        for (field, value) in self.fields.iter().zip(values) {
            let exposed = field.alias.as_deref().unwrap_or(&field.name);
            args.set(exposed, *value);
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalization_trims_segments() {
        assert_eq!(canonicalize("a / b /c").unwrap(), "a/b/c");
        assert_eq!(canonicalize("  hello  ").unwrap(), "hello");
    }

    #[test]
    fn canonicalization_is_idempotent() {
        for name in ["a/b", " x / y ", "one", "a b/c d"] {
            let once = canonicalize(name).unwrap();
            assert_eq!(canonicalize(&once).unwrap(), once);
        }
    }

    #[test]
    fn invalid_names_are_rejected() {
        assert_eq!(canonicalize(""), Err(NameError::Empty));
        assert_eq!(canonicalize("   "), Err(NameError::Empty));
        assert_eq!(canonicalize("a?b"), Err(NameError::ForbiddenChar('?')));
        assert_eq!(canonicalize("a[b"), Err(NameError::ForbiddenChar('[')));
        assert_eq!(canonicalize("a//b"), Err(NameError::EmptySegment));
        assert_eq!(canonicalize("/a"), Err(NameError::EmptySegment));
    }

    #[test]
    fn args_builder_round_trip() {
        let mut args = ProgramArgs::new();
        args.set("name", "Alice").set("mood", "cheerful");
        assert_eq!(args.get("name"), Some("Alice"));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn schema_aliases_rename_fields() {
        let schema = ArgsSchema::new()
            .field("subject")
            .aliased_field("object_name", "object");
        let args = schema.build(&["cat", "ball"]);
        assert_eq!(args.get("subject"), Some("cat"));
        assert_eq!(args.get("object"), Some("ball"));
        assert_eq!(args.get("object_name"), None);
    }

    #[test]
    fn schema_tolerates_missing_values() {
        let schema = ArgsSchema::new().field("a").field("b");
        let args = schema.build(&["only"]);
        assert_eq!(args.get("a"), Some("only"));
        assert_eq!(args.get("b"), None);
    }
}
