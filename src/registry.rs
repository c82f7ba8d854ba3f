//! Function registry: lowercased names and aliases mapped to overload
//! groups, resolved by exact arity. Populated by explicit registration at
//! startup; the registry is a plain value with no global state.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::interpreter::Interpreter;
use crate::rst::Rst;
use crate::token::Span;

/// How the VM prepares one argument before invoking a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamMode {
    /// The argument RST is executed in a sub-output and its string passed in.
    Cooked,
    /// The argument RST is passed unevaluated; the function decides if and
    /// how often it runs.
    Raw,
}

#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub name: &'static str,
    pub mode: ParamMode,
}

impl Param {
    pub const fn cooked(name: &'static str) -> Self {
        Self {
            name,
            mode: ParamMode::Cooked,
        }
    }

    pub const fn raw(name: &'static str) -> Self {
        Self {
            name,
            mode: ParamMode::Raw,
        }
    }
}

/// A prepared argument, shaped by the overload's parameter mode.
#[derive(Debug, Clone)]
pub enum ArgValue {
    Text(String),
    Pattern(Rc<Rst>),
}

impl ArgValue {
    /// Cooked string content; empty for a raw argument.
    pub fn text(&self) -> &str {
        match self {
            ArgValue::Text(s) => s,
            ArgValue::Pattern(_) => "",
        }
    }

    pub fn pattern(&self) -> Option<&Rc<Rst>> {
        match self {
            ArgValue::Pattern(p) => Some(p),
            ArgValue::Text(_) => None,
        }
    }
}

pub type Handler = fn(&mut Interpreter<'_>, Span, &[ArgValue]) -> Result<(), RuntimeError>;

pub struct Overload {
    pub params: Vec<Param>,
    pub description: &'static str,
    pub handler: Handler,
}

impl Overload {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

pub struct FunctionGroup {
    pub name: String,
    pub overloads: Vec<Overload>,
}

impl FunctionGroup {
    pub fn overload(&self, arity: usize) -> Option<&Overload> {
        self.overloads.iter().find(|o| o.arity() == arity)
    }

    /// Arities this group accepts, for diagnostics.
    pub fn arities(&self) -> Vec<usize> {
        let mut arities: Vec<usize> = self.overloads.iter().map(Overload::arity).collect();
        arities.sort_unstable();
        arities
    }
}

#[derive(Default)]
pub struct FunctionRegistry {
    groups: HashMap<String, FunctionGroup>,
    aliases: HashMap<String, String>,
}

impl FunctionRegistry {
    /// An empty registry. Most callers want `with_builtins`.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard registry with every builtin function registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::funcs::register_builtins(&mut registry);
        registry
    }

    pub fn register(&mut self, name: &str, overloads: Vec<Overload>) {
        let name = name.to_lowercase();
        self.groups.insert(name.clone(), FunctionGroup { name, overloads });
    }

    pub fn register_alias(&mut self, alias: &str, canonical: &str) {
        self.aliases
            .insert(alias.to_lowercase(), canonical.to_lowercase());
    }

    fn canonical<'r>(&'r self, name: &str) -> Option<&'r str> {
        let lowered = name.to_lowercase();
        if let Some((key, _)) = self.groups.get_key_value(&lowered) {
            return Some(key.as_str());
        }
        self.aliases.get(&lowered).map(String::as_str)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.canonical(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&FunctionGroup> {
        let canonical = self.canonical(name)?;
        self.groups.get(canonical)
    }

    pub fn overload(&self, name: &str, arity: usize) -> Option<&Overload> {
        self.get(name)?.overload(arity)
    }

    /// Canonical names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.groups.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Canonical names and aliases, sorted.
    pub fn names_and_aliases(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .groups
            .keys()
            .chain(self.aliases.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names
    }

    pub fn description(&self, name: &str, arity: usize) -> Option<&'static str> {
        self.overload(name, arity).map(|o| o.description)
    }

    /// Aliases resolving to `name`, sorted.
    pub fn aliases(&self, name: &str) -> Vec<&str> {
        let Some(canonical) = self.canonical(name) else {
            return Vec::new();
        };
        let mut aliases: Vec<&str> = self
            .aliases
            .iter()
            .filter(|(_, c)| c.as_str() == canonical)
            .map(|(a, _)| a.as_str())
            .collect();
        aliases.sort_unstable();
        aliases
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_discoverable() {
        let registry = FunctionRegistry::with_builtins();
        assert!(registry.exists("rep"));
        assert!(registry.exists("REP"));
        assert!(registry.exists("r"));
        assert!(!registry.exists("frobnicate"));
    }

    #[test]
    fn alias_resolves_to_same_group() {
        let registry = FunctionRegistry::with_builtins();
        let direct = registry.get("sep").unwrap();
        let aliased = registry.get("s").unwrap();
        assert_eq!(direct.name, aliased.name);
    }

    #[test]
    fn arity_resolution_is_exact() {
        let registry = FunctionRegistry::with_builtins();
        assert!(registry.overload("nth", 2).is_some());
        assert!(registry.overload("nth", 3).is_some());
        assert!(registry.overload("nth", 1).is_none());
    }

    #[test]
    fn descriptions_and_aliases_are_exposed() {
        let registry = FunctionRegistry::with_builtins();
        assert!(registry.description("rep", 1).is_some());
        assert_eq!(registry.aliases("rep"), vec!["r"]);
        assert!(registry.names().contains(&"sync"));
        assert!(registry.names_and_aliases().contains(&"x"));
    }
}
