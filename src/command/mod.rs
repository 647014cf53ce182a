// ABOUTME: Structured shell commands used by validators
// A Command is a name, positional args and an option map built from a raw line

pub mod lexer;
pub mod parser;

pub use parser::CommandParser;

use indexmap::IndexMap;
use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Cannot parse an empty command")]
    Empty,
    #[error("No command name found")]
    MissingCommandName,
    #[error("Unterminated {0} in command")]
    UnterminatedQuote(char),
}

/// Something an argument can be matched against.
///
/// Text patterns match when the argument contains them, regexes when they match anywhere in it.
pub trait ArgPattern {
    fn matches_arg(&self, arg: &str) -> bool;
}

impl ArgPattern for str {
    fn matches_arg(&self, arg: &str) -> bool {
        arg.contains(self)
    }
}

impl ArgPattern for String {
    fn matches_arg(&self, arg: &str) -> bool {
        arg.contains(self.as_str())
    }
}

impl ArgPattern for Regex {
    fn matches_arg(&self, arg: &str) -> bool {
        self.is_match(arg)
    }
}

impl<T: ArgPattern + ?Sized> ArgPattern for &T {
    fn matches_arg(&self, arg: &str) -> bool {
        (**self).matches_arg(arg)
    }
}

/// A parsed shell command. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<String>,
    /// Option token to the value that followed it.
    ///
    /// The value of an option is the first non-option argument after it, before the next
    /// option. There is no way to tell a flag's value from a positional argument that follows a
    /// flag (`mkdir -p /root/test` records `-p` = `/root/test`), so a value should only be trusted
    /// when the validation context expects one.
    options: IndexMap<String, Option<String>>,
}

impl Command {
    /// Build from already classified arguments (short clusters expanded, long options split).
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        let mut options = IndexMap::new();
        let mut open_key: Option<String> = None;

        for arg in &args {
            if arg.starts_with('-') {
                options.insert(arg.clone(), None);
                open_key = Some(arg.clone());
            } else if let Some(key) = open_key.take() {
                options.insert(key, Some(arg.clone()));
            }
        }

        Self {
            name: name.into(),
            args,
            options,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn options(&self) -> &IndexMap<String, Option<String>> {
        &self.options
    }

    pub fn has_arg<P: ArgPattern + ?Sized>(&self, pattern: &P) -> bool {
        self.args.iter().any(|arg| pattern.matches_arg(arg))
    }

    /// The first argument matching `patterns[0]` must be followed by arguments matching the rest,
    /// in order and without gaps.
    pub fn has_args<P: ArgPattern>(&self, patterns: &[P]) -> bool {
        let Some((first, rest)) = patterns.split_first() else {
            return false;
        };
        let Some(found) = self.args.iter().position(|arg| first.matches_arg(arg)) else {
            return false;
        };
        rest.iter()
            .enumerate()
            .all(|(i, pattern)| self.args.get(found + i + 1).is_some_and(|arg| pattern.matches_arg(arg)))
    }

    /// Same name, and `has_args(args)` when args are given.
    pub fn is<P: ArgPattern>(&self, name: &str, args: &[P]) -> bool {
        self.name == name && (args.is_empty() || self.has_args(args))
    }

    /// Looks up the first option whose key matches; with `value`, that option must hold it.
    pub fn has_option<P: ArgPattern + ?Sized>(&self, option: &P, value: Option<&str>) -> bool {
        self.options
            .iter()
            .find(|(key, _)| option.matches_arg(key))
            .is_some_and(|(_, found)| value.map_or(true, |expected| found.as_deref() == Some(expected)))
    }
}
