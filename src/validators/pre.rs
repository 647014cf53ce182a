// ABOUTME: Pre-validators deciding whether a command line is the one a step expects
// Post-validators of a set are only considered once the pre-validator matched

use crate::command::CommandParser;
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TextPreValidator {
    pub cmd: String,
}

impl TextPreValidator {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }

    /// Prefix match first, then a token-by-token comparison that tolerates extra whitespace
    /// but not reordering.
    pub fn validate(&self, cmd: &str) -> bool {
        if cmd.trim().is_empty() {
            return false;
        }
        if cmd.starts_with(&self.cmd) {
            return true;
        }

        let given: Vec<&str> = cmd.split_whitespace().collect();
        self.cmd
            .split_whitespace()
            .enumerate()
            .all(|(index, expected)| given.get(index) == Some(&expected))
    }
}

/// Matches a parsed command: same name, `args` as an adjacent run and every listed option.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandPreValidator {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Option token to the expected value, `null` for presence only
    #[serde(default)]
    pub options: IndexMap<String, Option<String>>,
}

impl CommandPreValidator {
    pub fn validate(&self, cmd: &str) -> bool {
        let command = match CommandParser::parse(cmd) {
            Ok(command) => command,
            Err(e) => {
                debug!("Command prevalidation skipped '{}': {}", cmd, e);
                return false;
            }
        };

        command.is(&self.name, self.args.as_slice())
            && self
                .options
                .iter()
                .all(|(option, value)| command.has_option(option.as_str(), value.as_deref()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreValidator {
    Text(TextPreValidator),
    Command(CommandPreValidator),
}

impl PreValidator {
    pub fn validate(&self, cmd: &str) -> bool {
        match self {
            PreValidator::Text(validator) => validator.validate(cmd),
            PreValidator::Command(validator) => validator.validate(cmd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_prevalidator_tolerates_whitespace() {
        let validator = TextPreValidator::new("git --version");
        assert!(validator.validate("git --version"));
        assert!(validator.validate("git   --version"));
        assert!(validator.validate("git --version --verbose"));
        assert!(!validator.validate("ls -l"));
        assert!(!validator.validate("git --verison"));
        assert!(!validator.validate("--version git"));
    }

    #[test]
    fn test_text_prevalidator_rejects_blank() {
        let validator = TextPreValidator::new("touch");
        assert!(!validator.validate(""));
        assert!(!validator.validate("   "));
        assert!(validator.validate("touch /root/test.txt"));
    }

    #[test]
    fn test_command_prevalidator() {
        let validator: CommandPreValidator = serde_json::from_value(serde_json::json!({
            "name": "git",
            "args": ["commit"],
            "options": { "-m": null, "-a": null }
        }))
        .unwrap();

        assert!(validator.validate("git commit -am 'first commit'"));
        assert!(validator.validate("git  commit -a -m wip"));
        assert!(!validator.validate("git commit -m wip"));
        assert!(!validator.validate("git add -A"));
        assert!(!validator.validate("echo 'unterminated"));
    }

    #[test]
    fn test_command_prevalidator_option_value() {
        let validator: CommandPreValidator = serde_json::from_value(serde_json::json!({
            "name": "tar",
            "options": { "-f": "archive.tar.gz" }
        }))
        .unwrap();

        assert!(validator.validate("tar -xzf archive.tar.gz"));
        assert!(!validator.validate("tar -xzf other.tar.gz"));
        assert!(PreValidator::Command(validator).validate("cd /tmp && tar -czf archive.tar.gz ."));
    }
}
