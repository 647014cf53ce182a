// ABOUTME: Post-validators checking the result of a command
// Each one latches once satisfied so it only has to succeed on one command

use super::probe::CreatesValidator;
use super::ValidatorError;
use crate::docker::TtyLog;
use regex::Regex;
use serde::Deserialize;

/// Succeeds when the command exited with the expected code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ExitCodeValidator {
    #[serde(rename = "exitCode")]
    pub exit_code: i32,
}

impl ExitCodeValidator {
    pub fn validate(&self, ttylog: &TtyLog) -> bool {
        ttylog.exit_code == self.exit_code
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputValidatorOptions {
    pub contains: Option<String>,
    pub matches: Option<String>,
}

/// Succeeds when the output of the command meets every given criterion.
#[derive(Debug, Clone)]
pub struct OutputValidator {
    contains: Option<String>,
    matches: Option<Regex>,
}

impl OutputValidator {
    pub fn new(options: OutputValidatorOptions) -> Result<Self, ValidatorError> {
        let matches = options.matches.as_deref().map(Regex::new).transpose()?;
        Ok(Self {
            contains: options.contains,
            matches,
        })
    }

    pub fn validate(&self, output: &str) -> bool {
        self.contains.as_deref().map_or(true, |text| output.contains(text))
            && self.matches.as_ref().map_or(true, |pattern| pattern.is_match(output))
    }
}

#[derive(Debug, Clone)]
pub enum PostCheck {
    ExitCode(ExitCodeValidator),
    Creates(CreatesValidator),
    Output(OutputValidator),
}

impl PostCheck {
    pub fn name(&self) -> &'static str {
        match self {
            PostCheck::ExitCode(_) => "ExitCodeValidator",
            PostCheck::Creates(_) => "CreatesValidator",
            PostCheck::Output(_) => "OutputValidator",
        }
    }

    pub async fn validate(&self, output: &str, ttylog: &TtyLog) -> Result<bool, ValidatorError> {
        match self {
            PostCheck::ExitCode(validator) => Ok(validator.validate(ttylog)),
            PostCheck::Creates(validator) => validator.validate(ttylog).await,
            PostCheck::Output(validator) => Ok(validator.validate(output)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostValidator {
    check: PostCheck,
    will_validate: bool,
}

impl PostValidator {
    pub fn new(check: PostCheck) -> Self {
        Self {
            check,
            will_validate: true,
        }
    }

    pub fn check(&self) -> &PostCheck {
        &self.check
    }

    /// False once the validator has succeeded.
    pub fn can_validate(&self) -> bool {
        self.will_validate
    }

    pub async fn is_valid(&mut self, output: &str, ttylog: &TtyLog) -> Result<bool, ValidatorError> {
        let valid = self.check.validate(output, ttylog).await?;
        if valid {
            self.will_validate = false;
        }
        Ok(valid)
    }
}
