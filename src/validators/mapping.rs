// ABOUTME: Descriptor key table and validator factory
// Maps tutorial.json keys to validator kinds and injects the session context when needed

use super::post::{ExitCodeValidator, OutputValidator, OutputValidatorOptions, PostCheck, PostValidator};
use super::pre::{CommandPreValidator, PreValidator, TextPreValidator};
use super::probe::{CreatesOptions, CreatesValidator};
use super::{ValidatorContext, ValidatorError};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use serde::de::DeserializeOwned;
use serde::de::Error as _;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorKind {
    TextPre,
    CommandPre,
    ExitCode,
    Creates,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorMapping {
    pub kind: ValidatorKind,
    /// Needs the session context (runs its own container commands)
    pub use_service: bool,
    /// Gates the set instead of checking a result
    pub prevalidate: bool,
}

const fn mapping(kind: ValidatorKind, use_service: bool, prevalidate: bool) -> DescriptorMapping {
    DescriptorMapping {
        kind,
        use_service,
        prevalidate,
    }
}

lazy_static! {
    static ref DESCRIPTOR_MAPPING: IndexMap<&'static str, DescriptorMapping> = IndexMap::from([
        ("prevalidate", mapping(ValidatorKind::TextPre, false, true)),
        ("input", mapping(ValidatorKind::TextPre, false, true)),
        ("command", mapping(ValidatorKind::CommandPre, false, true)),
        ("rc", mapping(ValidatorKind::ExitCode, false, false)),
        ("exitCode", mapping(ValidatorKind::ExitCode, false, false)),
        ("creates", mapping(ValidatorKind::Creates, true, false)),
        ("output", mapping(ValidatorKind::Output, false, false)),
    ]);
}

pub fn descriptor_mapping(key: &str) -> Option<DescriptorMapping> {
    DESCRIPTOR_MAPPING.get(key).copied()
}

/// Every key accepted in a validator set
pub fn descriptor_keys() -> impl Iterator<Item = &'static str> {
    DESCRIPTOR_MAPPING.keys().copied()
}

#[derive(Debug, Clone)]
pub enum Validator {
    Pre(PreValidator),
    Post(PostValidator),
}

/// Creates validators from descriptor entries.
#[derive(Debug, Clone, Default)]
pub struct ValidatorFactory {
    context: Option<ValidatorContext>,
}

impl ValidatorFactory {
    /// A factory that injects `context` into validators declaring `use_service`.
    pub fn new(context: ValidatorContext) -> Self {
        Self {
            context: Some(context),
        }
    }

    /// A factory without session context. Validators needing one fail when they run.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn create(&self, key: &str, options: &Value) -> Result<Validator, ValidatorError> {
        let mapping =
            descriptor_mapping(key).ok_or_else(|| ValidatorError::UnknownKey(key.to_string()))?;
        let context = if mapping.use_service {
            self.context.clone()
        } else {
            None
        };

        let validator = match mapping.kind {
            ValidatorKind::TextPre => {
                let options: TextPreValidator = parse_options(key, options)?;
                Validator::Pre(PreValidator::Text(options))
            }
            ValidatorKind::CommandPre => {
                let options: CommandPreValidator = parse_options(key, options)?;
                Validator::Pre(PreValidator::Command(options))
            }
            ValidatorKind::ExitCode => {
                let options: ExitCodeValidator = parse_options(key, options)?;
                Validator::Post(PostValidator::new(PostCheck::ExitCode(options)))
            }
            ValidatorKind::Creates => {
                let options = parse_options::<CreatesOptions>(key, options)?;
                Validator::Post(PostValidator::new(PostCheck::Creates(CreatesValidator::new(
                    options, context,
                ))))
            }
            ValidatorKind::Output => {
                let options = parse_options::<OutputValidatorOptions>(key, options)?;
                if options.contains.is_none() && options.matches.is_none() {
                    return Err(ValidatorError::InvalidOptions {
                        key: key.to_string(),
                        source: serde_json::Error::custom("expected `contains` or `matches`"),
                    });
                }
                Validator::Post(PostValidator::new(PostCheck::Output(OutputValidator::new(options)?)))
            }
        };
        Ok(validator)
    }
}

fn parse_options<T: DeserializeOwned>(key: &str, options: &Value) -> Result<T, ValidatorError> {
    serde_json::from_value(options.clone()).map_err(|source| ValidatorError::InvalidOptions {
        key: key.to_string(),
        source,
    })
}
