// ABOUTME: Tutorial validation framework
// Pre-validators gate on command text, post-validators check results, sets and sequences drive progress

pub mod mapping;
pub mod parser;
pub mod post;
pub mod pre;
pub mod probe;
pub mod progress;
pub mod set;

pub use mapping::{descriptor_keys, descriptor_mapping, DescriptorMapping, Validator, ValidatorFactory, ValidatorKind};
pub use parser::ValidatorDescriptorsParser;
pub use post::{ExitCodeValidator, OutputValidator, PostCheck, PostValidator};
pub use pre::{CommandPreValidator, PreValidator, TextPreValidator};
pub use probe::{CreatesOptions, CreatesValidator};
pub use progress::{ProgressEvent, TutorialProgress};
pub use set::{SequenceEvent, ValidatorSequence, ValidatorSet};

use crate::docker::{ContainerError, ContainerRuntime};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidatorError {
    #[error("Unknown validator type {0}")]
    UnknownKey(String),
    #[error("Validator set {0} declares more than one prevalidator")]
    MultiplePrevalidators(usize),
    #[error("Invalid options for validator '{key}': {source}")]
    InvalidOptions {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Validator set {0} is not an object")]
    MalformedSet(usize),
    #[error("A validator sequence needs at least one set")]
    EmptySequence,
    #[error("Unexpected output: \"{0}\"")]
    UnexpectedOutput(String),
    #[error("exec err: {0}")]
    ExecError(String),
    #[error("Validator '{0}' needs a session context")]
    MissingContext(&'static str),
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error(transparent)]
    Container(#[from] ContainerError),
}

/// Session services injected into validators that issue their own container commands.
#[derive(Clone)]
pub struct ValidatorContext {
    pub tutorial_id: String,
    pub runtime: Arc<dyn ContainerRuntime>,
}

impl ValidatorContext {
    pub fn new(tutorial_id: impl Into<String>, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            tutorial_id: tutorial_id.into(),
            runtime,
        }
    }
}

impl fmt::Debug for ValidatorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorContext")
            .field("tutorial_id", &self.tutorial_id)
            .finish_non_exhaustive()
    }
}
