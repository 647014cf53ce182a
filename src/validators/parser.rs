// ABOUTME: Parses slide validator descriptors from tutorial.json into validator sequences
// Configuration mistakes fail here, before any command is validated

use super::mapping::{descriptor_mapping, Validator, ValidatorFactory};
use super::progress::TutorialProgress;
use super::set::{ValidatorSequence, ValidatorSet};
use super::ValidatorError;
use serde_json::Value;
use tracing::debug;

pub struct ValidatorDescriptorsParser;

impl ValidatorDescriptorsParser {
    /// Build the sequence of one slide. Each entry is an object mapping descriptor keys to options.
    pub fn parse_slide(
        descriptors: &[Value],
        factory: &ValidatorFactory,
    ) -> Result<ValidatorSequence, ValidatorError> {
        let sets = descriptors
            .iter()
            .enumerate()
            .map(|(index, descriptor)| Self::parse_set(index, descriptor, factory))
            .collect::<Result<Vec<_>, _>>()?;
        ValidatorSequence::new(sets)
    }

    pub fn parse_tutorial<'a>(
        slides: impl IntoIterator<Item = &'a [Value]>,
        factory: &ValidatorFactory,
    ) -> Result<TutorialProgress, ValidatorError> {
        let sequences = slides
            .into_iter()
            .map(|descriptors| Self::parse_slide(descriptors, factory))
            .collect::<Result<Vec<_>, _>>()?;
        TutorialProgress::new(sequences)
    }

    fn parse_set(
        index: usize,
        descriptor: &Value,
        factory: &ValidatorFactory,
    ) -> Result<ValidatorSet, ValidatorError> {
        let entries = descriptor.as_object().ok_or(ValidatorError::MalformedSet(index))?;

        // Reject unknown keys and duplicate prevalidators before building anything
        let mut prevalidators = 0;
        for key in entries.keys() {
            let mapping =
                descriptor_mapping(key).ok_or_else(|| ValidatorError::UnknownKey(key.clone()))?;
            if mapping.prevalidate {
                prevalidators += 1;
            }
        }
        if prevalidators > 1 {
            return Err(ValidatorError::MultiplePrevalidators(index));
        }

        let mut prevalidator = None;
        let mut validators = Vec::new();
        for (key, options) in entries {
            match factory.create(key, options)? {
                Validator::Pre(validator) => prevalidator = Some(validator),
                Validator::Post(validator) => validators.push(validator),
            }
        }
        debug!(
            "Parsed validator set {} ({} post-validators, prevalidator: {})",
            index,
            validators.len(),
            prevalidator.is_some()
        );

        Ok(ValidatorSet::new(prevalidator, validators))
    }
}
