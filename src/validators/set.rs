// ABOUTME: Validator sets and the ordered sequence of sets of one slide
// A set is valid once prevalidated and every post-validator has succeeded at least once

use super::post::PostValidator;
use super::pre::PreValidator;
use super::ValidatorError;
use crate::docker::TtyLog;
use futures_util::future::join_all;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ValidatorSet {
    prevalidator: Option<PreValidator>,
    prevalidated: bool,
    validators: Vec<PostValidator>,
    validated: usize,
}

impl ValidatorSet {
    pub fn new(prevalidator: Option<PreValidator>, validators: Vec<PostValidator>) -> Self {
        Self {
            prevalidator,
            prevalidated: false,
            validators,
            validated: 0,
        }
    }

    /// Record whether `cmd` passes the pre-validator. A set without one always passes.
    pub fn prevalidate(&mut self, cmd: &str) -> bool {
        debug!("prevalidation started: {}", cmd);
        self.prevalidated = self
            .prevalidator
            .as_ref()
            .map_or(true, |prevalidator| prevalidator.validate(cmd));
        debug!("prevalidation completed: {}", self.prevalidated);
        self.prevalidated
    }

    /// Run every post-validator that has not succeeded yet, concurrently.
    ///
    /// Successes are counted before the first error (if any) is returned.
    pub async fn validate(&mut self, output: &str, ttylog: &TtyLog) -> Result<(), ValidatorError> {
        if !self.prevalidated {
            debug!("validation skipped");
            return Ok(());
        }
        debug!("validation started");

        let results = join_all(
            self.validators
                .iter_mut()
                .filter(|validator| validator.can_validate())
                .map(|validator| async move {
                    let name = validator.check().name();
                    (name, validator.is_valid(output, ttylog).await)
                }),
        )
        .await;

        let total = self.validators.len();
        let mut first_error = None;
        for (name, result) in results {
            match result {
                Ok(true) => {
                    self.validated += 1;
                    debug!("{} is valid (validated={}/{})", name, self.validated, total);
                }
                Ok(false) => debug!("{} is NOT valid (validated={}/{})", name, self.validated, total),
                Err(e) => {
                    debug!("{} failed: {}", name, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    pub fn is_valid(&self) -> bool {
        self.prevalidated && self.validated == self.validators.len()
    }

    pub fn has_prevalidator(&self) -> bool {
        self.prevalidator.is_some()
    }

    pub fn post_validators(&self) -> &[PostValidator] {
        &self.validators
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEvent {
    /// The cursor moved to the set at this index
    Advance(usize),
    /// The last set became valid
    Complete,
}

/// Ordered validator sets with a cursor.
#[derive(Debug, Clone)]
pub struct ValidatorSequence {
    sets: Vec<ValidatorSet>,
    current: usize,
    completed: bool,
}

impl ValidatorSequence {
    pub fn new(sets: Vec<ValidatorSet>) -> Result<Self, ValidatorError> {
        if sets.is_empty() {
            return Err(ValidatorError::EmptySequence);
        }
        Ok(Self {
            sets,
            current: 0,
            completed: false,
        })
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn pre_validate(&mut self, cmd: &str) -> bool {
        !self.completed && self.sets[self.current].prevalidate(cmd)
    }

    /// Validate the current set and move the cursor when it becomes valid.
    ///
    /// `Complete` is returned once; afterwards the sequence ignores every command.
    pub async fn validate(
        &mut self,
        output: &str,
        ttylog: &TtyLog,
    ) -> Result<Option<SequenceEvent>, ValidatorError> {
        if self.completed {
            return Ok(None);
        }

        let set = &mut self.sets[self.current];
        set.validate(output, ttylog).await?;
        if !set.is_valid() {
            return Ok(None);
        }

        if self.current + 1 < self.sets.len() {
            self.current += 1;
            Ok(Some(SequenceEvent::Advance(self.current)))
        } else {
            self.completed = true;
            Ok(Some(SequenceEvent::Complete))
        }
    }

    /// One validation batch: pre-validate the command, then validate when it matched.
    pub async fn process(
        &mut self,
        output: &str,
        ttylog: &TtyLog,
    ) -> Result<Option<SequenceEvent>, ValidatorError> {
        if self.pre_validate(&ttylog.cmd) {
            self.validate(output, ttylog).await
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::post::{ExitCodeValidator, OutputValidator, OutputValidatorOptions, PostCheck};
    use crate::validators::pre::TextPreValidator;

    fn ttylog(cmd: &str, exit_code: i32) -> TtyLog {
        TtyLog {
            user: "root".to_string(),
            cmd: cmd.to_string(),
            exit_code,
            workdir: "/root".to_string(),
        }
    }

    fn input(cmd: &str) -> Option<PreValidator> {
        Some(PreValidator::Text(TextPreValidator::new(cmd)))
    }

    fn exit_code(code: i32) -> PostValidator {
        PostValidator::new(PostCheck::ExitCode(ExitCodeValidator { exit_code: code }))
    }

    fn output_contains(text: &str) -> PostValidator {
        let options = OutputValidatorOptions {
            contains: Some(text.to_string()),
            matches: None,
        };
        PostValidator::new(PostCheck::Output(OutputValidator::new(options).unwrap()))
    }

    #[tokio::test]
    async fn test_set_needs_prevalidation_and_every_post_validator() {
        let mut set = ValidatorSet::new(input("make"), vec![exit_code(0), output_contains("done")]);
        assert!(!set.is_valid());

        // Post-validators are not run without prevalidation
        assert!(!set.prevalidate("ls"));
        set.validate("done", &ttylog("ls", 0)).await.unwrap();
        assert!(!set.is_valid());

        assert!(set.prevalidate("make all"));
        set.validate("building", &ttylog("make all", 0)).await.unwrap();
        assert!(!set.is_valid());

        // The exit code already latched; only the output validator runs again
        assert!(set.prevalidate("make all"));
        set.validate("done", &ttylog("make all", 2)).await.unwrap();
        assert!(set.is_valid());
    }

    #[tokio::test]
    async fn test_set_without_prevalidator_always_prevalidates() {
        let mut set = ValidatorSet::new(None, vec![exit_code(0)]);
        assert!(set.prevalidate(""));
        set.validate("", &ttylog("true", 0)).await.unwrap();
        assert!(set.is_valid());
    }

    #[tokio::test]
    async fn test_set_prevalidation_is_per_command() {
        let mut set = ValidatorSet::new(input("touch"), vec![]);
        assert!(set.prevalidate("touch a"));
        assert!(set.is_valid());
        assert!(!set.prevalidate("rm a"));
        assert!(!set.is_valid());
    }

    #[tokio::test]
    async fn test_sequence_advances_then_completes_once() {
        let mut sequence = ValidatorSequence::new(vec![
            ValidatorSet::new(input("mkdir"), vec![exit_code(0)]),
            ValidatorSet::new(input("touch"), vec![exit_code(0)]),
        ])
        .unwrap();

        assert_eq!(sequence.process("", &ttylog("touch a", 0)).await.unwrap(), None);
        assert_eq!(
            sequence.process("", &ttylog("mkdir a", 0)).await.unwrap(),
            Some(SequenceEvent::Advance(1))
        );
        assert_eq!(sequence.current_index(), 1);
        assert_eq!(sequence.process("", &ttylog("touch a/b", 1)).await.unwrap(), None);
        assert_eq!(
            sequence.process("", &ttylog("touch a/b", 0)).await.unwrap(),
            Some(SequenceEvent::Complete)
        );
        assert!(sequence.is_complete());
        assert_eq!(sequence.process("", &ttylog("touch a/b", 0)).await.unwrap(), None);
        assert_eq!(sequence.process("", &ttylog("mkdir c", 0)).await.unwrap(), None);
    }

    #[test]
    fn test_empty_sequence_is_rejected() {
        assert!(matches!(ValidatorSequence::new(vec![]), Err(ValidatorError::EmptySequence)));
    }
}
