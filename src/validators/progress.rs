// ABOUTME: Slide-level tutorial progress built from one validator sequence per slide
// Emits next when a slide is done and completed once after the last slide

use super::set::{SequenceEvent, ValidatorSequence};
use super::ValidatorError;
use crate::docker::TtyLog;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The tutorial moved to the slide at this index
    Next(usize),
    /// The last slide was validated
    Completed,
}

#[derive(Debug, Clone)]
pub struct TutorialProgress {
    slides: Vec<ValidatorSequence>,
    current: usize,
    completed: bool,
}

impl TutorialProgress {
    pub fn new(slides: Vec<ValidatorSequence>) -> Result<Self, ValidatorError> {
        if slides.is_empty() {
            return Err(ValidatorError::EmptySequence);
        }
        Ok(Self {
            slides,
            current: 0,
            completed: false,
        })
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    pub fn current_slide(&self) -> usize {
        self.current
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Process one validation batch against the current slide.
    pub async fn process(
        &mut self,
        output: &str,
        ttylog: &TtyLog,
    ) -> Result<Option<ProgressEvent>, ValidatorError> {
        if self.completed {
            return Ok(None);
        }

        let slide = &mut self.slides[self.current];
        match slide.process(output, ttylog).await? {
            None => Ok(None),
            Some(SequenceEvent::Advance(set)) => {
                debug!("Slide {} advanced to validator set {}", self.current, set);
                Ok(None)
            }
            Some(SequenceEvent::Complete) if self.current + 1 < self.slides.len() => {
                self.current += 1;
                info!("Slide validated, moving to slide {}", self.current);
                Ok(Some(ProgressEvent::Next(self.current)))
            }
            Some(SequenceEvent::Complete) => {
                self.completed = true;
                info!("Tutorial completed");
                Ok(Some(ProgressEvent::Completed))
            }
        }
    }
}
