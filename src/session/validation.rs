// ABOUTME: Single-concurrency validation worker of a session
// Batches are validated one at a time, in the order the shell finished the commands

use super::events::{ServerEvent, SocketError};
use super::transport::Outlet;
use crate::docker::TtyLog;
use crate::validators::{ProgressEvent, TutorialProgress};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Output accumulated since the previous command and the marker that closed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationBatch {
    pub output: String,
    pub ttylog: TtyLog,
}

#[derive(Debug)]
enum ValidationMessage {
    Load(Box<TutorialProgress>),
    Batch(ValidationBatch),
}

/// Handle on the worker task. Dropping it stops the worker.
#[derive(Debug)]
pub struct ValidationQueue {
    tx: mpsc::UnboundedSender<ValidationMessage>,
    task: JoinHandle<()>,
}

impl ValidationQueue {
    pub fn spawn(outlet: Outlet) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_worker(rx, outlet));
        Self { tx, task }
    }

    /// Replace the validators. Batches queued before still use the previous ones.
    pub fn load(&self, progress: TutorialProgress) {
        if self.tx.send(ValidationMessage::Load(Box::new(progress))).is_err() {
            warn!("Validation worker is gone, validators not loaded");
        }
    }

    pub fn push(&self, batch: ValidationBatch) -> bool {
        self.tx.send(ValidationMessage::Batch(batch)).is_ok()
    }

    /// Sender side usable from another task.
    pub fn sender(&self) -> BatchSender {
        BatchSender { tx: self.tx.clone() }
    }
}

impl Drop for ValidationQueue {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Cloneable producer of validation batches.
#[derive(Debug, Clone)]
pub struct BatchSender {
    tx: mpsc::UnboundedSender<ValidationMessage>,
}

impl BatchSender {
    pub fn push(&self, output: String, ttylog: TtyLog) -> bool {
        self.tx
            .send(ValidationMessage::Batch(ValidationBatch { output, ttylog }))
            .is_ok()
    }
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<ValidationMessage>, outlet: Outlet) {
    let mut progress: Option<Box<TutorialProgress>> = None;

    while let Some(message) = rx.recv().await {
        match message {
            ValidationMessage::Load(loaded) => {
                debug!("Validators loaded ({} slides)", loaded.len());
                progress = Some(loaded);
            }
            ValidationMessage::Batch(batch) => {
                let Some(progress) = progress.as_mut() else {
                    debug!("No validators loaded, ignoring '{}'", batch.ttylog.cmd);
                    continue;
                };

                debug!("Validating '{}' (exit code {})", batch.ttylog.cmd, batch.ttylog.exit_code);
                match progress.process(&batch.output, &batch.ttylog).await {
                    Ok(Some(ProgressEvent::Next(slide))) => {
                        debug!("Next slide {}", slide);
                        outlet.emit(ServerEvent::Next);
                    }
                    Ok(Some(ProgressEvent::Completed)) => outlet.emit(ServerEvent::Completed),
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Validation of '{}' failed: {}", batch.ttylog.cmd, e);
                        outlet.emit(ServerEvent::Err(SocketError::new("ValidatorError", e)));
                    }
                }
            }
        }
    }
    debug!("Validation worker stopped");
}
