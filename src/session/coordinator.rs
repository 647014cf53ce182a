// ABOUTME: Session coordinator driving one user's tutorial terminal
//
// On attach it loads the tutorial validators and attaches a container shell concurrently, then
// pumps shell events:
// - show data goes to the client and into the current validation batch
// - a ttylog marker updates the working directory, runs hooks and closes the batch
// The coordinator only knows its outlet, so the connection can change underneath it.

use super::events::{ClientEvent, ServerEvent, SocketError};
use super::transport::{Outlet, Transport};
use super::validation::{BatchSender, ValidationQueue};
use crate::docker::{ContainerRuntime, ShellEvent, ShellHandle, ShellInput};
use crate::hooks::{HookContext, HookEngine};
use crate::tutorial::TutorialCatalog;
use crate::validators::{TutorialProgress, ValidatorContext, ValidatorDescriptorsParser, ValidatorFactory};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Form feed, clears the client terminal
const CLEAR_SCREEN: &str = "\x0C";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unattached,
    Attaching,
    Attached,
    /// The container went away; a new attach revives the session
    Ended,
}

/// Process-wide collaborators shared by every session.
#[derive(Clone)]
pub struct SessionServices {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub catalog: Arc<dyn TutorialCatalog>,
    pub hooks: Arc<HookEngine>,
}

impl SessionServices {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, catalog: Arc<dyn TutorialCatalog>) -> Self {
        Self {
            runtime,
            catalog,
            hooks: Arc::new(HookEngine::with_builtin()),
        }
    }

    pub fn with_hooks(mut self, hooks: HookEngine) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }
}

impl fmt::Debug for SessionServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionServices")
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

/// Live resources of an attached session. Dropping it stops the pump and the validation worker.
struct Attachment {
    tutorial_id: String,
    shell: ShellInput,
    pump: JoinHandle<()>,
    _validation: ValidationQueue,
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

struct Inner {
    state: SessionState,
    attachment: Option<Attachment>,
}

pub struct Coordinator {
    identity: String,
    services: SessionServices,
    outlet: Outlet,
    inner: Mutex<Inner>,
    /// Serializes attach requests
    attach_lock: tokio::sync::Mutex<()>,
}

impl Coordinator {
    pub fn new(identity: impl Into<String>, services: SessionServices, transport: Arc<dyn Transport>) -> Self {
        Self {
            identity: identity.into(),
            services,
            outlet: Outlet::new(transport),
            inner: Mutex::new(Inner {
                state: SessionState::Unattached,
                attachment: None,
            }),
            attach_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn outlet(&self) -> &Outlet {
        &self.outlet
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Tutorial the session is attached to.
    pub fn tutorial_id(&self) -> Option<String> {
        self.lock().attachment.as_ref().map(|a| a.tutorial_id.clone())
    }

    /// Switch the session to a new connection.
    pub fn rebind(&self, transport: Arc<dyn Transport>) {
        let previous = self.outlet.rebind(transport);
        info!(
            "Session of {} moved from connection {} to {}",
            self.identity,
            previous,
            self.outlet.transport_id()
        );
    }

    pub async fn handle(&self, event: ClientEvent) {
        match event {
            ClientEvent::Attach(tutorial_id) => self.attach(&tutorial_id).await,
            ClientEvent::Resize { h, w } => self.resize(h, w),
            ClientEvent::Cmd(data) => self.cmd(data),
        }
    }

    /// Attach to `tutorial_id`, replacing any previous attachment.
    ///
    /// Failures are reported to the client as `err` events, the session stays usable.
    pub async fn attach(&self, tutorial_id: &str) {
        let _guard = self.attach_lock.lock().await;
        info!("{} attaching to {}", self.identity, tutorial_id);

        let previous = {
            let mut inner = self.lock();
            inner.state = SessionState::Attaching;
            inner.attachment.take()
        };
        if previous.is_some() {
            debug!("Dropping previous attachment of {}", self.identity);
        }
        drop(previous);

        let (progress, shell) = tokio::join!(
            self.load_progress(tutorial_id),
            self.services.runtime.attach(tutorial_id)
        );

        let progress = match progress {
            Ok(progress) => Some(progress),
            Err(error) => {
                warn!("Validators of {} not loaded: {}", tutorial_id, error.message);
                self.outlet.emit(ServerEvent::Err(error));
                None
            }
        };

        let shell = match shell {
            Ok(shell) => shell,
            Err(e) => {
                warn!("Failed to attach {} to {}: {}", self.identity, tutorial_id, e);
                self.outlet.emit(ServerEvent::Err(SocketError::new("ContainerError", e)));
                self.lock().state = SessionState::Unattached;
                return;
            }
        };

        let validation = ValidationQueue::spawn(self.outlet.clone());
        if let Some(progress) = progress {
            validation.load(progress);
        }

        let ShellHandle { input, events } = shell;
        let pump = ShellPump {
            tutorial_id: tutorial_id.to_string(),
            shell: input.clone(),
            runtime: Arc::clone(&self.services.runtime),
            hooks: Arc::clone(&self.services.hooks),
            outlet: self.outlet.clone(),
            batches: validation.sender(),
        };

        let mut inner = self.lock();
        inner.attachment = Some(Attachment {
            tutorial_id: tutorial_id.to_string(),
            shell: input,
            pump: tokio::spawn(pump.run(events)),
            _validation: validation,
        });
        inner.state = SessionState::Attached;
        info!("{} attached to {}", self.identity, tutorial_id);
    }

    async fn load_progress(&self, tutorial_id: &str) -> Result<TutorialProgress, SocketError> {
        let tutorial = self
            .services
            .catalog
            .get_tutorial(tutorial_id)
            .await
            .map_err(|e| SocketError::new("TutorialError", e))?;

        let factory = ValidatorFactory::new(ValidatorContext::new(
            tutorial_id,
            Arc::clone(&self.services.runtime),
        ));
        ValidatorDescriptorsParser::parse_tutorial(tutorial.slide_validators(), &factory)
            .map_err(|e| SocketError::new("ValidatorError", e))
    }

    pub fn resize(&self, h: u16, w: u16) {
        if let Some(shell) = self.shell() {
            if !shell.resize(h, w) {
                debug!("Resize for {} dropped, shell closed", self.identity);
            }
        } else {
            debug!("Resize for {} ignored, not attached", self.identity);
        }
    }

    pub fn cmd(&self, data: impl Into<String>) {
        if let Some(shell) = self.shell() {
            if !shell.write(data) {
                debug!("Input for {} dropped, shell closed", self.identity);
            }
        } else {
            debug!("Input for {} ignored, not attached", self.identity);
        }
    }

    /// Stop the shell pump and validation. The session stays registered.
    pub fn end(&self) {
        let attachment = {
            let mut inner = self.lock();
            inner.state = SessionState::Ended;
            inner.attachment.take()
        };
        if let Some(attachment) = attachment {
            info!("Session of {} on {} ended", self.identity, attachment.tutorial_id);
        }
    }

    fn shell(&self) -> Option<ShellInput> {
        let inner = self.lock();
        match inner.state {
            SessionState::Attached => inner.attachment.as_ref().map(|a| a.shell.clone()),
            _ => None,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("identity", &self.identity)
            .field("state", &self.state())
            .field("outlet", &self.outlet)
            .finish_non_exhaustive()
    }
}

/// Moves shell events to the client, the hooks and the validation worker.
struct ShellPump {
    tutorial_id: String,
    shell: ShellInput,
    runtime: Arc<dyn ContainerRuntime>,
    hooks: Arc<HookEngine>,
    outlet: Outlet,
    batches: BatchSender,
}

impl ShellPump {
    async fn run(self, mut events: mpsc::UnboundedReceiver<ShellEvent>) {
        let mut output: Vec<String> = Vec::new();

        while let Some(event) = events.recv().await {
            match event {
                ShellEvent::Attached => self.outlet.emit(ServerEvent::Attached(self.tutorial_id.clone())),
                ShellEvent::Show(data) => {
                    output.push(data.clone());
                    self.outlet.emit(ServerEvent::Show(data));
                }
                ShellEvent::TtyLog(ttylog) => {
                    debug!("ttylog {:?}", ttylog);
                    let context = HookContext {
                        tutorial_id: self.tutorial_id.clone(),
                        workdir: ttylog.workdir.clone(),
                        runtime: Arc::clone(&self.runtime),
                        outlet: self.outlet.clone(),
                    };
                    if let Some(dispatched) = self.hooks.dispatch(&ttylog.cmd, context) {
                        if dispatched.exclusive {
                            self.shell.write(CLEAR_SCREEN);
                        }
                    }

                    let batch = std::mem::take(&mut output).join("\n");
                    if !self.batches.push(batch, ttylog) {
                        warn!("Validation worker of {} is gone", self.tutorial_id);
                    }
                }
            }
        }
        debug!("Shell of {} closed", self.tutorial_id);
    }
}
