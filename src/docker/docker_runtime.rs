// ABOUTME: Docker container runtime using Bollard for tutorial containers
// Builds, runs, attaches, execs and destroys one container per tutorial id

use super::archive::pack_file;
use super::builder::ImageBuilder;
use super::cache::{ContainerHandle, ContainerState, ContainerStateCache};
use super::runtime::{
    ContainerError, ContainerRuntime, DemuxStream, ExecChunk, ShellEvent, ShellHandle, ShellInput,
    ShellRequest,
};
use super::ttylog::{ShellLine, TtyLogSplitter, PROMPT_COMMAND_ENV};
use crate::config::AppConfig;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, ResizeExecOptions, StartExecOptions, StartExecResults};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Label put on every container this runtime creates
pub const MANAGED_LABEL: &str = "dev-tutorial-managed";

#[derive(Debug)]
pub struct DockerRuntime {
    docker: Docker,
    cache: Arc<ContainerStateCache>,
    /// Serializes run/destroy per tutorial id
    lifecycle_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    tutorial_dirs: Vec<PathBuf>,
    shell: String,
}

impl DockerRuntime {
    /// Connect to the daemon and check it answers within the configured timeout
    pub async fn connect(
        config: &AppConfig,
        cache: Arc<ContainerStateCache>,
    ) -> Result<Self, ContainerError> {
        let docker = Self::connect_to_docker(config.docker.host.as_deref())?;

        let ping_timeout = std::time::Duration::from_secs(config.docker.timeout);
        tokio::time::timeout(ping_timeout, docker.ping())
            .await
            .map_err(|_| {
                ContainerError::Connection(bollard::errors::Error::DockerResponseServerError {
                    status_code: 408,
                    message: "Docker ping timeout - daemon may be unresponsive".to_string(),
                })
            })??;

        info!("Successfully connected to Docker daemon");
        Ok(Self {
            docker,
            cache,
            lifecycle_locks: Mutex::new(HashMap::new()),
            tutorial_dirs: config.tutorials.directories.clone(),
            shell: config.docker.shell.clone(),
        })
    }

    fn connect_to_docker(host: Option<&str>) -> Result<Docker, ContainerError> {
        if let Some(docker_host) = host {
            info!("Using Docker host from config: {}", docker_host);
            std::env::set_var("DOCKER_HOST", docker_host);
        } else if let Ok(docker_host) = std::env::var("DOCKER_HOST") {
            info!("Using DOCKER_HOST: {}", docker_host);
        }
        Ok(Docker::connect_with_local_defaults()?)
    }

    pub fn cache(&self) -> Arc<ContainerStateCache> {
        Arc::clone(&self.cache)
    }

    fn lifecycle_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.lifecycle_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(session_id.to_string()).or_default())
    }

    fn record(
        &self,
        session_id: &str,
        state: ContainerState,
        handle: Option<ContainerHandle>,
    ) -> Result<(), ContainerError> {
        self.cache
            .update(session_id, state, handle)
            .map_err(|e| ContainerError::OperationFailed(e.to_string()))
    }

    async fn require_container(&self, session_id: &str) -> Result<ContainerHandle, ContainerError> {
        self.find_container(session_id)
            .await?
            .ok_or_else(|| ContainerError::NotFound(session_id.to_string()))
    }

    async fn destroy_unlocked(&self, session_id: &str) -> Result<(), ContainerError> {
        self.record(session_id, ContainerState::Destroying, None)?;
        let result = self.stop_and_remove(session_id).await;
        // The entry goes away even when the engine call failed
        self.cache.remove(session_id);
        result
    }

    async fn stop_and_remove(&self, session_id: &str) -> Result<(), ContainerError> {
        let Some(handle) = self.find_container(session_id).await? else {
            debug!("{}: no container to destroy", session_id);
            return Ok(());
        };

        let inspect = match self.docker.inspect_container(handle.id(), None).await {
            Ok(inspect) => inspect,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                debug!("Container {} was already removed", handle);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if inspect.state.and_then(|s| s.running).unwrap_or(false) {
            info!("Stopping container {}", handle);
            match self
                .docker
                .stop_container(handle.id(), Some(StopContainerOptions { t: 10 }))
                .await
            {
                Ok(()) => {}
                Err(bollard::errors::Error::DockerResponseServerError {
                    status_code: 304, ..
                }) => debug!("Container {} was already stopped", handle),
                Err(e) => return Err(e.into()),
            }
            self.record(session_id, ContainerState::Stopped, Some(handle.clone()))?;
        }

        let remove_options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        match self.docker.remove_container(handle.id(), Some(remove_options)).await {
            Ok(()) => info!("Successfully removed container {}", handle),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => debug!("Container {} was already removed", handle),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn run(&self, session_id: &str) -> Result<ContainerHandle, ContainerError> {
        let lock = self.lifecycle_lock(session_id);
        let _guard = lock.lock().await;

        self.destroy_unlocked(session_id).await?;

        let context_dir = resolve_build_context(&self.tutorial_dirs, session_id)?;
        ImageBuilder::new(self.docker.clone())
            .build_image(session_id, &context_dir)
            .await
            .map_err(|e| ContainerError::OperationFailed(format!("{:#}", e)))?;
        self.record(session_id, ContainerState::ImageBuilt, None)?;

        let container_config = Config {
            image: Some(session_id.to_string()),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(true),
            open_stdin: Some(false),
            stdin_once: Some(false),
            labels: Some(HashMap::from([(MANAGED_LABEL.to_string(), "true".to_string())])),
            ..Default::default()
        };
        let create_options = CreateContainerOptions {
            name: session_id.to_string(),
            platform: None,
        };
        let created = self.docker.create_container(Some(create_options), container_config).await?;
        let handle = ContainerHandle::new(created.id);
        info!("Created container {} for {}", handle, session_id);
        self.record(session_id, ContainerState::ContainerCreated, Some(handle.clone()))?;

        self.docker
            .start_container(handle.id(), None::<StartContainerOptions<String>>)
            .await?;
        self.record(session_id, ContainerState::Started, None)?;
        info!("Successfully started container {}", handle);

        Ok(handle)
    }

    async fn attach(&self, session_id: &str) -> Result<ShellHandle, ContainerError> {
        let handle = self.require_container(session_id).await?;

        let exec_options = CreateExecOptions {
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(true),
            env: Some(vec![PROMPT_COMMAND_ENV]),
            cmd: Some(vec![self.shell.as_str()]),
            ..Default::default()
        };
        let exec = self.docker.create_exec(handle.id(), exec_options).await?;

        let start_options = StartExecOptions {
            detach: false,
            tty: true,
            ..Default::default()
        };
        let (mut output, mut input) =
            match self.docker.start_exec(&exec.id, Some(start_options)).await? {
                StartExecResults::Attached { output, input } => (output, input),
                StartExecResults::Detached => {
                    return Err(ContainerError::OperationFailed(format!(
                        "Shell of '{}' started detached",
                        session_id
                    )));
                }
            };
        info!("{}: shell attached", session_id);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let _ = event_tx.send(ShellEvent::Attached);

        let id = session_id.to_string();
        tokio::spawn(async move {
            let mut decoder = Utf8Decoder::default();
            let mut splitter = TtyLogSplitter::new();
            while let Some(chunk) = output.next().await {
                let message = match chunk {
                    Ok(LogOutput::StdOut { message })
                    | Ok(LogOutput::StdErr { message })
                    | Ok(LogOutput::Console { message })
                    | Ok(LogOutput::StdIn { message }) => message,
                    Err(e) => {
                        warn!("{}: shell stream error: {}", id, e);
                        break;
                    }
                };
                for line in splitter.push(&decoder.decode(&message)) {
                    let event = match line {
                        ShellLine::Show(data) => ShellEvent::Show(data),
                        ShellLine::TtyLog(ttylog) => ShellEvent::TtyLog(ttylog),
                    };
                    if event_tx.send(event).is_err() {
                        debug!("{}: shell events dropped, detaching", id);
                        return;
                    }
                }
            }
            debug!("{}: shell closed", id);
        });

        let (input_tx, mut input_rx) = mpsc::unbounded_channel();
        let docker = self.docker.clone();
        let exec_id = exec.id;
        let id = session_id.to_string();
        tokio::spawn(async move {
            while let Some(request) = input_rx.recv().await {
                match request {
                    ShellRequest::Write(data) => {
                        if let Err(e) = input.write_all(data.as_bytes()).await {
                            warn!("{}: failed to write to shell: {}", id, e);
                            break;
                        }
                        let _ = input.flush().await;
                    }
                    ShellRequest::Resize { h, w } => {
                        debug!("{}: resizing exec to {}x{}", id, h, w);
                        let options = ResizeExecOptions {
                            height: h,
                            width: w,
                        };
                        if let Err(e) = docker.resize_exec(&exec_id, options).await {
                            warn!("{}: failed to resize shell: {}", id, e);
                        }
                    }
                }
            }
        });

        Ok(ShellHandle::new(ShellInput::new(input_tx), event_rx))
    }

    async fn exec(&self, session_id: &str, command: &str) -> Result<DemuxStream, ContainerError> {
        let handle = self.require_container(session_id).await?;

        let exec_options = CreateExecOptions {
            cmd: Some(vec!["/bin/bash", "-c", command]),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let exec = self.docker.create_exec(handle.id(), exec_options).await?;
        debug!("{}: exec '{}'", session_id, command);

        let StartExecResults::Attached { mut output, .. } =
            self.docker.start_exec(&exec.id, None).await?
        else {
            return Err(ContainerError::OperationFailed(format!(
                "Exec in '{}' started detached",
                session_id
            )));
        };

        let (tx, stream) = DemuxStream::channel();
        tokio::spawn(async move {
            while let Some(msg) = output.next().await {
                let chunk = match msg {
                    Ok(LogOutput::StdOut { message }) => {
                        ExecChunk::Stdout(String::from_utf8_lossy(&message).into_owned())
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        ExecChunk::Stderr(String::from_utf8_lossy(&message).into_owned())
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Exec stream error: {}", e);
                        let _ = tx.send(ExecChunk::Stderr(e.to_string()));
                        break;
                    }
                };
                if tx.send(chunk).is_err() {
                    break;
                }
            }
        });

        Ok(stream)
    }

    async fn write_file(
        &self,
        session_id: &str,
        path: &str,
        content: Box<dyn AsyncRead + Send + Unpin>,
    ) -> Result<(), ContainerError> {
        let handle = self.require_container(session_id).await?;
        let archive = pack_file(path, content)
            .await
            .map_err(|e| ContainerError::OperationFailed(format!("{:#}", e)))?;

        info!("{}: writing {}", session_id, path);
        let options = UploadToContainerOptions {
            path: archive.directory,
            ..Default::default()
        };
        self.docker
            .upload_to_container(handle.id(), Some(options), archive.bytes.into())
            .await?;
        Ok(())
    }

    async fn destroy(&self, session_id: &str) -> Result<(), ContainerError> {
        let lock = self.lifecycle_lock(session_id);
        let _guard = lock.lock().await;
        self.destroy_unlocked(session_id).await
    }

    async fn find_container(&self, session_id: &str) -> Result<Option<ContainerHandle>, ContainerError> {
        if let Some(handle) = self.cache.container(session_id) {
            return Ok(Some(handle));
        }

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await?;

        let wanted = format!("/{}", session_id);
        let Some(summary) = containers.into_iter().find(|c| {
            c.names
                .as_ref()
                .is_some_and(|names| names.iter().any(|name| *name == wanted))
        }) else {
            return Ok(None);
        };
        let Some(container_id) = summary.id else {
            return Ok(None);
        };

        debug!("{}: container missing from cache", session_id);
        let handle = ContainerHandle::new(container_id);
        // Only heal a true miss; an entry in progress (e.g. destroying) keeps its state
        if self.cache.state(session_id).is_none() {
            let state = if summary.state.as_deref() == Some("running") {
                ContainerState::Started
            } else {
                ContainerState::Stopped
            };
            self.record(session_id, state, Some(handle.clone()))?;
        }
        Ok(Some(handle))
    }

    fn state(&self, session_id: &str) -> Option<ContainerState> {
        self.cache.state(session_id)
    }
}

/// First `<dir>/<session_id>` holding a Dockerfile
pub fn resolve_build_context(dirs: &[PathBuf], session_id: &str) -> Result<PathBuf, ContainerError> {
    if session_id.is_empty() || Path::new(session_id).components().count() != 1 || session_id.starts_with('.') {
        return Err(ContainerError::InvalidConfig(format!(
            "Invalid tutorial id '{}'",
            session_id
        )));
    }
    dirs.iter()
        .map(|dir| dir.join(session_id))
        .find(|dir| dir.join("Dockerfile").is_file())
        .ok_or_else(|| {
            ContainerError::InvalidConfig(format!("No Dockerfile found for tutorial '{}'", session_id))
        })
}

/// Decodes a byte stream as UTF-8, holding back a character split across chunks.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let text = text.to_string();
                self.pending.clear();
                text
            }
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                let text = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
                self.pending.drain(..valid);
                text
            }
            Err(_) => {
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                text
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_utf8_decoder_holds_split_character() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "héllo".as_bytes();
        assert_eq!(decoder.decode(&bytes[..2]), "h");
        assert_eq!(decoder.decode(&bytes[2..]), "éllo");
        assert_eq!(decoder.decode(&[0xff, b'a']), "\u{fffd}a");
    }

    #[test]
    fn test_resolve_build_context() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        std::fs::create_dir(first.path().join("dev")).unwrap();
        std::fs::create_dir(second.path().join("dev")).unwrap();
        std::fs::write(second.path().join("dev").join("Dockerfile"), "FROM alpine").unwrap();

        let dirs = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        assert_eq!(resolve_build_context(&dirs, "dev").unwrap(), second.path().join("dev"));
        assert!(matches!(
            resolve_build_context(&dirs, "git"),
            Err(ContainerError::InvalidConfig(_))
        ));
        assert!(resolve_build_context(&dirs, "../dev").is_err());
        assert!(resolve_build_context(&dirs, "").is_err());
    }

    #[tokio::test]
    #[ignore] // Requires Docker and a tutorials/dev directory
    async fn test_run_and_destroy_cycle() {
        let cache = Arc::new(ContainerStateCache::new());
        let runtime = DockerRuntime::connect(&AppConfig::default(), Arc::clone(&cache))
            .await
            .unwrap();

        runtime.run("dev").await.unwrap();
        assert!(runtime.is_container_ready("dev"));

        let output = runtime.exec("dev", "echo hello").await.unwrap().collect().await;
        assert_eq!(output.stdout.trim(), "hello");

        runtime.destroy("dev").await.unwrap();
        assert_eq!(cache.state("dev"), None);
        assert_eq!(runtime.find_container("dev").await.unwrap(), None);
    }
}
