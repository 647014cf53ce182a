// ABOUTME: Container runtime contract used by sessions, hooks and validators
// Exposes one-shot demultiplexed exec streams and interactive shell handles

use super::cache::{ContainerHandle, ContainerState};
use super::ttylog::TtyLog;
use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Docker connection error: {0}")]
    Connection(#[from] bollard::errors::Error),
    #[error("Container for '{0}' does not exist")]
    NotFound(String),
    #[error("Container for '{0}' is not started")]
    NotReady(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Container operation failed: {0}")]
    OperationFailed(String),
}

/// A chunk of a one-shot command output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecChunk {
    Stdout(String),
    Stderr(String),
}

/// Separated stdout/stderr of a one-shot command. The stream ends when the command closes.
#[derive(Debug)]
pub struct DemuxStream {
    rx: mpsc::UnboundedReceiver<ExecChunk>,
}

/// Collected result of a whole [`DemuxStream`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

impl DemuxStream {
    pub fn new(rx: mpsc::UnboundedReceiver<ExecChunk>) -> Self {
        Self { rx }
    }

    /// Create a stream and the sender feeding it. Dropping the sender closes the stream.
    pub fn channel() -> (mpsc::UnboundedSender<ExecChunk>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::new(rx))
    }

    /// A stream already holding the given chunks, then closed.
    pub fn from_chunks(chunks: impl IntoIterator<Item = ExecChunk>) -> Self {
        let (tx, stream) = Self::channel();
        for chunk in chunks {
            let _ = tx.send(chunk);
        }
        stream
    }

    /// Next chunk, `None` once the command has closed.
    pub async fn next(&mut self) -> Option<ExecChunk> {
        self.rx.recv().await
    }

    pub async fn collect(mut self) -> ExecOutput {
        let mut output = ExecOutput::default();
        while let Some(chunk) = self.next().await {
            match chunk {
                ExecChunk::Stdout(data) => output.stdout.push_str(&data),
                ExecChunk::Stderr(data) => output.stderr.push_str(&data),
            }
        }
        output
    }
}

/// Events produced by an attached interactive shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    Attached,
    Show(String),
    TtyLog(TtyLog),
}

/// Requests sent to an attached interactive shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellRequest {
    Write(String),
    Resize { h: u16, w: u16 },
}

/// Write side of an attached shell. Cheap to clone; the shell input closes when every clone is gone.
#[derive(Debug, Clone)]
pub struct ShellInput {
    tx: mpsc::UnboundedSender<ShellRequest>,
}

impl ShellInput {
    pub fn new(tx: mpsc::UnboundedSender<ShellRequest>) -> Self {
        Self { tx }
    }

    /// Returns false if the shell is gone.
    pub fn write(&self, data: impl Into<String>) -> bool {
        self.tx.send(ShellRequest::Write(data.into())).is_ok()
    }

    pub fn resize(&self, h: u16, w: u16) -> bool {
        self.tx.send(ShellRequest::Resize { h, w }).is_ok()
    }
}

/// An interactive shell running in a container.
#[derive(Debug)]
pub struct ShellHandle {
    pub input: ShellInput,
    pub events: mpsc::UnboundedReceiver<ShellEvent>,
}

impl ShellHandle {
    pub fn new(input: ShellInput, events: mpsc::UnboundedReceiver<ShellEvent>) -> Self {
        Self { input, events }
    }
}

/// Lifecycle and I/O operations on tutorial containers.
///
/// Every operation that targets a container resolves it through the state cache first and falls
/// back to a live lookup on a miss.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Destroy any previous container, build the image, create and start a fresh container.
    async fn run(&self, session_id: &str) -> Result<ContainerHandle, ContainerError>;

    /// Open an interactive shell that reports every finished command as a [`ShellEvent::TtyLog`].
    async fn attach(&self, session_id: &str) -> Result<ShellHandle, ContainerError>;

    /// Run a one-shot `bash -c` command.
    async fn exec(&self, session_id: &str, command: &str) -> Result<DemuxStream, ContainerError>;

    /// Upload `content` as the file at `path`.
    ///
    /// Callers must check [`ContainerRuntime::is_container_ready`] first.
    async fn write_file(
        &self,
        session_id: &str,
        path: &str,
        content: Box<dyn AsyncRead + Send + Unpin>,
    ) -> Result<(), ContainerError>;

    /// Stop and remove the container. A missing container is not an error.
    async fn destroy(&self, session_id: &str) -> Result<(), ContainerError>;

    /// Resolve the container, refreshing the cache from the engine on a miss.
    async fn find_container(&self, session_id: &str) -> Result<Option<ContainerHandle>, ContainerError>;

    /// Cached lifecycle state.
    fn state(&self, session_id: &str) -> Option<ContainerState>;

    /// True once the container is started. A container being rebuilt is not ready.
    fn is_container_ready(&self, session_id: &str) -> bool {
        self.state(session_id) == Some(ContainerState::Started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demux_stream_collects_until_closed() {
        let stream = DemuxStream::from_chunks([
            ExecChunk::Stdout("O".to_string()),
            ExecChunk::Stderr("oops".to_string()),
            ExecChunk::Stdout("K".to_string()),
        ]);
        let output = stream.collect().await;
        assert_eq!(output.stdout, "OK");
        assert_eq!(output.stderr, "oops");
    }

    #[tokio::test]
    async fn test_shell_input_reports_closed_shell() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let input = ShellInput::new(tx);

        assert!(input.write("ls\n"));
        assert!(input.resize(24, 80));
        assert_eq!(rx.recv().await, Some(ShellRequest::Write("ls\n".to_string())));
        assert_eq!(rx.recv().await, Some(ShellRequest::Resize { h: 24, w: 80 }));

        drop(rx);
        assert!(!input.write("exit\n"));
    }
}
