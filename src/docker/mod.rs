// ABOUTME: Docker integration for tutorial containers
// Runtime contract, Bollard implementation, state cache and shell marker parsing

pub mod archive;
pub mod builder;
pub mod cache;
pub mod docker_runtime;
pub mod runtime;
pub mod ttylog;

pub use builder::{BuildContext, ImageBuilder};
pub use cache::{CacheError, ContainerHandle, ContainerState, ContainerStateCache, StateChange};
pub use docker_runtime::DockerRuntime;
pub use runtime::{
    ContainerError, ContainerRuntime, DemuxStream, ExecChunk, ExecOutput, ShellEvent, ShellHandle,
    ShellInput, ShellRequest,
};
pub use ttylog::{TtyLog, TtyLogSplitter};

#[cfg(test)]
pub use runtime::MockContainerRuntime;
