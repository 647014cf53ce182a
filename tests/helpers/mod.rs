// ABOUTME: In-process container runtime and tutorial fixtures for integration tests
// The fake keeps a set of files; probes and edits are answered from it

#![allow(dead_code)]

use async_trait::async_trait;
use dev_tutorial::docker::{
    ContainerError, ContainerHandle, ContainerRuntime, ContainerState, DemuxStream, ExecChunk, ShellEvent,
    ShellHandle, ShellInput, ShellRequest, TtyLog,
};
use dev_tutorial::session::{ChannelTransport, ServerEvent};
use dev_tutorial::tutorial::{InMemoryCatalog, TutorialDescriptor};
use regex::Regex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Test side of an attached shell.
pub struct FakeShell {
    pub events: UnboundedSender<ShellEvent>,
    pub requests: UnboundedReceiver<ShellRequest>,
}

impl FakeShell {
    /// Act as the shell finishing `cmd` with the given output.
    pub fn finish(&self, cmd: &str, output: &[&str], exit_code: i32) {
        for line in output {
            self.events.send(ShellEvent::Show((*line).to_string())).unwrap();
        }
        self.events
            .send(ShellEvent::TtyLog(TtyLog {
                user: "root".to_string(),
                cmd: cmd.to_string(),
                exit_code,
                workdir: "/root".to_string(),
            }))
            .unwrap();
    }

    pub async fn next_request(&mut self) -> ShellRequest {
        tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
            .await
            .expect("no shell request")
            .expect("shell input closed")
    }
}

#[derive(Default)]
pub struct FakeRuntime {
    files: Mutex<HashSet<String>>,
    states: Mutex<HashMap<String, ContainerState>>,
    shells: Mutex<Vec<FakeShell>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: &str) {
        self.files.lock().unwrap().insert(path.to_string());
    }

    /// Test side of the most recent attach.
    pub fn take_shell(&self) -> FakeShell {
        self.shells.lock().unwrap().pop().expect("no shell attached")
    }

    fn answer(&self, command: &str) -> Vec<ExecChunk> {
        let probe = Regex::new(r"^\[\[ -f (\S+) \]\]").unwrap();
        let edit = Regex::new(r"^\[ -f (\S+) \] && cat").unwrap();
        let files = self.files.lock().unwrap();

        if let Some(captures) = probe.captures(command) {
            let answer = if files.contains(&captures[1]) { "OK\n" } else { "KO\n" };
            return vec![ExecChunk::Stdout(answer.to_string())];
        }
        if let Some(captures) = edit.captures(command) {
            return if files.contains(&captures[1]) {
                vec![ExecChunk::Stdout(format!("content of {}\n", &captures[1]))]
            } else {
                vec![ExecChunk::Stderr("No such file\n".to_string())]
            };
        }
        vec![ExecChunk::Stderr(format!("unexpected command: {}\n", command))]
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn run(&self, session_id: &str) -> Result<ContainerHandle, ContainerError> {
        self.states
            .lock()
            .unwrap()
            .insert(session_id.to_string(), ContainerState::Started);
        Ok(ContainerHandle::new(format!("{}-container", session_id)))
    }

    async fn attach(&self, _session_id: &str) -> Result<ShellHandle, ContainerError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        event_tx.send(ShellEvent::Attached).unwrap();
        self.shells.lock().unwrap().push(FakeShell {
            events: event_tx,
            requests: request_rx,
        });
        Ok(ShellHandle::new(ShellInput::new(request_tx), event_rx))
    }

    async fn exec(&self, _session_id: &str, command: &str) -> Result<DemuxStream, ContainerError> {
        Ok(DemuxStream::from_chunks(self.answer(command)))
    }

    async fn write_file(
        &self,
        _session_id: &str,
        path: &str,
        _content: Box<dyn AsyncRead + Send + Unpin>,
    ) -> Result<(), ContainerError> {
        self.add_file(path);
        Ok(())
    }

    async fn destroy(&self, session_id: &str) -> Result<(), ContainerError> {
        self.states.lock().unwrap().remove(session_id);
        Ok(())
    }

    async fn find_container(&self, session_id: &str) -> Result<Option<ContainerHandle>, ContainerError> {
        Ok(self
            .state(session_id)
            .map(|_| ContainerHandle::new(format!("{}-container", session_id))))
    }

    fn state(&self, session_id: &str) -> Option<ContainerState> {
        self.states.lock().unwrap().get(session_id).copied()
    }
}

/// The "dev" tutorial: create a file, then print the kernel name.
pub fn dev_catalog() -> InMemoryCatalog {
    let tutorial: TutorialDescriptor = serde_json::from_value(json!({
        "name": "Dev",
        "slug": "dev",
        "slides": [
            {
                "src": "01-touch.md",
                "validators": [
                    {"input": {"cmd": "touch"}, "creates": {"type": "file", "path": "/root/test.txt"}}
                ]
            },
            {
                "src": "02-uname.md",
                "validators": [
                    {"command": {"name": "uname"}, "rc": {"exitCode": 0}, "output": {"contains": "Linux"}}
                ]
            }
        ]
    }))
    .unwrap();
    InMemoryCatalog::new().with(
        tutorial,
        vec!["# Create a file".to_string(), "# Which kernel?".to_string()],
    )
}

pub fn connection(id: &str) -> (std::sync::Arc<ChannelTransport>, UnboundedReceiver<ServerEvent>) {
    let (transport, events) = ChannelTransport::new(id);
    (std::sync::Arc::new(transport), events)
}

pub async fn next_event(events: &mut UnboundedReceiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no event received")
        .expect("transport closed")
}

/// Give spawned tasks a chance to run, then assert nothing else was emitted.
pub async fn assert_quiet(events: &mut UnboundedReceiver<ServerEvent>) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    if let Ok(event) = events.try_recv() {
        panic!("unexpected event {:?}", event);
    }
}
