// ABOUTME: Typed events exchanged with the client over a session transport
// Serialized as {"event": name, "data": payload} frames

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Error payload of the `err` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketError {
    pub name: String,
    pub message: String,
}

impl SocketError {
    pub fn new(name: impl Into<String>, message: impl Display) -> Self {
        Self {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

/// Events emitted by a session coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    Attached(String),
    Show(String),
    Next,
    Completed,
    Err(SocketError),
    EditStart { path: String },
    EditContent(String),
    EditError(String),
    EditClose,
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Attached(_) => "attached",
            ServerEvent::Show(_) => "show",
            ServerEvent::Next => "next",
            ServerEvent::Completed => "completed",
            ServerEvent::Err(_) => "err",
            ServerEvent::EditStart { .. } => "edit-start",
            ServerEvent::EditContent(_) => "edit-content",
            ServerEvent::EditError(_) => "edit-error",
            ServerEvent::EditClose => "edit-close",
        }
    }
}

/// Requests sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Attach(String),
    Resize { h: u16, w: u16 },
    Cmd(String),
}
