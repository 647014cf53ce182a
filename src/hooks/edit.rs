// ABOUTME: Built-in `edit <path>` hook streaming a container file to the client editor
// edit-close is always the last event so the client can leave edit mode

use super::{Hook, HookAction, HookContext, HookMatch};
use crate::docker::ExecChunk;
use crate::session::ServerEvent;
use crate::validators::probe::resolve_path;
use anyhow::Context;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;

lazy_static! {
    static ref EDIT_TRIGGER: Regex = Regex::new(r"^edit (/?(?:[^/ ]/?)+)").unwrap();
}

#[derive(Debug, Default)]
pub struct EditHook;

impl EditHook {
    pub fn hook() -> Hook {
        Hook::new("edit", EDIT_TRIGGER.clone(), true, Arc::new(EditHook))
    }

    /// Prints the file, or an error on stderr when it does not exist.
    pub fn command(path: &str) -> String {
        let path = shell_escape::unix::escape(Cow::from(path));
        format!("[ -f {0} ] && cat {0} || >&2 echo 'No such file'", path)
    }

    async fn stream(&self, path: &str, context: &HookContext) -> anyhow::Result<()> {
        let mut output = context
            .runtime
            .exec(&context.tutorial_id, &Self::command(path))
            .await
            .with_context(|| format!("Failed to read {} in {}", path, context.tutorial_id))?;

        while let Some(chunk) = output.next().await {
            match chunk {
                ExecChunk::Stdout(data) => context.outlet.emit(ServerEvent::EditContent(data)),
                ExecChunk::Stderr(data) => context.outlet.emit(ServerEvent::EditError(data)),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl HookAction for EditHook {
    async fn run(&self, matched: &HookMatch, context: &HookContext) -> anyhow::Result<()> {
        let path = matched.group(1).context("edit hook matched without a path")?;
        let path = resolve_path(&context.workdir, path);
        debug!("Editing {} in {}", path, context.tutorial_id);

        context.outlet.emit(ServerEvent::EditStart { path: path.clone() });
        let result = self.stream(&path, context).await;
        context.outlet.emit(ServerEvent::EditClose);
        result
    }
}
