// ABOUTME: Command hooks layered on top of the terminal stream
// The first hook whose trigger matches a finished command runs in the background

pub mod edit;

pub use edit::EditHook;

use crate::docker::ContainerRuntime;
use crate::session::Outlet;
use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Capture groups of a trigger match, owned so the action can outlive the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookMatch {
    pub cmd: String,
    pub groups: Vec<Option<String>>,
}

impl HookMatch {
    fn from_captures(cmd: &str, captures: &regex::Captures<'_>) -> Self {
        Self {
            cmd: cmd.to_string(),
            groups: captures
                .iter()
                .map(|group| group.map(|m| m.as_str().to_string()))
                .collect(),
        }
    }

    pub fn group(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(|group| group.as_deref())
    }
}

/// What a hook action may use while it runs.
#[derive(Clone)]
pub struct HookContext {
    pub tutorial_id: String,
    pub workdir: String,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub outlet: Outlet,
}

impl fmt::Debug for HookContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("tutorial_id", &self.tutorial_id)
            .field("workdir", &self.workdir)
            .field("outlet", &self.outlet)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait HookAction: Send + Sync {
    async fn run(&self, matched: &HookMatch, context: &HookContext) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct Hook {
    pub name: &'static str,
    pub trigger: Regex,
    /// The terminal is cleared while the action runs
    pub exclusive: bool,
    pub action: Arc<dyn HookAction>,
}

impl Hook {
    pub fn new(name: &'static str, trigger: Regex, exclusive: bool, action: Arc<dyn HookAction>) -> Self {
        Self {
            name,
            trigger,
            exclusive,
            action,
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("trigger", &self.trigger.as_str())
            .field("exclusive", &self.exclusive)
            .finish_non_exhaustive()
    }
}

/// A hook action started by [`HookEngine::dispatch`].
#[derive(Debug)]
pub struct Dispatched {
    pub hook: &'static str,
    pub exclusive: bool,
    pub task: JoinHandle<()>,
}

#[derive(Debug, Clone, Default)]
pub struct HookEngine {
    hooks: Vec<Hook>,
}

impl HookEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with the hooks every session gets.
    pub fn with_builtin() -> Self {
        let mut engine = Self::new();
        engine.register(EditHook::hook());
        engine
    }

    pub fn register(&mut self, hook: Hook) {
        self.hooks.push(hook);
    }

    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }

    /// Start the action of the first hook matching `cmd`. Action failures are only logged.
    pub fn dispatch(&self, cmd: &str, context: HookContext) -> Option<Dispatched> {
        let (hook, captures) = self
            .hooks
            .iter()
            .find_map(|hook| hook.trigger.captures(cmd).map(|captures| (hook, captures)))?;

        debug!("Hook '{}' matched '{}'", hook.name, cmd);
        let matched = HookMatch::from_captures(cmd, &captures);
        let action = Arc::clone(&hook.action);
        let name = hook.name;
        let task = tokio::spawn(async move {
            if let Err(e) = action.run(&matched, &context).await {
                warn!("Hook '{}' failed on '{}': {:#}", name, matched.cmd, e);
            }
        });

        Some(Dispatched {
            hook: hook.name,
            exclusive: hook.exclusive,
            task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::MockContainerRuntime;
    use crate::session::{ChannelTransport, ServerEvent};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl HookAction for Counting {
        async fn run(&self, matched: &HookMatch, context: &HookContext) -> anyhow::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            context.outlet.emit(ServerEvent::Show(matched.group(1).unwrap_or_default().to_string()));
            if self.fail {
                anyhow::bail!("action failed");
            }
            Ok(())
        }
    }

    fn context() -> (HookContext, tokio::sync::mpsc::UnboundedReceiver<ServerEvent>) {
        let (transport, rx) = ChannelTransport::new("conn-1");
        let context = HookContext {
            tutorial_id: "dev".to_string(),
            workdir: "/root".to_string(),
            runtime: Arc::new(MockContainerRuntime::new()),
            outlet: Outlet::new(Arc::new(transport)),
        };
        (context, rx)
    }

    fn counting(name: &'static str, trigger: &str, exclusive: bool, fail: bool) -> (Hook, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let action = Counting {
            runs: Arc::clone(&runs),
            fail,
        };
        (Hook::new(name, Regex::new(trigger).unwrap(), exclusive, Arc::new(action)), runs)
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let (greedy, greedy_runs) = counting("greedy", r"^show (\w+)", false, false);
        let (second, second_runs) = counting("second", r"^show (\w+)", true, false);
        let mut engine = HookEngine::new();
        engine.register(greedy);
        engine.register(second);

        let (context, mut rx) = context();
        let dispatched = engine.dispatch("show notes", context).unwrap();
        assert_eq!(dispatched.hook, "greedy");
        assert!(!dispatched.exclusive);
        dispatched.task.await.unwrap();

        assert_eq!(greedy_runs.load(Ordering::SeqCst), 1);
        assert_eq!(second_runs.load(Ordering::SeqCst), 0);
        assert_eq!(rx.recv().await.unwrap(), ServerEvent::Show("notes".to_string()));
    }

    #[tokio::test]
    async fn test_no_match() {
        let engine = HookEngine::with_builtin();
        let (context, _rx) = context();
        assert!(engine.dispatch("ls -l", context.clone()).is_none());
        assert!(engine.dispatch("vim edit a.txt", context).is_none());
    }

    #[tokio::test]
    async fn test_failing_action_does_not_propagate() {
        let (hook, runs) = counting("broken", r"^boom", true, true);
        let mut engine = HookEngine::new();
        engine.register(hook);

        let (context, _rx) = context();
        let dispatched = engine.dispatch("boom", context).unwrap();
        assert!(dispatched.exclusive);
        assert!(dispatched.task.await.is_ok());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
