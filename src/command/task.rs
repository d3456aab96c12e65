//! Batches of commands and the markers that close them off in the queue.
use std::fmt;
use std::sync::{Arc, Mutex};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::codec::Command;

/// Notified once when the unit of work it is attached to resolves.
pub trait CompletionListener: Send + Sync {
    fn on_success(&self);
    fn on_failure(&self);
}

/// Outcome delivered by [`completion_channel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOutcome {
    Succeeded,
    Failed,
}

struct FnListener<F> {
    callback: F,
}

impl<F> CompletionListener for FnListener<F>
where
    F: Fn(TaskOutcome) + Send + Sync,
{
    fn on_success(&self) {
        (self.callback)(TaskOutcome::Succeeded)
    }

    fn on_failure(&self) {
        (self.callback)(TaskOutcome::Failed)
    }
}

/// Wrap a closure as a listener.
pub fn listener_fn<F>(callback: F) -> Arc<dyn CompletionListener>
where
    F: Fn(TaskOutcome) + Send + Sync + 'static,
{
    Arc::new(FnListener { callback })
}

struct ChannelListener {
    tx: Mutex<Option<oneshot::Sender<TaskOutcome>>>,
}

impl ChannelListener {
    fn resolve(&self, outcome: TaskOutcome) {
        let sender = self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(tx) = sender {
            let _ = tx.send(outcome);
        }
    }
}

impl CompletionListener for ChannelListener {
    fn on_success(&self) {
        self.resolve(TaskOutcome::Succeeded)
    }

    fn on_failure(&self) {
        self.resolve(TaskOutcome::Failed)
    }
}

/// Listener paired with a receiver that yields the first outcome reported to it.
///
/// The receiver errors if the listener is dropped without firing, which only
/// happens when the queue was purged in shutdown mode.
pub fn completion_channel() -> (Arc<dyn CompletionListener>, oneshot::Receiver<TaskOutcome>) {
    let (tx, rx) = oneshot::channel();
    let listener = Arc::new(ChannelListener { tx: Mutex::new(Some(tx)) });
    (listener, rx)
}

/// Queue boundary closing a command or a task.
#[derive(Clone)]
pub struct CompletionMarker {
    listeners: Vec<Arc<dyn CompletionListener>>,
    internal: bool,
}

impl CompletionMarker {
    /// Marker placed after a single ad-hoc command.
    pub fn internal() -> Self {
        Self { listeners: Vec::new(), internal: true }
    }

    pub fn user(listeners: Vec<Arc<dyn CompletionListener>>) -> Self {
        Self { listeners, internal: false }
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn fire_success(&self) {
        for listener in &self.listeners {
            listener.on_success();
        }
    }

    pub fn fire_failure(&self) {
        for listener in &self.listeners {
            listener.on_failure();
        }
    }
}

impl fmt::Debug for CompletionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionMarker")
            .field("listeners", &self.listeners.len())
            .field("internal", &self.internal)
            .finish()
    }
}

/// Element of the dispatch queue.
#[derive(Debug, Clone)]
pub enum QueueItem {
    Command(Command),
    Marker(CompletionMarker),
}

impl QueueItem {
    pub fn is_command(&self) -> bool {
        matches!(self, QueueItem::Command(_))
    }
}

/// Ordered, failure-atomic group of commands.
pub struct Task {
    name: String,
    commands: Vec<Command>,
    listeners: Vec<Arc<dyn CompletionListener>>,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commands: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn add_command(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn add_commands(&mut self, commands: impl IntoIterator<Item = Command>) {
        self.commands.extend(commands);
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.add_command(command);
        self
    }

    pub fn with_commands(mut self, commands: impl IntoIterator<Item = Command>) -> Self {
        self.add_commands(commands);
        self
    }

    /// Remove the first command equal to `command`.
    pub fn remove_command(&mut self, command: &Command) -> bool {
        match self.commands.iter().position(|c| c == command) {
            Some(index) => {
                self.commands.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn add_listener(&mut self, listener: Arc<dyn CompletionListener>) {
        self.listeners.push(listener);
    }

    pub fn with_listener(mut self, listener: Arc<dyn CompletionListener>) -> Self {
        self.add_listener(listener);
        self
    }

    /// Remove a listener previously added, matched by pointer identity.
    pub fn remove_listener(&mut self, listener: &Arc<dyn CompletionListener>) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| !Arc::ptr_eq(l, listener));
        self.listeners.len() != before
    }

    /// Expand into `[cmd1, .., cmdN, Marker(listeners)]`.
    pub fn into_items(self) -> Vec<QueueItem> {
        let mut items: Vec<QueueItem> = self.commands.into_iter().map(QueueItem::Command).collect();
        items.push(QueueItem::Marker(CompletionMarker::user(self.listeners)));
        items
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("commands", &self.commands)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
