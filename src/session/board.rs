use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use super::heartbeat::{heartbeat_loop, Liveness};
use super::reader::{reader_loop, ReaderContext};
use super::sink::DataSink;
use super::{
    BackgroundTask, CriticalError, CriticalErrorListener, CriticalErrorRegistry, LinkHealth, LinkState,
    Result, SessionError,
};
use crate::command::{builder, completion_channel, listener_fn, Command, CompletionListener, Task, TaskOutcome};
use crate::config::SessionConfig;
use crate::dispatch::{DispatchMetrics, Dispatcher, PurgeMode};
use crate::transport::{Connection, Connector};

struct ActiveLink {
    reader: BackgroundTask,
    heartbeat: BackgroundTask,
}

impl ActiveLink {
    async fn stop(self) {
        self.heartbeat.stop().await;
        self.reader.stop().await;
    }

    fn abort(&self) {
        self.heartbeat.abort();
        self.reader.abort();
    }
}

/// Connection to a single board: owns the dispatcher, the inbound reader and
/// the heartbeat.
pub struct Session {
    id: Uuid,
    config: SessionConfig,
    dispatcher: Dispatcher,
    critical: Arc<CriticalErrorRegistry>,
    health: LinkHealth,
    sink: Option<Arc<dyn DataSink>>,
    link: Mutex<Option<ActiveLink>>,
}

impl Session {
    /// Create a disconnected session. Must be called inside a tokio runtime.
    pub fn new(config: SessionConfig) -> Self {
        let critical = Arc::new(CriticalErrorRegistry::default());
        let health = LinkHealth::new(critical.clone());
        let dispatcher = Dispatcher::spawn(config.dispatch(), Arc::new(health.clone()));
        Self {
            id: Uuid::new_v4(),
            config,
            dispatcher,
            critical,
            health,
            sink: None,
            link: Mutex::new(None),
        }
    }

    /// Publish data messages to `sink`; takes effect on the next connect.
    pub fn with_sink(mut self, sink: Arc<dyn DataSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn is_connected(&self) -> bool {
        self.health.is_connected()
    }

    pub fn metrics(&self) -> DispatchMetrics {
        self.dispatcher.metrics()
    }

    pub fn add_critical_error_listener(&self, listener: Arc<dyn CriticalErrorListener>) {
        self.critical.add(listener);
    }

    pub fn remove_critical_error_listener(&self, listener: &Arc<dyn CriticalErrorListener>) -> bool {
        self.critical.remove(listener)
    }

    fn link_state(&self) -> LinkState {
        LinkState {
            dispatcher: self.dispatcher.clone(),
            health: self.health.clone(),
        }
    }

    pub async fn connect(&self, connector: &dyn Connector) -> Result<()> {
        if self.is_connected() {
            return Err(SessionError::AlreadyConnected);
        }
        log::info!("Connecting session {} to {}", self.id, connector.describe());
        let connection = connector.connect().await?;
        self.attach(connection).await
    }

    /// Start using an already opened connection.
    pub async fn attach(&self, connection: Connection) -> Result<()> {
        let mut link = self.link.lock().await;
        if self.is_connected() {
            return Err(SessionError::AlreadyConnected);
        }
        // Tasks of a link that died on its own.
        if let Some(stale) = link.take() {
            stale.stop().await;
        }

        let Connection { reader, writer } = connection;
        let liveness = Arc::new(Liveness::new());
        self.health.connected.store(true, Ordering::SeqCst);
        self.dispatcher.attach(writer);

        let ctx = ReaderContext {
            board: self.id,
            max_record_len: self.config.max_record_len,
            liveness: liveness.clone(),
            sink: self.sink.clone(),
            link: self.link_state(),
        };
        let reader = BackgroundTask::spawn(move |stop_rx| reader_loop(ctx, reader, stop_rx));

        let period = self.config.heartbeat_interval();
        let state = self.link_state();
        let heartbeat = BackgroundTask::spawn(move |stop_rx| heartbeat_loop(period, liveness, state, stop_rx));

        *link = Some(ActiveLink { reader, heartbeat });
        log::info!("Session {} connected", self.id);
        Ok(())
    }

    /// Stop background tasks, drop queued work silently and release the transport.
    pub async fn disconnect(&self) {
        let active = self.link.lock().await.take();
        if let Some(active) = active {
            active.stop().await;
        }
        self.dispatcher.purge(PurgeMode::Shutdown);
        self.dispatcher.detach();
        if self.health.connected.swap(false, Ordering::SeqCst) {
            log::info!("Session {} disconnected", self.id);
        }
    }

    /// Ask the board to close the connection, then disconnect.
    ///
    /// DISCONNECT is queued behind any pending work and the call waits for it
    /// to resolve. The board closing the link first also counts as success.
    /// If dispatch is suspended because a command exhausted its retries, the
    /// queue is aborted and `DisconnectTimeout` is returned. Any failure
    /// raises `PartialDisconnection`.
    pub async fn disconnect_cleanly(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        let (listener, rx) = completion_channel();
        let metrics = self.dispatcher.metrics_receiver();
        self.health.closing.store(true, Ordering::SeqCst);
        self.queue_task(Task::new("disconnect").with_command(builder::disconnect()).with_listener(listener));

        let result = tokio::select! {
            biased;
            outcome = rx => match outcome {
                Ok(TaskOutcome::Succeeded) => Ok(()),
                Ok(TaskOutcome::Failed) | Err(_) => Err(SessionError::DisconnectRejected),
            },
            stall = dispatch_stalled(metrics, self.health.connected.clone()) => match stall {
                Stall::LinkClosed => Ok(()),
                Stall::Suspended => {
                    self.dispatcher.purge(PurgeMode::Abort);
                    Err(SessionError::DisconnectTimeout)
                }
            },
        };
        if result.is_ok() {
            self.disconnect().await;
        }
        self.health.closing.store(false, Ordering::SeqCst);

        if result.is_err() {
            self.critical.on_critical_error(CriticalError::PartialDisconnection);
        }
        result
    }

    /// Reconnect after a critical error and return the board to a known input
    /// configuration.
    ///
    /// Queued work is aborted (listeners see a failure). Once connected again,
    /// every analog and digital input is deactivated and `reactivate` is sent,
    /// all as one task; if that task fails `FailedToReinitialize` is raised.
    pub async fn restore(&self, connector: &dyn Connector, reactivate: Vec<Command>) -> Result<()> {
        log::info!("Restoring session {}", self.id);
        self.dispatcher.purge(PurgeMode::Abort);
        let active = self.link.lock().await.take();
        if let Some(active) = active {
            active.stop().await;
        }
        self.dispatcher.detach();
        self.health.connected.store(false, Ordering::SeqCst);

        self.connect(connector).await?;

        let critical = self.critical.clone();
        let task = Task::new("reinitialize")
            .with_commands(builder::deactivate_all_analog_inputs())
            .with_commands(builder::deactivate_all_digital_inputs())
            .with_commands(reactivate)
            .with_listener(listener_fn(move |outcome| {
                if outcome == TaskOutcome::Failed {
                    critical.on_critical_error(CriticalError::FailedToReinitialize);
                }
            }));
        self.queue_task(task);
        Ok(())
    }

    pub fn queue_command(&self, command: Command) {
        self.dispatcher.enqueue(command);
    }

    pub fn queue_command_with(&self, command: Command, listener: Arc<dyn CompletionListener>) {
        self.dispatcher.enqueue_with(command, listener);
    }

    pub fn queue_task(&self, task: Task) {
        self.dispatcher.enqueue_task(task);
    }

    pub fn queued(&self) -> usize {
        self.dispatcher.queued()
    }

    /// Drop all queued work; see [`PurgeMode`].
    pub fn purge(&self, mode: PurgeMode) {
        self.dispatcher.purge(mode);
    }

    /// Re-enable dispatch after a `FailedMajorCommand`.
    pub fn resume(&self) {
        self.dispatcher.resume();
    }
}

enum Stall {
    /// A command exhausted its retries; nothing behind it will be sent
    Suspended,
    LinkClosed,
}

/// Resolves once queued work can no longer make progress.
async fn dispatch_stalled(mut metrics: watch::Receiver<DispatchMetrics>, connected: Arc<AtomicBool>) -> Stall {
    loop {
        if metrics.borrow_and_update().suspended {
            return Stall::Suspended;
        }
        if !connected.load(Ordering::SeqCst) {
            return Stall::LinkClosed;
        }
        // Worker gone: the session is being dropped.
        if metrics.changed().await.is_err() {
            return Stall::LinkClosed;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(active) = self.link.get_mut().take() {
            active.abort();
        }
        self.dispatcher.shutdown();
    }
}
