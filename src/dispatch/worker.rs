//! Command dispatch worker and its caller-facing handle.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};

use super::types::*;
use crate::command::{Command, CompletionListener, CompletionMarker, QueueItem, Task};
use crate::message::RawMessage;
use crate::transport::{Transport, TransportError};

struct QueueState {
    items: VecDeque<QueueItem>,
    /// Bumped on every purge; commands carry the epoch they were popped in
    epoch: u64,
}

struct SharedQueue {
    state: Mutex<QueueState>,
}

impl SharedQueue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to the dispatch worker. Cheap to clone; the worker stops once every
/// handle is dropped or [`Dispatcher::shutdown`] is called.
#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<SharedQueue>,
    events_tx: mpsc::UnboundedSender<DispatchEvent>,
    metrics_rx: watch::Receiver<DispatchMetrics>,
}

impl Dispatcher {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(config: DispatchConfig, critical: Arc<dyn CriticalErrorListener>) -> Self {
        let queue = Arc::new(SharedQueue {
            state: Mutex::new(QueueState { items: VecDeque::new(), epoch: 0 }),
        });
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (metrics_tx, metrics_rx) = watch::channel(DispatchMetrics::default());

        let worker = Worker {
            queue: queue.clone(),
            events_rx,
            critical,
            config,
            transport: None,
            state: DispatchState::Idle,
            failures: 0,
            timed_out: false,
            suspended: false,
            metrics: DispatchMetrics::default(),
            metrics_tx,
        };
        tokio::spawn(worker.run());

        Self { queue, events_tx, metrics_rx }
    }

    fn wake(&self, event: DispatchEvent) {
        if self.events_tx.send(event).is_err() {
            log::debug!("Dispatch worker has stopped; event ignored");
        }
    }

    fn append(&self, items: Vec<QueueItem>) {
        self.queue.lock().items.extend(items);
        self.wake(DispatchEvent::Wake);
    }

    /// Queue a single command followed by an internal marker.
    pub fn enqueue(&self, command: Command) {
        log::debug!("Queueing {}", command);
        self.append(vec![QueueItem::Command(command), QueueItem::Marker(CompletionMarker::internal())]);
    }

    /// Queue a single command whose outcome is reported to `listener`.
    pub fn enqueue_with(&self, command: Command, listener: Arc<dyn CompletionListener>) {
        let task = Task::new(command.opcode().name())
            .with_command(command)
            .with_listener(listener);
        self.enqueue_task(task);
    }

    pub fn enqueue_task(&self, task: Task) {
        log::debug!("Queueing task '{}' ({} commands)", task.name(), task.len());
        self.append(task.into_items());
    }

    /// Items currently waiting, markers included.
    pub fn queued(&self) -> usize {
        self.queue.lock().items.len()
    }

    /// Drop every queued item and abandon the in-flight command.
    pub fn purge(&self, mode: PurgeMode) {
        let drained: Vec<QueueItem> = {
            let mut queue = self.queue.lock();
            queue.epoch += 1;
            queue.items.drain(..).collect()
        };
        log::info!("Purged {} queued items ({:?})", drained.len(), mode);

        if mode == PurgeMode::Abort {
            for item in drained {
                if let QueueItem::Marker(marker) = item {
                    if !marker.is_internal() {
                        marker.fire_failure();
                    }
                }
            }
        }
        self.wake(DispatchEvent::Purged);
    }

    /// Re-enable dispatch after a command exhausted its retry budget.
    pub fn resume(&self) {
        self.wake(DispatchEvent::Resume);
    }

    pub fn attach(&self, transport: Box<dyn Transport>) {
        self.wake(DispatchEvent::Attach(transport));
    }

    /// Drop the transport; an in-flight wait resolves as a timeout.
    pub fn detach(&self) {
        self.wake(DispatchEvent::Detach);
    }

    pub fn acknowledge(&self, ack: Ack) {
        self.wake(DispatchEvent::Ack(ack));
    }

    /// Route a classified message; returns whether it was an acknowledgement.
    pub fn on_message(&self, message: &RawMessage) -> bool {
        match message {
            RawMessage::Status(_) => {
                self.acknowledge(Ack::Status);
                true
            }
            RawMessage::Error { .. } => {
                self.acknowledge(Ack::Error);
                true
            }
            _ => false,
        }
    }

    pub fn metrics(&self) -> DispatchMetrics {
        self.metrics_rx.borrow().clone()
    }

    pub fn metrics_receiver(&self) -> watch::Receiver<DispatchMetrics> {
        self.metrics_rx.clone()
    }

    pub fn shutdown(&self) {
        self.wake(DispatchEvent::Shutdown);
    }
}

enum DispatchState {
    Idle,
    AwaitingAck {
        command: Command,
        epoch: u64,
        started: Instant,
        deadline: Instant,
    },
}

enum Next {
    Event(Option<DispatchEvent>),
    Timeout,
}

struct Worker {
    queue: Arc<SharedQueue>,
    events_rx: mpsc::UnboundedReceiver<DispatchEvent>,
    critical: Arc<dyn CriticalErrorListener>,
    config: DispatchConfig,
    transport: Option<Box<dyn Transport>>,
    state: DispatchState,
    failures: u32,
    timed_out: bool,
    suspended: bool,
    metrics: DispatchMetrics,
    metrics_tx: watch::Sender<DispatchMetrics>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            self.try_advance().await;

            let deadline = match &self.state {
                DispatchState::AwaitingAck { deadline, .. } => Some(*deadline),
                DispatchState::Idle => None,
            };
            let next = tokio::select! {
                event = self.events_rx.recv() => Next::Event(event),
                _ = wait_for(deadline) => Next::Timeout,
            };

            match next {
                Next::Timeout => self.on_timeout(),
                Next::Event(None) | Next::Event(Some(DispatchEvent::Shutdown)) => break,
                Next::Event(Some(event)) => self.handle(event),
            }
        }
        log::debug!("Dispatch worker stopped");
    }

    fn handle(&mut self, event: DispatchEvent) {
        match event {
            DispatchEvent::Wake | DispatchEvent::Shutdown => {}
            DispatchEvent::Ack(Ack::Status) => self.on_status(),
            DispatchEvent::Ack(Ack::Error) => self.on_error(),
            DispatchEvent::Attach(transport) => {
                log::info!("Dispatcher attached to transport");
                self.transport = Some(transport);
                self.publish();
            }
            DispatchEvent::Detach => {
                log::info!("Dispatcher detached from transport");
                self.transport = None;
                self.on_timeout();
                self.publish();
            }
            DispatchEvent::Purged => {
                if let DispatchState::AwaitingAck { epoch, .. } = &self.state {
                    if *epoch != self.queue.lock().epoch {
                        self.state = DispatchState::Idle;
                    }
                }
                self.failures = 0;
                self.timed_out = false;
                self.suspended = false;
                self.publish();
            }
            DispatchEvent::Resume => {
                if self.suspended {
                    log::info!("Resuming dispatch");
                }
                self.suspended = false;
                self.failures = 0;
                self.publish();
            }
        }
    }

    /// Pop and process queue items until a command is in flight or nothing
    /// can be sent.
    async fn try_advance(&mut self) {
        loop {
            if !matches!(self.state, DispatchState::Idle) || self.suspended {
                return;
            }
            if !self.transport.as_ref().map_or(false, |t| t.is_connected()) {
                return;
            }

            let (item, epoch) = {
                let mut queue = self.queue.lock();
                match queue.items.pop_front() {
                    Some(item) => (item, queue.epoch),
                    None => return,
                }
            };

            match item {
                QueueItem::Marker(marker) => {
                    if !marker.is_internal() {
                        self.metrics.markers_succeeded += 1;
                    }
                    marker.fire_success();
                }
                QueueItem::Command(command) => {
                    let bytes = command.encode();
                    log::debug!("Dispatching {}", command);
                    let now = Instant::now();
                    self.state = DispatchState::AwaitingAck {
                        command,
                        epoch,
                        started: now,
                        deadline: now + self.config.ack_timeout,
                    };
                    self.metrics.commands_written += 1;

                    let written = match self.transport.as_mut() {
                        Some(transport) => transport.write(&bytes).await,
                        None => Err(TransportError::NotConnected),
                    };
                    if let Err(e) = written {
                        log::error!("Transport write failed: {}", e);
                        self.transport = None;
                        self.report(CriticalError::TerminalConnectionDisruption);
                        self.on_timeout();
                    }
                    self.publish();
                    return;
                }
            }
        }
    }

    fn on_status(&mut self) {
        match std::mem::replace(&mut self.state, DispatchState::Idle) {
            DispatchState::AwaitingAck { command, started, .. } => {
                let latency = started.elapsed().as_millis() as u64;
                log::debug!("{} acknowledged after {} ms", command.opcode(), latency);
                self.failures = 0;
                self.timed_out = false;
                self.metrics.acks += 1;
                self.metrics.last_ack_latency_ms = Some(latency);
                self.publish();
            }
            DispatchState::Idle => log::debug!("Status message with no command in flight"),
        }
    }

    fn on_error(&mut self) {
        let (command, epoch) = match std::mem::replace(&mut self.state, DispatchState::Idle) {
            DispatchState::AwaitingAck { command, epoch, .. } => (command, epoch),
            DispatchState::Idle => {
                log::warn!("Error message with no command in flight");
                return;
            }
        };
        self.timed_out = false;
        self.metrics.errors += 1;

        // Discard the rest of the failed unit, up to and including its marker.
        let mut discarded = 0;
        let marker = {
            let mut queue = self.queue.lock();
            if queue.epoch != epoch {
                None
            } else {
                loop {
                    match queue.items.pop_front() {
                        Some(QueueItem::Command(_)) => discarded += 1,
                        Some(QueueItem::Marker(marker)) => break Some(marker),
                        None => break None,
                    }
                }
            }
        };
        log::warn!("Board rejected {}; discarded {} dependent commands", command, discarded);

        if let Some(marker) = marker {
            if !marker.is_internal() {
                self.metrics.markers_failed += 1;
                marker.fire_failure();
            }
        }
        self.publish();
    }

    fn on_timeout(&mut self) {
        let (command, epoch) = match std::mem::replace(&mut self.state, DispatchState::Idle) {
            DispatchState::AwaitingAck { command, epoch, .. } => (command, epoch),
            DispatchState::Idle => return,
        };

        let exhausted = {
            let mut queue = self.queue.lock();
            if queue.epoch != epoch {
                log::debug!("Abandoned {} after purge", command);
                return;
            }
            self.timed_out = true;
            self.failures += 1;
            self.metrics.timeouts += 1;

            let exhausted = self.failures >= self.config.max_failures;
            if exhausted {
                log::error!(
                    "No acknowledgement for {} after {} attempts; suspending dispatch",
                    command,
                    self.failures
                );
                self.failures = 0;
                self.suspended = true;
            } else {
                log::warn!(
                    "No acknowledgement for {} (attempt {}/{}), retrying",
                    command,
                    self.failures,
                    self.config.max_failures
                );
                self.metrics.retries += 1;
            }
            // Kept at the head either way: retried next, or held until resume/purge.
            queue.items.push_front(QueueItem::Command(command));
            exhausted
        };

        if exhausted {
            self.report(CriticalError::FailedMajorCommand);
        }
        self.publish();
    }

    fn report(&self, error: CriticalError) {
        log::error!("Critical error: {}", error);
        self.critical.on_critical_error(error);
    }

    fn publish(&mut self) {
        self.metrics.phase = match self.state {
            DispatchState::Idle => DispatchPhase::Idle,
            DispatchState::AwaitingAck { .. } => DispatchPhase::AwaitingAck,
        };
        self.metrics.failure_count = self.failures;
        self.metrics.timed_out = self.timed_out;
        self.metrics.suspended = self.suspended;
        self.metrics.connected = self.transport.as_ref().map_or(false, |t| t.is_connected());
        self.metrics.queued = self.queue.lock().items.len();
        let _ = self.metrics_tx.send(self.metrics.clone());
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
