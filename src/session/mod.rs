pub mod board;
pub mod heartbeat;
pub mod reader;
pub mod sink;

pub use board::Session;
pub use heartbeat::{Liveness, Verdict};
pub use sink::{BroadcastSink, DataEvent, DataSink};
pub use crate::dispatch::{CriticalError, CriticalErrorListener};

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::dispatch::Dispatcher;
use crate::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session is already connected")]
    AlreadyConnected,

    #[error("Session is not connected")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Board rejected the disconnect request")]
    DisconnectRejected,

    #[error("Disconnect request was not acknowledged")]
    DisconnectTimeout,
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Fans critical errors out to every registered listener.
#[derive(Default)]
pub struct CriticalErrorRegistry {
    listeners: RwLock<Vec<Arc<dyn CriticalErrorListener>>>,
}

impl CriticalErrorRegistry {
    pub fn add(&self, listener: Arc<dyn CriticalErrorListener>) {
        self.listeners.write().unwrap_or_else(|e| e.into_inner()).push(listener);
    }

    pub fn remove(&self, listener: &Arc<dyn CriticalErrorListener>) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }
}

impl CriticalErrorListener for CriticalErrorRegistry {
    fn on_critical_error(&self, error: CriticalError) {
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner()).clone();
        if listeners.is_empty() {
            log::warn!("Critical error with no listener registered: {}", error);
        }
        for listener in listeners {
            listener.on_critical_error(error);
        }
    }
}

/// Connection flags of one session. Also the dispatcher's critical-error
/// listener, so a failed write marks the link lost like a reader EOF does.
#[derive(Clone)]
pub(crate) struct LinkHealth {
    pub connected: Arc<AtomicBool>,
    /// Set while a requested disconnect is in progress
    pub closing: Arc<AtomicBool>,
    pub critical: Arc<CriticalErrorRegistry>,
}

impl LinkHealth {
    pub fn new(critical: Arc<CriticalErrorRegistry>) -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(false)),
            closing: Arc::new(AtomicBool::new(false)),
            critical,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Mark the link dead. Only the first caller for a given link gets `true`
    /// and reports the loss.
    pub fn mark_lost(&self) -> bool {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return false;
        }
        if self.closing.load(Ordering::SeqCst) {
            log::info!("Board closed the connection as requested");
        } else {
            self.critical.on_critical_error(CriticalError::TerminalConnectionDisruption);
        }
        true
    }
}

impl CriticalErrorListener for LinkHealth {
    fn on_critical_error(&self, error: CriticalError) {
        match error {
            CriticalError::TerminalConnectionDisruption => {
                self.mark_lost();
            }
            other => self.critical.on_critical_error(other),
        }
    }
}

/// State shared by a session and its background tasks.
#[derive(Clone)]
pub(crate) struct LinkState {
    pub dispatcher: Dispatcher,
    pub health: LinkHealth,
}

impl LinkState {
    /// Mark the link dead exactly once: tell the owner and drop the transport.
    pub fn connection_lost(&self) {
        if self.health.mark_lost() {
            self.dispatcher.detach();
        }
    }
}

const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Spawned loop plus the channel that stops it.
pub(crate) struct BackgroundTask {
    task_handle: tokio::task::JoinHandle<()>,
    stop_tx: mpsc::Sender<()>,
}

impl BackgroundTask {
    pub fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(mpsc::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let task_handle = tokio::spawn(body(stop_rx));
        Self { task_handle, stop_tx }
    }

    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(()).await;
        if timeout(TASK_STOP_TIMEOUT, &mut self.task_handle).await.is_err() {
            log::warn!("Background task did not stop in time; aborting");
            self.task_handle.abort();
        }
    }

    pub fn abort(&self) {
        self.task_handle.abort();
    }
}
