//! Dispatch core types
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::transport::Transport;

pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(3);
pub const MAX_ALLOWED_FAILURES: u32 = 3;

/// Unrecoverable conditions reported to the session owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CriticalError {
    /// Re-initialization batch after a reconnect failed
    FailedToReinitialize,
    /// A command exhausted its retry budget; the board is presumed unresponsive
    FailedMajorCommand,
    /// The transport was severed or went silent
    TerminalConnectionDisruption,
    /// The board rejected or never acknowledged a disconnect request
    PartialDisconnection,
}

impl std::fmt::Display for CriticalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            CriticalError::FailedToReinitialize => "failed to reinitialize board",
            CriticalError::FailedMajorCommand => "major command failure",
            CriticalError::TerminalConnectionDisruption => "terminal connection disruption",
            CriticalError::PartialDisconnection => "partial disconnection",
        };
        f.write_str(text)
    }
}

pub trait CriticalErrorListener: Send + Sync {
    fn on_critical_error(&self, error: CriticalError);
}

impl<F> CriticalErrorListener for F
where
    F: Fn(CriticalError) + Send + Sync,
{
    fn on_critical_error(&self, error: CriticalError) {
        self(error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub ack_timeout: Duration,
    pub max_failures: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            max_failures: MAX_ALLOWED_FAILURES,
        }
    }
}

/// Acknowledgement kinds that resolve the in-flight command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Status,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeMode {
    /// Clean shutdown: drop everything without notifying listeners
    Shutdown,
    /// Error recovery: notify every user-visible marker of failure
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DispatchPhase {
    #[default]
    Idle,
    AwaitingAck,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchMetrics {
    pub phase: DispatchPhase,
    /// Consecutive timeouts of the current command
    pub failure_count: u32,
    /// Whether the last wait ended in a timeout
    pub timed_out: bool,
    /// Dispatch halted after a retry budget was exhausted
    pub suspended: bool,
    pub connected: bool,
    pub queued: usize,
    pub commands_written: u64,
    pub acks: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub retries: u64,
    pub markers_succeeded: u64,
    pub markers_failed: u64,
    pub last_ack_latency_ms: Option<u64>,
}

pub(crate) enum DispatchEvent {
    Wake,
    Ack(Ack),
    Attach(Box<dyn Transport>),
    Detach,
    Purged,
    Resume,
    Shutdown,
}
